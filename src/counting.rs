use std::sync::{Mutex, MutexGuard};

use crate::bitset::BitSet;
use crate::config::FilterConfig;
use crate::countervec::CounterVec;
use crate::error::{FilterError, Result};
use crate::filter::population;
use crate::traits::CountingOps;

/// In-memory counting Bloom filter. Every bit position is backed by a
/// saturating counter of the configured width, which makes removal
/// possible: a bit is cleared only when its counter drops back to zero.
///
/// Bit array and counter array are guarded by a single lock, so an add or
/// remove is atomic with respect to other operations on the same filter
/// and the invariant "bit set iff some counter at that position is
/// positive" always holds between operations.
pub struct CountingBloomFilter {
    config: FilterConfig,
    state: Mutex<CountingState>,
}

struct CountingState {
    bits: BitSet,
    counters: CounterVec,
}

impl CountingBloomFilter {
    pub fn new(config: FilterConfig) -> Result<Self> {
        let config = config.complete()?;
        let state = CountingState {
            bits: BitSet::new(config.size),
            counters: CounterVec::new(config.counting_bits, config.size),
        };
        Ok(Self {
            config,
            state: Mutex::new(state),
        })
    }

    /// Builds a filter from snapshotted state; the caller is responsible
    /// for bits and counters agreeing with each other.
    pub(crate) fn from_parts(
        config: FilterConfig,
        bits: BitSet,
        counters: CounterVec,
    ) -> Result<Self> {
        let config = config.complete()?;
        Ok(Self {
            config,
            state: Mutex::new(CountingState { bits, counters }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, CountingState>> {
        self.state
            .lock()
            .map_err(|e| FilterError::Lock(e.to_string()))
    }

    pub fn add_element<E: ToString + ?Sized>(&self, element: &E) -> Result<bool> {
        let bytes = self.config.to_bytes(element);
        self.add(&bytes)
    }

    pub fn remove_element<E: ToString + ?Sized>(
        &self,
        element: &E,
    ) -> Result<bool> {
        let bytes = self.config.to_bytes(element);
        self.remove(&bytes)
    }

    pub fn contains_element<E: ToString + ?Sized>(
        &self,
        element: &E,
    ) -> Result<bool> {
        let bytes = self.config.to_bytes(element);
        self.contains(&bytes)
    }

    pub fn estimated_count_element<E: ToString + ?Sized>(
        &self,
        element: &E,
    ) -> Result<i64> {
        let bytes = self.config.to_bytes(element);
        self.estimated_count(&bytes)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.bits.is_empty())
    }

    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.bits.clear();
        state.counters.clear();
        Ok(())
    }

    pub fn estimated_population(&self) -> Result<f64> {
        Ok(population(&self.lock()?.bits, &self.config))
    }

    /// A point-in-time copy of the bit array.
    pub fn bit_set_snapshot(&self) -> Result<BitSet> {
        Ok(self.lock()?.bits.clone())
    }

    /// Union and intersection are not defined for counting filters:
    /// merging bit arrays would leave the counters inconsistent.
    pub fn union(&self, _other: &CountingBloomFilter) -> Result<()> {
        Err(FilterError::Unsupported(
            "union on a counting Bloom filter",
        ))
    }

    pub fn intersect(&self, _other: &CountingBloomFilter) -> Result<()> {
        Err(FilterError::Unsupported(
            "intersect on a counting Bloom filter",
        ))
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
}

impl CountingOps for CountingBloomFilter {
    fn add_and_estimate_count(&self, item: &[u8]) -> Result<i64> {
        let positions = self.config.hash(item);
        let mut state = self.lock()?;
        let mut min = i64::MAX;
        for &position in &positions {
            state.bits.set(position as usize);
            let count = state.counters.increment(position as usize);
            min = min.min(count as i64);
        }
        Ok(min)
    }

    fn remove_and_estimate_count(&self, item: &[u8]) -> Result<i64> {
        let positions = self.config.hash(item);
        let mut state = self.lock()?;
        let mut min = i64::MAX;
        for &position in &positions {
            let count = state.counters.decrement(position as usize);
            if count == 0 {
                state.bits.clear_bit(position as usize);
            }
            min = min.min(count as i64);
        }
        Ok(min)
    }

    fn estimated_count(&self, item: &[u8]) -> Result<i64> {
        let positions = self.config.hash(item);
        let state = self.lock()?;
        Ok(positions
            .iter()
            .map(|&p| state.counters.get(p as usize) as i64)
            .min()
            .unwrap_or(0))
    }

    fn contains(&self, item: &[u8]) -> Result<bool> {
        let positions = self.config.hash(item);
        let state = self.lock()?;
        Ok(positions.iter().all(|&p| state.bits.get(p as usize)))
    }
}

impl Clone for CountingBloomFilter {
    fn clone(&self) -> Self {
        let state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Self {
            config: self.config.clone(),
            state: Mutex::new(CountingState {
                bits: state.bits.clone(),
                counters: state.counters.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for CountingBloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CountingBloomFilter {{ size: {}, hashes: {}, counting_bits: {} }}",
            self.config.size, self.config.hashes, self.config.counting_bits
        )
    }
}
