use std::collections::HashMap;

use redis::Commands;
use tracing::debug;

use crate::bitset::BitSet;
use crate::config::FilterConfig;
use crate::counting::CountingBloomFilter;
use crate::countervec::CounterVec;
use crate::error::{FilterError, Result};
use crate::filter::population;
use crate::redis::bitset::RedisBitSet;
use crate::redis::keys::RedisKeys;
use crate::redis::pool::{backoff, RedisPool};
use crate::traits::CountingOps;

/// Counting Bloom filter backed by Redis.
///
/// The bit array lives in a byte string and the counters in a hash, which
/// spreads the keyspace and lets pipelining absorb network latency.
/// Multi-writer correctness comes from optimistic transactions: additions
/// run in one watched MULTI/EXEC that is retried on concurrent
/// modification, and removals decrement counters first and only then
/// clear bits under a watched transaction, so a decrement is never lost
/// and bit clears always agree with an observed counter state.
pub struct CountingBloomFilterRedis {
    config: FilterConfig,
    keys: RedisKeys,
    pool: RedisPool,
    bits: RedisBitSet,
}

impl CountingBloomFilterRedis {
    pub fn new(config: FilterConfig) -> Result<Self> {
        let requested = config.complete()?;
        let name = requested.name.clone().ok_or_else(|| {
            FilterError::InvalidConfig(
                "Remote filters need a dataset name".to_string(),
            )
        })?;
        let overwrite = requested.overwrite_if_exists;

        let keys = RedisKeys::new(&name);
        let pool = RedisPool::connect(
            &requested.redis_host,
            requested.redis_port,
            requested.redis_connections,
            &requested.read_replicas,
        )?;
        let config = keys.persist_config(&pool, &requested)?;
        let bits =
            RedisBitSet::new(pool.clone(), keys.bits_key.clone(), config.size);

        let filter = Self {
            config,
            keys,
            pool,
            bits,
        };
        if overwrite {
            debug!(dataset = %name, "overwriting existing remote filter data");
            filter.clear()?;
        }
        Ok(filter)
    }

    fn fields(positions: &[u32]) -> Vec<[u8; 4]> {
        positions.iter().map(|p| p.to_be_bytes()).collect()
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
        self.bits.is_empty()
    }

    /// Deletes the filter data (bits and counters), keeping the dataset
    /// registered.
    pub fn clear(&self) -> Result<()> {
        self.pool.with_connection(|conn| {
            conn.del(&[self.keys.counts_key.as_str(), self.keys.bits_key.as_str()][..])
        })
    }

    /// Deletes the filter data and the configuration snapshot, ending the
    /// dataset's lifecycle.
    pub fn destroy(&self) -> Result<()> {
        self.clear()?;
        self.pool
            .with_connection(|conn| conn.del(&self.keys.config_key))
    }

    pub fn estimated_population(&self) -> Result<f64> {
        Ok(population(&self.bits.to_local()?, &self.config))
    }

    /// Snapshots the remote state into an in-memory counting filter. Bits
    /// and counters are read in one transaction so they agree.
    pub fn to_memory_filter(&self) -> Result<CountingBloomFilter> {
        let values = self.pool.snapshot(|pipe| {
            pipe.cmd("GET").arg(&self.keys.bits_key);
            pipe.cmd("HGETALL").arg(&self.keys.counts_key);
        })?;

        let bytes: Option<Vec<u8>> = redis::from_redis_value(&values[0])?;
        let mut bytes = bytes.unwrap_or_default();
        bytes.resize(self.config.size.div_ceil(8), 0);
        let bits = BitSet::from_bytes(&bytes, self.config.size);

        let stored: HashMap<Vec<u8>, i64> = redis::from_redis_value(&values[1])?;
        let mut counters =
            CounterVec::new(self.config.counting_bits, self.config.size);
        for (field, count) in stored {
            if field.len() != 4 {
                continue;
            }
            let position =
                u32::from_be_bytes([field[0], field[1], field[2], field[3]]);
            if (position as usize) < self.config.size && count > 0 {
                let clamped = (count as u64).min(counters.max_value());
                counters.set(position as usize, clamped);
            }
        }

        CountingBloomFilter::from_parts(self.config.clone(), bits, counters)
    }

    /// Union and intersection are not available on the remote backend.
    pub fn union(&self, _other: &CountingBloomFilterRedis) -> Result<()> {
        Err(FilterError::Unsupported(
            "union on the remote counting Bloom filter",
        ))
    }

    pub fn intersect(&self, _other: &CountingBloomFilterRedis) -> Result<()> {
        Err(FilterError::Unsupported(
            "intersect on the remote counting Bloom filter",
        ))
    }

    pub fn bit_set(&self) -> &RedisBitSet {
        &self.bits
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    fn stage_expire(&self, pipe: &mut redis::Pipeline) {
        if let Some(ts) = self.config.redis_expire_at {
            pipe.cmd("EXPIREAT")
                .arg(&self.keys.counts_key)
                .arg(ts)
                .ignore();
        }
    }
}

impl CountingOps for CountingBloomFilterRedis {
    fn add_and_estimate_count(&self, item: &[u8]) -> Result<i64> {
        let positions = self.config.hash(item);
        let fields = Self::fields(&positions);

        let values = self.pool.transaction(
            &[self.keys.bits_key.as_str(), self.keys.counts_key.as_str()],
            |pipe| {
                for &position in &positions {
                    self.bits.stage_set(pipe, position, true);
                    pipe.ignore();
                }
                for field in &fields {
                    pipe.cmd("HINCRBY")
                        .arg(&self.keys.counts_key)
                        .arg(&field[..])
                        .arg(1);
                }
                self.stage_expire(pipe);
            },
        )?;

        let mut min = i64::MAX;
        for value in &values {
            min = min.min(redis::from_redis_value::<i64>(value)?);
        }
        Ok(min)
    }

    fn remove_and_estimate_count(&self, item: &[u8]) -> Result<i64> {
        let positions = self.config.hash(item);
        let fields = Self::fields(&positions);
        let watched = [self.keys.counts_key.as_str(), self.keys.bits_key.as_str()];

        self.pool.with_connection(|conn| {
            // Phase 1: decrement all counters in a plain pipeline under a
            // watch, reading back the new values. The decrements are
            // never rolled back, so no concurrent removal can be lost.
            redis::cmd("WATCH").arg(&watched[..]).query::<()>(conn)?;
            let mut pipe = redis::pipe();
            for field in &fields {
                pipe.cmd("HINCRBY")
                    .arg(&self.keys.counts_key)
                    .arg(&field[..])
                    .arg(-1);
            }
            self.stage_expire(&mut pipe);
            let mut counts: Vec<i64> = pipe.query(conn)?;

            // Phase 2: clear the bits whose counter dropped to zero or
            // below, transactionally. On abort the counters may have been
            // changed by a concurrent writer, so re-read them under a
            // fresh watch and try again.
            let mut attempt = 0u32;
            loop {
                let mut tx = redis::pipe();
                tx.atomic();
                for (index, &position) in positions.iter().enumerate() {
                    if counts[index] <= 0 {
                        self.bits.stage_set(&mut tx, position, false);
                        tx.ignore();
                    }
                }
                match tx.query::<Option<redis::Value>>(conn)? {
                    Some(_) => {
                        return Ok(counts.iter().copied().min().unwrap_or(0));
                    }
                    None => {
                        attempt += 1;
                        debug!(attempt, "bit-clear transaction aborted");
                        backoff(attempt);

                        redis::cmd("WATCH").arg(&watched[..]).query::<()>(conn)?;
                        let mut read = redis::cmd("HMGET");
                        read.arg(&self.keys.counts_key);
                        for field in &fields {
                            read.arg(&field[..]);
                        }
                        let fresh: Vec<Option<i64>> = read.query(conn)?;
                        counts =
                            fresh.into_iter().map(|c| c.unwrap_or(0)).collect();
                    }
                }
            }
        })
    }

    fn estimated_count(&self, item: &[u8]) -> Result<i64> {
        let positions = self.config.hash(item);
        let fields = Self::fields(&positions);

        self.pool.allowing_replicas().with_connection(|conn| {
            let mut read = redis::cmd("HMGET");
            read.arg(&self.keys.counts_key);
            for field in &fields {
                read.arg(&field[..]);
            }
            let counts: Vec<Option<i64>> = read.query(conn)?;
            Ok(counts.into_iter().flatten().min().unwrap_or(0))
        })
    }

    fn contains(&self, item: &[u8]) -> Result<bool> {
        self.bits.all_set(&self.config.hash(item))
    }
}
