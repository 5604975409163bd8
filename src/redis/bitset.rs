use redis::Commands;

use crate::bitset::BitSet;
use crate::error::Result;
use crate::redis::pool::RedisPool;

/// A bit vector living in a Redis byte string.
///
/// Redis addresses bits most-significant-first within each byte, the same
/// layout [`BitSet`] serializes to, so snapshots move between the two
/// backends without any reshuffling. Mutating operations can either go
/// through the pool directly or be staged onto a caller-supplied pipeline
/// that is part of a larger transaction.
pub struct RedisBitSet {
    pool: RedisPool,
    key: String,
    size: usize,
}

impl RedisBitSet {
    pub fn new(pool: RedisPool, key: String, size: usize) -> Self {
        Self { pool, key, size }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.cardinality()? == 0)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self, index: u32) -> Result<bool> {
        self.pool
            .allowing_replicas()
            .with_connection(|conn| conn.getbit(&self.key, index as usize))
    }

    /// Sets or clears one bit, returning the previous value.
    pub fn set(&self, index: u32, value: bool) -> Result<bool> {
        self.pool
            .with_connection(|conn| conn.setbit(&self.key, index as usize, value))
    }

    /// Stages a bit write on an external pipeline instead of issuing it.
    pub fn stage_set(&self, pipe: &mut redis::Pipeline, index: u32, value: bool) {
        pipe.cmd("SETBIT")
            .arg(&self.key)
            .arg(index)
            .arg(value as u8);
    }

    /// Reads the given positions inside one snapshot transaction, so all
    /// of them reflect a single coherent state.
    pub fn get_bulk(&self, positions: &[u32]) -> Result<Vec<bool>> {
        let values = self.pool.allowing_replicas().snapshot(|pipe| {
            for &position in positions {
                pipe.cmd("GETBIT").arg(&self.key).arg(position);
            }
        })?;
        values
            .iter()
            .map(|v| redis::from_redis_value::<bool>(v).map_err(Into::into))
            .collect()
    }

    /// Whether every one of the given positions is set.
    pub fn all_set(&self, positions: &[u32]) -> Result<bool> {
        Ok(self.get_bulk(positions)?.into_iter().all(|bit| bit))
    }

    /// Sets all positions in one transaction. Returns whether any of them
    /// was previously unset.
    pub fn set_all(&self, positions: &[u32]) -> Result<bool> {
        let values = self.pool.snapshot(|pipe| {
            for &position in positions {
                pipe.cmd("SETBIT").arg(&self.key).arg(position).arg(1);
            }
        })?;
        let mut any_new = false;
        for value in &values {
            any_new |= !redis::from_redis_value::<bool>(value)?;
        }
        Ok(any_new)
    }

    /// Number of set bits, via the store's bit-count primitive.
    pub fn cardinality(&self) -> Result<u64> {
        self.pool.with_connection(|conn| {
            redis::cmd("BITCOUNT").arg(&self.key).query(conn)
        })
    }

    /// The raw byte string, zero-padded to the full ⌈size/8⌉ bytes when
    /// the key is missing or shorter.
    pub fn to_byte_vec(&self) -> Result<Vec<u8>> {
        let bytes: Option<Vec<u8>> = self
            .pool
            .allowing_replicas()
            .with_connection(|conn| conn.get(&self.key))?;
        let mut bytes = bytes.unwrap_or_default();
        bytes.resize(self.size.div_ceil(8), 0);
        Ok(bytes)
    }

    /// A local snapshot with the same logical contents.
    pub fn to_local(&self) -> Result<BitSet> {
        Ok(BitSet::from_bytes(&self.to_byte_vec()?, self.size))
    }

    /// Overwrites the remote contents with a local bit set.
    pub fn overwrite(&self, bits: &BitSet) -> Result<()> {
        self.pool
            .with_connection(|conn| conn.set(&self.key, bits.to_bytes()))
    }

    pub fn clear(&self) -> Result<()> {
        self.pool.with_connection(|conn| conn.del(&self.key))
    }

    /// Logical equality with a local bit set, independent of backend.
    pub fn matches(&self, other: &BitSet) -> Result<bool> {
        Ok(&self.to_local()? == other)
    }
}
