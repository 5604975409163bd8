//! Redis-backed filter variants. The bit array and the counters live in
//! the store under the dataset's key prefix, so several processes can
//! share one filter; correctness under concurrent writers comes from
//! optimistic transactions rather than locks.

pub mod bitset;
pub mod counting;
pub mod keys;
pub mod pool;

pub use bitset::RedisBitSet;
pub use counting::CountingBloomFilterRedis;
pub use keys::RedisKeys;
pub use pool::RedisPool;
