//! Bloom filters with counting and cache-coherence variants.
//!
//! This crate provides a family of probabilistic membership structures
//! built around one parameter engine and one hashing layer:
//!
//! * [`BloomFilter`]: plain in-memory filter with add, membership test,
//!   union and intersection, and population estimation.
//! * [`CountingBloomFilter`]: every bit position backed by a saturating
//!   counter, which makes removal possible.
//! * [`redis::CountingBloomFilterRedis`]: the same counting contract
//!   against a Redis dataset shared by multiple processes, using
//!   optimistic transactions for multi-writer correctness.
//! * [`ExpiringBloomFilter`]: a cache sketch on top of the counting
//!   filter, where reads register a TTL and writes to still-cached
//!   elements are recorded, then automatically un-recorded once the TTL
//!   has passed.
//!
//! Filters are configured through [`FilterConfigBuilder`]; any two of
//! {expected elements, bit vector size, hash count, false positive
//! probability} suffice and the remaining parameters are derived from the
//! standard optimality relations:
//!
//! ```
//! use cachebloom_rs::{BloomFilter, FilterConfigBuilder};
//!
//! let config = FilterConfigBuilder::default()
//!     .expected_elements(10_000)
//!     .false_positive_probability(0.01)
//!     .build()
//!     .unwrap();
//! let mut filter = BloomFilter::new(config).unwrap();
//! filter.add(b"some element");
//! assert!(filter.contains(b"some element"));
//! ```

pub mod bitset;
pub mod config;
pub mod counting;
pub mod countervec;
pub mod error;
pub mod expiring;
pub mod filter;
pub mod hash;
pub mod json;
pub mod redis;
pub mod traits;

pub use bitset::BitSet;
pub use config::{FilterConfig, FilterConfigBuilder};
pub use counting::CountingBloomFilter;
pub use countervec::CounterVec;
pub use error::{FilterError, Result};
pub use expiring::ExpiringBloomFilter;
pub use filter::BloomFilter;
pub use hash::HashMethod;
pub use json::{counting_to_json, from_json, to_json};
pub use traits::CountingOps;
