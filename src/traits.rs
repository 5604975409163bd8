use crate::error::Result;

/// The shared contract of the counting backends. The in-memory backend
/// serializes operations behind a mutex; the Redis backend relies on
/// optimistic transactions. Counts are `i64` because the remote counters
/// can be driven below zero by removals of elements that were never
/// added.
pub trait CountingOps {
    /// Sets the element's bits and increments its counters. Returns the
    /// minimum counter value after the increment, which estimates the
    /// element's multiplicity.
    fn add_and_estimate_count(&self, item: &[u8]) -> Result<i64>;

    /// Decrements the element's counters, clearing bits whose counter
    /// reaches zero. Returns the minimum counter value after the
    /// decrement.
    fn remove_and_estimate_count(&self, item: &[u8]) -> Result<i64>;

    /// The minimum counter value across the element's positions.
    fn estimated_count(&self, item: &[u8]) -> Result<i64>;

    /// Whether all of the element's bits are set.
    fn contains(&self, item: &[u8]) -> Result<bool>;

    /// Adds the element; `true` if it was (probably) not present before.
    fn add(&self, item: &[u8]) -> Result<bool> {
        Ok(self.add_and_estimate_count(item)? == 1)
    }

    /// Removes one occurrence; `true` if it was the last one.
    fn remove(&self, item: &[u8]) -> Result<bool> {
        Ok(self.remove_and_estimate_count(item)? <= 0)
    }
}
