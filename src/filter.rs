use crate::bitset::BitSet;
use crate::config::FilterConfig;
use crate::error::Result;

/// In-memory Bloom filter: probabilistic set membership with no false
/// negatives and a configurable false positive rate.
#[derive(Clone)]
pub struct BloomFilter {
    config: FilterConfig,
    bits: BitSet,
}

impl BloomFilter {
    pub fn new(config: FilterConfig) -> Result<Self> {
        let config = config.complete()?;
        let bits = BitSet::new(config.size);
        Ok(Self { config, bits })
    }

    pub(crate) fn with_bits(config: FilterConfig, bits: BitSet) -> Self {
        Self { config, bits }
    }

    /// Adds the element's bytes. Returns `true` if the element did not
    /// previously hash to an all-set position set, i.e. it was (probably)
    /// new.
    pub fn add(&mut self, item: &[u8]) -> bool {
        let mut newly_set = false;
        for position in self.config.hash(item) {
            newly_set |= self.bits.set(position as usize);
        }
        newly_set
    }

    /// Adds a generic element using the configured element encoding.
    pub fn add_element<E: ToString + ?Sized>(&mut self, element: &E) -> bool {
        let bytes = self.config.to_bytes(element);
        self.add(&bytes)
    }

    /// Bulk add; the returned booleans mirror [`BloomFilter::add`].
    pub fn add_all<E, I>(&mut self, elements: I) -> Vec<bool>
    where
        E: ToString,
        I: IntoIterator<Item = E>,
    {
        elements
            .into_iter()
            .map(|e| self.add_element(&e))
            .collect()
    }

    pub fn contains(&self, item: &[u8]) -> bool {
        self.config
            .hash(item)
            .iter()
            .all(|&position| self.bits.get(position as usize))
    }

    pub fn contains_element<E: ToString + ?Sized>(&self, element: &E) -> bool {
        let bytes = self.config.to_bytes(element);
        self.contains(&bytes)
    }

    pub fn contains_all<E, I>(&self, elements: I) -> bool
    where
        E: ToString,
        I: IntoIterator<Item = E>,
    {
        elements.into_iter().all(|e| self.contains_element(&e))
    }

    /// Bitwise OR with a compatible filter. Lossless: the result equals a
    /// filter into which both element sets were inserted directly.
    pub fn union(&mut self, other: &BloomFilter) -> Result<()> {
        self.config.require_compatibility(&other.config)?;
        self.bits.union_with(&other.bits);
        Ok(())
    }

    /// Bitwise AND with a compatible filter. Introduces no false
    /// negatives but can raise the false positive rate.
    pub fn intersect(&mut self, other: &BloomFilter) -> Result<()> {
        self.config.require_compatibility(&other.config)?;
        self.bits.intersect_with(&other.bits);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }

    pub fn cardinality(&self) -> usize {
        self.bits.cardinality()
    }

    /// Estimates how many elements are in the filter from the fraction of
    /// set bits.
    pub fn estimated_population(&self) -> f64 {
        population(&self.bits, &self.config)
    }

    /// The false positive probability after `inserted` additions:
    /// `(1 - e^(-k * inserted / m))^k`.
    pub fn false_positive_probability(&self, inserted: f64) -> f64 {
        crate::hash::false_positive_rate(
            self.config.hashes,
            self.config.size,
            inserted,
        )
    }

    pub fn bits_per_element(&self, inserted: usize) -> f64 {
        self.config.size as f64 / inserted as f64
    }

    /// The probability that a given bit is still zero after `inserted`
    /// additions.
    pub fn bit_zero_probability(&self, inserted: usize) -> f64 {
        (1.0 - 1.0 / self.config.size as f64)
            .powf((self.config.hashes * inserted) as f64)
    }

    pub fn bit_set(&self) -> &BitSet {
        &self.bits
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BloomFilter {{ size: {}, hashes: {}, false_positive_probability: {}, hash_method: {}, cardinality: {} }}",
            self.config.size,
            self.config.hashes,
            self.config.false_positive_probability,
            self.config.hash_method,
            self.bits.cardinality()
        )
    }
}

impl PartialEq for BloomFilter {
    fn eq(&self, other: &Self) -> bool {
        self.config.is_compatible_to(&other.config) && self.bits == other.bits
    }
}

/// Swamidass & Baldi estimate of the element count in a bit set:
/// `-m/k * ln(1 - X/m)` where X is the number of set bits.
pub fn population(bits: &BitSet, config: &FilterConfig) -> f64 {
    let m = config.size as f64;
    let ones = bits.cardinality() as f64;
    -m / (config.hashes as f64) * (1.0 - ones / m).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfigBuilder;
    use crate::hash::HashMethod;

    fn build(n: usize, p: f64, method: HashMethod) -> BloomFilter {
        let config = FilterConfigBuilder::default()
            .expected_elements(n)
            .false_positive_probability(p)
            .hash_method(method)
            .build()
            .unwrap();
        BloomFilter::new(config).unwrap()
    }

    #[test]
    fn add_and_contains() {
        let mut filter = build(100, 0.01, HashMethod::Md5);
        assert!(filter.add(b"some data"));
        assert!(filter.contains(b"some data"));
        assert!(!filter.contains(b"other data"));
        // re-adding reports already present
        assert!(!filter.add(b"some data"));
    }

    #[test]
    fn add_all_matches_individual_adds() {
        let mut one_by_one = build(1_000, 0.01, HashMethod::Md5);
        let mut bulk = build(1_000, 0.01, HashMethod::Md5);

        let elements: Vec<String> = (0..100).map(|i| format!("test{i}")).collect();
        for e in &elements {
            one_by_one.add_element(e);
        }
        bulk.add_all(elements.iter());

        assert_eq!(one_by_one, bulk);
        assert!(bulk.contains_all(elements.iter()));
    }

    #[test]
    fn union_merges_and_intersect_narrows() {
        let mut a = build(1_000, 0.01, HashMethod::Murmur3);
        let mut b = build(1_000, 0.01, HashMethod::Murmur3);
        a.add(b"only in a");
        b.add(b"only in b");
        a.add(b"in both");
        b.add(b"in both");

        let mut union = a.clone();
        union.union(&b).unwrap();
        assert!(union.contains(b"only in a"));
        assert!(union.contains(b"only in b"));

        a.intersect(&b).unwrap();
        assert!(a.contains(b"in both"));
        assert!(!a.contains(b"only in a"));
    }

    #[test]
    fn union_rejects_incompatible_filters() {
        let mut a = build(1_000, 0.01, HashMethod::Md5);
        let b = build(1_000, 0.01, HashMethod::Murmur3);
        assert!(a.union(&b).is_err());
        assert!(a.intersect(&b).is_err());
    }

    #[test]
    fn population_estimate_tracks_insertions() {
        let mut filter = build(10_000, 0.01, HashMethod::Murmur2DoubleHash);
        for i in 0..1_000 {
            filter.add_element(&format!("element{i}"));
        }
        let estimate = filter.estimated_population();
        assert!(
            (estimate - 1_000.0).abs() < 100.0,
            "population estimate off: {estimate}"
        );
    }

    #[test]
    fn clear_empties_the_filter() {
        let mut filter = build(100, 0.01, HashMethod::Md5);
        filter.add(b"x");
        assert!(!filter.is_empty());
        filter.clear();
        assert!(filter.is_empty());
        assert!(!filter.contains(b"x"));
    }
}
