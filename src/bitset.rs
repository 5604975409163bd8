use bitvec::prelude::*;

/// A fixed-size bit vector with the byte serialization used across the
/// crate: bit `i` lives at bit `7 - (i % 8)` of byte `i / 8`, i.e. the
/// most significant bit first within each byte. The `Msb0` ordering makes
/// the raw slice exactly that layout, so snapshots and the remote
/// backend's byte strings are interchangeable without shuffling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitSet {
    bits: BitVec<u8, Msb0>,
}

impl BitSet {
    pub fn new(size: usize) -> Self {
        Self {
            bits: BitVec::repeat(false, size),
        }
    }

    /// Reconstructs a bit set of `size` bits from its byte serialization.
    /// Surplus trailing bits are dropped, missing bytes read as zero.
    pub fn from_bytes(bytes: &[u8], size: usize) -> Self {
        let mut bits = BitVec::<u8, Msb0>::from_slice(bytes);
        bits.resize(size, false);
        Self { bits }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.as_raw_slice().to_vec()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    pub fn get(&self, index: usize) -> bool {
        self.bits[index]
    }

    /// Sets a bit, returning whether it was previously unset.
    pub fn set(&mut self, index: usize) -> bool {
        let was_set = self.bits.replace(index, true);
        !was_set
    }

    pub fn clear_bit(&mut self, index: usize) {
        self.bits.set(index, false);
    }

    pub fn clear(&mut self) {
        self.bits.fill(false);
    }

    /// Number of set bits.
    pub fn cardinality(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn union_with(&mut self, other: &BitSet) {
        self.bits |= other.bits.as_bitslice();
    }

    pub fn intersect_with(&mut self, other: &BitSet) {
        self.bits &= other.bits.as_bitslice();
    }
}
