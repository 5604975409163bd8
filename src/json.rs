use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bitset::BitSet;
use crate::config::FilterConfigBuilder;
use crate::counting::CountingBloomFilter;
use crate::error::{FilterError, Result};
use crate::filter::BloomFilter;
use crate::hash::HashMethod;

/// Wire format shared with other filter implementations: the bit array is
/// base64 over the most-significant-bit-first byte packing.
#[derive(Serialize, Deserialize)]
struct Envelope {
    size: usize,
    hashes: usize,
    #[serde(rename = "HashMethod")]
    hash_method: HashMethod,
    bits: String,
}

fn envelope(
    size: usize,
    hashes: usize,
    hash_method: HashMethod,
    bits: &BitSet,
) -> Result<Value> {
    let envelope = Envelope {
        size,
        hashes,
        hash_method,
        bits: BASE64.encode(bits.to_bytes()),
    };
    Ok(serde_json::to_value(envelope)?)
}

/// Serializes a Bloom filter to its JSON representation.
pub fn to_json(filter: &BloomFilter) -> Result<Value> {
    let config = filter.config();
    envelope(config.size, config.hashes, config.hash_method, filter.bit_set())
}

/// Serializes a counting filter as a plain (non-counting) filter; the
/// counters are not part of the interchange format.
pub fn counting_to_json(filter: &CountingBloomFilter) -> Result<Value> {
    let config = filter.config();
    let bits = filter.bit_set_snapshot()?;
    envelope(config.size, config.hashes, config.hash_method, &bits)
}

/// Reconstructs a non-counting Bloom filter from its JSON representation.
pub fn from_json(source: &Value) -> Result<BloomFilter> {
    let envelope: Envelope = serde_json::from_value(source.clone())?;
    let config = FilterConfigBuilder::default()
        .size(envelope.size)
        .hashes(envelope.hashes)
        .hash_method(envelope.hash_method)
        .build()
        .map_err(|e| FilterError::InvalidConfig(e.to_string()))?
        .complete()?;

    let bytes = BASE64
        .decode(&envelope.bits)
        .map_err(|e| FilterError::Serialization(e.to_string()))?;
    let bits = BitSet::from_bytes(&bytes, envelope.size);
    Ok(BloomFilter::with_bits(config, bits))
}
