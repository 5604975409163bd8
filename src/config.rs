use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FilterError, Result};
use crate::hash::{
    capacity_for_rate, false_positive_rate, optimal_bit_vector_size,
    optimal_capacity, optimal_num_hashes, HashMethod,
};

/// Fallback false positive rate when only (size, hashes) are supplied.
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

const COUNTING_BITS: [u8; 5] = [4, 8, 16, 32, 64];

/// Filter parameters plus the remote-backend settings.
///
/// Any two of {expected_elements, size, hashes, false_positive_probability}
/// may be supplied (zero means unset); [`FilterConfig::complete`] derives
/// the rest using the standard optimality relations. Filters only accept a
/// completed configuration.
#[derive(Clone, Debug, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct FilterConfig {
    /// Expected number of elements (n). 0 = derive.
    #[builder(default = "0")]
    pub expected_elements: usize,

    /// Bit vector length (m). 0 = derive.
    #[builder(default = "0")]
    pub size: usize,

    /// Number of hash functions (k). 0 = derive.
    #[builder(default = "0")]
    pub hashes: usize,

    /// Target false positive probability (p). 0.0 = derive.
    #[builder(default = "0.0")]
    pub false_positive_probability: f64,

    #[builder(default = "HashMethod::Md5")]
    pub hash_method: HashMethod,

    /// Counter width in bits for counting filters.
    #[builder(default = "16")]
    pub counting_bits: u8,

    /// Character encoding used for element-to-bytes conversion. Only
    /// UTF-8 is accepted; the field exists for the compatibility check.
    #[builder(default = "\"UTF-8\".to_string()", setter(into))]
    pub charset: String,

    /// Dataset identifier for remote backends.
    #[builder(default, setter(into, strip_option))]
    pub name: Option<String>,

    #[builder(default = "\"localhost\".to_string()", setter(into))]
    pub redis_host: String,

    #[builder(default = "6379")]
    pub redis_port: u16,

    /// Maximum pooled connections against the remote store.
    #[builder(default = "10")]
    pub redis_connections: usize,

    /// Read replicas eligible for read-only operations.
    #[builder(default)]
    pub read_replicas: Vec<(String, u16)>,

    /// Absolute expiry (epoch seconds) re-asserted on remote keys.
    #[builder(default, setter(strip_option))]
    pub redis_expire_at: Option<u64>,

    /// Clear any pre-existing remote dataset on construction.
    #[builder(default = "false")]
    pub overwrite_if_exists: bool,

    #[builder(setter(skip), default = "false")]
    done: bool,
}

impl FilterConfig {
    /// Derives the missing members of {n, m, k, p} from the supplied ones.
    ///
    /// Completion rules, by what the caller provided:
    /// - n, p: m and k are sized optimally
    /// - n, m: k optimal, p is the achieved rate
    /// - m, k: n from the optimal-k identity at the default rate, then p
    /// - m, p: n from the optimal-k identity, then k
    /// - m, k, p: n solves p(m, n, k) = p
    /// - n, m, k: p is the achieved rate
    ///
    /// Idempotent once completed.
    pub fn complete(mut self) -> Result<Self> {
        if self.done {
            return Ok(self);
        }
        self.validate()?;

        let supplied = [
            self.expected_elements > 0,
            self.size > 0,
            self.hashes > 0,
            self.false_positive_probability > 0.0,
        ]
        .iter()
        .filter(|&&s| s)
        .count();
        if supplied < 2 {
            return Err(FilterError::InvalidConfig(
                "At least two of expected_elements, size, hashes and \
                 false_positive_probability must be provided"
                    .to_string(),
            ));
        }

        if self.size == 0 {
            if self.expected_elements == 0
                || self.false_positive_probability == 0.0
            {
                return Err(FilterError::InvalidConfig(
                    "Cannot derive the bit vector size without both \
                     expected_elements and false_positive_probability"
                        .to_string(),
                ));
            }
            self.size = optimal_bit_vector_size(
                self.expected_elements,
                self.false_positive_probability,
            );
        }

        if self.expected_elements == 0 {
            self.expected_elements = match (
                self.hashes,
                self.false_positive_probability,
            ) {
                (k, p) if k > 0 && p > 0.0 => capacity_for_rate(self.size, k, p),
                (_, p) if p > 0.0 => optimal_capacity(self.size, p),
                _ => optimal_capacity(self.size, DEFAULT_FALSE_POSITIVE_RATE),
            };
        }

        if self.hashes == 0 {
            self.hashes = optimal_num_hashes(self.expected_elements, self.size);
        }

        if self.false_positive_probability == 0.0 {
            self.false_positive_probability = false_positive_rate(
                self.hashes,
                self.size,
                self.expected_elements as f64,
            );
        }

        self.done = true;
        debug!(
            n = self.expected_elements,
            m = self.size,
            k = self.hashes,
            p = self.false_positive_probability,
            method = %self.hash_method,
            "completed filter configuration"
        );
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        let p = self.false_positive_probability;
        if p < 0.0 || p >= 1.0 {
            return Err(FilterError::InvalidConfig(format!(
                "False positive probability must be in (0, 1), got {p}"
            )));
        }
        if !COUNTING_BITS.contains(&self.counting_bits) {
            return Err(FilterError::InvalidConfig(format!(
                "Counter width must be one of {COUNTING_BITS:?}, got {}",
                self.counting_bits
            )));
        }
        let charset = self.charset.to_ascii_lowercase();
        if charset != "utf-8" && charset != "utf8" {
            return Err(FilterError::InvalidConfig(format!(
                "Unsupported charset {:?}, only UTF-8 is available",
                self.charset
            )));
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.done
    }

    /// Two filters can be combined or attached to the same dataset iff
    /// their size, hash count, hash family and charset agree.
    pub fn is_compatible_to(&self, other: &FilterConfig) -> bool {
        self.size == other.size
            && self.hashes == other.hashes
            && self.hash_method == other.hash_method
            && self.charset.eq_ignore_ascii_case(&other.charset)
    }

    pub(crate) fn require_compatibility(
        &self,
        other: &FilterConfig,
    ) -> Result<()> {
        if self.is_compatible_to(other) {
            Ok(())
        } else {
            Err(FilterError::Incompatible(format!(
                "(m={}, k={}, {}, {}) vs (m={}, k={}, {}, {})",
                self.size,
                self.hashes,
                self.hash_method,
                self.charset,
                other.size,
                other.hashes,
                other.hash_method,
                other.charset,
            )))
        }
    }

    /// The k bit positions for an element, per this configuration.
    pub fn hash(&self, item: &[u8]) -> Vec<u32> {
        self.hash_method.hash(item, self.size, self.hashes)
    }

    /// Element-to-bytes conversion for generic element types.
    pub fn to_bytes<E: ToString + ?Sized>(&self, element: &E) -> Vec<u8> {
        element.to_string().into_bytes()
    }
}
