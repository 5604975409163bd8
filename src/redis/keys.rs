use std::collections::HashMap;

use redis::Commands;

use crate::config::{FilterConfig, FilterConfigBuilder};
use crate::error::{FilterError, Result};
use crate::redis::pool::RedisPool;

/// Key layout for a remote dataset named `N`:
/// - `N`        configuration snapshot (hash of parameter name -> value)
/// - `N:bits`   the bit array, stored as a byte string
/// - `N:counts` the counters (hash of 4-byte big-endian position -> count)
pub struct RedisKeys {
    pub config_key: String,
    pub bits_key: String,
    pub counts_key: String,
}

impl RedisKeys {
    pub fn new(name: &str) -> Self {
        Self {
            config_key: name.to_string(),
            bits_key: format!("{name}:bits"),
            counts_key: format!("{name}:counts"),
        }
    }

    /// Writes the configuration snapshot for a fresh dataset, or checks
    /// the requested parameters against an existing snapshot when
    /// reattaching. Returns the authoritative configuration: the stored
    /// parameters when attaching to an existing dataset, the requested
    /// ones otherwise.
    pub fn persist_config(
        &self,
        pool: &RedisPool,
        config: &FilterConfig,
    ) -> Result<FilterConfig> {
        let stored: HashMap<String, String> =
            pool.with_connection(|conn| conn.hgetall(&self.config_key))?;

        if stored.is_empty() || config.overwrite_if_exists {
            let entries = [
                ("expectedElements", config.expected_elements.to_string()),
                ("size", config.size.to_string()),
                ("hashes", config.hashes.to_string()),
                (
                    "falsePositiveProbability",
                    config.false_positive_probability.to_string(),
                ),
                ("hashMethod", config.hash_method.to_string()),
                ("countingBits", config.counting_bits.to_string()),
                ("charset", config.charset.clone()),
            ];
            let _: () = pool.with_connection(|conn| {
                conn.hset_multiple(&self.config_key, &entries)
            })?;
            return Ok(config.clone());
        }

        let attached = self.parse_snapshot(&stored, config)?;
        config.require_compatibility(&attached)?;
        Ok(attached)
    }

    /// Rebuilds a configuration from a stored snapshot, carrying over the
    /// caller's connection settings (which are not part of the snapshot).
    fn parse_snapshot(
        &self,
        stored: &HashMap<String, String>,
        requested: &FilterConfig,
    ) -> Result<FilterConfig> {
        fn field<'a>(
            stored: &'a HashMap<String, String>,
            name: &str,
        ) -> Result<&'a str> {
            stored.get(name).map(String::as_str).ok_or_else(|| {
                FilterError::Serialization(format!(
                    "Stored filter configuration is missing {name}"
                ))
            })
        }
        fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
            value.parse().map_err(|_| {
                FilterError::Serialization(format!(
                    "Stored filter configuration has invalid {name}: {value}"
                ))
            })
        }

        let builder = FilterConfigBuilder::default()
            .expected_elements(parse(
                "expectedElements",
                field(stored, "expectedElements")?,
            )?)
            .size(parse("size", field(stored, "size")?)?)
            .hashes(parse("hashes", field(stored, "hashes")?)?)
            .false_positive_probability(parse(
                "falsePositiveProbability",
                field(stored, "falsePositiveProbability")?,
            )?)
            .hash_method(field(stored, "hashMethod")?.parse()?)
            .counting_bits(parse("countingBits", field(stored, "countingBits")?)?)
            .charset(field(stored, "charset")?)
            .redis_host(requested.redis_host.clone())
            .redis_port(requested.redis_port)
            .redis_connections(requested.redis_connections)
            .read_replicas(requested.read_replicas.clone());

        let builder = match &requested.name {
            Some(name) => builder.name(name.clone()),
            None => builder,
        };
        let builder = match requested.redis_expire_at {
            Some(ts) => builder.redis_expire_at(ts),
            None => builder,
        };

        builder
            .build()
            .map_err(|e| FilterError::Serialization(e.to_string()))?
            .complete()
    }
}
