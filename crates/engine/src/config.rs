//! Engine configuration via `kvmodel.toml`
//!
//! Every field has a default, so an empty file (or no file) yields the
//! stock behaviour. Values are validated eagerly on load.

use std::path::Path;

use kvmodel_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Config file name looked up by applications embedding the engine.
pub const CONFIG_FILE_NAME: &str = "kvmodel.toml";

/// Engine configuration loaded from `kvmodel.toml`.
///
/// # Example
///
/// ```toml
/// default_limit = 100
/// union_cache_ttl_secs = 60
/// shard_ttl_factor = 3
/// record_ttl_factor = 3
/// shard_window_padding = 2
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Page size of a query without an explicit limit.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// TTL of a cached multi-key union, in seconds.
    #[serde(default = "default_union_cache_ttl_secs")]
    pub union_cache_ttl_secs: u64,
    /// Shard key TTL as a multiple of the model expiration.
    #[serde(default = "default_ttl_factor")]
    pub shard_ttl_factor: u64,
    /// Record hash TTL as a multiple of the model expiration.
    #[serde(default = "default_ttl_factor")]
    pub record_ttl_factor: u64,
    /// Extra shards merged into a rolling index beyond the expiration window.
    #[serde(default = "default_shard_window_padding")]
    pub shard_window_padding: u64,
}

fn default_limit() -> usize {
    100
}

fn default_union_cache_ttl_secs() -> u64 {
    60
}

fn default_ttl_factor() -> u64 {
    3
}

fn default_shard_window_padding() -> u64 {
    2
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            union_cache_ttl_secs: default_union_cache_ttl_secs(),
            shard_ttl_factor: default_ttl_factor(),
            record_ttl_factor: default_ttl_factor(),
            shard_window_padding: default_shard_window_padding(),
        }
    }
}

impl EngineConfig {
    /// Check every field.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero limit, TTL or TTL factor.
    pub fn validate(&self) -> Result<()> {
        if self.default_limit == 0 {
            return Err(Error::config("default_limit must be at least 1"));
        }
        if self.union_cache_ttl_secs == 0 {
            return Err(Error::config("union_cache_ttl_secs must be at least 1"));
        }
        if self.shard_ttl_factor == 0 {
            return Err(Error::config("shard_ttl_factor must be at least 1"));
        }
        if self.record_ttl_factor == 0 {
            return Err(Error::config("record_ttl_factor must be at least 1"));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# kvmodel engine configuration
#
# Page size of a query that does not call limit()
default_limit = 100

# Seconds a merged multi-key index (from in_ filters) stays cached
union_cache_ttl_secs = 60

# Expiring models: shard keys live shard_ttl_factor x expiration,
# record hashes live record_ttl_factor x expiration
shard_ttl_factor = 3
record_ttl_factor = 3

# Shards merged into a rolling index beyond ceil(expiration / bucket)
shard_window_padding = 2
"#
    }

    /// Parse and validate config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read or parsed, or holds
    /// an invalid value.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
