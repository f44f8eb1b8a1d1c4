use crate::ttl::{Ttl, parse_optional_ttl};
use crate::{Result, WeedError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: u64 = 512 * 1024;
pub const MAX_CHUNK_SIZE: u64 = 1024 * 1024;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Comma separated directory seeds, tried in order
    pub seeds: String,
    #[serde(default = "default_replication")]
    pub replication: String,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub data_center: Option<String>,
    #[serde(default)]
    pub rack: Option<String>,
    /// Split threshold in bytes. Zero disables chunked uploads.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Empty disables TTL on created objects.
    #[serde(default = "default_ttl")]
    pub default_ttl: String,
    #[serde(default = "default_location_cache_ttl_secs")]
    pub location_cache_ttl_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
}

fn default_replication() -> String {
    "000".to_string()
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_chunk_size() -> u64 {
    MAX_CHUNK_SIZE
}

fn default_ttl() -> String {
    "26w".to_string()
}

fn default_location_cache_ttl_secs() -> u64 {
    600
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_pool_max_idle_per_host() -> usize {
    1024
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            seeds: "localhost:9333".to_string(),
            replication: default_replication(),
            collection: None,
            data_center: None,
            rack: None,
            chunk_size: default_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            default_ttl: default_ttl(),
            location_cache_ttl_secs: default_location_cache_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
        }
    }
}

impl ClientConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("WEEDIO"))
            .build()
            .map_err(|e| WeedError::Config(e.to_string()))?;

        let config: ClientConfig = settings
            .try_deserialize()
            .map_err(|e| WeedError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.seed_list().is_empty() {
            return Err(WeedError::Config("seeds cannot be empty".to_string()));
        }

        self.ttl()
            .map_err(|e| WeedError::Config(format!("default_ttl: {}", e)))?;

        Ok(())
    }

    pub fn seed_list(&self) -> Vec<String> {
        parse_seeds(&self.seeds)
    }

    pub fn ttl(&self) -> Result<Option<Ttl>> {
        parse_optional_ttl(&self.default_ttl)
    }

    pub fn location_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.location_cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Clamp a requested chunk size to `max_chunk_size`. Zero picks the configured default.
    pub fn effective_chunk_size(&self, hint: Option<u64>) -> u64 {
        let requested = match hint {
            Some(0) | None => self.chunk_size,
            Some(size) => size,
        };

        if self.max_chunk_size > 0 && requested > self.max_chunk_size {
            tracing::warn!(
                "chunk size {} is too large, use {} instead",
                requested,
                self.max_chunk_size
            );
            return self.max_chunk_size;
        }

        requested
    }
}

/// Split a comma separated seed list, dropping blanks.
pub fn parse_seeds(seeds: &str) -> Vec<String> {
    seeds
        .split(',')
        .map(str::trim)
        .filter(|seed| !seed.is_empty())
        .map(str::to_string)
        .collect()
}
