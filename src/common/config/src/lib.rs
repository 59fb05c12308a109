//! Configuration management for Federa.
//!
//! Provides runtime configuration for datasource queries, the local
//! override cache and the background runtime.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use common_error::FederaResult;

/// Default timeout budget for datasource queries in milliseconds.
pub const DEFAULT_DATASOURCE_TIMEOUT_MS: u64 = 10_000;

/// Global Federa configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FederaConfig {
    /// Datasource query configuration.
    #[serde(default)]
    pub datasource: DatasourceConfig,
    /// Local override cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Background runtime configuration.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl FederaConfig {
    /// Parse a configuration from JSON.
    pub fn from_json_str(json: &str) -> FederaResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize this configuration to pretty JSON.
    pub fn to_json_string(&self) -> FederaResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set the datasource configuration.
    pub fn with_datasource(mut self, datasource: DatasourceConfig) -> Self {
        self.datasource = datasource;
        self
    }

    /// Set the cache configuration.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

/// Datasource query configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceConfig {
    /// Timeout budget for a single top-level query in milliseconds.
    pub timeout_ms: u64,
    /// Name of the main datasource backing the local override storage.
    pub main_datasource: Option<String>,
}

impl Default for DatasourceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_DATASOURCE_TIMEOUT_MS,
            main_datasource: None,
        }
    }
}

impl DatasourceConfig {
    /// The timeout budget as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Set the timeout budget in milliseconds.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the main datasource name.
    pub fn with_main_datasource(mut self, name: impl Into<String>) -> Self {
        self.main_datasource = Some(name.into());
        self
    }
}

/// Local override cache configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path of the persisted cache/override snapshot.
    pub path: Option<PathBuf>,
}

impl CacheConfig {
    /// Set the snapshot path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Background runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Worker threads for background searches. `None` uses the tokio default.
    pub worker_threads: Option<usize>,
}
