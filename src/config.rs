use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::StoreError;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SemstoreConfig {
    pub server: ServerConfig,
    pub sparql: SparqlConfig,
    pub cache: CacheConfig,
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SparqlConfig {
    pub query_endpoint: String,
    pub update_endpoint: String,
    pub graph_name: String,
    pub user: String,
    pub password: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_ms: u64,
    pub max_size: usize,
    /// Period of the background cleanup task. `0` disables it.
    pub cleanup_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub dimension: usize,
    /// Truncate or zero-pad stored embeddings whose length differs from `dimension`.
    pub adjust_mismatched: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for SparqlConfig {
    fn default() -> Self {
        Self {
            query_endpoint: "http://localhost:3030/semstore/query".into(),
            update_endpoint: "http://localhost:3030/semstore/update".into(),
            graph_name: "http://example.org/semstore/memory".into(),
            user: "admin".into(),
            password: "admin".into(),
            timeout_ms: 30_000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 300_000,
            max_size: 1000,
            cleanup_interval_ms: 60_000,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: 768,
            adjust_mismatched: true,
        }
    }
}

impl SparqlConfig {
    /// Build the validated endpoint pair. Fails on empty URLs.
    pub fn endpoint(&self) -> Result<SparqlEndpoint, StoreError> {
        SparqlEndpoint::new(&self.query_endpoint, &self.update_endpoint)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_ms > 0).then(|| Duration::from_millis(self.cleanup_interval_ms))
    }
}

/// Query and update URLs of a SPARQL 1.1 protocol service.
///
/// Both URLs are validated once here; the executor never re-checks them per call.
/// They may be identical when the store serves both operations on one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparqlEndpoint {
    query: String,
    update: String,
}

impl SparqlEndpoint {
    pub fn new(query: impl Into<String>, update: impl Into<String>) -> Result<Self, StoreError> {
        let query = query.into().trim().to_string();
        let update = update.into().trim().to_string();
        if query.is_empty() {
            return Err(StoreError::Config("query endpoint must not be empty".into()));
        }
        if update.is_empty() {
            return Err(StoreError::Config("update endpoint must not be empty".into()));
        }
        Ok(Self { query, update })
    }

    /// One URL for both queries and updates.
    pub fn single(url: impl Into<String>) -> Result<Self, StoreError> {
        let url = url.into();
        Self::new(url.clone(), url)
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn update(&self) -> &str {
        &self.update
    }
}

/// Returns `~/.semstore/`
pub fn default_semstore_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".semstore")
}

/// Returns the default config file path: `~/.semstore/config.toml`
pub fn default_config_path() -> PathBuf {
    default_semstore_dir().join("config.toml")
}

impl SemstoreConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            SemstoreConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        let overrides: [(&str, &mut String); 6] = [
            ("SEMSTORE_QUERY_ENDPOINT", &mut self.sparql.query_endpoint),
            ("SEMSTORE_UPDATE_ENDPOINT", &mut self.sparql.update_endpoint),
            ("SEMSTORE_GRAPH", &mut self.sparql.graph_name),
            ("SEMSTORE_USER", &mut self.sparql.user),
            ("SEMSTORE_PASSWORD", &mut self.sparql.password),
            ("SEMSTORE_LOG_LEVEL", &mut self.server.log_level),
        ];
        for (var, slot) in overrides {
            if let Ok(val) = std::env::var(var) {
                *slot = val;
            }
        }
    }
}
