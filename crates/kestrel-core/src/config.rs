//! Engine configuration
//!
//! All sections deserialize with defaults, so a partial JSON document (or none
//! at all) yields a usable configuration:
//!
//! ```json
//! { "pool": { "min_shared_size": 16 }, "locks": { "enabled": false } }
//! ```

use crate::storage::records::DYNAMIC_DATA_SIZE;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Record store files
    pub store: StoreConfig,
    /// Cursor pooling
    pub pool: PoolConfig,
    /// Short-lived entity locks
    pub locks: LockConfig,
    /// Relationship count at which the fixture writer converts a node to dense storage
    pub dense_node_threshold: usize,
}

/// Record store file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Initial size of each store file in bytes
    pub initial_file_size: usize,
    /// Payload bytes per dynamic record. Fixed by the record format.
    pub dynamic_record_data_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_file_size: 1024 * 1024, // 1MB
            dynamic_record_data_size: DYNAMIC_DATA_SIZE,
        }
    }
}

/// Cursor pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Cursors retained by the shared tier; extra releases are discarded
    pub min_shared_size: usize,
    /// Keep one cursor per thread in front of the shared tier
    pub enable_thread_local: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_shared_size: 8,
            enable_thread_local: true,
        }
    }
}

/// Entity lock settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Use row locks; when false the no-op lock service is installed
    pub enabled: bool,
    /// How long a read lock waits for a conflicting writer
    pub read_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            read_timeout_ms: 5_000,
        }
    }
}

impl LockConfig {
    /// Read lock timeout as a duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Reject values the record format or the pool cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.store.initial_file_size == 0 {
            return Err(Error::config("store.initial_file_size must be > 0"));
        }
        if self.store.dynamic_record_data_size != DYNAMIC_DATA_SIZE {
            return Err(Error::config(format!(
                "store.dynamic_record_data_size is fixed at {} by the record format, got {}",
                DYNAMIC_DATA_SIZE, self.store.dynamic_record_data_size
            )));
        }
        if self.pool.min_shared_size == 0 {
            return Err(Error::config("pool.min_shared_size must be > 0"));
        }
        if self.dense_node_threshold == 0 {
            return Err(Error::config("dense_node_threshold must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            pool: PoolConfig::default(),
            locks: LockConfig::default(),
            dense_node_threshold: 50,
        }
    }
}
