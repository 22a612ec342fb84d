//! Configuration for StampKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KvError, Result};

/// Main configuration for a StampKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the durable table
    /// Internal structure:
    ///   {data_dir}/
    ///     └── wal.log          (write-ahead log, periodically checkpointed)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// WAL size (in bytes) after which the log is rewritten as a snapshot
    pub wal_checkpoint_threshold: u64,

    // -------------------------------------------------------------------------
    // Read Configuration
    // -------------------------------------------------------------------------
    /// Rows fetched per underlying scan when a list does not specify a batch size
    pub default_batch_size: usize,

    // -------------------------------------------------------------------------
    // Request Limits
    // -------------------------------------------------------------------------
    pub limits: Limits,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// Policy limits enforced before any storage access
#[derive(Debug, Clone)]
pub struct Limits {
    /// Largest encoded key accepted by a mutation or check
    pub max_write_key_size: usize,

    /// Largest encoded key accepted by a read (one larger than writes so a
    /// range end just past a maximal key is still expressible)
    pub max_read_key_size: usize,

    /// Largest encoded value
    pub max_value_size: usize,

    /// Checks per atomic write
    pub max_checks: usize,

    /// Mutations per atomic write
    pub max_mutations: usize,

    /// Sum of key and value sizes across an atomic write
    pub max_total_mutation_size: usize,

    /// Ranges per snapshot read
    pub max_read_ranges: usize,

    /// Entries per range (and per list batch)
    pub max_read_entries: usize,

    /// Longest delay an enqueued message may carry
    pub max_queue_delay_ms: u64,

    /// Entries in a message's backoff schedule
    pub max_queue_backoff_intervals: usize,

    /// Longest single backoff interval
    pub max_queue_backoff_interval_ms: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_write_key_size: 2048,
            max_read_key_size: 2049,
            max_value_size: 65536,
            max_checks: 100,
            max_mutations: 1000,
            max_total_mutation_size: 800 * 1024,
            max_read_ranges: 10,
            max_read_entries: 1000,
            max_queue_delay_ms: 30 * 24 * 60 * 60 * 1000, // 30 days
            max_queue_backoff_intervals: 10,
            max_queue_backoff_interval_ms: 60 * 60 * 1000, // 1 hour
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./stampkv_data"),
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            wal_checkpoint_threshold: 64 * 1024 * 1024, // 64 MB
            default_batch_size: 100,
            limits: Limits::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings that contradict each other
    pub fn validate(&self) -> Result<()> {
        if self.default_batch_size == 0 || self.default_batch_size > self.limits.max_read_entries {
            return Err(KvError::Config(format!(
                "default_batch_size must be between 1 and {}, got {}",
                self.limits.max_read_entries, self.default_batch_size
            )));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(KvError::Config(
                "wal_sync_strategy EveryNEntries needs a count of at least 1".to_string(),
            ));
        }
        if self.limits.max_read_key_size < self.limits.max_write_key_size {
            return Err(KvError::Config(format!(
                "max_read_key_size ({}) is smaller than max_write_key_size ({})",
                self.limits.max_read_key_size, self.limits.max_write_key_size
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the WAL checkpoint threshold (in bytes)
    pub fn wal_checkpoint_threshold(mut self, bytes: u64) -> Self {
        self.config.wal_checkpoint_threshold = bytes;
        self
    }

    /// Set the default list batch size
    pub fn default_batch_size(mut self, size: usize) -> Self {
        self.config.default_batch_size = size;
        self
    }

    /// Replace the request limits
    pub fn limits(mut self, limits: Limits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
