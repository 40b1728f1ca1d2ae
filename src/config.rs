//! Configuration for AtlasTS
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AtlasError, Result};

/// Main configuration for an AtlasTS instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files (WAL segments, TSM files)
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal/             (WAL segments)
    ///     └── tsm/             (TSM files and tombstones)
    pub data_dir: PathBuf,

    /// Maximum points per TSM block
    pub max_points_per_block: usize,

    /// Size at which a compaction output is split (at a series boundary)
    pub max_file_size: u64,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how appends reach stable storage
    pub wal_sync_strategy: WalSyncStrategy,

    /// Segment size at which the WAL rolls to a new file (in bytes)
    pub wal_segment_size: u64,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Number of cache shards (power of two)
    pub cache_shards: usize,

    /// Hard memory limit for cached points (in bytes)
    pub cache_max_memory: usize,

    /// Cache size that triggers a snapshot flush (in bytes)
    pub cache_snapshot_size: usize,

    /// What a write does when the cache is over its limit
    pub backpressure: Backpressure,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Run the background compactor (flushes and merges)
    pub background_compaction: bool,

    /// Number of compaction worker threads
    pub compaction_workers: usize,

    /// Number of same-level files that triggers a merge into the next level
    pub level_file_threshold: usize,

    /// Maximum input files for a single compaction job
    pub max_compaction_input_files: usize,

    /// How often the scheduler looks for work when not triggered
    pub compaction_check_interval: Duration,

    /// Delay before a failed compaction is planned again
    pub compaction_retry_backoff: Duration,

    /// Write-idle time after which the store is fully compacted
    pub full_compaction_cold_after: Option<Duration>,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// Concurrent appenders share a single fsync
    GroupCommit,
}

/// Behaviour of a write when the cache is over `cache_max_memory`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// Fail the write immediately with `AtlasError::CacheFull`
    Reject,

    /// Wait for a flush to free memory, up to `timeout`
    Block { timeout: Duration },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlasts_data"),
            max_points_per_block: 1000,
            max_file_size: 256 * 1024 * 1024, // 256 MB
            wal_sync_strategy: WalSyncStrategy::GroupCommit,
            wal_segment_size: 10 * 1024 * 1024, // 10 MB
            cache_shards: 16,
            cache_max_memory: 1024 * 1024 * 1024, // 1 GB
            cache_snapshot_size: 25 * 1024 * 1024, // 25 MB
            backpressure: Backpressure::Block {
                timeout: Duration::from_secs(10),
            },
            background_compaction: true,
            compaction_workers: 2,
            level_file_threshold: 4,
            max_compaction_input_files: 16,
            compaction_check_interval: Duration::from_secs(1),
            compaction_retry_backoff: Duration::from_secs(5),
            full_compaction_cold_after: Some(Duration::from_secs(4 * 60 * 60)),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache_shards == 0 || !self.cache_shards.is_power_of_two() {
            return Err(AtlasError::Config(format!(
                "cache_shards must be a non-zero power of two, got {}",
                self.cache_shards
            )));
        }
        if self.max_points_per_block == 0 {
            return Err(AtlasError::Config(
                "max_points_per_block must be greater than zero".to_string(),
            ));
        }
        if self.cache_snapshot_size > self.cache_max_memory {
            return Err(AtlasError::Config(format!(
                "cache_snapshot_size ({}) exceeds cache_max_memory ({})",
                self.cache_snapshot_size, self.cache_max_memory
            )));
        }
        if self.compaction_workers == 0 {
            return Err(AtlasError::Config(
                "compaction_workers must be greater than zero".to_string(),
            ));
        }
        if self.level_file_threshold < 2 {
            return Err(AtlasError::Config(
                "level_file_threshold must be at least 2".to_string(),
            ));
        }
        if self.max_compaction_input_files < 2 {
            return Err(AtlasError::Config(
                "max_compaction_input_files must be at least 2".to_string(),
            ));
        }
        if self.wal_segment_size == 0 || self.max_file_size == 0 {
            return Err(AtlasError::Config(
                "segment and file sizes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory holding WAL segments
    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir.join("wal")
    }

    /// Directory holding TSM files
    pub fn tsm_dir(&self) -> PathBuf {
        self.data_dir.join("tsm")
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

    /// Set the WAL segment size (in bytes)
    pub fn wal_segment_size(mut self, size: u64) -> Self {
        self.config.wal_segment_size = size;
        self
    }

    /// Set the number of cache shards
    pub fn cache_shards(mut self, shards: usize) -> Self {
        self.config.cache_shards = shards;
        self
    }

    /// Set the cache memory limit (in bytes)
    pub fn cache_max_memory(mut self, size: usize) -> Self {
        self.config.cache_max_memory = size;
        self
    }

    /// Set the cache size that triggers a flush (in bytes)
    pub fn cache_snapshot_size(mut self, size: usize) -> Self {
        self.config.cache_snapshot_size = size;
        self
    }

    /// Set the backpressure behaviour
    pub fn backpressure(mut self, backpressure: Backpressure) -> Self {
        self.config.backpressure = backpressure;
        self
    }

    /// Set the maximum number of points per TSM block
    pub fn max_points_per_block(mut self, count: usize) -> Self {
        self.config.max_points_per_block = count;
        self
    }

    /// Set the compaction output split size (in bytes)
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.config.max_file_size = size;
        self
    }

    /// Enable or disable the background compactor
    pub fn background_compaction(mut self, enabled: bool) -> Self {
        self.config.background_compaction = enabled;
        self
    }

    /// Set the number of compaction workers
    pub fn compaction_workers(mut self, count: usize) -> Self {
        self.config.compaction_workers = count;
        self
    }

    /// Set the per-level file count that triggers a merge
    pub fn level_file_threshold(mut self, count: usize) -> Self {
        self.config.level_file_threshold = count;
        self
    }

    /// Set the maximum input files per compaction job
    pub fn max_compaction_input_files(mut self, count: usize) -> Self {
        self.config.max_compaction_input_files = count;
        self
    }

    /// Set the scheduler poll interval
    pub fn compaction_check_interval(mut self, interval: Duration) -> Self {
        self.config.compaction_check_interval = interval;
        self
    }

    /// Set the retry delay for failed compactions
    pub fn compaction_retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.compaction_retry_backoff = backoff;
        self
    }

    /// Set the idle time before an automatic full compaction (None disables it)
    pub fn full_compaction_cold_after(mut self, after: Option<Duration>) -> Self {
        self.config.full_compaction_cold_after = after;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
