//! Error types for AtlasTS
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using AtlasError
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Unified error type for AtlasTS operations
#[derive(Debug, Error)]
pub enum AtlasError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Write Path Errors
    // -------------------------------------------------------------------------
    /// Rejected input (type conflict, malformed key, timestamp overflow).
    /// Nothing was written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The WAL append or fsync failed; the write was not acknowledged.
    #[error("Durability error: {0}")]
    Durability(String),

    #[error("Cache full: {used} bytes in use, limit {limit}")]
    CacheFull { used: usize, limit: usize },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Compaction Errors
    // -------------------------------------------------------------------------
    #[error("Compaction failed ({kind:?}): {message}")]
    Compaction {
        kind: CompactionErrorKind,
        message: String,
    },

    #[error("Operation aborted")]
    Aborted,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Engine is closed")]
    Closed,
}

/// How a failed compaction job should be handled by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionErrorKind {
    /// Transient I/O failure, retry after backoff
    Io,
    /// An input file is unreadable; quarantine it and re-plan
    Corruption,
    /// Cancelled by shutdown or a delete, re-plan later
    Aborted,
}

impl AtlasError {
    /// Classify an error raised while running a compaction job
    pub fn compaction_kind(&self) -> CompactionErrorKind {
        match self {
            AtlasError::Corruption(_) => CompactionErrorKind::Corruption,
            AtlasError::Aborted => CompactionErrorKind::Aborted,
            AtlasError::Compaction { kind, .. } => *kind,
            _ => CompactionErrorKind::Io,
        }
    }
}

impl From<bincode::Error> for AtlasError {
    fn from(e: bincode::Error) -> Self {
        AtlasError::Serialization(e.to_string())
    }
}
