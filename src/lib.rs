//! # AtlasTS
//!
//! An embedded time-series storage engine with:
//! - A segmented Write-Ahead Log (WAL) for durability
//! - A sharded in-memory write cache
//! - Immutable, compressed TSM files with tombstones
//! - Leveled background compaction
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │          write / write_batch / query / delete_range         │
//! └──────┬──────────────────────┬───────────────────────┬───────┘
//!        │ append               │ insert / read         │ read
//!        ▼                      ▼                       ▼
//!   ┌─────────────┐      ┌─────────────┐  flush  ┌─────────────┐
//!   │     WAL     │      │    Cache    │────────►│  FileStore  │
//!   │ (segments)  │      │  (sharded)  │         │ (TSM files) │
//!   └─────────────┘      └─────────────┘         └──────┬──────┘
//!          ▲  retire                                    │
//!          └──────────────── Compactor ◄────────────────┘
//!                       (scheduler + workers)
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod point;
pub mod series;

pub mod wal;
pub mod cache;
pub mod storage;
pub mod compaction;
pub mod query;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AtlasError, Result};
pub use config::{Backpressure, Config, WalSyncStrategy};
pub use engine::{Engine, EngineStats};
pub use point::{Point, Precision, TimeRange, Value, ValueType};
pub use series::{Predicate, SeriesKey};
pub use query::{QueryResult, SeriesCursor};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasTS
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
