//! Flush and compaction integration tests
