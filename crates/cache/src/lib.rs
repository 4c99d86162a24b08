//! SQLite scan cache.
//!
//! Stores the flat image list produced by a completed container enumeration,
//! keyed by source path and captured modification time. The cache is never
//! the source of truth: a stale, unreadable, or version-mismatched row is
//! deleted on sight and the caller re-enumerates. A broken cache must never
//! block ingestion, so every failure mode here degrades to a miss.

mod db;
pub mod error;
mod repo;

pub use crate::db::Database;
pub use crate::repo::{CACHE_VERSION, DEFAULT_CAPACITY, ScanCache};
