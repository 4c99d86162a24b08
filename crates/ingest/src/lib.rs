//! Source ingestion pipeline.
//!
//! Orchestrates an "open source" request end to end: cache lookup, container
//! or directory enumeration, folder-tree construction, an immediate bounded
//! initial slice for the caller, and throttled background streaming of the
//! remainder — all cancellable through an explicit [`ScanCoordinator`].
//!
//! Progress is reported over a message channel passed into the open call;
//! there are no global listener registries. For one token, `Progress` events
//! are strictly increasing in `processed`, and `Complete`, when emitted, is
//! the final event.

pub mod coordinator;
pub mod error;
mod events;
mod ingestor;
mod walk;

pub use crate::coordinator::{CompletionGuard, ScanCoordinator, ScanToken};
pub use crate::events::{ScanComplete, ScanEvent, ScanProgress};
pub use crate::ingestor::{Ingestor, OpenSource, ScanTuning};
