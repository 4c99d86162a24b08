//! Archive container adapters.
//!
//! One capability surface over a closed set of formats: ZIP/CBZ (streaming,
//! a fresh read session per extraction) and RAR/CBR (decoded into memory
//! once at open). 7z and TAR are recognized but declared unsupported.
//!
//! Everything here is synchronous; async callers are expected to wrap calls
//! in `spawn_blocking` the same way the ingestor does.

pub mod container;
mod entry;
pub mod error;

pub use crate::container::Container;
pub use crate::entry::{ContainerFormat, Entry};
