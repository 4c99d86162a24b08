//! Ingest Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use folio_catalog::SourceId;
use std::io::Error as IoError;
use std::path::PathBuf;

/// An ingest error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for ingest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Failures during an open are fatal and surface as one of these; failures
/// during background enumeration never do — they are logged and the failing
/// subtree is skipped. Cache failures are invisible here by design.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The requested source path does not exist.
    #[display("source not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The source is a container of a format with no adapter.
    #[display("unsupported source format: {_0}")]
    Unsupported(#[error(not(source))] String),
    /// The container's structure is unreadable.
    #[display("source is corrupted")]
    Corrupted,
    /// The container needs a password and none was supplied.
    #[display("source requires a password")]
    PasswordRequired,
    /// The supplied password does not decrypt the container.
    #[display("source password is incorrect")]
    PasswordIncorrect,
    /// The requested image does not exist within the source.
    #[display("entry not found: {_0}")]
    EntryNotFound(#[error(not(source))] String),
    /// The operating system denied access to the source path.
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// The source id refers to no open source.
    #[display("source is not open: {_0}")]
    SourceClosed(#[error(not(source))] SourceId),
    /// A container operation failed; details are in the child error.
    #[display("container reader error")]
    Reader,
    /// A blocking worker task failed to run to completion.
    #[display("background task failed")]
    Task,
    /// Underlying I/O error.
    #[display("I/O error: {_0}")]
    Io(IoError),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Task)
    }
}
