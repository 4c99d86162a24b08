//! Reader Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A reader error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for reader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally. Password failures are kept separate from corruption so the
/// caller can re-prompt instead of declaring the source unreadable.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The container file does not exist.
    #[display("source not found: {}", _0.display())]
    SourceNotFound(#[error(not(source))] PathBuf),
    /// The extension maps to no (implemented) container format.
    #[display("unsupported container format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// The decoder failed to open the container for a reason other than
    /// corruption; the underlying error is attached as a child.
    #[display("failed to open container")]
    OpenFailed,
    /// The container's structure (headers, central directory) is unreadable.
    #[display("archive is corrupted")]
    ArchiveCorrupted,
    /// Decoding requires a password and none was supplied.
    #[display("archive requires a password")]
    PasswordRequired,
    /// A password was supplied but does not decrypt the archive.
    #[display("archive password is incorrect")]
    PasswordIncorrect,
    /// The requested entry does not exist in the container.
    #[display("entry not found: {_0}")]
    EntryNotFound(#[error(not(source))] String),
    /// Underlying I/O error.
    #[display("I/O error: {_0}")]
    Io(IoError),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
