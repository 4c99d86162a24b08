//! Container dispatch over the closed set of supported formats.
//!
//! New formats are added by adding a variant here and an adapter module next
//! to the existing ones, not by implementing a trait somewhere else.

mod rar;
mod zip;

pub use self::rar::RarContainer;
pub use self::zip::ZipContainer;
use crate::entry::{ContainerFormat, Entry};
use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use std::path::Path;

/// An opened archive container.
///
/// Uniform capability surface across formats: open, close, list every raw
/// entry, extract one entry's bytes, and report password protection.
#[derive(Debug)]
pub enum Container {
    Zip(ZipContainer),
    Rar(RarContainer),
}

impl Container {
    /// Open the container at `path`, detecting the format from its
    /// extension.
    ///
    /// Fails with [`ErrorKind::SourceNotFound`] for a missing path,
    /// [`ErrorKind::UnsupportedFormat`] when no adapter exists for the
    /// extension (7z and TAR included), and [`ErrorKind::PasswordRequired`]
    /// when decoding needs a password that was not supplied.
    pub fn open(path: impl AsRef<Path>, password: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            exn::bail!(ErrorKind::SourceNotFound(path.to_path_buf()));
        }
        let format = ContainerFormat::from_path(path)
            .ok_or_raise(|| ErrorKind::UnsupportedFormat(extension_of(path)))?;
        tracing::debug!(path = %path.display(), %format, "opening container");
        match format {
            ContainerFormat::Zip => Ok(Self::Zip(ZipContainer::open(path, password)?)),
            ContainerFormat::Rar => Ok(Self::Rar(RarContainer::open(path, password)?)),
            unsupported => exn::bail!(ErrorKind::UnsupportedFormat(unsupported.to_string())),
        }
    }

    pub fn format(&self) -> ContainerFormat {
        match self {
            Self::Zip(_) => ContainerFormat::Zip,
            Self::Rar(_) => ContainerFormat::Rar,
        }
    }

    /// Release any temporary extraction state. Idempotent.
    pub fn close(&mut self) {
        match self {
            // The ZIP adapter keeps nothing open between calls.
            Self::Zip(_) => {},
            Self::Rar(rar) => rar.close(),
        }
    }

    /// Enumerate every record in the container, directories included.
    pub fn list_entries(&self) -> Result<Vec<Entry>> {
        match self {
            Self::Zip(zip) => zip.list_entries(),
            Self::Rar(rar) => rar.list_entries(),
        }
    }

    /// Extract one entry's bytes by its exact in-container path.
    pub fn extract_entry(&self, entry_path: &str) -> Result<Vec<u8>> {
        match self {
            Self::Zip(zip) => zip.extract(entry_path),
            Self::Rar(rar) => rar.extract(entry_path),
        }
    }

    /// Best-effort password detection: false negatives are possible, false
    /// positives are not.
    pub fn is_password_protected(&self) -> bool {
        match self {
            Self::Zip(zip) => zip.is_password_protected(),
            Self::Rar(rar) => rar.is_password_protected(),
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension().map_or_else(|| "(none)".to_string(), |ext| ext.to_string_lossy().to_string())
}
