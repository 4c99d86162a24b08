//! ZIP/CBZ container adapter.

use crate::entry::Entry;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;
use zip::result::ZipError;

/// ZIP adapter.
///
/// Holds no open file handle. The central directory is walked (without
/// decompressing anything) once per listing, and every extraction opens a
/// fresh read session, so no mutable cursor is ever shared between
/// concurrent extraction calls.
#[derive(Debug)]
pub struct ZipContainer {
    path: PathBuf,
    password: Option<String>,
    encrypted: bool,
}

impl ZipContainer {
    pub(crate) fn open(path: &Path, password: Option<&str>) -> Result<Self> {
        let mut archive = Self::session(path)?;
        // The encryption bit lives in each entry's flags; any encrypted
        // entry marks the whole container as password protected.
        let mut encrypted = false;
        for index in 0..archive.len() {
            let record = archive.by_index_raw(index).or_raise(|| ErrorKind::ArchiveCorrupted)?;
            if record.encrypted() {
                encrypted = true;
                break;
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            password: password.map(str::to_string),
            encrypted,
        })
    }

    /// Open a fresh read session over the container file.
    fn session(path: &Path) -> Result<ZipArchive<File>> {
        let file = File::open(path).map_err(|e| Self::map_io(e, path))?;
        let archive = match ZipArchive::new(file) {
            Err(ZipError::InvalidArchive(_)) => exn::bail!(ErrorKind::ArchiveCorrupted),
            Err(ZipError::Io(io)) => return Err(Self::map_io(io, path).into()),
            other => other.or_raise(|| ErrorKind::OpenFailed)?,
        };
        Ok(archive)
    }

    fn map_io(err: std::io::Error, path: &Path) -> ErrorKind {
        match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::SourceNotFound(path.to_path_buf()),
            _ => ErrorKind::Io(err),
        }
    }

    pub(crate) fn list_entries(&self) -> Result<Vec<Entry>> {
        let mut archive = Self::session(&self.path)?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let record = archive.by_index_raw(index).or_raise(|| ErrorKind::ArchiveCorrupted)?;
            entries.push(Entry {
                path: record.name().replace('\\', "/").trim_end_matches('/').to_string(),
                is_dir: record.is_dir(),
                size: record.size(),
                compressed_size: record.compressed_size(),
            });
        }
        Ok(entries)
    }

    pub(crate) fn extract(&self, entry_path: &str) -> Result<Vec<u8>> {
        let mut archive = Self::session(&self.path)?;
        let mut reader = match &self.password {
            Some(password) => match archive.by_name_decrypt(entry_path, password.as_bytes()) {
                Err(ZipError::InvalidPassword) => exn::bail!(ErrorKind::PasswordIncorrect),
                Err(ZipError::FileNotFound) => {
                    exn::bail!(ErrorKind::EntryNotFound(entry_path.to_string()))
                },
                other => other.or_raise(|| ErrorKind::ArchiveCorrupted)?,
            },
            None => match archive.by_name(entry_path) {
                Ok(reader) if reader.encrypted() => exn::bail!(ErrorKind::PasswordRequired),
                Err(ZipError::FileNotFound) => {
                    exn::bail!(ErrorKind::EntryNotFound(entry_path.to_string()))
                },
                Err(ZipError::InvalidPassword) => exn::bail!(ErrorKind::PasswordRequired),
                Err(ZipError::UnsupportedArchive(_)) if self.encrypted => {
                    exn::bail!(ErrorKind::PasswordRequired)
                },
                other => other.or_raise(|| ErrorKind::ArchiveCorrupted)?,
            },
        };
        let mut bytes = Vec::with_capacity(usize::try_from(reader.size()).unwrap_or(0));
        reader.read_to_end(&mut bytes).or_raise(|| ErrorKind::ArchiveCorrupted)?;
        Ok(bytes)
    }

    pub(crate) fn is_password_protected(&self) -> bool {
        self.encrypted
    }
}
