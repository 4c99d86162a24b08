//! RAR/CBR container adapter.

use crate::entry::Entry;
use crate::error::{Error, ErrorKind, Result};
use std::collections::HashMap;
use std::path::Path;
use unrar::Archive;
use unrar::error::{Code, UnrarError};

/// RAR adapter.
///
/// The embedded decoder only supports forward iteration over the container,
/// so the whole archive is decoded into memory once at open; extraction is
/// then an exact-path lookup. [`close`](Self::close) drops the decoded
/// payloads and is idempotent.
#[derive(Debug)]
pub struct RarContainer {
    encrypted: bool,
    entries: Vec<Entry>,
    blobs: HashMap<String, Vec<u8>>,
}

impl RarContainer {
    pub(crate) fn open(path: &Path, password: Option<&str>) -> Result<Self> {
        // Probe without a password first: if that succeeds the container is
        // not protected and a needlessly supplied password is ignored, which
        // keeps is_password_protected free of false positives.
        match Self::decode(path, None) {
            Ok((entries, blobs)) => Ok(Self { encrypted: false, entries, blobs }),
            Err(err) if matches!(&*err, ErrorKind::PasswordRequired) => {
                let Some(password) = password else {
                    return Err(err);
                };
                let (entries, blobs) = Self::decode(path, Some(password)).map_err(|retry| {
                    // RAR4 has no stored password check; a wrong password on
                    // a known-protected container surfaces as a CRC failure.
                    let kind = match &*retry {
                        ErrorKind::PasswordRequired
                        | ErrorKind::PasswordIncorrect
                        | ErrorKind::ArchiveCorrupted => ErrorKind::PasswordIncorrect,
                        _ => ErrorKind::OpenFailed,
                    };
                    retry.raise(kind)
                })?;
                Ok(Self { encrypted: true, entries, blobs })
            },
            Err(err) => Err(err),
        }
    }

    fn decode(path: &Path, password: Option<&str>) -> Result<(Vec<Entry>, HashMap<String, Vec<u8>>)> {
        let archive = match password {
            Some(password) => Archive::with_password(path, password),
            None => Archive::new(path),
        };
        let mut cursor = archive.open_for_processing().map_err(Self::map_unrar)?;
        let mut entries = Vec::new();
        let mut blobs = HashMap::new();
        while let Some(header) = cursor.read_header().map_err(Self::map_unrar)? {
            let name = header.entry().filename.to_string_lossy().replace('\\', "/");
            let size = header.entry().unpacked_size as u64;
            let is_dir = header.entry().is_directory();
            cursor = if header.entry().is_file() {
                let (data, rest) = header.read().map_err(Self::map_unrar)?;
                blobs.insert(name.clone(), data);
                rest
            } else {
                header.skip().map_err(Self::map_unrar)?
            };
            entries.push(Entry {
                path: name,
                is_dir,
                size,
                // The decoder does not surface packed sizes.
                compressed_size: size,
            });
        }
        Ok((entries, blobs))
    }

    fn map_unrar(err: UnrarError) -> Error {
        let kind = match err.code {
            Code::MissingPassword => ErrorKind::PasswordRequired,
            Code::BadPassword => ErrorKind::PasswordIncorrect,
            Code::BadData | Code::BadArchive | Code::UnknownFormat => ErrorKind::ArchiveCorrupted,
            _ => ErrorKind::OpenFailed,
        };
        Error::from(kind)
    }

    pub(crate) fn list_entries(&self) -> Result<Vec<Entry>> {
        Ok(self.entries.clone())
    }

    pub(crate) fn extract(&self, entry_path: &str) -> Result<Vec<u8>> {
        match self.blobs.get(entry_path) {
            Some(bytes) => Ok(bytes.clone()),
            None => exn::bail!(ErrorKind::EntryNotFound(entry_path.to_string())),
        }
    }

    pub(crate) fn is_password_protected(&self) -> bool {
        self.encrypted
    }

    pub(crate) fn close(&mut self) {
        self.blobs = HashMap::new();
    }
}
