use crate::coordinator::{ScanCoordinator, ScanToken};
use crate::error::{Error, ErrorKind, Result};
use crate::events::{ScanComplete, ScanEvent, ScanProgress};
use crate::walk;
use exn::{OptionExt, ResultExt};
use folio_cache::ScanCache;
use folio_catalog::{FolderTree, Image, ImageFormat, ImageId, SourceId, assign_indexes};
use folio_reader::error::ErrorKind as ReaderErrorKind;
use folio_reader::{Container, Entry};
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Tuning knobs for progressive enumeration.
#[derive(Debug, Clone)]
pub struct ScanTuning {
    /// Upper bound on the image count returned synchronously from an open.
    pub initial_slice: usize,
    /// Number of images per background progress event.
    pub chunk_size: usize,
    /// Delay between background chunks.
    pub throttle: Duration,
}

impl Default for ScanTuning {
    fn default() -> Self {
        Self {
            initial_slice: 100,
            chunk_size: 50,
            throttle: Duration::from_millis(100),
        }
    }
}

impl From<&folio_config::ScanSection> for ScanTuning {
    fn from(section: &folio_config::ScanSection) -> Self {
        Self {
            initial_slice: section.initial_slice,
            chunk_size: section.chunk_size,
            throttle: Duration::from_millis(section.throttle_ms),
        }
    }
}

/// Synchronous reply to an open request.
///
/// When `is_complete` is `true` the initial slice covers the whole source:
/// no background phase runs, no token is issued, and no events will arrive.
/// Otherwise the remainder streams over the event channel under
/// `scan_token`.
#[derive(Debug, Clone)]
pub struct OpenSource {
    pub source: SourceId,
    pub initial_images: Vec<Image>,
    pub root_folder: FolderTree,
    pub scan_token: Option<ScanToken>,
    /// Images known about when the open returned. Exact for containers and
    /// fully enumerated directories; a lower bound while a directory walk is
    /// still discovering.
    pub estimated_total: u64,
    pub is_complete: bool,
}

enum Backing {
    Directory,
    Container(Arc<Container>),
}

struct OpenEntry {
    path: PathBuf,
    backing: Backing,
    scan_token: Option<ScanToken>,
}

/// Orchestrates source opening: cache lookup, enumeration, tree building,
/// and throttled background streaming of everything beyond the initial
/// slice.
///
/// Owns the open-source registry and the [`ScanCoordinator`]. Background
/// tasks own their data outright (images, walker, event sender, cancellation
/// handle), so nothing here needs locking: only the ingestor itself mutates
/// its registry.
pub struct Ingestor {
    tuning: ScanTuning,
    cache: Option<ScanCache>,
    coordinator: ScanCoordinator,
    sources: HashMap<SourceId, OpenEntry>,
    next_source: u64,
}

impl Ingestor {
    pub fn new(tuning: ScanTuning, cache: Option<ScanCache>) -> Self {
        let tuning = ScanTuning {
            initial_slice: tuning.initial_slice.max(1),
            chunk_size: tuning.chunk_size.max(1),
            ..tuning
        };
        Self {
            tuning,
            cache,
            coordinator: ScanCoordinator::new(),
            sources: HashMap::new(),
            next_source: 0,
        }
    }

    /// Build an ingestor from loaded configuration, connecting the scan
    /// cache at its configured location.
    ///
    /// A cache that cannot be opened (missing directory, corrupted store)
    /// downgrades to cacheless operation; it never fails the constructor.
    pub async fn from_config(config: &folio_config::Config) -> Self {
        let cache = match config.cache_location() {
            Some(path) => match folio_cache::Database::connect(&path).await {
                Ok(db) => Some(ScanCache::new(db.pool().clone(), config.cache.capacity)),
                Err(error) => {
                    tracing::warn!(?error, "scan cache unavailable; continuing without one");
                    None
                },
            },
            None => None,
        };
        Self::new(ScanTuning::from(&config.scan), cache)
    }

    pub fn coordinator(&self) -> &ScanCoordinator {
        &self.coordinator
    }

    /// Open the source at `path` and return its initial slice.
    ///
    /// Directories are walked breadth first; anything else must be a
    /// supported container. Progress beyond the initial slice arrives on
    /// `events`. Open failures (missing path, unsupported format, password
    /// problems, corruption) are fatal to the request: no partial result,
    /// no registry entry.
    pub async fn open_source(
        &mut self,
        path: impl AsRef<Path>,
        password: Option<&str>,
        events: mpsc::Sender<ScanEvent>,
    ) -> Result<OpenSource> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| Error::from(map_io(e, &path)))?;
        let source = SourceId(self.next_source);
        self.next_source += 1;
        if metadata.is_dir() {
            self.open_directory(source, path, events).await
        } else {
            let mtime = mtime_ms(&metadata);
            self.open_container(source, path, password, mtime, events).await
        }
    }

    /// Signal cancellation of a background scan. Returns whether the token
    /// was still registered.
    pub fn cancel_scan(&self, token: ScanToken) -> bool {
        self.coordinator.cancel(token)
    }

    /// Close an open source, cancelling its background scan if one is still
    /// running and releasing the container handle.
    pub fn close_source(&mut self, source: SourceId) {
        if let Some(entry) = self.sources.remove(&source) {
            if let Some(token) = entry.scan_token {
                self.coordinator.cancel(token);
            }
            tracing::debug!(%source, path = %entry.path.display(), "closed source");
        }
    }

    /// Extract one image's bytes from an open source.
    pub async fn extract_image(&self, source: SourceId, image_path: &str) -> Result<Vec<u8>> {
        let entry = self.sources.get(&source).ok_or_raise(|| ErrorKind::SourceClosed(source))?;
        match &entry.backing {
            Backing::Container(container) => {
                let container = Arc::clone(container);
                let image_path = image_path.to_string();
                tokio::task::spawn_blocking(move || container.extract_entry(&image_path))
                    .await
                    .or_raise(|| ErrorKind::Task)?
                    .map_err(map_reader)
            },
            Backing::Directory => {
                let relative = Path::new(image_path);
                if relative.is_absolute()
                    || relative.components().any(|c| matches!(c, Component::ParentDir))
                {
                    exn::bail!(ErrorKind::EntryNotFound(image_path.to_string()));
                }
                let absolute = entry.path.join(relative);
                tokio::fs::read(&absolute).await.map_err(|e| Error::from(map_io(e, &absolute)))
            },
        }
    }

    async fn open_container(
        &mut self,
        source: SourceId,
        path: PathBuf,
        password: Option<&str>,
        mtime: i64,
        events: mpsc::Sender<ScanEvent>,
    ) -> Result<OpenSource> {
        let started = Instant::now();
        let cached = match &self.cache {
            Some(cache) => cache.get(&path, mtime).await.unwrap_or_else(|error| {
                tracing::warn!(path = %path.display(), ?error, "cache lookup failed; treating as miss");
                None
            }),
            None => None,
        };
        // The container is opened on a hit as well: extraction needs the
        // handle, and password/corruption checks still apply.
        let container = {
            let path = path.clone();
            let password = password.map(str::to_string);
            tokio::task::spawn_blocking(move || Container::open(&path, password.as_deref()))
                .await
                .or_raise(|| ErrorKind::Task)?
                .map_err(map_reader)?
        };
        let container = Arc::new(container);
        let (mut images, fresh) = match cached {
            Some(images) => {
                tracing::debug!(path = %path.display(), count = images.len(), "scan cache hit");
                (adopt(images, source), false)
            },
            None => {
                let entries = {
                    let container = Arc::clone(&container);
                    tokio::task::spawn_blocking(move || container.list_entries())
                        .await
                        .or_raise(|| ErrorKind::Task)?
                        .map_err(map_reader)?
                };
                (images_from_entries(source, entries), true)
            },
        };
        assign_indexes(&mut images);
        if fresh && let Some(cache) = self.cache.clone() {
            // Persist in the background; a cache failure never blocks or
            // fails the open.
            let path = path.clone();
            let snapshot = images.clone();
            tokio::spawn(async move {
                if let Err(error) = cache.put(&path, mtime, &snapshot).await {
                    tracing::warn!(path = %path.display(), ?error, "failed to persist scan results");
                }
            });
        }
        let tree = FolderTree::build(&images, source);
        Ok(self.finish_known(source, path, Backing::Container(container), images, tree, started, events))
    }

    async fn open_directory(
        &mut self,
        source: SourceId,
        path: PathBuf,
        events: mpsc::Sender<ScanEvent>,
    ) -> Result<OpenSource> {
        let started = Instant::now();
        let mut stream: Pin<Box<dyn Stream<Item = Image> + Send>> =
            Box::pin(walk::discover(path.clone(), source));
        // Pull one image past the bound to learn whether a background phase
        // is needed at all.
        let mut discovered: Vec<Image> = Vec::with_capacity(self.tuning.initial_slice + 1);
        while discovered.len() <= self.tuning.initial_slice {
            match stream.next().await {
                Some(image) => discovered.push(image),
                None => {
                    // Small-source fast path. Note that directory scans are
                    // never persisted to the cache; only containers are.
                    let tree = self.register_complete(source, path, Backing::Directory, &mut discovered);
                    let total = discovered.len() as u64;
                    return Ok(OpenSource {
                        source,
                        initial_images: discovered,
                        root_folder: tree,
                        scan_token: None,
                        estimated_total: total,
                        is_complete: true,
                    });
                },
            }
        }
        let pending = discovered.split_off(self.tuning.initial_slice);
        let mut initial = discovered;
        assign_indexes(&mut initial);
        let tree = FolderTree::build(&initial, source);
        let token = self.coordinator.issue();
        let handle = self.coordinator.begin(token);
        let emitter = Emitter {
            coordinator: self.coordinator.clone(),
            handle,
            token,
            tuning: self.tuning.clone(),
            events,
            started,
        };
        tokio::spawn(emitter.stream_discovery(stream, initial.clone(), pending, source));
        self.sources.insert(source, OpenEntry {
            path,
            backing: Backing::Directory,
            scan_token: Some(token),
        });
        let estimated = initial.len() as u64 + 1;
        Ok(OpenSource {
            source,
            initial_images: initial,
            root_folder: tree,
            scan_token: Some(token),
            estimated_total: estimated,
            is_complete: false,
        })
    }

    /// Shared tail for sources whose full image list is already known.
    fn finish_known(
        &mut self,
        source: SourceId,
        path: PathBuf,
        backing: Backing,
        mut images: Vec<Image>,
        tree: FolderTree,
        started: Instant,
        events: mpsc::Sender<ScanEvent>,
    ) -> OpenSource {
        let total = images.len() as u64;
        if images.len() <= self.tuning.initial_slice {
            self.sources.insert(source, OpenEntry { path, backing, scan_token: None });
            return OpenSource {
                source,
                initial_images: images,
                root_folder: tree,
                scan_token: None,
                estimated_total: total,
                is_complete: true,
            };
        }
        let remainder = images.split_off(self.tuning.initial_slice);
        let initial = images;
        let token = self.coordinator.issue();
        let handle = self.coordinator.begin(token);
        let emitter = Emitter {
            coordinator: self.coordinator.clone(),
            handle,
            token,
            tuning: self.tuning.clone(),
            events,
            started,
        };
        let folders = tree.len() as u64;
        tokio::spawn(emitter.stream_known(remainder, initial.len() as u64, total, folders));
        self.sources.insert(source, OpenEntry { path, backing, scan_token: Some(token) });
        OpenSource {
            source,
            initial_images: initial,
            root_folder: tree,
            scan_token: Some(token),
            estimated_total: total,
            is_complete: false,
        }
    }

    fn register_complete(
        &mut self,
        source: SourceId,
        path: PathBuf,
        backing: Backing,
        images: &mut Vec<Image>,
    ) -> FolderTree {
        assign_indexes(images);
        let tree = FolderTree::build(images, source);
        self.sources.insert(source, OpenEntry { path, backing, scan_token: None });
        tree
    }
}

/// Background streaming of one scan. Owns everything it touches.
struct Emitter {
    coordinator: ScanCoordinator,
    handle: CancellationToken,
    token: ScanToken,
    tuning: ScanTuning,
    events: mpsc::Sender<ScanEvent>,
    started: Instant,
}

impl Emitter {
    /// Stream an already fully known remainder in fixed-size chunks.
    async fn stream_known(self, remainder: Vec<Image>, already: u64, total_images: u64, total_folders: u64) {
        let _guard = self.coordinator.completion_guard(self.token);
        let mut processed = already;
        for slice in remainder.chunks(self.tuning.chunk_size) {
            if self.handle.is_cancelled() {
                return;
            }
            let chunk = slice.to_vec();
            if self.handle.is_cancelled() {
                return;
            }
            processed += chunk.len() as u64;
            if !self.emit_progress(total_images, processed, chunk).await {
                return;
            }
            tokio::time::sleep(self.tuning.throttle).await;
        }
        self.emit_complete(total_images, total_folders).await;
    }

    /// Stream a directory walk that is still discovering images.
    ///
    /// `images` holds everything delivered so far (the initial slice);
    /// `pending` holds discovered-but-not-yet-emitted images.
    async fn stream_discovery(
        self,
        mut stream: Pin<Box<dyn Stream<Item = Image> + Send>>,
        mut images: Vec<Image>,
        mut pending: Vec<Image>,
        source: SourceId,
    ) {
        let _guard = self.coordinator.completion_guard(self.token);
        let mut processed = images.len() as u64;
        let mut exhausted = false;
        loop {
            if self.handle.is_cancelled() {
                return;
            }
            while pending.len() < self.tuning.chunk_size && !exhausted {
                match stream.next().await {
                    Some(image) => pending.push(image),
                    None => exhausted = true,
                }
            }
            if pending.is_empty() {
                break;
            }
            let take = pending.len().min(self.tuning.chunk_size);
            let chunk: Vec<Image> = pending.drain(..take).collect();
            if self.handle.is_cancelled() {
                return;
            }
            processed += chunk.len() as u64;
            images.extend(chunk.iter().cloned());
            let discovered = processed + pending.len() as u64;
            if !self.emit_progress(discovered, processed, chunk).await {
                return;
            }
            if exhausted && pending.is_empty() {
                break;
            }
            tokio::time::sleep(self.tuning.throttle).await;
        }
        // Natural exhaustion: the full list is now known, so indexes are
        // reassigned over the naturally sorted whole before reporting.
        assign_indexes(&mut images);
        let tree = FolderTree::build(&images, source);
        self.emit_complete(images.len() as u64, tree.len() as u64).await;
    }

    /// Returns `false` when the receiver is gone and streaming should stop.
    async fn emit_progress(&self, discovered: u64, processed: u64, chunk: Vec<Image>) -> bool {
        let current_path = chunk.last().map(|image| image.path.clone()).unwrap_or_default();
        let event = ScanEvent::Progress(ScanProgress {
            token: self.token,
            discovered,
            processed,
            current_path,
            chunk,
        });
        if self.events.send(event).await.is_err() {
            tracing::debug!(token = %self.token, "event receiver dropped; stopping scan");
            return false;
        }
        true
    }

    async fn emit_complete(&self, total_images: u64, total_folders: u64) {
        if self.handle.is_cancelled() {
            return;
        }
        let event = ScanEvent::Complete(ScanComplete {
            token: self.token,
            total_images,
            total_folders,
            duration_ms: self.started.elapsed().as_millis() as u64,
        });
        _ = self.events.send(event).await;
    }
}

/// Re-key a cached image list to the session that is adopting it.
fn adopt(mut images: Vec<Image>, source: SourceId) -> Vec<Image> {
    for (index, image) in images.iter_mut().enumerate() {
        image.id = ImageId(index as u64);
        image.source = source;
    }
    images
}

fn images_from_entries(source: SourceId, entries: Vec<Entry>) -> Vec<Image> {
    let mut next_id = 0u64;
    entries
        .into_iter()
        .filter(|entry| !entry.is_dir)
        .filter_map(|entry| {
            let format = ImageFormat::from_path(&entry.path)?;
            let image = Image::new(ImageId(next_id), source, entry.path, format, entry.size);
            next_id += 1;
            Some(image)
        })
        .collect()
}

pub(crate) fn mtime_ms(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |since| i64::try_from(since.as_millis()).unwrap_or(0))
}

fn map_io(err: std::io::Error, path: &Path) -> ErrorKind {
    match err.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
        _ => ErrorKind::Io(err),
    }
}

/// Lift a reader error to the ingest taxonomy, preserving the child error
/// tree. Open-fatal kinds stay distinguishable so the caller can re-prompt
/// for passwords instead of declaring the source unreadable.
fn map_reader(err: folio_reader::error::Error) -> Error {
    let kind = match &*err {
        ReaderErrorKind::SourceNotFound(path) => ErrorKind::NotFound(path.clone()),
        ReaderErrorKind::UnsupportedFormat(format) => ErrorKind::Unsupported(format.clone()),
        ReaderErrorKind::OpenFailed | ReaderErrorKind::ArchiveCorrupted => ErrorKind::Corrupted,
        ReaderErrorKind::PasswordRequired => ErrorKind::PasswordRequired,
        ReaderErrorKind::PasswordIncorrect => ErrorKind::PasswordIncorrect,
        ReaderErrorKind::EntryNotFound(entry) => ErrorKind::EntryNotFound(entry.clone()),
        ReaderErrorKind::Io(_) => ErrorKind::Reader,
    };
    err.raise(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_cache::Database;
    use std::fs::{File, create_dir_all, write};
    use std::io::Write as _;
    use tokio::sync::mpsc::Receiver;

    fn tuning() -> ScanTuning {
        ScanTuning {
            initial_slice: 100,
            chunk_size: 50,
            throttle: Duration::from_millis(1),
        }
    }

    fn ingestor() -> Ingestor {
        Ingestor::new(tuning(), None)
    }

    async fn cached_ingestor(capacity: usize) -> (Ingestor, ScanCache) {
        let db = Database::connect_in_memory().await.unwrap();
        let cache = ScanCache::new(db.pool().clone(), capacity);
        (Ingestor::new(tuning(), Some(cache.clone())), cache)
    }

    fn channel() -> (mpsc::Sender<ScanEvent>, Receiver<ScanEvent>) {
        mpsc::channel(64)
    }

    /// Lay out `count` images across `root`, one folder per fifty.
    fn populate(root: &Path, count: usize) {
        for index in 0..count {
            let dir = root.join(format!("folder{}", index / 50));
            create_dir_all(&dir).unwrap();
            write(dir.join(format!("img{index:04}.png")), b"fake image bytes").unwrap();
        }
    }

    fn write_zip(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        let mut writer = ::zip::ZipWriter::new(file);
        let options = ::zip::write::SimpleFileOptions::default()
            .compression_method(::zip::CompressionMethod::Stored);
        for (entry_name, data) in entries {
            writer.start_file(*entry_name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    async fn drain(mut events: Receiver<ScanEvent>) -> (Vec<ScanProgress>, Option<ScanComplete>) {
        let mut progress = Vec::new();
        let mut complete = None;
        while let Some(event) = events.recv().await {
            match event {
                ScanEvent::Progress(update) => progress.push(update),
                ScanEvent::Complete(done) => complete = Some(done),
            }
        }
        (progress, complete)
    }

    #[tokio::test]
    async fn test_missing_source_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let (tx, _rx) = channel();
        let err = ingestor().open_source(temp.path().join("gone"), None, tx).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unsupported_container_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("book.7z");
        write(&path, b"not really 7z").unwrap();
        let (tx, _rx) = channel();
        let err = ingestor().open_source(&path, None, tx).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_small_directory_fast_path() {
        let temp = tempfile::tempdir().unwrap();
        populate(temp.path(), 50);
        let (tx, mut rx) = channel();
        let opened = ingestor().open_source(temp.path(), None, tx).await.unwrap();
        assert!(opened.is_complete);
        assert!(opened.scan_token.is_none());
        assert_eq!(opened.initial_images.len(), 50);
        assert_eq!(opened.estimated_total, 50);
        assert_eq!(opened.root_folder.root().cumulative, 50);
        // No background phase: the channel closes without a single event.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_large_directory_streams_remainder() {
        let temp = tempfile::tempdir().unwrap();
        populate(temp.path(), 150);
        let (tx, rx) = channel();
        let mut ingestor = ingestor();
        let opened = ingestor.open_source(temp.path(), None, tx).await.unwrap();
        assert!(!opened.is_complete);
        assert!(opened.scan_token.is_some());
        assert_eq!(opened.initial_images.len(), 100);
        let (progress, complete) = drain(rx).await;
        let complete = complete.expect("scan should complete");
        assert_eq!(complete.total_images, 150);
        // 150 images over folders of fifty, plus the root.
        assert_eq!(complete.total_folders, 4);
        let streamed: usize = progress.iter().map(|p| p.chunk.len()).sum();
        assert_eq!(streamed, 50);
        let mut last = opened.initial_images.len() as u64;
        for update in &progress {
            assert!(update.processed > last, "processed must strictly increase");
            last = update.processed;
        }
        assert_eq!(last, 150);
    }

    #[tokio::test]
    async fn test_cancellation_suppresses_completion() {
        let temp = tempfile::tempdir().unwrap();
        populate(temp.path(), 400);
        let (tx, rx) = channel();
        let mut ingestor = Ingestor::new(
            ScanTuning { throttle: Duration::from_millis(25), ..tuning() },
            None,
        );
        let opened = ingestor.open_source(temp.path(), None, tx).await.unwrap();
        let token = opened.scan_token.expect("large source must issue a token");
        assert!(ingestor.cancel_scan(token));
        let (_progress, complete) = drain(rx).await;
        assert!(complete.is_none(), "cancelled scans never report completion");
        // The channel closing means the task exited, and its guard released
        // the token on the way out.
        assert_eq!(ingestor.coordinator().active_scans(), 0);
        assert!(!ingestor.cancel_scan(token), "token is gone after completion");
    }

    #[tokio::test]
    async fn test_zip_archive_natural_order_and_extraction() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_zip(temp.path(), "book.cbz", &[
            ("b.jpg", b"second".as_slice()),
            ("a.jpg", b"first".as_slice()),
            ("ignore.txt", b"not an image".as_slice()),
        ]);
        let (tx, mut rx) = channel();
        let mut ingestor = ingestor();
        let opened = ingestor.open_source(&path, None, tx).await.unwrap();
        assert!(opened.is_complete);
        let names: Vec<_> = opened.initial_images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg"]);
        let globals: Vec<_> = opened.initial_images.iter().map(|i| i.global_index).collect();
        assert_eq!(globals, vec![0, 1]);
        assert!(rx.recv().await.is_none());
        let bytes = ingestor.extract_image(opened.source, "a.jpg").await.unwrap();
        assert_eq!(bytes, b"first");
        ingestor.close_source(opened.source);
        let err = ingestor.extract_image(opened.source, "a.jpg").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::SourceClosed(_)));
    }

    #[tokio::test]
    async fn test_archive_enumeration_is_persisted() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_zip(temp.path(), "book.cbz", &[("a.jpg", b"first".as_slice())]);
        let (mut ingestor, cache) = cached_ingestor(10).await;
        let (tx, _rx) = channel();
        ingestor.open_source(&path, None, tx).await.unwrap();
        // The persist runs on a spawned task; give it a moment.
        for _ in 0..200 {
            if cache.len().await.unwrap() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let mtime = mtime_ms(&std::fs::metadata(&path).unwrap());
        let stored = cache.get(&path, mtime).await.unwrap().expect("entry was persisted");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].path, "a.jpg");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_enumeration() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_zip(temp.path(), "book.cbz", &[("a.jpg", b"first".as_slice())]);
        let (mut ingestor, cache) = cached_ingestor(10).await;
        // Seed the cache with a recognizable list under the real mtime; if
        // the open reuses it, enumeration never ran.
        let mtime = mtime_ms(&std::fs::metadata(&path).unwrap());
        let marker = Image::new(ImageId(9), SourceId(9), "marker.png", ImageFormat::Png, 1);
        cache.put(&path, mtime, &[marker]).await.unwrap();
        let (tx, _rx) = channel();
        let opened = ingestor.open_source(&path, None, tx).await.unwrap();
        assert_eq!(opened.initial_images.len(), 1);
        assert_eq!(opened.initial_images[0].path, "marker.png");
        // The list is adopted by the new session.
        assert_eq!(opened.initial_images[0].source, opened.source);
    }

    #[tokio::test]
    async fn test_directory_scans_are_never_cached() {
        let temp = tempfile::tempdir().unwrap();
        populate(temp.path(), 10);
        let (mut ingestor, cache) = cached_ingestor(10).await;
        let (tx, _rx) = channel();
        ingestor.open_source(temp.path(), None, tx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_extract_from_directory_source() {
        let temp = tempfile::tempdir().unwrap();
        create_dir_all(temp.path().join("sub")).unwrap();
        write(temp.path().join("sub/pic.png"), b"pixels").unwrap();
        let (tx, _rx) = channel();
        let mut ingestor = ingestor();
        let opened = ingestor.open_source(temp.path(), None, tx).await.unwrap();
        let bytes = ingestor.extract_image(opened.source, "sub/pic.png").await.unwrap();
        assert_eq!(bytes, b"pixels");
        let err = ingestor.extract_image(opened.source, "../escape.png").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::EntryNotFound(_)));
    }

    #[tokio::test]
    async fn test_large_archive_streams_remainder() {
        let temp = tempfile::tempdir().unwrap();
        let entries: Vec<(String, Vec<u8>)> =
            (0..130).map(|i| (format!("p{i:03}.jpg"), b"x".to_vec())).collect();
        let borrowed: Vec<(&str, &[u8])> =
            entries.iter().map(|(name, data)| (name.as_str(), data.as_slice())).collect();
        let path = write_zip(temp.path(), "long.cbz", &borrowed);
        let (tx, rx) = channel();
        let mut ingestor = ingestor();
        let opened = ingestor.open_source(&path, None, tx).await.unwrap();
        assert!(!opened.is_complete);
        assert_eq!(opened.initial_images.len(), 100);
        assert_eq!(opened.estimated_total, 130);
        let (progress, complete) = drain(rx).await;
        assert_eq!(progress.iter().map(|p| p.chunk.len()).sum::<usize>(), 30);
        assert_eq!(complete.unwrap().total_images, 130);
    }
}
