use crate::coordinator::ScanToken;
use folio_catalog::Image;

/// Events delivered over the channel passed into
/// [`open_source`](crate::Ingestor::open_source).
///
/// For a given token the ordering is strict: zero or more [`Progress`]
/// events with increasing `processed`, then at most one [`Complete`], which
/// is always the last event. A cancelled scan simply stops; it never emits
/// `Complete`.
///
/// [`Progress`]: Self::Progress
/// [`Complete`]: Self::Complete
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Progress(ScanProgress),
    Complete(ScanComplete),
}

/// One chunk of background enumeration progress.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub token: ScanToken,
    /// Total images known about so far (final for containers; grows while a
    /// directory walk is still discovering).
    pub discovered: u64,
    /// Images delivered to the caller so far, the initial slice included.
    pub processed: u64,
    /// In-source path of the most recently processed image.
    pub current_path: String,
    pub chunk: Vec<Image>,
}

/// Terminal event of a background scan that ran to natural exhaustion.
#[derive(Debug, Clone)]
pub struct ScanComplete {
    pub token: ScanToken,
    pub total_images: u64,
    pub total_folders: u64,
    /// Wall-clock time from the open request to exhaustion.
    pub duration_ms: u64,
}
