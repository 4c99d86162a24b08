use crate::natural;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of one open source session (an archive or a directory root).
///
/// Images and folder nodes carry the id of the session that produced them;
/// everything belonging to a source is discarded when the source is closed.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[display("source-{_0}")]
pub struct SourceId(pub u64);

/// Identifier of a single image within its source session.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[display("image-{_0}")]
pub struct ImageId(pub u64);

/// Image formats the catalog recognizes, detected from the file extension.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[display("jpeg")]
    Jpeg,
    #[display("png")]
    Png,
    #[display("gif")]
    Gif,
    #[display("webp")]
    Webp,
    #[display("bmp")]
    Bmp,
    #[display("avif")]
    Avif,
}

impl ImageFormat {
    /// Detect the format from a path's extension.
    ///
    /// Returns `None` for anything that is not a recognized image, which is
    /// how non-image entries are filtered out during enumeration.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.').map(|(_, ext)| ext)?;
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            "bmp" => Some(Self::Bmp),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }
}

/// One discovered image.
///
/// Created during enumeration of a container or directory. The two index
/// fields describe the image's position in the fully sorted flat list
/// ([`global_index`](Self::global_index)) and among its folder siblings
/// ([`folder_index`](Self::folder_index)); both are provisional until the
/// complete list is known and [`assign_indexes`] has run over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    pub source: SourceId,
    /// Path within the source, `/`-separated, no leading slash.
    pub path: String,
    /// File name (final path component).
    pub name: String,
    /// Parent folder path within the source; the root is `/`.
    pub folder: String,
    pub format: ImageFormat,
    /// File size in bytes (uncompressed, for container entries).
    pub size: u64,
    /// Pixel dimensions, filled in lazily once the image has been decoded.
    pub dimensions: Option<(u32, u32)>,
    /// Position in the naturally sorted flat list of the whole source.
    pub global_index: usize,
    /// Position among the images of the same folder.
    pub folder_index: usize,
    pub loaded: bool,
    pub corrupted: bool,
}

impl Image {
    pub fn new(
        id: ImageId,
        source: SourceId,
        path: impl Into<String>,
        format: ImageFormat,
        size: u64,
    ) -> Self {
        let path = path.into();
        let name = path.rsplit_once('/').map_or(path.as_str(), |(_, name)| name).to_string();
        let folder = folder_of(&path);
        Self {
            id,
            source,
            path,
            name,
            folder,
            format,
            size,
            dimensions: None,
            global_index: 0,
            folder_index: 0,
            loaded: false,
            corrupted: false,
        }
    }
}

/// Derive the folder path of an in-source image path.
///
/// `"Sub/Deep/img.png"` → `"/Sub/Deep"`, `"img.png"` → `"/"`.
pub fn folder_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => format!("/{dir}"),
        None => "/".to_string(),
    }
}

/// Sort `images` into natural order over their in-source paths and write
/// contiguous global indexes (from 0) plus per-folder sibling indexes.
///
/// Called whenever the full ordered list of a source is known: after a scan
/// completes, or when a cached list is reused.
pub fn assign_indexes(images: &mut [Image]) {
    images.sort_by(|a, b| natural::compare(&a.path, &b.path));
    let mut per_folder: HashMap<String, usize> = HashMap::new();
    for (index, image) in images.iter_mut().enumerate() {
        image.global_index = index;
        let next = per_folder.entry(image.folder.clone()).or_insert(0);
        image.folder_index = *next;
        *next += 1;
    }
}
