use derive_more::Display;
use std::path::Path;

/// Raw record inside a container, directories included.
///
/// Ephemeral: produced by a listing, consumed by enumeration, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Path within the container, `/`-separated, no trailing slash.
    pub path: String,
    pub is_dir: bool,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Compressed size in bytes. Formats whose decoder does not surface
    /// packed sizes report the uncompressed size here.
    pub compressed_size: u64,
}

/// Container formats recognized by extension.
///
/// `SevenZ` and `Tar` are recognized so the caller gets a precise
/// "unsupported" message rather than "unknown file", but no adapter exists
/// for them.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    #[display("zip")]
    Zip,
    #[display("rar")]
    Rar,
    #[display("7z")]
    SevenZ,
    #[display("tar")]
    Tar,
}

impl ContainerFormat {
    /// Detect the container format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext.to_ascii_lowercase().as_str() {
            "zip" | "cbz" => Some(Self::Zip),
            "rar" | "cbr" => Some(Self::Rar),
            "7z" | "cb7" => Some(Self::SevenZ),
            "tar" => Some(Self::Tar),
            _ => None,
        }
    }

    /// Whether an adapter exists for this format.
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Zip | Self::Rar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("book.zip", Some(ContainerFormat::Zip))]
    #[case("book.CBZ", Some(ContainerFormat::Zip))]
    #[case("book.rar", Some(ContainerFormat::Rar))]
    #[case("book.cbr", Some(ContainerFormat::Rar))]
    #[case("book.7z", Some(ContainerFormat::SevenZ))]
    #[case("book.cb7", Some(ContainerFormat::SevenZ))]
    #[case("book.tar", Some(ContainerFormat::Tar))]
    #[case("book.pdf", None)]
    #[case("book", None)]
    fn test_format_detection(#[case] name: &str, #[case] expected: Option<ContainerFormat>) {
        assert_eq!(ContainerFormat::from_path(Path::new(name)), expected);
    }

    #[test]
    fn test_supported_formats() {
        assert!(ContainerFormat::Zip.is_supported());
        assert!(ContainerFormat::Rar.is_supported());
        assert!(!ContainerFormat::SevenZ.is_supported());
        assert!(!ContainerFormat::Tar.is_supported());
    }
}
