//! Breadth-first directory enumeration.

use async_stream::stream;
use folio_catalog::{Image, ImageFormat, ImageId, SourceId, natural};
use futures::Stream;
use std::collections::VecDeque;
use std::path::PathBuf;
use tokio::fs;

/// Discover every image under `root`, breadth first.
///
/// All immediate subfolders of the root are visited before any of their
/// subfolders, so progressively consumed output fills out shallow structure
/// first. Within one directory, files and subfolders are visited in natural
/// order to keep discovery deterministic.
///
/// Enumeration failures are isolated per subtree: an unreadable directory
/// is logged and skipped, and the walk continues with its siblings. The
/// stream itself never errors.
pub(crate) fn discover(root: PathBuf, source: SourceId) -> impl Stream<Item = Image> + Send {
    stream! {
        let mut queue: VecDeque<(PathBuf, String)> = VecDeque::new();
        queue.push_back((root, "/".to_string()));
        let mut next_id: u64 = 0;
        while let Some((dir, folder)) = queue.pop_front() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(error) => {
                    tracing::warn!(path = %dir.display(), %error, "skipping unreadable directory");
                    continue;
                },
            };
            let mut files: Vec<(String, ImageFormat, u64)> = Vec::new();
            let mut subdirs: Vec<String> = Vec::new();
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(error) => {
                        tracing::warn!(path = %dir.display(), %error, "directory listing aborted");
                        break;
                    },
                };
                let name = entry.file_name().to_string_lossy().to_string();
                let Ok(file_type) = entry.file_type().await else {
                    continue;
                };
                if file_type.is_dir() {
                    subdirs.push(name);
                } else if file_type.is_file()
                    && let Some(format) = ImageFormat::from_path(&name)
                {
                    let size = entry.metadata().await.map_or(0, |meta| meta.len());
                    files.push((name, format, size));
                }
                // Anything else is most likely a broken symlink; drop it.
            }
            files.sort_by(|a, b| natural::compare(&a.0, &b.0));
            subdirs.sort_by(|a, b| natural::compare(a, b));
            for (name, format, size) in files {
                let path = match folder.as_str() {
                    "/" => name,
                    parent => format!("{}/{name}", &parent[1..]),
                };
                let image = Image::new(ImageId(next_id), source, path, format, size);
                next_id += 1;
                yield image;
            }
            for name in subdirs {
                let child = match folder.as_str() {
                    "/" => format!("/{name}"),
                    parent => format!("{parent}/{name}"),
                };
                queue.push_back((dir.join(&name), child));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::fs::{create_dir_all, write};

    async fn collect(root: PathBuf) -> Vec<String> {
        discover(root, SourceId(0)).map(|image| image.path).collect().await
    }

    #[tokio::test]
    async fn test_breadth_first_order() {
        let temp = tempfile::tempdir().unwrap();
        create_dir_all(temp.path().join("a/deep")).unwrap();
        create_dir_all(temp.path().join("b")).unwrap();
        write(temp.path().join("root.png"), b"x").unwrap();
        write(temp.path().join("a/1.png"), b"x").unwrap();
        write(temp.path().join("b/2.png"), b"x").unwrap();
        write(temp.path().join("a/deep/3.png"), b"x").unwrap();
        let paths = collect(temp.path().to_path_buf()).await;
        // Root level first, then every immediate subfolder, then depth two.
        assert_eq!(paths, vec!["root.png", "a/1.png", "b/2.png", "a/deep/3.png"]);
    }

    #[tokio::test]
    async fn test_non_images_are_filtered() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path().join("keep.png"), b"x").unwrap();
        write(temp.path().join("skip.txt"), b"x").unwrap();
        write(temp.path().join("skip.db"), b"x").unwrap();
        let paths = collect(temp.path().to_path_buf()).await;
        assert_eq!(paths, vec!["keep.png"]);
    }

    #[tokio::test]
    async fn test_natural_order_within_a_directory() {
        let temp = tempfile::tempdir().unwrap();
        for name in ["img10.png", "img2.png", "img1.png"] {
            write(temp.path().join(name), b"x").unwrap();
        }
        let paths = collect(temp.path().to_path_buf()).await;
        assert_eq!(paths, vec!["img1.png", "img2.png", "img10.png"]);
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let temp = tempfile::tempdir().unwrap();
        assert!(collect(temp.path().to_path_buf()).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_yields_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let gone = temp.path().join("never-created");
        assert!(collect(gone).await.is_empty());
    }
}
