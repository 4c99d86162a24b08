//! The scan cache repository.

use crate::Database;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use folio_catalog::Image;
use sqlx::SqlitePool;
use std::path::Path;

/// Bump when the serialized image list changes shape; rows written by any
/// other version are discarded on read.
pub const CACHE_VERSION: i64 = 1;
/// Maximum number of cached sources kept after a put.
pub const DEFAULT_CAPACITY: usize = 100;

/// Persistent map from (source path, source mtime) to a previously computed
/// flat image list.
///
/// Staleness is detected on read: a row whose stored mtime differs from the
/// caller's, whose payload fails to parse, or whose version doesn't match is
/// deleted as a side effect and the lookup reports a miss. Writes are
/// transactional upserts followed by LRU eviction down to the capacity.
#[derive(Debug, Clone)]
pub struct ScanCache {
    pool: SqlitePool,
    capacity: usize,
}

impl From<&Database> for ScanCache {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone(), DEFAULT_CAPACITY)
    }
}

impl ScanCache {
    pub fn new(pool: SqlitePool, capacity: usize) -> Self {
        Self { pool, capacity }
    }

    fn key(path: impl AsRef<Path>) -> Result<String> {
        Ok(path.as_ref().to_str().ok_or_raise(|| ErrorKind::InvalidData)?.to_string())
    }

    fn now_ns() -> i64 {
        let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
        i64::try_from(nanos).unwrap_or(i64::MAX)
    }

    /// Look up the cached image list for `source_path` captured at `mtime`
    /// (milliseconds, truncated).
    ///
    /// A hit refreshes the row's last-access timestamp. Every kind of
    /// invalid row (stale mtime, unparsable payload, other cache version)
    /// is deleted before reporting a miss, so bad rows never survive a read.
    pub async fn get(&self, source_path: impl AsRef<Path>, mtime: i64) -> Result<Option<Vec<Image>>> {
        let key = Self::key(&source_path)?;
        let row: Option<(i64, String, i64)> = sqlx::query_as(include_str!("../queries/get_entry.sql"))
            .bind(&key)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let Some((stored_mtime, payload, version)) = row else {
            return Ok(None);
        };
        if stored_mtime != mtime || version != CACHE_VERSION {
            tracing::debug!(source = %key, stored_mtime, mtime, version, "evicting stale cache row");
            self.delete(&key).await?;
            return Ok(None);
        }
        let images: Vec<Image> = match serde_json::from_str(&payload) {
            Ok(images) => images,
            Err(error) => {
                tracing::warn!(source = %key, %error, "cache payload failed to parse; deleting row");
                self.delete(&key).await?;
                return Ok(None);
            },
        };
        sqlx::query(include_str!("../queries/touch_entry.sql"))
            .bind(Self::now_ns())
            .bind(&key)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(Some(images))
    }

    /// Store the image list for `source_path` captured at `mtime`.
    ///
    /// Upserts the row and then deletes the least-recently-accessed rows
    /// beyond the capacity, all in one transaction.
    pub async fn put(&self, source_path: impl AsRef<Path>, mtime: i64, images: &[Image]) -> Result<()> {
        let key = Self::key(&source_path)?;
        let payload = serde_json::to_string(images).or_raise(|| ErrorKind::InvalidData)?;
        let now = Self::now_ns();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/upsert_entry.sql"))
            .bind(&key)
            .bind(mtime)
            .bind(payload)
            .bind(now)
            .bind(now)
            .bind(CACHE_VERSION)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let capacity = i64::try_from(self.capacity).unwrap_or(i64::MAX);
        sqlx::query(include_str!("../queries/evict_overflow.sql"))
            .bind(capacity)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Explicitly remove the row for `source_path`.
    ///
    /// Returns `true` if a row existed.
    pub async fn invalidate(&self, source_path: impl AsRef<Path>) -> Result<bool> {
        let key = Self::key(&source_path)?;
        self.delete(&key).await
    }

    /// Remove every cached row.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query(include_str!("../queries/clear.sql"))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Number of cached sources.
    pub async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_entries.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_entry.sql"))
            .bind(key)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_catalog::{Image, ImageFormat, ImageId, SourceId};

    async fn cache(capacity: usize) -> ScanCache {
        let db = Database::connect_in_memory().await.unwrap();
        ScanCache::new(db.pool().clone(), capacity)
    }

    fn images(count: u64) -> Vec<Image> {
        (0..count)
            .map(|i| Image::new(ImageId(i), SourceId(1), format!("img{i}.png"), ImageFormat::Png, i))
            .collect()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let cache = cache(10).await;
        let list = images(3);
        cache.put("/library/book.cbz", 1_000, &list).await.unwrap();
        let hit = cache.get("/library/book.cbz", 1_000).await.unwrap();
        assert_eq!(hit, Some(list));
    }

    #[tokio::test]
    async fn test_missing_source_is_a_miss() {
        let cache = cache(10).await;
        assert_eq!(cache.get("/library/unknown.cbz", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mtime_mismatch_deletes_the_row() {
        let cache = cache(10).await;
        cache.put("/library/book.cbz", 1_000, &images(3)).await.unwrap();
        assert_eq!(cache.get("/library/book.cbz", 1_001).await.unwrap(), None);
        assert_eq!(cache.len().await.unwrap(), 0);
        // Even the original mtime misses now; the row is gone.
        assert_eq!(cache.get("/library/book.cbz", 1_000).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_payload_self_heals() {
        let cache = cache(10).await;
        cache.put("/library/book.cbz", 1_000, &images(3)).await.unwrap();
        sqlx::query("UPDATE scan_cache SET scan_data = 'definitely not json'")
            .execute(&cache.pool)
            .await
            .unwrap();
        assert_eq!(cache.get("/library/book.cbz", 1_000).await.unwrap(), None);
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_version_mismatch_deletes_the_row() {
        let cache = cache(10).await;
        cache.put("/library/book.cbz", 1_000, &images(3)).await.unwrap();
        sqlx::query("UPDATE scan_cache SET cache_version = cache_version + 1")
            .execute(&cache.pool)
            .await
            .unwrap();
        assert_eq!(cache.get("/library/book.cbz", 1_000).await.unwrap(), None);
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_is_an_upsert() {
        let cache = cache(10).await;
        cache.put("/library/book.cbz", 1_000, &images(3)).await.unwrap();
        cache.put("/library/book.cbz", 2_000, &images(5)).await.unwrap();
        assert_eq!(cache.len().await.unwrap(), 1);
        assert_eq!(cache.get("/library/book.cbz", 1_000).await.unwrap(), None);
        let hit = cache.get("/library/book.cbz", 2_000).await.unwrap().unwrap();
        assert_eq!(hit.len(), 5);
    }

    #[tokio::test]
    async fn test_eviction_keeps_capacity_most_recent() {
        let cache = cache(3).await;
        for i in 0..5 {
            cache.put(format!("/library/book{i}.cbz"), 1, &images(1)).await.unwrap();
        }
        assert_eq!(cache.len().await.unwrap(), 3);
        assert_eq!(cache.get("/library/book0.cbz", 1).await.unwrap(), None);
        assert_eq!(cache.get("/library/book1.cbz", 1).await.unwrap(), None);
        for i in 2..5 {
            assert!(
                cache.get(format!("/library/book{i}.cbz"), 1).await.unwrap().is_some(),
                "book{i} should have survived eviction"
            );
        }
    }

    #[tokio::test]
    async fn test_eviction_respects_reads_as_recency() {
        let cache = cache(3).await;
        for i in 0..3 {
            cache.put(format!("/library/book{i}.cbz"), 1, &images(1)).await.unwrap();
        }
        // Touch the oldest row, then overflow: the untouched book1 goes.
        cache.get("/library/book0.cbz", 1).await.unwrap().unwrap();
        cache.put("/library/book3.cbz", 1, &images(1)).await.unwrap();
        assert!(cache.get("/library/book0.cbz", 1).await.unwrap().is_some());
        assert_eq!(cache.get("/library/book1.cbz", 1).await.unwrap(), None);
        assert!(cache.get("/library/book2.cbz", 1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = cache(10).await;
        cache.put("/library/a.cbz", 1, &images(1)).await.unwrap();
        cache.put("/library/b.cbz", 1, &images(1)).await.unwrap();
        assert!(cache.invalidate("/library/a.cbz").await.unwrap());
        assert!(!cache.invalidate("/library/a.cbz").await.unwrap());
        assert_eq!(cache.len().await.unwrap(), 1);
        cache.clear().await.unwrap();
        assert_eq!(cache.len().await.unwrap(), 0);
    }
}
