//! Book cache facade
//!
//! The only write path that can trigger eviction is
//! [`BookCache::add_book_cache_with_eviction`]; it holds the write lock for
//! the whole "check quota, evict, write" sequence so concurrent cache writes
//! cannot act on each other's stale usage numbers.

use crate::db::CacheDb;
use crate::error::Result;
use crate::eviction::EvictionPolicy;
use crate::quota::QuotaOracle;
use crate::types::{
    BookCacheEntry, BookFormat, BookRecord, BookRecordPatch, CacheEntrySummary, CacheStats,
    EvictionOutcome, StorageEstimate,
};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Persistent cache of book metadata and book files under a storage quota
pub struct BookCache {
    db: CacheDb,
    oracle: Arc<dyn QuotaOracle>,
    policy: EvictionPolicy,
    write_lock: Mutex<()>,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
}

impl BookCache {
    pub fn new(db: CacheDb, oracle: Arc<dyn QuotaOracle>) -> Self {
        Self::with_policy(db, oracle, EvictionPolicy::default())
    }

    pub fn with_policy(db: CacheDb, oracle: Arc<dyn QuotaOracle>, policy: EvictionPolicy) -> Self {
        Self {
            db,
            oracle,
            policy,
            write_lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Add or overwrite a book's metadata
    pub async fn add_book_metadata(&self, record: &BookRecord) -> Result<String> {
        self.db.records().put(record).await
    }

    /// Mark a book as opened now. Unknown books are ignored.
    pub async fn touch_book(&self, id: &str) -> Result<()> {
        let patch = BookRecordPatch {
            last_opened_at: Some(Utc::now()),
        };
        if !self.db.records().update(id, &patch).await? {
            debug!(book_id = %id, "Touched book is not in the cache");
        }
        Ok(())
    }

    pub async fn get_book(&self, id: &str) -> Result<Option<BookRecord>> {
        self.db.records().get(id).await
    }

    /// Make room for the entry under the quota, then store it
    pub async fn add_book_cache_with_eviction(
        &self,
        entry: &BookCacheEntry,
    ) -> Result<EvictionOutcome> {
        entry.verify_size()?;

        let _guard = self.write_lock.lock().await;
        let outcome = self
            .policy
            .ensure_capacity(
                &self.db,
                self.oracle.as_ref(),
                entry.size,
                Some(entry.book_id.as_str()),
            )
            .await?;
        self.db.blobs().put(entry).await?;

        debug!(
            book_id = %entry.book_id,
            format = %entry.format,
            size = entry.size,
            "Cached book file"
        );
        Ok(outcome)
    }

    pub async fn get_book_cache_entry(
        &self,
        book_id: &str,
        format: &BookFormat,
    ) -> Result<Option<BookCacheEntry>> {
        let entry = self.db.blobs().get(book_id, format).await?;
        self.count_lookup(entry.is_some());
        if entry.is_some() {
            debug!(book_id, format = %format, "Cache hit");
        }
        Ok(entry)
    }

    /// Record whether a lookup was served from the cache
    pub(crate) fn count_lookup(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub async fn get_all_cache_entries_for_book(&self, book_id: &str) -> Result<Vec<BookCacheEntry>> {
        self.db.blobs().list_by_book(book_id).await
    }

    /// Cached payload metadata for every book, without the bytes
    pub async fn cache_summaries(&self) -> Result<Vec<CacheEntrySummary>> {
        self.db.blobs().summaries().await
    }

    /// Books ordered most recently opened first
    pub async fn list_books_by_recency(&self) -> Result<Vec<BookRecord>> {
        self.db.records().list_by_last_opened_desc().await
    }

    /// Remove a book and all of its cached formats atomically
    pub async fn delete_book(&self, id: &str) -> Result<()> {
        self.db.delete_book(id).await?;
        Ok(())
    }

    /// Total bytes of cached payloads, by the cache's own accounting
    pub async fn get_total_cache_usage(&self) -> Result<u64> {
        self.db.blobs().total_size().await
    }

    /// Usage and quota as seen by the quota oracle
    pub async fn estimate(&self) -> Result<Option<StorageEstimate>> {
        self.oracle.estimate().await
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let summaries = self.db.blobs().summaries().await?;
        let books: HashSet<&str> = summaries.iter().map(|s| s.book_id.as_str()).collect();

        Ok(CacheStats {
            books: books.len(),
            entries: summaries.len(),
            total_size: summaries.iter().map(|s| s.size).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::quota::{StaticQuota, UnsupportedQuota};
    use chrono::{DateTime, Duration};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    async fn cache_with(oracle: Arc<dyn QuotaOracle>) -> BookCache {
        let db = CacheDb::open_in_memory().await.unwrap();
        BookCache::new(db, oracle)
    }

    #[tokio::test]
    async fn test_add_metadata_and_touch() {
        let cache = cache_with(Arc::new(UnsupportedQuota)).await;
        cache
            .add_book_metadata(&BookRecord::new("book-1", at(0)))
            .await
            .unwrap();

        cache.touch_book("book-1").await.unwrap();

        let record = cache.get_book("book-1").await.unwrap().unwrap();
        assert!(record.last_opened_at > at(0));
        assert!(Utc::now() - record.last_opened_at < Duration::seconds(5));
    }

    #[tokio::test]
    async fn test_touch_unknown_book_is_ignored() {
        let cache = cache_with(Arc::new(UnsupportedQuota)).await;
        cache.touch_book("evicted-meanwhile").await.unwrap();
        assert!(cache.get_book("evicted-meanwhile").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scenario_d_never_cached_is_none() {
        let cache = cache_with(Arc::new(UnsupportedQuota)).await;
        let entry = cache
            .get_book_cache_entry("x", &BookFormat::Epub)
            .await
            .unwrap();
        assert!(entry.is_none());

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_add_cache_then_read_back() {
        let cache = cache_with(Arc::new(StaticQuota::new(500, 1000))).await;
        let entry = BookCacheEntry::new("book-1", BookFormat::Epub, b"chapter one".to_vec());

        let outcome = cache.add_book_cache_with_eviction(&entry).await.unwrap();
        assert!(!outcome.triggered);

        let cached = cache
            .get_book_cache_entry("book-1", &BookFormat::Epub)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.data, b"chapter one");
        assert_eq!(cache.get_all_cache_entries_for_book("book-1").await.unwrap().len(), 1);
        assert_eq!(cache.stats().await.unwrap().hits, 1);
    }

    #[tokio::test]
    async fn test_add_cache_evicts_before_writing() {
        let oracle = Arc::new(StaticQuota::new(850, 1000));
        let cache = cache_with(oracle.clone()).await;

        for (id, secs) in [("old", 0), ("recent", 100)] {
            cache
                .add_book_metadata(&BookRecord::new(id, at(secs)))
                .await
                .unwrap();
        }
        cache
            .db()
            .blobs()
            .put(&BookCacheEntry::new("old", BookFormat::Epub, vec![0; 200]))
            .await
            .unwrap();
        cache
            .db()
            .blobs()
            .put(&BookCacheEntry::new("recent", BookFormat::Epub, vec![0; 100]))
            .await
            .unwrap();

        let incoming = BookCacheEntry::new("recent", BookFormat::Pdf, vec![1; 200]);
        let outcome = cache.add_book_cache_with_eviction(&incoming).await.unwrap();

        assert_eq!(outcome.evicted, vec!["old"]);
        assert!(cache.get_book("old").await.unwrap().is_none());
        assert_eq!(
            cache.get_all_cache_entries_for_book("recent").await.unwrap().len(),
            2
        );
        assert_eq!(cache.get_total_cache_usage().await.unwrap(), 300);
    }

    #[tokio::test]
    async fn test_add_cache_rejects_size_mismatch_without_evicting() {
        let cache = cache_with(Arc::new(StaticQuota::new(999, 1000))).await;
        cache
            .add_book_metadata(&BookRecord::new("victim", at(0)))
            .await
            .unwrap();

        let mut entry = BookCacheEntry::new("book-1", BookFormat::Epub, vec![0; 4]);
        entry.size = 40;
        let err = cache.add_book_cache_with_eviction(&entry).await.unwrap_err();

        assert!(matches!(err, CacheError::SizeMismatch { .. }));
        assert!(cache.get_book("victim").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_books_by_recency() {
        let cache = cache_with(Arc::new(UnsupportedQuota)).await;
        for (id, secs) in [("b", 10), ("c", 20), ("a", 0)] {
            cache
                .add_book_metadata(&BookRecord::new(id, at(secs)))
                .await
                .unwrap();
        }

        let ids: Vec<String> = cache
            .list_books_by_recency()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_delete_book_twice_is_idempotent() {
        let cache = cache_with(Arc::new(UnsupportedQuota)).await;
        cache
            .add_book_metadata(&BookRecord::new("book-1", at(0)))
            .await
            .unwrap();
        for format in [BookFormat::Epub, BookFormat::Pdf] {
            cache
                .add_book_cache_with_eviction(&BookCacheEntry::new("book-1", format, vec![0; 8]))
                .await
                .unwrap();
        }

        cache.delete_book("book-1").await.unwrap();
        cache.delete_book("book-1").await.unwrap();

        assert!(cache.get_book("book-1").await.unwrap().is_none());
        assert!(cache
            .get_all_cache_entries_for_book("book-1")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(cache.get_total_cache_usage().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_total_usage_ignores_oracle() {
        let cache = cache_with(Arc::new(UnsupportedQuota)).await;
        cache
            .add_book_cache_with_eviction(&BookCacheEntry::new("a", BookFormat::Epub, vec![0; 30]))
            .await
            .unwrap();
        cache
            .add_book_cache_with_eviction(&BookCacheEntry::new("b", BookFormat::Cbz, vec![0; 12]))
            .await
            .unwrap();

        assert_eq!(cache.get_total_cache_usage().await.unwrap(), 42);
        assert!(cache.estimate().await.unwrap().is_none());

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.books, 2);
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.total_size, 42);
    }

    #[tokio::test]
    async fn test_concurrent_writes_are_serialized() {
        let oracle = Arc::new(StaticQuota::new(0, 1_000_000));
        let cache = Arc::new(cache_with(oracle).await);

        let mut handles = Vec::new();
        for i in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("book-{}", i);
                cache
                    .add_book_metadata(&BookRecord::opened_now(id.clone()))
                    .await
                    .unwrap();
                cache
                    .add_book_cache_with_eviction(&BookCacheEntry::new(
                        id,
                        BookFormat::Epub,
                        vec![i as u8; 64],
                    ))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert!(!handle.await.unwrap().triggered);
        }

        assert_eq!(cache.stats().await.unwrap().entries, 8);
        assert_eq!(cache.get_total_cache_usage().await.unwrap(), 8 * 64);
    }

    #[tokio::test]
    async fn test_only_book_is_not_evicted_by_its_own_write() {
        let cache = cache_with(Arc::new(StaticQuota::new(950, 1000))).await;
        cache
            .add_book_metadata(&BookRecord::new("only", at(0)))
            .await
            .unwrap();
        cache
            .add_book_cache_with_eviction(&BookCacheEntry::new("only", BookFormat::Epub, vec![0; 100]))
            .await
            .unwrap();

        let outcome = cache
            .add_book_cache_with_eviction(&BookCacheEntry::new("only", BookFormat::Pdf, vec![0; 100]))
            .await
            .unwrap();

        assert!(outcome.triggered);
        assert!(outcome.evicted.is_empty());
        assert!(cache.get_book("only").await.unwrap().is_some());
        assert_eq!(cache.get_all_cache_entries_for_book("only").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_oldest_book_keeps_its_record_while_others_are_evicted() {
        let cache = cache_with(Arc::new(StaticQuota::new(950, 1000))).await;
        for (id, secs) in [("incoming", 0), ("other", 10)] {
            cache
                .add_book_metadata(&BookRecord::new(id, at(secs)))
                .await
                .unwrap();
        }
        cache
            .db()
            .blobs()
            .put(&BookCacheEntry::new("other", BookFormat::Epub, vec![0; 10]))
            .await
            .unwrap();

        let outcome = cache
            .add_book_cache_with_eviction(&BookCacheEntry::new(
                "incoming",
                BookFormat::Epub,
                vec![0; 100],
            ))
            .await
            .unwrap();

        assert_eq!(outcome.evicted, vec!["other"]);
        assert!(cache.get_book("incoming").await.unwrap().is_some());

        // Every cached payload still belongs to a record eviction can reach
        for summary in cache.cache_summaries().await.unwrap() {
            assert!(cache.get_book(&summary.book_id).await.unwrap().is_some());
        }
    }
}
