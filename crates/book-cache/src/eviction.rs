//! Quota-driven eviction of least recently opened books

use crate::db::CacheDb;
use crate::error::{CacheError, Result};
use crate::quota::QuotaOracle;
use crate::types::{EvictionOutcome, StorageEstimate};
use tracing::{debug, info};

pub const DEFAULT_HIGH_WATER_MARK: f64 = 0.9;
pub const DEFAULT_LOW_WATER_MARK: f64 = 0.7;

/// Evicts whole books, oldest `last_opened_at` first, once usage crosses the
/// high-water mark, until usage is back under the low-water mark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionPolicy {
    high_water_mark: f64,
    low_water_mark: f64,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
        }
    }
}

impl EvictionPolicy {
    /// Both marks are usage ratios; `0 < low <= high <= 1`
    pub fn new(high_water_mark: f64, low_water_mark: f64) -> Result<Self> {
        let in_range = |mark: f64| mark > 0.0 && mark <= 1.0;
        if !in_range(high_water_mark) || !in_range(low_water_mark) {
            return Err(CacheError::InvalidConfig(format!(
                "water marks must be in (0, 1], got high={} low={}",
                high_water_mark, low_water_mark
            )));
        }
        if low_water_mark > high_water_mark {
            return Err(CacheError::InvalidConfig(format!(
                "low water mark {} exceeds high water mark {}",
                low_water_mark, high_water_mark
            )));
        }
        Ok(Self {
            high_water_mark,
            low_water_mark,
        })
    }

    pub fn high_water_mark(&self) -> f64 {
        self.high_water_mark
    }

    pub fn low_water_mark(&self) -> f64 {
        self.low_water_mark
    }

    /// Usage level eviction should reach, or `None` when no eviction is due.
    ///
    /// Triggers when usage already exceeds the high-water mark, or would
    /// exceed it once `needed_bytes` are written.
    pub fn eviction_target(&self, estimate: &StorageEstimate, needed_bytes: u64) -> Option<f64> {
        if !estimate.has_quota() {
            return None;
        }

        let quota = estimate.quota_bytes as f64;
        let usage_ratio = estimate.usage_ratio();
        let projected_ratio = estimate.usage_bytes.saturating_add(needed_bytes) as f64 / quota;

        if usage_ratio > self.high_water_mark || projected_ratio > self.high_water_mark {
            Some(quota * self.low_water_mark)
        } else {
            None
        }
    }

    /// Make room for `needed_bytes`, evicting books through `db`.
    ///
    /// `keep` names the book being written; it is never a candidate, so its
    /// record outlives the write. Usage after each eviction is tracked locally
    /// from the freed payload sizes; the oracle is queried once, up front.
    /// Running out of books before the target is reached is not an error.
    pub async fn ensure_capacity(
        &self,
        db: &CacheDb,
        oracle: &dyn QuotaOracle,
        needed_bytes: u64,
        keep: Option<&str>,
    ) -> Result<EvictionOutcome> {
        let estimate = match oracle.estimate().await? {
            Some(estimate) if estimate.has_quota() => estimate,
            _ => {
                debug!("Storage quota unavailable, skipping eviction");
                return Ok(EvictionOutcome::skipped(0));
            }
        };

        let Some(target) = self.eviction_target(&estimate, needed_bytes) else {
            return Ok(EvictionOutcome::skipped(estimate.usage_bytes));
        };

        info!(
            usage_ratio = estimate.usage_ratio(),
            high_water_mark = self.high_water_mark,
            needed_bytes,
            "Storage usage over high water mark, evicting old books"
        );

        let mut outcome = EvictionOutcome {
            triggered: true,
            usage_before: estimate.usage_bytes,
            usage_after: estimate.usage_bytes,
            target_usage: target as u64,
            ..Default::default()
        };

        let records = db.records();
        let blobs = db.blobs();

        for book in records.list_by_last_opened_asc().await? {
            if outcome.usage_after as f64 <= target {
                break;
            }
            if keep == Some(book.id.as_str()) {
                continue;
            }

            let size_to_free = blobs.size_for_book(&book.id).await?;
            debug!(book_id = %book.id, size_to_free, "Evicting book");
            db.delete_book(&book.id).await?;

            outcome.usage_after = outcome.usage_after.saturating_sub(size_to_free);
            outcome.freed_bytes += size_to_free;
            outcome.evicted.push(book.id);
        }

        info!(
            evicted = outcome.evicted.len(),
            freed_bytes = outcome.freed_bytes,
            usage_after = outcome.usage_after,
            target_usage = outcome.target_usage,
            "Eviction finished"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::{StaticQuota, UnsupportedQuota};
    use crate::types::{BookCacheEntry, BookFormat, BookRecord};
    use chrono::{DateTime, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    async fn seed(db: &CacheDb, id: &str, opened_secs: i64, sizes: &[(BookFormat, usize)]) {
        db.records()
            .put(&BookRecord::new(id, at(opened_secs)))
            .await
            .unwrap();
        for (format, size) in sizes {
            db.blobs()
                .put(&BookCacheEntry::new(id, format.clone(), vec![0; *size]))
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_default_marks() {
        let policy = EvictionPolicy::default();
        assert_eq!(policy.high_water_mark(), 0.9);
        assert_eq!(policy.low_water_mark(), 0.7);
    }

    #[test]
    fn test_new_validates_marks() {
        assert!(EvictionPolicy::new(0.8, 0.6).is_ok());
        assert!(EvictionPolicy::new(0.5, 0.5).is_ok());
        assert!(EvictionPolicy::new(0.5, 0.6).is_err());
        assert!(EvictionPolicy::new(1.2, 0.6).is_err());
        assert!(EvictionPolicy::new(0.9, 0.0).is_err());
        assert!(EvictionPolicy::new(f64::NAN, 0.5).is_err());
    }

    #[test]
    fn test_target_when_write_would_cross_high_mark() {
        let policy = EvictionPolicy::default();
        let estimate = StorageEstimate::new(850, 1000);
        assert_eq!(policy.eviction_target(&estimate, 200), Some(700.0));
    }

    #[test]
    fn test_no_target_with_headroom() {
        let policy = EvictionPolicy::default();
        let estimate = StorageEstimate::new(500, 1000);
        assert_eq!(policy.eviction_target(&estimate, 50), None);
    }

    #[test]
    fn test_zero_needed_bytes_only_triggers_when_already_over() {
        let policy = EvictionPolicy::default();
        assert_eq!(
            policy.eviction_target(&StorageEstimate::new(900, 1000), 0),
            None
        );
        assert_eq!(
            policy.eviction_target(&StorageEstimate::new(901, 1000), 0),
            Some(700.0)
        );
    }

    #[test]
    fn test_no_target_without_quota() {
        let policy = EvictionPolicy::default();
        assert_eq!(
            policy.eviction_target(&StorageEstimate::new(5000, 0), u64::MAX),
            None
        );
    }

    #[tokio::test]
    async fn test_scenario_a_evicts_oldest_until_low_mark() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(&db, "oldest", 0, &[(BookFormat::Epub, 100)]).await;
        seed(&db, "older", 10, &[(BookFormat::Epub, 100)]).await;
        seed(&db, "newer", 20, &[(BookFormat::Epub, 100)]).await;
        seed(&db, "newest", 30, &[(BookFormat::Epub, 100)]).await;

        let oracle = StaticQuota::new(850, 1000);
        let outcome = EvictionPolicy::default()
            .ensure_capacity(&db, &oracle, 200, None)
            .await
            .unwrap();

        assert!(outcome.triggered);
        assert_eq!(outcome.evicted, vec!["oldest", "older"]);
        assert_eq!(outcome.usage_after, 650);
        assert!(outcome.usage_after <= 700);
        assert!(db.records().get("newer").await.unwrap().is_some());
        assert!(db.records().get("newest").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_scenario_b_headroom_evicts_nothing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(&db, "book", 0, &[(BookFormat::Pdf, 100)]).await;

        let oracle = StaticQuota::new(500, 1000);
        let outcome = EvictionPolicy::default()
            .ensure_capacity(&db, &oracle, 50, None)
            .await
            .unwrap();

        assert!(!outcome.triggered);
        assert!(outcome.evicted.is_empty());
        assert!(db.records().get("book").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_scenario_c_stops_at_target() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(&db, "a", 0, &[(BookFormat::Epub, 300)]).await;
        seed(&db, "b", 60, &[(BookFormat::Epub, 300)]).await;

        let policy = EvictionPolicy::new(0.5, 0.3).unwrap();
        let oracle = StaticQuota::new(600, 1000);
        let outcome = policy.ensure_capacity(&db, &oracle, 0, None).await.unwrap();

        assert_eq!(outcome.evicted, vec!["a"]);
        assert_eq!(outcome.usage_after, 300);
        assert!(db.records().get("a").await.unwrap().is_none());
        assert!(db.blobs().list_by_book("a").await.unwrap().is_empty());
        assert_eq!(db.blobs().list_by_book("b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_or_zero_quota_never_deletes() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(&db, "book", 0, &[(BookFormat::Epub, 10)]).await;
        let policy = EvictionPolicy::default();

        let outcome = policy
            .ensure_capacity(&db, &UnsupportedQuota, u64::MAX, None)
            .await
            .unwrap();
        assert!(!outcome.triggered);

        let zero = StaticQuota::new(10_000, 0);
        let outcome = policy.ensure_capacity(&db, &zero, u64::MAX, None).await.unwrap();
        assert!(!outcome.triggered);

        assert!(db.records().get("book").await.unwrap().is_some());
        assert_eq!(db.blobs().total_size().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_exhausting_books_is_not_an_error() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(&db, "a", 0, &[(BookFormat::Epub, 10)]).await;
        seed(&db, "b", 1, &[(BookFormat::Pdf, 10)]).await;

        // Usage is mostly outside the cache, so evicting everything is not enough
        let oracle = StaticQuota::new(990, 1000);
        let outcome = EvictionPolicy::default()
            .ensure_capacity(&db, &oracle, 0, None)
            .await
            .unwrap();

        assert_eq!(outcome.evicted, vec!["a", "b"]);
        assert_eq!(outcome.usage_after, 970);
        assert!(outcome.usage_after <= outcome.usage_before);
        assert!(db.records().list_by_last_opened_asc().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_only_books_are_evicted() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(&db, "stale", 0, &[]).await;
        seed(&db, "cached", 10, &[(BookFormat::Epub, 400)]).await;

        let oracle = StaticQuota::new(950, 1000);
        let outcome = EvictionPolicy::default()
            .ensure_capacity(&db, &oracle, 0, None)
            .await
            .unwrap();

        assert_eq!(outcome.evicted, vec!["stale", "cached"]);
        assert_eq!(outcome.freed_bytes, 400);
        assert_eq!(outcome.usage_after, 550);
    }

    #[tokio::test]
    async fn test_evicts_every_format_of_a_book() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(
            &db,
            "multi",
            0,
            &[(BookFormat::Epub, 100), (BookFormat::Pdf, 150)],
        )
        .await;
        seed(&db, "keep", 10, &[(BookFormat::Epub, 100)]).await;

        let oracle = StaticQuota::new(950, 1000);
        let outcome = EvictionPolicy::default()
            .ensure_capacity(&db, &oracle, 0, None)
            .await
            .unwrap();

        assert_eq!(outcome.evicted, vec!["multi"]);
        assert_eq!(outcome.freed_bytes, 250);
        assert_eq!(outcome.usage_after, 700);
        assert!(db.blobs().list_by_book("multi").await.unwrap().is_empty());
        assert!(db.records().get("keep").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_kept_book_is_skipped() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(&db, "incoming", 0, &[(BookFormat::Epub, 100)]).await;
        seed(&db, "other", 10, &[(BookFormat::Epub, 100)]).await;

        let oracle = StaticQuota::new(950, 1000);
        let outcome = EvictionPolicy::default()
            .ensure_capacity(&db, &oracle, 100, Some("incoming"))
            .await
            .unwrap();

        assert_eq!(outcome.evicted, vec!["other"]);
        assert_eq!(outcome.usage_after, 850);
        assert!(db.records().get("incoming").await.unwrap().is_some());
        assert_eq!(db.blobs().list_by_book("incoming").await.unwrap().len(), 1);
    }
}
