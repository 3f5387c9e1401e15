//! Quota oracle adapters
//!
//! A [`QuotaOracle`] reports current storage usage and the quota it counts
//! against. `Ok(None)` means the environment cannot report a quota; callers
//! treat that the same as a zero quota and skip eviction.

use crate::error::Result;
use crate::types::StorageEstimate;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::sync::atomic::{AtomicU64, Ordering};

#[async_trait]
pub trait QuotaOracle: Send + Sync {
    /// Current usage and quota, or `None` when unsupported
    async fn estimate(&self) -> Result<Option<StorageEstimate>>;
}

/// Measures the cache database itself against a configured byte budget.
///
/// Usage counts live pages only (`page_count - freelist_count`), so space
/// released by deletes is reflected before the file is vacuumed. A budget of
/// zero reports unsupported.
#[derive(Debug, Clone)]
pub struct StoreQuota {
    pool: SqlitePool,
    quota_bytes: u64,
}

impl StoreQuota {
    pub fn new(pool: SqlitePool, quota_bytes: u64) -> Self {
        Self { pool, quota_bytes }
    }

    async fn pragma(&self, name: &str) -> Result<u64> {
        let value: i64 = sqlx::query_scalar(&format!("PRAGMA {}", name))
            .fetch_one(&self.pool)
            .await?;
        Ok(value.max(0) as u64)
    }
}

#[async_trait]
impl QuotaOracle for StoreQuota {
    async fn estimate(&self) -> Result<Option<StorageEstimate>> {
        if self.quota_bytes == 0 {
            return Ok(None);
        }

        let page_size = self.pragma("page_size").await?;
        let page_count = self.pragma("page_count").await?;
        let freelist = self.pragma("freelist_count").await?;
        let usage = page_count.saturating_sub(freelist) * page_size;

        Ok(Some(StorageEstimate::new(usage, self.quota_bytes)))
    }
}

/// Reports fixed values that the owner can adjust
#[derive(Debug, Default)]
pub struct StaticQuota {
    usage_bytes: AtomicU64,
    quota_bytes: AtomicU64,
}

impl StaticQuota {
    pub fn new(usage_bytes: u64, quota_bytes: u64) -> Self {
        Self {
            usage_bytes: AtomicU64::new(usage_bytes),
            quota_bytes: AtomicU64::new(quota_bytes),
        }
    }

    pub fn set_usage(&self, usage_bytes: u64) {
        self.usage_bytes.store(usage_bytes, Ordering::Relaxed);
    }

    pub fn set_quota(&self, quota_bytes: u64) {
        self.quota_bytes.store(quota_bytes, Ordering::Relaxed);
    }
}

#[async_trait]
impl QuotaOracle for StaticQuota {
    async fn estimate(&self) -> Result<Option<StorageEstimate>> {
        Ok(Some(StorageEstimate::new(
            self.usage_bytes.load(Ordering::Relaxed),
            self.quota_bytes.load(Ordering::Relaxed),
        )))
    }
}

/// An environment without quota introspection
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedQuota;

#[async_trait]
impl QuotaOracle for UnsupportedQuota {
    async fn estimate(&self) -> Result<Option<StorageEstimate>> {
        Ok(None)
    }
}
