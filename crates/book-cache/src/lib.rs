//! Quota-aware persistent cache for e-books
//!
//! Book metadata and book files are kept in a single SQLite database. Writes
//! of book files go through [`BookCache::add_book_cache_with_eviction`], which
//! evicts least-recently-opened books once usage crosses the high-water mark.
//!
//! # Example
//!
//! ```no_run
//! use book_cache::{BookCache, BookCacheEntry, BookFormat, BookRecord, CacheDb, StoreQuota};
//! use std::sync::Arc;
//!
//! # async fn example() -> book_cache::Result<()> {
//! let db = CacheDb::open("./cache/books.db").await?;
//! let oracle = Arc::new(StoreQuota::new(db.pool().clone(), 1 << 30));
//! let cache = BookCache::new(db, oracle);
//!
//! cache.add_book_metadata(&BookRecord::opened_now("book-uuid")).await?;
//! cache
//!     .add_book_cache_with_eviction(&BookCacheEntry::new("book-uuid", BookFormat::Epub, vec![]))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod blobs;
pub mod cache;
pub mod db;
pub mod error;
pub mod eviction;
pub mod loader;
pub mod quota;
pub mod records;
pub mod types;

pub use blobs::BlobStore;
pub use cache::BookCache;
pub use db::CacheDb;
pub use error::{CacheError, Result};
pub use eviction::{EvictionPolicy, DEFAULT_HIGH_WATER_MARK, DEFAULT_LOW_WATER_MARK};
pub use loader::{select_readable, BookLoader, FileMetadata, FileTransport, OpenedBook};
pub use quota::{QuotaOracle, StaticQuota, StoreQuota, UnsupportedQuota};
pub use records::RecordStore;
pub use types::{
    content_hash, BookCacheEntry, BookFormat, BookRecord, BookRecordPatch, CacheEntrySummary,
    CacheKey, CacheStats, EvictionOutcome, StorageEstimate,
};
