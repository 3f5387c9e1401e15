//! Cache types

use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Metadata for a book the reader has opened at least once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: String,
    pub last_opened_at: DateTime<Utc>,
}

impl BookRecord {
    pub fn new(id: impl Into<String>, last_opened_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            last_opened_at,
        }
    }

    /// A record stamped with the current time
    pub fn opened_now(id: impl Into<String>) -> Self {
        Self::new(id, Utc::now())
    }
}

/// Partial update for a [`BookRecord`]; unset fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct BookRecordPatch {
    pub last_opened_at: Option<DateTime<Utc>>,
}

impl BookRecordPatch {
    pub fn is_empty(&self) -> bool {
        self.last_opened_at.is_none()
    }
}

/// File format tag of a cached payload
///
/// Unknown tags are kept verbatim (lowercased) in [`BookFormat::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BookFormat {
    Epub,
    Pdf,
    Mobi,
    Fb2,
    Cbz,
    Other(String),
}

impl BookFormat {
    /// Formats the reader can render
    pub const READABLE: [BookFormat; 5] = [
        BookFormat::Pdf,
        BookFormat::Epub,
        BookFormat::Mobi,
        BookFormat::Fb2,
        BookFormat::Cbz,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            BookFormat::Epub => "epub",
            BookFormat::Pdf => "pdf",
            BookFormat::Mobi => "mobi",
            BookFormat::Fb2 => "fb2",
            BookFormat::Cbz => "cbz",
            BookFormat::Other(tag) => tag,
        }
    }

    pub fn is_readable(&self) -> bool {
        !matches!(self, BookFormat::Other(_))
    }

    /// Derive the format from a file path's extension
    pub fn from_path(path: &str) -> Option<Self> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(Self::from(ext))
    }
}

impl From<&str> for BookFormat {
    fn from(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "epub" => BookFormat::Epub,
            "pdf" => BookFormat::Pdf,
            "mobi" => BookFormat::Mobi,
            "fb2" => BookFormat::Fb2,
            "cbz" => BookFormat::Cbz,
            other => BookFormat::Other(other.to_string()),
        }
    }
}

impl From<String> for BookFormat {
    fn from(tag: String) -> Self {
        BookFormat::from(tag.as_str())
    }
}

impl From<BookFormat> for String {
    fn from(format: BookFormat) -> Self {
        format.as_str().to_string()
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase hex SHA-256 of a payload
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Primary key of a cached payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub book_id: String,
    pub format: BookFormat,
}

impl CacheKey {
    pub fn new(book_id: impl Into<String>, format: BookFormat) -> Self {
        Self {
            book_id: book_id.into(),
            format,
        }
    }
}

/// A cached book file in one format
#[derive(Clone, PartialEq, Eq)]
pub struct BookCacheEntry {
    pub book_id: String,
    pub format: BookFormat,
    pub book_hash: String,
    pub size: u64,
    pub data: Vec<u8>,
}

impl BookCacheEntry {
    /// Build an entry, deriving size and hash from the payload
    pub fn new(book_id: impl Into<String>, format: BookFormat, data: Vec<u8>) -> Self {
        Self {
            book_id: book_id.into(),
            format,
            book_hash: content_hash(&data),
            size: data.len() as u64,
            data,
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.book_id.clone(), self.format.clone())
    }

    /// Check that the declared size matches the payload
    pub fn verify_size(&self) -> Result<()> {
        let actual = self.data.len() as u64;
        if self.size != actual {
            return Err(CacheError::SizeMismatch {
                expected: self.size,
                actual,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for BookCacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookCacheEntry")
            .field("book_id", &self.book_id)
            .field("format", &self.format)
            .field("book_hash", &self.book_hash)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// A cached payload without its bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntrySummary {
    pub book_id: String,
    pub format: BookFormat,
    pub book_hash: String,
    pub size: u64,
}

/// Storage usage and quota reported by a [`QuotaOracle`](crate::QuotaOracle)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEstimate {
    pub usage_bytes: u64,
    pub quota_bytes: u64,
}

impl StorageEstimate {
    pub fn new(usage_bytes: u64, quota_bytes: u64) -> Self {
        Self {
            usage_bytes,
            quota_bytes,
        }
    }

    /// A zero quota carries no budget to evict against
    pub fn has_quota(&self) -> bool {
        self.quota_bytes > 0
    }

    pub fn usage_ratio(&self) -> f64 {
        if self.quota_bytes == 0 {
            return 0.0;
        }
        self.usage_bytes as f64 / self.quota_bytes as f64
    }
}

/// Result of one `ensure_capacity` run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvictionOutcome {
    pub triggered: bool,
    /// Book ids in the order they were evicted
    pub evicted: Vec<String>,
    pub freed_bytes: u64,
    pub usage_before: u64,
    pub usage_after: u64,
    pub target_usage: u64,
}

impl EvictionOutcome {
    pub fn skipped(usage: u64) -> Self {
        Self {
            usage_before: usage,
            usage_after: usage,
            ..Default::default()
        }
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub books: usize,
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
}
