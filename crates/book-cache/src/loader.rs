//! Opening books through the cache
//!
//! [`BookLoader`] serves a book from the cache when it can and otherwise
//! fetches it through a [`FileTransport`], verifies it and caches it. A failed
//! cache write never prevents the book from being returned.

use crate::cache::BookCache;
use crate::error::{CacheError, Result};
use crate::types::{BookCacheEntry, BookFormat, BookRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Size, format and content hash of a remote file, without its bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub size: u64,
    pub format: BookFormat,
    #[serde(default)]
    pub content_hash: Option<String>,
}

/// Fetch-by-path access to the library's book files
#[async_trait]
pub trait FileTransport: Send + Sync {
    /// Raw bytes of the file at `path`; failures map to [`CacheError::Transport`]
    async fn fetch(&self, path: &str) -> Result<Vec<u8>>;

    /// Metadata side-channel; `Ok(None)` when the library does not offer one
    async fn metadata(&self, _path: &str) -> Result<Option<FileMetadata>> {
        Ok(None)
    }
}

#[async_trait]
impl<T: FileTransport + ?Sized> FileTransport for Arc<T> {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        (**self).fetch(path).await
    }

    async fn metadata(&self, path: &str) -> Result<Option<FileMetadata>> {
        (**self).metadata(path).await
    }
}

/// A book file ready to hand to a renderer
#[derive(Clone)]
pub struct OpenedBook {
    pub book_id: String,
    pub format: BookFormat,
    pub filename: String,
    pub data: Vec<u8>,
    pub from_cache: bool,
}

impl std::fmt::Debug for OpenedBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedBook")
            .field("book_id", &self.book_id)
            .field("format", &self.format)
            .field("filename", &self.filename)
            .field("size", &self.data.len())
            .field("from_cache", &self.from_cache)
            .finish()
    }
}

/// Pick the first path with a format the reader can render
pub fn select_readable(paths: &[String]) -> Option<(&str, BookFormat)> {
    paths.iter().find_map(|path| {
        BookFormat::from_path(path)
            .filter(BookFormat::is_readable)
            .map(|format| (path.as_str(), format))
    })
}

fn file_name(path: &str) -> String {
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(path)
        .to_string()
}

pub struct BookLoader<T> {
    cache: Arc<BookCache>,
    transport: T,
}

impl<T: FileTransport> BookLoader<T> {
    pub fn new(cache: Arc<BookCache>, transport: T) -> Self {
        Self { cache, transport }
    }

    pub fn cache(&self) -> &Arc<BookCache> {
        &self.cache
    }

    /// Open `book_id` from one of its library file `paths`.
    ///
    /// The book's record is created or touched only once its bytes are in
    /// hand, so a failed fetch leaves the cache as it was.
    pub async fn open(&self, book_id: &str, paths: &[String]) -> Result<OpenedBook> {
        let (path, format) = select_readable(paths)
            .ok_or_else(|| CacheError::NoReadableFormat(book_id.to_string()))?;

        let expected_hash = match self.transport.metadata(path).await {
            Ok(meta) => meta.and_then(|m| m.content_hash),
            Err(e) => {
                warn!(book_id, path, error = %e, "Metadata lookup failed, trusting cache");
                None
            }
        };

        if let Some(entry) = self.cache.db().blobs().get(book_id, &format).await? {
            match &expected_hash {
                Some(expected) if !expected.eq_ignore_ascii_case(&entry.book_hash) => {
                    debug!(book_id, format = %format, "Cached file is stale, refetching");
                }
                _ => {
                    self.cache.count_lookup(true);
                    self.record_open(book_id).await?;
                    debug!(book_id, format = %format, "Cache hit");
                    return Ok(OpenedBook {
                        book_id: book_id.to_string(),
                        format,
                        filename: file_name(path),
                        data: entry.data,
                        from_cache: true,
                    });
                }
            }
        }
        self.cache.count_lookup(false);

        let data = self.transport.fetch(path).await?;
        let entry = BookCacheEntry::new(book_id, format.clone(), data);

        if let Some(expected) = expected_hash {
            if !expected.eq_ignore_ascii_case(&entry.book_hash) {
                warn!(book_id, path, "Fetched file does not match its content hash");
                return Err(CacheError::IntegrityMismatch {
                    expected,
                    actual: entry.book_hash,
                });
            }
        }

        self.record_open(book_id).await?;
        if let Err(e) = self.cache.add_book_cache_with_eviction(&entry).await {
            warn!(book_id, error = %e, "Failed to cache book file");
        }

        Ok(OpenedBook {
            book_id: book_id.to_string(),
            format,
            filename: file_name(path),
            data: entry.data,
            from_cache: false,
        })
    }

    async fn record_open(&self, book_id: &str) -> Result<()> {
        if self.cache.get_book(book_id).await?.is_some() {
            self.cache.touch_book(book_id).await
        } else {
            self.cache
                .add_book_metadata(&BookRecord::opened_now(book_id))
                .await
                .map(|_| ())
        }
    }
}
