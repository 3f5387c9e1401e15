//! Library service HTTP client

use crate::error::{LibraryError, Result};
use crate::types::{FileMetaResponse, LibraryBook};
use async_trait::async_trait;
use book_cache::{BookFormat, FileMetadata, FileTransport};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Client for the library index and its static file tree
#[derive(Debug, Clone)]
pub struct LibraryClient {
    base_url: String,
    library_root: Option<String>,
    http: reqwest::Client,
}

impl LibraryClient {
    /// Create a new client with default settings (30 second timeout)
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a new client with a custom timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            library_root: None,
            http,
        }
    }

    /// Strip this filesystem prefix from listed file paths before fetching.
    ///
    /// The index lists absolute paths inside the library directory, while the
    /// file tree is served relative to it.
    pub fn with_library_root(mut self, root: &str) -> Self {
        let root = root.trim_end_matches('/');
        self.library_root = (!root.is_empty()).then(|| root.to_string());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the full library listing
    pub async fn list_books(&self) -> Result<Vec<LibraryBook>> {
        let url = format!("{}/api/list", self.base_url);
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LibraryError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        let books: Vec<LibraryBook> = serde_json::from_slice(&body)?;
        debug!(count = books.len(), "Fetched library listing");
        Ok(books)
    }

    /// Fetch the listing, giving up as soon as `token` is cancelled
    pub async fn list_books_cancellable(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<LibraryBook>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Library listing cancelled");
                Err(LibraryError::Cancelled)
            }
            result = self.list_books() => result,
        }
    }

    /// URL of a listed file path under the static file tree
    pub fn file_url(&self, path: &str) -> String {
        let encoded: Vec<String> = self
            .relative_path(path)
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/library/{}", self.base_url, encoded.join("/"))
    }

    fn relative_path<'a>(&self, path: &'a str) -> &'a str {
        let path = match &self.library_root {
            Some(root) => path.strip_prefix(root.as_str()).unwrap_or(path),
            None => path,
        };
        path.trim_start_matches('/')
    }

    /// Download a book file
    pub async fn fetch_file(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.file_url(path);
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Library file request failed");
            return Err(LibraryError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let bytes = response.bytes().await?;
        debug!(url = %url, size = bytes.len(), "Fetched library file");
        Ok(bytes.to_vec())
    }

    /// Size, format and content hash of a file, when the library reports them
    pub async fn file_metadata(&self, path: &str) -> Result<Option<FileMetaResponse>> {
        let url = format!(
            "{}/api/meta?path={}",
            self.base_url,
            urlencoding::encode(self.relative_path(path))
        );
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let body = response.bytes().await?;
        Ok(Some(serde_json::from_slice(&body)?))
    }
}

#[async_trait]
impl FileTransport for LibraryClient {
    async fn fetch(&self, path: &str) -> book_cache::Result<Vec<u8>> {
        Ok(self.fetch_file(path).await?)
    }

    async fn metadata(&self, path: &str) -> book_cache::Result<Option<FileMetadata>> {
        let meta = self.file_metadata(path).await?;
        Ok(meta.map(|m| FileMetadata {
            size: m.size,
            format: BookFormat::from(m.format),
            content_hash: m.content_hash,
        }))
    }
}
