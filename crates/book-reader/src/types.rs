//! Response types for the reader service

use book_cache::{BookFormat, CacheStats, StorageEstimate};
use chrono::{DateTime, Utc};
use library_client::LibraryBook;
use serde::{Deserialize, Serialize};

/// A library book annotated with its local cache state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSummary {
    pub id: u64,
    pub uuid: String,
    pub title: String,
    pub authors: String,
    pub cover: Option<String>,
    pub comments: Option<String>,
    pub formats: Vec<String>,
    pub last_opened_at: Option<DateTime<Utc>>,
    pub cached_formats: Vec<BookFormat>,
}

impl BookSummary {
    pub fn new(
        book: &LibraryBook,
        last_opened_at: Option<DateTime<Utc>>,
        cached_formats: Vec<BookFormat>,
    ) -> Self {
        Self {
            id: book.id,
            uuid: book.uuid.clone(),
            title: book.title.clone(),
            authors: book.authors.clone(),
            cover: book.cover.clone(),
            comments: book.comments.clone(),
            formats: book.formats.clone(),
            last_opened_at,
            cached_formats,
        }
    }
}

/// A cached book record, most recently opened first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentBook {
    pub id: String,
    pub last_opened_at: DateTime<Utc>,
    pub cached_formats: Vec<BookFormat>,
    pub cached_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub total_bytes: u64,
    pub estimate: Option<StorageEstimate>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// MIME type served for a book format
pub fn content_type(format: &BookFormat) -> &'static str {
    match format {
        BookFormat::Epub => "application/epub+zip",
        BookFormat::Pdf => "application/pdf",
        BookFormat::Mobi => "application/x-mobipocket-ebook",
        BookFormat::Fb2 => "application/x-fictionbook+xml",
        BookFormat::Cbz => "application/vnd.comicbook+zip",
        BookFormat::Other(_) => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type() {
        assert_eq!(content_type(&BookFormat::Epub), "application/epub+zip");
        assert_eq!(content_type(&BookFormat::Pdf), "application/pdf");
        assert_eq!(
            content_type(&BookFormat::Other("azw3".to_string())),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_book_summary_serialization() {
        let book: LibraryBook = serde_json::from_str(
            r#"{"id": 7, "uuid": "uuid-7", "title": "Dune", "authors": "Frank Herbert",
                "formats": ["/books/Frank Herbert/Dune (7)/Dune - Frank Herbert.epub"]}"#,
        )
        .unwrap();
        let summary = BookSummary::new(&book, None, vec![BookFormat::Epub]);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["uuid"], "uuid-7");
        assert_eq!(json["cached_formats"][0], "epub");
        assert!(json["last_opened_at"].is_null());
    }

    #[test]
    fn test_usage_response_serialization() {
        let response = UsageResponse {
            total_bytes: 300,
            estimate: Some(StorageEstimate::new(4096, 1 << 20)),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["total_bytes"], 300);
        assert_eq!(json["estimate"]["quota_bytes"], 1 << 20);
    }
}
