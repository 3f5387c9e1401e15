//! Error types for the library client

use std::fmt;

/// Errors that can occur when talking to the library service
#[derive(Debug)]
pub enum LibraryError {
    /// HTTP request failed
    Http(Box<reqwest::Error>),
    /// The service answered with a non-success status
    Status { status: u16, url: String },
    /// Failed to parse JSON response
    Json(serde_json::Error),
    /// The request was cancelled before it completed
    Cancelled,
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "Library HTTP error: {}", e),
            Self::Status { status, url } => write!(f, "Library returned {} for {}", status, url),
            Self::Json(e) => write!(f, "Library JSON parse error: {}", e),
            Self::Cancelled => write!(f, "Library request cancelled"),
        }
    }
}

impl std::error::Error for LibraryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e.as_ref()),
            Self::Json(e) => Some(e),
            Self::Status { .. } | Self::Cancelled => None,
        }
    }
}

impl From<reqwest::Error> for LibraryError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(Box::new(e))
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<LibraryError> for book_cache::CacheError {
    fn from(e: LibraryError) -> Self {
        book_cache::CacheError::Transport(e.to_string())
    }
}

/// Result type for library operations
pub type Result<T> = std::result::Result<T, LibraryError>;
