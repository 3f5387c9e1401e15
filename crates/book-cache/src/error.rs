//! Error types for the book cache

use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    Database(Box<sqlx::Error>),
    Migration(String),
    Io(Box<std::io::Error>),
    InvalidConfig(String),
    SizeMismatch { expected: u64, actual: u64 },
    Transport(String),
    IntegrityMismatch { expected: String, actual: String },
    NoReadableFormat(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Database(err) => write!(f, "Database error: {}", err),
            CacheError::Migration(msg) => write!(f, "Migration error: {}", msg),
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::InvalidConfig(msg) => write!(f, "Invalid cache configuration: {}", msg),
            CacheError::SizeMismatch { expected, actual } => write!(
                f,
                "Cache entry size mismatch: declared {} bytes, payload has {}",
                expected, actual
            ),
            CacheError::Transport(msg) => write!(f, "Transport error: {}", msg),
            CacheError::IntegrityMismatch { expected, actual } => write!(
                f,
                "Integrity mismatch: expected hash {}, got {}",
                expected, actual
            ),
            CacheError::NoReadableFormat(book_id) => {
                write!(f, "No readable format available for book {}", book_id)
            }
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Database(err) => Some(err.as_ref()),
            CacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        CacheError::Database(Box::new(err))
    }
}

impl From<sqlx::migrate::MigrateError> for CacheError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CacheError::Migration(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
