//! Error types for the reader service

use std::fmt;

#[derive(Debug)]
pub enum ReaderError {
    Cache(book_cache::CacheError),
    Library(library_client::LibraryError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::Cache(err) => write!(f, "Cache error: {}", err),
            ReaderError::Library(err) => write!(f, "Library error: {}", err),
            ReaderError::Io(err) => write!(f, "IO error: {}", err),
            ReaderError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ReaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReaderError::Cache(err) => Some(err),
            ReaderError::Library(err) => Some(err),
            ReaderError::Io(err) => Some(err.as_ref()),
            ReaderError::Config(_) => None,
        }
    }
}

impl From<book_cache::CacheError> for ReaderError {
    fn from(err: book_cache::CacheError) -> Self {
        ReaderError::Cache(err)
    }
}

impl From<library_client::LibraryError> for ReaderError {
    fn from(err: library_client::LibraryError) -> Self {
        ReaderError::Library(err)
    }
}

impl From<std::io::Error> for ReaderError {
    fn from(err: std::io::Error) -> Self {
        ReaderError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ReaderError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ReaderError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReaderError>;
