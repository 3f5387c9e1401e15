//! Client for the e-book library service
//!
//! The library exposes its index as JSON at `/api/list` and serves book files
//! statically under `/library/`. [`LibraryClient`] implements
//! [`book_cache::FileTransport`] so the cache can fetch through it.

pub mod client;
pub mod error;
pub mod types;

pub use client::LibraryClient;
pub use error::{LibraryError, Result};
pub use types::{FileMetaResponse, LibraryBook};
