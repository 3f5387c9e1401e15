//! HTTP server for reader endpoints
//!
//! Provides /health, /books, /books/recent, /books/{uuid}/file,
//! DELETE /books/{uuid} and /cache/usage.

use crate::types::{
    content_type, BookSummary, ErrorResponse, HealthResponse, RecentBook, UsageResponse,
};
use axum::{
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get},
    Router,
};
use book_cache::{BookCache, BookFormat, BookLoader, CacheError};
use chrono::{DateTime, Utc};
use library_client::{LibraryBook, LibraryClient, LibraryError};
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// How long a library listing is reused before refetching
const LISTING_TTL_SECS: u64 = 60;

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: Arc<BookCache>,
    pub library: LibraryClient,
    pub loader: BookLoader<LibraryClient>,
    listing: Cache<(), Arc<Vec<LibraryBook>>>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: Arc<BookCache>, library: LibraryClient) -> Self {
        let loader = BookLoader::new(cache.clone(), library.clone());
        let listing = Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(LISTING_TTL_SECS))
            .build();

        Self {
            cache,
            library,
            loader,
            listing,
            started_at: Utc::now(),
        }
    }

    /// Library listing, reused for up to a minute
    pub async fn listing(&self) -> Result<Arc<Vec<LibraryBook>>, LibraryError> {
        if let Some(books) = self.listing.get(&()).await {
            return Ok(books);
        }

        let books = Arc::new(self.library.list_books().await?);
        self.listing.insert((), books.clone()).await;
        Ok(books)
    }
}

pub type SharedState = Arc<ServerState>;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/books", get(list_books))
        .route("/books/recent", get(recent_books))
        .route("/books/{uuid}", delete(delete_book))
        .route("/books/{uuid}/file", get(get_book_file))
        .route("/cache/usage", get(cache_usage))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Response {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    match state.cache.stats().await {
        Ok(cache) => Json(HealthResponse {
            status: "ok".to_string(),
            uptime_secs,
            cache,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Cache unavailable");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Cache unavailable")
        }
    }
}

/// Cached formats and payload bytes per book id
async fn cached_index(
    cache: &BookCache,
) -> book_cache::Result<HashMap<String, (Vec<BookFormat>, u64)>> {
    let mut index: HashMap<String, (Vec<BookFormat>, u64)> = HashMap::new();
    for summary in cache.cache_summaries().await? {
        let slot = index.entry(summary.book_id).or_default();
        slot.0.push(summary.format);
        slot.1 += summary.size;
    }
    Ok(index)
}

/// Library listing annotated with local cache state
async fn list_books(State(state): State<SharedState>) -> Response {
    let books = match state.listing().await {
        Ok(books) => books,
        Err(e) => {
            warn!(error = %e, "Failed to fetch library listing");
            return error_response(StatusCode::BAD_GATEWAY, "Library unavailable");
        }
    };

    let annotations = async {
        let opened: HashMap<String, DateTime<Utc>> = state
            .cache
            .list_books_by_recency()
            .await?
            .into_iter()
            .map(|record| (record.id, record.last_opened_at))
            .collect();
        let cached = cached_index(&state.cache).await?;
        Ok::<_, CacheError>((opened, cached))
    };

    let (opened, mut cached) = match annotations.await {
        Ok(found) => found,
        Err(e) => {
            error!(error = %e, "Failed to read cache state");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Cache unavailable");
        }
    };

    let summaries: Vec<BookSummary> = books
        .iter()
        .map(|book| {
            let formats = cached
                .remove(&book.uuid)
                .map(|(formats, _)| formats)
                .unwrap_or_default();
            BookSummary::new(book, opened.get(&book.uuid).copied(), formats)
        })
        .collect();

    Json(summaries).into_response()
}

/// Cached books, most recently opened first
async fn recent_books(State(state): State<SharedState>) -> Response {
    let result = async {
        let records = state.cache.list_books_by_recency().await?;
        let mut cached = cached_index(&state.cache).await?;
        Ok::<_, CacheError>(
            records
                .into_iter()
                .map(|record| {
                    let (cached_formats, cached_bytes) =
                        cached.remove(&record.id).unwrap_or_default();
                    RecentBook {
                        id: record.id,
                        last_opened_at: record.last_opened_at,
                        cached_formats,
                        cached_bytes,
                    }
                })
                .collect::<Vec<_>>(),
        )
    };

    match result.await {
        Ok(recent) => Json(recent).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list recent books");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Cache unavailable")
        }
    }
}

/// Serve a book file, from the cache when possible
async fn get_book_file(State(state): State<SharedState>, Path(uuid): Path<String>) -> Response {
    let books = match state.listing().await {
        Ok(books) => books,
        Err(e) => {
            warn!(error = %e, "Failed to fetch library listing");
            return error_response(StatusCode::BAD_GATEWAY, "Library unavailable");
        }
    };

    let Some(book) = books.iter().find(|book| book.uuid == uuid) else {
        return error_response(StatusCode::NOT_FOUND, "Book not found");
    };

    match state.loader.open(&book.uuid, &book.formats).await {
        Ok(opened) => {
            let cache_header = if opened.from_cache { "HIT" } else { "MISS" };
            let disposition = format!(
                "inline; filename*=UTF-8''{}",
                urlencoding::encode(&opened.filename)
            );

            (
                [
                    (header::CONTENT_TYPE, content_type(&opened.format).to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                    (HeaderName::from_static("x-cache"), cache_header.to_string()),
                ],
                opened.data,
            )
                .into_response()
        }
        Err(e) => {
            let status = match &e {
                CacheError::Transport(_) | CacheError::IntegrityMismatch { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                CacheError::NoReadableFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(book_id = %uuid, error = %e, "Failed to open book");
            error_response(status, e.to_string())
        }
    }
}

/// Remove a book and all its cached files
async fn delete_book(State(state): State<SharedState>, Path(uuid): Path<String>) -> Response {
    match state.cache.delete_book(&uuid).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!(book_id = %uuid, error = %e, "Failed to delete book");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Cache unavailable")
        }
    }
}

async fn cache_usage(State(state): State<SharedState>) -> Response {
    let result = async {
        let total_bytes = state.cache.get_total_cache_usage().await?;
        let estimate = state.cache.estimate().await?;
        Ok::<_, CacheError>(UsageResponse {
            total_bytes,
            estimate,
        })
    };

    match result.await {
        Ok(usage) => Json(usage).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to read cache usage");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Cache unavailable")
        }
    }
}
