//! SQLite storage service shared by the record and blob stores

use crate::blobs::{self, BlobStore};
use crate::error::Result;
use crate::records::{self, RecordStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Handle to the cache database.
///
/// The pool holds a single connection, so a transaction excludes every other
/// reader and writer until it commits.
#[derive(Debug, Clone)]
pub struct CacheDb {
    pool: SqlitePool,
}

impl CacheDb {
    /// Open (creating if missing) a database file and run migrations
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        info!(path = ?path, "Opening cache database");
        Self::connect_with(opts).await
    }

    /// Open a private in-memory database (tests, ephemeral sessions)
    pub async fn open_in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect_with(opts).await
    }

    async fn connect_with(opts: SqliteConnectOptions) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Run schema migrations (tracked in `_sqlx_migrations`)
    pub async fn migrate(&self) -> Result<()> {
        debug!("Running cache database migrations");
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn records(&self) -> RecordStore {
        RecordStore::new(self.pool.clone())
    }

    pub fn blobs(&self) -> BlobStore {
        BlobStore::new(self.pool.clone())
    }

    /// Delete a book's payloads and its record in one transaction.
    ///
    /// Returns the number of payloads removed; deleting an unknown book is a
    /// no-op.
    pub async fn delete_book(&self, id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let removed = blobs::delete_all_for_book_in(&mut tx, id).await?;
        records::delete_in(&mut tx, id).await?;
        tx.commit().await?;

        debug!(book_id = %id, removed, "Deleted book from cache");
        Ok(removed)
    }

    /// Close the pool, waiting for the connection to be returned
    pub async fn close(&self) {
        info!("Closing cache database...");
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
