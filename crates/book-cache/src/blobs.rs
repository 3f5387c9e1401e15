//! Blob store: cached book files keyed by (book id, format)

use crate::error::Result;
use crate::types::{BookCacheEntry, BookFormat, CacheEntrySummary, CacheKey};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::FromRow;

#[derive(Debug, FromRow)]
struct BookCacheRow {
    book_id: String,
    format: String,
    book_hash: String,
    size: i64,
    data: Vec<u8>,
}

impl From<BookCacheRow> for BookCacheEntry {
    fn from(row: BookCacheRow) -> Self {
        BookCacheEntry {
            book_id: row.book_id,
            format: BookFormat::from(row.format),
            book_hash: row.book_hash,
            size: row.size.max(0) as u64,
            data: row.data,
        }
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    book_id: String,
    format: String,
    book_hash: String,
    size: i64,
}

impl From<SummaryRow> for CacheEntrySummary {
    fn from(row: SummaryRow) -> Self {
        CacheEntrySummary {
            book_id: row.book_id,
            format: BookFormat::from(row.format),
            book_hash: row.book_hash,
            size: row.size.max(0) as u64,
        }
    }
}

/// Durable keyed storage for [`BookCacheEntry`] payloads
#[derive(Debug, Clone)]
pub struct BlobStore {
    pool: SqlitePool,
}

impl BlobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or overwrite the payload for (book id, format)
    pub async fn put(&self, entry: &BookCacheEntry) -> Result<()> {
        entry.verify_size()?;

        sqlx::query(
            r#"
            INSERT INTO book_cache (book_id, format, book_hash, size, data)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (book_id, format) DO UPDATE SET
                book_hash = excluded.book_hash,
                size = excluded.size,
                data = excluded.data
            "#,
        )
        .bind(&entry.book_id)
        .bind(entry.format.as_str())
        .bind(&entry.book_hash)
        .bind(entry.size as i64)
        .bind(&entry.data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, book_id: &str, format: &BookFormat) -> Result<Option<BookCacheEntry>> {
        let row = sqlx::query_as::<_, BookCacheRow>(
            r#"
            SELECT book_id, format, book_hash, size, data
            FROM book_cache
            WHERE book_id = ?1 AND format = ?2
            "#,
        )
        .bind(book_id)
        .bind(format.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(BookCacheEntry::from))
    }

    /// Every cached format of a book, in no particular order
    pub async fn list_by_book(&self, book_id: &str) -> Result<Vec<BookCacheEntry>> {
        let rows = sqlx::query_as::<_, BookCacheRow>(
            "SELECT book_id, format, book_hash, size, data FROM book_cache WHERE book_id = ?1",
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BookCacheEntry::from).collect())
    }

    /// Metadata of every cached payload, without the bytes
    pub async fn summaries(&self) -> Result<Vec<CacheEntrySummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT book_id, format, book_hash, size FROM book_cache ORDER BY book_id, format",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CacheEntrySummary::from).collect())
    }

    /// Bulk delete by explicit keys; missing keys are ignored
    pub async fn delete_many(&self, keys: &[CacheKey]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM book_cache WHERE book_id = ?1 AND format = ?2")
                .bind(&key.book_id)
                .bind(key.format.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Remove every payload of a book, returning how many were removed
    pub async fn delete_all_for_book(&self, book_id: &str) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        delete_all_for_book_in(&mut conn, book_id).await
    }

    /// Sum of `size` across all cached payloads
    pub async fn total_size(&self) -> Result<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(size), 0) FROM book_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }

    /// Sum of `size` across one book's cached payloads
    pub async fn size_for_book(&self, book_id: &str) -> Result<u64> {
        let total: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(size), 0) FROM book_cache WHERE book_id = ?1")
                .bind(book_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(total.max(0) as u64)
    }
}

/// Delete every payload of a book on an existing connection (or transaction)
pub(crate) async fn delete_all_for_book_in(conn: &mut SqliteConnection, book_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM book_cache WHERE book_id = ?1")
        .bind(book_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
