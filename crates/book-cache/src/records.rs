//! Record store: one metadata row per book, indexed by last-opened time

use crate::error::Result;
use crate::types::{BookRecord, BookRecordPatch};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::FromRow;

#[derive(Debug, FromRow)]
struct BookInfoRow {
    id: String,
    last_opened_at: i64,
}

impl From<BookInfoRow> for BookRecord {
    fn from(row: BookInfoRow) -> Self {
        BookRecord {
            id: row.id,
            last_opened_at: DateTime::<Utc>::from_timestamp_millis(row.last_opened_at)
                .unwrap_or_default(),
        }
    }
}

/// Durable keyed storage for [`BookRecord`]s
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or overwrite a record; last write wins
    pub async fn put(&self, record: &BookRecord) -> Result<String> {
        sqlx::query(
            r#"
            INSERT INTO book_info (id, last_opened_at)
            VALUES (?1, ?2)
            ON CONFLICT (id) DO UPDATE SET
                last_opened_at = excluded.last_opened_at
            "#,
        )
        .bind(&record.id)
        .bind(record.last_opened_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(record.id.clone())
    }

    pub async fn get(&self, id: &str) -> Result<Option<BookRecord>> {
        let row = sqlx::query_as::<_, BookInfoRow>(
            "SELECT id, last_opened_at FROM book_info WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(BookRecord::from))
    }

    /// Merge the set fields of `patch` into an existing record.
    ///
    /// Returns `false` when no record with `id` exists.
    pub async fn update(&self, id: &str, patch: &BookRecordPatch) -> Result<bool> {
        let Some(last_opened_at) = patch.last_opened_at else {
            return Ok(self.get(id).await?.is_some());
        };

        let result = sqlx::query("UPDATE book_info SET last_opened_at = ?1 WHERE id = ?2")
            .bind(last_opened_at.timestamp_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a record; absent ids are not an error
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        delete_in(&mut conn, id).await
    }

    /// All records, most recently opened first
    pub async fn list_by_last_opened_desc(&self) -> Result<Vec<BookRecord>> {
        let rows = sqlx::query_as::<_, BookInfoRow>(
            "SELECT id, last_opened_at FROM book_info ORDER BY last_opened_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BookRecord::from).collect())
    }

    /// All records, least recently opened first
    pub async fn list_by_last_opened_asc(&self) -> Result<Vec<BookRecord>> {
        let rows = sqlx::query_as::<_, BookInfoRow>(
            "SELECT id, last_opened_at FROM book_info ORDER BY last_opened_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BookRecord::from).collect())
    }

    pub async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM book_info")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

/// Delete a record on an existing connection (or transaction)
pub(crate) async fn delete_in(conn: &mut SqliteConnection, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM book_info WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
