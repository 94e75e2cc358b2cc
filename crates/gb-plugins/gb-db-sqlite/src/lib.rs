//! # gb-db-sqlite Implementation
//!
//! This module implements `ThreadRepo` on a single SQLite table. Each
//! thread is one row; its posts live in the `dat` column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gb_core::models::{Thread, ThreadFilter, ThreadId};
use gb_core::traits::ThreadRepo;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS threads (
  id INTEGER PRIMARY KEY,
  archived INTEGER NOT NULL DEFAULT 0,
  board TEXT NOT NULL,
  dat TEXT NOT NULL DEFAULT '',
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_threads_board ON threads(board);
CREATE INDEX IF NOT EXISTS idx_threads_active ON threads(board, archived, updated_at DESC);
CREATE TABLE IF NOT EXISTS thread_ids (
  slot INTEGER PRIMARY KEY CHECK (slot = 1),
  last_id INTEGER NOT NULL
);
INSERT OR IGNORE INTO thread_ids (slot, last_id)
  SELECT 1, COALESCE(MAX(id), 0) FROM threads;
"#;

const COLUMNS: &str = "id, board, dat, archived, created_at, updated_at";

pub struct SqliteThreadRepo {
    pool: SqlitePool,
}

impl SqliteThreadRepo {
    /// Opens (creating if needed) the database at `url` and applies the schema.
    ///
    /// # Developer Note
    /// An in-memory database lives inside one connection, so `:memory:` URLs
    /// get a single connection that is never recycled.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        tracing::info!(url, "sqlite thread store ready");
        Ok(Self { pool })
    }
}

// Timestamps are stored as unix milliseconds.
fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_thread(row: &SqliteRow) -> anyhow::Result<Thread> {
    Ok(Thread {
        id: row.try_get("id")?,
        board: row.try_get("board")?,
        dat: row.try_get("dat")?,
        archived: row.try_get("archived")?,
        created_at: millis_to_datetime(row.try_get("created_at")?),
        updated_at: millis_to_datetime(row.try_get("updated_at")?),
    })
}

#[async_trait]
impl ThreadRepo for SqliteThreadRepo {
    /// Ids come from the `thread_ids` high-water mark, claimed in the same
    /// transaction as the INSERT. Two threads opened in the same second get
    /// distinct keys, and deleting the newest thread never frees its id.
    async fn create_thread(
        &self,
        board: &str,
        dat: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<ThreadId>> {
        let mut tx = self.pool.begin().await?;

        let id: ThreadId = sqlx::query(
            "UPDATE thread_ids SET last_id = MAX(?, last_id + 1) WHERE slot = 1 RETURNING last_id",
        )
        .bind(now.timestamp())
        .fetch_one(&mut *tx)
        .await?
        .try_get("last_id")?;

        let row = sqlx::query(
            "INSERT INTO threads (id, board, dat, archived, created_at, updated_at) \
             VALUES (?, ?, ?, 0, ?, ?) RETURNING id",
        )
        .bind(id)
        .bind(board)
        .bind(dat)
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.map(|row| row.try_get("id")).transpose()?)
    }

    async fn get_thread(&self, id: ThreadId) -> anyhow::Result<Option<Thread>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM threads WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_thread).transpose()
    }

    /// Concatenation and timestamp bump happen in one statement, guarded by
    /// `archived = 0`, so concurrent replies can neither interleave nor land
    /// on an archived thread.
    async fn append(
        &self,
        id: ThreadId,
        line: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Thread>> {
        let row = sqlx::query(&format!(
            "UPDATE threads SET dat = dat || ?, updated_at = ? \
             WHERE id = ? AND archived = 0 RETURNING {COLUMNS}"
        ))
        .bind(line)
        .bind(now.timestamp_millis())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_thread).transpose()
    }

    /// Compare-and-swap on the whole blob.
    async fn replace_dat(&self, id: ThreadId, expected: &str, dat: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE threads SET dat = ? WHERE id = ? AND dat = ?")
            .bind(dat)
            .bind(id)
            .bind(expected)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_archived(&self, id: ThreadId, archived: bool) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE threads SET archived = ? WHERE id = ?")
            .bind(archived)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_thread(&self, id: ThreadId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM threads WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_threads(&self, filter: ThreadFilter) -> anyhow::Result<Vec<Thread>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM threads WHERE 1 = 1"));
        if let Some(board) = filter.board {
            query.push(" AND board = ").push_bind(board);
        }
        if let Some(needle) = filter.contains {
            // instr() instead of LIKE: no wildcard escaping needed
            query.push(" AND instr(dat, ").push_bind(needle).push(") > 0");
        }
        query.push(" ORDER BY updated_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_thread).collect()
    }
}
