//! The SQLite-backed event store (§4.7).
//!
//! A single writer, concurrent readers (WAL-style access, §5). Appends are
//! durable — the write is committed before `append` returns, so the caller
//! may acknowledge its producer immediately afterward.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteJournalMode};
use sqlx::{Row, SqlitePool};

use crate::error::{StoreError, StoreResult};
use crate::event::{EventDirection, ExportFormat, NewEvent, ReadOptions, ReadOrder, StoredEvent};
use crate::migrations;

/// Handle to the relay's durable event store.
///
/// Cheap to clone: wraps a connection pool.
#[derive(Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    /// Open (creating if absent) the SQLite database at `path` and apply
    /// any pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the file cannot be opened, or
    /// [`StoreError::Migration`] if a migration fails to apply.
    pub async fn connect(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        Self::connect_with(SqlitePoolOptions::new().max_connections(8), options).await
    }

    /// Open an in-memory database, for tests. Each call gets its own
    /// isolated database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] or [`StoreError::Migration`].
    pub async fn connect_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::new().in_memory(true).create_if_missing(true);
        // A pooled in-memory SQLite database is invisible across
        // connections unless pinned to exactly one.
        Self::connect_with(SqlitePoolOptions::new().max_connections(1), options).await
    }

    async fn connect_with(pool_options: SqlitePoolOptions, options: SqliteConnectOptions) -> StoreResult<Self> {
        let pool = pool_options.connect_with(options).await?;
        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying pool, for components (upload tokens, session tokens)
    /// that share this database file but own their own query logic.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Append a new event. Durable before this returns (§4.7).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on a write failure, or
    /// [`StoreError::Serialization`] if `event.payload` cannot be
    /// serialized.
    pub async fn append(&self, event: NewEvent) -> StoreResult<StoredEvent> {
        let event_id = uuid::Uuid::new_v4().to_string();
        let payload_json = serde_json::to_string(&event.payload)?;
        let direction = direction_str(event.direction);
        let created_at = event.created_at.to_rfc3339();

        let mut tx = self.pool.begin().await?;
        let seq = sqlx::query(
            "INSERT INTO events (event_id, thread_id, turn_id, direction, role, method, payload_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event_id)
        .bind(&event.thread_id)
        .bind(&event.turn_id)
        .bind(direction)
        .bind(&event.role)
        .bind(&event.method)
        .bind(&payload_json)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let body = fts_body(&event.payload);
        sqlx::query("INSERT INTO events_fts (rowid, thread_id, body) VALUES (?, ?, ?)")
            .bind(seq)
            .bind(&event.thread_id)
            .bind(body)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(StoredEvent {
            seq,
            event_id,
            thread_id: event.thread_id,
            turn_id: event.turn_id,
            direction: event.direction,
            role: event.role,
            method: event.method,
            payload: event.payload,
            created_at: event.created_at,
        })
    }

    /// Ordered events for replay (§4.7).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on a query failure.
    pub async fn read(&self, thread_id: &str, opts: ReadOptions) -> StoreResult<Vec<StoredEvent>> {
        let order = match opts.order {
            ReadOrder::Ascending => "ASC",
            ReadOrder::Descending => "DESC",
        };
        let limit = opts.limit.unwrap_or(i64::MAX);
        let sql = format!(
            "SELECT id, event_id, thread_id, turn_id, direction, role, method, payload_json, created_at
             FROM events WHERE thread_id = ? ORDER BY created_at {order}, id {order} LIMIT ?"
        );
        let rows = sqlx::query(&sql).bind(thread_id).bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_event).collect()
    }

    /// FTS matches for `query` within a thread, ordered the same way as
    /// [`EventStore::read`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on a query failure.
    pub async fn search(&self, thread_id: &str, query: &str) -> StoreResult<Vec<StoredEvent>> {
        let rows = sqlx::query(
            "SELECT e.id, e.event_id, e.thread_id, e.turn_id, e.direction, e.role, e.method, e.payload_json, e.created_at
             FROM events_fts f JOIN events e ON e.id = f.rowid
             WHERE f.thread_id = ? AND f MATCH ?
             ORDER BY e.created_at ASC, e.id ASC",
        )
        .bind(thread_id)
        .bind(query)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_event).collect()
    }

    /// Stream a thread's events as `format`, one chunk per event
    /// (ndjson lines for JSON, a paragraph per event for markdown).
    ///
    /// # Errors
    ///
    /// The returned stream yields [`StoreError::Database`] if the
    /// underlying query fails while streaming.
    pub async fn export(&self, thread_id: &str, format: ExportFormat) -> StoreResult<BoxStream<'static, StoreResult<String>>> {
        let events = self.read(thread_id, ReadOptions { limit: None, order: ReadOrder::Ascending }).await?;
        let chunks: Vec<StoreResult<String>> = match format {
            ExportFormat::Json => events
                .iter()
                .map(|e| serde_json::to_string(e).map(|mut s| { s.push('\n'); s }).map_err(StoreError::from))
                .collect(),
            ExportFormat::Markdown => events.iter().map(|e| Ok(render_markdown_event(e))).collect(),
        };
        Ok(stream::iter(chunks).boxed())
    }

    /// Re-insert `events` under a freshly minted thread id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] or [`StoreError::Serialization`].
    pub async fn import(&self, events: Vec<NewEvent>) -> StoreResult<String> {
        let new_thread_id = uuid::Uuid::new_v4().to_string();
        for mut event in events {
            event.thread_id.clone_from(&new_thread_id);
            self.append(event).await?;
        }
        Ok(new_thread_id)
    }

    /// Set or clear a thread's archived flag.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on a write failure.
    pub async fn set_archived(&self, thread_id: &str, archived: bool) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let archived_at = archived.then(|| now.clone());
        sqlx::query(
            "INSERT INTO thread_metadata (thread_id, archived, archived_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(thread_id) DO UPDATE SET archived = excluded.archived, archived_at = excluded.archived_at, updated_at = excluded.updated_at",
        )
        .bind(thread_id)
        .bind(archived)
        .bind(&archived_at)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete events older than `retention`, returning the number of rows
    /// removed. Scheduled every 6 hours by the server's background loop.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on a write failure.
    pub async fn prune(&self, retention: Duration) -> StoreResult<u64> {
        let cutoff = (Utc::now() - chrono::Duration::from_std(retention).unwrap_or_default()).to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM events WHERE created_at < ?")
            .bind(&cutoff)
            .fetch_all(&mut *tx)
            .await?;
        if ids.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }
        for id in &ids {
            sqlx::query("DELETE FROM events_fts WHERE rowid = ?").bind(id).execute(&mut *tx).await?;
        }
        let deleted = sqlx::query("DELETE FROM events WHERE created_at < ?").bind(&cutoff).execute(&mut *tx).await?.rows_affected();
        tx.commit().await?;
        Ok(deleted)
    }
}

fn direction_str(direction: EventDirection) -> &'static str {
    match direction {
        EventDirection::Inbound => "inbound",
        EventDirection::Outbound => "outbound",
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> StoreResult<StoredEvent> {
    let direction: String = row.try_get("direction")?;
    let direction = match direction.as_str() {
        "inbound" => EventDirection::Inbound,
        _ => EventDirection::Outbound,
    };
    let payload_json: String = row.try_get("payload_json")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(StoredEvent {
        seq: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        thread_id: row.try_get("thread_id")?,
        turn_id: row.try_get("turn_id")?,
        direction,
        role: row.try_get("role")?,
        method: row.try_get("method")?,
        payload: serde_json::from_str(&payload_json)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|err| StoreError::Migration(format!("unparseable created_at: {err}")))?,
    })
}

/// Concatenate every string leaf in `payload` into one FTS-indexable body.
/// The FTS tokenizer handles word boundaries; this just needs to surface
/// the text fields buried in an arbitrary provider payload.
fn fts_body(payload: &Value) -> String {
    let mut out = String::new();
    collect_strings(payload, &mut out);
    out
}

fn collect_strings(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(s);
        }
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

fn render_markdown_event(event: &StoredEvent) -> String {
    let heading = event.method.as_deref().unwrap_or(event.role.as_str());
    format!("### {heading} ({})\n\n{}\n\n", event.created_at.to_rfc3339(), event.payload)
}
