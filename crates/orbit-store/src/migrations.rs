//! Forward-only numbered migrations, applied at startup inside a
//! transaction and tracked by a `schema_version` table.
//!
//! There is no down-migration path — schema changes only ever add a new
//! numbered step to [`MIGRATIONS`], never edit or remove an applied one.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::{StoreError, StoreResult};

struct Migration {
    version: i64,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "events, events_fts, thread_metadata, upload_tokens, token_sessions",
    sql: include_str!("migrations/0001_initial.sql"),
}];

/// Bring `pool`'s schema up to the latest known version.
///
/// Safe to call on every startup: migrations already recorded in
/// `schema_version` are skipped.
///
/// # Errors
///
/// Returns [`StoreError::Migration`] if any migration step fails to apply.
pub async fn run(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)")
        .execute(pool)
        .await?;

    let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(pool)
        .await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|err| StoreError::Migration(format!("v{}: {err}", migration.version)))?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(version = migration.version, description = migration.description, "applied migration");
    }

    Ok(())
}
