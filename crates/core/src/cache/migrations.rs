//! Schema migrations for the cache database.
//!
//! `_migrations` records every applied version. Pending migrations run in
//! version order, each inside its own transaction together with its
//! bookkeeping row, so a failed batch leaves the previous schema intact.

use tokio_rusqlite::{Connection, params, rusqlite};

use super::Error;

/// Ordered `(version, SQL)` pairs. Versions strictly increase.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_kv_entries.sql"))];

/// Highest schema version this build understands.
fn latest_version() -> i64 {
    MIGRATIONS.last().map(|(version, _)| *version).unwrap_or(0)
}

/// Bring the schema up to date, returning how many migrations were applied.
///
/// A database written by a newer build (version above [`latest_version`]) is
/// rejected rather than used with an unknown layout.
pub async fn run(conn: &Connection) -> Result<usize, Error> {
    conn.call(|conn| -> Result<usize, Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL)",
            [],
        )?;

        let current = current_version(conn)?;
        if current > latest_version() {
            return Err(Error::MigrationFailed(format!(
                "schema version {current} is newer than supported version {}",
                latest_version()
            )));
        }

        let mut applied = 0;
        for (version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;

            tracing::debug!(version, "applied cache migration");
            applied += 1;
        }
        Ok(applied)
    })
    .await
    .map_err(Error::from)
}

fn current_version(conn: &rusqlite::Connection) -> Result<i64, Error> {
    Ok(conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?)
}
