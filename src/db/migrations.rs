// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Versioned schema migrations, gated by the `schema_version` metadata key.

use crate::db::metadata_keys::SCHEMA_VERSION;
use crate::error::{AppError, Result};
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

/// Metadata table exists before any versioned step so the version can be read.
const BOOTSTRAP: &str = r#"
CREATE TABLE IF NOT EXISTS cache_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Ordered migration steps; index + 1 is the version they produce.
const MIGRATIONS: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS sleep_cache (
    day TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    cached_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS readiness_cache (
    day TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    cached_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS activity_cache (
    day TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    cached_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS heart_rate_cache (
    timestamp TEXT PRIMARY KEY,
    day TEXT NOT NULL,
    payload TEXT NOT NULL,
    cached_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_heart_rate_cache_day ON heart_rate_cache(day);

CREATE TABLE IF NOT EXISTS credentials (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    token_type TEXT NOT NULL,
    access_token TEXT NOT NULL,
    refresh_token TEXT,
    expires_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#];

/// Schema version this build expects.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Read the recorded schema version (0 for a fresh database).
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM cache_metadata WHERE key = ?",
            params![SCHEMA_VERSION],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(v) => v
            .parse()
            .map_err(|_| AppError::Cache(format!("Unreadable schema_version '{v}'"))),
        None => Ok(0),
    }
}

/// Bring the schema up to [`CURRENT_VERSION`], applying each pending step once.
///
/// Returns the number of steps applied.
pub fn run(conn: &mut Connection, now: DateTime<Utc>) -> Result<usize> {
    conn.execute_batch(BOOTSTRAP)?;

    let current = schema_version(conn)?;
    if current > CURRENT_VERSION {
        return Err(AppError::Cache(format!(
            "Cache schema version {current} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    let pending = &MIGRATIONS[current as usize..];
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for step in pending {
        tx.execute_batch(step)?;
    }
    tx.execute(
        "INSERT OR REPLACE INTO cache_metadata (key, value, updated_at) VALUES (?, ?, ?)",
        params![
            SCHEMA_VERSION,
            CURRENT_VERSION.to_string(),
            format_utc_rfc3339(now)
        ],
    )?;
    tx.commit()?;

    tracing::info!(
        from = current,
        to = CURRENT_VERSION,
        "Cache schema migrated"
    );
    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        let now = Utc::now();

        assert_eq!(run(&mut conn, now).unwrap(), MIGRATIONS.len());
        assert_eq!(schema_version(&conn).unwrap(), CURRENT_VERSION);
        assert_eq!(run(&mut conn, now).unwrap(), 0);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE '%_cache'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(BOOTSTRAP).unwrap();
        conn.execute(
            "INSERT INTO cache_metadata (key, value, updated_at) VALUES ('schema_version', '99', 'x')",
            [],
        )
        .unwrap();

        let err = run(&mut conn, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "cache_error");
    }
}
