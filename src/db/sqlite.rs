// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite cache store with typed operations.
//!
//! Provides:
//! - Per-entity health record tables with TTL-based expiry
//! - The single-row OAuth credential
//! - Free-form metadata (sync bookkeeping, schema version)
//!
//! Expired rows are never returned; they are deleted when a read encounters
//! them, or in bulk by [`CacheStore::sweep_expired`].

use crate::db::{migrations, tables};
use crate::error::{AppError, Result};
use crate::models::{CacheMetadata, Credential, EntityType, HealthEntity, HealthRecord};
use crate::time_utils::{format_day, Clock};
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// WAL mode allows one writer alongside readers, so a few connections keep
/// lookups from queueing behind a write.
const POOL_SIZE: usize = 4;

/// Default time-to-live for cached health records.
pub const DEFAULT_TTL_HOURS: u32 = 1;

/// Persistent cache store.
pub struct CacheStore {
    pool: Vec<Mutex<Connection>>,
    next_slot: AtomicUsize,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// Open (or create) `cache.db` inside `dir`.
    pub fn open(dir: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            AppError::Cache(format!(
                "Failed to create cache directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Self::open_at(&dir.join("cache.db"), clock)
    }

    /// Open (or create) the cache database at an explicit path.
    pub fn open_at(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut pool = Vec::with_capacity(POOL_SIZE);
        for _ in 0..POOL_SIZE {
            pool.push(Mutex::new(Self::open_connection(path)?));
        }

        let store = Self {
            pool,
            next_slot: AtomicUsize::new(0),
            clock,
        };
        store.run_migrations()?;

        tracing::info!(path = %path.display(), "Opened cache store");
        Ok(store)
    }

    fn open_connection(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path).map_err(|e| {
            AppError::Cache(format!(
                "Failed to open cache database at {}: {}",
                path.display(),
                e
            ))
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Ok(conn)
    }

    fn run_migrations(&self) -> Result<()> {
        let now = self.clock.now();
        let mut conn = self.pool[0]
            .lock()
            .map_err(|e| AppError::Cache(format!("Lock poisoned: {e}")))?;
        migrations::run(&mut conn, now)?;
        Ok(())
    }

    /// Run a closure against the next pooled connection.
    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let idx = self.next_slot.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        let mut conn = self.pool[idx]
            .lock()
            .map_err(|e| AppError::Cache(format!("Lock poisoned: {e}")))?;
        f(&mut conn)
    }

    /// Current schema version recorded in metadata.
    pub fn schema_version(&self) -> Result<u32> {
        self.with_conn(|conn| migrations::schema_version(conn))
    }

    // ─── Health Records ──────────────────────────────────────────

    /// Look up one record by natural key.
    ///
    /// Absent when no row exists or when it has expired; an expired row is
    /// deleted as part of the read.
    pub fn get(&self, entity: EntityType, key: &str) -> Result<Option<HealthRecord>> {
        let now = self.clock.now();
        let sql = format!(
            "SELECT {key_col}, day, payload, cached_at, expires_at FROM {table} WHERE {key_col} = ?",
            key_col = key_column(entity),
            table = entity.table(),
        );

        self.with_conn(|conn| {
            let row = conn
                .query_row(&sql, params![key], |row| RawRow::from_row(row))
                .optional()?;

            let Some(raw) = row else {
                return Ok(None);
            };

            match raw.into_record(entity) {
                Some(record) if record.is_fresh(now) => Ok(Some(record)),
                Some(_) => {
                    delete_expired_key(conn, entity, key, now)?;
                    tracing::debug!(entity = %entity, key, "Evicted expired cache row on read");
                    Ok(None)
                }
                None => {
                    delete_key(conn, entity, key)?;
                    tracing::warn!(entity = %entity, key, "Dropped unreadable cache row");
                    Ok(None)
                }
            }
        })
    }

    /// All fresh records whose day lies in `[start, end]`, newest day first.
    pub fn get_range(
        &self,
        entity: EntityType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HealthRecord>> {
        let now = self.clock.now();
        let sql = format!(
            "SELECT {key_col}, day, payload, cached_at, expires_at FROM {table}
             WHERE day >= ? AND day <= ?
             ORDER BY day DESC, {key_col} DESC",
            key_col = key_column(entity),
            table = entity.table(),
        );

        self.with_conn(|conn| {
            let rows: Vec<RawRow> = {
                let mut stmt = conn.prepare(&sql)?;
                let mapped = stmt.query_map(
                    params![format_day(start), format_day(end)],
                    |row| RawRow::from_row(row),
                )?;
                mapped.collect::<std::result::Result<_, _>>()?
            };

            let mut fresh = Vec::with_capacity(rows.len());
            let mut evicted = 0usize;
            for raw in rows {
                let key = raw.key.clone();
                match raw.into_record(entity) {
                    Some(record) if record.is_fresh(now) => fresh.push(record),
                    Some(_) => {
                        delete_expired_key(conn, entity, &key, now)?;
                        evicted += 1;
                    }
                    None => {
                        delete_key(conn, entity, &key)?;
                        evicted += 1;
                    }
                }
            }

            if evicted > 0 {
                tracing::debug!(entity = %entity, evicted, "Evicted stale cache rows during range read");
            }
            Ok(fresh)
        })
    }

    /// Upsert a raw payload under its natural identity with
    /// `expires_at = now + ttl_hours`.
    pub fn set_raw(
        &self,
        entity: EntityType,
        natural_key: &str,
        day: &str,
        payload: &Value,
        ttl_hours: u32,
    ) -> Result<HealthRecord> {
        let record = self.new_record(entity, natural_key, day, payload.clone(), ttl_hours);
        self.with_conn(|conn| upsert(conn, &record))?;
        Ok(record)
    }

    /// Upsert a typed entity.
    pub fn set<T: HealthEntity>(&self, entity: &T, ttl_hours: u32) -> Result<HealthRecord> {
        let payload = to_payload(entity)?;
        self.set_raw(
            T::ENTITY_TYPE,
            &entity.natural_key(),
            &entity.day(),
            &payload,
            ttl_hours,
        )
    }

    /// Upsert many entities in one transaction. Returns the number written.
    pub fn set_many<T: HealthEntity>(&self, entities: &[T], ttl_hours: u32) -> Result<usize> {
        let records = entities
            .iter()
            .map(|e| {
                Ok(self.new_record(
                    T::ENTITY_TYPE,
                    &e.natural_key(),
                    &e.day(),
                    to_payload(e)?,
                    ttl_hours,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for record in &records {
                upsert(&tx, record)?;
            }
            tx.commit()?;
            Ok(records.len())
        })
    }

    fn new_record(
        &self,
        entity: EntityType,
        natural_key: &str,
        day: &str,
        payload: Value,
        ttl_hours: u32,
    ) -> HealthRecord {
        let now = self.clock.now();
        HealthRecord {
            entity_type: entity,
            natural_key: natural_key.to_string(),
            day: day.to_string(),
            payload,
            cached_at: now,
            expires_at: now + Duration::hours(i64::from(ttl_hours)),
        }
    }

    /// Remove one record. Returns whether a row existed.
    pub fn invalidate(&self, entity: EntityType, key: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(delete_key(conn, entity, key)? > 0))
    }

    /// Remove every record of one entity type.
    pub fn invalidate_all(&self, entity: EntityType) -> Result<usize> {
        let sql = format!("DELETE FROM {}", entity.table());
        let removed = self.with_conn(|conn| Ok(conn.execute(&sql, [])?))?;
        tracing::info!(entity = %entity, removed, "Invalidated cache table");
        Ok(removed)
    }

    /// Remove records whose day lies in `[start, end]`.
    pub fn invalidate_range(
        &self,
        entity: EntityType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE day >= ? AND day <= ?", entity.table());
        self.with_conn(|conn| {
            Ok(conn.execute(&sql, params![format_day(start), format_day(end)])?)
        })
    }

    /// Delete every expired record across all entity tables.
    pub fn sweep_expired(&self) -> Result<usize> {
        let now = db_timestamp(self.clock.now());
        let removed = self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            for entity in EntityType::ALL {
                let sql = format!("DELETE FROM {} WHERE expires_at <= ?", entity.table());
                removed += tx.execute(&sql, params![now])?;
            }
            tx.commit()?;
            Ok(removed)
        })?;

        tracing::info!(removed, "Swept expired cache rows");
        Ok(removed)
    }

    /// Row counts per entity table, expired rows included.
    pub fn entry_counts(&self) -> Result<Vec<(EntityType, usize)>> {
        self.with_conn(|conn| {
            EntityType::ALL
                .iter()
                .map(|&entity| -> Result<(EntityType, usize)> {
                    let sql = format!("SELECT COUNT(*) FROM {}", entity.table());
                    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
                    Ok((entity, usize::try_from(count).unwrap_or_default()))
                })
                .collect()
        })
    }

    // ─── Credential ──────────────────────────────────────────────

    /// The stored credential, if any.
    pub fn load_credential(&self) -> Result<Option<Credential>> {
        let sql = format!(
            "SELECT token_type, access_token, refresh_token, expires_at, updated_at
             FROM {} WHERE id = 1",
            tables::CREDENTIALS
        );
        self.with_conn(|conn| {
            let row = conn
                .query_row(&sql, [], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .optional()?;

            row.map(
                |(token_type, access_token, refresh_token, expires_at, updated_at)| -> Result<Credential> {
                    Ok(Credential {
                        token_type,
                        access_token,
                        refresh_token,
                        expires_at: parse_db_timestamp(&expires_at)?,
                        updated_at: parse_db_timestamp(&updated_at)?,
                    })
                },
            )
            .transpose()
        })
    }

    /// Replace the stored credential.
    pub fn save_credential(&self, credential: &Credential) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {}
             (id, token_type, access_token, refresh_token, expires_at, updated_at)
             VALUES (1, ?, ?, ?, ?, ?)",
            tables::CREDENTIALS
        );
        self.with_conn(|conn| {
            conn.execute(
                &sql,
                params![
                    credential.token_type,
                    credential.access_token,
                    credential.refresh_token,
                    db_timestamp(credential.expires_at),
                    db_timestamp(credential.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Remove the stored credential. Returns whether one existed.
    pub fn clear_credential(&self) -> Result<bool> {
        let sql = format!("DELETE FROM {}", tables::CREDENTIALS);
        self.with_conn(|conn| Ok(conn.execute(&sql, [])? > 0))
    }

    // ─── Metadata ────────────────────────────────────────────────

    pub fn get_metadata(&self, key: &str) -> Result<Option<CacheMetadata>> {
        let sql = format!(
            "SELECT key, value, updated_at FROM {} WHERE key = ?",
            tables::METADATA
        );
        self.with_conn(|conn| {
            let row = conn
                .query_row(&sql, params![key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .optional()?;

            row.map(|(key, value, updated_at)| -> Result<CacheMetadata> {
                Ok(CacheMetadata {
                    key,
                    value,
                    updated_at: parse_db_timestamp(&updated_at)?,
                })
            })
            .transpose()
        })
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (key, value, updated_at) VALUES (?, ?, ?)",
            tables::METADATA
        );
        let now = db_timestamp(self.clock.now());
        self.with_conn(|conn| {
            conn.execute(&sql, params![key, value, now])?;
            Ok(())
        })
    }

    pub fn delete_metadata(&self, key: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE key = ?", tables::METADATA);
        self.with_conn(|conn| Ok(conn.execute(&sql, params![key])? > 0))
    }
}

/// Column holding the natural key of each entity table.
fn key_column(entity: EntityType) -> &'static str {
    if entity.is_time_series() {
        "timestamp"
    } else {
        "day"
    }
}

/// Row as stored, before the payload and timestamps are decoded.
struct RawRow {
    key: String,
    day: String,
    payload: String,
    cached_at: String,
    expires_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            day: row.get(1)?,
            payload: row.get(2)?,
            cached_at: row.get(3)?,
            expires_at: row.get(4)?,
        })
    }

    /// `None` when any stored column cannot be decoded.
    fn into_record(self, entity: EntityType) -> Option<HealthRecord> {
        Some(HealthRecord {
            entity_type: entity,
            natural_key: self.key,
            day: self.day,
            payload: serde_json::from_str(&self.payload).ok()?,
            cached_at: parse_db_timestamp(&self.cached_at).ok()?,
            expires_at: parse_db_timestamp(&self.expires_at).ok()?,
        })
    }
}

fn upsert(conn: &Connection, record: &HealthRecord) -> Result<()> {
    let entity = record.entity_type;
    let payload = serde_json::to_string(&record.payload)
        .map_err(|e| AppError::Cache(format!("Failed to serialize payload: {e}")))?;
    let cached_at = db_timestamp(record.cached_at);
    let expires_at = db_timestamp(record.expires_at);

    if entity.is_time_series() {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (timestamp, day, payload, cached_at, expires_at)
             VALUES (?, ?, ?, ?, ?)",
            entity.table()
        );
        conn.execute(
            &sql,
            params![record.natural_key, record.day, payload, cached_at, expires_at],
        )?;
    } else {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (day, payload, cached_at, expires_at) VALUES (?, ?, ?, ?)",
            entity.table()
        );
        conn.execute(&sql, params![record.day, payload, cached_at, expires_at])?;
    }
    Ok(())
}

fn delete_key(conn: &Connection, entity: EntityType, key: &str) -> Result<usize> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        entity.table(),
        key_column(entity)
    );
    Ok(conn.execute(&sql, params![key])?)
}

/// Delete a row only if it is still expired, so a concurrent rewrite survives.
fn delete_expired_key(
    conn: &Connection,
    entity: EntityType,
    key: &str,
    now: DateTime<Utc>,
) -> Result<usize> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ? AND expires_at <= ?",
        entity.table(),
        key_column(entity)
    );
    Ok(conn.execute(&sql, params![key, db_timestamp(now)])?)
}

fn to_payload<T: HealthEntity>(entity: &T) -> Result<Value> {
    serde_json::to_value(entity)
        .map_err(|e| AppError::Cache(format!("Failed to serialize {}: {e}", T::ENTITY_TYPE)))
}

/// Fixed-width UTC format so stored timestamps compare correctly as text.
fn db_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_db_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Cache(format!("Failed to parse stored timestamp '{s}': {e}")))
}
