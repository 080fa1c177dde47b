// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (local SQLite cache).

pub mod migrations;
pub mod sqlite;

pub use sqlite::CacheStore;

/// Table names as constants.
pub mod tables {
    pub const SLEEP: &str = "sleep_cache";
    pub const READINESS: &str = "readiness_cache";
    pub const ACTIVITY: &str = "activity_cache";
    /// Time series keyed by sample timestamp, indexed by day
    pub const HEART_RATE: &str = "heart_rate_cache";
    /// Single-row OAuth credential
    pub const CREDENTIALS: &str = "credentials";
    pub const METADATA: &str = "cache_metadata";
}

/// Well-known metadata keys.
pub mod metadata_keys {
    /// Gates one-time startup migrations
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Last successful upstream fetch for an entity type.
    pub fn last_sync(entity: crate::models::EntityType) -> String {
        format!("last_sync:{}", entity.as_str())
    }
}
