// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rows held by the local cache store.

use crate::error::AppError;
use crate::models::{EntityType, HealthEntity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One cached payload, keyed by entity type and natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub entity_type: EntityType,
    /// Day for daily metrics, sample timestamp for time series
    pub natural_key: String,
    /// Canonical YYYY-MM-DD
    pub day: String,
    /// Opaque serialized entity
    pub payload: Value,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl HealthRecord {
    /// Whether the row may still be served at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Decode the payload into its typed entity.
    pub fn decode<T: HealthEntity>(&self) -> Result<T, AppError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            AppError::Cache(format!(
                "Corrupt cached {} payload for {}: {}",
                self.entity_type, self.natural_key, e
            ))
        })
    }
}

/// OAuth credential for the single authenticated identity.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub token_type: String,
    pub access_token: String,
    /// Exists only locally; may rotate on refresh
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Tokens stay out of logs and panic messages.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token_type", &self.token_type)
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Operational bookkeeping entry (never expires).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
