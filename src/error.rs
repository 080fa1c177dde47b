// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error taxonomy shared by every component of the data layer.
//!
//! Each variant has a stable machine code, an optional HTTP status and a
//! message that ends with what the operator should do about it.

use crate::models::EntityType;
use serde::Serialize;
use std::fmt;

/// One field that failed its contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    /// Dotted path inside the record (`contributors.hrv_balance`), or `$`
    /// when the body could not be decoded at all
    pub field: String,
    /// Offending value, rendered as JSON
    pub value: String,
    pub reason: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.field, self.value, self.reason)
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Application error type.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    #[error("Authentication failed: {reason}. Re-run the OAuth authorization flow (or check the personal access token) and try again.")]
    Authentication { reason: String, status: Option<u16> },

    #[error("Upstream request to {endpoint} failed{}: {message}. The call is retried automatically for 5xx and transport errors; if it persists, check API status and connectivity.", .status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    Upstream {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Rate limit exceeded for {endpoint}. Wait {retry_after_secs} seconds before retrying.")]
    RateLimit {
        endpoint: String,
        retry_after_secs: u64,
    },

    #[error("Invalid {entity} payload: {}. The upstream contract may have changed; do not retry until the payload is inspected.", join_violations(.violations))]
    Validation {
        entity: EntityType,
        violations: Vec<FieldViolation>,
    },

    #[error("Cache store error: {0}. Data will be fetched fresh from upstream; check the cache directory if this persists.")]
    Cache(String),
}

/// Serializable error summary for consumers that forward errors as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
}

impl AppError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Authentication { .. } => "authentication_error",
            AppError::Upstream { .. } => "upstream_error",
            AppError::RateLimit { .. } => "rate_limited",
            AppError::Validation { .. } => "validation_error",
            AppError::Cache(_) => "cache_error",
        }
    }

    /// HTTP status associated with the failure, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Authentication { status, .. } | AppError::Upstream { status, .. } => *status,
            AppError::RateLimit { .. } => Some(429),
            AppError::Validation { .. } | AppError::Cache(_) => None,
        }
    }

    /// Whether another attempt of the same request may succeed.
    ///
    /// Rate limits, 5xx responses and transport failures (no status) are
    /// retryable; everything else is terminal for the current call.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::RateLimit { .. } => true,
            AppError::Upstream { status, .. } => match status {
                Some(s) => (500..600).contains(s),
                None => true,
            },
            AppError::Authentication { .. } | AppError::Validation { .. } | AppError::Cache(_) => {
                false
            }
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, AppError::Authentication { .. })
    }

    /// Build an authentication error without an HTTP status.
    pub fn authentication(reason: impl Into<String>) -> Self {
        AppError::Authentication {
            reason: reason.into(),
            status: None,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            status: self.status(),
            message: self.to_string(),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Cache(err.to_string())
    }
}

/// Result type alias for the data layer
pub type Result<T> = std::result::Result<T, AppError>;
