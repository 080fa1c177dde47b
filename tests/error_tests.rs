// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use oura_cache::error::{AppError, FieldViolation};
use oura_cache::models::EntityType;

fn all_variants() -> Vec<AppError> {
    vec![
        AppError::authentication("refresh token revoked"),
        AppError::Upstream {
            endpoint: "/v2/usercollection/daily_sleep".to_string(),
            status: Some(500),
            message: "Internal Server Error".to_string(),
        },
        AppError::RateLimit {
            endpoint: "/v2/usercollection/daily_sleep".to_string(),
            retry_after_secs: 30,
        },
        AppError::Validation {
            entity: EntityType::Sleep,
            violations: vec![FieldViolation {
                field: "score".to_string(),
                value: "101".to_string(),
                reason: "must be between 0 and 100".to_string(),
            }],
        },
        AppError::Cache("database is locked".to_string()),
    ]
}

#[test]
fn test_codes_are_distinct() {
    let codes: Vec<_> = all_variants().iter().map(AppError::code).collect();
    assert_eq!(
        codes,
        vec![
            "authentication_error",
            "upstream_error",
            "rate_limited",
            "validation_error",
            "cache_error"
        ]
    );
}

#[test]
fn test_every_message_is_actionable() {
    for err in all_variants() {
        let message = err.to_string();
        assert!(message.ends_with('.'), "{message}");
        assert!(message.len() > 40, "{message}");
    }
}

#[test]
fn test_only_transient_failures_are_retryable() {
    let retryable: Vec<_> = all_variants().iter().map(AppError::is_retryable).collect();
    assert_eq!(retryable, vec![false, true, true, false, false]);
}

#[test]
fn test_rusqlite_error_maps_to_cache() {
    let err: AppError = rusqlite::Error::InvalidQuery.into();
    assert_eq!(err.code(), "cache_error");
    assert!(!err.is_retryable());
}

#[test]
fn test_authentication_status_is_preserved() {
    let err = AppError::Authentication {
        reason: "/v2/usercollection/daily_sleep returned 403 Forbidden".to_string(),
        status: Some(403),
    };
    assert_eq!(err.status(), Some(403));
    assert!(err.is_authentication());
    assert_eq!(err.report().status, Some(403));
}
