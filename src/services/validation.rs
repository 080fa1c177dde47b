// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Response schema validation.
//!
//! Every decoded body is checked against its entity contract before any
//! other component trusts it. Failures name every violated field together
//! with the offending value.

use crate::error::{AppError, FieldViolation, Result};
use crate::models::{
    DailyActivity, DailyReadiness, DailySleep, EntityType, HealthEntity, HeartRateSample,
};
use serde::Serialize;
use serde_json::Value;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// Longest rendering of an offending value kept in a violation.
const MAX_VALUE_LEN: usize = 120;

/// One validated page of a collection response.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub next_token: Option<String>,
}

/// A validated record of any entity type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ValidatedRecord {
    Sleep(DailySleep),
    Readiness(DailyReadiness),
    Activity(DailyActivity),
    HeartRate(HeartRateSample),
}

impl ValidatedRecord {
    pub fn entity_type(&self) -> EntityType {
        match self {
            ValidatedRecord::Sleep(_) => EntityType::Sleep,
            ValidatedRecord::Readiness(_) => EntityType::Readiness,
            ValidatedRecord::Activity(_) => EntityType::Activity,
            ValidatedRecord::HeartRate(_) => EntityType::HeartRate,
        }
    }

    pub fn natural_key(&self) -> String {
        match self {
            ValidatedRecord::Sleep(r) => r.natural_key(),
            ValidatedRecord::Readiness(r) => r.natural_key(),
            ValidatedRecord::Activity(r) => r.natural_key(),
            ValidatedRecord::HeartRate(r) => r.natural_key(),
        }
    }

    pub fn day(&self) -> String {
        match self {
            ValidatedRecord::Sleep(r) => r.day(),
            ValidatedRecord::Readiness(r) => r.day(),
            ValidatedRecord::Activity(r) => r.day(),
            ValidatedRecord::HeartRate(r) => r.day(),
        }
    }
}

/// Validate a raw record against the contract of `entity`.
pub fn validate_record(entity: EntityType, raw: &Value) -> Result<ValidatedRecord> {
    Ok(match entity {
        EntityType::Sleep => ValidatedRecord::Sleep(validate(raw)?),
        EntityType::Readiness => ValidatedRecord::Readiness(validate(raw)?),
        EntityType::Activity => ValidatedRecord::Activity(validate(raw)?),
        EntityType::HeartRate => ValidatedRecord::HeartRate(validate(raw)?),
    })
}

/// Non-raising variant of [`validate_record`] for graceful degradation.
pub fn try_validate_record(entity: EntityType, raw: &Value) -> Option<ValidatedRecord> {
    match validate_record(entity, raw) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(entity = %entity, error = %e, "Discarding record that failed validation");
            None
        }
    }
}

/// Decode and validate one record of type `T`.
pub fn validate<T: HealthEntity>(raw: &Value) -> Result<T> {
    let violations = check::<T>(raw, "");
    match violations {
        Ok(record) => Ok(record),
        Err(violations) => Err(AppError::Validation {
            entity: T::ENTITY_TYPE,
            violations,
        }),
    }
}

/// Non-raising variant of [`validate`].
pub fn try_validate<T: HealthEntity>(raw: &Value) -> Option<T> {
    validate(raw).ok()
}

/// Validate a `{data: [...], next_token}` envelope and every record in it.
///
/// All violations across all records are reported together.
pub fn validate_page<T: HealthEntity>(body: &Value) -> Result<Page<T>> {
    let invalid = |violations| AppError::Validation {
        entity: T::ENTITY_TYPE,
        violations,
    };

    let Some(items) = body.get("data").and_then(Value::as_array) else {
        return Err(invalid(vec![violation(
            "data",
            body.get("data").unwrap_or(&Value::Null),
            "response must contain a `data` array",
        )]));
    };

    let next_token = match body.get("next_token") {
        None | Some(Value::Null) => None,
        Some(Value::String(token)) if token.is_empty() => None,
        Some(Value::String(token)) => Some(token.clone()),
        Some(other) => {
            return Err(invalid(vec![violation(
                "next_token",
                other,
                "must be a string or null",
            )]))
        }
    };

    let mut data = Vec::with_capacity(items.len());
    let mut violations = Vec::new();
    for (i, item) in items.iter().enumerate() {
        match check::<T>(item, &format!("data[{i}]")) {
            Ok(record) => data.push(record),
            Err(mut found) => violations.append(&mut found),
        }
    }

    if violations.is_empty() {
        Ok(Page { data, next_token })
    } else {
        Err(invalid(violations))
    }
}

fn check<T: HealthEntity>(raw: &Value, prefix: &str) -> std::result::Result<T, Vec<FieldViolation>> {
    let record: T = serde_json::from_value(raw.clone()).map_err(|e| {
        let path = if prefix.is_empty() { "$" } else { prefix };
        vec![violation(path, raw, &e.to_string())]
    })?;

    match record.validate() {
        Ok(()) => Ok(record),
        Err(errors) => {
            let mut violations = Vec::new();
            flatten(&errors, prefix, &mut violations);
            violations.sort_by(|a, b| a.field.cmp(&b.field));
            Err(violations)
        }
    }
}

fn flatten(errors: &ValidationErrors, prefix: &str, out: &mut Vec<FieldViolation>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                for err in errs {
                    out.push(FieldViolation {
                        field: path.clone(),
                        value: err
                            .params
                            .get("value")
                            .map(render_value)
                            .unwrap_or_else(|| "null".to_string()),
                        reason: describe(err),
                    });
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (i, inner) in items {
                    flatten(inner, &format!("{path}[{i}]"), out);
                }
            }
        }
    }
}

fn describe(err: &ValidationError) -> String {
    if let Some(message) = &err.message {
        return message.to_string();
    }
    match err.code.as_ref() {
        "range" => match (err.params.get("min"), err.params.get("max")) {
            (Some(min), Some(max)) => format!("must be between {min} and {max}"),
            (Some(min), None) => format!("must be at least {min}"),
            (None, Some(max)) => format!("must be at most {max}"),
            (None, None) => "out of range".to_string(),
        },
        code => code.to_string(),
    }
}

fn violation(field: &str, value: &Value, reason: &str) -> FieldViolation {
    FieldViolation {
        field: field.to_string(),
        value: render_value(value),
        reason: reason.to_string(),
    }
}

fn render_value(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.len() <= MAX_VALUE_LEN {
        return rendered;
    }
    let mut end = MAX_VALUE_LEN;
    while !rendered.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &rendered[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn violations(err: AppError) -> Vec<FieldViolation> {
        match err {
            AppError::Validation { violations, .. } => violations,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_readiness_passes() {
        let raw = json!({
            "id": "r1",
            "day": "2026-01-15",
            "score": 85,
            "temperature_deviation": 0.1,
            "temperature_trend_deviation": null,
            "timestamp": "2026-01-15T00:00:00+00:00",
            "contributors": { "hrv_balance": 80, "sleep_balance": null }
        });
        let record = validate_record(EntityType::Readiness, &raw).unwrap();
        assert_eq!(record.entity_type(), EntityType::Readiness);
        assert_eq!(record.natural_key(), "2026-01-15");
    }

    #[test]
    fn test_score_out_of_range_is_named_with_value() {
        let raw = json!({ "id": "r1", "day": "2026-01-15", "score": 150 });
        let found = violations(validate::<DailyReadiness>(&raw).unwrap_err());

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].field, "score");
        assert_eq!(found[0].value, "150");
        assert!(found[0].reason.starts_with("must be between"));
    }

    #[test]
    fn test_every_violation_is_reported() {
        let raw = json!({
            "id": "s1",
            "day": "2026-1-15",
            "score": -1,
            "contributors": { "deep_sleep": 101 }
        });
        let found = violations(validate::<DailySleep>(&raw).unwrap_err());
        let fields: Vec<_> = found.iter().map(|v| v.field.as_str()).collect();

        assert_eq!(fields, vec!["contributors.deep_sleep", "day", "score"]);
        assert_eq!(found[1].value, "\"2026-1-15\"");
    }

    #[test]
    fn test_heart_rate_source_is_closed_set() {
        let raw = json!({ "bpm": 60, "source": "guess", "timestamp": "2026-01-15T00:00:00Z" });
        let found = violations(validate::<HeartRateSample>(&raw).unwrap_err());
        assert_eq!(found[0].field, "source");
        assert_eq!(found[0].value, "\"guess\"");

        let raw = json!({ "bpm": 60, "source": "workout", "timestamp": "2026-01-15T00:00:00Z" });
        assert!(try_validate::<HeartRateSample>(&raw).is_some());
    }

    #[test]
    fn test_structural_failure_is_a_violation() {
        let raw = json!({ "day": "2026-01-15" });
        let found = violations(validate::<DailyActivity>(&raw).unwrap_err());
        assert_eq!(found[0].field, "$");
        assert!(found[0].reason.contains("id"));

        assert!(try_validate_record(EntityType::Activity, &raw).is_none());
    }

    #[test]
    fn test_page_reports_indexed_violations() {
        let body = json!({
            "data": [
                { "id": "a", "day": "2026-01-14", "score": 50 },
                { "id": "b", "day": "2026-01-15", "score": 150 }
            ],
            "next_token": null
        });
        let found = violations(validate_page::<DailySleep>(&body).unwrap_err());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].field, "data[1].score");
    }

    #[test]
    fn test_page_envelope() {
        let body = json!({ "data": [], "next_token": "abc" });
        let page = validate_page::<DailySleep>(&body).unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.next_token.as_deref(), Some("abc"));

        let page = validate_page::<DailySleep>(&json!({ "data": [] })).unwrap();
        assert!(page.next_token.is_none());

        let found = violations(validate_page::<DailySleep>(&json!({ "items": [] })).unwrap_err());
        assert_eq!(found[0].field, "data");

        let found = violations(
            validate_page::<DailySleep>(&json!({ "data": [], "next_token": 5 })).unwrap_err(),
        );
        assert_eq!(found[0].field, "next_token");
    }
}
