// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Typed health payloads returned by the Oura collection endpoints.
//!
//! Field-level contracts are declared with `validator` attributes and checked
//! by [`crate::services::validation`] before a payload is trusted.

use crate::models::EntityType;
use crate::time_utils::{format_day, parse_day, parse_timestamp};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use validator::{Validate, ValidationError};

/// Allowed values of `HeartRateSample::source`.
pub const HEART_RATE_SOURCES: [&str; 6] = ["awake", "rest", "sleep", "session", "live", "workout"];

/// A payload type that can be validated, cached and keyed by natural identity.
pub trait HealthEntity:
    Serialize + DeserializeOwned + Validate + Clone + Send + Sync + 'static
{
    const ENTITY_TYPE: EntityType;

    /// Primary key inside the entity's cache table: the day for daily
    /// metrics, the sample timestamp for time series.
    fn natural_key(&self) -> String;

    /// Canonical `YYYY-MM-DD` day the record belongs to.
    fn day(&self) -> String;
}

// ─── Daily sleep ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct SleepContributors {
    #[validate(range(min = 0, max = 100))]
    pub deep_sleep: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub efficiency: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub latency: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub rem_sleep: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub restfulness: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub timing: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub total_sleep: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DailySleep {
    pub id: String,
    #[validate(custom(function = "validate_day"))]
    pub day: String,
    #[validate(range(min = 0, max = 100))]
    pub score: Option<i64>,
    #[serde(default)]
    #[validate(custom(function = "validate_timestamp"))]
    pub timestamp: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub contributors: SleepContributors,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl HealthEntity for DailySleep {
    const ENTITY_TYPE: EntityType = EntityType::Sleep;

    fn natural_key(&self) -> String {
        self.day.clone()
    }

    fn day(&self) -> String {
        self.day.clone()
    }
}

// ─── Daily readiness ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ReadinessContributors {
    #[validate(range(min = 0, max = 100))]
    pub activity_balance: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub body_temperature: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub hrv_balance: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub previous_day_activity: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub previous_night: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub recovery_index: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub resting_heart_rate: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub sleep_balance: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DailyReadiness {
    pub id: String,
    #[validate(custom(function = "validate_day"))]
    pub day: String,
    #[validate(range(min = 0, max = 100))]
    pub score: Option<i64>,
    pub temperature_deviation: Option<f64>,
    pub temperature_trend_deviation: Option<f64>,
    #[serde(default)]
    #[validate(custom(function = "validate_timestamp"))]
    pub timestamp: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub contributors: ReadinessContributors,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl HealthEntity for DailyReadiness {
    const ENTITY_TYPE: EntityType = EntityType::Readiness;

    fn natural_key(&self) -> String {
        self.day.clone()
    }

    fn day(&self) -> String {
        self.day.clone()
    }
}

// ─── Daily activity ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ActivityContributors {
    #[validate(range(min = 0, max = 100))]
    pub meet_daily_targets: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub move_every_hour: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub recovery_time: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub stay_active: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub training_frequency: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub training_volume: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DailyActivity {
    pub id: String,
    #[validate(custom(function = "validate_day"))]
    pub day: String,
    #[validate(range(min = 0, max = 100))]
    pub score: Option<i64>,
    #[validate(range(min = 0))]
    pub steps: Option<i64>,
    #[validate(range(min = 0))]
    pub active_calories: Option<i64>,
    #[validate(range(min = 0))]
    pub total_calories: Option<i64>,
    #[validate(range(min = 0))]
    pub equivalent_walking_distance: Option<i64>,
    #[validate(range(min = 0))]
    pub high_activity_time: Option<i64>,
    #[validate(range(min = 0))]
    pub medium_activity_time: Option<i64>,
    #[validate(range(min = 0))]
    pub low_activity_time: Option<i64>,
    #[validate(range(min = 0))]
    pub sedentary_time: Option<i64>,
    #[validate(range(min = 0))]
    pub resting_time: Option<i64>,
    #[validate(range(min = 0))]
    pub non_wear_time: Option<i64>,
    #[serde(default)]
    #[validate(custom(function = "validate_timestamp"))]
    pub timestamp: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub contributors: ActivityContributors,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl HealthEntity for DailyActivity {
    const ENTITY_TYPE: EntityType = EntityType::Activity;

    fn natural_key(&self) -> String {
        self.day.clone()
    }

    fn day(&self) -> String {
        self.day.clone()
    }
}

// ─── Heart rate ──────────────────────────────────────────────────────────────

/// One heart-rate sample from the time-series endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct HeartRateSample {
    #[validate(range(min = 1, max = 300))]
    pub bpm: i64,
    #[validate(custom(function = "validate_heart_rate_source"))]
    pub source: String,
    #[validate(custom(function = "validate_timestamp"))]
    pub timestamp: String,
}

impl HealthEntity for HeartRateSample {
    const ENTITY_TYPE: EntityType = EntityType::HeartRate;

    fn natural_key(&self) -> String {
        self.timestamp.clone()
    }

    /// UTC calendar date of the sample, matching the upstream date filter.
    fn day(&self) -> String {
        match parse_timestamp(&self.timestamp) {
            Some(ts) => format_day(ts.with_timezone(&Utc).date_naive()),
            None => self.timestamp.chars().take(10).collect(),
        }
    }
}

// ─── Field validators ────────────────────────────────────────────────────────

fn violation(code: &'static str, message: &'static str, value: &str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err.add_param(Cow::Borrowed("value"), &value);
    err
}

fn validate_day(day: &str) -> Result<(), ValidationError> {
    match parse_day(day) {
        Some(_) => Ok(()),
        None => Err(violation("day", "must be a valid YYYY-MM-DD date", day)),
    }
}

fn validate_timestamp(timestamp: &str) -> Result<(), ValidationError> {
    match parse_timestamp(timestamp) {
        Some(_) => Ok(()),
        None => Err(violation(
            "timestamp",
            "must be an ISO-8601 timestamp with an explicit offset",
            timestamp,
        )),
    }
}

fn validate_heart_rate_source(source: &str) -> Result<(), ValidationError> {
    if HEART_RATE_SOURCES.contains(&source) {
        Ok(())
    } else {
        Err(violation(
            "enum",
            "must be one of awake, rest, sleep, session, live, workout",
            source,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_heart_rate_day_is_utc_day() {
        let sample = HeartRateSample {
            bpm: 58,
            source: "rest".to_string(),
            timestamp: "2026-01-15T23:30:00-08:00".to_string(),
        };
        assert_eq!(sample.day(), "2026-01-16");

        let same_instant = HeartRateSample {
            timestamp: "2026-01-16T07:30:00+00:00".to_string(),
            ..sample.clone()
        };
        assert_eq!(same_instant.day(), sample.day());
        assert_eq!(sample.natural_key(), "2026-01-15T23:30:00-08:00");
    }

    #[test]
    fn test_daily_sleep_preserves_unknown_fields() {
        let raw = json!({
            "id": "s1",
            "day": "2026-01-15",
            "score": 82,
            "timestamp": "2026-01-15T00:00:00+00:00",
            "contributors": { "deep_sleep": 90 },
            "custom_field": "kept"
        });
        let sleep: DailySleep = serde_json::from_value(raw).unwrap();
        assert_eq!(sleep.extra.get("custom_field"), Some(&json!("kept")));

        let back = serde_json::to_value(&sleep).unwrap();
        assert_eq!(back["custom_field"], json!("kept"));
        assert_eq!(back["contributors"]["deep_sleep"], json!(90));
    }

    #[test]
    fn test_contract_rejects_out_of_range_contributor() {
        let raw = json!({
            "id": "r1",
            "day": "2026-01-15",
            "score": 70,
            "contributors": { "hrv_balance": 101 }
        });
        let readiness: DailyReadiness = serde_json::from_value(raw).unwrap();
        assert!(readiness.validate().is_err());
    }

    #[test]
    fn test_contract_accepts_null_scores() {
        let raw = json!({ "id": "a1", "day": "2026-01-15", "score": null });
        let activity: DailyActivity = serde_json::from_value(raw).unwrap();
        assert!(activity.validate().is_ok());
    }
}
