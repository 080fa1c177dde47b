// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Entity types served by the Oura API and the date ranges used to query them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Health metric families exposed by the upstream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Sleep,
    Readiness,
    Activity,
    HeartRate,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Sleep,
        EntityType::Readiness,
        EntityType::Activity,
        EntityType::HeartRate,
    ];

    /// Stable name used in logs, metadata keys and error codes.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Sleep => "sleep",
            EntityType::Readiness => "readiness",
            EntityType::Activity => "activity",
            EntityType::HeartRate => "heart_rate",
        }
    }

    /// Path of the collection endpoint, relative to the API base URL.
    pub fn endpoint(self) -> &'static str {
        match self {
            EntityType::Sleep => "/v2/usercollection/daily_sleep",
            EntityType::Readiness => "/v2/usercollection/daily_readiness",
            EntityType::Activity => "/v2/usercollection/daily_activity",
            EntityType::HeartRate => "/v2/usercollection/heartrate",
        }
    }

    /// Name of the cache table holding rows of this type.
    pub fn table(self) -> &'static str {
        match self {
            EntityType::Sleep => crate::db::tables::SLEEP,
            EntityType::Readiness => crate::db::tables::READINESS,
            EntityType::Activity => crate::db::tables::ACTIVITY,
            EntityType::HeartRate => crate::db::tables::HEART_RATE,
        }
    }

    /// Time-series types have many rows per day, keyed by timestamp.
    pub fn is_time_series(self) -> bool {
        matches!(self, EntityType::HeartRate)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sleep" | "daily_sleep" => Ok(EntityType::Sleep),
            "readiness" | "daily_readiness" => Ok(EntityType::Readiness),
            "activity" | "daily_activity" => Ok(EntityType::Activity),
            "heart_rate" | "heartrate" => Ok(EntityType::HeartRate),
            other => Err(format!(
                "unknown entity type '{other}' (expected sleep, readiness, activity or heart_rate)"
            )),
        }
    }
}

/// Inclusive range of calendar days.
///
/// Ordering (`start <= end`) is not enforced; an inverted range simply
/// yields no days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Range covering exactly one day.
    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// Every day in the range, oldest first.
    pub fn days(&self) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut next = Some(self.start);
        while let Some(day) = next.filter(|d| *d <= self.end) {
            days.push(day);
            next = day.succ_opt();
        }
        days
    }

    /// Query parameters understood by every collection endpoint.
    pub fn query_params(&self) -> [(&'static str, String); 2] {
        [
            ("start_date", crate::time_utils::format_day(self.start)),
            ("end_date", crate::time_utils::format_day(self.end)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_round_trips_through_name() {
        for entity in EntityType::ALL {
            assert_eq!(entity.as_str().parse::<EntityType>(), Ok(entity));
        }
        assert_eq!("heartrate".parse::<EntityType>(), Ok(EntityType::HeartRate));
        assert_eq!("Daily-Sleep".parse::<EntityType>(), Ok(EntityType::Sleep));
        assert!("steps".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_only_heart_rate_is_time_series() {
        assert!(EntityType::HeartRate.is_time_series());
        assert!(!EntityType::Sleep.is_time_series());
        assert!(!EntityType::Readiness.is_time_series());
        assert!(!EntityType::Activity.is_time_series());
    }

    #[test]
    fn test_date_range_days_inclusive() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 30).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        let days = DateRange::new(start, end).days();

        assert_eq!(days.len(), 4);
        assert_eq!(days[0], start);
        assert_eq!(days[3], end);
    }

    #[test]
    fn test_inverted_range_has_no_days() {
        let start = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        assert!(DateRange::new(start, end).days().is_empty());
    }

    #[test]
    fn test_range_ending_at_last_date() {
        let start = NaiveDate::MAX.pred_opt().unwrap();
        let days = DateRange::new(start, NaiveDate::MAX).days();
        assert_eq!(days, vec![start, NaiveDate::MAX]);
    }

    #[test]
    fn test_query_params_use_canonical_days() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let params = DateRange::single(day).query_params();
        assert_eq!(params[0], ("start_date", "2026-01-05".to_string()));
        assert_eq!(params[1], ("end_date", "2026-01-05".to_string()));
    }
}
