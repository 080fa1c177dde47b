// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the health data layer.

pub mod entity;
pub mod health;
pub mod record;

pub use entity::{DateRange, EntityType};
pub use health::{DailyActivity, DailyReadiness, DailySleep, HealthEntity, HeartRateSample};
pub use record::{CacheMetadata, Credential, HealthRecord};
