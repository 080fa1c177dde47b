// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cache-aside access to health data.
//!
//! Reads are served from the cache store when every requested day has a
//! fresh row; otherwise the range is fetched upstream and written through.
//! The cache is an optimization only, so its failures are logged and the
//! request continues against upstream. Store calls run on the blocking pool.

use crate::db::{metadata_keys, CacheStore};
use crate::error::{AppError, Result};
use crate::models::{
    DailyActivity, DailyReadiness, DailySleep, DateRange, EntityType, HealthEntity,
    HealthRecord, HeartRateSample,
};
use crate::services::client::ApiClient;
use crate::time_utils::{format_utc_rfc3339, Clock};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Coordinates the API client and the cache store.
#[derive(Clone)]
pub struct HealthService {
    client: ApiClient,
    store: Arc<CacheStore>,
    clock: Arc<dyn Clock>,
    ttl_hours: u32,
}

impl HealthService {
    pub fn new(
        client: ApiClient,
        store: Arc<CacheStore>,
        clock: Arc<dyn Clock>,
        ttl_hours: u32,
    ) -> Self {
        Self {
            client,
            store,
            clock,
            ttl_hours,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Records of `T` for `range`, oldest first.
    pub async fn fetch<T: HealthEntity>(&self, range: Option<DateRange>) -> Result<Vec<T>> {
        let entity = T::ENTITY_TYPE;

        if let Some(range) = range {
            if let Some(cached) = self.cached::<T>(range).await {
                tracing::debug!(entity = %entity, start = %range.start, end = %range.end, count = cached.len(), "Cache hit");
                return Ok(cached);
            }
            tracing::debug!(entity = %entity, start = %range.start, end = %range.end, "Cache miss");
        }

        let records = self.client.fetch::<T>(range).await?;
        self.write_through(&records).await;
        Ok(records)
    }

    /// Drop cached rows for `range` (or the whole entity) and fetch again.
    pub async fn refresh<T: HealthEntity>(&self, range: Option<DateRange>) -> Result<Vec<T>> {
        let entity = T::ENTITY_TYPE;
        let invalidated = self
            .blocking(move |store| match range {
                Some(r) => store.invalidate_range(entity, r.start, r.end),
                None => store.invalidate_all(entity),
            })
            .await;
        match invalidated {
            Ok(removed) => tracing::info!(entity = %entity, removed, "Invalidated cached rows before refresh"),
            Err(e) => tracing::warn!(entity = %entity, error = %e, "Cache invalidation failed, refreshing anyway"),
        }

        let records = self.client.fetch::<T>(range).await?;
        self.write_through(&records).await;
        Ok(records)
    }

    pub async fn daily_sleep(&self, range: Option<DateRange>) -> Result<Vec<DailySleep>> {
        self.fetch(range).await
    }

    pub async fn daily_readiness(&self, range: Option<DateRange>) -> Result<Vec<DailyReadiness>> {
        self.fetch(range).await
    }

    pub async fn daily_activity(&self, range: Option<DateRange>) -> Result<Vec<DailyActivity>> {
        self.fetch(range).await
    }

    pub async fn heart_rate(&self, range: Option<DateRange>) -> Result<Vec<HeartRateSample>> {
        self.fetch(range).await
    }

    /// Fresh cached records covering every day of `range`, or `None`.
    async fn cached<T: HealthEntity>(&self, range: DateRange) -> Option<Vec<T>> {
        let entity = T::ENTITY_TYPE;
        let days = range.days();
        if days.is_empty() {
            return None;
        }

        let rows = match self.blocking(move |store| lookup(store, entity, range)).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(entity = %entity, error = %e, "Cache read failed, falling back to upstream");
                return None;
            }
        };

        let covered: BTreeSet<&str> = rows.iter().map(|r| r.day.as_str()).collect();
        let complete = days
            .iter()
            .all(|d| covered.contains(crate::time_utils::format_day(*d).as_str()));
        if !complete {
            return None;
        }

        let mut decoded = Vec::with_capacity(rows.len());
        for row in &rows {
            match row.decode::<T>() {
                Ok(record) => decoded.push((row.natural_key.clone(), record)),
                Err(e) => {
                    tracing::warn!(entity = %entity, error = %e, "Unreadable cached row, falling back to upstream");
                    return None;
                }
            }
        }

        decoded.sort_by(|a, b| a.0.cmp(&b.0));
        Some(decoded.into_iter().map(|(_, record)| record).collect())
    }

    /// Run a store operation on the blocking thread pool.
    async fn blocking<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&CacheStore) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| AppError::Cache(format!("cache task failed: {e}")))?
    }

    async fn write_through<T: HealthEntity>(&self, records: &[T]) {
        let entity = T::ENTITY_TYPE;
        let ttl_hours = self.ttl_hours;
        let synced_at = format_utc_rfc3339(self.clock.now());
        let owned = records.to_vec();

        match self
            .blocking(move |store| store.set_many(&owned, ttl_hours))
            .await
        {
            Ok(written) => tracing::debug!(entity = %entity, written, ttl_hours = self.ttl_hours, "Cached upstream records"),
            Err(e) => tracing::warn!(entity = %entity, error = %e, "Cache write failed, serving upstream data uncached"),
        }

        if let Err(e) = self
            .blocking(move |store| store.set_metadata(&metadata_keys::last_sync(entity), &synced_at))
            .await
        {
            tracing::warn!(entity = %entity, error = %e, "Failed to record last sync time");
        }
    }
}

fn lookup(store: &CacheStore, entity: EntityType, range: DateRange) -> Result<Vec<HealthRecord>> {
    if range.start == range.end && !entity.is_time_series() {
        let key = crate::time_utils::format_day(range.start);
        return Ok(store.get(entity, &key)?.into_iter().collect());
    }
    store.get_range(entity, range.start, range.end)
}
