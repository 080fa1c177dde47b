// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Oura-cache: local data layer for wearable health metrics
//!
//! This crate fetches sleep, readiness, activity and heart-rate data from
//! the Oura REST API, validates every payload, and keeps a TTL-bounded
//! SQLite cache so repeated reads stay off the network.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;

use config::Config;
use db::CacheStore;
use error::Result;
use services::{build_http_client, token_provider_from_config, ApiClient, HealthService, TokenProvider};
use std::sync::Arc;
use time_utils::{Clock, SystemClock};

/// Explicitly constructed handles shared by every caller.
pub struct DataLayer {
    pub config: Config,
    pub store: Arc<CacheStore>,
    pub tokens: Arc<dyn TokenProvider>,
    pub health: HealthService,
}

impl DataLayer {
    /// Open the cache and wire up the client using wall-clock time.
    pub fn connect(config: Config) -> Result<Self> {
        Self::connect_with_clock(config, Arc::new(SystemClock))
    }

    pub fn connect_with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = Arc::new(CacheStore::open(&config.cache_dir, clock.clone())?);
        let http = build_http_client(config.request_timeout)?;
        let tokens = token_provider_from_config(&config, http.clone(), store.clone(), clock.clone());
        let client = ApiClient::new(http, &config, tokens.clone());
        let health = HealthService::new(client, store.clone(), clock, config.cache_ttl_hours);

        Ok(Self {
            config,
            store,
            tokens,
            health,
        })
    }
}
