// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use oura_cache::config::{Config, CredentialSource, OAuthSettings};
use oura_cache::db::CacheStore;
use oura_cache::models::Credential;
use oura_cache::services::{token_provider_from_config, ApiClient, HealthService};
use oura_cache::time_utils::{Clock, ManualClock};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::MockServer;

/// Fixed starting instant for deterministic tests.
#[allow(dead_code)]
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

#[allow(dead_code)]
pub fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Config pointing at a mock server, with zero backoff.
#[allow(dead_code)]
pub fn test_config(server: &MockServer) -> Config {
    let mut config = Config::test_default();
    config.api_base_url = server.uri();
    config
}

/// Same as [`test_config`] but using OAuth against the mock server.
#[allow(dead_code)]
pub fn oauth_config(server: &MockServer) -> Config {
    let mut config = test_config(server);
    config.credentials = CredentialSource::OAuth(OAuthSettings {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        redirect_uri: "http://localhost:8080/callback".to_string(),
        scopes: "daily heartrate".to_string(),
        authorize_url: format!("{}/oauth/authorize", server.uri()),
        token_url: format!("{}/oauth/token", server.uri()),
        revoke_url: format!("{}/oauth/revoke", server.uri()),
    });
    config
}

/// Everything a test needs to drive the data layer.
#[allow(dead_code)]
pub struct Harness {
    pub clock: ManualClock,
    pub store: Arc<CacheStore>,
    pub client: ApiClient,
    pub health: HealthService,
    _dir: tempfile::TempDir,
}

/// Build a harness around `config` with a fresh temporary cache.
#[allow(dead_code)]
pub fn harness(config: Config) -> Harness {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let clock = ManualClock::new(start_time());
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());

    let store = Arc::new(CacheStore::open(dir.path(), shared.clone()).expect("Failed to open store"));
    let http = reqwest::Client::new();
    let tokens = token_provider_from_config(&config, http.clone(), store.clone(), shared.clone());
    let client = ApiClient::new(http, &config, tokens);
    let health = HealthService::new(client.clone(), store.clone(), shared, config.cache_ttl_hours);

    Harness {
        clock,
        store,
        client,
        health,
        _dir: dir,
    }
}

/// Store an OAuth credential expiring `expires_in` from the harness clock.
#[allow(dead_code)]
pub fn seed_credential(h: &Harness, expires_in: Duration) {
    let now = h.clock.now();
    h.store
        .save_credential(&Credential {
            token_type: "Bearer".to_string(),
            access_token: "stored-access".to_string(),
            refresh_token: Some("stored-refresh".to_string()),
            expires_at: now + expires_in,
            updated_at: now,
        })
        .expect("Failed to seed credential");
}

#[allow(dead_code)]
pub fn readiness(day: &str, score: i64) -> Value {
    json!({
        "id": format!("readiness-{day}"),
        "day": day,
        "score": score,
        "temperature_deviation": -0.2,
        "temperature_trend_deviation": 0.1,
        "timestamp": format!("{day}T00:00:00+00:00"),
        "contributors": {
            "activity_balance": 78,
            "hrv_balance": 81,
            "resting_heart_rate": 90
        }
    })
}

#[allow(dead_code)]
pub fn sleep(day: &str, score: i64) -> Value {
    json!({
        "id": format!("sleep-{day}"),
        "day": day,
        "score": score,
        "timestamp": format!("{day}T00:00:00+00:00"),
        "contributors": { "deep_sleep": 70, "efficiency": 88 }
    })
}

#[allow(dead_code)]
pub fn heart_rate(timestamp: &str, bpm: i64) -> Value {
    json!({ "bpm": bpm, "source": "awake", "timestamp": timestamp })
}

/// Collection envelope.
#[allow(dead_code)]
pub fn page(data: Vec<Value>, next_token: Option<&str>) -> Value {
    json!({ "data": data, "next_token": next_token })
}
