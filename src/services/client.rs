// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Resilient client for the health data REST API.
//!
//! Handles:
//! - Bearer authentication through a [`TokenProvider`]
//! - Status classification into the error taxonomy
//! - Retry with exponential backoff for 429, 5xx and transport failures
//! - `next_token` pagination across a date range
//! - Validation of every response body before it is returned

use crate::config::Config;
use crate::error::{AppError, FieldViolation, Result};
use crate::models::{
    DailyActivity, DailyReadiness, DailySleep, DateRange, EntityType, HealthEntity,
    HeartRateSample,
};
use crate::services::retry::RetryPolicy;
use crate::services::token::TokenProvider;
use crate::services::validation::{validate_page, Page};
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Wait suggested to callers when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Upper bound on pages followed for one fetch.
const MAX_PAGES: usize = 1000;

/// Longest slice of an error body carried into an error message.
const MAX_ERROR_BODY_LEN: usize = 200;

/// Build the shared HTTP client with a per-attempt timeout.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("oura-cache/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Upstream {
            endpoint: "client".to_string(),
            status: None,
            message: format!("failed to build HTTP client: {e}"),
        })
}

/// Health data API client.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        config: &Config,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            tokens,
            retry: RetryPolicy::new(config.retry.clone()),
        }
    }

    pub fn tokens(&self) -> &Arc<dyn TokenProvider> {
        &self.tokens
    }

    /// Fetch every record of `T` in `range`, following pagination.
    ///
    /// Without a range the upstream default window applies. Records are
    /// returned in upstream order, pages concatenated.
    pub async fn fetch<T: HealthEntity>(&self, range: Option<DateRange>) -> Result<Vec<T>> {
        let endpoint = T::ENTITY_TYPE.endpoint();
        let mut records = Vec::new();
        let mut next_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();
        let mut pages = 0usize;

        loop {
            if pages >= MAX_PAGES {
                return Err(AppError::Upstream {
                    endpoint: endpoint.to_string(),
                    status: None,
                    message: format!("pagination did not finish within {MAX_PAGES} pages"),
                });
            }

            let page: Page<T> = self
                .retry
                .run(endpoint, |attempt| {
                    self.fetch_page::<T>(range, next_token.as_deref(), attempt)
                })
                .await?;
            pages += 1;
            records.extend(page.data);

            match page.next_token {
                Some(token) if !seen_tokens.insert(token.clone()) => {
                    tracing::warn!(endpoint, pages, "Upstream returned a next_token already followed, stopping pagination");
                    break;
                }
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(endpoint, pages, count = records.len(), "Fetched upstream records");
        Ok(records)
    }

    /// One attempt at one page.
    async fn fetch_page<T: HealthEntity>(
        &self,
        range: Option<DateRange>,
        next_token: Option<&str>,
        attempt: u32,
    ) -> Result<Page<T>> {
        let endpoint = T::ENTITY_TYPE.endpoint();
        let token = self.tokens.access_token().await?;

        let mut query: Vec<(&str, String)> = Vec::with_capacity(3);
        if let Some(range) = range {
            query.extend(range.query_params());
        }
        if let Some(next) = next_token {
            query.push(("next_token", next.to_string()));
        }

        let url = format!("{}{}", self.base_url, endpoint);
        tracing::debug!(endpoint, attempt, paged = next_token.is_some(), "Requesting upstream page");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&query)
            .send()
            .await
            .map_err(|e| AppError::Upstream {
                endpoint: endpoint.to_string(),
                status: None,
                message: transport_message(&e),
            })?;

        let body = check_response(T::ENTITY_TYPE, response).await?;
        validate_page(&body)
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
}

/// Classify the response status and decode a successful JSON body.
///
/// A 2xx body that is not JSON is a malformed payload, reported as a
/// validation failure rather than retried.
async fn check_response(entity: EntityType, response: reqwest::Response) -> Result<Value> {
    let endpoint = entity.endpoint();
    let status = response.status();
    if status.is_success() {
        // A body cut off in transit is a transport failure, so no status.
        let text = response.text().await.map_err(|e| AppError::Upstream {
            endpoint: endpoint.to_string(),
            status: None,
            message: format!("failed to read response body: {}", transport_message(&e)),
        })?;
        return serde_json::from_str(&text).map_err(|e| AppError::Validation {
            entity,
            violations: vec![FieldViolation {
                field: "$".to_string(),
                value: truncate(&text),
                reason: format!("response body is not valid JSON: {e}"),
            }],
        });
    }

    let retry_after = retry_after_secs(&response);
    let body = response.text().await.unwrap_or_default();
    let body = truncate(&body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            tracing::warn!(endpoint, status = status.as_u16(), "Upstream rejected credentials");
            Err(AppError::Authentication {
                reason: format!("{endpoint} returned {status}"),
                status: Some(status.as_u16()),
            })
        }
        StatusCode::TOO_MANY_REQUESTS => {
            tracing::warn!(endpoint, retry_after, "Upstream rate limit hit (429)");
            Err(AppError::RateLimit {
                endpoint: endpoint.to_string(),
                retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            })
        }
        _ => Err(AppError::Upstream {
            endpoint: endpoint.to_string(),
            status: Some(status.as_u16()),
            message: if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            } else {
                body
            },
        }),
    }
}

fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn transport_message(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY_LEN {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
