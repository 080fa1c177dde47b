// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access token lifecycle.
//!
//! Handles:
//! - Personal access tokens (used as-is, never refreshed)
//! - OAuth authorization-code exchange and revocation
//! - Proactive refresh when a token is within 5 minutes of expiry
//! - Single-flight refresh so concurrent callers share one token request

use crate::config::{Config, CredentialSource, OAuthSettings};
use crate::db::CacheStore;
use crate::error::{AppError, Result};
use crate::models::Credential;
use crate::time_utils::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Lifetime assumed when the token endpoint omits both expiry fields.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// Source of bearer tokens for upstream requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A bearer token valid for at least the refresh margin.
    async fn access_token(&self) -> Result<String>;

    /// Exchange an authorization code for a credential and persist it.
    async fn exchange_code(&self, code: &str) -> Result<Credential>;

    /// Revoke `token` (or the stored access token) and forget it locally.
    async fn revoke(&self, token: Option<&str>) -> Result<()>;

    /// Consent URL for the authorization-code flow, if this provider has one.
    fn authorization_url(&self, _state: &str) -> Option<String> {
        None
    }
}

/// Long-lived personal access token.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }

    async fn exchange_code(&self, _code: &str) -> Result<Credential> {
        Err(AppError::authentication(
            "a personal access token is configured, so there is no authorization code to exchange",
        ))
    }

    async fn revoke(&self, _token: Option<&str>) -> Result<()> {
        tracing::info!("Personal access tokens are revoked from the account settings page");
        Ok(())
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
}

/// OAuth credential manager backed by the cache store.
pub struct OAuthTokenManager {
    http: reqwest::Client,
    settings: OAuthSettings,
    store: Arc<CacheStore>,
    clock: Arc<dyn Clock>,
    /// Serializes refreshes so one expiring token produces one token request.
    refresh_lock: Mutex<()>,
}

impl OAuthTokenManager {
    pub fn new(
        http: reqwest::Client,
        settings: OAuthSettings,
        store: Arc<CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            settings,
            store,
            clock,
            refresh_lock: Mutex::new(()),
        }
    }

    fn is_usable(&self, credential: &Credential, now: DateTime<Utc>) -> bool {
        now.checked_add_signed(Duration::seconds(TOKEN_REFRESH_MARGIN_SECS))
            .is_some_and(|deadline| deadline < credential.expires_at)
    }

    fn stored_credential(&self) -> Result<Credential> {
        self.store.load_credential()?.ok_or_else(|| {
            AppError::authentication("no stored credential; authorization is required")
        })
    }

    /// Refresh the stored credential. Caller holds `refresh_lock`.
    async fn refresh(&self, current: Credential) -> Result<Credential> {
        let Some(refresh_token) = current.refresh_token.as_deref() else {
            self.forget_credential();
            return Err(AppError::authentication(
                "stored credential has no refresh token",
            ));
        };

        tracing::info!(expires_at = %current.expires_at, "Refreshing access token");

        let response = match self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
            ])
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // A rejected refresh token will not start working later.
                self.forget_credential();
                return Err(AppError::authentication(format!("token refresh failed: {e}")));
            }
        };

        let credential = self.credential_from(response, current.refresh_token.clone());
        self.store.save_credential(&credential)?;

        tracing::info!(expires_at = %credential.expires_at, "Access token refreshed");
        Ok(credential)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let endpoint = self.settings.token_url.as_str();
        let response = self
            .http
            .post(endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::Upstream {
                endpoint: endpoint.to_string(),
                status: None,
                message: format!("token request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Token endpoint rejected request");
            return Err(AppError::Authentication {
                reason: format!("token endpoint returned status {status}"),
                status: Some(status.as_u16()),
            });
        }

        response.json().await.map_err(|e| AppError::Upstream {
            endpoint: endpoint.to_string(),
            status: Some(status.as_u16()),
            message: format!("failed to parse token response: {e}"),
        })
    }

    /// Build a credential, keeping `previous_refresh` when none is returned.
    fn credential_from(
        &self,
        response: TokenResponse,
        previous_refresh: Option<String>,
    ) -> Credential {
        let now = self.clock.now();
        let after = |secs: i64| Duration::try_seconds(secs).and_then(|d| now.checked_add_signed(d));

        let reported = response
            .expires_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .or_else(|| response.expires_in.and_then(after));
        if reported.is_none() && (response.expires_at.is_some() || response.expires_in.is_some()) {
            tracing::warn!(
                expires_in = ?response.expires_in,
                expires_at = ?response.expires_at,
                "Token expiry out of range, assuming default lifetime"
            );
        }
        let expires_at = reported
            .or_else(|| after(DEFAULT_TOKEN_LIFETIME_SECS))
            .unwrap_or(now);

        Credential {
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            expires_at,
            updated_at: now,
        }
    }

    fn forget_credential(&self) {
        if let Err(e) = self.store.clear_credential() {
            tracing::warn!(error = %e, "Failed to clear stored credential");
        }
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenManager {
    async fn access_token(&self) -> Result<String> {
        let credential = self.stored_credential()?;
        if self.is_usable(&credential, self.clock.now()) {
            return Ok(credential.access_token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another task may have refreshed while we were waiting.
        let credential = self.stored_credential()?;
        if self.is_usable(&credential, self.clock.now()) {
            return Ok(credential.access_token);
        }

        Ok(self.refresh(credential).await?.access_token)
    }

    async fn exchange_code(&self, code: &str) -> Result<Credential> {
        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
            ])
            .await?;

        let credential = self.credential_from(response, None);
        self.store.save_credential(&credential)?;

        tracing::info!(expires_at = %credential.expires_at, "Authorization code exchanged, credential stored");
        Ok(credential)
    }

    async fn revoke(&self, token: Option<&str>) -> Result<()> {
        let token = match token {
            Some(t) => Some(t.to_string()),
            None => self.store.load_credential()?.map(|c| c.access_token),
        };

        // Forget locally first so nothing keeps using a token being revoked.
        let removed = self.store.clear_credential()?;
        tracing::info!(removed, "Cleared stored credential");

        let Some(token) = token else {
            return Ok(());
        };

        let endpoint = self.settings.revoke_url.as_str();
        let response = self
            .http
            .get(endpoint)
            .query(&[("access_token", token.as_str())])
            .send()
            .await
            .map_err(|e| AppError::Upstream {
                endpoint: endpoint.to_string(),
                status: None,
                message: format!("revocation request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                endpoint: endpoint.to_string(),
                status: Some(status.as_u16()),
                message: format!("revocation rejected: {body}"),
            });
        }

        tracing::info!("Token revoked upstream");
        Ok(())
    }

    fn authorization_url(&self, state: &str) -> Option<String> {
        Some(format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.settings.authorize_url,
            urlencoding::encode(&self.settings.client_id),
            urlencoding::encode(&self.settings.redirect_uri),
            urlencoding::encode(&self.settings.scopes),
            urlencoding::encode(state),
        ))
    }
}

/// Build the provider selected by the configured credential source.
pub fn token_provider_from_config(
    config: &Config,
    http: reqwest::Client,
    store: Arc<CacheStore>,
    clock: Arc<dyn Clock>,
) -> Arc<dyn TokenProvider> {
    match &config.credentials {
        CredentialSource::PersonalToken(token) => Arc::new(StaticTokenProvider::new(token.clone())),
        CredentialSource::OAuth(settings) => Arc::new(OAuthTokenManager::new(
            http,
            settings.clone(),
            store,
            clock,
        )),
    }
}
