// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - upstream access, validation and cache coordination.

pub mod client;
pub mod health;
pub mod retry;
pub mod token;
pub mod validation;

pub use client::{build_http_client, ApiClient};
pub use health::HealthService;
pub use retry::RetryPolicy;
pub use token::{
    token_provider_from_config, OAuthTokenManager, StaticTokenProvider, TokenProvider,
    TOKEN_REFRESH_MARGIN_SECS,
};
pub use validation::{validate_page, validate_record, Page, ValidatedRecord};
