// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Retry with exponential backoff and jitter for upstream calls.

use crate::config::RetrySettings;
use crate::error::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry policy for one logical upstream request.
///
/// Delay before retry `n` (0-based) is `initial_delay * 2^n` plus uniform
/// jitter in `[0, max_jitter)`. Only errors reporting
/// [`crate::error::AppError::is_retryable`] are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    settings: RetrySettings,
}

impl RetryPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self { settings }
    }

    pub fn max_retries(&self) -> u32 {
        self.settings.max_retries
    }

    /// Backoff before retry number `attempt` (0 for the first retry).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let base = self.settings.initial_delay_ms.saturating_mul(factor);
        let jitter = if self.settings.max_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..self.settings.max_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(base.saturating_add(jitter))
    }

    /// Run `op` until it succeeds, fails terminally, or the retry budget is
    /// spent. The last error is returned unmodified.
    ///
    /// `op` receives the 0-based attempt number.
    pub async fn run<T, F, Fut>(&self, endpoint: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.settings.max_retries => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        endpoint,
                        attempt = attempt + 1,
                        max_retries = self.settings.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        code = e.code(),
                        status = e.status(),
                        "Upstream request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!(
                            endpoint,
                            attempts = attempt + 1,
                            code = e.code(),
                            "Upstream retries exhausted"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(RetrySettings {
            max_retries,
            initial_delay_ms: 0,
            max_jitter_ms: 0,
        })
    }

    fn unavailable() -> AppError {
        AppError::Upstream {
            endpoint: "/v2/usercollection/daily_sleep".to_string(),
            status: Some(503),
            message: "Service Unavailable".to_string(),
        }
    }

    #[test]
    fn test_delay_grows_geometrically_within_jitter() {
        let policy = RetryPolicy::new(RetrySettings {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_jitter_ms: 1000,
        });
        for attempt in 0..3 {
            let delay = policy.delay_for(attempt).as_millis() as u64;
            let base = 1000 * 2u64.pow(attempt);
            assert!(delay >= base && delay < base + 1000, "attempt {attempt}: {delay}");
        }
    }

    #[test]
    fn test_delay_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::new(RetrySettings {
            max_retries: 100,
            initial_delay_ms: 1000,
            max_jitter_ms: 0,
        });
        assert_eq!(policy.delay_for(90), Duration::from_millis(u64::MAX));
    }

    #[tokio::test]
    async fn test_retryable_error_uses_full_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = policy(3)
            .run("/x", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(unavailable()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.unwrap_err().status(), Some(503));
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = policy(3)
            .run("/x", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::authentication("revoked")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.unwrap_err().is_authentication());
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let result = policy(3)
            .run("/x", |attempt| async move {
                if attempt < 2 {
                    Err(unavailable())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
    }
}
