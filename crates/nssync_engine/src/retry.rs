//! Retry with exponential backoff around an [`HttpClient`].

use crate::config::RetryConfig;
use crate::error::SyncResult;
use crate::http::{HttpClient, HttpResponse};
use std::time::Duration;
use tracing::warn;

/// Waits between attempts. Tests inject a recorder instead of sleeping.
pub trait Sleeper: Send + Sync {
    /// Blocks for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// An [`HttpClient`] decorator that retries transient failures.
///
/// A call is retried when the inner client fails with a retryable error
/// (connection failures, timeouts) or answers with a 5xx status. 4xx
/// responses and fatal errors are returned immediately. After
/// `max_retries` retries the last outcome is returned as is.
pub struct RetryingClient<C, S = ThreadSleeper> {
    inner: C,
    config: RetryConfig,
    sleeper: S,
}

impl<C: HttpClient> RetryingClient<C, ThreadSleeper> {
    /// Wraps `inner`, sleeping the thread between attempts.
    pub fn new(inner: C, config: RetryConfig) -> Self {
        Self::with_sleeper(inner, config, ThreadSleeper)
    }
}

impl<C: HttpClient, S: Sleeper> RetryingClient<C, S> {
    /// Wraps `inner` with a custom sleeper.
    pub fn with_sleeper(inner: C, config: RetryConfig, sleeper: S) -> Self {
        Self {
            inner,
            config,
            sleeper,
        }
    }

    /// Returns the wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Returns the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn execute<F>(&self, method: &str, url: &str, mut call: F) -> SyncResult<HttpResponse>
    where
        F: FnMut() -> SyncResult<HttpResponse>,
    {
        let max_retries = self.config.max_retries;
        let mut attempt = 0;
        loop {
            let outcome = call();
            let transient = match &outcome {
                Ok(response) => response.is_server_error(),
                Err(e) => e.is_retryable(),
            };
            if !transient || attempt >= max_retries {
                return outcome;
            }

            let reason = match &outcome {
                Ok(response) => format!("HTTP {}", response.status),
                Err(e) => e.to_string(),
            };
            warn!(
                method,
                url,
                reason = %reason,
                "Request failed, retrying ({}/{})...",
                attempt + 1,
                max_retries
            );
            self.sleeper.sleep(self.config.delay_for_attempt(attempt));
            attempt += 1;
        }
    }
}

impl<C: HttpClient, S: Sleeper> HttpClient for RetryingClient<C, S> {
    fn get(&self, url: &str, api_secret: &str) -> SyncResult<HttpResponse> {
        self.execute("GET", url, || self.inner.get(url, api_secret))
    }

    fn post_json(&self, url: &str, api_secret: &str, body: Vec<u8>) -> SyncResult<HttpResponse> {
        self.execute("POST", url, || {
            self.inner.post_json(url, api_secret, body.clone())
        })
    }
}
