//! HTTP client abstraction.
//!
//! The engine talks to Nightscout through the [`HttpClient`] trait so the
//! actual HTTP library can be swapped for a fake in tests. [`ReqwestClient`]
//! is the production implementation.

use crate::error::{SyncError, SyncResult};
use std::sync::Arc;
use std::time::Duration;

/// Header carrying the hashed API secret on every request.
pub const API_SECRET_HEADER: &str = "api-secret";

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a response with a serialized JSON body.
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for 5xx statuses.
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

/// HTTP client abstraction.
///
/// Implementations return `Ok` for any response the server produced,
/// whatever its status, and `Err` only when no response was obtained.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    fn get(&self, url: &str, api_secret: &str) -> SyncResult<HttpResponse>;

    /// Sends a POST request with a JSON body.
    fn post_json(&self, url: &str, api_secret: &str, body: Vec<u8>) -> SyncResult<HttpResponse>;
}

impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    fn get(&self, url: &str, api_secret: &str) -> SyncResult<HttpResponse> {
        (**self).get(url, api_secret)
    }

    fn post_json(&self, url: &str, api_secret: &str, body: Vec<u8>) -> SyncResult<HttpResponse> {
        (**self).post_json(url, api_secret, body)
    }
}

/// Blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a client with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nssync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::transport_fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn finish(response: reqwest::blocking::Response) -> SyncResult<HttpResponse> {
        let status = response.status().as_u16();
        let body = response.bytes().map_err(map_reqwest_error)?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, api_secret: &str) -> SyncResult<HttpResponse> {
        let response = self
            .client
            .get(url)
            .header(API_SECRET_HEADER, api_secret)
            .send()
            .map_err(map_reqwest_error)?;
        Self::finish(response)
    }

    fn post_json(&self, url: &str, api_secret: &str, body: Vec<u8>) -> SyncResult<HttpResponse> {
        let response = self
            .client
            .post(url)
            .header(API_SECRET_HEADER, api_secret)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(map_reqwest_error)?;
        Self::finish(response)
    }
}

/// Connection, timeout and other request-level failures are retryable;
/// a request that could not even be built is not.
fn map_reqwest_error(e: reqwest::Error) -> SyncError {
    if e.is_builder() || e.is_redirect() {
        SyncError::transport_fatal(e.to_string())
    } else {
        SyncError::transport_retryable(e.to_string())
    }
}
