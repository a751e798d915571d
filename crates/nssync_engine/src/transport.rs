//! Nightscout transport: authenticated fetch and post of records.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{HttpClient, ReqwestClient};
use crate::record::{strip_ids, Record};
use crate::retry::RetryingClient;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, error};

/// What happened to a post request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// Nothing was left to send after stripping identifiers.
    Skipped,
    /// The destination accepted this many records.
    Sent(usize),
    /// The request failed; the failure has been logged.
    Failed,
}

/// A Nightscout transport reads and writes records.
///
/// This trait abstracts the network layer so the engine can be driven by a
/// scripted transport in tests.
pub trait NightscoutTransport {
    /// Fetches the records at `url`.
    ///
    /// `Ok(vec![])` is a successful, empty answer. `Err` means the answer
    /// is unknown and must not be mistaken for "no records".
    fn fetch(&self, url: &str, secret: &str) -> SyncResult<Vec<Record>>;

    /// Posts `records` to `url` without their source identifiers.
    ///
    /// Failures are logged and reported in the outcome, never propagated:
    /// a post is best effort.
    fn post(&self, url: &str, secret: &str, records: &[Record]) -> PostOutcome;
}

/// [`NightscoutTransport`] over any [`HttpClient`].
pub struct NightscoutClient<C: HttpClient> {
    client: C,
}

impl NightscoutClient<RetryingClient<ReqwestClient>> {
    /// Builds the production client: `reqwest` wrapped in the configured
    /// retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        let http = ReqwestClient::new(config.timeout)?;
        Ok(Self::new(RetryingClient::new(http, config.retry.clone())))
    }
}

impl<C: HttpClient> NightscoutClient<C> {
    /// Creates a transport over `client`.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Returns the underlying HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn try_fetch(&self, url: &str, secret: &str) -> SyncResult<Vec<Record>> {
        let response = self.client.get(url, secret)?;
        if !response.is_success() {
            return Err(SyncError::Http {
                status: response.status,
                url: url.to_string(),
            });
        }
        serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Decode(format!("{url}: {e}")))
    }

    fn try_post(&self, url: &str, secret: &str, records: &[Record]) -> SyncResult<()> {
        let body = serde_json::to_vec(records).map_err(|e| SyncError::Encode(e.to_string()))?;
        let response = self.client.post_json(url, secret, body)?;
        if !response.is_success() {
            return Err(SyncError::Http {
                status: response.status,
                url: url.to_string(),
            });
        }
        Ok(())
    }
}

impl<C: HttpClient> NightscoutTransport for NightscoutClient<C> {
    fn fetch(&self, url: &str, secret: &str) -> SyncResult<Vec<Record>> {
        debug!(url, "GET");
        let result = self.try_fetch(url, secret);
        match &result {
            Ok(records) => debug!(url, count = records.len(), "fetched"),
            Err(e) => error!(url, error = %e, "fetch failed"),
        }
        result
    }

    fn post(&self, url: &str, secret: &str, records: &[Record]) -> PostOutcome {
        let stripped = strip_ids(records);
        if stripped.is_empty() {
            return PostOutcome::Skipped;
        }

        debug!(url, count = stripped.len(), "POST");
        match self.try_post(url, secret, &stripped) {
            Ok(()) => PostOutcome::Sent(stripped.len()),
            Err(e) => {
                error!(url, count = stripped.len(), error = %e, "post failed");
                PostOutcome::Failed
            }
        }
    }
}

/// A recorded post made through [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct PostCall {
    /// Target URL.
    pub url: String,
    /// Secret header value.
    pub secret: String,
    /// Records as handed to the transport, identifiers included.
    pub records: Vec<Record>,
}

/// A scripted transport for testing.
///
/// Unscripted URLs answer with an empty, successful result. URLs scripted
/// with [`MockTransport::set_failure`] answer with an error.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, Option<Vec<Record>>>>,
    fetches: Mutex<Vec<String>>,
    posts: Mutex<Vec<PostCall>>,
    fail_posts: Mutex<bool>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers fetches of `url` with `records`.
    pub fn set_response(&self, url: impl Into<String>, records: Vec<Record>) {
        self.responses.lock().insert(url.into(), Some(records));
    }

    /// Makes fetches of `url` fail.
    pub fn set_failure(&self, url: impl Into<String>) {
        self.responses.lock().insert(url.into(), None);
    }

    /// Makes every post fail.
    pub fn set_post_failure(&self, fail: bool) {
        *self.fail_posts.lock() = fail;
    }

    /// URLs fetched so far, in order.
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().clone()
    }

    /// Posts made so far, in order.
    pub fn posts(&self) -> Vec<PostCall> {
        self.posts.lock().clone()
    }
}

impl NightscoutTransport for MockTransport {
    fn fetch(&self, url: &str, _secret: &str) -> SyncResult<Vec<Record>> {
        self.fetches.lock().push(url.to_string());
        match self.responses.lock().get(url) {
            Some(Some(records)) => Ok(records.clone()),
            Some(None) => Err(SyncError::transport_fatal(format!("scripted failure for {url}"))),
            None => Ok(Vec::new()),
        }
    }

    fn post(&self, url: &str, secret: &str, records: &[Record]) -> PostOutcome {
        self.posts.lock().push(PostCall {
            url: url.to_string(),
            secret: secret.to_string(),
            records: records.to_vec(),
        });
        let count = records.len();
        if count == 0 {
            PostOutcome::Skipped
        } else if *self.fail_posts.lock() {
            PostOutcome::Failed
        } else {
            PostOutcome::Sent(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use serde_json::{json, Value};

    #[derive(Debug, Clone, PartialEq)]
    struct Request {
        method: &'static str,
        url: String,
        secret: String,
        body: Option<Value>,
    }

    /// Answers every request with one canned outcome and records requests.
    struct CannedClient {
        response: Mutex<Option<HttpResponse>>,
        requests: Mutex<Vec<Request>>,
    }

    impl CannedClient {
        fn answering(response: Option<HttpResponse>) -> Self {
            Self {
                response: Mutex::new(response),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn answer(&self) -> SyncResult<HttpResponse> {
            self.response
                .lock()
                .clone()
                .ok_or_else(|| SyncError::transport_retryable("Error Communicating with Server"))
        }
    }

    impl HttpClient for CannedClient {
        fn get(&self, url: &str, api_secret: &str) -> SyncResult<HttpResponse> {
            self.requests.lock().push(Request {
                method: "GET",
                url: url.into(),
                secret: api_secret.into(),
                body: None,
            });
            self.answer()
        }

        fn post_json(
            &self,
            url: &str,
            api_secret: &str,
            body: Vec<u8>,
        ) -> SyncResult<HttpResponse> {
            self.requests.lock().push(Request {
                method: "POST",
                url: url.into(),
                secret: api_secret.into(),
                body: Some(serde_json::from_slice(&body).unwrap()),
            });
            self.answer()
        }
    }

    fn records(value: Value) -> Vec<Record> {
        serde_json::from_value(value).unwrap()
    }

    const URL: &str = "https://example.com/api/v1/entries.json";

    #[test]
    fn fetch_returns_data_on_success() {
        let client = NightscoutClient::new(CannedClient::answering(Some(HttpResponse::json(
            200,
            &json!([{"id": 1, "value": 100}]),
        ))));

        let data = client.fetch(URL, "api-secret-hash").unwrap();
        assert_eq!(data, records(json!([{"id": 1, "value": 100}])));

        let requests = client.client().requests.lock().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].secret, "api-secret-hash");
    }

    #[test]
    fn fetch_empty_array_is_success() {
        let client =
            NightscoutClient::new(CannedClient::answering(Some(HttpResponse::new(200, "[]"))));
        assert_eq!(client.fetch(URL, "h").unwrap(), Vec::<Record>::new());
    }

    #[test]
    fn fetch_request_failure_is_error() {
        let client = NightscoutClient::new(CannedClient::answering(None));
        assert!(client.fetch(URL, "h").is_err());
    }

    #[test]
    fn fetch_error_status_is_error() {
        let client =
            NightscoutClient::new(CannedClient::answering(Some(HttpResponse::new(401, "no"))));
        let err = client.fetch(URL, "h").unwrap_err();
        assert!(matches!(err, SyncError::Http { status: 401, .. }));
    }

    #[test]
    fn fetch_malformed_body_is_error() {
        let client = NightscoutClient::new(CannedClient::answering(Some(HttpResponse::new(
            200,
            "<html>maintenance</html>",
        ))));
        assert!(matches!(
            client.fetch(URL, "h").unwrap_err(),
            SyncError::Decode(_)
        ));

        let client = NightscoutClient::new(CannedClient::answering(Some(HttpResponse::json(
            200,
            &json!({"status": "ok"}),
        ))));
        assert!(matches!(
            client.fetch(URL, "h").unwrap_err(),
            SyncError::Decode(_)
        ));
    }

    #[test]
    fn post_sends_data_without_id_field() {
        let client =
            NightscoutClient::new(CannedClient::answering(Some(HttpResponse::new(200, ""))));
        let data = records(json!([
            {"_id": "123", "value": 100},
            {"_id": "456", "value": 150},
        ]));

        let outcome = client.post("https://example.com/api/v1/entries", "api-secret-hash", &data);
        assert_eq!(outcome, PostOutcome::Sent(2));

        let requests = client.client().requests.lock().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].url, "https://example.com/api/v1/entries");
        assert_eq!(requests[0].secret, "api-secret-hash");
        assert_eq!(
            requests[0].body,
            Some(json!([{"value": 100}, {"value": 150}]))
        );
    }

    #[test]
    fn post_does_nothing_with_empty_data() {
        let client =
            NightscoutClient::new(CannedClient::answering(Some(HttpResponse::new(200, ""))));
        assert_eq!(client.post(URL, "h", &[]), PostOutcome::Skipped);
        assert!(client.client().requests.lock().is_empty());
    }

    #[test]
    fn post_sends_identifier_only_records_as_empty_objects() {
        let client =
            NightscoutClient::new(CannedClient::answering(Some(HttpResponse::new(200, ""))));
        let outcome = client.post(URL, "h", &records(json!([{"_id": "only-id"}])));
        assert_eq!(outcome, PostOutcome::Sent(1));

        let requests = client.client().requests.lock().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].body, Some(json!([{}])));
    }

    #[test]
    fn post_swallows_request_failure() {
        let client = NightscoutClient::new(CannedClient::answering(None));
        let outcome = client.post(URL, "h", &records(json!([{"value": 100}])));
        assert_eq!(outcome, PostOutcome::Failed);
    }

    #[test]
    fn post_reports_rejected_status() {
        let client =
            NightscoutClient::new(CannedClient::answering(Some(HttpResponse::new(400, "bad"))));
        let outcome = client.post(URL, "h", &records(json!([{"value": 100}])));
        assert_eq!(outcome, PostOutcome::Failed);
    }

    #[test]
    fn mock_transport_scripting() {
        let mock = MockTransport::new();
        mock.set_response("a", records(json!([{"x": 1}])));
        mock.set_failure("b");

        assert_eq!(mock.fetch("a", "s").unwrap().len(), 1);
        assert!(mock.fetch("b", "s").is_err());
        assert!(mock.fetch("c", "s").unwrap().is_empty());
        assert_eq!(mock.fetches(), vec!["a", "b", "c"]);

        assert_eq!(
            mock.post("p", "s", &records(json!([{"_id": "1", "x": 1}]))),
            PostOutcome::Sent(1)
        );
        mock.set_post_failure(true);
        assert_eq!(
            mock.post("p", "s", &records(json!([{"x": 2}]))),
            PostOutcome::Failed
        );
        assert_eq!(mock.posts().len(), 2);
        assert_eq!(mock.posts()[0].records[0]["_id"], json!("1"));
    }
}
