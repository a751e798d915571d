//! An in-memory Nightscout API.
//!
//! [`FakeNightscout`] answers the subset of the Nightscout v1 API that
//! nssync uses: range queries with `find[field][$gte|$lte]`, lookups with
//! `find[_id]`, and array POSTs. Comparisons are plain string comparisons,
//! as MongoDB does for string fields.

use nssync_engine::{
    HttpClient, HttpResponse, Record, Sleeper, SyncError, SyncResult, ID_FIELD,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A request received by a [`FakeNightscout`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedRequest {
    /// `GET` or `POST`.
    pub method: &'static str,
    /// Full URL.
    pub url: String,
    /// `api-secret` header value.
    pub secret: String,
    /// Parsed POST body.
    pub body: Option<Value>,
}

/// An in-memory Nightscout server.
pub struct FakeNightscout {
    base_url: String,
    secret: String,
    collections: Mutex<HashMap<String, Vec<Record>>>,
    requests: Mutex<Vec<ReceivedRequest>>,
    injected: Mutex<VecDeque<SyncResult<HttpResponse>>>,
    next_id: AtomicU64,
}

impl FakeNightscout {
    /// Creates a server at `base_url` accepting the hashed `secret`.
    pub fn new(base_url: &str, secret: &str) -> Arc<Self> {
        Arc::new(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: secret.to_string(),
            collections: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            injected: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stores `records` in `collection`, assigning identifiers to records
    /// without one.
    pub fn seed(&self, collection: &str, records: Vec<Record>) {
        let mut collections = self.collections.lock();
        let stored = collections.entry(collection.to_string()).or_default();
        for record in records {
            stored.push(self.assign_id(record));
        }
    }

    /// Records currently stored in `collection`.
    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.collections
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Replaces the stored record with identifier `id`.
    pub fn replace(&self, collection: &str, id: &str, record: Record) {
        let mut collections = self.collections.lock();
        if let Some(stored) = collections.get_mut(collection) {
            for slot in stored.iter_mut() {
                if slot.get(ID_FIELD).and_then(Value::as_str) == Some(id) {
                    *slot = record.clone();
                }
            }
        }
    }

    /// Deletes the record with identifier `id`.
    pub fn delete(&self, collection: &str, id: &str) {
        if let Some(stored) = self.collections.lock().get_mut(collection) {
            stored.retain(|r| r.get(ID_FIELD).and_then(Value::as_str) != Some(id));
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.requests.lock().clone()
    }

    /// POST requests received so far.
    pub fn posts(&self) -> Vec<ReceivedRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == "POST")
            .cloned()
            .collect()
    }

    /// Answers the next request with `outcome` instead of serving it.
    pub fn inject(&self, outcome: SyncResult<HttpResponse>) {
        self.injected.lock().push_back(outcome);
    }

    /// Answers the next `times` requests with `status`.
    pub fn inject_status(&self, status: u16, times: usize) {
        for _ in 0..times {
            self.inject(Ok(HttpResponse::new(status, "")));
        }
    }

    fn assign_id(&self, mut record: Record) -> Record {
        if !record.contains_key(ID_FIELD) {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            record.insert(ID_FIELD.into(), Value::String(format!("{n:024x}")));
        }
        record
    }

    fn handle(
        &self,
        method: &'static str,
        url: &str,
        secret: &str,
        body: Option<Vec<u8>>,
    ) -> SyncResult<HttpResponse> {
        let parsed_body = body
            .as_deref()
            .map(|b| serde_json::from_slice(b).unwrap_or(Value::Null));
        self.requests.lock().push(ReceivedRequest {
            method,
            url: url.to_string(),
            secret: secret.to_string(),
            body: parsed_body.clone(),
        });

        if let Some(outcome) = self.injected.lock().pop_front() {
            return outcome;
        }
        if secret != self.secret {
            return Ok(HttpResponse::new(401, r#"{"status":401,"message":"Unauthorized"}"#));
        }

        let Some(rest) = url.strip_prefix(&self.base_url) else {
            return Err(SyncError::transport_retryable(format!("could not resolve {url}")));
        };
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        let Some(resource) = path.strip_prefix("/api/v1/") else {
            return Ok(HttpResponse::new(404, "Not Found"));
        };

        match method {
            "GET" => {
                let collection = resource.trim_end_matches(".json");
                let conditions = parse_find(query);
                let matching: Vec<Value> = self
                    .records(collection)
                    .into_iter()
                    .filter(|r| conditions.iter().all(|c| c.matches(r)))
                    .map(Value::Object)
                    .collect();
                Ok(HttpResponse::json(200, &Value::Array(matching)))
            }
            "POST" => {
                let Some(Value::Array(items)) = parsed_body else {
                    return Ok(HttpResponse::new(400, "Bad Request"));
                };
                // the singleton profile document is stored with the list
                let collection = if resource == "profile" { "profiles" } else { resource };
                let records: Vec<Record> = items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::Object(map) => Some(map),
                        _ => None,
                    })
                    .collect();
                let count = records.len();
                self.seed(collection, records);
                let stored = self.records(collection);
                let created: Vec<Value> = stored[stored.len() - count..]
                    .iter()
                    .cloned()
                    .map(Value::Object)
                    .collect();
                Ok(HttpResponse::json(200, &Value::Array(created)))
            }
            _ => Ok(HttpResponse::new(405, "Method Not Allowed")),
        }
    }
}

impl HttpClient for FakeNightscout {
    fn get(&self, url: &str, api_secret: &str) -> SyncResult<HttpResponse> {
        self.handle("GET", url, api_secret, None)
    }

    fn post_json(&self, url: &str, api_secret: &str, body: Vec<u8>) -> SyncResult<HttpResponse> {
        self.handle("POST", url, api_secret, Some(body))
    }
}

#[derive(Debug)]
enum Op {
    Eq,
    Gte,
    Lte,
}

#[derive(Debug)]
struct Condition {
    field: String,
    op: Op,
    value: String,
}

impl Condition {
    fn matches(&self, record: &Record) -> bool {
        let Some(actual) = record.get(&self.field) else {
            return false;
        };
        let actual = match actual {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match self.op {
            Op::Eq => actual == self.value,
            Op::Gte => actual >= self.value,
            Op::Lte => actual <= self.value,
        }
    }
}

/// Parses `find[field]=v`, `find[field][$gte]=v` and `find[field][$lte]=v`
/// pairs; everything else in the query is ignored.
fn parse_find(query: &str) -> Vec<Condition> {
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let inner = key.strip_prefix("find[")?;
            let (field, rest) = inner.split_once(']')?;
            let op = match rest {
                "" => Op::Eq,
                "[$gte]" => Op::Gte,
                "[$lte]" => Op::Lte,
                _ => return None,
            };
            Some(Condition {
                field: field.to_string(),
                op,
                value: value.to_string(),
            })
        })
        .collect()
}

/// Routes requests to the [`FakeNightscout`] whose base URL prefixes the
/// request URL. Unknown hosts fail like an unreachable server.
#[derive(Default, Clone)]
pub struct FakeNetwork {
    servers: Vec<Arc<FakeNightscout>>,
}

impl FakeNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a server.
    pub fn with(mut self, server: Arc<FakeNightscout>) -> Self {
        self.servers.push(server);
        self
    }

    fn route(&self, url: &str) -> SyncResult<&FakeNightscout> {
        self.servers
            .iter()
            .find(|s| url.starts_with(s.base_url()))
            .map(|s| s.as_ref())
            .ok_or_else(|| SyncError::transport_retryable(format!("could not resolve {url}")))
    }
}

impl HttpClient for FakeNetwork {
    fn get(&self, url: &str, api_secret: &str) -> SyncResult<HttpResponse> {
        self.route(url)?.get(url, api_secret)
    }

    fn post_json(&self, url: &str, api_secret: &str, body: Vec<u8>) -> SyncResult<HttpResponse> {
        self.route(url)?.post_json(url, api_secret, body)
    }
}

/// A [`Sleeper`] that records requested delays instead of sleeping.
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Creates a recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far.
    pub fn delays(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
    }
}
