//! Record fixtures and cache helpers.
//!
//! Builders produce documents shaped like the ones a Nightscout server
//! returns, including a server-assigned `_id` where noted.

use chrono::{DateTime, NaiveDateTime, Utc};
use nssync_engine::{Record, OVERRIDE_EVENT_TYPE};
use nssync_storage::FileBackend;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Converts a JSON object literal into a [`Record`].
///
/// # Panics
///
/// Panics if `value` is not a JSON object.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture is not a JSON object: {other}"),
    }
}

/// A glucose entry without an identifier.
pub fn entry(date_string: &str, sgv: u32) -> Record {
    record(json!({
        "type": "sgv",
        "sgv": sgv,
        "direction": "Flat",
        "dateString": date_string,
    }))
}

/// A device status document without an identifier.
pub fn device_status(created_at: &str, battery: u32) -> Record {
    record(json!({
        "device": "openaps://phone",
        "created_at": created_at,
        "uploader": { "battery": battery },
    }))
}

/// A profile document without an identifier.
pub fn profile(start_date: &str, name: &str) -> Record {
    record(json!({
        "defaultProfile": name,
        "startDate": start_date,
        "store": { name: { "dia": 6, "units": "mg/dl" } },
    }))
}

/// A plain treatment without an identifier.
pub fn treatment(created_at: &str, event_type: &str) -> Record {
    record(json!({
        "eventType": event_type,
        "created_at": created_at,
        "enteredBy": "loop://iPhone",
    }))
}

/// A temporary override with identifier `id`.
///
/// `duration` is in minutes; `None` leaves the field out, as Loop does
/// while an override is still running.
pub fn override_treatment(id: &str, created_at: &str, duration: Option<f64>) -> Record {
    let mut r = record(json!({
        "_id": id,
        "eventType": OVERRIDE_EVENT_TYPE,
        "created_at": created_at,
        "reason": "Exercise",
        "correctionRange": [140, 160],
    }));
    if let Some(minutes) = duration {
        r.insert("duration".into(), json!(minutes));
    }
    r
}

/// Adds `_id` to a fixture.
pub fn with_id(mut record: Record, id: &str) -> Record {
    record.insert("_id".into(), json!(id));
    record
}

/// Parses `YYYY-MM-DD HH:MM:SS`.
///
/// # Panics
///
/// Panics on malformed input.
pub fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").expect("fixture timestamp")
}

/// Parses an RFC 3339 timestamp as UTC.
///
/// # Panics
///
/// Panics on malformed input.
pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("fixture timestamp")
        .with_timezone(&Utc)
}

/// A file-backed override cache location with automatic cleanup.
pub struct TempCache {
    path: PathBuf,
    _dir: TempDir,
}

impl TempCache {
    /// Creates a fresh location; no file exists yet.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            path: dir.path().join("active_overrides.json"),
            _dir: dir,
        }
    }

    /// Path of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A backend over the cache file.
    pub fn backend(&self) -> FileBackend {
        FileBackend::new(&self.path)
    }

    /// Parsed cache file content, or `None` if it has not been written.
    ///
    /// # Panics
    ///
    /// Panics if the file exists but is not JSON.
    pub fn contents(&self) -> Option<Value> {
        let bytes = std::fs::read(&self.path).ok()?;
        Some(serde_json::from_slice(&bytes).expect("cache file is not JSON"))
    }
}

impl Default for TempCache {
    fn default() -> Self {
        Self::new()
    }
}
