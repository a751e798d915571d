//! Cache of temporary overrides that were still running when last synced.
//!
//! A treatment synced while its override is running carries a stale end
//! state. Its identifier goes into this cache so a later run can fetch the
//! finished treatment and push the final version to the destination.

use crate::error::{SyncError, SyncResult};
use crate::record::{record_id, Record};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use nssync_storage::StorageBackend;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// `eventType` of an override treatment.
pub const OVERRIDE_EVENT_TYPE: &str = "Temporary Override";

/// `durationType` of an override without a scheduled end.
pub const INDEFINITE_DURATION: &str = "indefinite";

/// One cached override.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverrideEntry {
    /// Source treatment identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Source `created_at`, as stored on the treatment.
    pub created_at: String,
}

impl OverrideEntry {
    /// Builds an entry from a treatment with a string identifier.
    pub fn from_record(record: &Record) -> Option<Self> {
        let id = record_id(record)?.to_string();
        let created_at = match record.get("created_at") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Some(Self { id, created_at })
    }
}

/// Returns true if `record` is a temporary override treatment.
pub fn is_override(record: &Record) -> bool {
    record.get("eventType").and_then(Value::as_str) == Some(OVERRIDE_EVENT_TYPE)
}

/// Returns true while the override in `record` is still running at `now`.
///
/// Indefinite overrides and overrides without a duration yet are running.
/// Otherwise the override runs until `created_at + duration` minutes. A
/// timestamp or duration that cannot be read counts as running, so the
/// entry is looked at again instead of being dropped.
pub fn is_active(record: &Record, now: DateTime<Utc>) -> bool {
    match activity(record, now) {
        Activity::Running => true,
        Activity::Ended => false,
        Activity::Unreadable(field) => {
            warn!(
                id = record_id(record).unwrap_or("<none>"),
                field,
                value = %record.get(field).unwrap_or(&serde_json::Value::Null),
                "override field unreadable, treating as running"
            );
            true
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Running,
    Ended,
    /// The named field could not be read.
    Unreadable(&'static str),
}

fn activity(record: &Record, now: DateTime<Utc>) -> Activity {
    if record.get("durationType").and_then(Value::as_str) == Some(INDEFINITE_DURATION) {
        return Activity::Running;
    }

    let minutes = match record.get("duration") {
        None | Some(Value::Null) => return Activity::Running,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    let Some(minutes) = minutes.filter(|m| m.is_finite()) else {
        return Activity::Unreadable("duration");
    };

    let Some(started) = record
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
    else {
        return Activity::Unreadable("created_at");
    };

    let millis = (minutes * 60_000.0).round() as i64;
    match TimeDelta::try_milliseconds(millis).and_then(|d| started.checked_add_signed(d)) {
        Some(ends) if ends > now => Activity::Running,
        Some(_) => Activity::Ended,
        None => Activity::Unreadable("duration"),
    }
}

/// Parses RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS[.fff]` read as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// The override cache over a [`StorageBackend`].
///
/// The whole cache is read once at load time and rewritten in full on
/// every [`persist`](Self::persist).
pub struct OverrideCache<S: StorageBackend> {
    store: S,
    entries: Vec<OverrideEntry>,
}

impl<S: StorageBackend> OverrideCache<S> {
    /// Loads the cache from `store`. An empty store is an empty cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or does not hold a
    /// JSON array of entries.
    pub fn load(store: S) -> SyncResult<Self> {
        let entries = match store.read_all()? {
            None => Vec::new(),
            Some(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SyncError::Cache(format!("unreadable override cache: {e}")))?,
        };
        Ok(Self { store, entries })
    }

    /// Creates an empty cache that will overwrite whatever `store` holds
    /// on the next persist.
    pub fn empty(store: S) -> Self {
        Self {
            store,
            entries: Vec::new(),
        }
    }

    /// Cached entries, oldest first.
    pub fn entries(&self) -> &[OverrideEntry] {
        &self.entries
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if an entry with `id` is cached.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Caches every running override in `batch` not already cached, then
    /// persists. Returns how many entries were added.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails; added entries stay in memory.
    pub fn record_batch(&mut self, batch: &[Record], now: DateTime<Utc>) -> SyncResult<usize> {
        let mut added = 0;
        for record in batch.iter().filter(|r| is_override(r)) {
            if !is_active(record, now) {
                continue;
            }
            let Some(entry) = OverrideEntry::from_record(record) else {
                continue;
            };
            if self.contains(&entry.id) {
                continue;
            }
            debug!(id = %entry.id, created_at = %entry.created_at, "caching active override");
            self.entries.push(entry);
            added += 1;
        }
        self.persist()?;
        Ok(added)
    }

    /// Removes the entry with `id`. Returns true if one was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Writes the full cache as a pretty-printed JSON array, dropping
    /// entries identical to an earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the store write fails.
    pub fn persist(&mut self) -> SyncResult<()> {
        let mut unique: Vec<OverrideEntry> = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if !unique.contains(&entry) {
                unique.push(entry);
            }
        }
        self.entries = unique;

        let json = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| SyncError::Cache(format!("failed to serialize override cache: {e}")))?;
        self.store.write_all(&json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nssync_storage::InMemoryBackend;
    use serde_json::json;

    fn rec(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn override_at(id: &str, created_at: &str, duration: Value) -> Record {
        let mut r = rec(json!({
            "_id": id,
            "eventType": OVERRIDE_EVENT_TYPE,
            "created_at": created_at,
        }));
        if !duration.is_null() {
            r.insert("duration".into(), duration);
        }
        r
    }

    #[test]
    fn indefinite_override_is_active() {
        let r = rec(json!({
            "eventType": OVERRIDE_EVENT_TYPE,
            "created_at": "2020-01-01T00:00:00Z",
            "duration": 5,
            "durationType": "indefinite",
        }));
        assert!(is_active(&r, now()));
    }

    #[test]
    fn missing_duration_is_active() {
        let r = override_at("a", "2020-01-01T00:00:00Z", Value::Null);
        assert!(is_active(&r, now()));

        let mut r = override_at("a", "2020-01-01T00:00:00Z", Value::Null);
        r.insert("duration".into(), Value::Null);
        assert!(is_active(&r, now()));
    }

    #[test]
    fn future_end_is_active_past_end_is_inactive() {
        // started 30 minutes ago
        let r = override_at("a", "2024-05-01T11:30:00Z", json!(60));
        assert!(is_active(&r, now()));

        let r = override_at("a", "2024-05-01T11:30:00Z", json!(20));
        assert!(!is_active(&r, now()));

        // ends exactly now: no longer running
        let r = override_at("a", "2024-05-01T11:30:00Z", json!(30));
        assert!(!is_active(&r, now()));
    }

    #[test]
    fn duration_accepts_strings_and_fractions() {
        let r = override_at("a", "2024-05-01T11:30:00Z", json!("45"));
        assert!(is_active(&r, now()));

        let r = override_at("a", "2024-05-01T11:59:00Z", json!(0.5));
        assert!(!is_active(&r, now()));
    }

    #[test]
    fn timestamp_formats() {
        let r = override_at("a", "2024-05-01T13:30:00+02:00", json!(60));
        assert!(is_active(&r, now()));

        let r = override_at("a", "2024-05-01T11:30:00.000", json!(20));
        assert!(!is_active(&r, now()));
    }

    #[test]
    fn unreadable_values_count_as_active() {
        let r = override_at("a", "yesterday", json!(5));
        assert!(is_active(&r, now()));

        let r = override_at("a", "2020-01-01T00:00:00Z", json!("soon"));
        assert!(is_active(&r, now()));
    }

    #[test]
    fn unreadable_fields_are_named() {
        let r = override_at("a", "yesterday", json!(5));
        assert_eq!(activity(&r, now()), Activity::Unreadable("created_at"));

        let r = override_at("a", "2020-01-01T00:00:00Z", json!("soon"));
        assert_eq!(activity(&r, now()), Activity::Unreadable("duration"));

        let r = override_at("a", "2020-01-01T00:00:00Z", json!([5]));
        assert_eq!(activity(&r, now()), Activity::Unreadable("duration"));

        let r = override_at("a", "2024-05-01T11:30:00Z", json!(20));
        assert_eq!(activity(&r, now()), Activity::Ended);
    }

    #[test]
    fn only_overrides_are_recognised() {
        assert!(is_override(&override_at("a", "x", Value::Null)));
        assert!(!is_override(&rec(json!({"eventType": "Meal Bolus"}))));
        assert!(!is_override(&rec(json!({"insulin": 2.0}))));
    }

    #[test]
    fn load_absent_store_is_empty() {
        let cache = OverrideCache::load(InMemoryBackend::new()).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn load_corrupted_store_fails() {
        let result = OverrideCache::load(InMemoryBackend::with_data("{not json"));
        assert!(matches!(result, Err(SyncError::Cache(_))));
    }

    #[test]
    fn record_batch_adds_active_overrides_once() {
        let store = InMemoryBackend::new();
        let mut cache = OverrideCache::load(store.clone()).unwrap();

        let batch = vec![
            override_at("running", "2024-05-01T11:30:00Z", json!(60)),
            override_at("finished", "2024-05-01T10:00:00Z", json!(30)),
            rec(json!({"_id": "bolus", "eventType": "Correction Bolus", "insulin": 1.5})),
        ];

        assert_eq!(cache.record_batch(&batch, now()).unwrap(), 1);
        assert_eq!(cache.record_batch(&batch, now()).unwrap(), 0);
        assert_eq!(
            cache.entries(),
            &[OverrideEntry {
                id: "running".into(),
                created_at: "2024-05-01T11:30:00Z".into(),
            }]
        );
        // persisted after each batch
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn record_batch_skips_overrides_without_identifier() {
        let mut cache = OverrideCache::load(InMemoryBackend::new()).unwrap();
        let mut r = override_at("x", "2024-05-01T11:30:00Z", Value::Null);
        r.remove("_id");
        assert_eq!(cache.record_batch(&[r], now()).unwrap(), 0);
    }

    #[test]
    fn persisted_cache_is_pretty_json_and_reloads() {
        let store = InMemoryBackend::new();
        let mut cache = OverrideCache::load(store.clone()).unwrap();
        cache
            .record_batch(
                &[override_at("abc", "2024-05-01T11:30:00Z", Value::Null)],
                now(),
            )
            .unwrap();

        let text = String::from_utf8(store.data().unwrap()).unwrap();
        assert!(text.contains('\n'));
        let on_disk: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            on_disk,
            json!([{"_id": "abc", "created_at": "2024-05-01T11:30:00Z"}])
        );

        let reloaded = OverrideCache::load(store).unwrap();
        assert!(reloaded.contains("abc"));
    }

    #[test]
    fn persist_drops_identical_entries() {
        let store = InMemoryBackend::with_data(
            r#"[{"_id":"a","created_at":"t"},{"_id":"a","created_at":"t"},{"_id":"b","created_at":"t"}]"#,
        );
        let mut cache = OverrideCache::load(store).unwrap();
        assert_eq!(cache.len(), 3);
        cache.persist().unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn remove_entry() {
        let store = InMemoryBackend::with_data(r#"[{"_id":"a","created_at":"t"}]"#);
        let mut cache = OverrideCache::load(store).unwrap();
        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        assert!(cache.is_empty());
    }
}
