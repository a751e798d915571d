//! Nightscout documents as opaque JSON objects.

use serde_json::{Map, Value};
use std::collections::HashSet;

/// One API document: an entry, treatment, device status or profile.
///
/// The engine never interprets more than a handful of fields, so records
/// stay untyped JSON objects.
pub type Record = Map<String, Value>;

/// Field holding the server-assigned identifier.
pub const ID_FIELD: &str = "_id";

/// Returns the record's server-assigned identifier, if it is a string.
pub fn record_id(record: &Record) -> Option<&str> {
    record.get(ID_FIELD).and_then(Value::as_str)
}

/// Returns a copy of `record` without its server-assigned identifier.
pub fn strip_id(record: &Record) -> Record {
    let mut stripped = record.clone();
    stripped.remove(ID_FIELD);
    stripped
}

/// Strips identifiers from every record.
///
/// A record holding nothing but its identifier becomes `{}`; it is still
/// part of the batch.
pub fn strip_ids(records: &[Record]) -> Vec<Record> {
    records.iter().map(strip_id).collect()
}

/// Returns the dedup key of `record`: its `field` value, unless absent
/// or null.
pub fn date_key<'a>(record: &'a Record, field: &str) -> Option<&'a Value> {
    record.get(field).filter(|v| !v.is_null())
}

/// Returns the records of `source` whose `date_field` value does not
/// occur among the `date_field` values of `existing`.
///
/// Values are compared as raw JSON, so `"2023-01-01T10:00:00Z"` and
/// `"2023-01-01T10:00:00.000Z"` are different keys. Source records without
/// the field are always kept; destination records without it match nothing.
pub fn retain_new(source: Vec<Record>, existing: &[Record], date_field: &str) -> Vec<Record> {
    let existing_keys: HashSet<String> = existing
        .iter()
        .filter_map(|r| date_key(r, date_field))
        .map(Value::to_string)
        .collect();

    if existing_keys.is_empty() {
        return source;
    }

    source
        .into_iter()
        .filter(|r| match date_key(r, date_field) {
            Some(v) => !existing_keys.contains(&v.to_string()),
            None => true,
        })
        .collect()
}
