//! Endpoint descriptors and Nightscout URL construction.

use chrono::NaiveDate;

/// One REST resource category and how to sync it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Name used in read URLs, e.g. `entries`.
    pub name: &'static str,
    /// Field the date range query and deduplication key on.
    pub date_field: &'static str,
    /// Whether to query the destination and skip records it already has.
    pub deduplicate: bool,
}

/// Glucose entries.
pub const ENTRIES: Endpoint = Endpoint::new("entries", "dateString", false);
/// Careportal treatments, including temporary overrides.
pub const TREATMENTS: Endpoint = Endpoint::new("treatments", "created_at", false);
/// Uploader and pump status documents.
pub const DEVICE_STATUS: Endpoint = Endpoint::new("devicestatus", "created_at", true);
/// Therapy profiles.
pub const PROFILES: Endpoint = Endpoint::new("profiles", "startDate", true);

/// Every endpoint synced by a default run, in sync order.
pub const DEFAULT_ENDPOINTS: [Endpoint; 4] = [ENTRIES, TREATMENTS, DEVICE_STATUS, PROFILES];

impl Endpoint {
    /// Creates an endpoint descriptor.
    pub const fn new(name: &'static str, date_field: &'static str, deduplicate: bool) -> Self {
        Self {
            name,
            date_field,
            deduplicate,
        }
    }

    /// Looks up one of the [`DEFAULT_ENDPOINTS`] by name.
    pub fn by_name(name: &str) -> Option<Endpoint> {
        DEFAULT_ENDPOINTS.iter().copied().find(|e| e.name == name)
    }

    /// Name used when posting. The destination exposes the profile
    /// singleton as `profile`, not `profiles`.
    pub fn write_name(&self) -> &'static str {
        if self.name == PROFILES.name {
            "profile"
        } else {
            self.name
        }
    }

    /// Returns true for the treatments endpoint, whose batches feed the
    /// override cache.
    pub fn is_treatments(&self) -> bool {
        self.name == TREATMENTS.name
    }

    /// Builds the query for every record with `date_field` between `from`
    /// and `to`, both inclusive.
    pub fn range_query_url(&self, base: &str, from: NaiveDate, to: NaiveDate) -> String {
        format!(
            "{}/api/v1/{}.json?count=all&find[{}][$lte]={}&find[{}][$gte]={}",
            base.trim_end_matches('/'),
            self.name,
            self.date_field,
            to.format("%Y-%m-%d"),
            self.date_field,
            from.format("%Y-%m-%d"),
        )
    }

    /// Builds the POST target on `base`.
    pub fn write_url(&self, base: &str) -> String {
        format!("{}/api/v1/{}", base.trim_end_matches('/'), self.write_name())
    }
}

/// Builds the lookup for a single treatment by identifier.
pub fn treatment_by_id_url(base: &str, id: &str) -> String {
    format!(
        "{}/api/v1/{}.json?find[_id]={}",
        base.trim_end_matches('/'),
        TREATMENTS.name,
        id
    )
}
