//! # nssync Engine
//!
//! Mirrors Nightscout records from one server to another.
//!
//! This crate provides:
//! - Endpoint descriptors for entries, treatments, device status and profiles
//! - Day-by-day windowing of a sync range
//! - An HTTP transport abstraction with a `reqwest` implementation
//! - Retry with exponential backoff
//! - Deduplication against the destination by date field
//! - A persisted cache of running temporary overrides, revisited until
//!   they finish
//!
//! ## Architecture
//!
//! For each endpoint the [`Syncer`] walks the configured range one day at
//! a time: fetch the day from the source, optionally drop records the
//! destination already has, and post the rest. Treatment batches also feed
//! the [`OverrideCache`]. A separate pass re-fetches each cached override
//! and posts its final state once it has ended.
//!
//! ## Key Invariants
//!
//! - Records never reach the destination with a source `_id`
//! - A failed request is never mistaken for an empty answer
//! - Nothing is posted for a window whose duplicates cannot be determined
//! - Failures are logged and counted, never propagated out of a run

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod endpoint;
mod engine;
mod error;
mod http;
mod overrides;
mod record;
mod retry;
mod transport;
mod window;

pub use config::{
    default_cache_path, hash_secret, Instance, RetryConfig, SyncConfig, DEFAULT_CACHE_FILE,
    DESTINATION_SECRET_VAR, DESTINATION_URL_VAR, SOURCE_SECRET_VAR, SOURCE_URL_VAR,
};
pub use endpoint::{
    treatment_by_id_url, Endpoint, DEFAULT_ENDPOINTS, DEVICE_STATUS, ENTRIES, PROFILES,
    TREATMENTS,
};
pub use engine::{Clock, EndpointReport, ReconcileReport, RunReport, Syncer};
pub use error::{ConfigError, SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, ReqwestClient, API_SECRET_HEADER};
pub use overrides::{
    is_active, is_override, OverrideCache, OverrideEntry, INDEFINITE_DURATION,
    OVERRIDE_EVENT_TYPE,
};
pub use record::{date_key, record_id, retain_new, strip_id, strip_ids, Record, ID_FIELD};
pub use retry::{RetryingClient, Sleeper, ThreadSleeper};
pub use transport::{MockTransport, NightscoutClient, NightscoutTransport, PostCall, PostOutcome};
pub use window::{default_range, DayWindow, DayWindows};
