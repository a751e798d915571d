//! # nssync Testkit
//!
//! Test utilities for nssync.
//!
//! This crate provides:
//! - Record fixtures shaped like real Nightscout documents
//! - [`FakeNightscout`], an in-memory Nightscout API behind the
//!   [`nssync_engine::HttpClient`] seam, and [`FakeNetwork`] to route
//!   between several of them
//! - Property-based generators using proptest
//! - Temporary file-backed override caches
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nssync_testkit::prelude::*;
//!
//! #[test]
//! fn entries_reach_destination() {
//!     let source = FakeNightscout::new("https://source.test", "s");
//!     source.seed("entries", vec![entry("2023-01-01T10:00:00Z", 110)]);
//!     // ... build a NightscoutClient over a FakeNetwork and sync
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fake;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fake::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fake::*;
pub use fixtures::*;
pub use generators::*;
