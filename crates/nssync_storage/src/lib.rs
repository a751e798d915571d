//! # nssync Storage
//!
//! Storage backend trait and implementations for nssync's persisted state.
//!
//! The only durable state nssync keeps between runs is the list of
//! temporary overrides that were still active when last seen. That list is
//! serialized by the engine; backends here are **opaque whole-blob stores**
//! that never interpret the bytes they hold.
//!
//! ## Design Principles
//!
//! - A backend holds at most one blob: read it whole, overwrite it whole
//! - Nothing stored yet is `Ok(None)`, not an error
//! - No locking: a single process owns the store for the duration of a run
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and dry runs
//! - [`FileBackend`] - A single file on disk
//!
//! ## Example
//!
//! ```rust
//! use nssync_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! assert!(backend.read_all().unwrap().is_none());
//! backend.write_all(b"[]").unwrap();
//! assert_eq!(backend.read_all().unwrap().as_deref(), Some(&b"[]"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
