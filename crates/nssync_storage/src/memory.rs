//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// An in-memory storage backend.
///
/// Clones share the same underlying blob, so a test can hand one clone to
/// the code under test and inspect what was written through another.
///
/// # Example
///
/// ```rust
/// use nssync_storage::{StorageBackend, InMemoryBackend};
///
/// let probe = InMemoryBackend::new();
/// let mut backend = probe.clone();
/// backend.write_all(b"state").unwrap();
/// assert_eq!(probe.data().as_deref(), Some(&b"state"[..]));
/// assert_eq!(probe.write_count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Option<Vec<u8>>>>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing data.
    ///
    /// Useful for simulating state left behind by a previous run.
    #[must_use]
    pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::new(RwLock::new(Some(data.into()))),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns a copy of the stored blob, if any.
    #[must_use]
    pub fn data(&self) -> Option<Vec<u8>> {
        self.data.read().clone()
    }

    /// Returns how many times `write_all` has been called.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Forgets the stored blob.
    pub fn clear(&self) {
        *self.data.write() = None;
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_all(&self) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().clone())
    }

    fn write_all(&mut self, data: &[u8]) -> StorageResult<()> {
        *self.data.write() = Some(data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn exists(&self) -> StorageResult<bool> {
        Ok(self.data.read().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend.read_all().unwrap().is_none());
        assert!(!backend.exists().unwrap());
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn memory_write_then_read() {
        let mut backend = InMemoryBackend::new();
        backend.write_all(b"hello").unwrap();
        assert_eq!(backend.read_all().unwrap().unwrap(), b"hello");
        assert!(backend.exists().unwrap());
    }

    #[test]
    fn memory_write_overwrites() {
        let mut backend = InMemoryBackend::new();
        backend.write_all(b"a much longer first value").unwrap();
        backend.write_all(b"short").unwrap();
        assert_eq!(backend.read_all().unwrap().unwrap(), b"short");
        assert_eq!(backend.write_count(), 2);
    }

    #[test]
    fn memory_with_data() {
        let backend = InMemoryBackend::with_data(b"preloaded".to_vec());
        assert_eq!(backend.read_all().unwrap().unwrap(), b"preloaded");
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn memory_clones_share_state() {
        let probe = InMemoryBackend::new();
        let mut writer = probe.clone();
        writer.write_all(b"shared").unwrap();
        assert_eq!(probe.data().unwrap(), b"shared");

        probe.clear();
        assert!(writer.read_all().unwrap().is_none());
    }

    #[test]
    fn memory_empty_write_is_stored() {
        let mut backend = InMemoryBackend::new();
        backend.write_all(b"").unwrap();
        assert_eq!(backend.read_all().unwrap(), Some(Vec::new()));
    }
}
