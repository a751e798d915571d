//! Storage backend trait definition.

use crate::error::StorageResult;

/// A whole-blob storage backend.
///
/// Backends hold a single opaque value. Callers read it in full, decide what
/// it means, and write the complete replacement back. There are no partial
/// or appending writes.
///
/// # Invariants
///
/// - `read_all` returns `None` until the first successful `write_all`
/// - After `write_all(data)` returns, `read_all` returns exactly `data`
/// - Every `write_all` replaces the previous content entirely
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Reads the stored blob.
    ///
    /// Returns `Ok(None)` when nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the store exists but cannot be read.
    fn read_all(&self) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the stored blob with `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be made durable.
    fn write_all(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Returns true if a blob has been stored.
    ///
    /// # Errors
    ///
    /// Returns an error if existence cannot be determined.
    fn exists(&self) -> StorageResult<bool> {
        Ok(self.read_all()?.is_some())
    }
}
