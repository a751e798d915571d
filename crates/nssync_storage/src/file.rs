//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A file-based storage backend.
///
/// The blob lives in a single file. A missing file reads as "nothing
/// stored". Writes go to a sibling temporary file which is then renamed
/// over the target, so readers only ever see a complete previous or
/// complete new blob.
///
/// # Example
///
/// ```no_run
/// use nssync_storage::{StorageBackend, FileBackend};
///
/// let mut backend = FileBackend::new("active_overrides.json");
/// if backend.read_all().unwrap().is_none() {
///     backend.write_all(b"[]").unwrap();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Creates a backend for the file at `path`.
    ///
    /// Nothing is touched on disk until the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> StorageResult<PathBuf> {
        let name = self
            .path
            .file_name()
            .ok_or_else(|| StorageError::InvalidPath(self.path.clone()))?;
        let mut temp_name = name.to_os_string();
        temp_name.push(".tmp");
        Ok(self.path.with_file_name(temp_name))
    }
}

impl StorageBackend for FileBackend {
    fn read_all(&self) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.temp_path()?;
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn exists(&self) -> StorageResult<bool> {
        Ok(self.path.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_missing_reads_as_none() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("absent.json"));
        assert!(backend.read_all().unwrap().is_none());
        assert!(!backend.exists().unwrap());
    }

    #[test]
    fn file_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut backend = FileBackend::new(&path);
        backend.write_all(b"[1, 2, 3]").unwrap();

        assert!(backend.exists().unwrap());
        assert_eq!(backend.read_all().unwrap().unwrap(), b"[1, 2, 3]");
        assert_eq!(fs::read(&path).unwrap(), b"[1, 2, 3]");
    }

    #[test]
    fn file_write_overwrites_fully() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path().join("state.json"));

        backend.write_all(b"a much longer first value").unwrap();
        backend.write_all(b"[]").unwrap();

        assert_eq!(backend.read_all().unwrap().unwrap(), b"[]");
    }

    #[test]
    fn file_persistence_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        {
            let mut backend = FileBackend::new(&path);
            backend.write_all(b"persisted").unwrap();
        }

        let backend = FileBackend::new(&path);
        assert_eq!(backend.read_all().unwrap().unwrap(), b"persisted");
    }

    #[test]
    fn file_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("state.json");

        let mut backend = FileBackend::new(&path);
        backend.write_all(b"data").unwrap();

        assert!(path.exists());
    }

    #[test]
    fn file_leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path().join("state.json"));
        backend.write_all(b"data").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0], "state.json");
    }

    #[test]
    fn file_path_accessor() {
        let backend = FileBackend::new("some/where.json");
        assert_eq!(backend.path(), Path::new("some/where.json"));
    }
}
