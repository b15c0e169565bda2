//! Room snapshot persistence.
//!
//! Snapshots are the store's binary export, one file per room under a base
//! directory. Loaded at startup when present, written on the autosave
//! interval and at shutdown.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct SnapshotStore {
    base_path: PathBuf,
}

impl SnapshotStore {
    /// Open a snapshot directory, creating it if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path)?;
        }
        Ok(Self { base_path })
    }

    /// File path for a room, with the room name sanitized for filenames.
    fn room_path(&self, room: &str) -> PathBuf {
        let safe: String = room
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.base_path.join(format!("{safe}.snapshot"))
    }

    /// Read a room's snapshot bytes, `None` if it has never been saved.
    pub fn load(&self, room: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
        let path = self.room_path(room);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(&path)?))
    }

    pub fn save(&self, room: &str, bytes: &[u8]) -> Result<(), SnapshotError> {
        let path = self.room_path(room);
        fs::write(&path, bytes)?;
        tracing::debug!("Saved {} byte snapshot for room {} to {}", bytes.len(), room, path.display());
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();

        store.save("main", &[1, 2, 3, 4]).unwrap();
        assert_eq!(store.load("main").unwrap(), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_missing_room_is_none() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();
        assert_eq!(store.load("never-saved").unwrap(), None);
    }

    #[test]
    fn test_room_name_is_sanitized() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();

        store.save("../evil/room", &[9]).unwrap();
        assert_eq!(store.load("../evil/room").unwrap(), Some(vec![9]));

        // the file landed inside the base directory, under a safe name
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name();
        let name = name.to_string_lossy();
        assert!(!name.contains('/'));
        assert!(name.ends_with(".snapshot"));
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();

        store.save("main", &[1]).unwrap();
        store.save("main", &[2, 3]).unwrap();
        assert_eq!(store.load("main").unwrap(), Some(vec![2, 3]));
    }
}
