//! Key-value storage backends for the persisted broker session.
//!
//! The session layer only ever talks to [`KeyValueStorage`]; which backend sits
//! behind it is decided by the host (browser localStorage, a JSON file on
//! disk, or plain memory in tests).

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage contents are corrupt: {0}")]
    Corrupt(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// String-keyed, string-valued storage, shaped after `window.localStorage`.
pub trait KeyValueStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removing a missing key is not an error.
    fn remove_item(&self, key: &str) -> StorageResult<()>;
}

impl<T: KeyValueStorage + ?Sized> KeyValueStorage for &T {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        (**self).remove_item(key)
    }
}

/// In-process storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let items = self
            .items
            .read()
            .map_err(|_| StorageError::Unavailable("memory storage lock poisoned".into()))?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| StorageError::Unavailable("memory storage lock poisoned".into()))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| StorageError::Unavailable("memory storage lock poisoned".into()))?;
        items.remove(key);
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStorage;

#[cfg(not(target_arch = "wasm32"))]
mod file {
    use std::collections::BTreeMap;
    use std::fs;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use super::{KeyValueStorage, StorageError, StorageResult};

    /// Storage backed by a single JSON object file (`{"key": "value", ...}`).
    ///
    /// Every write rewrites the whole file through a sibling temp file so a
    /// crash mid-write never leaves a half-written document behind.
    #[derive(Debug)]
    pub struct FileStorage {
        path: PathBuf,
        guard: Mutex<()>,
    }

    impl FileStorage {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self {
                path: path.into(),
                guard: Mutex::new(()),
            }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn read_all(&self) -> StorageResult<BTreeMap<String, String>> {
            let raw = match fs::read_to_string(&self.path) {
                Ok(raw) => raw,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
                Err(err) => return Err(err.into()),
            };
            if raw.trim().is_empty() {
                return Ok(BTreeMap::new());
            }
            serde_json::from_str(&raw)
                .map_err(|e| StorageError::Corrupt(format!("{}: {}", self.path.display(), e)))
        }

        fn write_all(&self, items: &BTreeMap<String, String>) -> StorageResult<()> {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let body = serde_json::to_string_pretty(items)
                .map_err(|e| StorageError::Corrupt(e.to_string()))?;
            let tmp = self.path.with_extension("tmp");
            fs::write(&tmp, body)?;
            fs::rename(&tmp, &self.path)?;
            Ok(())
        }

        fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, ()>> {
            self.guard
                .lock()
                .map_err(|_| StorageError::Unavailable("file storage lock poisoned".into()))
        }
    }

    impl KeyValueStorage for FileStorage {
        fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
            let _guard = self.lock()?;
            Ok(self.read_all()?.remove(key))
        }

        fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
            let _guard = self.lock()?;
            let mut items = self.read_all()?;
            items.insert(key.to_string(), value.to_string());
            self.write_all(&items)
        }

        fn remove_item(&self, key: &str) -> StorageResult<()> {
            let _guard = self.lock()?;
            let mut items = self.read_all()?;
            if items.remove(key).is_some() {
                self.write_all(&items)?;
            }
            Ok(())
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::{local_storage, window, LocalStorage};

#[cfg(target_arch = "wasm32")]
mod browser {
    use web_sys::{Storage, Window};

    use super::{KeyValueStorage, StorageError, StorageResult};

    pub fn window() -> Result<Window, String> {
        web_sys::window().ok_or_else(|| "No window object".to_string())
    }

    pub fn local_storage() -> Result<Storage, String> {
        window()?
            .local_storage()
            .map_err(|_| "No localStorage".to_string())?
            .ok_or_else(|| "No localStorage".to_string())
    }

    /// `window.localStorage`, looked up on every call.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct LocalStorage;

    fn storage() -> StorageResult<Storage> {
        local_storage().map_err(StorageError::Unavailable)
    }

    impl KeyValueStorage for LocalStorage {
        fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
            storage()?
                .get_item(key)
                .map_err(|_| StorageError::Unavailable(format!("Failed to read {}", key)))
        }

        fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
            storage()?
                .set_item(key, value)
                .map_err(|_| StorageError::Unavailable(format!("Failed to store {}", key)))
        }

        fn remove_item(&self, key: &str) -> StorageResult<()> {
            storage()?
                .remove_item(key)
                .map_err(|_| StorageError::Unavailable(format!("Failed to remove {}", key)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_set_get_remove() {
        let storage = MemoryStorage::new();
        assert!(storage.get_item("k").unwrap().is_none());

        storage.set_item("k", "v1").unwrap();
        storage.set_item("k", "v2").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v2"));
        assert_eq!(storage.len(), 1);

        storage.remove_item("k").unwrap();
        storage.remove_item("k").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn borrowed_storage_delegates() {
        let storage = MemoryStorage::new();
        let borrowed = &storage;
        borrowed.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v"));
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod host_tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_storage_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let first = FileStorage::new(&path);
        first.set_item("broker_session", "{\"config_id\":\"abc\"}").unwrap();
        first.set_item("other", "x").unwrap();

        let second = FileStorage::new(&path);
        assert_eq!(
            second.get_item("broker_session").unwrap().as_deref(),
            Some("{\"config_id\":\"abc\"}")
        );

        second.remove_item("broker_session").unwrap();
        assert!(first.get_item("broker_session").unwrap().is_none());
        assert_eq!(first.get_item("other").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn file_storage_missing_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("absent.json"));
        assert!(storage.get_item("anything").unwrap().is_none());
        storage.remove_item("anything").unwrap();
        assert!(!storage.path().exists());
    }

    #[test]
    fn file_storage_reports_corrupt_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let storage = FileStorage::new(&path);
        assert!(matches!(
            storage.get_item("k"),
            Err(StorageError::Corrupt(_))
        ));
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod browser_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn local_storage_round_trips_items() {
        let storage = LocalStorage;
        storage.set_item("ql_test_key", "value").unwrap();
        assert_eq!(
            storage.get_item("ql_test_key").unwrap().as_deref(),
            Some("value")
        );
        storage.remove_item("ql_test_key").unwrap();
        assert!(storage.get_item("ql_test_key").unwrap().is_none());
    }
}
