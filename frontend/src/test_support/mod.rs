#[cfg(test)]
pub mod helpers {
    use crate::utils::storage::{KeyValueStorage, MemoryStorage, StorageError, StorageResult};
    use serde_json::{Map, Value};

    pub fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("payload fixture must be a JSON object, got {}", other),
        }
    }

    pub fn connected_status_body(config_id: &str, user_id: &str) -> Value {
        serde_json::json!({
            "success": true,
            "data": {
                "config_id": config_id,
                "user_id": user_id,
                "broker_name": "zerodha",
                "session_status": "connected",
                "needs_reauth": false,
                "token_status": {
                    "status": "valid",
                    "expiresAt": "2025-01-03T00:30:00Z",
                    "needsReauth": false,
                    "source": "oauth"
                }
            }
        })
    }

    /// Memory storage whose writes to one key always fail.
    pub struct FlakyStorage {
        inner: MemoryStorage,
        failing_key: String,
    }

    impl FlakyStorage {
        pub fn failing_writes_for(key: &str) -> Self {
            Self {
                inner: MemoryStorage::new(),
                failing_key: key.to_string(),
            }
        }

        pub fn inner(&self) -> &MemoryStorage {
            &self.inner
        }
    }

    impl KeyValueStorage for FlakyStorage {
        fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
            if key == self.failing_key {
                return Err(StorageError::Unavailable(format!("quota exceeded for {}", key)));
            }
            self.inner.set_item(key, value)
        }

        fn remove_item(&self, key: &str) -> StorageResult<()> {
            self.inner.remove_item(key)
        }
    }
}
