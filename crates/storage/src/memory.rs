use std::collections::HashMap;
use std::sync::Mutex;

use super::error::{InvariantViolationSnafu, StorageResult};
use super::{KeyValueStore, validate_key};

/// Process-local store used when sessions should not outlive the app.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_items<T>(
        &self,
        stage: &'static str,
        op: impl FnOnce(&mut HashMap<String, String>) -> T,
    ) -> StorageResult<T> {
        match self.items.lock() {
            Ok(mut items) => Ok(op(&mut items)),
            Err(_) => InvariantViolationSnafu {
                stage,
                details: "memory store lock was poisoned".to_string(),
            }
            .fail(),
        }
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        validate_key(key, "memory-get-item")?;
        self.with_items("memory-get-item", |items| items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        validate_key(key, "memory-set-item")?;
        self.with_items("memory-set-item", |items| {
            items.insert(key.to_string(), value.to_string());
        })
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        validate_key(key, "memory-remove-item")?;
        self.with_items("memory-remove-item", |items| {
            items.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;

    #[test]
    fn overwrites_and_removes_items() {
        let store = MemoryKeyValueStore::new();
        store.set_item("sb-auth-token", "first").unwrap();
        store.set_item("sb-auth-token", "second").unwrap();
        assert_eq!(
            store.get_item("sb-auth-token").unwrap().as_deref(),
            Some("second")
        );

        store.remove_item("sb-auth-token").unwrap();
        assert_eq!(store.get_item("sb-auth-token").unwrap(), None);
        // Removing a missing key is not an error.
        store.remove_item("sb-auth-token").unwrap();
    }

    #[test]
    fn rejects_blank_keys() {
        let store = MemoryKeyValueStore::new();
        let error = store.set_item("  ", "value").unwrap_err();
        assert!(matches!(error, StorageError::InvalidKey { .. }));
    }
}
