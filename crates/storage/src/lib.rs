pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryKeyValueStore;
pub use sqlite::SqliteStorage;

/// Persistent string items keyed by name.
///
/// Auth clients keep the current session and the pending PKCE verifier here,
/// the same way a browser client would use local storage.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove_item(&self, key: &str) -> StorageResult<()>;
}

pub(crate) fn validate_key(key: &str, stage: &'static str) -> StorageResult<()> {
    snafu::ensure!(
        !key.trim().is_empty(),
        error::InvalidKeySnafu {
            stage,
            key: key.to_string(),
            details: "key must not be blank",
        }
    );
    Ok(())
}
