//! Pluggable key-value store for persisted state.
//!
//! The quota tracker, cache disk tier, and error log all read and write
//! through this trait, so tests can swap in an in-memory store while
//! production uses JSON files on local disk.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from state store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid store key: {0:?}")]
    InvalidKey(String),
}

/// Trait for persisted state backends.
///
/// Keys are restricted to `[A-Za-z0-9._-]` so the file backend can use them
/// directly as file names; [`crate::cache::CacheKey`] produces conforming keys.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch a value, `None` if the key has never been written.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove a value. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// List all keys currently present.
    async fn list_keys(&self) -> StoreResult<Vec<String>>;
}

pub(crate) fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
