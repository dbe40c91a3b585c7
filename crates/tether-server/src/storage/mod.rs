//! Durable storage for the MDM server
//!
//! This module provides a trait-based abstraction over the shared key/value
//! store every subsystem receives at construction: device records, push
//! tokens, queued commands, and the enrollment CA material all live here.
//!
//! The store is organized as named buckets of binary values. It is opened
//! once during bootstrap and shared by reference across the subsystems; no
//! subsystem may replace or close it.

pub mod file;

pub use file::FileStore;

use std::fmt::Debug;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to open store: {0}")]
    Open(String),

    #[error("store file is corrupt: {0}")]
    Corrupt(String),

    #[error("failed to persist store: {0}")]
    Persist(String),
}

/// Storage backend trait shared across subsystems.
///
/// Implementations must be thread-safe and support concurrent access.
pub trait Store: Send + Sync + Debug + 'static {
    /// Fetch a value, `None` when absent
    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Insert or overwrite a value
    fn put(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove a value; returns whether it existed
    fn delete(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;

    /// List the keys of a bucket (empty when the bucket does not exist)
    fn list(&self, bucket: &str) -> Result<Vec<String>, StorageError>;
}
