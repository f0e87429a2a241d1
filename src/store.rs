//! Blob store abstraction.
//!
//! Source documents live in a keyed object store under two logical prefixes:
//! a pending prefix holding documents awaiting ingestion and an archived
//! prefix holding documents that have been fully embedded. Archiving rewrites
//! only the prefix portion of a key.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::StoreConfig;
use crate::store_fs::FsBlobStore;
use crate::store_s3::S3BlobStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },
    #[error("storage operation failed: {0}")]
    Storage(String),
}

/// A keyed binary object store.
///
/// Implementations must tolerate concurrent callers; each key maps to a
/// disjoint path, so per-key operations never contend with each other.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// List all object keys under a prefix, in stable lexicographic order.
    /// Directory placeholder entries (keys ending in `/`) are excluded.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Fetch an object's bytes. Fails with [`StoreError::NotFound`] when the
    /// key does not resolve to an object.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Whether an object exists at the key.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Copy an object to a new key, leaving the source in place.
    async fn copy(&self, source_key: &str, target_key: &str) -> Result<(), StoreError>;

    /// Delete an object. Returns `false` when the key was already absent.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// Rewrite the pending-prefix portion of a key to the archived prefix.
///
/// Keys outside the pending prefix are returned unchanged.
pub fn archived_key(key: &str, pending_prefix: &str, archived_prefix: &str) -> String {
    match key.strip_prefix(pending_prefix) {
        Some(rest) => format!("{}{}", archived_prefix, rest),
        None => key.to_string(),
    }
}

/// Instantiate the configured blob store backend.
pub fn create_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    match config.provider.as_str() {
        "s3" => Ok(Arc::new(S3BlobStore::new(config)?)),
        "filesystem" => {
            let root = config
                .root
                .clone()
                .ok_or_else(|| anyhow::anyhow!("store.root required for filesystem provider"))?;
            Ok(Arc::new(FsBlobStore::new(root)))
        }
        other => anyhow::bail!("Unknown store provider: {}", other),
    }
}
