//! Byte-addressed object storage.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

/// Shared blob data type (reference-counted bytes).
pub type SharedBlob = Arc<Vec<u8>>;

#[derive(Error, Debug, Clone)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob store unavailable: {0}")]
    Unavailable(String),

    #[error("blob operation failed for '{key}': {message}")]
    Failed { key: String, message: String },
}

/// Key prefixes the service is allowed to delete under. Immutable source and
/// export namespaces are excluded so cleanup can never purge an original.
const DELETABLE_PREFIXES: [&str; 2] = ["documents/final/", "documents/print/"];

/// Whether a blob key falls inside the deletable namespaces.
pub fn key_is_deletable(key: &str) -> bool {
    DELETABLE_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Byte-addressed object storage with short-TTL signed URL support.
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<SharedBlob, BlobError>;

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError>;

    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    async fn exists(&self, key: &str) -> bool;

    /// Produces a short-lived, pre-authorized fetch URL for a key.
    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, BlobError>;
}

/// An in-memory blob store for tests and local wiring.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, SharedBlob>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs; 0 if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().map(|b| b.is_empty()).unwrap_or(true)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, key: &str) -> Result<SharedBlob, BlobError> {
        let blobs = self.blobs.read().map_err(|_| BlobError::Failed {
            key: key.to_string(),
            message: "blob store lock poisoned".to_string(),
        })?;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
        let mut blobs = self.blobs.write().map_err(|_| BlobError::Failed {
            key: key.to_string(),
            message: "blob store lock poisoned".to_string(),
        })?;
        blobs.insert(key.to_string(), Arc::new(bytes));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let mut blobs = self.blobs.write().map_err(|_| BlobError::Failed {
            key: key.to_string(),
            message: "blob store lock poisoned".to_string(),
        })?;
        blobs.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> bool {
        self.blobs
            .read()
            .map(|b| b.contains_key(key))
            .unwrap_or(false)
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, BlobError> {
        if !self.exists(key).await {
            return Err(BlobError::NotFound(key.to_string()));
        }
        Ok(format!("memory://{}?ttl={}", key, ttl.as_secs()))
    }
}
