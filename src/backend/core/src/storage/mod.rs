//! Binary object storage collaborator.
//!
//! The engine never reads image bytes; it only threads [`StorageRef`]s
//! through product rows and asks the backend to resolve or delete them.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Opaque handle returned by [`ObjectStorage::put`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageRef(pub String);

impl StorageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object storage backend.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store a blob and return its reference.
    async fn put(&self, content_type: &str, bytes: Vec<u8>) -> Result<StorageRef>;

    /// Public URL for a reference, or `None` if it no longer exists.
    async fn get_url(&self, reference: &StorageRef) -> Result<Option<String>>;

    /// Delete a blob. Deleting a missing blob is not an error.
    async fn delete(&self, reference: &StorageRef) -> Result<()>;

    /// Get the backend name.
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone)]
struct StoredObject {
    content_type: String,
    bytes: Arc<Vec<u8>>,
}

/// Process-local object storage used by tests and the single-node server.
#[derive(Debug, Clone)]
pub struct InMemoryObjectStorage {
    base_url: String,
    objects: Arc<DashMap<StorageRef, StoredObject>>,
}

impl InMemoryObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, reference: &StorageRef) -> bool {
        self.objects.contains_key(reference)
    }

    /// Content type and size of a stored blob.
    pub fn describe(&self, reference: &StorageRef) -> Option<(String, usize)> {
        self.objects
            .get(reference)
            .map(|o| (o.content_type.clone(), o.bytes.len()))
    }
}

impl Default for InMemoryObjectStorage {
    fn default() -> Self {
        Self::new("memory://objects")
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn put(&self, content_type: &str, bytes: Vec<u8>) -> Result<StorageRef> {
        let reference = StorageRef::new(uuid::Uuid::new_v4().to_string());
        self.objects.insert(
            reference.clone(),
            StoredObject {
                content_type: content_type.to_string(),
                bytes: Arc::new(bytes),
            },
        );
        Ok(reference)
    }

    async fn get_url(&self, reference: &StorageRef) -> Result<Option<String>> {
        Ok(self
            .objects
            .contains_key(reference)
            .then(|| format!("{}/{}", self.base_url, reference)))
    }

    async fn delete(&self, reference: &StorageRef) -> Result<()> {
        self.objects.remove(reference);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
