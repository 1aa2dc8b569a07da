//! Immutable file-declared resource store
//!
//! Populated once by the declarative loader at boot, read-mostly
//! afterwards. Every resource it holds is tagged read-only; mutating
//! operations through the store interface are rejected.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Resource, ResourceStore, ResourceStoreError};

/// In-memory registry of file-declared resources
pub struct FileResourceStore<T: Resource> {
    resources: RwLock<HashMap<String, T>>,
}

impl<T: Resource> FileResourceStore<T> {
    /// An empty store
    pub fn new() -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
        }
    }

    /// Register a loaded resource, tagging it read-only
    pub fn register(&self, mut resource: T) -> Result<(), ResourceStoreError> {
        resource.set_read_only(true);
        let mut resources = self.resources.write();
        if resources.contains_key(resource.id()) {
            return Err(ResourceStoreError::AlreadyExists(resource.id().to_string()));
        }
        resources.insert(resource.id().to_string(), resource);
        Ok(())
    }

    /// Whether the id names a file-declared resource
    pub fn is_declarative(&self, id: &str) -> bool {
        self.resources.read().contains_key(id)
    }
}

impl<T: Resource> Default for FileResourceStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Resource> ResourceStore<T> for FileResourceStore<T> {
    async fn create(&self, _resource: T) -> Result<T, ResourceStoreError> {
        Err(ResourceStoreError::ReadOnlyStore)
    }

    async fn update(&self, _resource: T) -> Result<T, ResourceStoreError> {
        Err(ResourceStoreError::ReadOnlyStore)
    }

    async fn delete(&self, _id: &str) -> Result<(), ResourceStoreError> {
        Err(ResourceStoreError::ReadOnlyStore)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<T>, ResourceStoreError> {
        Ok(self.resources.read().get(id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<T>, ResourceStoreError> {
        Ok(self
            .resources
            .read()
            .values()
            .find(|r| r.name() == name)
            .cloned())
    }

    async fn get_by_client_id(&self, client_id: &str) -> Result<Option<T>, ResourceStoreError> {
        Ok(self
            .resources
            .read()
            .values()
            .find(|r| r.client_id() == Some(client_id))
            .cloned())
    }

    async fn exists_by_id(&self, id: &str) -> Result<bool, ResourceStoreError> {
        Ok(self.resources.read().contains_key(id))
    }

    async fn exists_by_name(&self, name: &str) -> Result<bool, ResourceStoreError> {
        Ok(self.resources.read().values().any(|r| r.name() == name))
    }

    async fn list(&self) -> Result<Vec<T>, ResourceStoreError> {
        Ok(self.resources.read().values().cloned().collect())
    }

    async fn count(&self) -> Result<usize, ResourceStoreError> {
        Ok(self.resources.read().len())
    }
}
