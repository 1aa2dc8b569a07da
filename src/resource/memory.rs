//! In-memory mutable resource store
//!
//! Stands in for the database-backed store in tests and single-node
//! deployments; everything it holds is tagged writable.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Resource, ResourceStore, ResourceStoreError};

/// DashMap-backed mutable resource store
pub struct MemoryResourceStore<T: Resource> {
    resources: DashMap<String, T>,
}

impl<T: Resource> MemoryResourceStore<T> {
    /// An empty store
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
        }
    }
}

impl<T: Resource> Default for MemoryResourceStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Resource> ResourceStore<T> for MemoryResourceStore<T> {
    async fn create(&self, mut resource: T) -> Result<T, ResourceStoreError> {
        if self.resources.contains_key(resource.id()) {
            return Err(ResourceStoreError::AlreadyExists(resource.id().to_string()));
        }
        resource.set_read_only(false);
        self.resources
            .insert(resource.id().to_string(), resource.clone());
        Ok(resource)
    }

    async fn update(&self, mut resource: T) -> Result<T, ResourceStoreError> {
        if !self.resources.contains_key(resource.id()) {
            return Err(ResourceStoreError::NotFound(resource.id().to_string()));
        }
        resource.set_read_only(false);
        self.resources
            .insert(resource.id().to_string(), resource.clone());
        Ok(resource)
    }

    async fn delete(&self, id: &str) -> Result<(), ResourceStoreError> {
        self.resources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ResourceStoreError::NotFound(id.to_string()))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<T>, ResourceStoreError> {
        Ok(self.resources.get(id).map(|entry| entry.value().clone()))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<T>, ResourceStoreError> {
        Ok(self
            .resources
            .iter()
            .find(|entry| entry.value().name() == name)
            .map(|entry| entry.value().clone()))
    }

    async fn get_by_client_id(&self, client_id: &str) -> Result<Option<T>, ResourceStoreError> {
        Ok(self
            .resources
            .iter()
            .find(|entry| entry.value().client_id() == Some(client_id))
            .map(|entry| entry.value().clone()))
    }

    async fn exists_by_id(&self, id: &str) -> Result<bool, ResourceStoreError> {
        Ok(self.resources.contains_key(id))
    }

    async fn exists_by_name(&self, name: &str) -> Result<bool, ResourceStoreError> {
        Ok(self.resources.iter().any(|entry| entry.value().name() == name))
    }

    async fn list(&self) -> Result<Vec<T>, ResourceStoreError> {
        Ok(self
            .resources
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn count(&self) -> Result<usize, ResourceStoreError> {
        Ok(self.resources.len())
    }
}
