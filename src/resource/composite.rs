//! Composite resource store
//!
//! One read/write interface over an immutable file store and a mutable
//! database store. Reads fall back from the database to the files;
//! existence checks consult the files first so mutable operations can
//! never shadow an immutable id; listings merge both sources with
//! database precedence and a hard result ceiling.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::{FileResourceStore, Resource, ResourceStore, ResourceStoreError};

/// Hard ceiling on the merged size of a composite listing
pub const MAX_COMPOSITE_STORE_RECORDS: usize = 1000;

/// Read-through view merging the file and database stores
pub struct CompositeResourceStore<T: Resource> {
    file: Arc<FileResourceStore<T>>,
    db: Arc<dyn ResourceStore<T>>,
    max_records: usize,
}

impl<T: Resource> CompositeResourceStore<T> {
    /// A composite view with the default result ceiling
    pub fn new(file: Arc<FileResourceStore<T>>, db: Arc<dyn ResourceStore<T>>) -> Self {
        Self {
            file,
            db,
            max_records: MAX_COMPOSITE_STORE_RECORDS,
        }
    }

    /// Override the result ceiling
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    /// Whether the id names a file-declared resource
    pub fn is_declarative(&self, id: &str) -> bool {
        self.file.is_declarative(id)
    }
}

#[async_trait]
impl<T: Resource> ResourceStore<T> for CompositeResourceStore<T> {
    /// Routes to the database store; the service layer verifies the id is
    /// free in the file store first
    async fn create(&self, resource: T) -> Result<T, ResourceStoreError> {
        self.db.create(resource).await
    }

    /// Routes to the database store; declarative immutability is enforced
    /// by the service layer consulting [`Self::is_declarative`]
    async fn update(&self, resource: T) -> Result<T, ResourceStoreError> {
        self.db.update(resource).await
    }

    /// Routes to the database store, same as update
    async fn delete(&self, id: &str) -> Result<(), ResourceStoreError> {
        self.db.delete(id).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<T>, ResourceStoreError> {
        if let Some(resource) = self.db.get_by_id(id).await? {
            return Ok(Some(resource));
        }
        self.file.get_by_id(id).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<T>, ResourceStoreError> {
        if let Some(resource) = self.db.get_by_name(name).await? {
            return Ok(Some(resource));
        }
        self.file.get_by_name(name).await
    }

    async fn get_by_client_id(&self, client_id: &str) -> Result<Option<T>, ResourceStoreError> {
        if let Some(resource) = self.db.get_by_client_id(client_id).await? {
            return Ok(Some(resource));
        }
        self.file.get_by_client_id(client_id).await
    }

    /// File first: a mutable create must never shadow an immutable id
    async fn exists_by_id(&self, id: &str) -> Result<bool, ResourceStoreError> {
        if self.file.exists_by_id(id).await? {
            return Ok(true);
        }
        self.db.exists_by_id(id).await
    }

    async fn exists_by_name(&self, name: &str) -> Result<bool, ResourceStoreError> {
        if self.file.exists_by_name(name).await? {
            return Ok(true);
        }
        self.db.exists_by_name(name).await
    }

    async fn list(&self) -> Result<Vec<T>, ResourceStoreError> {
        let mut merged = Vec::new();
        let mut seen = HashSet::new();

        for mut resource in self.db.list().await? {
            resource.set_read_only(false);
            seen.insert(resource.id().to_string());
            merged.push(resource);
        }

        // Id collisions are forbidden by load-time validation but are
        // tolerated here; the database entry wins.
        for mut resource in self.file.list().await? {
            if seen.contains(resource.id()) {
                continue;
            }
            resource.set_read_only(true);
            merged.push(resource);
        }

        if merged.len() > self.max_records {
            return Err(ResourceStoreError::ResultLimitExceeded {
                count: merged.len(),
                max: self.max_records,
            });
        }
        Ok(merged)
    }

    async fn count(&self) -> Result<usize, ResourceStoreError> {
        Ok(self.file.count().await? + self.db.count().await?)
    }
}
