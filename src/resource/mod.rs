//! Generic resource storage
//!
//! Resources (applications, user schemas) come from two sources: immutable
//! YAML files declared under the server home, and a mutable database-backed
//! store. Depending on configuration a resource kind runs in `mutable`,
//! `declarative`, or `composite` mode; composite mode merges both sources
//! into a single read-through view with strict precedence rules.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub mod composite;
pub mod file;
pub mod loader;
pub mod memory;
pub mod schema;

pub use composite::{CompositeResourceStore, MAX_COMPOSITE_STORE_RECORDS};
pub use file::FileResourceStore;
pub use loader::{load_declarative_resources, AcceptAll, ResourceLoadConfig, ResourceValidator};
pub use memory::MemoryResourceStore;
pub use schema::UserSchema;

/// Errors raised by resource stores and services
#[derive(Error, Debug)]
pub enum ResourceStoreError {
    /// A resource with this id already exists in some source
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    /// No resource with this id
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The resource is file-declared and cannot be mutated
    #[error("resource {0} is declarative and cannot be modified")]
    ImmutableResource(String),

    /// The merged composite listing exceeded the hard cap
    #[error("result limit exceeded in composite mode: {count} > {max}")]
    ResultLimitExceeded {
        /// Size of the merged result
        count: usize,
        /// Configured ceiling
        max: usize,
    },

    /// A mutating operation reached the immutable file store
    #[error("store is read-only")]
    ReadOnlyStore,

    /// Underlying database failure
    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),

    /// A failed transaction could not be rolled back
    #[error("failed to rollback transaction: {0}")]
    Rollback(#[source] sqlx::Error),

    /// Resource payload failed to serialize or deserialize
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// An entity managed by the resource layer
pub trait Resource: Clone + Send + Sync + 'static {
    /// Globally unique id across all sources
    fn id(&self) -> &str;

    /// Human-facing name
    fn name(&self) -> &str;

    /// Optional secondary lookup key (OAuth client id for applications)
    fn client_id(&self) -> Option<&str> {
        None
    }

    /// Whether this instance came from the immutable file source
    fn is_read_only(&self) -> bool;

    /// Tag the source this instance came from
    fn set_read_only(&mut self, read_only: bool);
}

/// Uniform storage interface shared by every backend and the composite view
#[async_trait]
pub trait ResourceStore<T: Resource>: Send + Sync {
    /// Create a resource
    async fn create(&self, resource: T) -> Result<T, ResourceStoreError>;

    /// Update an existing resource
    async fn update(&self, resource: T) -> Result<T, ResourceStoreError>;

    /// Delete a resource by id
    async fn delete(&self, id: &str) -> Result<(), ResourceStoreError>;

    /// Look up by id
    async fn get_by_id(&self, id: &str) -> Result<Option<T>, ResourceStoreError>;

    /// Look up by name
    async fn get_by_name(&self, name: &str) -> Result<Option<T>, ResourceStoreError>;

    /// Look up by secondary key
    async fn get_by_client_id(&self, client_id: &str) -> Result<Option<T>, ResourceStoreError>;

    /// Whether a resource with this id exists
    async fn exists_by_id(&self, id: &str) -> Result<bool, ResourceStoreError>;

    /// Whether a resource with this name exists
    async fn exists_by_name(&self, name: &str) -> Result<bool, ResourceStoreError>;

    /// All resources in this store
    async fn list(&self) -> Result<Vec<T>, ResourceStoreError>;

    /// Number of resources in this store
    async fn count(&self) -> Result<usize, ResourceStoreError>;
}

/// How a resource kind is stored at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreMode {
    /// Database only
    #[default]
    Mutable,

    /// File-declared only
    Declarative,

    /// Both, merged through the composite store
    Composite,
}

impl StoreMode {
    /// Parse a mode string, case- and whitespace-insensitively
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mutable" => Some(StoreMode::Mutable),
            "declarative" => Some(StoreMode::Declarative),
            "composite" => Some(StoreMode::Composite),
            _ => None,
        }
    }

    /// Resolve the effective mode: explicit per-resource config first, the
    /// global declarative-resources flag next, mutable as the default.
    /// Invalid explicit values fall through to the next level.
    pub fn resolve(explicit: Option<&str>, declarative_enabled: bool) -> Self {
        if let Some(mode) = explicit.and_then(Self::parse) {
            return mode;
        }
        if declarative_enabled {
            StoreMode::Declarative
        } else {
            StoreMode::Mutable
        }
    }
}

/// The store stack provisioned for one resource kind
pub enum ProvisionedStore<T: Resource> {
    /// Database only
    Mutable(Arc<dyn ResourceStore<T>>),

    /// File-declared only
    Declarative(Arc<FileResourceStore<T>>),

    /// Both sources behind the composite view
    Composite(Arc<CompositeResourceStore<T>>),
}

impl<T: Resource> ProvisionedStore<T> {
    /// Assemble the stack for the resolved mode
    pub fn provision(
        mode: StoreMode,
        file: Arc<FileResourceStore<T>>,
        db: Arc<dyn ResourceStore<T>>,
    ) -> Self {
        match mode {
            StoreMode::Mutable => ProvisionedStore::Mutable(db),
            StoreMode::Declarative => ProvisionedStore::Declarative(file),
            StoreMode::Composite => {
                ProvisionedStore::Composite(Arc::new(CompositeResourceStore::new(file, db)))
            }
        }
    }

    /// Whether the id belongs to a file-declared resource
    pub fn is_declarative(&self, id: &str) -> bool {
        match self {
            ProvisionedStore::Mutable(_) => false,
            ProvisionedStore::Declarative(file) => file.is_declarative(id),
            ProvisionedStore::Composite(composite) => composite.is_declarative(id),
        }
    }

    fn store(&self) -> &dyn ResourceStore<T> {
        match self {
            ProvisionedStore::Mutable(db) => db.as_ref(),
            ProvisionedStore::Declarative(file) => file.as_ref(),
            ProvisionedStore::Composite(composite) => composite.as_ref(),
        }
    }
}

/// Service-level operations over one resource kind
///
/// Enforces the rules the stores themselves do not: id-conflict checks on
/// create and declarative immutability on update and delete.
pub struct ResourceService<T: Resource> {
    store: ProvisionedStore<T>,
}

impl<T: Resource> ResourceService<T> {
    /// A service over the provisioned store stack
    pub fn new(store: ProvisionedStore<T>) -> Self {
        Self { store }
    }

    /// Whether the id belongs to a file-declared resource
    pub fn is_declarative(&self, id: &str) -> bool {
        self.store.is_declarative(id)
    }

    /// Look up by id
    pub async fn get_by_id(&self, id: &str) -> Result<Option<T>, ResourceStoreError> {
        self.store.store().get_by_id(id).await
    }

    /// Look up by name
    pub async fn get_by_name(&self, name: &str) -> Result<Option<T>, ResourceStoreError> {
        self.store.store().get_by_name(name).await
    }

    /// Look up by secondary key
    pub async fn get_by_client_id(&self, client_id: &str) -> Result<Option<T>, ResourceStoreError> {
        self.store.store().get_by_client_id(client_id).await
    }

    /// All resources across the provisioned sources
    pub async fn list(&self) -> Result<Vec<T>, ResourceStoreError> {
        self.store.store().list().await
    }

    /// Number of resources across the provisioned sources
    pub async fn count(&self) -> Result<usize, ResourceStoreError> {
        self.store.store().count().await
    }

    /// Create a resource after verifying the id is free in every source
    pub async fn create(&self, resource: T) -> Result<T, ResourceStoreError> {
        if self.store.store().exists_by_id(resource.id()).await? {
            return Err(ResourceStoreError::AlreadyExists(resource.id().to_string()));
        }
        self.store.store().create(resource).await
    }

    /// Update a resource; file-declared resources are immutable
    pub async fn update(&self, resource: T) -> Result<T, ResourceStoreError> {
        if self.store.is_declarative(resource.id()) {
            return Err(ResourceStoreError::ImmutableResource(
                resource.id().to_string(),
            ));
        }
        self.store.store().update(resource).await
    }

    /// Delete a resource; file-declared resources are immutable
    pub async fn delete(&self, id: &str) -> Result<(), ResourceStoreError> {
        if self.store.is_declarative(id) {
            return Err(ResourceStoreError::ImmutableResource(id.to_string()));
        }
        self.store.store().delete(id).await
    }
}
