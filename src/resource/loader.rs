//! Declarative resource loader
//!
//! Walks a resource kind's directory under the server home, parses each
//! YAML file, runs the service validator, confirms the id collides with
//! nothing already loaded or stored, and registers the result into the
//! file store. Any failure is fatal: declarative resources are
//! configuration, and a partially loaded set would expose ambiguous
//! state, so the server must refuse to start.

use std::path::PathBuf;

use async_trait::async_trait;
use glob::glob;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::info;

use super::{FileResourceStore, Resource, ResourceStore, ResourceStoreError};

/// Errors raised while loading declarative resources
#[derive(Error, Debug)]
pub enum LoaderError {
    /// The directory produced an invalid glob pattern
    #[error("invalid resource directory pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// A matched path could not be enumerated
    #[error("failed to enumerate resource files: {0}")]
    Glob(#[from] glob::GlobError),

    /// A resource file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Offending file
        path: PathBuf,
        /// Underlying IO failure
        source: std::io::Error,
    },

    /// A resource file is not valid YAML for the resource DTO
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Offending file
        path: PathBuf,
        /// Underlying parse failure
        source: serde_yaml::Error,
    },

    /// The service validator rejected a resource
    #[error("invalid resource: {0}")]
    Invalid(String),

    /// A resource id collides with an already-registered resource
    #[error("duplicate resource id: {0}")]
    DuplicateId(String),

    /// Registering into a store failed
    #[error(transparent)]
    Store(#[from] ResourceStoreError),
}

/// Where and what to load for one resource kind
pub struct ResourceLoadConfig {
    /// Resource kind name, used for logging
    pub resource_type: String,

    /// Directory holding one YAML file per resource
    pub directory: PathBuf,
}

impl ResourceLoadConfig {
    /// Config for a resource kind rooted at the given directory
    pub fn new(resource_type: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            resource_type: resource_type.into(),
            directory: directory.into(),
        }
    }
}

/// Service hook validating (and possibly enriching) a parsed resource
#[async_trait]
pub trait ResourceValidator<T: Resource>: Send + Sync {
    /// Validate the parsed DTO, returning the form to register
    async fn validate(&self, resource: T) -> Result<T, LoaderError>;
}

/// Validator accepting every resource unchanged
pub struct AcceptAll;

#[async_trait]
impl<T: Resource> ResourceValidator<T> for AcceptAll {
    async fn validate(&self, resource: T) -> Result<T, LoaderError> {
        Ok(resource)
    }
}

/// Load every declared resource of one kind into the file store
///
/// `db_store` is consulted for id collisions when the resource kind runs
/// in composite mode. Returns the number of resources registered.
pub async fn load_declarative_resources<T>(
    config: &ResourceLoadConfig,
    validator: &dyn ResourceValidator<T>,
    file_store: &FileResourceStore<T>,
    db_store: Option<&dyn ResourceStore<T>>,
) -> Result<usize, LoaderError>
where
    T: Resource + DeserializeOwned,
{
    let mut loaded = 0;

    for pattern in ["*.yaml", "*.yml"] {
        let full_pattern = config.directory.join(pattern);
        for entry in glob(&full_pattern.to_string_lossy())? {
            let path = entry?;
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| LoaderError::Io {
                    path: path.clone(),
                    source,
                })?;
            let dto: T = serde_yaml::from_str(&text).map_err(|source| LoaderError::Parse {
                path: path.clone(),
                source,
            })?;

            let resource = validator.validate(dto).await?;

            if file_store.exists_by_id(resource.id()).await? {
                return Err(LoaderError::DuplicateId(resource.id().to_string()));
            }
            if let Some(db) = db_store {
                if db.exists_by_id(resource.id()).await? {
                    return Err(LoaderError::DuplicateId(resource.id().to_string()));
                }
            }

            info!(
                resource_type = %config.resource_type,
                id = %resource.id(),
                path = %path.display(),
                "registering declarative resource"
            );
            file_store.register(resource)?;
            loaded += 1;
        }
    }

    Ok(loaded)
}
