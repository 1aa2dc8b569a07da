//! Name-to-factory executor registry
//!
//! Graphs reference executors by name only; the registry turns that name
//! plus the node's executor config into a live executor instance. The
//! registry is populated at boot and read-only afterwards.

use std::sync::Arc;

use dashmap::DashMap;

use super::{Executor, ExecutorConfig, ExecutorError};
use crate::config::AssertionConfig;

/// Shared handle to a resolved executor
///
/// Boxed behind the `Arc` so the handle stays a sized pointee for the
/// atomic cache slot on task nodes.
pub type SharedExecutor = Arc<Box<dyn Executor>>;

/// Builds an executor from its node-level configuration
pub type ExecutorFactory =
    Box<dyn Fn(&ExecutorConfig) -> Result<Box<dyn Executor>, ExecutorError> + Send + Sync>;

/// Registry mapping executor names to factories
#[derive(Default)]
pub struct ExecutorRegistry {
    factories: DashMap<String, ExecutorFactory>,
}

impl ExecutorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// A registry pre-loaded with the built-in executors
    pub fn with_defaults(assertion: AssertionConfig) -> Self {
        let registry = Self::new();
        registry.register(super::attribute::NAME, |config| {
            Ok(Box::new(super::AttributeCollectExecutor::from_config(
                config,
            )))
        });
        registry.register(super::assertion::NAME, move |config| {
            Ok(Box::new(super::JwtAssertExecutor::new(
                config.clone(),
                assertion.clone(),
            )))
        });
        registry
    }

    /// Register a factory under a name, replacing any previous registration
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ExecutorConfig) -> Result<Box<dyn Executor>, ExecutorError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Whether a factory is registered under the name
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Resolve a config into a live executor
    pub fn resolve(&self, config: &ExecutorConfig) -> Result<SharedExecutor, ExecutorError> {
        let factory = self
            .factories
            .get(&config.name)
            .ok_or_else(|| ExecutorError::UnknownExecutor(config.name.clone()))?;
        Ok(Arc::new((factory.value())(config)?))
    }
}
