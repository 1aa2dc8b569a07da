//! # Thunder
//!
//! An identity and access management core built around a declarative
//! authentication flow engine.
//!
//! ## Overview
//!
//! Thunder drives a user through an arbitrary, declaratively authored
//! sequence of authentication or registration steps. Flows are directed
//! graphs of nodes; the engine interprets a graph one node at a time,
//! suspending whenever a node needs user input or an external redirection
//! and resuming when the client posts the next request. Minimal per-flow
//! state is persisted between turns so the server itself stays stateless.
//!
//! ## Key pieces
//!
//! - **Flow engine**: graph interpretation, node dispatch, response
//!   post-processing ([`engine`])
//! - **Flow execution service**: session lifecycle, context persistence,
//!   application and graph resolution ([`engine::service`])
//! - **Flow context store**: transactional persistence of resumable flow
//!   state ([`store`])
//! - **Composite resource store**: one read-through view over immutable
//!   file-declared and mutable database-backed resources ([`resource`])
//! - **Executor registry**: pluggable task executors resolved by name
//!   ([`executor`])

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for Thunder operations
pub type Result<T> = std::result::Result<T, ThunderError>;

/// Main error type aggregating every module's failure domain
#[derive(Error, Debug)]
pub enum ThunderError {
    /// Flow model error (invalid flow type, unsupported status string, etc.)
    #[error("flow model error: {0}")]
    Flow(#[from] flow::FlowError),

    /// Graph structure error
    #[error("graph error: {0}")]
    Graph(#[from] graph::GraphError),

    /// Engine execution error
    #[error("engine error: {0}")]
    Engine(#[from] engine::EngineError),

    /// Flow execution service error
    #[error("flow service error: {0}")]
    Service(#[from] engine::service::FlowServiceError),

    /// Executor resolution or execution error
    #[error("executor error: {0}")]
    Executor(#[from] executor::ExecutorError),

    /// Flow context persistence error
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    /// Resource store error
    #[error("resource store error: {0}")]
    Resource(#[from] resource::ResourceStoreError),

    /// Declarative resource loading error
    #[error("loader error: {0}")]
    Loader(#[from] resource::loader::LoaderError),

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Core flow model types shared across the engine and service layers
pub mod flow;

/// Flow graph structures: nodes, builder, registry
pub mod graph;

/// Flow engine and flow execution service
pub mod engine;

/// Executor contract, registry, and built-in executors
pub mod executor;

/// Flow context persistence
pub mod store;

/// Generic resource storage: file, composite, declarative loading
pub mod resource;

/// Application resource and service
pub mod application;

/// Server configuration
pub mod config;
