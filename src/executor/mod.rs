//! Executor contract and registry
//!
//! An executor performs one concrete flow step: a credential check, an
//! identity-provider round-trip, a prompt. The engine treats executors
//! opaquely; a task node resolves its executor through the registry,
//! invokes [`Executor::execute`], and translates the response into the
//! engine-visible [`NodeResponse`](crate::flow::NodeResponse).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::context::NodeContext;
use crate::flow::{
    Action, AuthenticatedUser, InputDescriptor, NodeResponseStatus, NodeResponseType, USER_ID_KEY,
};

pub mod assertion;
pub mod attribute;
pub mod registry;

pub use assertion::JwtAssertExecutor;
pub use attribute::AttributeCollectExecutor;
pub use registry::{ExecutorFactory, ExecutorRegistry};

/// Errors raised while resolving or running executors
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// No factory registered under the requested name
    #[error("unknown executor: {0}")]
    UnknownExecutor(String),

    /// The executor config is missing or malformed for this executor kind
    #[error("invalid executor configuration for {name}: {reason}")]
    InvalidConfig {
        /// Executor name the config was for
        name: String,
        /// What was wrong with it
        reason: String,
    },

    /// Internal executor failure
    #[error("executor failure: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Reference from a task node to the executor that will run it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Registry name of the executor
    pub name: String,

    /// Free-form executor properties from the graph definition
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl ExecutorConfig {
    /// A config carrying only an executor name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
        }
    }

    /// Add a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// What an executor reports back to its node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorResponse {
    /// Outcome of the executor's work
    pub status: NodeResponseStatus,

    /// How an INCOMPLETE outcome should be surfaced
    #[serde(rename = "type", default)]
    pub response_type: NodeResponseType,

    /// Inputs the executor still needs
    #[serde(rename = "requiredData", default)]
    pub required_data: Vec<InputDescriptor>,

    /// Actions the user may pick
    #[serde(default)]
    pub actions: Vec<Action>,

    /// Redirection target
    #[serde(rename = "redirectUrl", skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,

    /// Extra data surfaced to the client
    #[serde(rename = "additionalData", default)]
    pub additional_data: HashMap<String, String>,

    /// Data merged into the flow's runtime data
    #[serde(rename = "runtimeData", default)]
    pub runtime_data: HashMap<String, String>,

    /// Identity established or enriched by this step
    #[serde(rename = "authenticatedUser", skip_serializing_if = "Option::is_none")]
    pub authenticated_user: Option<AuthenticatedUser>,

    /// Proof-of-success token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion: Option<String>,

    /// Reason for a FAILURE outcome
    #[serde(rename = "failureReason", skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ExecutorResponse {
    /// A COMPLETE response with no payload
    pub fn complete() -> Self {
        Self {
            status: NodeResponseStatus::Complete,
            ..Self::default()
        }
    }

    /// An INCOMPLETE / VIEW response prompting for the given inputs
    pub fn prompt(required_data: Vec<InputDescriptor>) -> Self {
        Self {
            status: NodeResponseStatus::Incomplete,
            response_type: NodeResponseType::View,
            required_data,
            ..Self::default()
        }
    }

    /// An INCOMPLETE / REDIRECTION response towards the given URL
    pub fn redirect(url: impl Into<String>) -> Self {
        Self {
            status: NodeResponseStatus::Incomplete,
            response_type: NodeResponseType::Redirection,
            redirect_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// A FAILURE response with the given reason
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            status: NodeResponseStatus::Failure,
            failure_reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// A pluggable flow step implementation
///
/// Executors are stateless: one instance may serve many concurrent flows,
/// and everything request-scoped arrives through the [`NodeContext`].
#[async_trait]
pub trait Executor: std::fmt::Debug + Send + Sync {
    /// Registry name of this executor
    fn name(&self) -> &str;

    /// Static executor properties from its configuration
    fn properties(&self) -> &HashMap<String, String>;

    /// Inputs this executor always needs, independent of the node schema
    fn default_inputs(&self) -> &[InputDescriptor] {
        &[]
    }

    /// Context keys that must be present before this executor can run
    fn prerequisites(&self) -> &[InputDescriptor] {
        &[]
    }

    /// Run one step of the flow
    async fn execute(&self, ctx: &NodeContext) -> Result<ExecutorResponse, ExecutorError>;

    /// The inputs this executor needs for the given node: the node's input
    /// schema, extended with default inputs not already named by it
    fn required_data(&self, ctx: &NodeContext) -> Vec<InputDescriptor> {
        let mut data = ctx.input_schema.clone();
        for input in self.default_inputs() {
            if !data.iter().any(|d| d.name == input.name) {
                data.push(input.clone());
            }
        }
        data
    }

    /// The required inputs the user has not supplied yet
    fn missing_inputs(&self, ctx: &NodeContext) -> Vec<InputDescriptor> {
        self.required_data(ctx)
            .into_iter()
            .filter(|d| d.required && !ctx.user_input_data.contains_key(&d.name))
            .collect()
    }

    /// Whether every prerequisite key is satisfied by inputs or runtime data
    fn prerequisites_met(&self, ctx: &NodeContext) -> bool {
        self.prerequisites().iter().all(|p| {
            ctx.user_input_data.contains_key(&p.name) || ctx.runtime_data.contains_key(&p.name)
        })
    }

    /// The user id this flow has established, if any
    fn user_id_from_context(&self, ctx: &NodeContext) -> Option<String> {
        if !ctx.authenticated_user.user_id.is_empty() {
            return Some(ctx.authenticated_user.user_id.clone());
        }
        ctx.runtime_data.get(USER_ID_KEY).cloned()
    }
}
