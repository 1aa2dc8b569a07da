//! Node types and dispatch
//!
//! A node is one unit of work in a flow graph: either a task (delegating
//! to a pluggable executor) or a decision (selecting a successor from the
//! user's chosen action). The node owns the translation from an executor's
//! response into the engine-visible [`NodeResponse`].

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::context::NodeContext;
use crate::executor::registry::SharedExecutor;
use crate::executor::{Executor, ExecutorConfig, ExecutorError, ExecutorResponse};
use crate::flow::{Action, InputDescriptor, NodeResponse, NodeResponseStatus, NodeResponseType};

/// Errors a node can return from dispatch
#[derive(Error, Debug)]
pub enum NodeError {
    /// Task node dispatched before an executor was attached
    #[error("no executor attached to task node {0}")]
    ExecutorNotAttached(String),

    /// The selected action names no successor of this decision node
    #[error("unknown action {action} for decision node {node_id}")]
    UnknownAction {
        /// Decision node id
        node_id: String,
        /// Offending action id
        action: String,
    },

    /// The node's executor failed
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// The kinds of node a graph may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    /// Delegates to an executor
    #[serde(rename = "TASK_EXECUTION")]
    TaskExecution,

    /// Selects one of several successors
    #[serde(rename = "DECISION")]
    Decision,
}

/// A unit of work in a flow graph
pub struct Node {
    id: String,
    node_type: NodeType,
    is_start: bool,
    is_final: bool,
    input_schema: Vec<InputDescriptor>,
    successors: Vec<String>,
    executor_config: Option<ExecutorConfig>,
    // Lazily resolved on first visit and published atomically; graphs are
    // shared across concurrent flows, so the slot must tolerate two flows
    // racing to attach (executors are stateless, either write is fine).
    executor: ArcSwapOption<Box<dyn Executor>>,
}

impl Node {
    pub(crate) fn new(
        id: String,
        node_type: NodeType,
        is_start: bool,
        is_final: bool,
        input_schema: Vec<InputDescriptor>,
        successors: Vec<String>,
        executor_config: Option<ExecutorConfig>,
    ) -> Self {
        Self {
            id,
            node_type,
            is_start,
            is_final,
            input_schema,
            successors,
            executor_config,
            executor: ArcSwapOption::empty(),
        }
    }

    /// Node identifier, unique within its graph
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The kind of node
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Whether this is the graph's start node
    pub fn is_start(&self) -> bool {
        self.is_start
    }

    /// Whether this node has no successors
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Immutable input-data schema declared on the node
    pub fn input_schema(&self) -> &[InputDescriptor] {
        &self.input_schema
    }

    /// Ordered successor ids
    pub fn successors(&self) -> &[String] {
        &self.successors
    }

    /// Executor reference declared on the node, task nodes only
    pub fn executor_config(&self) -> Option<&ExecutorConfig> {
        self.executor_config.as_ref()
    }

    /// The cached executor, if one has been resolved
    pub fn executor(&self) -> Option<SharedExecutor> {
        self.executor.load_full()
    }

    /// Publish a resolved executor onto this node
    pub fn attach_executor(&self, executor: SharedExecutor) {
        self.executor.store(Some(executor));
    }

    /// Run this node against the projected context
    pub async fn execute(&self, ctx: &NodeContext) -> Result<NodeResponse, NodeError> {
        match self.node_type {
            NodeType::Decision => self.decide(ctx),
            NodeType::TaskExecution => {
                let executor = self
                    .executor()
                    .ok_or_else(|| NodeError::ExecutorNotAttached(self.id.clone()))?;
                let response = executor.execute(ctx).await?;
                Ok(translate(response))
            }
        }
    }

    /// Decision dispatch: without a selected action, prompt with the
    /// successors as choices; with one, complete towards it.
    fn decide(&self, ctx: &NodeContext) -> Result<NodeResponse, NodeError> {
        match ctx.current_action_id.as_deref().filter(|a| !a.is_empty()) {
            None => Ok(NodeResponse {
                status: NodeResponseStatus::Incomplete,
                response_type: NodeResponseType::View,
                actions: self.successors.iter().map(|s| Action::new(s.as_str())).collect(),
                ..NodeResponse::default()
            }),
            Some(action) => {
                if !self.successors.iter().any(|s| s == action) {
                    return Err(NodeError::UnknownAction {
                        node_id: self.id.clone(),
                        action: action.to_string(),
                    });
                }
                Ok(NodeResponse {
                    status: NodeResponseStatus::Complete,
                    next_node_id: Some(action.to_string()),
                    ..NodeResponse::default()
                })
            }
        }
    }
}

/// Translate an executor's response into the engine-visible form
fn translate(response: ExecutorResponse) -> NodeResponse {
    NodeResponse {
        status: response.status,
        response_type: response.response_type,
        next_node_id: None,
        required_data: response.required_data,
        actions: response.actions,
        redirect_url: response.redirect_url,
        additional_data: response.additional_data,
        runtime_data: response.runtime_data,
        authenticated_user: response.authenticated_user,
        assertion: response.assertion,
        failure_reason: response.failure_reason,
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("is_start", &self.is_start)
            .field("is_final", &self.is_final)
            .field("successors", &self.successors)
            .finish()
    }
}
