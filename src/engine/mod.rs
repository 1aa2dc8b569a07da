//! Flow engine
//!
//! The engine interprets a flow graph one node at a time: it resolves the
//! node's executor, projects a per-node context, dispatches, folds the
//! response back into the flow state, and either advances, suspends
//! (returning an INCOMPLETE step for the client to act on), completes, or
//! fails. The engine owns no state; everything lives in the passed
//! [`EngineContext`].

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::executor::ExecutorRegistry;
use crate::flow::{
    FlowStatus, FlowStep, FlowType, NodeResponse, NodeResponseStatus, NodeResponseType, StepType,
    USER_ID_KEY,
};
use crate::graph::{FlowGraph, Node, NodeError, NodeType};

pub mod context;
pub mod service;

pub use context::{EngineContext, NodeContext};
pub use service::FlowExecutionService;

/// Engine-fatal errors; none of these are retryable at this layer
#[derive(Error, Debug)]
pub enum EngineError {
    /// The context carries no graph
    #[error("flow graph is not initialized")]
    GraphNotInitialized,

    /// The graph's designated start node could not be resolved
    #[error("start node not found in graph {0}")]
    StartNodeNotFound(String),

    /// The registry could not produce an executor for a task node
    #[error("failed to construct executor for node {node_id}: {reason}")]
    ConstructingNodeExecutor {
        /// Node whose executor failed to resolve
        node_id: String,
        /// Why resolution failed
        reason: String,
    },

    /// A node response arrived without a status
    #[error("node {0} returned a response without a status")]
    MissingResponseStatus(String),

    /// A response named a successor that does not exist in the graph
    #[error("failed to move from node {from} to unknown node {to}")]
    MovingToNextNode {
        /// Node the flow was at
        from: String,
        /// Undeclared successor id
        to: String,
    },

    /// A REDIRECTION response carried no redirect URL
    #[error("redirection response from node {0} carries no redirect URL")]
    ResolvingStepForRedirection(String),

    /// A VIEW response carried neither inputs nor actions
    #[error("prompt response from node {0} carries neither inputs nor actions")]
    ResolvingStepForPrompt(String),

    /// An INCOMPLETE response carried an unsupported type
    #[error("node {node_id} returned unsupported response type {response_type}")]
    UnsupportedResponseType {
        /// Node that produced the response
        node_id: String,
        /// The offending type's wire string
        response_type: String,
    },

    /// A node returned an error; propagated verbatim
    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Interprets flow graphs against per-flow state
pub struct FlowEngine {
    executors: Arc<ExecutorRegistry>,
}

impl FlowEngine {
    /// An engine resolving executors through the given registry
    pub fn new(executors: Arc<ExecutorRegistry>) -> Self {
        Self { executors }
    }

    /// Run the flow until it suspends, completes, or fails
    ///
    /// A FAILURE-status node response is a *successful* return producing a
    /// step with status ERROR; engine-fatal conditions and node errors are
    /// returned as `Err` instead. The caller decides what either outcome
    /// means for persisted state.
    pub async fn execute(&self, ctx: &mut EngineContext) -> Result<FlowStep, EngineError> {
        let graph = ctx.graph.clone().ok_or(EngineError::GraphNotInitialized)?;

        if ctx.current_node.is_none() {
            let start = graph
                .start_node()
                .map_err(|_| EngineError::StartNodeNotFound(graph.id().to_string()))?;
            ctx.current_node = Some(start);
        }

        let mut step = FlowStep::for_flow(ctx.flow_id.clone());

        while let Some(node) = ctx.current_node.clone() {
            self.resolve_executor(&node)?;

            let node_ctx = ctx.node_context(&node);
            debug!(flow_id = %ctx.flow_id, node_id = %node.id(), "executing node");
            let response = node.execute(&node_ctx).await?;

            update_context_with_response(ctx, &response);

            match response.status {
                NodeResponseStatus::Unset => {
                    return Err(EngineError::MissingResponseStatus(node.id().to_string()));
                }
                NodeResponseStatus::Complete => {
                    ctx.current_node = next_node(&graph, &node, &response)?;
                }
                NodeResponseStatus::Incomplete => {
                    populate_incomplete_step(&mut step, &node, &response)?;
                    debug!(flow_id = %ctx.flow_id, node_id = %node.id(), "flow suspended");
                    return Ok(step);
                }
                NodeResponseStatus::Failure => {
                    step.status = FlowStatus::Error;
                    step.failure_reason = response.failure_reason.clone();
                    debug!(flow_id = %ctx.flow_id, node_id = %node.id(), "flow failed");
                    return Ok(step);
                }
            }
        }

        step.status = FlowStatus::Complete;
        if let Some(response) = &ctx.current_node_response {
            step.assertion = response.assertion.clone();
        }
        debug!(flow_id = %ctx.flow_id, "flow complete");
        Ok(step)
    }

    /// Attach an executor to a task node that has none yet; memoized on
    /// the node for the life of the graph instance
    fn resolve_executor(&self, node: &Arc<Node>) -> Result<(), EngineError> {
        if node.node_type() != NodeType::TaskExecution || node.executor().is_some() {
            return Ok(());
        }
        let config =
            node.executor_config()
                .ok_or_else(|| EngineError::ConstructingNodeExecutor {
                    node_id: node.id().to_string(),
                    reason: "no executor configured on node".to_string(),
                })?;
        let executor = self.executors.resolve(config).map_err(|e| {
            EngineError::ConstructingNodeExecutor {
                node_id: node.id().to_string(),
                reason: e.to_string(),
            }
        })?;
        node.attach_executor(executor);
        Ok(())
    }
}

/// Fold a node response into the flow state
fn update_context_with_response(ctx: &mut EngineContext, response: &NodeResponse) {
    ctx.current_node_response = Some(response.clone());
    ctx.current_action_id = None;

    for (key, value) in &response.runtime_data {
        ctx.runtime_data.insert(key.clone(), value.clone());
    }

    if let Some(user) = &response.authenticated_user {
        if user.is_authenticated || ctx.flow_type == FlowType::Registration {
            let mut merged = user.clone();
            let mut attributes = ctx.authenticated_user.attributes.clone();
            attributes.extend(user.attributes.clone());
            merged.attributes = attributes;
            ctx.authenticated_user = merged;
        }
    }

    if !ctx.authenticated_user.user_id.is_empty()
        && !ctx.runtime_data.contains_key(USER_ID_KEY)
    {
        ctx.runtime_data
            .insert(USER_ID_KEY.to_string(), ctx.authenticated_user.user_id.clone());
    }
}

/// Resolve where the flow goes after a COMPLETE response
///
/// Decision nodes follow the response's chosen successor; any other node
/// follows its single statically declared successor. No successor means
/// the flow is done.
fn next_node(
    graph: &FlowGraph,
    node: &Node,
    response: &NodeResponse,
) -> Result<Option<Arc<Node>>, EngineError> {
    let next_id = if node.node_type() == NodeType::Decision {
        response
            .next_node_id
            .clone()
            .filter(|id| !id.is_empty())
    } else {
        node.successors().first().cloned()
    };

    match next_id {
        None => Ok(None),
        Some(id) => graph
            .node(&id)
            .map(Some)
            .ok_or_else(|| EngineError::MovingToNextNode {
                from: node.id().to_string(),
                to: id,
            }),
    }
}

/// Populate the step returned to the client for an INCOMPLETE response
fn populate_incomplete_step(
    step: &mut FlowStep,
    node: &Node,
    response: &NodeResponse,
) -> Result<(), EngineError> {
    match response.response_type {
        NodeResponseType::Redirection => {
            let url = response
                .redirect_url
                .clone()
                .filter(|u| !u.is_empty())
                .ok_or_else(|| EngineError::ResolvingStepForRedirection(node.id().to_string()))?;
            step.data.redirect_url = Some(url);
            step.data
                .additional_data
                .extend(response.additional_data.clone());
            step.data.inputs.extend(response.required_data.iter().cloned());
            step.step_type = Some(StepType::Redirection);
            step.status = FlowStatus::Incomplete;
            Ok(())
        }
        NodeResponseType::View => {
            if response.required_data.is_empty() && response.actions.is_empty() {
                return Err(EngineError::ResolvingStepForPrompt(node.id().to_string()));
            }
            step.data.inputs.extend(response.required_data.iter().cloned());
            step.data.actions = response.actions.clone();
            step.step_type = Some(StepType::View);
            step.status = FlowStatus::Incomplete;
            Ok(())
        }
        other => Err(EngineError::UnsupportedResponseType {
            node_id: node.id().to_string(),
            response_type: other.as_str().to_string(),
        }),
    }
}
