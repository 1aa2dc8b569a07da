//! Engine and node execution contexts
//!
//! The [`EngineContext`] is the complete resumable state of a live flow;
//! the engine owns no state of its own. A [`NodeContext`] is the per-node
//! projection handed to executors: everything a step may read, nothing it
//! may mutate in place.

use std::collections::HashMap;
use std::sync::Arc;

use crate::application::Application;
use crate::flow::{AuthenticatedUser, FlowType, InputDescriptor, NodeResponse};
use crate::graph::{FlowGraph, Node};

/// The full per-flow state, loaded and persisted between HTTP turns
#[derive(Debug, Clone)]
pub struct EngineContext {
    /// Server-generated opaque flow identifier
    pub flow_id: String,

    /// Application the flow runs for
    pub app_id: String,

    /// Kind of flow being executed
    pub flow_type: FlowType,

    /// Resolved graph; set by the execution service before engine entry
    pub graph: Option<Arc<FlowGraph>>,

    /// Node the flow is currently suspended at, if any
    pub current_node: Option<Arc<Node>>,

    /// Action the caller selected on this turn, if any
    pub current_action_id: Option<String>,

    /// Response produced by the most recent node dispatch
    pub current_node_response: Option<NodeResponse>,

    /// Latest user inputs, merged across requests
    pub user_input_data: HashMap<String, String>,

    /// Data accumulated across nodes within the flow
    pub runtime_data: HashMap<String, String>,

    /// Snapshot of the application resource
    pub application: Option<Application>,

    /// Identity the flow has established so far
    pub authenticated_user: AuthenticatedUser,
}

impl EngineContext {
    /// A fresh context for a new flow
    pub fn new(flow_id: impl Into<String>, app_id: impl Into<String>, flow_type: FlowType) -> Self {
        Self {
            flow_id: flow_id.into(),
            app_id: app_id.into(),
            flow_type,
            graph: None,
            current_node: None,
            current_action_id: None,
            current_node_response: None,
            user_input_data: HashMap::new(),
            runtime_data: HashMap::new(),
            application: None,
            authenticated_user: AuthenticatedUser::default(),
        }
    }

    /// Project the per-node view handed to the node's executor
    pub fn node_context(&self, node: &Node) -> NodeContext {
        NodeContext {
            flow_id: self.flow_id.clone(),
            flow_type: self.flow_type,
            app_id: self.app_id.clone(),
            current_action_id: self.current_action_id.clone(),
            input_schema: node.input_schema().to_vec(),
            user_input_data: self.user_input_data.clone(),
            runtime_data: self.runtime_data.clone(),
            application: self.application.clone(),
            authenticated_user: self.authenticated_user.clone(),
        }
    }
}

/// The read-only view of a flow a single node executes against
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// Flow identifier
    pub flow_id: String,

    /// Kind of flow being executed
    pub flow_type: FlowType,

    /// Application identifier
    pub app_id: String,

    /// Action the caller selected on this turn, if any
    pub current_action_id: Option<String>,

    /// The node's declared input-data schema
    pub input_schema: Vec<InputDescriptor>,

    /// Latest user inputs
    pub user_input_data: HashMap<String, String>,

    /// Accumulated runtime data
    pub runtime_data: HashMap<String, String>,

    /// Snapshot of the application resource
    pub application: Option<Application>,

    /// Identity the flow has established so far
    pub authenticated_user: AuthenticatedUser,
}

impl NodeContext {
    /// A minimal context, useful for executor construction and tests
    pub fn empty(
        flow_id: impl Into<String>,
        flow_type: FlowType,
        app_id: impl Into<String>,
    ) -> Self {
        Self {
            flow_id: flow_id.into(),
            flow_type,
            app_id: app_id.into(),
            current_action_id: None,
            input_schema: Vec::new(),
            user_input_data: HashMap::new(),
            runtime_data: HashMap::new(),
            application: None,
            authenticated_user: AuthenticatedUser::default(),
        }
    }
}
