//! Flow graph structures
//!
//! A flow graph is the declarative program a flow interprets: nodes keyed
//! by id, ordered successor lists, and a designated start node. Graphs are
//! built once (via [`GraphBuilder`]), registered by id, and shared
//! immutably across concurrent flows; nodes reference successors by string
//! id only, never by direct reference, so a graph carries no ownership
//! cycles.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::flow::FlowType;

pub mod builder;
pub mod node;
pub mod registry;

pub use builder::GraphBuilder;
pub use node::{Node, NodeError, NodeType};
pub use registry::GraphRegistry;

/// Errors specific to graph construction and lookup
#[derive(Error, Debug)]
pub enum GraphError {
    /// Referenced node id does not exist in the graph
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Two nodes were declared with the same id
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    /// An edge references a node that was never declared
    #[error("edge references unknown node: {from} -> {to}")]
    UnknownEdgeTarget {
        /// Source node id
        from: String,
        /// Undeclared target id
        to: String,
    },

    /// No start node was designated
    #[error("start node is not set")]
    StartNodeNotSet,

    /// The designated start node does not exist in the graph
    #[error("start node not found in graph: {0}")]
    StartNodeNotFound(String),

    /// A non-decision node was given more than one successor
    #[error("node {0} is not a decision node but has multiple successors")]
    AmbiguousSuccessors(String),

    /// Nodes cannot be reached from the start node
    #[error("nodes unreachable from start: {0}")]
    UnreachableNodes(String),
}

/// An application-scoped directed flow graph
pub struct FlowGraph {
    id: String,
    flow_type: FlowType,
    nodes: HashMap<String, Arc<Node>>,
    start_node_id: String,
}

impl FlowGraph {
    pub(crate) fn from_parts(
        id: String,
        flow_type: FlowType,
        nodes: HashMap<String, Arc<Node>>,
        start_node_id: String,
    ) -> Self {
        Self {
            id,
            flow_type,
            nodes,
            start_node_id,
        }
    }

    /// Graph identifier, unique within the registry
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The kind of flow this graph drives
    pub fn flow_type(&self) -> FlowType {
        self.flow_type
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<Arc<Node>> {
        self.nodes.get(id).cloned()
    }

    /// The designated start node
    pub fn start_node(&self) -> Result<Arc<Node>, GraphError> {
        if self.start_node_id.is_empty() {
            return Err(GraphError::StartNodeNotSet);
        }
        self.nodes
            .get(&self.start_node_id)
            .cloned()
            .ok_or_else(|| GraphError::StartNodeNotFound(self.start_node_id.clone()))
    }

    /// Number of nodes in the graph
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Ordered successor ids of a node; empty for unknown ids
    pub fn successors(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map(|node| node.successors())
            .unwrap_or(&[])
    }
}

impl std::fmt::Debug for FlowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowGraph")
            .field("id", &self.id)
            .field("flow_type", &self.flow_type)
            .field("nodes", &self.nodes.len())
            .field("start_node_id", &self.start_node_id)
            .finish()
    }
}
