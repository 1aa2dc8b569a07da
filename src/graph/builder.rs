//! Graph builder and load-time validation
//!
//! The builder is the only way to construct a [`FlowGraph`]. `build`
//! validates the declared structure: unique node ids, every edge endpoint
//! declared, a designated start node, single successors outside decision
//! nodes, and reachability of every node from the start.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::graph::DiGraph;
use petgraph::visit::Dfs;

use super::node::{Node, NodeType};
use super::{FlowGraph, GraphError};
use crate::executor::ExecutorConfig;
use crate::flow::{FlowType, InputDescriptor};

struct NodeSpec {
    id: String,
    node_type: NodeType,
    input_schema: Vec<InputDescriptor>,
    executor_config: Option<ExecutorConfig>,
}

/// Fluent builder for [`FlowGraph`]
pub struct GraphBuilder {
    id: String,
    flow_type: FlowType,
    specs: Vec<NodeSpec>,
    edges: Vec<(String, String)>,
    start: Option<String>,
    schemas: Vec<(String, Vec<InputDescriptor>)>,
}

impl GraphBuilder {
    /// Start building a graph with the given id and flow type
    pub fn new(id: impl Into<String>, flow_type: FlowType) -> Self {
        Self {
            id: id.into(),
            flow_type,
            specs: Vec::new(),
            edges: Vec::new(),
            start: None,
            schemas: Vec::new(),
        }
    }

    /// Declare a task node backed by the given executor
    pub fn task_node(mut self, id: impl Into<String>, executor: ExecutorConfig) -> Self {
        self.specs.push(NodeSpec {
            id: id.into(),
            node_type: NodeType::TaskExecution,
            input_schema: Vec::new(),
            executor_config: Some(executor),
        });
        self
    }

    /// Declare a decision node
    pub fn decision_node(mut self, id: impl Into<String>) -> Self {
        self.specs.push(NodeSpec {
            id: id.into(),
            node_type: NodeType::Decision,
            input_schema: Vec::new(),
            executor_config: None,
        });
        self
    }

    /// Attach an input-data schema to a declared node
    pub fn inputs(mut self, node_id: impl Into<String>, schema: Vec<InputDescriptor>) -> Self {
        self.schemas.push((node_id.into(), schema));
        self
    }

    /// Declare a directed edge; order of declaration is successor order
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Designate the start node
    pub fn start(mut self, id: impl Into<String>) -> Self {
        self.start = Some(id.into());
        self
    }

    /// Validate the declared structure and produce the graph
    pub fn build(mut self) -> Result<FlowGraph, GraphError> {
        let mut declared: HashMap<String, usize> = HashMap::new();
        for (index, spec) in self.specs.iter().enumerate() {
            if declared.insert(spec.id.clone(), index).is_some() {
                return Err(GraphError::DuplicateNode(spec.id.clone()));
            }
        }

        for (node_id, schema) in self.schemas.drain(..) {
            let index = *declared
                .get(&node_id)
                .ok_or_else(|| GraphError::NodeNotFound(node_id.clone()))?;
            self.specs[index].input_schema = schema;
        }

        let mut successors: HashMap<String, Vec<String>> = HashMap::new();
        for (from, to) in &self.edges {
            if !declared.contains_key(from) || !declared.contains_key(to) {
                return Err(GraphError::UnknownEdgeTarget {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
            successors.entry(from.clone()).or_default().push(to.clone());
        }

        for spec in &self.specs {
            let count = successors.get(&spec.id).map_or(0, Vec::len);
            if spec.node_type != NodeType::Decision && count > 1 {
                return Err(GraphError::AmbiguousSuccessors(spec.id.clone()));
            }
        }

        let start = self.start.take().ok_or(GraphError::StartNodeNotSet)?;
        if !declared.contains_key(&start) {
            return Err(GraphError::StartNodeNotFound(start));
        }

        self.check_reachability(&declared, &start)?;

        let mut nodes = HashMap::new();
        for spec in self.specs {
            let node_successors = successors.remove(&spec.id).unwrap_or_default();
            let is_start = spec.id == start;
            let is_final = node_successors.is_empty();
            nodes.insert(
                spec.id.clone(),
                Arc::new(Node::new(
                    spec.id,
                    spec.node_type,
                    is_start,
                    is_final,
                    spec.input_schema,
                    node_successors,
                    spec.executor_config,
                )),
            );
        }

        Ok(FlowGraph::from_parts(self.id, self.flow_type, nodes, start))
    }

    fn check_reachability(
        &self,
        declared: &HashMap<String, usize>,
        start: &str,
    ) -> Result<(), GraphError> {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut indices = HashMap::new();
        for spec in &self.specs {
            indices.insert(spec.id.as_str(), graph.add_node(spec.id.as_str()));
        }
        for (from, to) in &self.edges {
            graph.add_edge(indices[from.as_str()], indices[to.as_str()], ());
        }

        let mut seen = vec![false; declared.len()];
        let mut dfs = Dfs::new(&graph, indices[start]);
        while let Some(index) = dfs.next(&graph) {
            seen[index.index()] = true;
        }

        let unreachable: Vec<&str> = graph
            .node_indices()
            .filter(|index| !seen[index.index()])
            .map(|index| graph[index])
            .collect();
        if !unreachable.is_empty() {
            return Err(GraphError::UnreachableNodes(unreachable.join(", ")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> ExecutorConfig {
        ExecutorConfig::named("noop")
    }

    #[test]
    fn test_build_validates_edge_targets() {
        let err = GraphBuilder::new("g", FlowType::Authentication)
            .task_node("a", executor())
            .edge("a", "ghost")
            .start("a")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownEdgeTarget { to, .. } if to == "ghost"));
    }

    #[test]
    fn test_build_requires_start() {
        let err = GraphBuilder::new("g", FlowType::Authentication)
            .task_node("a", executor())
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::StartNodeNotSet));
    }

    #[test]
    fn test_build_rejects_duplicate_nodes() {
        let err = GraphBuilder::new("g", FlowType::Authentication)
            .task_node("a", executor())
            .task_node("a", executor())
            .start("a")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode(id) if id == "a"));
    }

    #[test]
    fn test_build_rejects_multiple_successors_on_task_node() {
        let err = GraphBuilder::new("g", FlowType::Authentication)
            .task_node("a", executor())
            .task_node("b", executor())
            .task_node("c", executor())
            .edge("a", "b")
            .edge("a", "c")
            .start("a")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::AmbiguousSuccessors(id) if id == "a"));
    }

    #[test]
    fn test_build_rejects_unreachable_nodes() {
        let err = GraphBuilder::new("g", FlowType::Authentication)
            .task_node("a", executor())
            .task_node("island", executor())
            .start("a")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::UnreachableNodes(ids) if ids.contains("island")));
    }

    #[test]
    fn test_decision_node_keeps_successor_order() {
        let graph = GraphBuilder::new("g", FlowType::Authentication)
            .decision_node("choose")
            .task_node("first", executor())
            .task_node("second", executor())
            .edge("choose", "first")
            .edge("choose", "second")
            .start("choose")
            .build()
            .unwrap();

        assert_eq!(
            graph.successors("choose"),
            &["first".to_string(), "second".to_string()]
        );
        assert!(graph.node("first").unwrap().is_final());
        assert!(graph.node("choose").unwrap().is_start());
    }
}
