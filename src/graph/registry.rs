//! Graph registry
//!
//! The registry exclusively owns flow graphs; everything else refers to a
//! graph by id and borrows it for the duration of one engine turn. This is
//! the flow-management surface the execution service loads graphs from.

use std::sync::Arc;

use dashmap::DashMap;

use super::FlowGraph;

/// Id-keyed registry of flow graphs, read-mostly after boot
#[derive(Default)]
pub struct GraphRegistry {
    graphs: DashMap<String, Arc<FlowGraph>>,
}

impl GraphRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            graphs: DashMap::new(),
        }
    }

    /// Register a graph, replacing any previous graph with the same id
    pub fn register(&self, graph: FlowGraph) -> Arc<FlowGraph> {
        let graph = Arc::new(graph);
        self.graphs.insert(graph.id().to_string(), graph.clone());
        graph
    }

    /// Look up a graph by id
    pub fn get(&self, id: &str) -> Option<Arc<FlowGraph>> {
        self.graphs.get(id).map(|entry| entry.value().clone())
    }

    /// Remove a graph by id
    pub fn remove(&self, id: &str) -> Option<Arc<FlowGraph>> {
        self.graphs.remove(id).map(|(_, graph)| graph)
    }

    /// Whether a graph is registered under the id
    pub fn contains(&self, id: &str) -> bool {
        self.graphs.contains_key(id)
    }

    /// Number of registered graphs
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}
