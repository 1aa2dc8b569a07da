//! Shared fixtures for flow integration tests

// Not every test binary uses every fixture.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use thunder::application::{Application, ApplicationService};
use thunder::engine::context::NodeContext;
use thunder::engine::{FlowEngine, FlowExecutionService};
use thunder::executor::{Executor, ExecutorError, ExecutorRegistry, ExecutorResponse};
use thunder::graph::{FlowGraph, GraphRegistry};
use thunder::resource::{MemoryResourceStore, ProvisionedStore, ResourceStore};
use thunder::store::InMemoryContextStore;

/// Executor replaying a scripted sequence of responses
///
/// The script is shared across resolutions so a node re-executed over
/// several HTTP turns advances through it.
#[derive(Debug)]
pub struct ScriptedExecutor {
    name: String,
    properties: HashMap<String, String>,
    script: Arc<Mutex<VecDeque<ExecutorResponse>>>,
}

#[async_trait]
impl Executor for ScriptedExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    async fn execute(&self, _ctx: &NodeContext) -> Result<ExecutorResponse, ExecutorError> {
        let response = self.script.lock().pop_front();
        Ok(response.unwrap_or_else(|| ExecutorResponse::failure("script exhausted")))
    }
}

/// Register a scripted executor under `name`, returning a handle to the
/// shared script
pub fn script_executor(
    registry: &ExecutorRegistry,
    name: &str,
    responses: Vec<ExecutorResponse>,
) -> Arc<Mutex<VecDeque<ExecutorResponse>>> {
    let script = Arc::new(Mutex::new(VecDeque::from(responses)));
    let handle = script.clone();
    let executor_name = name.to_string();
    registry.register(name, move |_config| {
        Ok(Box::new(ScriptedExecutor {
            name: executor_name.clone(),
            properties: HashMap::new(),
            script: handle.clone(),
        }))
    });
    script
}

/// Everything a flow test needs, wired over in-memory stores
pub struct TestHarness {
    pub service: FlowExecutionService,
    pub contexts: Arc<InMemoryContextStore>,
    pub graphs: Arc<GraphRegistry>,
    pub applications: Arc<MemoryResourceStore<Application>>,
}

/// Install a test subscriber so `RUST_LOG` surfaces engine traces
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Wire a service around the given graphs, applications, and registry
pub async fn harness(
    graphs: Vec<FlowGraph>,
    applications: Vec<Application>,
    registry: ExecutorRegistry,
) -> TestHarness {
    init_tracing();

    let graph_registry = Arc::new(GraphRegistry::new());
    for graph in graphs {
        graph_registry.register(graph);
    }

    let app_store = Arc::new(MemoryResourceStore::new());
    for app in applications {
        app_store.create(app).await.unwrap();
    }
    let app_service = Arc::new(ApplicationService::new(ProvisionedStore::Mutable(
        app_store.clone(),
    )));

    let contexts = Arc::new(InMemoryContextStore::new());
    let engine = FlowEngine::new(Arc::new(registry));
    let service = FlowExecutionService::new(
        engine,
        graph_registry.clone(),
        app_service,
        contexts.clone(),
    );

    TestHarness {
        service,
        contexts,
        graphs: graph_registry,
        applications: app_store,
    }
}
