//! Flow execution service
//!
//! The session boundary around the engine: initiates flows, loads and
//! saves engine state keyed by a server-issued flow id, resolves the
//! per-application graph, and decides what each engine outcome means for
//! the persisted context. Only suspended (INCOMPLETE) flows survive a
//! turn; completion, failure, and errors all discard server state so a
//! client can never resume into an inconsistent mid-flow view.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EngineContext, EngineError, FlowEngine};
use crate::application::ApplicationService;
use crate::flow::{AuthenticatedUser, FlowStatus, FlowStep, FlowType};
use crate::graph::GraphRegistry;
use crate::resource::ResourceStoreError;
use crate::store::{FlowContextRecord, FlowContextStore, StoreError};

/// Errors raised by the flow execution service
#[derive(Error, Debug)]
pub enum FlowServiceError {
    /// The flow type string is not a supported flow type
    #[error("invalid flow type: {0}")]
    InvalidFlowType(String),

    /// The flow id names no persisted flow
    #[error("invalid flow id: {0}")]
    InvalidFlowId(String),

    /// The application could not be resolved
    #[error("application not found: {0}")]
    ApplicationNotFound(String),

    /// The application binds no authentication graph
    #[error("application {0} has no authentication graph configured")]
    AuthGraphNotConfigured(String),

    /// The application does not allow self-registration
    #[error("registration is disabled for application {0}")]
    RegistrationDisabled(String),

    /// The application allows registration but binds no graph for it
    #[error("application {0} has no registration graph configured")]
    RegistrationGraphNotConfigured(String),

    /// The bound graph id is not registered
    #[error("graph {0} is not registered")]
    GraphNotFound(String),

    /// The persisted context could not be loaded
    #[error("failed to load flow context from store")]
    LoadingContextFromStore(#[source] StoreError),

    /// The context could not be persisted, updated, or deleted
    #[error("failed to update flow context in store")]
    UpdatingContextInStore(#[source] StoreError),

    /// Application resolution failed below the service
    #[error(transparent)]
    Resource(#[from] ResourceStoreError),

    /// The engine failed; propagated verbatim
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// One flow execution request: the five inputs of a single HTTP turn
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowExecutionRequest {
    /// Application the flow runs for
    #[serde(rename = "applicationId")]
    pub app_id: String,

    /// Flow to resume; empty or absent starts a new flow
    #[serde(rename = "flowId", default)]
    pub flow_id: Option<String>,

    /// Action the user selected, if any
    #[serde(rename = "actionId", default)]
    pub action_id: Option<String>,

    /// Kind of flow to start; ignored when resuming
    #[serde(rename = "flowType", default)]
    pub flow_type: String,

    /// User inputs collected by the client
    #[serde(default)]
    pub inputs: HashMap<String, String>,
}

impl FlowExecutionRequest {
    /// A new-flow request for the given application and flow type
    pub fn new(app_id: impl Into<String>, flow_type: FlowType) -> Self {
        Self {
            app_id: app_id.into(),
            flow_type: flow_type.as_str().to_string(),
            ..Self::default()
        }
    }

    /// Resume an existing flow
    pub fn with_flow_id(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = Some(flow_id.into());
        self
    }

    /// Select an action
    pub fn with_action(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    /// Supply one user input
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }
}

/// Drives flows across HTTP turns
pub struct FlowExecutionService {
    engine: FlowEngine,
    graphs: Arc<GraphRegistry>,
    applications: Arc<ApplicationService>,
    contexts: Arc<dyn FlowContextStore>,
}

impl FlowExecutionService {
    /// Assemble the service over its collaborators
    pub fn new(
        engine: FlowEngine,
        graphs: Arc<GraphRegistry>,
        applications: Arc<ApplicationService>,
        contexts: Arc<dyn FlowContextStore>,
    ) -> Self {
        Self {
            engine,
            graphs,
            applications,
            contexts,
        }
    }

    /// Execute one turn of a flow
    pub async fn execute(
        &self,
        request: FlowExecutionRequest,
    ) -> Result<FlowStep, FlowServiceError> {
        let flow_id = request.flow_id.clone().filter(|id| !id.is_empty());
        let (mut ctx, is_new) = match flow_id {
            None => (self.initiate(&request).await?, true),
            Some(id) => (self.resume(&id).await?, false),
        };

        ctx.user_input_data.extend(request.inputs.clone());
        if let Some(action) = request.action_id.clone().filter(|a| !a.is_empty()) {
            ctx.current_action_id = Some(action);
        }

        match self.engine.execute(&mut ctx).await {
            Err(e) => {
                if !is_new {
                    // Deliberate: an error mid-flow discards server state so
                    // the client cannot retry into a broken position.
                    warn!(
                        flow_id = %ctx.flow_id,
                        error = %e,
                        "engine error on existing flow, discarding context"
                    );
                    self.contexts
                        .delete(&ctx.flow_id)
                        .await
                        .map_err(FlowServiceError::UpdatingContextInStore)?;
                }
                Err(e.into())
            }
            Ok(step) => {
                self.persist_outcome(&ctx, &step, is_new).await?;
                Ok(step)
            }
        }
    }

    /// Start a new flow: validate the type, resolve the application, pick
    /// and load its graph, and mint a flow id
    async fn initiate(
        &self,
        request: &FlowExecutionRequest,
    ) -> Result<EngineContext, FlowServiceError> {
        let flow_type = FlowType::parse(&request.flow_type)
            .map_err(|_| FlowServiceError::InvalidFlowType(request.flow_type.clone()))?;

        let app = self
            .applications
            .get_by_id(&request.app_id)
            .await?
            .ok_or_else(|| FlowServiceError::ApplicationNotFound(request.app_id.clone()))?;

        let graph_id = match flow_type {
            FlowType::Authentication => app
                .auth_flow_graph_id
                .clone()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| FlowServiceError::AuthGraphNotConfigured(app.id.clone()))?,
            FlowType::Registration => {
                if !app.is_registration_flow_enabled {
                    return Err(FlowServiceError::RegistrationDisabled(app.id.clone()));
                }
                app.registration_flow_graph_id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        FlowServiceError::RegistrationGraphNotConfigured(app.id.clone())
                    })?
            }
        };

        let graph = self
            .graphs
            .get(&graph_id)
            .ok_or_else(|| FlowServiceError::GraphNotFound(graph_id.clone()))?;

        let mut ctx = EngineContext::new(Uuid::new_v4().to_string(), app.id.clone(), flow_type);
        ctx.graph = Some(graph);
        ctx.application = Some(app);
        info!(
            flow_id = %ctx.flow_id,
            app_id = %ctx.app_id,
            flow_type = %flow_type,
            "flow initiated"
        );
        Ok(ctx)
    }

    /// Resume a persisted flow: rehydrate the graph and identity, refresh
    /// the application snapshot
    async fn resume(&self, flow_id: &str) -> Result<EngineContext, FlowServiceError> {
        let record = self
            .contexts
            .get(flow_id)
            .await
            .map_err(FlowServiceError::LoadingContextFromStore)?
            .ok_or_else(|| FlowServiceError::InvalidFlowId(flow_id.to_string()))?;

        let graph = self
            .graphs
            .get(&record.graph_id)
            .ok_or_else(|| FlowServiceError::GraphNotFound(record.graph_id.clone()))?;

        let app = self
            .applications
            .get_by_id(&record.app_id)
            .await?
            .ok_or_else(|| FlowServiceError::ApplicationNotFound(record.app_id.clone()))?;

        let current_node = match &record.current_node_id {
            None => None,
            Some(node_id) => match graph.node(node_id) {
                Some(node) => Some(node),
                None => {
                    // The graph changed under a suspended flow; the stored
                    // position is unusable, so drop it and force a restart.
                    warn!(flow_id, node_id = %node_id, "stored node no longer in graph");
                    let _ = self.contexts.delete(flow_id).await;
                    return Err(FlowServiceError::InvalidFlowId(flow_id.to_string()));
                }
            },
        };

        let mut ctx = EngineContext::new(record.flow_id, record.app_id, graph.flow_type());
        ctx.graph = Some(graph);
        ctx.current_node = current_node;
        ctx.current_action_id = record.current_action_id;
        ctx.runtime_data = record.runtime_data;
        ctx.user_input_data = record.user_inputs;
        ctx.authenticated_user = AuthenticatedUser {
            is_authenticated: record.is_authenticated,
            user_id: record.user_id.unwrap_or_default(),
            attributes: record.user_attributes,
        };
        ctx.application = Some(app);
        debug!(flow_id = %ctx.flow_id, "flow resumed");
        Ok(ctx)
    }

    /// Persist only suspended flows; completion and failure erase state
    async fn persist_outcome(
        &self,
        ctx: &EngineContext,
        step: &FlowStep,
        is_new: bool,
    ) -> Result<(), FlowServiceError> {
        match step.status {
            FlowStatus::Incomplete => {
                let record = FlowContextRecord::from_context(ctx);
                let result = if is_new {
                    self.contexts.store(&record).await
                } else {
                    self.contexts.update(&record).await
                };
                result.map_err(FlowServiceError::UpdatingContextInStore)
            }
            FlowStatus::Complete | FlowStatus::Error => {
                if is_new {
                    return Ok(());
                }
                self.contexts
                    .delete(&ctx.flow_id)
                    .await
                    .map_err(FlowServiceError::UpdatingContextInStore)
            }
        }
    }
}
