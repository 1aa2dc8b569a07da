//! Application resource and service
//!
//! An application is the relying party a flow authenticates for: it binds
//! the authentication and registration graph ids, gates registration, and
//! carries the inbound OAuth configuration. Applications flow through the
//! generic resource layer; this module adds the application-specific
//! validation used at declarative load time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::resource::loader::{LoaderError, ResourceValidator};
use crate::resource::{Resource, ResourceService};

pub mod postgres;

pub use postgres::PostgresApplicationStore;

/// Inbound OAuth configuration of an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundOAuthConfig {
    /// OAuth client identifier, unique across applications
    pub client_id: String,

    /// Allowed redirect URIs
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Allowed grant types
    #[serde(default)]
    pub grant_types: Vec<String>,
}

/// The relying party a flow runs for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Globally unique application id
    pub id: String,

    /// Application name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Graph driving authentication flows
    #[serde(default)]
    pub auth_flow_graph_id: Option<String>,

    /// Graph driving registration flows
    #[serde(default)]
    pub registration_flow_graph_id: Option<String>,

    /// Whether self-registration is allowed
    #[serde(default)]
    pub is_registration_flow_enabled: bool,

    /// Inbound OAuth configuration
    #[serde(default)]
    pub inbound_oauth: Option<InboundOAuthConfig>,

    #[serde(skip)]
    read_only: bool,
}

impl Application {
    /// An application with the given id and name
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            auth_flow_graph_id: None,
            registration_flow_graph_id: None,
            is_registration_flow_enabled: false,
            inbound_oauth: None,
            read_only: false,
        }
    }

    /// Bind the authentication graph
    pub fn with_auth_graph(mut self, graph_id: impl Into<String>) -> Self {
        self.auth_flow_graph_id = Some(graph_id.into());
        self
    }

    /// Bind the registration graph and enable registration
    pub fn with_registration_graph(mut self, graph_id: impl Into<String>) -> Self {
        self.registration_flow_graph_id = Some(graph_id.into());
        self.is_registration_flow_enabled = true;
        self
    }

    /// Attach inbound OAuth configuration
    pub fn with_inbound_oauth(mut self, config: InboundOAuthConfig) -> Self {
        self.inbound_oauth = Some(config);
        self
    }
}

impl Resource for Application {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn client_id(&self) -> Option<&str> {
        self.inbound_oauth.as_ref().map(|c| c.client_id.as_str())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }
}

/// Service-level view of applications
pub type ApplicationService = ResourceService<Application>;

/// Declarative-load validation for applications
pub struct ApplicationValidator;

#[async_trait]
impl ResourceValidator<Application> for ApplicationValidator {
    async fn validate(&self, app: Application) -> Result<Application, LoaderError> {
        if app.id.trim().is_empty() {
            return Err(LoaderError::Invalid(
                "application id must not be empty".to_string(),
            ));
        }
        if app.name.trim().is_empty() {
            return Err(LoaderError::Invalid(format!(
                "application {} has no name",
                app.id
            )));
        }
        if app.is_registration_flow_enabled && app.registration_flow_graph_id.is_none() {
            return Err(LoaderError::Invalid(format!(
                "application {} enables registration but binds no registration graph",
                app.id
            )));
        }
        Ok(app)
    }
}
