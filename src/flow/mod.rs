//! Flow model types
//!
//! The shared vocabulary of the engine and the execution service: flow
//! types, node responses, the HTTP-visible flow step, and the supporting
//! value types (input descriptors, actions, the authenticated user).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key under which the authenticated user's id is mirrored into runtime data
pub const USER_ID_KEY: &str = "userID";

/// Errors raised when parsing flow model values from their wire strings
#[derive(Error, Debug)]
pub enum FlowError {
    /// Flow type string is not one of the supported values
    #[error("invalid flow type: {0}")]
    InvalidFlowType(String),

    /// Node response status string is not one of the supported values
    #[error("unsupported node response status: {0}")]
    UnsupportedResponseStatus(String),

    /// Node response type string is not one of the supported values
    #[error("unsupported node response type: {0}")]
    UnsupportedResponseType(String),
}

/// The kind of flow a graph drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowType {
    /// Authenticates an existing user against an application
    #[serde(rename = "AUTHENTICATION")]
    Authentication,

    /// Registers a new user with an application
    #[serde(rename = "REGISTRATION")]
    Registration,
}

impl FlowType {
    /// Parse a flow type from its wire string
    pub fn parse(raw: &str) -> Result<Self, FlowError> {
        match raw {
            "AUTHENTICATION" => Ok(FlowType::Authentication),
            "REGISTRATION" => Ok(FlowType::Registration),
            other => Err(FlowError::InvalidFlowType(other.to_string())),
        }
    }

    /// The wire string for this flow type
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowType::Authentication => "AUTHENTICATION",
            FlowType::Registration => "REGISTRATION",
        }
    }
}

impl std::fmt::Display for FlowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status an executor reports back through a node response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeResponseStatus {
    /// No status set. Illegal in a dispatched response.
    #[default]
    #[serde(rename = "")]
    Unset,

    /// The node finished its work; the engine may advance
    #[serde(rename = "COMPLETE")]
    Complete,

    /// The node needs something from the outside; the flow suspends
    #[serde(rename = "INCOMPLETE")]
    Incomplete,

    /// The node failed for a business reason (wrong password, expired OTP)
    #[serde(rename = "FAILURE")]
    Failure,
}

impl NodeResponseStatus {
    /// Parse a status from its wire string; empty maps to [`Self::Unset`]
    pub fn parse(raw: &str) -> Result<Self, FlowError> {
        match raw {
            "" => Ok(NodeResponseStatus::Unset),
            "COMPLETE" => Ok(NodeResponseStatus::Complete),
            "INCOMPLETE" => Ok(NodeResponseStatus::Incomplete),
            "FAILURE" => Ok(NodeResponseStatus::Failure),
            other => Err(FlowError::UnsupportedResponseStatus(other.to_string())),
        }
    }
}

/// How an INCOMPLETE response should be surfaced to the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeResponseType {
    /// No type set; only legal on responses that are not INCOMPLETE
    #[default]
    #[serde(rename = "")]
    Unset,

    /// Render a prompt collecting inputs and/or an action choice
    #[serde(rename = "VIEW")]
    View,

    /// Redirect the user agent to an external URL
    #[serde(rename = "REDIRECTION")]
    Redirection,

    /// Reserved; rejected by the engine
    #[serde(rename = "RETRY")]
    Retry,
}

impl NodeResponseType {
    /// Parse a response type from its wire string; empty maps to [`Self::Unset`]
    pub fn parse(raw: &str) -> Result<Self, FlowError> {
        match raw {
            "" => Ok(NodeResponseType::Unset),
            "VIEW" => Ok(NodeResponseType::View),
            "REDIRECTION" => Ok(NodeResponseType::Redirection),
            "RETRY" => Ok(NodeResponseType::Retry),
            other => Err(FlowError::UnsupportedResponseType(other.to_string())),
        }
    }

    /// The wire string for this response type
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeResponseType::Unset => "",
            NodeResponseType::View => "VIEW",
            NodeResponseType::Redirection => "REDIRECTION",
            NodeResponseType::Retry => "RETRY",
        }
    }
}

/// Describes one input a node or executor needs from the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDescriptor {
    /// Input name, also the key the value arrives under
    pub name: String,

    /// Input kind rendered by the client ("string", "password", "otp", ...)
    #[serde(rename = "type", default = "InputDescriptor::default_type")]
    pub input_type: String,

    /// Whether the flow cannot proceed without this input
    #[serde(default)]
    pub required: bool,
}

impl InputDescriptor {
    fn default_type() -> String {
        "string".to_string()
    }

    /// A required string input
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_type: Self::default_type(),
            required: true,
        }
    }

    /// An optional string input
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_type: Self::default_type(),
            required: false,
        }
    }

    /// Override the input kind
    pub fn with_type(mut self, input_type: impl Into<String>) -> Self {
        self.input_type = input_type.into();
        self
    }
}

/// One action the user may pick on a prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Action identifier, echoed back as the request's action id
    pub id: String,

    /// Optional human-readable label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Action {
    /// An action with no label
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
        }
    }
}

/// The identity a flow has established so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Whether the user has actually authenticated
    #[serde(rename = "isAuthenticated")]
    pub is_authenticated: bool,

    /// User identifier; empty until an executor establishes one
    #[serde(rename = "userId", default)]
    pub user_id: String,

    /// Accumulated user attributes
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// What an executor (through its node) returns to the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeResponse {
    /// Outcome of the node's work
    pub status: NodeResponseStatus,

    /// How to surface an INCOMPLETE response
    #[serde(rename = "type", default)]
    pub response_type: NodeResponseType,

    /// Successor chosen by a decision node
    #[serde(rename = "nextNodeId", skip_serializing_if = "Option::is_none")]
    pub next_node_id: Option<String>,

    /// Inputs the node still needs
    #[serde(rename = "requiredData", default)]
    pub required_data: Vec<InputDescriptor>,

    /// Actions the user may pick
    #[serde(default)]
    pub actions: Vec<Action>,

    /// Redirection target for REDIRECTION responses
    #[serde(rename = "redirectUrl", skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,

    /// Extra data surfaced to the client alongside the step
    #[serde(rename = "additionalData", default)]
    pub additional_data: HashMap<String, String>,

    /// Data merged into the flow's runtime data
    #[serde(rename = "runtimeData", default)]
    pub runtime_data: HashMap<String, String>,

    /// Identity established or enriched by this node
    #[serde(rename = "authenticatedUser", skip_serializing_if = "Option::is_none")]
    pub authenticated_user: Option<AuthenticatedUser>,

    /// Proof-of-success token, surfaced on flow completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion: Option<String>,

    /// Human-readable reason for a FAILURE response
    #[serde(rename = "failureReason", skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Overall status of one engine turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowStatus {
    /// The flow concluded successfully
    #[serde(rename = "COMPLETE")]
    Complete,

    /// The flow suspended awaiting the next request
    #[default]
    #[serde(rename = "INCOMPLETE")]
    Incomplete,

    /// The flow failed; the client must start over
    #[serde(rename = "ERROR")]
    Error,
}

/// How an INCOMPLETE step should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepType {
    /// Render a prompt
    #[serde(rename = "VIEW")]
    View,

    /// Redirect the user agent
    #[serde(rename = "REDIRECTION")]
    Redirection,
}

/// Payload of a flow step: what the client needs to continue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    /// Inputs the client must collect
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputDescriptor>,

    /// Actions the client may offer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,

    /// Redirection target
    #[serde(rename = "redirectURL", skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,

    /// Extra data for the client (state parameters, hints)
    #[serde(
        rename = "additionalData",
        default,
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub additional_data: HashMap<String, String>,
}

/// The HTTP-visible summary of one engine turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowStep {
    /// Server-issued flow identifier the client echoes to resume
    #[serde(rename = "flowId")]
    pub flow_id: String,

    /// Overall turn status
    pub status: FlowStatus,

    /// Rendering hint for INCOMPLETE steps
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepType>,

    /// Step payload
    #[serde(default)]
    pub data: StepData,

    /// Proof-of-success token on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion: Option<String>,

    /// Failure reason on ERROR steps
    #[serde(rename = "failureReason", skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl FlowStep {
    /// A fresh step for the given flow, defaulting to INCOMPLETE
    pub fn for_flow(flow_id: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            ..Self::default()
        }
    }
}
