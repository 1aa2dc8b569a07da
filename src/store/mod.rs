//! Flow context persistence
//!
//! A suspended flow survives between HTTP turns as two logical rows: flow
//! metadata (graph position, runtime data) and user data (identity,
//! inputs, attributes). The rows are written, updated, and deleted
//! together; partial states are never observable after commit.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod postgres;
pub mod sweeper;

pub use memory::InMemoryContextStore;
pub use postgres::PostgresContextStore;
pub use sweeper::ContextSweeper;

use crate::engine::EngineContext;

/// Errors raised by flow context stores
#[derive(Error, Debug)]
pub enum StoreError {
    /// Update targeted a flow that is not persisted
    #[error("flow context not found: {0}")]
    NotFound(String),

    /// A lookup matched more than one row
    #[error("unexpected number of results for flow {0}")]
    UnexpectedResultCount(String),

    /// Context maps failed to serialize or deserialize
    #[error("failed to serialize flow context: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying database failure
    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),

    /// A failed transaction could not be rolled back
    #[error("failed to rollback transaction: {0}")]
    Rollback(#[source] sqlx::Error),
}

/// The persisted snapshot of an [`EngineContext`]
///
/// Holds ids only: the graph and current node are rehydrated from the
/// graph registry when the flow resumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowContextRecord {
    /// Flow identifier
    pub flow_id: String,

    /// Application identifier
    pub app_id: String,

    /// Graph the flow is executing
    pub graph_id: String,

    /// Node the flow is suspended at
    pub current_node_id: Option<String>,

    /// Action selected on the suspended turn, if any
    pub current_action_id: Option<String>,

    /// Accumulated runtime data
    pub runtime_data: HashMap<String, String>,

    /// Whether the flow's user has authenticated
    pub is_authenticated: bool,

    /// Established user id, if any
    pub user_id: Option<String>,

    /// Latest user inputs
    pub user_inputs: HashMap<String, String>,

    /// Accumulated user attributes
    pub user_attributes: HashMap<String, String>,
}

impl FlowContextRecord {
    /// Snapshot an engine context for persistence
    pub fn from_context(ctx: &EngineContext) -> Self {
        Self {
            flow_id: ctx.flow_id.clone(),
            app_id: ctx.app_id.clone(),
            graph_id: ctx
                .graph
                .as_ref()
                .map(|g| g.id().to_string())
                .unwrap_or_default(),
            current_node_id: ctx.current_node.as_ref().map(|n| n.id().to_string()),
            current_action_id: ctx.current_action_id.clone(),
            runtime_data: ctx.runtime_data.clone(),
            is_authenticated: ctx.authenticated_user.is_authenticated,
            user_id: if ctx.authenticated_user.user_id.is_empty() {
                None
            } else {
                Some(ctx.authenticated_user.user_id.clone())
            },
            user_inputs: ctx.user_input_data.clone(),
            user_attributes: ctx.authenticated_user.attributes.clone(),
        }
    }
}

/// Transactional storage for suspended flow contexts
#[async_trait]
pub trait FlowContextStore: Send + Sync {
    /// Persist a new flow context (both rows, one transaction)
    async fn store(&self, record: &FlowContextRecord) -> Result<(), StoreError>;

    /// Load a flow context; `None` when the flow id is unknown
    async fn get(&self, flow_id: &str) -> Result<Option<FlowContextRecord>, StoreError>;

    /// Update an existing flow context (both rows, one transaction)
    async fn update(&self, record: &FlowContextRecord) -> Result<(), StoreError>;

    /// Delete a flow context; deleting an absent flow is not an error
    async fn delete(&self, flow_id: &str) -> Result<(), StoreError>;

    /// Evict contexts untouched for longer than `max_age`; returns the
    /// number of flows removed
    async fn delete_older_than(&self, max_age: Duration) -> Result<u64, StoreError>;
}

/// Serialize a context map as canonical (sorted-key) JSON text
///
/// Empty maps serialize to `None` so the column holds NULL at rest.
pub fn serialize_map(map: &HashMap<String, String>) -> Result<Option<String>, StoreError> {
    if map.is_empty() {
        return Ok(None);
    }
    let ordered: BTreeMap<&str, &str> = map.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    Ok(Some(serde_json::to_string(&ordered)?))
}

/// Deserialize a context map column; NULL and empty both mean empty
pub fn deserialize_map(text: Option<&str>) -> Result<HashMap<String, String>, StoreError> {
    match text {
        None => Ok(HashMap::new()),
        Some(t) if t.is_empty() || t == "null" => Ok(HashMap::new()),
        Some(t) => Ok(serde_json::from_str(t)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowType;

    #[test]
    fn test_serialize_map_is_canonical() {
        let mut map = HashMap::new();
        map.insert("zeta".to_string(), "1".to_string());
        map.insert("alpha".to_string(), "2".to_string());

        let text = serialize_map(&map).unwrap().unwrap();
        assert_eq!(text, r#"{"alpha":"2","zeta":"1"}"#);
    }

    #[test]
    fn test_serialize_empty_map_is_null() {
        assert_eq!(serialize_map(&HashMap::new()).unwrap(), None);
    }

    #[test]
    fn test_deserialize_round_trip() {
        let mut map = HashMap::new();
        map.insert("userID".to_string(), "u-1".to_string());

        let text = serialize_map(&map).unwrap();
        let restored = deserialize_map(text.as_deref()).unwrap();
        assert_eq!(restored, map);
    }

    #[test]
    fn test_record_from_context() {
        let mut ctx = EngineContext::new("flow-1", "app-1", FlowType::Authentication);
        ctx.authenticated_user.is_authenticated = true;
        ctx.authenticated_user.user_id = "u-1".to_string();
        ctx.runtime_data
            .insert("step".to_string(), "one".to_string());

        let record = FlowContextRecord::from_context(&ctx);
        assert_eq!(record.flow_id, "flow-1");
        assert_eq!(record.user_id.as_deref(), Some("u-1"));
        assert!(record.is_authenticated);
        assert!(record.current_node_id.is_none());
        assert!(record.graph_id.is_empty());
    }
}
