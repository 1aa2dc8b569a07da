//! Attribute collection executor
//!
//! Prompts the user for whatever required inputs are still missing, then
//! completes, copying the collected values into runtime data and onto the
//! flow's user attributes.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{Executor, ExecutorConfig, ExecutorError, ExecutorResponse};
use crate::engine::context::NodeContext;
use crate::flow::{InputDescriptor, NodeResponseStatus};

/// Registry name of the attribute collection executor
pub const NAME: &str = "attribute_collector";

/// Collects user attributes declared on the node schema or in the
/// executor's `attributes` property (comma-separated input names)
#[derive(Debug)]
pub struct AttributeCollectExecutor {
    properties: HashMap<String, String>,
    default_inputs: Vec<InputDescriptor>,
}

impl AttributeCollectExecutor {
    /// Build from a node's executor config
    pub fn from_config(config: &ExecutorConfig) -> Self {
        let default_inputs = config
            .properties
            .get("attributes")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(InputDescriptor::required)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            properties: config.properties.clone(),
            default_inputs,
        }
    }
}

#[async_trait]
impl Executor for AttributeCollectExecutor {
    fn name(&self) -> &str {
        NAME
    }

    fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    fn default_inputs(&self) -> &[InputDescriptor] {
        &self.default_inputs
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<ExecutorResponse, ExecutorError> {
        let missing = self.missing_inputs(ctx);
        if !missing.is_empty() {
            return Ok(ExecutorResponse::prompt(missing));
        }

        let mut collected = HashMap::new();
        for descriptor in self.required_data(ctx) {
            if let Some(value) = ctx.user_input_data.get(&descriptor.name) {
                collected.insert(descriptor.name.clone(), value.clone());
            }
        }

        let mut user = ctx.authenticated_user.clone();
        user.attributes.extend(collected.clone());

        Ok(ExecutorResponse {
            status: NodeResponseStatus::Complete,
            runtime_data: collected,
            authenticated_user: Some(user),
            ..ExecutorResponse::default()
        })
    }
}
