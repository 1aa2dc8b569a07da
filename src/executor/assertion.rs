//! Assertion executor
//!
//! Issues the flow's completion assertion: an HS256-signed JWT naming the
//! authenticated user as subject and the application as audience.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::{Executor, ExecutorConfig, ExecutorError, ExecutorResponse};
use crate::config::AssertionConfig;
use crate::engine::context::NodeContext;
use crate::flow::NodeResponseStatus;

/// Registry name of the assertion executor
pub const NAME: &str = "assertion";

/// Claims carried by an issued assertion
#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Issuer, from server configuration
    pub iss: String,

    /// Subject: the authenticated user id
    pub sub: String,

    /// Audience: the application id the flow ran for
    pub aud: String,

    /// Issued-at, seconds since epoch
    pub iat: i64,

    /// Expiry, seconds since epoch
    pub exp: i64,
}

/// Issues a signed assertion for the flow's authenticated user
#[derive(Debug)]
pub struct JwtAssertExecutor {
    properties: HashMap<String, String>,
    config: AssertionConfig,
}

impl JwtAssertExecutor {
    /// Build from a node's executor config and the server assertion config
    pub fn new(executor_config: ExecutorConfig, config: AssertionConfig) -> Self {
        Self {
            properties: executor_config.properties,
            config,
        }
    }
}

#[async_trait]
impl Executor for JwtAssertExecutor {
    fn name(&self) -> &str {
        NAME
    }

    fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<ExecutorResponse, ExecutorError> {
        let user = &ctx.authenticated_user;
        if !user.is_authenticated || user.user_id.is_empty() {
            return Ok(ExecutorResponse::failure("no authenticated user to assert"));
        }

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: self.config.issuer.clone(),
            sub: user.user_id.clone(),
            aud: ctx.app_id.clone(),
            iat: now,
            exp: now + self.config.validity_secs as i64,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.signing_key.as_bytes()),
        )
        .map_err(|e| ExecutorError::Internal(anyhow::Error::new(e)))?;

        Ok(ExecutorResponse {
            status: NodeResponseStatus::Complete,
            assertion: Some(token),
            ..ExecutorResponse::default()
        })
    }
}
