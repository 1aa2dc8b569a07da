//! PostgreSQL flow context store
//!
//! Persists each flow as one row in `flow_context` (metadata) and one in
//! `flow_user_data` (identity and inputs), both scoped by deployment id.
//! All writes are transactional; a failure rolls both rows back.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::Transaction;

use super::{
    deserialize_map, serialize_map, FlowContextRecord, FlowContextStore, StoreError,
};
use crate::config::DatabaseConfig;

/// PostgreSQL-backed context store
pub struct PostgresContextStore {
    pool: PgPool,
    deployment_id: String,
}

impl PostgresContextStore {
    /// Connect and bootstrap the schema
    pub async fn new(
        config: &DatabaseConfig,
        deployment_id: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        let store = Self {
            pool,
            deployment_id: deployment_id.into(),
        };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Create the context tables if they do not exist
    pub async fn initialize_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flow_context (
                deployment_id VARCHAR(64) NOT NULL,
                flow_id VARCHAR(36) NOT NULL,
                app_id VARCHAR(255) NOT NULL,
                current_node_id VARCHAR(255),
                current_action_id VARCHAR(255),
                graph_id VARCHAR(255) NOT NULL,
                runtime_data TEXT,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (deployment_id, flow_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flow_user_data (
                deployment_id VARCHAR(64) NOT NULL,
                flow_id VARCHAR(36) NOT NULL,
                is_authenticated BOOLEAN NOT NULL DEFAULT FALSE,
                user_id VARCHAR(255),
                user_inputs TEXT,
                user_attributes TEXT,
                PRIMARY KEY (deployment_id, flow_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_flow_context_updated_at
                ON flow_context (deployment_id, updated_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_rows(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &FlowContextRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO flow_context
                (deployment_id, flow_id, app_id, current_node_id, current_action_id,
                 graph_id, runtime_data, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            "#,
        )
        .bind(&self.deployment_id)
        .bind(&record.flow_id)
        .bind(&record.app_id)
        .bind(&record.current_node_id)
        .bind(&record.current_action_id)
        .bind(&record.graph_id)
        .bind(serialize_map(&record.runtime_data)?)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO flow_user_data
                (deployment_id, flow_id, is_authenticated, user_id, user_inputs, user_attributes)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&self.deployment_id)
        .bind(&record.flow_id)
        .bind(record.is_authenticated)
        .bind(&record.user_id)
        .bind(serialize_map(&record.user_inputs)?)
        .bind(serialize_map(&record.user_attributes)?)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn update_rows(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &FlowContextRecord,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE flow_context
               SET app_id = $3, current_node_id = $4, current_action_id = $5,
                   graph_id = $6, runtime_data = $7, updated_at = NOW()
             WHERE deployment_id = $1 AND flow_id = $2
            "#,
        )
        .bind(&self.deployment_id)
        .bind(&record.flow_id)
        .bind(&record.app_id)
        .bind(&record.current_node_id)
        .bind(&record.current_action_id)
        .bind(&record.graph_id)
        .bind(serialize_map(&record.runtime_data)?)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(record.flow_id.clone()));
        }

        sqlx::query(
            r#"
            UPDATE flow_user_data
               SET is_authenticated = $3, user_id = $4, user_inputs = $5, user_attributes = $6
             WHERE deployment_id = $1 AND flow_id = $2
            "#,
        )
        .bind(&self.deployment_id)
        .bind(&record.flow_id)
        .bind(record.is_authenticated)
        .bind(&record.user_id)
        .bind(serialize_map(&record.user_inputs)?)
        .bind(serialize_map(&record.user_attributes)?)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn rollback(tx: Transaction<'_, Postgres>) -> Result<(), StoreError> {
        tx.rollback().await.map_err(StoreError::Rollback)
    }
}

#[async_trait]
impl FlowContextStore for PostgresContextStore {
    async fn store(&self, record: &FlowContextRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        match self.insert_rows(&mut tx, record).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                Self::rollback(tx).await?;
                Err(e)
            }
        }
    }

    async fn get(&self, flow_id: &str) -> Result<Option<FlowContextRecord>, StoreError> {
        type Row = (
            String,
            Option<String>,
            Option<String>,
            String,
            Option<String>,
            Option<bool>,
            Option<String>,
            Option<String>,
            Option<String>,
        );

        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT c.app_id, c.current_node_id, c.current_action_id, c.graph_id,
                   c.runtime_data, u.is_authenticated, u.user_id, u.user_inputs,
                   u.user_attributes
              FROM flow_context c
              LEFT JOIN flow_user_data u
                ON u.deployment_id = c.deployment_id AND u.flow_id = c.flow_id
             WHERE c.deployment_id = $1 AND c.flow_id = $2
            "#,
        )
        .bind(&self.deployment_id)
        .bind(flow_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.len() > 1 {
            return Err(StoreError::UnexpectedResultCount(flow_id.to_string()));
        }

        let Some((
            app_id,
            current_node_id,
            current_action_id,
            graph_id,
            runtime_data,
            is_authenticated,
            user_id,
            user_inputs,
            user_attributes,
        )) = rows.into_iter().next()
        else {
            return Ok(None);
        };

        Ok(Some(FlowContextRecord {
            flow_id: flow_id.to_string(),
            app_id,
            graph_id,
            current_node_id,
            current_action_id,
            runtime_data: deserialize_map(runtime_data.as_deref())?,
            is_authenticated: is_authenticated.unwrap_or(false),
            user_id,
            user_inputs: deserialize_map(user_inputs.as_deref())?,
            user_attributes: deserialize_map(user_attributes.as_deref())?,
        }))
    }

    async fn update(&self, record: &FlowContextRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        match self.update_rows(&mut tx, record).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                Self::rollback(tx).await?;
                Err(e)
            }
        }
    }

    async fn delete(&self, flow_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = async {
            sqlx::query(
                "DELETE FROM flow_user_data WHERE deployment_id = $1 AND flow_id = $2",
            )
            .bind(&self.deployment_id)
            .bind(flow_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM flow_context WHERE deployment_id = $1 AND flow_id = $2")
                .bind(&self.deployment_id)
                .bind(flow_id)
                .execute(&mut *tx)
                .await?;

            Ok::<(), StoreError>(())
        }
        .await;

        match result {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                Self::rollback(tx).await?;
                Err(e)
            }
        }
    }

    async fn delete_older_than(&self, max_age: Duration) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(max_age.as_secs() as i64);
        let mut tx = self.pool.begin().await?;

        let result = async {
            sqlx::query(
                r#"
                DELETE FROM flow_user_data
                 WHERE deployment_id = $1
                   AND flow_id IN (SELECT flow_id FROM flow_context
                                    WHERE deployment_id = $1 AND updated_at < $2)
                "#,
            )
            .bind(&self.deployment_id)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

            let deleted = sqlx::query(
                "DELETE FROM flow_context WHERE deployment_id = $1 AND updated_at < $2",
            )
            .bind(&self.deployment_id)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

            Ok::<u64, StoreError>(deleted.rows_affected())
        }
        .await;

        match result {
            Ok(deleted) => {
                tx.commit().await?;
                Ok(deleted)
            }
            Err(e) => {
                Self::rollback(tx).await?;
                Err(e)
            }
        }
    }
}
