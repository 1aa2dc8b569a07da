//! PostgreSQL application store
//!
//! Applications persist as a row in `application` plus an optional row in
//! `app_oauth_inbound_config`, both scoped by deployment id and written
//! together in one transaction.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::Transaction;

use super::{Application, InboundOAuthConfig};
use crate::config::DatabaseConfig;
use crate::resource::{Resource, ResourceStore, ResourceStoreError};

/// PostgreSQL-backed mutable application store
pub struct PostgresApplicationStore {
    pool: PgPool,
    deployment_id: String,
}

type AppRow = (
    String,         // app_id
    String,         // name
    Option<String>, // description
    Option<String>, // auth_flow_graph_id
    Option<String>, // registration_flow_graph_id
    bool,           // is_registration_flow_enabled
    Option<String>, // client_id
    Option<String>, // redirect_uris
    Option<String>, // grant_types
);

const SELECT_JOINED: &str = r#"
    SELECT a.app_id, a.name, a.description, a.auth_flow_graph_id,
           a.registration_flow_graph_id, a.is_registration_flow_enabled,
           o.client_id, o.redirect_uris, o.grant_types
      FROM application a
      LEFT JOIN app_oauth_inbound_config o
        ON o.deployment_id = a.deployment_id AND o.app_id = a.app_id
"#;

impl PostgresApplicationStore {
    /// Connect and bootstrap the schema
    pub async fn new(
        config: &DatabaseConfig,
        deployment_id: impl Into<String>,
    ) -> Result<Self, ResourceStoreError> {
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

    /// Create the application tables if they do not exist
    pub async fn initialize_schema(&self) -> Result<(), ResourceStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS application (
                deployment_id VARCHAR(64) NOT NULL,
                app_id VARCHAR(255) NOT NULL,
                name VARCHAR(255) NOT NULL,
                description TEXT,
                auth_flow_graph_id VARCHAR(255),
                registration_flow_graph_id VARCHAR(255),
                is_registration_flow_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                PRIMARY KEY (deployment_id, app_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS app_oauth_inbound_config (
                deployment_id VARCHAR(64) NOT NULL,
                app_id VARCHAR(255) NOT NULL,
                client_id VARCHAR(255) NOT NULL,
                redirect_uris TEXT,
                grant_types TEXT,
                PRIMARY KEY (deployment_id, app_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_application(row: AppRow) -> Result<Application, ResourceStoreError> {
        let (
            app_id,
            name,
            description,
            auth_flow_graph_id,
            registration_flow_graph_id,
            is_registration_flow_enabled,
            client_id,
            redirect_uris,
            grant_types,
        ) = row;

        let inbound_oauth = match client_id {
            None => None,
            Some(client_id) => Some(InboundOAuthConfig {
                client_id,
                redirect_uris: match redirect_uris.as_deref() {
                    None | Some("") => Vec::new(),
                    Some(text) => serde_json::from_str(text)?,
                },
                grant_types: match grant_types.as_deref() {
                    None | Some("") => Vec::new(),
                    Some(text) => serde_json::from_str(text)?,
                },
            }),
        };

        let mut app = Application::new(app_id, name);
        app.description = description;
        app.auth_flow_graph_id = auth_flow_graph_id;
        app.registration_flow_graph_id = registration_flow_graph_id;
        app.is_registration_flow_enabled = is_registration_flow_enabled;
        app.inbound_oauth = inbound_oauth;
        app.set_read_only(false);
        Ok(app)
    }

    async fn insert_rows(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        app: &Application,
    ) -> Result<(), ResourceStoreError> {
        sqlx::query(
            r#"
            INSERT INTO application
                (deployment_id, app_id, name, description, auth_flow_graph_id,
                 registration_flow_graph_id, is_registration_flow_enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&self.deployment_id)
        .bind(&app.id)
        .bind(&app.name)
        .bind(&app.description)
        .bind(&app.auth_flow_graph_id)
        .bind(&app.registration_flow_graph_id)
        .bind(app.is_registration_flow_enabled)
        .execute(&mut **tx)
        .await?;

        if let Some(oauth) = &app.inbound_oauth {
            sqlx::query(
                r#"
                INSERT INTO app_oauth_inbound_config
                    (deployment_id, app_id, client_id, redirect_uris, grant_types)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&self.deployment_id)
            .bind(&app.id)
            .bind(&oauth.client_id)
            .bind(serde_json::to_string(&oauth.redirect_uris)?)
            .bind(serde_json::to_string(&oauth.grant_types)?)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    async fn rollback(tx: Transaction<'_, Postgres>) -> Result<(), ResourceStoreError> {
        tx.rollback().await.map_err(ResourceStoreError::Rollback)
    }
}

#[async_trait]
impl ResourceStore<Application> for PostgresApplicationStore {
    async fn create(&self, mut app: Application) -> Result<Application, ResourceStoreError> {
        if self.exists_by_id(&app.id).await? {
            return Err(ResourceStoreError::AlreadyExists(app.id.clone()));
        }

        let mut tx = self.pool.begin().await?;
        match self.insert_rows(&mut tx, &app).await {
            Ok(()) => {
                tx.commit().await?;
                app.set_read_only(false);
                Ok(app)
            }
            Err(e) => {
                Self::rollback(tx).await?;
                Err(e)
            }
        }
    }

    async fn update(&self, mut app: Application) -> Result<Application, ResourceStoreError> {
        let mut tx = self.pool.begin().await?;

        let result = async {
            let updated = sqlx::query(
                r#"
                UPDATE application
                   SET name = $3, description = $4, auth_flow_graph_id = $5,
                       registration_flow_graph_id = $6, is_registration_flow_enabled = $7
                 WHERE deployment_id = $1 AND app_id = $2
                "#,
            )
            .bind(&self.deployment_id)
            .bind(&app.id)
            .bind(&app.name)
            .bind(&app.description)
            .bind(&app.auth_flow_graph_id)
            .bind(&app.registration_flow_graph_id)
            .bind(app.is_registration_flow_enabled)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(ResourceStoreError::NotFound(app.id.clone()));
            }

            // Replace the OAuth row wholesale; absent config deletes it.
            sqlx::query(
                "DELETE FROM app_oauth_inbound_config WHERE deployment_id = $1 AND app_id = $2",
            )
            .bind(&self.deployment_id)
            .bind(&app.id)
            .execute(&mut *tx)
            .await?;

            if let Some(oauth) = &app.inbound_oauth {
                sqlx::query(
                    r#"
                    INSERT INTO app_oauth_inbound_config
                        (deployment_id, app_id, client_id, redirect_uris, grant_types)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(&self.deployment_id)
                .bind(&app.id)
                .bind(&oauth.client_id)
                .bind(serde_json::to_string(&oauth.redirect_uris)?)
                .bind(serde_json::to_string(&oauth.grant_types)?)
                .execute(&mut *tx)
                .await?;
            }

            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                tx.commit().await?;
                app.set_read_only(false);
                Ok(app)
            }
            Err(e) => {
                Self::rollback(tx).await?;
                Err(e)
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<(), ResourceStoreError> {
        let mut tx = self.pool.begin().await?;

        let result = async {
            sqlx::query(
                "DELETE FROM app_oauth_inbound_config WHERE deployment_id = $1 AND app_id = $2",
            )
            .bind(&self.deployment_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            let deleted =
                sqlx::query("DELETE FROM application WHERE deployment_id = $1 AND app_id = $2")
                    .bind(&self.deployment_id)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;

            if deleted.rows_affected() == 0 {
                return Err(ResourceStoreError::NotFound(id.to_string()));
            }
            Ok(())
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

    async fn get_by_id(&self, id: &str) -> Result<Option<Application>, ResourceStoreError> {
        let query = format!("{SELECT_JOINED} WHERE a.deployment_id = $1 AND a.app_id = $2");
        let row: Option<AppRow> = sqlx::query_as(&query)
            .bind(&self.deployment_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_application).transpose()
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Application>, ResourceStoreError> {
        let query = format!("{SELECT_JOINED} WHERE a.deployment_id = $1 AND a.name = $2");
        let row: Option<AppRow> = sqlx::query_as(&query)
            .bind(&self.deployment_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_application).transpose()
    }

    async fn get_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<Application>, ResourceStoreError> {
        let query = format!("{SELECT_JOINED} WHERE a.deployment_id = $1 AND o.client_id = $2");
        let row: Option<AppRow> = sqlx::query_as(&query)
            .bind(&self.deployment_id)
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_application).transpose()
    }

    async fn exists_by_id(&self, id: &str) -> Result<bool, ResourceStoreError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM application WHERE deployment_id = $1 AND app_id = $2)",
        )
        .bind(&self.deployment_id)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn exists_by_name(&self, name: &str) -> Result<bool, ResourceStoreError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM application WHERE deployment_id = $1 AND name = $2)",
        )
        .bind(&self.deployment_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list(&self) -> Result<Vec<Application>, ResourceStoreError> {
        let query = format!("{SELECT_JOINED} WHERE a.deployment_id = $1 ORDER BY a.app_id");
        let rows: Vec<AppRow> = sqlx::query_as(&query)
            .bind(&self.deployment_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_application).collect()
    }

    async fn count(&self) -> Result<usize, ResourceStoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM application WHERE deployment_id = $1")
                .bind(&self.deployment_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }
}
