//! Database connection registry.
//!
//! Read-only view over the connections administrators registered. Only
//! connections with the upload flag set are returned.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::{DatabaseConnection, DbEngine};

/// Source of the configured database connections.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Connections whose upload flag is set, in display order.
    async fn upload_allowed(&self) -> AppResult<Vec<DatabaseConnection>>;
}

/// Row from the `dbs` metadata table.
#[derive(sqlx::FromRow)]
struct DatabaseRow {
    id: i64,
    database_name: String,
    sqlalchemy_uri: String,
    extra: Option<String>,
}

impl DatabaseRow {
    fn into_connection(self) -> DatabaseConnection {
        let schemas =
            DatabaseConnection::upload_schemas_from_extra(&self.database_name, self.extra.as_deref());
        DatabaseConnection {
            id: self.id,
            engine: DbEngine::from_sqlalchemy_uri(&self.sqlalchemy_uri),
            database_name: self.database_name,
            allow_file_upload: true,
            schemas_allowed_for_file_upload: schemas,
        }
    }
}

/// Registry backed by the metadata database (MySQL or SQLite).
pub struct SqlConnectionRegistry {
    pool: AnyPool,
}

impl SqlConnectionRegistry {
    /// Connects to the metadata database.
    pub async fn connect(config: &AppConfig, url: &str) -> AppResult<Self> {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;
        tracing::info!(max_connections = config.max_connections, "Metadata database connected");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionRegistry for SqlConnectionRegistry {
    async fn upload_allowed(&self) -> AppResult<Vec<DatabaseConnection>> {
        let rows = sqlx::query_as::<_, DatabaseRow>(
            "SELECT id, database_name, sqlalchemy_uri, extra FROM dbs \
             WHERE allow_file_upload = 1 ORDER BY database_name, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseQuery(format!("Failed to list upload databases: {}", e)))?;

        tracing::debug!(count = rows.len(), "Loaded upload-enabled databases");
        Ok(rows.into_iter().map(DatabaseRow::into_connection).collect())
    }
}

/// Registry over a fixed list of connections.
#[derive(Default)]
pub struct InMemoryConnectionRegistry {
    connections: Vec<DatabaseConnection>,
}

impl InMemoryConnectionRegistry {
    pub fn new(connections: Vec<DatabaseConnection>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryConnectionRegistry {
    async fn upload_allowed(&self) -> AppResult<Vec<DatabaseConnection>> {
        Ok(self
            .connections
            .iter()
            .filter(|db| db.allow_file_upload)
            .cloned()
            .collect())
    }
}
