//! Database connection models.
//!
//! Connections are registered by administrators elsewhere; this crate only
//! reads them to decide where files may be uploaded.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Database engine, identified by its SQLAlchemy backend name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DbEngine {
    Postgresql,
    Mysql,
    Sqlite,
    Hive,
    Presto,
    Trino,
    /// Google Sheets. Read-only through its driver.
    Gsheets,
    /// ClickHouse (`clickhouse` or `clickhousedb` backends).
    ClickHouse,
    /// Any other backend.
    Other(String),
}

impl DbEngine {
    /// Resolves a backend name such as `postgresql` or `clickhousedb`.
    pub fn from_backend(backend: &str) -> Self {
        match backend.trim().to_lowercase().as_str() {
            "postgresql" | "postgres" => DbEngine::Postgresql,
            "mysql" => DbEngine::Mysql,
            "sqlite" => DbEngine::Sqlite,
            "hive" => DbEngine::Hive,
            "presto" => DbEngine::Presto,
            "trino" => DbEngine::Trino,
            "gsheets" => DbEngine::Gsheets,
            "clickhouse" | "clickhousedb" => DbEngine::ClickHouse,
            other => DbEngine::Other(other.to_string()),
        }
    }

    /// Resolves the engine from a SQLAlchemy URI, ignoring the driver part:
    /// `postgresql+psycopg2://u@h/db` is `postgresql`.
    pub fn from_sqlalchemy_uri(uri: &str) -> Self {
        let scheme = uri.split("://").next().unwrap_or_default();
        let backend = scheme.split('+').next().unwrap_or_default();
        Self::from_backend(backend)
    }

    /// Whether the engine's driver can ingest uploaded files.
    ///
    /// Existing Google Sheets and ClickHouse connections may still carry an
    /// upload flag from older releases; their drivers no longer accept uploads.
    pub fn supports_file_upload(&self) -> bool {
        !matches!(self, DbEngine::Gsheets | DbEngine::ClickHouse)
    }

    pub fn backend(&self) -> &str {
        match self {
            DbEngine::Postgresql => "postgresql",
            DbEngine::Mysql => "mysql",
            DbEngine::Sqlite => "sqlite",
            DbEngine::Hive => "hive",
            DbEngine::Presto => "presto",
            DbEngine::Trino => "trino",
            DbEngine::Gsheets => "gsheets",
            DbEngine::ClickHouse => "clickhouse",
            DbEngine::Other(name) => name,
        }
    }
}

impl std::fmt::Display for DbEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.backend())
    }
}

impl From<String> for DbEngine {
    fn from(value: String) -> Self {
        DbEngine::from_backend(&value)
    }
}

impl From<DbEngine> for String {
    fn from(value: DbEngine) -> Self {
        value.backend().to_string()
    }
}

/// A configured database connection as seen by the upload forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConnection {
    /// Unique connection identifier.
    pub id: i64,
    /// Display name.
    pub database_name: String,
    /// Engine behind the connection.
    pub engine: DbEngine,
    /// Whether administrators enabled file uploads for this connection.
    pub allow_file_upload: bool,
    /// Schemas uploads are restricted to; empty means unrestricted.
    #[serde(default)]
    pub schemas_allowed_for_file_upload: BTreeSet<String>,
}

/// Subset of the connection `extra` JSON document read here.
#[derive(Debug, Default, Deserialize)]
struct ConnectionExtra {
    #[serde(default)]
    schemas_allowed_for_file_upload: Option<Vec<String>>,
}

impl DatabaseConnection {
    /// Creates an upload-enabled connection without schema restrictions.
    pub fn new(id: i64, database_name: impl Into<String>, engine: DbEngine) -> Self {
        Self {
            id,
            database_name: database_name.into(),
            engine,
            allow_file_upload: true,
            schemas_allowed_for_file_upload: BTreeSet::new(),
        }
    }

    pub fn with_allow_file_upload(mut self, allow: bool) -> Self {
        self.allow_file_upload = allow;
        self
    }

    pub fn with_upload_schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemas_allowed_for_file_upload = schemas.into_iter().map(Into::into).collect();
        self
    }

    /// Engine-capability flag: the driver still supports file ingestion.
    pub fn engine_supports_file_upload(&self) -> bool {
        self.engine.supports_file_upload()
    }

    /// Schemas this connection restricts uploads to.
    pub fn schema_access_for_file_upload(&self) -> &BTreeSet<String> {
        &self.schemas_allowed_for_file_upload
    }

    /// Reads `schemas_allowed_for_file_upload` out of a connection's `extra`
    /// JSON. Missing, null or malformed documents yield no restriction.
    pub fn upload_schemas_from_extra(database_name: &str, extra: Option<&str>) -> BTreeSet<String> {
        let Some(raw) = extra.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return BTreeSet::new();
        };
        match serde_json::from_str::<ConnectionExtra>(raw) {
            Ok(extra) => extra
                .schemas_allowed_for_file_upload
                .unwrap_or_default()
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(e) => {
                tracing::warn!(database = %database_name, error = %e, "Ignoring malformed connection extra");
                BTreeSet::new()
            }
        }
    }
}

/// Option of the database selection control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DatabaseChoice {
    /// Connection identifier submitted by the form.
    pub id: i64,
    /// Connection display name.
    pub label: String,
}

impl From<&DatabaseConnection> for DatabaseChoice {
    fn from(db: &DatabaseConnection) -> Self {
        Self {
            id: db.id,
            label: db.database_name.clone(),
        }
    }
}
