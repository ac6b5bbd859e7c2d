//! User permission snapshots and the authorization queries run against them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::database::DatabaseConnection;

/// Read-only authorization queries needed by the upload forms.
pub trait AuthorizationOracle {
    /// Whether the user has full access to the database.
    fn can_access_database(&self, database: &DatabaseConnection) -> bool;

    /// The subset of `schemas` the user may access on `database`.
    fn accessible_schemas(
        &self,
        database: &DatabaseConnection,
        schemas: &BTreeSet<String>,
    ) -> BTreeSet<String>;
}

/// No answer from the authorization layer means no access.
impl<O: AuthorizationOracle> AuthorizationOracle for Option<O> {
    fn can_access_database(&self, database: &DatabaseConnection) -> bool {
        self.as_ref()
            .is_some_and(|oracle| oracle.can_access_database(database))
    }

    fn accessible_schemas(
        &self,
        database: &DatabaseConnection,
        schemas: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        match self {
            Some(oracle) => oracle.accessible_schemas(database, schemas),
            None => BTreeSet::new(),
        }
    }
}

impl<O: AuthorizationOracle + ?Sized> AuthorizationOracle for &O {
    fn can_access_database(&self, database: &DatabaseConnection) -> bool {
        (**self).can_access_database(database)
    }

    fn accessible_schemas(
        &self,
        database: &DatabaseConnection,
        schemas: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        (**self).accessible_schemas(database, schemas)
    }
}

/// Access to one schema of one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaGrant {
    pub database: String,
    pub schema: String,
}

/// Access to one table; its schema, when known, counts as accessible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceGrant {
    pub database: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
}

/// Permissions held by a single user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermissions {
    #[serde(default)]
    pub username: String,
    /// Access to every database.
    #[serde(default)]
    pub all_database_access: bool,
    /// Access to every datasource, which implies every database.
    #[serde(default)]
    pub all_datasource_access: bool,
    /// Names of databases the user fully accesses.
    #[serde(default)]
    pub database_access: BTreeSet<String>,
    #[serde(default)]
    pub schema_access: Vec<SchemaGrant>,
    #[serde(default)]
    pub datasource_access: Vec<DatasourceGrant>,
}

impl UserPermissions {
    /// A snapshot granting nothing.
    pub fn none(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    fn granted_schemas<'a>(&'a self, database: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let schemas = self
            .schema_access
            .iter()
            .filter(move |grant| grant.database == database)
            .map(|grant| grant.schema.as_str());
        let datasource_schemas = self
            .datasource_access
            .iter()
            .filter(move |grant| grant.database == database)
            .filter_map(|grant| grant.schema.as_deref());
        schemas.chain(datasource_schemas)
    }
}

impl AuthorizationOracle for UserPermissions {
    fn can_access_database(&self, database: &DatabaseConnection) -> bool {
        self.all_datasource_access
            || self.all_database_access
            || self.database_access.contains(&database.database_name)
    }

    fn accessible_schemas(
        &self,
        database: &DatabaseConnection,
        schemas: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        if self.can_access_database(database) {
            return schemas.clone();
        }
        self.granted_schemas(&database.database_name)
            .filter(|schema| schemas.contains(*schema))
            .map(str::to_string)
            .collect()
    }
}
