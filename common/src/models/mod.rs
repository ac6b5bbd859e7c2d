//! Shared data models.

pub mod database;
pub mod permission;

pub use database::{DatabaseChoice, DatabaseConnection, DbEngine};
pub use permission::{AuthorizationOracle, DatasourceGrant, SchemaGrant, UserPermissions};
