//! Which databases a user may upload files into.
//!
//! Connections reach the filter already flagged as upload-allowed by the
//! registry; the filter still re-checks the flag so that any list can be
//! passed in. Access is decided by an [`AuthorizationOracle`], typically a
//! [`UserPermissions`](crate::models::UserPermissions) snapshot.
//!
//! A connection is eligible when
//! 1. its upload flag is set,
//! 2. its engine still supports file upload, and
//! 3. the user can access the whole database, or at least one of the
//!    schemas the connection restricts uploads to.

use crate::models::{AuthorizationOracle, DatabaseConnection};

/// Filters connections down to the ones a user may upload into.
pub struct UploadEligibilityFilter<'o, O: ?Sized> {
    oracle: &'o O,
}

impl<'o, O: AuthorizationOracle + ?Sized> UploadEligibilityFilter<'o, O> {
    pub fn new(oracle: &'o O) -> Self {
        Self { oracle }
    }

    /// Whether a single connection is eligible.
    pub fn is_eligible(&self, database: &DatabaseConnection) -> bool {
        database.allow_file_upload
            && engine_allows_file_upload(database)
            && at_least_one_schema_is_allowed(database, self.oracle)
    }

    /// Keeps the eligible connections, preserving their order.
    pub fn filter<I>(&self, connections: I) -> Vec<DatabaseConnection>
    where
        I: IntoIterator<Item = DatabaseConnection>,
    {
        connections
            .into_iter()
            .filter(|database| {
                let eligible = self.is_eligible(database);
                if !eligible {
                    tracing::debug!(
                        database_id = database.id,
                        database = %database.database_name,
                        engine = %database.engine,
                        "Database not eligible for file upload"
                    );
                }
                eligible
            })
            .collect()
    }
}

/// Returns the connections eligible for upload, in input order.
pub fn eligible_databases<O>(connections: Vec<DatabaseConnection>, oracle: &O) -> Vec<DatabaseConnection>
where
    O: AuthorizationOracle + ?Sized,
{
    UploadEligibilityFilter::new(oracle).filter(connections)
}

/// Full database access, or access to one of the upload-restricted schemas.
///
/// Without full access, a connection that restricts nothing offers the user
/// no schema to upload to.
pub fn at_least_one_schema_is_allowed<O>(database: &DatabaseConnection, oracle: &O) -> bool
where
    O: AuthorizationOracle + ?Sized,
{
    if oracle.can_access_database(database) {
        return true;
    }
    let schemas = database.schema_access_for_file_upload();
    !schemas.is_empty() && !oracle.accessible_schemas(database, schemas).is_empty()
}

/// Guards against stale upload flags on engines that dropped upload support.
pub fn engine_allows_file_upload(database: &DatabaseConnection) -> bool {
    database.engine_supports_file_upload()
}

/// Whether an upload into `schema` of `database` is permitted.
///
/// A connection with restricted schemas only accepts those schemas; an
/// unrestricted one requires full database access.
pub fn schema_allows_file_upload<O>(
    database: &DatabaseConnection,
    schema: Option<&str>,
    oracle: &O,
) -> bool
where
    O: AuthorizationOracle + ?Sized,
{
    if !database.allow_file_upload {
        return false;
    }
    let allowed = database.schema_access_for_file_upload();
    if !allowed.is_empty() {
        return schema.is_some_and(|schema| allowed.contains(schema));
    }
    oracle.can_access_database(database)
}
