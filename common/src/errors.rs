//! Application error type.
//!
//! Every fallible operation returns [`AppResult`]; handlers rely on the
//! [`IntoResponse`] impl to turn errors into the standard response envelope.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::response::ApiResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced by the upload service.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("form validation failed")]
    FormValidation(#[from] ValidationErrors),

    #[error("unknown upload form: {0}")]
    FormNotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    #[error("database query error: {0}")]
    DatabaseQuery(String),

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable code carried in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::FormValidation(_) => "VALIDATION_ERROR",
            AppError::FormNotFound(_) => "FORM_NOT_FOUND",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::DatabaseConnection(_) => "DATABASE_CONNECTION_ERROR",
            AppError::DatabaseQuery(_) => "DATABASE_QUERY_ERROR",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::FormValidation(_) => StatusCode::BAD_REQUEST,
            AppError::FormNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::DatabaseConnection(_) | AppError::ExternalService(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::DatabaseQuery(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Flattens validation errors into `{field: [message, ...]}`.
///
/// Nested errors are keyed by path, e.g. `files[0].filename`.
pub fn field_messages(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    let mut out = BTreeMap::new();
    collect_messages("", errors, &mut out);
    out
}

fn collect_messages(prefix: &str, errors: &ValidationErrors, out: &mut BTreeMap<String, Vec<String>>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                let messages = errs.iter().map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                });
                out.entry(path).or_insert_with(Vec::new).extend(messages);
            }
            ValidationErrorsKind::Struct(nested) => collect_messages(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_messages(&format!("{path}[{index}]"), nested, out);
                }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }

        let body = match &self {
            AppError::FormValidation(errors) => ApiResponse::err_with_details(
                self.code(),
                self.to_string(),
                serde_json::json!({ "fields": field_messages(errors) }),
            ),
            _ => ApiResponse::err(self.code(), self.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use validator::ValidationError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::FormNotFound("pdf".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Unauthorized("missing user".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::DatabaseQuery("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_field_messages_prefer_message_over_code() {
        let mut errors = ValidationErrors::new();
        let mut with_message = ValidationError::new("regex");
        with_message.message = Some(Cow::from("Table name cannot contain a schema"));
        errors.add("table_name", with_message);
        errors.add("header", ValidationError::new("range"));

        let messages = field_messages(&errors);
        assert_eq!(
            messages["table_name"],
            vec!["Table name cannot contain a schema".to_string()]
        );
        assert_eq!(messages["header"], vec!["range".to_string()]);
    }

    #[test]
    fn test_form_validation_response_is_bad_request() {
        let mut errors = ValidationErrors::new();
        errors.add("database", ValidationError::new("choice"));
        let response = AppError::from(errors).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
