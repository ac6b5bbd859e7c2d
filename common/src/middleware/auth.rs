//! Remote-user authentication middleware.
//!
//! The service sits behind an authenticating reverse proxy which forwards the
//! logged-in username in `x-remote-user`. The middleware turns that header
//! into a [`CurrentUser`] request extension.

use axum::{
    body::Body,
    http::{header::HeaderName, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::errors::AppError;

/// Header carrying the authenticated username.
pub static REMOTE_USER_HEADER: HeaderName = HeaderName::from_static("x-remote-user");

/// The authenticated user of the current request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentUser {
    pub username: String,
}

impl CurrentUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

/// Rejects requests without a remote user and attaches [`CurrentUser`].
pub async fn auth_middleware(mut req: Request<Body>, next: Next) -> Response {
    match extract_remote_user(&req) {
        Some(username) => {
            let user = CurrentUser::new(username);
            tracing::debug!(user = %user.username, "authenticated request");
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        None => AppError::Unauthorized(format!("missing {} header", REMOTE_USER_HEADER))
            .into_response(),
    }
}

/// Reads a non-blank username from the remote-user header.
pub fn extract_remote_user(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(&REMOTE_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|Extension(user): Extension<CurrentUser>| async move { user.username }),
            )
            .layer(middleware::from_fn(auth_middleware))
    }

    #[tokio::test]
    async fn test_missing_user_is_rejected() {
        let response = app()
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_user_is_attached() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header("x-remote-user", " alice ")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"alice");
    }

    #[test]
    fn test_blank_header_is_ignored() {
        let req = Request::builder()
            .header("x-remote-user", "   ")
            .body(Body::empty())
            .unwrap();
        assert!(extract_remote_user(&req).is_none());
    }
}
