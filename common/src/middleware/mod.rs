//! Middleware shared by the upload routes.

pub mod auth;
pub mod request_id;

pub use auth::{auth_middleware, CurrentUser, REMOTE_USER_HEADER};
pub use request_id::{request_id_middleware, RequestId, REQUEST_ID_HEADER};
