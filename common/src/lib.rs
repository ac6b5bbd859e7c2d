//! Shared building blocks for the file-upload service.
//!
//! - `config`: explicit configuration loaded once at startup
//! - `errors` / `response`: error type and the API response envelope
//! - `middleware`: request id and remote-user authentication
//! - `models`: database connections and user permission snapshots
//! - `eligibility`: which databases a user may upload files into
//! - `forms`: the static upload form catalog and submission validation

pub mod config;
pub mod eligibility;
pub mod errors;
pub mod forms;
pub mod middleware;
pub mod models;
pub mod response;

pub use errors::{AppError, AppResult};
