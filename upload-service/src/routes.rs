//! 上传服务路由模块

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use common::middleware::auth_middleware;

use crate::handlers;
use crate::state::AppState;

/// 创建上传路由
pub fn router() -> Router<AppState> {
    let upload = Router::new()
        .route("/api/upload/databases", get(handlers::list_databases))
        .route("/api/upload/forms", get(handlers::list_forms))
        .route("/api/upload/forms/{kind}", get(handlers::get_form))
        .route(
            "/api/upload/forms/{kind}/validate",
            post(handlers::validate_form),
        )
        .route_layer(middleware::from_fn(auth_middleware));

    Router::new()
        .merge(upload)
        .route("/api/health", get(handlers::health_check))
}
