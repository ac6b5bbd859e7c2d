//! Handler模块

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use common::errors::AppError;
use common::forms::{FormKind, FormSubmission, FormSummary, FormView, ValidatedUpload};
use common::middleware::{CurrentUser, RequestId};
use common::models::DatabaseChoice;
use common::response::ApiResponse;

use crate::state::AppState;
use crate::SERVICE_NAME;

fn envelope<T: Serialize>(data: T, request_id: Option<Extension<RequestId>>) -> Json<ApiResponse<T>> {
    let response = ApiResponse::ok_with_service(data, SERVICE_NAME);
    Json(match request_id {
        Some(Extension(id)) => response.with_request_id(id.0),
        None => response,
    })
}

/// 当前用户可上传的数据库
#[utoipa::path(
    get,
    path = "/api/upload/databases",
    tag = "upload",
    responses(
        (status = 200, description = "可上传数据库列表", body = ApiResponse<Vec<DatabaseChoice>>),
        (status = 401, description = "未认证")
    )
)]
pub async fn list_databases(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    request_id: Option<Extension<RequestId>>,
) -> Result<Json<ApiResponse<Vec<DatabaseChoice>>>, AppError> {
    let data = state.service.database_choices(&user).await?;
    Ok(envelope(data, request_id))
}

/// 上传表单列表
#[utoipa::path(
    get,
    path = "/api/upload/forms",
    tag = "upload",
    responses(
        (status = 200, description = "表单列表", body = ApiResponse<Vec<FormSummary>>),
        (status = 401, description = "未认证")
    )
)]
pub async fn list_forms(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
) -> Json<ApiResponse<Vec<FormSummary>>> {
    envelope(state.service.forms(), request_id)
}

/// 获取表单定义（含当前用户的数据库选项）
#[utoipa::path(
    get,
    path = "/api/upload/forms/{kind}",
    tag = "upload",
    params(
        ("kind" = String, Path, description = "表单类型：csv / excel / columnar")
    ),
    responses(
        (status = 200, description = "表单定义"),
        (status = 401, description = "未认证"),
        (status = 404, description = "表单不存在")
    )
)]
pub async fn get_form(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Extension(user): Extension<CurrentUser>,
    request_id: Option<Extension<RequestId>>,
) -> Result<Json<ApiResponse<FormView>>, AppError> {
    let kind: FormKind = kind.parse()?;
    let data = state.service.form_view(kind, &user).await?;
    Ok(envelope(data, request_id))
}

/// 校验表单提交
#[utoipa::path(
    post,
    path = "/api/upload/forms/{kind}/validate",
    tag = "upload",
    params(
        ("kind" = String, Path, description = "表单类型：csv / excel / columnar")
    ),
    request_body = FormSubmission,
    responses(
        (status = 200, description = "校验通过，返回类型化的字段值"),
        (status = 400, description = "校验失败，error.details.fields 给出每个字段的错误"),
        (status = 401, description = "未认证"),
        (status = 404, description = "表单不存在")
    )
)]
pub async fn validate_form(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Extension(user): Extension<CurrentUser>,
    request_id: Option<Extension<RequestId>>,
    Json(submission): Json<FormSubmission>,
) -> Result<Json<ApiResponse<ValidatedUpload>>, AppError> {
    let kind: FormKind = kind.parse()?;
    let data = state.service.validate(kind, &user, &submission).await?;
    Ok(envelope(data, request_id))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        metadata_database: state.config.database_url.is_some(),
    })
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 是否配置了元数据库
    pub metadata_database: bool,
}
