//! 用户权限来源
//!
//! 权限快照可以来自本地 JSON 文件，也可以来自远端安全服务。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use common::errors::{AppError, AppResult};
use common::middleware::CurrentUser;
use common::models::UserPermissions;
use common::response::ApiResponse;

/// 权限来源 Trait
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// 获取用户的权限快照
    async fn permissions_for(&self, user: &CurrentUser) -> AppResult<UserPermissions>;
}

/// 静态权限表，未知用户没有任何权限
#[derive(Default)]
pub struct StaticPermissionSource {
    grants: HashMap<String, UserPermissions>,
}

impl StaticPermissionSource {
    pub fn new(grants: impl IntoIterator<Item = UserPermissions>) -> Self {
        Self {
            grants: grants
                .into_iter()
                .map(|perms| (perms.username.clone(), perms))
                .collect(),
        }
    }

    /// 从 JSON 文件加载（`UserPermissions` 数组）
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("无法读取权限文件 {}: {}", path, e)))?;
        let grants: Vec<UserPermissions> = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("权限文件格式错误 {}: {}", path, e)))?;
        tracing::info!(path = %path, users = grants.len(), "权限文件已加载");
        Ok(Self::new(grants))
    }
}

#[async_trait]
impl PermissionSource for StaticPermissionSource {
    async fn permissions_for(&self, user: &CurrentUser) -> AppResult<UserPermissions> {
        Ok(self
            .grants
            .get(&user.username)
            .cloned()
            .unwrap_or_else(|| UserPermissions::none(user.username.clone())))
    }
}

/// 远端安全服务：`GET {base}/internal/permissions/{username}`
pub struct HttpPermissionSource {
    base_url: Url,
    http_client: reqwest::Client,
}

impl HttpPermissionSource {
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("安全服务地址无效 {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!("安全服务地址无效: {}", base_url)));
        }
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    fn permissions_url(&self, username: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["internal", "permissions", username]);
        }
        url
    }
}

#[async_trait]
impl PermissionSource for HttpPermissionSource {
    async fn permissions_for(&self, user: &CurrentUser) -> AppResult<UserPermissions> {
        let url = self.permissions_url(&user.username);

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("无法连接到安全服务: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(UserPermissions::none(user.username.clone()));
        }
        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "安全服务返回 HTTP {}",
                response.status()
            )));
        }

        let body: ApiResponse<UserPermissions> = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("安全服务返回无效响应: {}", e)))?;

        let mut permissions = body
            .data
            .ok_or_else(|| AppError::ExternalService("安全服务未返回权限数据".to_string()))?;
        permissions.username = user.username.clone();
        Ok(permissions)
    }
}
