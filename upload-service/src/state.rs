//! Application state for the upload service.

use std::sync::Arc;
use std::time::Duration;

use common::config::AppConfig;
use common::errors::AppResult;
use common::forms::FormCatalog;

use crate::permissions::{HttpPermissionSource, PermissionSource, StaticPermissionSource};
use crate::registry::{ConnectionRegistry, InMemoryConnectionRegistry, SqlConnectionRegistry};
use crate::service::UploadService;

const SECURITY_SERVICE_TIMEOUT: Duration = Duration::from_secs(5);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub service: Arc<UploadService>,
}

impl AppState {
    /// Builds the registry, permission source and form catalog from config.
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let registry: Arc<dyn ConnectionRegistry> = match &config.database_url {
            Some(url) => Arc::new(SqlConnectionRegistry::connect(&config, url).await?),
            None => {
                tracing::warn!("DATABASE_URL 未配置，没有可上传的数据库");
                Arc::new(InMemoryConnectionRegistry::default())
            }
        };

        let permissions: Arc<dyn PermissionSource> =
            match (&config.security_service_url, &config.permissions_file) {
                (Some(url), _) => {
                    tracing::info!(url = %url, "使用远端安全服务获取权限");
                    Arc::new(HttpPermissionSource::new(url, SECURITY_SERVICE_TIMEOUT)?)
                }
                (None, Some(path)) => Arc::new(StaticPermissionSource::from_file(path)?),
                (None, None) => {
                    tracing::warn!("未配置权限来源，所有用户均无上传权限");
                    Arc::new(StaticPermissionSource::default())
                }
            };

        let forms = Arc::new(FormCatalog::new(&config.upload)?);
        Ok(Self::from_parts(config, registry, permissions, forms))
    }

    pub fn from_parts(
        config: AppConfig,
        registry: Arc<dyn ConnectionRegistry>,
        permissions: Arc<dyn PermissionSource>,
        forms: Arc<FormCatalog>,
    ) -> Self {
        Self {
            service: Arc::new(UploadService::new(registry, permissions, forms)),
            config,
        }
    }
}
