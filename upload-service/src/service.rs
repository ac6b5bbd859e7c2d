//! 文件上传服务模块
//!
//! 负责：
//! - 计算当前用户可上传的数据库列表
//! - 提供上传表单（CSV / Excel / 列式文件）
//! - 校验提交的表单

use std::borrow::Cow;
use std::sync::Arc;

use validator::{Validate, ValidationError, ValidationErrors};

use common::eligibility::{schema_allows_file_upload, UploadEligibilityFilter};
use common::errors::{AppError, AppResult};
use common::forms::{
    FormCatalog, FormKind, FormSubmission, FormSummary, FormView, ValidatedUpload,
};
use common::middleware::CurrentUser;
use common::models::{DatabaseChoice, DatabaseConnection, UserPermissions};

use crate::permissions::PermissionSource;
use crate::registry::ConnectionRegistry;

/// 文件上传服务
pub struct UploadService {
    registry: Arc<dyn ConnectionRegistry>,
    permissions: Arc<dyn PermissionSource>,
    forms: Arc<FormCatalog>,
}

impl UploadService {
    /// 创建新的上传服务实例
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        permissions: Arc<dyn PermissionSource>,
        forms: Arc<FormCatalog>,
    ) -> Self {
        Self {
            registry,
            permissions,
            forms,
        }
    }

    /// 获取权限快照，失败时按无权限处理
    async fn permissions_for(&self, user: &CurrentUser) -> UserPermissions {
        match self.permissions.permissions_for(user).await {
            Ok(permissions) => permissions,
            Err(e) => {
                tracing::warn!(user = %user.username, error = %e, "权限查询失败，按无权限处理");
                UserPermissions::none(user.username.clone())
            }
        }
    }

    /// 当前用户可上传的数据库（保持注册表顺序）
    pub async fn eligible_databases(&self, user: &CurrentUser) -> AppResult<Vec<DatabaseConnection>> {
        let permissions = self.permissions_for(user).await;
        self.eligible_for(&permissions).await
    }

    async fn eligible_for(&self, permissions: &UserPermissions) -> AppResult<Vec<DatabaseConnection>> {
        let candidates = self.registry.upload_allowed().await?;
        let eligible = UploadEligibilityFilter::new(permissions).filter(candidates);
        tracing::debug!(user = %permissions.username, count = eligible.len(), "可上传数据库");
        Ok(eligible)
    }

    /// 下拉框选项（id + 显示名）
    pub async fn database_choices(&self, user: &CurrentUser) -> AppResult<Vec<DatabaseChoice>> {
        Ok(self
            .eligible_databases(user)
            .await?
            .iter()
            .map(DatabaseChoice::from)
            .collect())
    }

    /// 表单列表
    pub fn forms(&self) -> Vec<FormSummary> {
        self.forms.summaries()
    }

    /// 带有当前用户数据库选项的表单
    pub async fn form_view(&self, kind: FormKind, user: &CurrentUser) -> AppResult<FormView> {
        let choices = self.database_choices(user).await?;
        Ok(self.forms.get(kind).view(choices))
    }

    /// 校验表单提交
    pub async fn validate(
        &self,
        kind: FormKind,
        user: &CurrentUser,
        submission: &FormSubmission,
    ) -> AppResult<ValidatedUpload> {
        submission.validate()?;

        let permissions = self.permissions_for(user).await;
        let eligible = self.eligible_for(&permissions).await?;
        let choices: Vec<DatabaseChoice> = eligible.iter().map(DatabaseChoice::from).collect();
        let upload = self.forms.get(kind).validate_submission(submission, &choices)?;

        let database = eligible
            .iter()
            .find(|db| db.id == upload.database_id)
            .ok_or_else(|| {
                AppError::Internal(format!("数据库 {} 不在可选列表中", upload.database_id))
            })?;

        if !schema_allows_file_upload(database, upload.schema.as_deref(), &permissions) {
            let message = format!(
                "Database \"{}\" schema \"{}\" is not allowed for {} uploads. \
                 Please contact your administrator.",
                database.database_name,
                upload.schema.as_deref().unwrap_or_default(),
                kind,
            );
            let mut errors = ValidationErrors::new();
            errors.add(
                "schema",
                ValidationError::new("schema").with_message(Cow::Owned(message)),
            );
            return Err(AppError::FormValidation(errors));
        }

        tracing::info!(
            user = %user.username,
            form = %kind,
            database = %database.database_name,
            "上传表单校验通过"
        );
        Ok(upload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::config::UploadConfig;
    use common::errors::field_messages;
    use common::models::{DbEngine, SchemaGrant};

    use crate::permissions::StaticPermissionSource;
    use crate::registry::InMemoryConnectionRegistry;

    struct FailingPermissions;

    #[async_trait]
    impl PermissionSource for FailingPermissions {
        async fn permissions_for(&self, _user: &CurrentUser) -> AppResult<UserPermissions> {
            Err(AppError::ExternalService("security service down".into()))
        }
    }

    fn connections() -> Vec<DatabaseConnection> {
        vec![
            DatabaseConnection::new(1, "A", DbEngine::Postgresql),
            DatabaseConnection::new(2, "B", DbEngine::Gsheets),
            DatabaseConnection::new(3, "C", DbEngine::Mysql).with_upload_schemas(["sales"]),
        ]
    }

    fn alice() -> UserPermissions {
        let mut perms = UserPermissions::none("alice");
        perms.database_access.insert("A".into());
        perms.database_access.insert("B".into());
        perms.schema_access.push(SchemaGrant {
            database: "C".into(),
            schema: "sales".into(),
        });
        perms
    }

    fn service_with(permissions: Arc<dyn PermissionSource>) -> UploadService {
        UploadService::new(
            Arc::new(InMemoryConnectionRegistry::new(connections())),
            permissions,
            Arc::new(FormCatalog::new(&UploadConfig::default()).unwrap()),
        )
    }

    fn service() -> UploadService {
        service_with(Arc::new(StaticPermissionSource::new([alice()])))
    }

    fn columnar(database: &str, schema: &str) -> FormSubmission {
        FormSubmission::default()
            .with_field("name", "events")
            .with_field("database", database)
            .with_field("schema", schema)
            .with_field("if_exists", "fail")
            .with_file("columnar_file", "events.parquet")
    }

    #[tokio::test]
    async fn test_eligible_databases_for_user() {
        let user = CurrentUser::new("alice");
        let choices = service().database_choices(&user).await.unwrap();
        let ids: Vec<i64> = choices.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(choices[1].label, "C");
    }

    #[tokio::test]
    async fn test_unknown_user_sees_nothing() {
        let user = CurrentUser::new("mallory");
        assert!(service().eligible_databases(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_permission_failure_fails_closed() {
        let service = service_with(Arc::new(FailingPermissions));
        let user = CurrentUser::new("alice");
        assert!(service.eligible_databases(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_form_view_contains_choices() {
        let user = CurrentUser::new("alice");
        let view = service().form_view(FormKind::Csv, &user).await.unwrap();
        assert_eq!(view.kind, FormKind::Csv);
        assert_eq!(view.database_choices.len(), 2);
        assert!(!view.fields.is_empty());
    }

    #[tokio::test]
    async fn test_validate_accepts_allowed_schema() {
        let user = CurrentUser::new("alice");
        let upload = service()
            .validate(FormKind::Columnar, &user, &columnar("3", "sales"))
            .await
            .unwrap();
        assert_eq!(upload.database_id, 3);
        assert_eq!(upload.schema.as_deref(), Some("sales"));
    }

    #[tokio::test]
    async fn test_validate_rejects_other_schema() {
        let user = CurrentUser::new("alice");
        let err = service()
            .validate(FormKind::Columnar, &user, &columnar("3", "finance"))
            .await
            .unwrap_err();
        match err {
            AppError::FormValidation(errors) => {
                assert_eq!(
                    field_messages(&errors)["schema"],
                    vec![
                        "Database \"C\" schema \"finance\" is not allowed for columnar uploads. \
                         Please contact your administrator."
                            .to_string()
                    ]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validate_rejects_ineligible_database() {
        let user = CurrentUser::new("alice");
        let err = service()
            .validate(FormKind::Columnar, &user, &columnar("2", ""))
            .await
            .unwrap_err();
        match err {
            AppError::FormValidation(errors) => {
                assert!(field_messages(&errors).contains_key("database"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validate_rejects_blank_filename() {
        let user = CurrentUser::new("alice");
        let submission = columnar("1", "").with_file("columnar_file", "");
        assert!(matches!(
            service().validate(FormKind::Columnar, &user, &submission).await,
            Err(AppError::FormValidation(_))
        ));
    }
}
