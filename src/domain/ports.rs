use crate::core::http::HttpError;
use crate::core::job_registry::JobDescriptor;
use crate::core::saga::SagaContext;
use crate::domain::model::{CleanupOutcome, CleanupRequest, ProjectRecord, SystemKind};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 一個外部系統的建立與清理能力
#[async_trait]
pub trait SystemAdapter: Send + Sync {
    fn system(&self) -> SystemKind;

    fn adapter_base_uri(&self) -> &str;

    /// 這次 saga 是否需要此系統
    fn should_run(&self, _ctx: &SagaContext) -> bool {
        true
    }

    /// 建立產物，並透過 `ctx.record` 記錄供補償使用
    async fn create(&self, ctx: &mut SagaContext) -> Result<()>;

    /// 所有系統都成功後的附加步驟，失敗只記錄不回滾
    async fn finalize(&self, _ctx: &SagaContext) {}

    /// 移除產物，失敗計入回傳的殘留數量，不會回傳錯誤
    async fn cleanup(&self, request: &CleanupRequest) -> CleanupOutcome;
}

/// 身分系統查詢：`Ok(false)` 代表不存在
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn group_exists(&self, group: &str) -> std::result::Result<bool, HttpError>;
    async fn user_exists(&self, user: &str) -> std::result::Result<bool, HttpError>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<ProjectRecord>>;
    async fn create(&self, record: ProjectRecord) -> Result<()>;
    async fn update(&self, record: ProjectRecord) -> Result<()>;
    /// 回傳是否真的有紀錄被刪除
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// 定期更新 job registry 的來源
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn fetch_jobs(&self) -> std::result::Result<Vec<JobDescriptor>, HttpError>;
}
