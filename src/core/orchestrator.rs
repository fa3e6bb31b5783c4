//! 專案建立／更新的 saga 協調器
//!
//! 依 [`SystemKind`] 的依賴順序逐一呼叫 adapter。第一個錯誤發生後停止建立，
//! 依 [`CompensationTracker`](crate::core::compensation::CompensationTracker)
//! 的紀錄以相反順序清理。清理失敗只記入 [`CleanupOutcome`]，不會再拋出。

use crate::core::preconditions::PreconditionValidator;
use crate::core::request_validation::normalize_request;
use crate::core::saga::{SagaContext, SagaKind, SagaState};
use crate::domain::model::{
    CleanupOutcome, CleanupReport, CleanupRequest, LeftoverComponent, LifecycleStage,
    ProjectRecord, ProjectRequest, ProvisioningResult, SystemKind,
};
use crate::domain::ports::{ProjectStore, SystemAdapter};
use crate::utils::error::{ProvisioningError, ProvisioningFailure, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type ProvisioningOutcome = std::result::Result<ProvisioningResult, ProvisioningFailure>;

pub struct ProvisioningOrchestrator {
    adapters: Vec<Arc<dyn SystemAdapter>>,
    validator: PreconditionValidator,
    store: Arc<dyn ProjectStore>,
}

impl ProvisioningOrchestrator {
    pub fn new(
        mut adapters: Vec<Arc<dyn SystemAdapter>>,
        validator: PreconditionValidator,
        store: Arc<dyn ProjectStore>,
    ) -> Self {
        adapters.sort_by_key(|a| a.system());
        for adapter in &adapters {
            tracing::debug!("🔌 Registered {} adapter at {}", adapter.system(), adapter.adapter_base_uri());
        }
        Self {
            adapters,
            validator,
            store,
        }
    }

    pub fn systems(&self) -> Vec<SystemKind> {
        self.adapters.iter().map(|a| a.system()).collect()
    }

    fn adapter(&self, system: SystemKind) -> Option<&Arc<dyn SystemAdapter>> {
        self.adapters.iter().find(|a| a.system() == system)
    }

    /// 建立新專案
    pub async fn create_project(&self, request: ProjectRequest) -> ProvisioningOutcome {
        let request = self.prepare_create(request).await.map_err(|e| validation_failure(&e))?;
        let key = request.key.clone();
        tracing::info!("🚀 [{}] Creating project '{}'", key, request.name);

        let ctx = SagaContext::new(SagaKind::Create, request, ProvisioningResult::default());
        let ctx = self.run_saga(ctx).await?;

        let mut request = ctx.request;
        request.scm_url = ctx.result.scm_url.clone();
        let result = ctx.result;

        if let Err(e) = self.store.create(ProjectRecord::new(request, result.clone())).await {
            tracing::error!("❌ [{}] Project created but could not be stored: {}", key, e);
            return Err(ProvisioningFailure::after_compensation(&e, BTreeMap::new()));
        }

        tracing::info!("✅ [{}] Project created", key);
        Ok(result)
    }

    /// 更新既有專案（新增 quickstarter 或開啟 runtime platform）
    pub async fn update_project(&self, request: ProjectRequest) -> ProvisioningOutcome {
        let (request, mut record) = self.prepare_update(request).await.map_err(|e| validation_failure(&e))?;
        let key = request.key.clone();

        if request.quickstarters.is_empty() && record.request.wants_runtime_platform == request.wants_runtime_platform {
            tracing::info!("⏭️ [{}] Nothing new to provision", key);
            return Ok(record.result);
        }
        tracing::info!("🚀 [{}] Updating project with {} new component(s)", key, request.quickstarters.len());

        let ctx = SagaContext::new(SagaKind::Update, request, record.result.clone());
        let ctx = self.run_saga(ctx).await?;

        let SagaContext { request, result, .. } = ctx;
        let added = record.request.quickstarters.len();
        record.request.quickstarters.extend(request.quickstarters);
        record.request.wants_runtime_platform = request.wants_runtime_platform;
        record.request.scm_url = result.scm_url.clone().or(record.request.scm_url);
        record.request.webhook_proxy_secret = request.webhook_proxy_secret.or(record.request.webhook_proxy_secret);
        record.result.merge(result);

        let merged = record.result.clone();
        if let Err(e) = self.store.update(record).await {
            tracing::error!("❌ [{}] Project updated but could not be stored: {}", key, e);
            return Err(ProvisioningFailure::after_compensation(&e, BTreeMap::new()));
        }

        tracing::info!("✅ [{}] Project updated ({} component(s) before)", key, added);
        Ok(merged)
    }

    /// 不經 saga，直接清理已儲存的專案
    ///
    /// `COMPONENT_UPDATE` 時只清理 `components` 中的 component；清單為空則清理全部 component。
    /// 清理後同步專案紀錄：初次建立整筆刪除，component 更新則移除已清理的 component。
    pub async fn cleanup(
        &self,
        project_key: &str,
        stage: LifecycleStage,
        components: &[String],
    ) -> Result<CleanupReport> {
        let key = project_key.trim().to_uppercase();
        let record = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| ProvisioningError::NotFound { key: key.clone() })?;

        let result = match stage {
            LifecycleStage::InitialCreation => record.result.clone(),
            LifecycleStage::ComponentUpdate => components_only(&record.result, components),
        };
        let request = CleanupRequest {
            stage,
            request: record.request.clone(),
            result,
        };

        tracing::info!("🧹 [{}] Running {} cleanup", key, stage);
        let mut report = CleanupReport::default();
        for adapter in self.adapters.iter().rev() {
            report.systems.insert(adapter.system(), adapter.cleanup(&request).await);
        }
        report.store = self.forget(record, &request).await;
        Ok(report)
    }

    async fn forget(&self, mut record: ProjectRecord, cleanup: &CleanupRequest) -> CleanupOutcome {
        let key = record.request.key.clone();
        let synced = match cleanup.stage {
            LifecycleStage::InitialCreation => self.store.delete(&key).await.map(|_| ()),
            LifecycleStage::ComponentUpdate => {
                let removed = cleanup.component_ids();
                if removed.is_empty() {
                    return CleanupOutcome::new();
                }
                record.result.remove_components(&removed);
                record
                    .request
                    .quickstarters
                    .retain(|q| !removed.iter().any(|id| id.eq_ignore_ascii_case(&q.component_id)));
                self.store.update(record).await
            }
        };

        match synced {
            Ok(()) => {
                tracing::info!("🗂️ [{}] Project record synced after {} cleanup", key, cleanup.stage);
                CleanupOutcome::new()
            }
            Err(e) => {
                tracing::warn!("⚠️ [{}] Project record could not be synced: {}", key, e);
                CleanupOutcome::new().with(LeftoverComponent::ProjectDb, 1)
            }
        }
    }

    async fn prepare_create(&self, request: ProjectRequest) -> Result<ProjectRequest> {
        let mut request = normalize_request(request)?;

        if self.store.get(&request.key).await?.is_some() {
            return Err(ProvisioningError::Conflict { key: request.key });
        }
        self.check_preconditions(&request).await?;

        // SCM webhook 與平台專案共用同一個 secret
        if request.wants_runtime_platform && request.webhook_proxy_secret.is_none() {
            request.webhook_proxy_secret = Some(uuid::Uuid::new_v4().to_string());
        }
        Ok(request)
    }

    /// 權限相關欄位一律取自已儲存的紀錄
    async fn prepare_update(&self, request: ProjectRequest) -> Result<(ProjectRequest, ProjectRecord)> {
        let mut request = normalize_request(request)?;
        let record = self
            .store
            .get(&request.key)
            .await?
            .ok_or_else(|| ProvisioningError::NotFound { key: request.key.clone() })?;
        let stored = &record.request;

        request.name = stored.name.clone();
        request.description = stored.description.clone();
        request.project_type = stored.project_type.clone();
        request.scm_url = record.result.scm_url.clone().or_else(|| stored.scm_url.clone());
        request.wants_issue_tracker_space = stored.wants_issue_tracker_space;
        request.special_permission_set = stored.special_permission_set;
        request.admin_user = stored.admin_user.clone();
        request.admin_group = stored.admin_group.clone();
        request.user_group = stored.user_group.clone();
        request.readonly_group = stored.readonly_group.clone();
        request.webhook_proxy_secret = stored.webhook_proxy_secret.clone();
        request.wants_runtime_platform = stored.wants_runtime_platform || request.wants_runtime_platform;

        let before = request.quickstarters.len();
        request
            .quickstarters
            .retain(|q| !record.result.has_component(&q.component_id));
        if request.quickstarters.len() < before {
            tracing::info!(
                "⏭️ [{}] Skipping {} already provisioned component(s)",
                request.key,
                before - request.quickstarters.len()
            );
        }

        if request.wants_runtime_platform && request.webhook_proxy_secret.is_none() {
            request.webhook_proxy_secret = Some(uuid::Uuid::new_v4().to_string());
        }
        Ok((request, record))
    }

    async fn check_preconditions(&self, request: &ProjectRequest) -> Result<()> {
        if !request.special_permission_set {
            return Ok(());
        }
        let failures = self.validator.validate(request).await;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ProvisioningError::Precondition { failures })
        }
    }

    async fn run_saga(&self, mut ctx: SagaContext) -> std::result::Result<SagaContext, ProvisioningFailure> {
        for adapter in &self.adapters {
            if !adapter.should_run(&ctx) {
                tracing::debug!("⏭️ [{}] {} step not needed", ctx.project_key(), adapter.system());
                continue;
            }

            ctx.transition(SagaState::entering(adapter.system()));
            if let Err(error) = adapter.create(&mut ctx).await {
                tracing::error!("❌ [{}] {} step failed: {}", ctx.project_key(), adapter.system(), error);
                let outcomes = self.compensate(&mut ctx).await;
                ctx.transition(SagaState::Failed);
                return Err(ProvisioningFailure::after_compensation(&error, outcomes));
            }
        }

        for adapter in &self.adapters {
            adapter.finalize(&ctx).await;
        }
        ctx.transition(SagaState::Done);
        Ok(ctx)
    }

    /// 每個有產物的系統恰好清理一次，依相反的依賴順序
    async fn compensate(&self, ctx: &mut SagaContext) -> BTreeMap<SystemKind, CleanupOutcome> {
        ctx.transition(SagaState::RollingBack);
        let plan = ctx.tracker().plan(ctx.kind, &ctx.request);

        let mut outcomes = BTreeMap::new();
        for action in plan {
            let Some(adapter) = self.adapter(action.system) else {
                continue;
            };
            tracing::info!(
                "🧹 [{}] Compensating {} with {}",
                ctx.project_key(),
                action.system,
                action.cleanup.stage
            );
            let outcome = adapter.cleanup(&action.cleanup).await;
            if !outcome.is_empty() {
                tracing::warn!("⚠️ [{}] {} cleanup left {:?}", ctx.project_key(), action.system, outcome);
            }
            outcomes.insert(action.system, outcome);
        }
        outcomes
    }
}

fn validation_failure(error: &ProvisioningError) -> ProvisioningFailure {
    tracing::info!("❌ Request rejected: {}", error);
    if error.is_validation() {
        ProvisioningFailure::validation(error)
    } else {
        ProvisioningFailure::after_compensation(error, BTreeMap::new())
    }
}

fn components_only(result: &ProvisioningResult, components: &[String]) -> ProvisioningResult {
    let selected = |id: &str| components.is_empty() || components.iter().any(|c| c.eq_ignore_ascii_case(id));
    ProvisioningResult {
        repositories: result
            .repositories
            .iter()
            .filter(|r| r.component_id.as_deref().is_some_and(selected))
            .cloned()
            .collect(),
        executions: result
            .executions
            .iter()
            .filter(|e| selected(&e.component_id))
            .cloned()
            .collect(),
        ..Default::default()
    }
}
