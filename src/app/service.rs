//! 由 [`AppConfig`] 組裝完整的 provisioning 服務

use crate::adapters::{
    CiAdapter, HttpJobSource, InMemoryProjectStore, IssueTrackerAdapter, RestIdentityDirectory,
    ScmAdapter, WebhookProxy, WikiAdapter,
};
use crate::config::toml_config::{AppConfig, SystemEndpoint};
use crate::core::auth::{CredentialResolver, SessionIdentity};
use crate::core::http::HttpClient;
use crate::core::job_registry::JobRegistry;
use crate::core::orchestrator::{ProvisioningOrchestrator, ProvisioningOutcome};
use crate::core::preconditions::PreconditionValidator;
use crate::domain::model::{CleanupReport, LifecycleStage, ProjectRequest};
use crate::domain::ports::{JobSource, SystemAdapter};
use crate::utils::error::{ConfigError, Result};
use std::sync::Arc;

pub struct ProvisioningService {
    orchestrator: ProvisioningOrchestrator,
    registry: JobRegistry,
    job_source: Option<Arc<dyn JobSource>>,
    store: Arc<InMemoryProjectStore>,
}

impl ProvisioningService {
    pub fn from_config(
        config: &AppConfig,
        identity: Arc<dyn SessionIdentity>,
        store: Arc<InMemoryProjectStore>,
    ) -> Result<Self> {
        let client = HttpClient::new(config.http.settings()).map_err(|e| ConfigError::InvalidValue {
            field: "http".to_string(),
            value: format!("{:?}", config.http),
            reason: e.to_string(),
        })?;

        let resolver = |prefix: &str, endpoint: &SystemEndpoint| {
            CredentialResolver::new(
                prefix,
                endpoint.admin_user.as_deref(),
                endpoint.admin_password.as_deref(),
                identity.clone(),
                client.clone(),
            )
        };

        let registry = JobRegistry::new(config.ci.jobs.clone());
        let proxy = WebhookProxy::from_config(&config.ci);

        let adapters: Vec<Arc<dyn SystemAdapter>> = vec![
            Arc::new(IssueTrackerAdapter::new(
                resolver("issue_tracker", &config.issue_tracker.endpoint),
                config.issue_tracker.clone(),
            )),
            Arc::new(WikiAdapter::new(
                resolver("wiki", &config.wiki.endpoint),
                config.wiki.clone(),
            )),
            Arc::new(
                ScmAdapter::new(resolver("scm", &config.scm.endpoint), config.scm.clone())
                    .with_webhook_proxy(proxy),
            ),
            Arc::new(CiAdapter::new(
                resolver("ci", &SystemEndpoint::default()),
                config.ci.clone(),
                registry.clone(),
            )),
        ];

        let directory = RestIdentityDirectory::new(resolver("identity", &config.identity), config.identity.clone());
        let validator = PreconditionValidator::new(Arc::new(directory));

        let job_source = config.ci.job_catalog.as_ref().map(|catalog| {
            Arc::new(HttpJobSource::new(resolver("job_catalog", catalog), catalog.clone())) as Arc<dyn JobSource>
        });

        tracing::info!(
            "⚙️ Provisioning service ready with {} job(s) configured",
            registry.len()
        );

        Ok(Self {
            orchestrator: ProvisioningOrchestrator::new(adapters, validator, store.clone()),
            registry,
            job_source,
            store,
        })
    }

    pub fn orchestrator(&self) -> &ProvisioningOrchestrator {
        &self.orchestrator
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn store(&self) -> &InMemoryProjectStore {
        &self.store
    }

    /// 從 job 目錄更新一次；失敗時保留目前的 job
    pub async fn refresh_jobs(&self) -> Option<usize> {
        let source = self.job_source.as_ref()?;
        match self.registry.refresh_from(source.as_ref()).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!("⚠️ Job catalog unavailable, keeping {} configured job(s): {}", self.registry.len(), e);
                None
            }
        }
    }

    /// 長時間執行時定期更新 job 目錄
    pub fn spawn_job_refresh(&self, config: &AppConfig) -> Option<tokio::task::JoinHandle<()>> {
        let source = self.job_source.clone()?;
        Some(self.registry.spawn_periodic_refresh(source, config.job_refresh_interval()))
    }

    pub async fn create_project(&self, request: ProjectRequest) -> ProvisioningOutcome {
        self.orchestrator.create_project(request).await
    }

    pub async fn update_project(&self, request: ProjectRequest) -> ProvisioningOutcome {
        self.orchestrator.update_project(request).await
    }

    pub async fn cleanup(
        &self,
        project_key: &str,
        stage: LifecycleStage,
        components: &[String],
    ) -> Result<CleanupReport> {
        self.orchestrator.cleanup(project_key, stage, components).await
    }
}
