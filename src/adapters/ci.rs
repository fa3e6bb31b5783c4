//! CI/CD adapter：透過 webhook proxy 觸發 pipeline job
//!
//! 觸發呼叫不帶使用者認證，webhook proxy 以 `trigger_secret` 驗證。
//! secret 不會出現在日誌中。

use crate::config::toml_config::CiConfig;
use crate::core::auth::CredentialResolver;
use crate::core::compensation::ArtifactKind;
use crate::core::http::{HttpError, Object};
use crate::core::job_registry::{JobDescriptor, JobRegistry};
use crate::core::saga::{SagaContext, SagaState};
use crate::domain::model::{
    CleanupOutcome, CleanupRequest, ExecutionInfo, LeftoverComponent, LifecycleStage,
    QuickstarterRequest, SystemKind,
};
use crate::domain::ports::SystemAdapter;
use crate::utils::error::{ProvisioningError, Result};
use crate::utils::template::render_template;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// 管理 job 使用的 webhook proxy 命名空間
const ADMIN_PROXY_PROJECT: &str = "prov";

/// 把 URL 中的 `trigger_secret` 遮蔽後才能寫入日誌
pub fn mask_secret(url: &str) -> Cow<'_, str> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    match RE.get_or_init(|| Regex::new(r"(trigger_secret=)[^&]*").ok()) {
        Some(re) => re.replace_all(url, "${1}***"),
        None => Cow::Borrowed(url),
    }
}

/// webhook proxy 位址，SCM webhook 與 CI 觸發共用
#[derive(Debug, Clone)]
pub struct WebhookProxy {
    url_pattern: String,
    domain: String,
    trigger_secret: String,
}

impl WebhookProxy {
    pub fn new(url_pattern: impl Into<String>, domain: impl Into<String>, trigger_secret: impl Into<String>) -> Self {
        Self {
            url_pattern: url_pattern.into(),
            domain: domain.into(),
            trigger_secret: trigger_secret.into(),
        }
    }

    pub fn from_config(config: &CiConfig) -> Self {
        Self::new(
            config.webhook_proxy_url_pattern.clone(),
            config.domain.clone(),
            config.trigger_secret.clone(),
        )
    }

    pub fn base_url(&self, project: &str) -> std::result::Result<String, HttpError> {
        render_template(&self.url_pattern, &[("project", project), ("domain", &self.domain)])
            .map(|url| url.trim_end_matches('/').to_string())
            .map_err(|e| HttpError::InvalidRequest {
                message: e.to_string(),
            })
    }

    pub fn build_url(&self, project: &str) -> std::result::Result<String, HttpError> {
        Ok(format!("{}/build", self.base_url(project)?))
    }

    /// SCM webhook 的目標位址（含 secret）
    pub fn webhook_url(&self, project: &str, secret: Option<&str>) -> std::result::Result<String, HttpError> {
        Ok(format!(
            "{}?trigger_secret={}",
            self.base_url(project)?,
            secret.unwrap_or(&self.trigger_secret)
        ))
    }

    pub fn default_secret(&self) -> &str {
        &self.trigger_secret
    }
}

/// webhook proxy 回傳的 OpenShift build 物件
#[derive(Debug, Clone, Deserialize)]
struct BuildResponse {
    #[serde(default)]
    kind: String,
    metadata: BuildMetadata,
    #[serde(default)]
    status: Option<BuildStatus>,
}

#[derive(Debug, Clone, Deserialize)]
struct BuildMetadata {
    #[serde(default)]
    name: String,
    namespace: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct BuildStatus {
    #[serde(default)]
    config: Option<BuildConfigRef>,
}

#[derive(Debug, Clone, Deserialize)]
struct BuildConfigRef {
    #[serde(default)]
    name: Option<String>,
}

impl BuildResponse {
    fn build_config_name(&self) -> Option<String> {
        self.metadata
            .labels
            .get("openshift.io/build-config.name")
            .or_else(|| self.metadata.labels.get("buildconfig"))
            .cloned()
            .or_else(|| {
                self.status
                    .as_ref()
                    .and_then(|s| s.config.as_ref())
                    .and_then(|c| c.name.clone())
            })
    }

    fn build_number(&self) -> Option<String> {
        if let Some(number) = self.metadata.annotations.get("openshift.io/build.number") {
            return Some(number.clone());
        }
        self.metadata
            .name
            .rsplit('-')
            .next()
            .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
    }
}

/// 一次觸發的結果
#[derive(Debug, Clone)]
struct Triggered {
    job_name: String,
    permalink: String,
}

pub struct CiAdapter {
    resolver: CredentialResolver,
    config: CiConfig,
    registry: JobRegistry,
    proxy: WebhookProxy,
}

impl CiAdapter {
    pub fn new(resolver: CredentialResolver, config: CiConfig, registry: JobRegistry) -> Self {
        let proxy = WebhookProxy::from_config(&config);
        Self {
            resolver,
            config,
            registry,
            proxy,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    fn render(&self, pattern: &str, project_id: &str) -> std::result::Result<String, HttpError> {
        render_template(pattern, &[
            ("project", project_id),
            ("domain", &self.config.domain),
            ("console", self.config.console_url.trim_end_matches('/')),
        ])
        .map_err(|e| HttpError::InvalidRequest {
            message: e.to_string(),
        })
    }

    fn group_id(&self, project_id: &str) -> std::result::Result<String, HttpError> {
        Ok(self.render(&self.config.group_pattern, project_id)?.replace('_', "-"))
    }

    fn permalink(&self, response: &BuildResponse) -> std::result::Result<Triggered, HttpError> {
        let namespace = &response.metadata.namespace;
        let build_config = response.build_config_name().ok_or_else(|| HttpError::Decode {
            url: "webhook-proxy".to_string(),
            message: format!("{} response without build config name", response.kind),
        })?;
        let build_number = response.build_number().ok_or_else(|| HttpError::Decode {
            url: "webhook-proxy".to_string(),
            message: format!("{} response without build number", response.kind),
        })?;

        let host = render_template(&self.config.jenkins_url_pattern, &[
            ("namespace", namespace),
            ("domain", &self.config.domain),
        ])
        .map_err(|e| HttpError::InvalidRequest {
            message: e.to_string(),
        })?;

        let job_name = format!("{}-{}", namespace, build_config);
        Ok(Triggered {
            permalink: format!(
                "{}/job/{}/job/{}/{}",
                host.trim_end_matches('/'),
                namespace,
                job_name,
                build_number
            ),
            job_name,
        })
    }

    /// 呼叫 webhook proxy 的 `/build`
    async fn trigger(
        &self,
        job: &JobDescriptor,
        proxy_project: &str,
        component: &str,
        secret: &str,
        options: &BTreeMap<String, String>,
    ) -> std::result::Result<Triggered, HttpError> {
        let url = self.proxy.build_url(proxy_project)?;
        let env: Vec<serde_json::Value> = options
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();

        tracing::info!(
            "📡 Triggering job '{}' for component {} via {}",
            job.name,
            component,
            mask_secret(&url)
        );

        let response = self
            .resolver
            .unauthenticated(Method::POST)
            .url(url)
            .query("trigger_secret", secret)
            .query("jenkinsfile_path", job.jenkinsfile_path.as_str())
            .query("component", component)
            .json_body(json!({
                "env": env,
                "branch": job.branch,
                "repository": job.repository,
                "project": job.git_parent_project,
            }))
            .execute::<Object<BuildResponse>>(self.resolver.client())
            .await?;

        self.permalink(&response)
    }

    async fn trigger_quickstarter(
        &self,
        project_id: &str,
        quickstarter: &QuickstarterRequest,
        secret: &str,
    ) -> std::result::Result<ExecutionInfo, String> {
        let job = self
            .registry
            .find_by_name_or_id(&quickstarter.component_type)
            .map_err(|e| e.to_string())?;

        let options = self
            .quickstarter_options(project_id, quickstarter)
            .map_err(|e| e.to_string())?;
        let component = format!("ods-quickstarter-{}-{}", job.name, quickstarter.component_id);

        let triggered = self
            .trigger(&job, project_id, &component, secret, &options)
            .await
            .map_err(|e| format!("Component '{}': {}", quickstarter.component_id, e))?;

        Ok(ExecutionInfo {
            component_id: quickstarter.component_id.clone(),
            job_name: triggered.job_name,
            permalink: triggered.permalink,
        })
    }

    fn quickstarter_options(
        &self,
        project_id: &str,
        quickstarter: &QuickstarterRequest,
    ) -> std::result::Result<BTreeMap<String, String>, HttpError> {
        let group_id = self.group_id(project_id)?;
        let package_name = format!(
            "{}.{}",
            self.render(&self.config.group_pattern, project_id)?,
            quickstarter.component_id.replace('-', "_")
        );

        let mut options = quickstarter.options.clone();
        options.insert("component_id".to_string(), quickstarter.component_id.clone());
        options.insert("GROUP_ID".to_string(), group_id);
        options.insert("PROJECT_ID".to_string(), project_id.to_string());
        options.insert("PACKAGE_NAME".to_string(), package_name);
        options.insert("ODS_IMAGE_TAG".to_string(), self.config.ods_image_tag.clone());
        options.insert("ODS_GIT_REF".to_string(), self.config.ods_git_ref.clone());
        Ok(options)
    }

    /// 管理 job（建立／刪除專案、刪除 component）
    async fn run_admin_job(
        &self,
        job_id: &str,
        proxy_project: &str,
        suffix: &str,
        options: &BTreeMap<String, String>,
    ) -> std::result::Result<Triggered, HttpError> {
        let job = self
            .registry
            .find_by_name_or_id(job_id)
            .map_err(|e| HttpError::InvalidRequest {
                message: e.to_string(),
            })?;
        let component = format!("ods-corejob-{}-{}", job.name, suffix);
        self.trigger(&job, proxy_project, &component, self.proxy.default_secret(), options)
            .await
    }

    /// 回傳平台專案 job 的 permalink
    async fn create_platform_project(&self, ctx: &mut SagaContext, job_id: &str) -> Result<String> {
        let project_id = ctx.request.key.to_lowercase();
        let secret = ctx
            .request
            .webhook_proxy_secret
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut options = BTreeMap::new();
        options.insert("PROJECT_ID".to_string(), project_id.clone());
        options.insert("PIPELINE_TRIGGER_SECRET".to_string(), secret.clone());
        options.insert("ODS_IMAGE_TAG".to_string(), self.config.ods_image_tag.clone());
        options.insert("ODS_GIT_REF".to_string(), self.config.ods_git_ref.clone());

        let request = &ctx.request;
        if request.special_permission_set {
            options.insert("PROJECT_ADMIN".to_string(), request.admin_user.clone().unwrap_or_default());
            options.insert(
                "PROJECT_GROUPS".to_string(),
                format!(
                    "ADMINGROUP={},USERGROUP={},READONLYGROUP={}",
                    request.admin_group.clone().unwrap_or_default(),
                    request.user_group.clone().unwrap_or_default(),
                    request.readonly_group.clone().unwrap_or_default()
                ),
            );
        } else {
            let admin = self.resolver.resolve().map(|c| c.username).unwrap_or_default();
            options.insert("PROJECT_ADMIN".to_string(), admin);
        }

        let triggered = self
            .run_admin_job(job_id, ADMIN_PROXY_PROJECT, &project_id, &options)
            .await
            .map_err(|e| ProvisioningError::from_http(self.system(), e))?;

        tracing::info!("✅ [{}] Platform project job started: {}", ctx.request.key, triggered.permalink);
        ctx.request.webhook_proxy_secret = Some(secret);
        Ok(triggered.permalink)
    }

    fn platform_urls(&self, ctx: &mut SagaContext) -> Result<()> {
        let project_id = ctx.request.key.to_lowercase();
        let render = |pattern: &str| {
            self.render(pattern, &project_id)
                .map_err(|e| ProvisioningError::from_http(SystemKind::Ci, e))
        };

        let build_engine = render(&self.config.build_engine_url_pattern)?;
        let dev_env = render(&self.config.dev_env_url_pattern)?;
        let test_env = render(&self.config.test_env_url_pattern)?;
        ctx.result.build_engine_url = Some(build_engine);
        ctx.result.dev_env_url = Some(dev_env);
        ctx.result.test_env_url = Some(test_env);
        Ok(())
    }

    async fn cleanup_platform_project(&self, project_id: &str) -> CleanupOutcome {
        let Some(job_id) = &self.config.admin_jobs.delete_projects else {
            tracing::warn!("⚠️ [{}] No delete-projects job configured, platform project stays", project_id);
            return CleanupOutcome::new().with(LeftoverComponent::PltfProject, 1);
        };

        let mut options = BTreeMap::new();
        options.insert("PROJECT_ID".to_string(), project_id.to_string());
        options.insert("COMPONENT_ID".to_string(), project_id.to_string());

        match self.run_admin_job(job_id, ADMIN_PROXY_PROJECT, project_id, &options).await {
            Ok(triggered) => {
                tracing::info!("🧹 [{}] Platform project delete job started: {}", project_id, triggered.permalink);
                CleanupOutcome::new()
            }
            Err(e) => {
                let error = ProvisioningError::Compensation {
                    system: SystemKind::Ci,
                    message: e.to_string(),
                };
                tracing::warn!("⚠️ [{}] {}", project_id, error);
                CleanupOutcome::new().with(LeftoverComponent::PltfProject, 1)
            }
        }
    }

    async fn cleanup_components(&self, project_id: &str, components: &[String]) -> CleanupOutcome {
        let Some(job_id) = &self.config.admin_jobs.delete_components else {
            tracing::warn!("⚠️ [{}] No delete-components job configured", project_id);
            return CleanupOutcome::new().with(LeftoverComponent::Quickstarter, components.len() as u32);
        };

        let mut leftovers = 0;
        for component in components {
            let mut options = BTreeMap::new();
            options.insert("PROJECT_ID".to_string(), project_id.to_string());
            options.insert("COMPONENT_ID".to_string(), component.clone());

            match self.run_admin_job(job_id, project_id, component, &options).await {
                Ok(_) => tracing::info!("🧹 [{}] Delete job started for component {}", project_id, component),
                Err(e) => {
                    let error = ProvisioningError::Compensation {
                        system: SystemKind::Ci,
                        message: format!("component {}: {}", component, e),
                    };
                    tracing::warn!("⚠️ [{}] {}", project_id, error);
                    leftovers += 1;
                }
            }
        }

        CleanupOutcome::new().with(LeftoverComponent::Quickstarter, leftovers)
    }
}

#[async_trait]
impl SystemAdapter for CiAdapter {
    fn system(&self) -> SystemKind {
        SystemKind::Ci
    }

    fn adapter_base_uri(&self) -> &str {
        &self.config.webhook_proxy_url_pattern
    }

    fn should_run(&self, ctx: &SagaContext) -> bool {
        ctx.request.wants_runtime_platform
    }

    async fn create(&self, ctx: &mut SagaContext) -> Result<()> {
        ctx.transition(SagaState::TriggeringCiJobs);
        let key = ctx.request.key.clone();
        let project_id = key.to_lowercase();

        // 新建，或從沒有 runtime platform 的專案升級
        if ctx.result.build_engine_url.is_none() {
            if let Some(job_id) = self.config.admin_jobs.create_projects.clone() {
                let permalink = self.create_platform_project(ctx, &job_id).await?;
                ctx.record(self.system(), ArtifactKind::Project { url: permalink });
            }
            self.platform_urls(ctx)?;
        }

        let secret = ctx
            .request
            .webhook_proxy_secret
            .clone()
            .unwrap_or_else(|| self.proxy.default_secret().to_string());

        let quickstarters = ctx.request.quickstarters.clone();
        let mut failures = Vec::new();

        // 單一 component 失敗不影響其他 component
        for quickstarter in &quickstarters {
            match self.trigger_quickstarter(&project_id, quickstarter, &secret).await {
                Ok(execution) => {
                    tracing::info!(
                        "✅ [{}] Job {} started for component {}: {}",
                        key,
                        execution.job_name,
                        execution.component_id,
                        execution.permalink
                    );
                    ctx.result.executions.push(execution.clone());
                    ctx.record(self.system(), ArtifactKind::Execution(execution));
                }
                Err(message) => {
                    tracing::error!("❌ [{}] {}", key, message);
                    failures.push(message);
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ProvisioningError::PartialFailure {
                system: self.system(),
                failures,
            })
        }
    }

    async fn cleanup(&self, request: &CleanupRequest) -> CleanupOutcome {
        let project_id = request.project_key().to_lowercase();

        match request.stage {
            LifecycleStage::InitialCreation => {
                if request.result.build_engine_url.is_none() && request.result.executions.is_empty() {
                    tracing::debug!("⏭️ [{}] Platform not affected by cleanup", project_id);
                    return CleanupOutcome::new();
                }
                self.cleanup_platform_project(&project_id).await
            }
            LifecycleStage::ComponentUpdate => {
                let components = request.component_ids();
                if components.is_empty() {
                    return CleanupOutcome::new();
                }
                self.cleanup_components(&project_id, &components).await
            }
        }
    }
}
