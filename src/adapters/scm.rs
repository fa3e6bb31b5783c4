//! Source control（Bitbucket 類）adapter

use crate::adapters::ci::{mask_secret, WebhookProxy};
use crate::config::toml_config::ScmConfig;
use crate::core::auth::CredentialResolver;
use crate::core::compensation::ArtifactKind;
use crate::core::http::{HttpError, NoContent, Object};
use crate::core::saga::{SagaContext, SagaState};
use crate::domain::model::{
    CleanupOutcome, CleanupRequest, LeftoverComponent, LifecycleStage, ProjectRequest,
    RepositoryInfo, RepositoryLinks, SystemKind,
};
use crate::domain::ports::SystemAdapter;
use crate::utils::error::{ProvisioningError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// repository 名稱：`{key}-{component}`，小寫且 `_` 轉成 `-`
pub fn repository_name(project_key: &str, component: &str) -> String {
    format!("{}-{}", project_key, component)
        .to_lowercase()
        .replace('_', "-")
}

#[derive(Debug, Default, Deserialize)]
struct RepositoryResponse {
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    links: ResponseLinks,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseLinks {
    #[serde(default)]
    clone: Vec<Link>,
    #[serde(default, rename = "self")]
    browse: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    #[serde(default)]
    name: Option<String>,
}

impl RepositoryResponse {
    fn into_info(self, fallback_name: &str, component_id: Option<String>) -> RepositoryInfo {
        let clone_link = |kind: &str| {
            self.links
                .clone
                .iter()
                .find(|l| l.name.as_deref() == Some(kind))
                .map(|l| l.href.clone())
        };

        RepositoryInfo {
            name: self.slug.clone().unwrap_or_else(|| fallback_name.to_string()),
            component_id,
            links: RepositoryLinks {
                clone_http: clone_link("http"),
                clone_ssh: clone_link("ssh"),
                browse: self.links.browse.first().map(|l| l.href.clone()),
            },
        }
    }
}

pub struct ScmAdapter {
    resolver: CredentialResolver,
    config: ScmConfig,
    webhook_proxy: Option<WebhookProxy>,
}

impl ScmAdapter {
    pub fn new(resolver: CredentialResolver, config: ScmConfig) -> Self {
        Self {
            resolver,
            config,
            webhook_proxy: None,
        }
    }

    pub fn with_webhook_proxy(mut self, proxy: WebhookProxy) -> Self {
        self.webhook_proxy = Some(proxy);
        self
    }

    pub fn project_url(&self, key: &str) -> String {
        format!("{}/projects/{}", self.config.endpoint.base(), key)
    }

    fn projects_api(&self) -> String {
        format!("{}/projects", self.config.endpoint.api())
    }

    async fn create_project(&self, request: &ProjectRequest) -> std::result::Result<(), HttpError> {
        self.resolver
            .http_post()?
            .url(self.projects_api())
            .json_body(json!({
                "key": request.key,
                "name": request.name,
                "description": request.description.clone().unwrap_or_default(),
            }))
            .execute::<NoContent>(self.resolver.client())
            .await
    }

    /// 依請求設定專案的群組權限
    async fn grant_permissions(&self, request: &ProjectRequest) -> std::result::Result<(), HttpError> {
        let grants: Vec<(&str, &str)> = if request.special_permission_set {
            [
                (request.admin_group.as_deref(), "PROJECT_ADMIN"),
                (request.user_group.as_deref(), "PROJECT_WRITE"),
                (request.readonly_group.as_deref(), "PROJECT_READ"),
            ]
            .into_iter()
            .filter_map(|(group, permission)| group.filter(|g| !g.trim().is_empty()).map(|g| (g, permission)))
            .collect()
        } else {
            self.config
                .default_user_group
                .as_deref()
                .map(|g| vec![(g, "PROJECT_WRITE")])
                .unwrap_or_default()
        };

        for (group, permission) in grants {
            self.resolver
                .http_put()?
                .url(format!("{}/{}/permissions/groups", self.projects_api(), request.key))
                .query("permission", permission)
                .query("name", group)
                .execute::<NoContent>(self.resolver.client())
                .await?;
            tracing::debug!("🔐 [{}] Granted {} to group {}", request.key, permission, group);
        }
        Ok(())
    }

    async fn create_repository(
        &self,
        project_key: &str,
        name: &str,
        component_id: Option<String>,
    ) -> std::result::Result<RepositoryInfo, HttpError> {
        let response = self
            .resolver
            .http_post()?
            .url(format!("{}/{}/repos", self.projects_api(), project_key))
            .json_body(json!({ "name": name, "scmId": "git", "forkable": true }))
            .execute::<Object<RepositoryResponse>>(self.resolver.client())
            .await?;

        Ok(response.into_info(name, component_id))
    }

    async fn create_webhook(&self, request: &ProjectRequest, slug: &str) -> std::result::Result<(), HttpError> {
        let Some(proxy) = &self.webhook_proxy else {
            return Ok(());
        };
        let target = proxy.webhook_url(
            &request.key.to_lowercase(),
            request.webhook_proxy_secret.as_deref(),
        )?;

        tracing::debug!("📡 [{}] Adding webhook to {} → {}", request.key, slug, mask_secret(&target));

        self.resolver
            .http_post()?
            .url(format!("{}/{}/repos/{}/webhooks", self.projects_api(), request.key, slug))
            .json_body(json!({
                "name": "Jenkins",
                "events": self.config.webhook_events,
                "configuration": {},
                "url": target,
                "active": true,
            }))
            .execute::<NoContent>(self.resolver.client())
            .await
    }

    async fn delete(&self, url: String) -> std::result::Result<(), HttpError> {
        self.resolver
            .http_delete()?
            .url(url)
            .execute::<NoContent>(self.resolver.client())
            .await
    }
}

#[async_trait]
impl SystemAdapter for ScmAdapter {
    fn system(&self) -> SystemKind {
        SystemKind::Scm
    }

    fn adapter_base_uri(&self) -> &str {
        self.config.endpoint.base()
    }

    fn should_run(&self, ctx: &SagaContext) -> bool {
        ctx.request.wants_runtime_platform
    }

    async fn create(&self, ctx: &mut SagaContext) -> Result<()> {
        ctx.transition(SagaState::CreatingScmProject);
        let key = ctx.request.key.clone();

        let existing = ctx.request.scm_url.clone().or_else(|| ctx.result.scm_url.clone());
        if let Some(url) = existing {
            tracing::info!("⏭️ [{}] SCM project already exists at {}, skipping creation", key, url);
            ctx.result.scm_url = Some(url);
        } else {
            self.create_project(&ctx.request)
                .await
                .map_err(|e| ProvisioningError::from_http(self.system(), e))?;

            let url = self.project_url(&key);
            tracing::info!("✅ [{}] SCM project created: {}", key, url);
            ctx.result.scm_url = Some(url.clone());
            ctx.request.scm_url = Some(url.clone());
            ctx.record(self.system(), ArtifactKind::Project { url });

            self.grant_permissions(&ctx.request)
                .await
                .map_err(|e| ProvisioningError::from_http(self.system(), e))?;

            // 輔助 repository 失敗只記錄
            for auxiliary in self.config.auxiliary_repositories.clone() {
                let name = repository_name(&key, &auxiliary);
                match self.create_repository(&key, &name, None).await {
                    Ok(repository) => {
                        tracing::info!("✅ [{}] Auxiliary repository {} created", key, repository.name);
                        ctx.result.repositories.push(repository.clone());
                        ctx.record(self.system(), ArtifactKind::Repository(repository));
                    }
                    Err(e) => tracing::warn!("⚠️ [{}] Auxiliary repository {} failed: {}", key, name, e),
                }
            }
        }

        ctx.transition(SagaState::CreatingScmRepositories);

        let quickstarters = ctx.request.quickstarters.clone();
        let mut failures = Vec::new();

        for quickstarter in &quickstarters {
            let name = repository_name(&key, &quickstarter.component_id);
            match self
                .create_repository(&key, &name, Some(quickstarter.component_id.clone()))
                .await
            {
                Ok(repository) => {
                    tracing::info!("✅ [{}] Repository {} created", key, repository.name);

                    if !self
                        .config
                        .no_webhook_components
                        .iter()
                        .any(|c| c.eq_ignore_ascii_case(&quickstarter.component_type))
                    {
                        if let Err(e) = self.create_webhook(&ctx.request, &repository.name).await {
                            tracing::warn!("⚠️ [{}] Webhook for {} failed: {}", key, repository.name, e);
                        }
                    }

                    ctx.result.repositories.push(repository.clone());
                    ctx.record(self.system(), ArtifactKind::Repository(repository));
                }
                Err(e) => {
                    tracing::error!("❌ [{}] Repository {} failed: {}", key, name, e);
                    failures.push(format!("Repository '{}': {}", name, e));
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
        let key = request.project_key();
        let mut outcome = CleanupOutcome::new();

        for repository in &request.result.repositories {
            let url = format!("{}/{}/repos/{}", self.projects_api(), key, repository.name);
            match self.delete(url).await {
                Ok(()) => tracing::info!("🧹 [{}] Repository {} removed", key, repository.name),
                Err(e) => {
                    let error = ProvisioningError::Compensation {
                        system: self.system(),
                        message: format!("repository {}: {}", repository.name, e),
                    };
                    tracing::warn!("⚠️ [{}] {}", key, error);
                    outcome.record(LeftoverComponent::ScmRepo, 1);
                }
            }
        }

        if request.stage == LifecycleStage::ComponentUpdate || request.result.scm_url.is_none() {
            return outcome;
        }

        match self.delete(format!("{}/{}", self.projects_api(), key)).await {
            Ok(()) => tracing::info!("🧹 [{}] SCM project removed", key),
            Err(e) => {
                let error = ProvisioningError::Compensation {
                    system: self.system(),
                    message: format!("project: {}", e),
                };
                tracing::warn!("⚠️ [{}] {}", key, error);
                outcome.record(LeftoverComponent::ScmProject, 1);
            }
        }

        outcome
    }
}
