//! Issue tracker（Jira 類）adapter

use crate::config::toml_config::{IssueTrackerConfig, ProjectTemplate};
use crate::core::auth::CredentialResolver;
use crate::core::compensation::ArtifactKind;
use crate::core::http::{HttpError, NoContent};
use crate::core::saga::{SagaContext, SagaKind};
use crate::domain::model::{
    CleanupOutcome, CleanupRequest, LeftoverComponent, LifecycleStage, SystemKind,
};
use crate::domain::ports::SystemAdapter;
use crate::utils::error::{ProvisioningError, Result};
use async_trait::async_trait;
use serde_json::json;

pub struct IssueTrackerAdapter {
    resolver: CredentialResolver,
    config: IssueTrackerConfig,
}

impl IssueTrackerAdapter {
    pub fn new(resolver: CredentialResolver, config: IssueTrackerConfig) -> Self {
        Self { resolver, config }
    }

    pub fn project_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.config.endpoint.base(), key)
    }

    async fn create_project(&self, ctx: &SagaContext, template: &ProjectTemplate) -> std::result::Result<(), HttpError> {
        let request = &ctx.request;
        let lead = match &request.admin_user {
            Some(user) if request.special_permission_set && !user.trim().is_empty() => user.clone(),
            _ => self.resolver.resolve()?.username,
        };

        let body = json!({
            "key": request.key,
            "name": request.name,
            "description": request.description.clone().unwrap_or_default(),
            "lead": lead,
            "projectTypeKey": template.project_type_key,
            "projectTemplateKey": template.template_key,
        });

        self.resolver
            .http_post()?
            .url(format!("{}/project", self.config.endpoint.api()))
            .json_body(body)
            .execute::<NoContent>(self.resolver.client())
            .await
    }

    async fn add_shortcut(&self, key: &str, name: &str, url: &str) -> std::result::Result<(), HttpError> {
        self.resolver
            .http_post()?
            .url_template("{base}/rest/projects/1.0/project/{key}/shortcut", &[
                ("base", self.config.endpoint.base()),
                ("key", key),
            ])
            .json_body(json!({ "name": name, "url": url, "icon": "" }))
            .execute::<NoContent>(self.resolver.client())
            .await
    }

    async fn add_component(&self, key: &str, component_id: &str, browse: Option<&str>) -> std::result::Result<(), HttpError> {
        let description = match browse {
            Some(link) => format!("Technology component {} stored at {}", component_id, link),
            None => format!("Technology component {}", component_id),
        };

        self.resolver
            .http_post()?
            .url(format!("{}/component", self.config.endpoint.api()))
            .json_body(json!({
                "name": format!("Technology-{}", component_id),
                "project": key,
                "description": description,
            }))
            .execute::<NoContent>(self.resolver.client())
            .await
    }
}

#[async_trait]
impl SystemAdapter for IssueTrackerAdapter {
    fn system(&self) -> SystemKind {
        SystemKind::IssueTracker
    }

    fn adapter_base_uri(&self) -> &str {
        self.config.endpoint.base()
    }

    fn should_run(&self, ctx: &SagaContext) -> bool {
        ctx.kind == SagaKind::Create && ctx.request.wants_issue_tracker_space
    }

    async fn create(&self, ctx: &mut SagaContext) -> Result<()> {
        let key = ctx.request.key.clone();
        let (template, is_default) = self.config.template_for(ctx.request.project_type.as_deref());

        match self.create_project(ctx, &template).await {
            Ok(()) => {}
            // 專用模板被拒絕時改用預設模板重試一次
            Err(e) if e.status() == Some(400) && !is_default => {
                tracing::warn!(
                    "⚠️ [{}] Template '{}' rejected, retrying with default template: {}",
                    key,
                    template.template_key,
                    e
                );
                self.create_project(ctx, &self.config.default_template())
                    .await
                    .map_err(|e| ProvisioningError::from_http(self.system(), e))?;
            }
            Err(e) => return Err(ProvisioningError::from_http(self.system(), e)),
        }

        let url = self.project_url(&key);
        tracing::info!("✅ [{}] Issue tracker project created: {}", key, url);
        ctx.result.issue_tracker_url = Some(url.clone());
        ctx.record(self.system(), ArtifactKind::Project { url });
        Ok(())
    }

    async fn finalize(&self, ctx: &SagaContext) {
        if !ctx.request.wants_issue_tracker_space || ctx.result.issue_tracker_url.is_none() {
            return;
        }
        let key = ctx.request.key.as_str();

        if self.config.create_shortcuts && ctx.tracker().produced_by(self.system()) {
            let shortcuts = [
                ("Wiki", ctx.result.wiki_url.as_deref()),
                ("Source code", ctx.result.scm_url.as_deref()),
                ("Build engine", ctx.result.build_engine_url.as_deref()),
            ];
            for (name, url) in shortcuts {
                let Some(url) = url else { continue };
                if let Err(e) = self.add_shortcut(key, name, url).await {
                    tracing::warn!("⚠️ [{}] Could not add shortcut '{}': {}", key, name, e);
                }
            }
        }

        if self.config.create_components {
            let new_repositories = ctx.tracker().artifacts().iter().filter_map(|a| match &a.kind {
                ArtifactKind::Repository(repository) if a.system == SystemKind::Scm => {
                    repository.component_id.as_deref().map(|id| (id, repository.links.browse.as_deref()))
                }
                _ => None,
            });

            for (component_id, browse) in new_repositories {
                match self.add_component(key, component_id, browse).await {
                    Ok(()) => tracing::debug!("✅ [{}] Component '{}' added", key, component_id),
                    Err(e) if e.status() == Some(401) => {
                        tracing::warn!("⚠️ [{}] Not allowed to create components, skipping the rest: {}", key, e);
                        break;
                    }
                    Err(e) => tracing::warn!("⚠️ [{}] Could not add component '{}': {}", key, component_id, e),
                }
            }
        }
    }

    async fn cleanup(&self, request: &CleanupRequest) -> CleanupOutcome {
        let key = request.project_key();

        if request.stage == LifecycleStage::ComponentUpdate || request.result.issue_tracker_url.is_none() {
            tracing::debug!("⏭️ [{}] Issue tracker not affected by {} cleanup", key, request.stage);
            return CleanupOutcome::new();
        }

        let outcome = match self.resolver.http_delete() {
            Ok(call) => {
                call.url(format!("{}/project/{}", self.config.endpoint.api(), key))
                    .execute::<NoContent>(self.resolver.client())
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                tracing::info!("🧹 [{}] Issue tracker project removed", key);
                CleanupOutcome::new()
            }
            Err(e) => {
                let error = ProvisioningError::Compensation {
                    system: self.system(),
                    message: e.to_string(),
                };
                tracing::warn!("⚠️ [{}] {}", key, error);
                CleanupOutcome::new().with(LeftoverComponent::BugtrackerProject, 1)
            }
        }
    }
}
