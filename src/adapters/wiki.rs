//! Wiki / 協作空間（Confluence 類）adapter

use crate::config::toml_config::WikiConfig;
use crate::core::auth::CredentialResolver;
use crate::core::compensation::ArtifactKind;
use crate::core::http::{HttpError, NoContent, RawText};
use crate::core::saga::{SagaContext, SagaKind};
use crate::domain::model::{
    CleanupOutcome, CleanupRequest, LeftoverComponent, LifecycleStage, ProjectRequest, SystemKind,
};
use crate::domain::ports::SystemAdapter;
use crate::utils::error::{ProvisioningError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;

pub struct WikiAdapter {
    resolver: CredentialResolver,
    config: WikiConfig,
}

impl WikiAdapter {
    pub fn new(resolver: CredentialResolver, config: WikiConfig) -> Self {
        Self { resolver, config }
    }

    pub fn space_url(&self, key: &str) -> String {
        format!("{}/display/{}", self.config.endpoint.base(), key)
    }

    async fn create_space(&self, request: &ProjectRequest) -> std::result::Result<String, HttpError> {
        let mut call = self.resolver.http_post()?;

        if let Some(path) = &self.config.pre_auth_path {
            let credentials = self.resolver.resolve()?;
            let mut form = BTreeMap::new();
            form.insert("os_username".to_string(), credentials.username.clone());
            form.insert("os_password".to_string(), credentials.secret().to_string());
            call = call.pre_auth(format!("{}{}", self.config.endpoint.base(), path), form);
        }

        let description = request.description.clone().unwrap_or_default();
        let body = json!({
            "spaceBlueprintId": self.config.blueprint_for(request.project_type.as_deref()),
            "name": request.name,
            "spaceKey": request.key,
            "description": description,
            "context": {
                "name": request.name,
                "spaceKey": request.key,
                "description": description,
            },
        });

        let response = call
            .url(format!(
                "{}/create-dialog/1.0/space-blueprint/create-space",
                self.config.endpoint.api()
            ))
            .json_body(body)
            .execute::<RawText>(self.resolver.client())
            .await?;

        Ok(self.extract_space_url(&response, &request.key))
    }

    /// 回應中有 `url` 或 `_links` 就使用，否則依 key 推算
    fn extract_space_url(&self, response: &str, key: &str) -> String {
        let parsed: Option<serde_json::Value> = serde_json::from_str(response).ok();
        let from_response = parsed.and_then(|value| {
            if let Some(url) = value.get("url").and_then(|u| u.as_str()) {
                return Some(url.to_string());
            }
            let links = value.get("_links")?;
            let base = links.get("base")?.as_str()?;
            let webui = links.get("webui")?.as_str()?;
            Some(format!("{}{}", base, webui))
        });

        from_response.unwrap_or_else(|| self.space_url(key))
    }
}

#[async_trait]
impl SystemAdapter for WikiAdapter {
    fn system(&self) -> SystemKind {
        SystemKind::Wiki
    }

    fn adapter_base_uri(&self) -> &str {
        self.config.endpoint.base()
    }

    fn should_run(&self, ctx: &SagaContext) -> bool {
        ctx.kind == SagaKind::Create && ctx.request.wants_issue_tracker_space
    }

    async fn create(&self, ctx: &mut SagaContext) -> Result<()> {
        let url = self
            .create_space(&ctx.request)
            .await
            .map_err(|e| ProvisioningError::from_http(self.system(), e))?;

        tracing::info!("✅ [{}] Wiki space created: {}", ctx.request.key, url);
        ctx.result.wiki_url = Some(url.clone());
        ctx.record(self.system(), ArtifactKind::Project { url });
        Ok(())
    }

    async fn cleanup(&self, request: &CleanupRequest) -> CleanupOutcome {
        let key = request.project_key();

        if request.stage == LifecycleStage::ComponentUpdate || request.result.wiki_url.is_none() {
            tracing::debug!("⏭️ [{}] Wiki not affected by {} cleanup", key, request.stage);
            return CleanupOutcome::new();
        }

        let outcome = match self.resolver.http_delete() {
            Ok(call) => {
                call.url(format!("{}/api/space/{}", self.config.endpoint.api(), key))
                    .execute::<NoContent>(self.resolver.client())
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                tracing::info!("🧹 [{}] Wiki space removed", key);
                CleanupOutcome::new()
            }
            Err(e) => {
                let error = ProvisioningError::Compensation {
                    system: self.system(),
                    message: e.to_string(),
                };
                tracing::warn!("⚠️ [{}] {}", key, error);
                CleanupOutcome::new().with(LeftoverComponent::CollaborationSpace, 1)
            }
        }
    }
}
