use crate::config::toml_config::SystemEndpoint;
use crate::core::auth::CredentialResolver;
use crate::core::http::{HttpError, ListOf};
use crate::core::job_registry::JobDescriptor;
use crate::domain::ports::JobSource;
use async_trait::async_trait;

/// 從遠端目錄讀取 quickstarter job 清單
pub struct HttpJobSource {
    resolver: CredentialResolver,
    endpoint: SystemEndpoint,
}

impl HttpJobSource {
    pub fn new(resolver: CredentialResolver, endpoint: SystemEndpoint) -> Self {
        Self { resolver, endpoint }
    }
}

#[async_trait]
impl JobSource for HttpJobSource {
    async fn fetch_jobs(&self) -> Result<Vec<JobDescriptor>, HttpError> {
        self.resolver
            .http_get()?
            .url(self.endpoint.api())
            .execute::<ListOf<JobDescriptor>>(self.resolver.client())
            .await
    }
}
