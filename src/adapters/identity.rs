//! 身分系統（Crowd 類）查詢

use crate::config::toml_config::SystemEndpoint;
use crate::core::auth::CredentialResolver;
use crate::core::http::{HttpError, NoContent};
use crate::domain::ports::IdentityDirectory;
use async_trait::async_trait;

pub struct RestIdentityDirectory {
    resolver: CredentialResolver,
    endpoint: SystemEndpoint,
}

impl RestIdentityDirectory {
    pub fn new(resolver: CredentialResolver, endpoint: SystemEndpoint) -> Self {
        Self { resolver, endpoint }
    }

    async fn lookup(&self, resource: &str, param: &str, name: &str) -> Result<bool, HttpError> {
        let outcome = self
            .resolver
            .http_get()?
            .url(format!("{}/{}", self.endpoint.api(), resource))
            .query(param, name)
            .execute::<NoContent>(self.resolver.client())
            .await;

        match outcome {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl IdentityDirectory for RestIdentityDirectory {
    async fn group_exists(&self, group: &str) -> Result<bool, HttpError> {
        self.lookup("group", "groupname", group).await
    }

    async fn user_exists(&self, user: &str) -> Result<bool, HttpError> {
        self.lookup("user", "username", user).await
    }
}
