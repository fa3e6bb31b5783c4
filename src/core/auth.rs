//! 認證解析：技術帳號或委派給目前操作的使用者
//!
//! 每個 adapter 以自己的設定前綴建立 [`CredentialResolver`]。
//! 若該前綴同時設定了 `admin_user` 與 `admin_password`，所有呼叫都使用技術帳號，
//! 否則使用 [`SessionIdentity`] 提供的目前使用者。模式只在啟動時決定一次。

use crate::core::http::{HttpCall, HttpClient, HttpError};
use reqwest::Method;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialMode {
    TechnicalUser,
    DelegatedUser,
}

/// 帳號密碼，只在單次請求期間持有，不會寫入任何地方
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    secret: String,
    pub mode: CredentialMode,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>, mode: CredentialMode) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
            mode,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"***")
            .field("mode", &self.mode)
            .finish()
    }
}

/// 目前操作中的使用者（由外部 session 提供）
pub trait SessionIdentity: Send + Sync {
    fn user_name(&self) -> Option<String>;
    fn user_secret(&self) -> Option<String>;
}

/// 固定的使用者身分，CLI 從參數或環境變數建立
#[derive(Clone, Default)]
pub struct StaticIdentity {
    name: Option<String>,
    secret: Option<String>,
}

impl StaticIdentity {
    pub fn new(name: Option<String>, secret: Option<String>) -> Self {
        Self { name, secret }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl SessionIdentity for StaticIdentity {
    fn user_name(&self) -> Option<String> {
        self.name.clone()
    }

    fn user_secret(&self) -> Option<String> {
        self.secret.clone()
    }
}

pub struct CredentialResolver {
    prefix: String,
    technical: Option<Credentials>,
    identity: Arc<dyn SessionIdentity>,
    client: HttpClient,
}

impl CredentialResolver {
    pub fn new(
        prefix: impl Into<String>,
        admin_user: Option<&str>,
        admin_password: Option<&str>,
        identity: Arc<dyn SessionIdentity>,
        client: HttpClient,
    ) -> Self {
        let prefix = prefix.into();

        let technical = match (admin_user, admin_password) {
            (Some(user), Some(password)) if !user.trim().is_empty() && !password.is_empty() => {
                Some(Credentials::new(user, password, CredentialMode::TechnicalUser))
            }
            _ => None,
        };

        match &technical {
            Some(credentials) => tracing::info!(
                "🔐 [{}] Calls use technical user '{}'",
                prefix,
                credentials.username
            ),
            None => tracing::info!("🔐 [{}] Calls are delegated to the acting user", prefix),
        }

        Self {
            prefix,
            technical,
            identity,
            client,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn mode(&self) -> CredentialMode {
        if self.technical.is_some() {
            CredentialMode::TechnicalUser
        } else {
            CredentialMode::DelegatedUser
        }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub fn resolve(&self) -> Result<Credentials, HttpError> {
        if let Some(technical) = &self.technical {
            return Ok(technical.clone());
        }

        match (self.identity.user_name(), self.identity.user_secret()) {
            (Some(name), Some(secret)) if !name.trim().is_empty() => {
                Ok(Credentials::new(name, secret, CredentialMode::DelegatedUser))
            }
            _ => Err(HttpError::InvalidRequest {
                message: format!(
                    "[{}] No technical user configured and no acting user available",
                    self.prefix
                ),
            }),
        }
    }

    pub fn http_get(&self) -> Result<HttpCall, HttpError> {
        self.authenticated(Method::GET)
    }

    pub fn http_post(&self) -> Result<HttpCall, HttpError> {
        self.authenticated(Method::POST)
    }

    pub fn http_put(&self) -> Result<HttpCall, HttpError> {
        self.authenticated(Method::PUT)
    }

    pub fn http_delete(&self) -> Result<HttpCall, HttpError> {
        self.authenticated(Method::DELETE)
    }

    /// 不帶認證的呼叫（例如 webhook proxy 以 secret 驗證）
    pub fn unauthenticated(&self, method: Method) -> HttpCall {
        HttpCall::new(method)
    }

    fn authenticated(&self, method: Method) -> Result<HttpCall, HttpError> {
        Ok(HttpCall::new(method).basic_auth(self.resolve()?))
    }
}
