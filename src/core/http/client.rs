use super::error::HttpError;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;

/// 所有 adapter 共用的連線設定，不支援單次呼叫覆寫
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub trust_all_certificates: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            trust_all_certificates: false,
        }
    }
}

/// 共用的 HTTP client（連線池、cookie session）
#[derive(Clone)]
pub struct HttpClient {
    client: Arc<reqwest::Client>,
    settings: HttpSettings,
}

impl HttpClient {
    pub fn new(settings: HttpSettings) -> Result<Self, HttpError> {
        if settings.trust_all_certificates {
            tracing::warn!("⚠️ TLS certificate validation is disabled for all outbound calls");
        }

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .cookie_store(true)
            .danger_accept_invalid_certs(settings.trust_all_certificates)
            .build()
            .map_err(|e| HttpError::InvalidRequest {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        tracing::debug!(
            connect_timeout_secs = settings.connect_timeout.as_secs(),
            read_timeout_secs = settings.read_timeout.as_secs(),
            "📡 HTTP client initialized"
        );

        Ok(Self {
            client: Arc::new(client),
            settings,
        })
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("settings", &self.settings)
            .finish()
    }
}
