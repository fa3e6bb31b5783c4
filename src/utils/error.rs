use crate::core::http::HttpError;
use crate::domain::model::{CleanupOutcome, SystemKind};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// saga 層級的錯誤
#[derive(Error, Debug)]
pub enum ProvisioningError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Precondition check failed, unknown identities: {failures:?}")]
    Precondition { failures: BTreeMap<String, String> },

    #[error("Project '{key}' not found")]
    NotFound { key: String },

    #[error("Project '{key}' already exists")]
    Conflict { key: String },

    #[error("[{system}] {source}")]
    Transport {
        system: SystemKind,
        #[source]
        source: HttpError,
    },

    #[error("[{system}] {source}")]
    RemoteSystem {
        system: SystemKind,
        #[source]
        source: HttpError,
    },

    /// 逐項處理時部分項目失敗（例如某個 quickstarter 的 repository）
    #[error("[{system}] {} item(s) failed: {}", .failures.len(), .failures.join("; "))]
    PartialFailure {
        system: SystemKind,
        failures: Vec<String>,
    },

    #[error("[{system}] {message}")]
    Step { system: SystemKind, message: String },

    #[error("[{system}] Compensation failed: {message}")]
    Compensation { system: SystemKind, message: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ProvisioningError {
    /// 依 HTTP 錯誤的種類分類
    pub fn from_http(system: SystemKind, error: HttpError) -> Self {
        match error {
            HttpError::InvalidRequest { message } => ProvisioningError::Step { system, message },
            e if e.is_transport() => ProvisioningError::Transport { system, source: e },
            e => ProvisioningError::RemoteSystem { system, source: e },
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ProvisioningError::Validation {
            message: message.into(),
        }
    }

    /// 在任何外部建立呼叫之前就失敗
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ProvisioningError::Validation { .. }
                | ProvisioningError::Precondition { .. }
                | ProvisioningError::NotFound { .. }
                | ProvisioningError::Conflict { .. }
        )
    }

    pub fn status(&self) -> u16 {
        match self {
            ProvisioningError::Validation { .. } | ProvisioningError::Precondition { .. } => 400,
            ProvisioningError::NotFound { .. } => 404,
            ProvisioningError::Conflict { .. } => 409,
            _ => 500,
        }
    }

    /// 顯示給使用者的錯誤訊息；遠端錯誤會附上回應內容
    pub fn messages(&self) -> Vec<String> {
        match self {
            ProvisioningError::Precondition { failures } => failures
                .iter()
                .map(|(field, value)| format!("{} '{}' does not exist", field, value))
                .collect(),
            ProvisioningError::PartialFailure { system, failures } => failures
                .iter()
                .map(|failure| format!("[{}] {}", system, failure))
                .collect(),
            other => vec![other.to_string()],
        }
    }
}

/// 設定載入與驗證錯誤
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error in {field}: {message}")]
    Parse { field: String, message: String },

    #[error("Invalid configuration value for '{field}': '{value}' - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ConfigError::Io(_) => "Check that the configuration file exists and is readable",
            ConfigError::Parse { .. } => "Check the TOML syntax and the referenced environment variables",
            ConfigError::InvalidValue { .. } => "Correct the configuration value and retry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureStage {
    Validation,
    Creation,
    Rollback,
}

/// 回傳給呼叫端的失敗結果，不含任何內部堆疊
#[derive(Error, Debug, Serialize)]
#[error("{stage:?} failed with status {status}: {}", .errors.join("; "))]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningFailure {
    pub stage: FailureStage,
    pub status: u16,
    pub errors: Vec<String>,
    /// 清理後仍殘留的元件，依系統分類
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub leftovers: BTreeMap<SystemKind, CleanupOutcome>,
}

impl ProvisioningFailure {
    pub fn validation(error: &ProvisioningError) -> Self {
        Self {
            stage: FailureStage::Validation,
            status: error.status(),
            errors: error.messages(),
            leftovers: BTreeMap::new(),
        }
    }

    /// 建立失敗後的結果；任何清理殘留都讓階段變成 `ROLLBACK`
    pub fn after_compensation(
        error: &ProvisioningError,
        outcomes: BTreeMap<SystemKind, CleanupOutcome>,
    ) -> Self {
        let leftovers: BTreeMap<SystemKind, CleanupOutcome> = outcomes
            .into_iter()
            .filter(|(_, outcome)| !outcome.is_empty())
            .collect();

        let mut errors = error.messages();
        let stage = if leftovers.is_empty() {
            FailureStage::Creation
        } else {
            for (system, outcome) in &leftovers {
                for (component, count) in outcome.iter() {
                    errors.push(format!(
                        "[{}] Cleanup left {} {:?} behind",
                        system, count, component
                    ));
                }
            }
            FailureStage::Rollback
        };

        Self {
            stage,
            status: error.status(),
            errors,
            leftovers,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisioningError>;
