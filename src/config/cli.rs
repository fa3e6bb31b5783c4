use crate::adapters::InMemoryProjectStore;
use crate::core::auth::StaticIdentity;
use crate::domain::model::{LifecycleStage, ProjectRequest};
use crate::utils::error::{ConfigError, ProvisioningError};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Parser)]
#[command(name = "project-provisioner")]
#[command(about = "Provision projects across issue tracker, wiki, source control and CI")]
pub struct Cli {
    #[arg(long, short, env = "PROVISIONER_CONFIG", default_value = "provisioner.toml")]
    pub config: PathBuf,

    /// 專案紀錄的 JSON 檔案
    #[arg(long, env = "PROVISIONER_STORE", default_value = "projects.json")]
    pub store: PathBuf,

    /// 沒有設定技術帳號的系統以此使用者呼叫
    #[arg(long, env = "PROVISIONER_USER")]
    pub user: Option<String>,

    #[arg(long, env = "PROVISIONER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// 建立新專案
    Create {
        #[arg(long)]
        request: PathBuf,
    },
    /// 為既有專案新增 component
    Update {
        #[arg(long)]
        request: PathBuf,
    },
    /// 清理已儲存的專案
    Cleanup {
        #[arg(long)]
        key: String,
        #[arg(long, value_enum, default_value = "initial-creation")]
        stage: LifecycleStage,
        /// 只清理這些 component（`component-update` 時使用）
        #[arg(long = "component", value_delimiter = ',')]
        components: Vec<String>,
    },
    /// 只檢查設定檔
    ValidateConfig,
}

impl Cli {
    pub fn identity(&self) -> StaticIdentity {
        StaticIdentity::new(self.user.clone(), self.password.clone())
    }

    pub fn open_store(&self) -> Result<InMemoryProjectStore, ProvisioningError> {
        InMemoryProjectStore::load_from_file(&self.store)
    }
}

/// 讀取 JSON 格式的專案請求
pub fn read_request<P: AsRef<Path>>(path: P) -> Result<ProjectRequest, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
        field: path.display().to_string(),
        message: format!("JSON parsing error: {}", e),
    })
}
