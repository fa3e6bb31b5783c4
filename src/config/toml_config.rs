use crate::core::http::HttpSettings;
use crate::core::job_registry::JobDescriptor;
use crate::utils::error::ConfigError;
use crate::utils::validation::{
    validate_non_empty_string, validate_placeholder, validate_positive_number, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TEMPLATE: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    pub identity: SystemEndpoint,
    pub issue_tracker: IssueTrackerConfig,
    pub wiki: WikiConfig,
    pub scm: ScmConfig,
    pub ci: CiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// 只用於開發環境
    #[serde(default)]
    pub trust_all_certificates: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            trust_all_certificates: false,
        }
    }
}

impl HttpConfig {
    pub fn settings(&self) -> HttpSettings {
        HttpSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            trust_all_certificates: self.trust_all_certificates,
        }
    }
}

/// 每個外部系統共用的連線設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemEndpoint {
    pub base_url: String,
    #[serde(default)]
    pub api_path: String,
    #[serde(default)]
    pub admin_user: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

impl SystemEndpoint {
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// `{base_url}{api_path}`
    pub fn api(&self) -> String {
        format!("{}{}", self.base(), self.api_path.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTemplate {
    pub template_key: String,
    pub project_type_key: String,
}

impl Default for ProjectTemplate {
    fn default() -> Self {
        Self {
            template_key: "com.pyxis.greenhopper.jira:gh-scrum-template".to_string(),
            project_type_key: "software".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueTrackerConfig {
    #[serde(flatten)]
    pub endpoint: SystemEndpoint,
    /// project type → 模板，`default` 為預設
    #[serde(default)]
    pub project_templates: BTreeMap<String, ProjectTemplate>,
    #[serde(default = "default_true")]
    pub create_components: bool,
    #[serde(default = "default_true")]
    pub create_shortcuts: bool,
}

impl IssueTrackerConfig {
    pub fn default_template(&self) -> ProjectTemplate {
        self.project_templates
            .get(DEFAULT_TEMPLATE)
            .cloned()
            .unwrap_or_default()
    }

    /// 回傳模板，以及它是否就是預設模板
    pub fn template_for(&self, project_type: Option<&str>) -> (ProjectTemplate, bool) {
        match project_type.and_then(|t| self.project_templates.get(t)) {
            Some(template) if project_type != Some(DEFAULT_TEMPLATE) => (template.clone(), false),
            _ => (self.default_template(), true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiConfig {
    #[serde(flatten)]
    pub endpoint: SystemEndpoint,
    /// project type → blueprint id，`default` 為預設
    #[serde(default)]
    pub blueprints: BTreeMap<String, String>,
    /// 表單登入路徑，例如 `/dologin.action`
    #[serde(default)]
    pub pre_auth_path: Option<String>,
}

impl WikiConfig {
    pub fn blueprint_for(&self, project_type: Option<&str>) -> String {
        project_type
            .and_then(|t| self.blueprints.get(t))
            .or_else(|| self.blueprints.get(DEFAULT_TEMPLATE))
            .cloned()
            .unwrap_or_else(|| {
                "com.atlassian.confluence.plugins.confluence-space-blueprints:documentation-space-blueprint"
                    .to_string()
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScmConfig {
    #[serde(flatten)]
    pub endpoint: SystemEndpoint,
    #[serde(default = "default_auxiliary_repositories")]
    pub auxiliary_repositories: Vec<String>,
    /// 沒有特殊權限設定時給予寫入權限的群組
    #[serde(default)]
    pub default_user_group: Option<String>,
    #[serde(default = "default_webhook_events")]
    pub webhook_events: Vec<String>,
    /// 不建立 webhook 的 component type
    #[serde(default)]
    pub no_webhook_components: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiConfig {
    /// `{project}` 與 `{domain}`
    #[serde(default = "default_webhook_proxy_pattern")]
    pub webhook_proxy_url_pattern: String,
    #[serde(default = "default_build_engine_pattern")]
    pub build_engine_url_pattern: String,
    /// `{namespace}` 與 `{domain}`，用於 permalink
    #[serde(default = "default_jenkins_pattern")]
    pub jenkins_url_pattern: String,
    #[serde(default = "default_dev_env_pattern")]
    pub dev_env_url_pattern: String,
    #[serde(default = "default_test_env_pattern")]
    pub test_env_url_pattern: String,
    pub domain: String,
    #[serde(default)]
    pub console_url: String,
    pub trigger_secret: String,
    #[serde(default = "default_group_pattern")]
    pub group_pattern: String,
    #[serde(default = "default_ods_ref")]
    pub ods_image_tag: String,
    #[serde(default = "default_ods_ref")]
    pub ods_git_ref: String,
    #[serde(default)]
    pub admin_jobs: AdminJobs,
    #[serde(default)]
    pub jobs: Vec<JobDescriptor>,
    #[serde(default)]
    pub job_catalog: Option<SystemEndpoint>,
    #[serde(default = "default_refresh_interval")]
    pub job_refresh_interval_secs: u64,
}

/// 管理用 job 的 id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminJobs {
    #[serde(default)]
    pub create_projects: Option<String>,
    #[serde(default)]
    pub delete_projects: Option<String>,
    #[serde(default)]
    pub delete_components: Option<String>,
}

fn default_connect_timeout() -> u64 {
    crate::core::http::client::DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_read_timeout() -> u64 {
    crate::core::http::client::DEFAULT_READ_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_auxiliary_repositories() -> Vec<String> {
    vec!["occonfig-artifacts".to_string(), "design".to_string()]
}

fn default_webhook_events() -> Vec<String> {
    vec![
        "repo:refs_changed".to_string(),
        "pr:merged".to_string(),
        "pr:declined".to_string(),
    ]
}

fn default_webhook_proxy_pattern() -> String {
    "https://webhook-proxy-{project}-cd{domain}".to_string()
}

fn default_build_engine_pattern() -> String {
    "https://jenkins-{project}-cd{domain}".to_string()
}

fn default_jenkins_pattern() -> String {
    "https://jenkins-{namespace}{domain}".to_string()
}

fn default_dev_env_pattern() -> String {
    "{console}/console/project/{project}-dev".to_string()
}

fn default_test_env_pattern() -> String {
    "{console}/console/project/{project}-test".to_string()
}

fn default_group_pattern() -> String {
    "org.opendevstack.{project}".to_string()
}

fn default_ods_ref() -> String {
    "latest".to_string()
}

fn default_refresh_interval() -> u64 {
    300
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ConfigError::Parse {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${SCM_PASSWORD})，未設定的保留原字串
    fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::Parse {
            field: "env_substitution".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn job_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.ci.job_refresh_interval_secs)
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        validate_positive_number("http.connect_timeout_secs", self.http.connect_timeout_secs, 1)?;
        validate_positive_number("http.read_timeout_secs", self.http.read_timeout_secs, 1)?;

        validate_url("identity.base_url", &self.identity.base_url)?;
        validate_url("issue_tracker.base_url", &self.issue_tracker.endpoint.base_url)?;
        validate_url("wiki.base_url", &self.wiki.endpoint.base_url)?;
        validate_url("scm.base_url", &self.scm.endpoint.base_url)?;

        validate_placeholder("ci.webhook_proxy_url_pattern", &self.ci.webhook_proxy_url_pattern, "project")?;
        validate_placeholder("ci.build_engine_url_pattern", &self.ci.build_engine_url_pattern, "project")?;
        validate_placeholder("ci.jenkins_url_pattern", &self.ci.jenkins_url_pattern, "namespace")?;
        validate_non_empty_string("ci.trigger_secret", &self.ci.trigger_secret)?;

        if let Some(catalog) = &self.ci.job_catalog {
            validate_url("ci.job_catalog.base_url", &catalog.base_url)?;
            validate_positive_number("ci.job_refresh_interval_secs", self.ci.job_refresh_interval_secs, 1)?;
        }

        for job in &self.ci.jobs {
            validate_non_empty_string("ci.jobs.id", &job.id)?;
            validate_non_empty_string("ci.jobs.repository", &job.repository)?;
        }

        Ok(())
    }
}
