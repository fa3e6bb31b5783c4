//! CI job registry
//!
//! 讀多寫少：查詢時取得目前 map 的快照，定期更新時整個 map 一次替換。
//! registry 由呼叫端建立後注入 orchestrator，不是全域單例。

use crate::core::http::HttpError;
use crate::domain::ports::JobSource;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// 一個可執行的 CI job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub repository: String,
    /// repository 所在的 SCM 專案
    #[serde(default = "default_parent_project", alias = "gitParentProject")]
    pub git_parent_project: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_jenkinsfile_path", alias = "jenkinsfilePath")]
    pub jenkinsfile_path: String,
    /// 管理用 job（刪除專案、刪除 component）
    #[serde(default, alias = "adminJob")]
    pub admin_job: bool,
}

fn default_parent_project() -> String {
    "opendevstack".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_jenkinsfile_path() -> String {
    "Jenkinsfile".to_string()
}

#[derive(Error, Debug, PartialEq)]
pub enum JobRegistryError {
    #[error("Cannot find quickstarter with id={id}. Available jobs: {available}")]
    NotFound { id: String, available: String },
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<Arc<HashMap<String, JobDescriptor>>>>,
}

impl JobRegistry {
    pub fn new(jobs: Vec<JobDescriptor>) -> Self {
        let registry = Self::default();
        registry.replace_all(jobs);
        registry
    }

    /// 整個替換，後寫入者為準
    pub fn replace_all(&self, jobs: Vec<JobDescriptor>) {
        let map: HashMap<String, JobDescriptor> =
            jobs.into_iter().map(|job| (job.id.clone(), job)).collect();
        *self.jobs.write() = Arc::new(map);
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, JobDescriptor>> {
        Arc::clone(&self.jobs.read())
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// 以 id 精確比對，或以名稱（不分大小寫）比對
    pub fn find_by_name_or_id(&self, name_or_id: &str) -> Result<JobDescriptor, JobRegistryError> {
        let jobs = self.snapshot();

        if let Some(job) = jobs.get(name_or_id) {
            return Ok(job.clone());
        }

        jobs.values()
            .find(|job| job.name.eq_ignore_ascii_case(name_or_id))
            .cloned()
            .ok_or_else(|| {
                let mut available: Vec<&str> = jobs.values().map(|job| job.name.as_str()).collect();
                available.sort();
                JobRegistryError::NotFound {
                    id: name_or_id.to_string(),
                    available: available.join(", "),
                }
            })
    }

    /// 從來源重新載入；失敗時保留原本的內容
    pub async fn refresh_from(&self, source: &dyn JobSource) -> Result<usize, HttpError> {
        let jobs = source.fetch_jobs().await?;
        let count = jobs.len();
        self.replace_all(jobs);
        tracing::info!("🔄 Job registry refreshed with {} job(s)", count);
        Ok(count)
    }

    pub fn spawn_periodic_refresh(
        &self,
        source: Arc<dyn JobSource>,
        every: Duration,
    ) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(e) = registry.refresh_from(source.as_ref()).await {
                    tracing::warn!("⚠️ Job registry refresh failed, keeping {} job(s): {}", registry.len(), e);
                }
            }
        })
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry").field("jobs", &self.len()).finish()
    }
}
