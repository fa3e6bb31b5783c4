//! 專案紀錄儲存
//!
//! 紀錄保存在記憶體中；CLI 可以指定 JSON 檔案，在啟動時載入、每次寫入後存回。

use crate::domain::model::ProjectRecord;
use crate::domain::ports::ProjectStore;
use crate::utils::error::{ProvisioningError, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    records: RwLock<HashMap<String, ProjectRecord>>,
    file: Option<PathBuf>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ProjectRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.request.key.clone(), record))
            .collect();
        Self {
            records: RwLock::new(records),
            file: None,
        }
    }

    /// 從 JSON 檔案載入；檔案不存在時從空的開始
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let records: Vec<ProjectRecord> = if path.exists() {
            let data = fs::read(path).map_err(|e| store_error(path, e))?;
            serde_json::from_slice(&data).map_err(|e| store_error(path, e))?
        } else {
            Vec::new()
        };

        tracing::info!("📂 Loaded {} project record(s) from {}", records.len(), path.display());
        let mut store = Self::with_records(records);
        store.file = Some(path.to_path_buf());
        Ok(store)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let data = serde_json::to_vec_pretty(&self.records()).map_err(|e| store_error(path, e))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| store_error(path, e))?;
        }
        fs::write(path, data).map_err(|e| store_error(path, e))?;
        Ok(())
    }

    /// 依 key 排序的所有紀錄
    pub fn records(&self) -> Vec<ProjectRecord> {
        let mut records: Vec<ProjectRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.request.key.cmp(&b.request.key));
        records
    }

    fn persist(&self) -> Result<()> {
        match &self.file {
            Some(path) => self.save_to_file(path),
            None => Ok(()),
        }
    }
}

fn store_error(path: &Path, error: impl std::fmt::Display) -> ProvisioningError {
    ProvisioningError::Store {
        message: format!("{}: {}", path.display(), error),
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn get(&self, key: &str) -> Result<Option<ProjectRecord>> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn create(&self, record: ProjectRecord) -> Result<()> {
        let key = record.request.key.clone();
        {
            let mut records = self.records.write();
            if records.contains_key(&key) {
                return Err(ProvisioningError::Conflict { key });
            }
            records.insert(key, record);
        }
        self.persist()
    }

    async fn update(&self, mut record: ProjectRecord) -> Result<()> {
        let key = record.request.key.clone();
        {
            let mut records = self.records.write();
            let Some(existing) = records.get(&key) else {
                return Err(ProvisioningError::NotFound { key });
            };
            record.created_at = existing.created_at;
            record.updated_at = Utc::now();
            records.insert(key, record);
        }
        self.persist()
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.records.write().remove(key).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }
}
