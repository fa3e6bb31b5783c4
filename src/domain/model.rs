use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 一次建立或更新專案的請求
///
/// 兩個功能旗標未指定時都是 `true`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequest {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// 選擇各系統使用的模板
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default = "default_true")]
    pub wants_issue_tracker_space: bool,
    #[serde(default = "default_true")]
    pub wants_runtime_platform: bool,
    #[serde(default)]
    pub quickstarters: Vec<QuickstarterRequest>,
    #[serde(default)]
    pub special_permission_set: bool,
    #[serde(default)]
    pub admin_group: Option<String>,
    #[serde(default)]
    pub user_group: Option<String>,
    #[serde(default)]
    pub readonly_group: Option<String>,
    #[serde(default)]
    pub admin_user: Option<String>,
    /// 已存在的 SCM 專案 URL；有值時跳過建立 SCM 專案
    #[serde(default)]
    pub scm_url: Option<String>,
    /// webhook proxy 的專案 secret，建立平台專案時產生
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_proxy_secret: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for ProjectRequest {
    fn default() -> Self {
        Self {
            key: String::new(),
            name: String::new(),
            description: None,
            project_type: None,
            wants_issue_tracker_space: true,
            wants_runtime_platform: true,
            quickstarters: Vec::new(),
            special_permission_set: false,
            admin_group: None,
            user_group: None,
            readonly_group: None,
            admin_user: None,
            scm_url: None,
            webhook_proxy_secret: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickstarterRequest {
    pub component_id: String,
    pub component_type: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// saga 過程中逐步累積的結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_tracker_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wiki_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scm_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_engine_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_env_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_env_url: Option<String>,
    #[serde(default)]
    pub repositories: Vec<RepositoryInfo>,
    #[serde(default)]
    pub executions: Vec<ExecutionInfo>,
}

impl ProvisioningResult {
    pub fn repositories_for_components(&self) -> impl Iterator<Item = &RepositoryInfo> {
        self.repositories.iter().filter(|r| r.component_id.is_some())
    }

    pub fn has_component(&self, component_id: &str) -> bool {
        self.repositories
            .iter()
            .any(|r| r.component_id.as_deref() == Some(component_id))
            || self.executions.iter().any(|e| e.component_id == component_id)
    }

    /// 合併另一次 saga 的結果；已存在的 URL 不會被覆蓋
    pub fn merge(&mut self, other: ProvisioningResult) {
        fn keep_or_take(target: &mut Option<String>, incoming: Option<String>) {
            if target.is_none() {
                *target = incoming;
            }
        }

        keep_or_take(&mut self.issue_tracker_url, other.issue_tracker_url);
        keep_or_take(&mut self.wiki_url, other.wiki_url);
        keep_or_take(&mut self.scm_url, other.scm_url);
        keep_or_take(&mut self.build_engine_url, other.build_engine_url);
        keep_or_take(&mut self.dev_env_url, other.dev_env_url);
        keep_or_take(&mut self.test_env_url, other.test_env_url);

        for repository in other.repositories {
            if !self.repositories.iter().any(|r| r.name == repository.name) {
                self.repositories.push(repository);
            }
        }
        for execution in other.executions {
            if !self.executions.contains(&execution) {
                self.executions.push(execution);
            }
        }
    }

    /// 移除指定 component 的 repository 與 execution，輔助 repository 保留
    pub fn remove_components(&mut self, component_ids: &[String]) {
        let removed = |id: &str| component_ids.iter().any(|c| c.eq_ignore_ascii_case(id));
        self.repositories
            .retain(|r| !r.component_id.as_deref().is_some_and(removed));
        self.executions.retain(|e| !removed(&e.component_id));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryInfo {
    pub name: String,
    /// 輔助 repository 沒有對應的 component
    #[serde(default)]
    pub component_id: Option<String>,
    #[serde(default)]
    pub links: RepositoryLinks,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_http: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_ssh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browse: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInfo {
    pub component_id: String,
    pub job_name: String,
    pub permalink: String,
}

/// 已儲存的專案紀錄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub request: ProjectRequest,
    pub result: ProvisioningResult,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRecord {
    pub fn new(request: ProjectRequest, result: ProvisioningResult) -> Self {
        let now = Utc::now();
        Self {
            request,
            result,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStage {
    /// 整個專案剛建立
    InitialCreation,
    /// 只處理新增的 component
    ComponentUpdate,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleStage::InitialCreation => write!(f, "INITIAL_CREATION"),
            LifecycleStage::ComponentUpdate => write!(f, "COMPONENT_UPDATE"),
        }
    }
}

/// 外部系統，排序即為依賴順序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemKind {
    IssueTracker,
    Wiki,
    Scm,
    Ci,
}

impl fmt::Display for SystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SystemKind::IssueTracker => "issue-tracker",
            SystemKind::Wiki => "wiki",
            SystemKind::Scm => "scm",
            SystemKind::Ci => "ci",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeftoverComponent {
    CollaborationSpace,
    BugtrackerProject,
    ScmProject,
    ScmRepo,
    Quickstarter,
    PltfProject,
    ProjectDb,
}

/// 清理後仍殘留的元件數量；空的代表清理完全成功
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CleanupOutcome {
    leftovers: BTreeMap<LeftoverComponent, u32>,
}

impl CleanupOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, component: LeftoverComponent, count: u32) {
        if count > 0 {
            *self.leftovers.entry(component).or_insert(0) += count;
        }
    }

    pub fn with(mut self, component: LeftoverComponent, count: u32) -> Self {
        self.record(component, count);
        self
    }

    pub fn get(&self, component: LeftoverComponent) -> u32 {
        self.leftovers.get(&component).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.leftovers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LeftoverComponent, &u32)> {
        self.leftovers.iter()
    }
}

/// 獨立清理的結果：各系統的殘留，加上專案紀錄本身
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    #[serde(flatten)]
    pub systems: BTreeMap<SystemKind, CleanupOutcome>,
    #[serde(rename = "project-store", skip_serializing_if = "CleanupOutcome::is_empty")]
    pub store: CleanupOutcome,
}

impl CleanupReport {
    pub fn system(&self, system: SystemKind) -> Option<&CleanupOutcome> {
        self.systems.get(&system)
    }

    pub fn is_clean(&self) -> bool {
        self.store.is_empty() && self.systems.values().all(CleanupOutcome::is_empty)
    }
}

/// 交給 adapter 清理的範圍
///
/// `result` 只包含要移除的產物：初次建立時是整個 saga 的結果，
/// component 更新時只有這次新增的 repository 與 execution。
#[derive(Debug, Clone)]
pub struct CleanupRequest {
    pub stage: LifecycleStage,
    pub request: ProjectRequest,
    pub result: ProvisioningResult,
}

impl CleanupRequest {
    pub fn project_key(&self) -> &str {
        &self.request.key
    }

    /// 要清理的 component id（依結果中的 repository 與 execution）
    pub fn component_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .result
            .repositories_for_components()
            .filter_map(|r| r.component_id.clone())
            .chain(self.result.executions.iter().map(|e| e.component_id.clone()))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository(name: &str, component: Option<&str>) -> RepositoryInfo {
        RepositoryInfo {
            name: name.to_string(),
            component_id: component.map(str::to_string),
            links: RepositoryLinks::default(),
        }
    }

    #[test]
    fn test_request_deserializes_camel_case_with_defaults() {
        let request: ProjectRequest = serde_json::from_str(
            r#"{"key":"ABC","name":"Demo","wantsIssueTrackerSpace":false,
                "quickstarters":[{"componentId":"svc1","componentType":"java-service"}]}"#,
        )
        .unwrap();

        assert!(request.wants_runtime_platform);
        assert!(!request.wants_issue_tracker_space);
        assert!(!request.special_permission_set);
        assert_eq!(request.quickstarters[0].component_type, "java-service");
        assert!(request.quickstarters[0].options.is_empty());
    }

    #[test]
    fn test_cleanup_outcome_ignores_zero_counts() {
        let outcome = CleanupOutcome::new()
            .with(LeftoverComponent::ScmRepo, 0)
            .with(LeftoverComponent::ScmRepo, 2)
            .with(LeftoverComponent::ScmRepo, 1);

        assert_eq!(outcome.get(LeftoverComponent::ScmRepo), 3);
        assert_eq!(outcome.get(LeftoverComponent::ScmProject), 0);
        assert!(CleanupOutcome::new().with(LeftoverComponent::PltfProject, 0).is_empty());
    }

    #[test]
    fn test_cleanup_outcome_serializes_as_category_map() {
        let outcome = CleanupOutcome::new().with(LeftoverComponent::BugtrackerProject, 1);
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"BUGTRACKER_PROJECT": 1})
        );
    }

    #[test]
    fn test_merge_keeps_existing_urls_and_appends_new_items() {
        let mut stored = ProvisioningResult {
            scm_url: Some("http://scm/projects/ABC".to_string()),
            repositories: vec![repository("abc-svc1", Some("svc1"))],
            ..Default::default()
        };

        stored.merge(ProvisioningResult {
            scm_url: Some("http://other".to_string()),
            repositories: vec![
                repository("abc-svc1", Some("svc1")),
                repository("abc-svc2", Some("svc2")),
            ],
            ..Default::default()
        });

        assert_eq!(stored.scm_url.as_deref(), Some("http://scm/projects/ABC"));
        assert_eq!(stored.repositories.len(), 2);
        assert!(stored.has_component("svc2"));
    }

    #[test]
    fn test_merge_does_not_duplicate_executions() {
        let execution = ExecutionInfo {
            component_id: "svc1".to_string(),
            job_name: "java-service".to_string(),
            permalink: "http://ci/1".to_string(),
        };
        let mut stored = ProvisioningResult {
            executions: vec![execution.clone()],
            ..Default::default()
        };

        stored.merge(stored.clone());
        assert_eq!(stored.executions, vec![execution]);
    }

    #[test]
    fn test_remove_components_keeps_auxiliary_repositories() {
        let mut result = ProvisioningResult {
            repositories: vec![
                repository("abc-design", None),
                repository("abc-svc1", Some("svc1")),
                repository("abc-svc2", Some("svc2")),
            ],
            executions: vec![ExecutionInfo {
                component_id: "svc1".to_string(),
                job_name: "java-service".to_string(),
                permalink: "http://ci/1".to_string(),
            }],
            ..Default::default()
        };

        result.remove_components(&["SVC1".to_string()]);

        let names: Vec<&str> = result.repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["abc-design", "abc-svc2"]);
        assert!(result.executions.is_empty());
    }

    #[test]
    fn test_cleanup_report_flattens_systems() {
        let mut report = CleanupReport::default();
        report.systems.insert(SystemKind::Scm, CleanupOutcome::new());
        report
            .systems
            .insert(SystemKind::Ci, CleanupOutcome::new().with(LeftoverComponent::Quickstarter, 2));
        assert!(!report.is_clean());
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({"scm": {}, "ci": {"QUICKSTARTER": 2}})
        );

        report.systems.clear();
        report.store.record(LeftoverComponent::ProjectDb, 1);
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({"project-store": {"PROJECT_DB": 1}})
        );
    }

    #[test]
    fn test_systems_sort_in_dependency_order() {
        let mut systems = vec![SystemKind::Ci, SystemKind::IssueTracker, SystemKind::Scm, SystemKind::Wiki];
        systems.sort();
        assert_eq!(
            systems,
            vec![SystemKind::IssueTracker, SystemKind::Wiki, SystemKind::Scm, SystemKind::Ci]
        );
    }

    #[test]
    fn test_cleanup_request_component_ids_skip_auxiliary_repositories() {
        let request = CleanupRequest {
            stage: LifecycleStage::ComponentUpdate,
            request: ProjectRequest::default(),
            result: ProvisioningResult {
                repositories: vec![repository("abc-design", None), repository("abc-svc1", Some("svc1"))],
                executions: vec![ExecutionInfo {
                    component_id: "svc1".to_string(),
                    job_name: "java-service".to_string(),
                    permalink: "http://ci/1".to_string(),
                }],
                ..Default::default()
            },
        };
        assert_eq!(request.component_ids(), vec!["svc1".to_string()]);
    }
}
