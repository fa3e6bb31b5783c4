//! 補償紀錄
//!
//! 記錄這次 saga 在各系統實際建立了什麼，失敗時依相反的依賴順序產生清理計畫。
//! 紀錄只存在於記憶體中，不會持久化。

use crate::core::saga::SagaKind;
use crate::domain::model::{
    CleanupRequest, ExecutionInfo, LifecycleStage, ProjectRequest, ProvisioningResult,
    RepositoryInfo, SystemKind,
};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactKind {
    /// 系統層級的專案／空間
    Project { url: String },
    Repository(RepositoryInfo),
    Execution(ExecutionInfo),
}

impl ArtifactKind {
    fn component_id(&self) -> Option<&str> {
        match self {
            ArtifactKind::Project { .. } => None,
            ArtifactKind::Repository(repository) => repository.component_id.as_deref(),
            ArtifactKind::Execution(execution) => Some(&execution.component_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatedArtifact {
    pub system: SystemKind,
    pub kind: ArtifactKind,
    pub order: usize,
    pub created_at: DateTime<Utc>,
}

/// 單一系統的清理動作
#[derive(Debug, Clone)]
pub struct CompensationAction {
    pub system: SystemKind,
    pub cleanup: CleanupRequest,
}

#[derive(Debug, Clone, Default)]
pub struct CompensationTracker {
    artifacts: Vec<CreatedArtifact>,
}

impl CompensationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, system: SystemKind, kind: ArtifactKind) {
        tracing::debug!("📝 [{}] Recorded artifact #{}: {:?}", system, self.artifacts.len(), kind);
        self.artifacts.push(CreatedArtifact {
            system,
            kind,
            order: self.artifacts.len(),
            created_at: Utc::now(),
        });
    }

    pub fn artifacts(&self) -> &[CreatedArtifact] {
        &self.artifacts
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn produced_by(&self, system: SystemKind) -> bool {
        self.artifacts.iter().any(|a| a.system == system)
    }

    /// 有產物的系統，依相反的依賴順序（CI → SCM → wiki → issue tracker）
    pub fn systems_to_compensate(&self) -> Vec<SystemKind> {
        let mut systems: Vec<SystemKind> = self.artifacts.iter().map(|a| a.system).collect();
        systems.sort();
        systems.dedup();
        systems.reverse();
        systems
    }

    /// 建立清理計畫，每個有產物的系統恰好一個動作
    ///
    /// 更新流程一律是 `COMPONENT_UPDATE`。新建流程中，若該系統這次建立了
    /// component 層級的產物，只清理那些 component；否則清理整個專案。
    pub fn plan(&self, kind: SagaKind, request: &ProjectRequest) -> Vec<CompensationAction> {
        self.systems_to_compensate()
            .into_iter()
            .map(|system| {
                let owned: Vec<&CreatedArtifact> =
                    self.artifacts.iter().filter(|a| a.system == system).collect();
                let has_components = owned.iter().any(|a| a.kind.component_id().is_some());

                let stage = match kind {
                    SagaKind::Update => LifecycleStage::ComponentUpdate,
                    SagaKind::Create if has_components => LifecycleStage::ComponentUpdate,
                    SagaKind::Create => LifecycleStage::InitialCreation,
                };

                CompensationAction {
                    system,
                    cleanup: CleanupRequest {
                        stage,
                        request: request.clone(),
                        result: scoped_result(system, stage, &owned),
                    },
                }
            })
            .collect()
    }
}

fn scoped_result(
    system: SystemKind,
    stage: LifecycleStage,
    artifacts: &[&CreatedArtifact],
) -> ProvisioningResult {
    let mut result = ProvisioningResult::default();

    for artifact in artifacts {
        match &artifact.kind {
            ArtifactKind::Project { url } if stage == LifecycleStage::InitialCreation => {
                let slot = match system {
                    SystemKind::IssueTracker => &mut result.issue_tracker_url,
                    SystemKind::Wiki => &mut result.wiki_url,
                    SystemKind::Scm => &mut result.scm_url,
                    SystemKind::Ci => &mut result.build_engine_url,
                };
                *slot = Some(url.clone());
            }
            ArtifactKind::Project { .. } => {}
            ArtifactKind::Repository(repository) => {
                if stage == LifecycleStage::InitialCreation || repository.component_id.is_some() {
                    result.repositories.push(repository.clone());
                }
            }
            ArtifactKind::Execution(execution) => result.executions.push(execution.clone()),
        }
    }

    result
}
