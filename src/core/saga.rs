use crate::core::compensation::{ArtifactKind, CompensationTracker};
use crate::domain::model::{ProjectRequest, ProvisioningResult, SystemKind};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SagaKind {
    Create,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaState {
    Validating,
    CreatingIssueTrackerSpace,
    CreatingWikiSpace,
    CreatingScmProject,
    CreatingScmRepositories,
    TriggeringCiJobs,
    Done,
    RollingBack,
    Failed,
}

impl SagaState {
    /// 每個系統開始時進入的狀態
    pub fn entering(system: SystemKind) -> Self {
        match system {
            SystemKind::IssueTracker => SagaState::CreatingIssueTrackerSpace,
            SystemKind::Wiki => SagaState::CreatingWikiSpace,
            SystemKind::Scm => SagaState::CreatingScmProject,
            SystemKind::Ci => SagaState::TriggeringCiJobs,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Done | SagaState::Failed)
    }
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SagaState::Validating => "VALIDATING",
            SagaState::CreatingIssueTrackerSpace => "CREATING_ISSUE_TRACKER_SPACE",
            SagaState::CreatingWikiSpace => "CREATING_WIKI_SPACE",
            SagaState::CreatingScmProject => "CREATING_SCM_PROJECT",
            SagaState::CreatingScmRepositories => "CREATING_SCM_REPOSITORIES",
            SagaState::TriggeringCiJobs => "TRIGGERING_CI_JOBS",
            SagaState::Done => "DONE",
            SagaState::RollingBack => "ROLLING_BACK",
            SagaState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// 單一 saga 的執行狀態，在 adapter 之間傳遞
#[derive(Debug)]
pub struct SagaContext {
    pub kind: SagaKind,
    pub request: ProjectRequest,
    /// 累積的結果（更新流程從已儲存的結果開始）
    pub result: ProvisioningResult,
    tracker: CompensationTracker,
    state: SagaState,
    history: Vec<SagaState>,
}

impl SagaContext {
    pub fn new(kind: SagaKind, request: ProjectRequest, result: ProvisioningResult) -> Self {
        Self {
            kind,
            request,
            result,
            tracker: CompensationTracker::new(),
            state: SagaState::Validating,
            history: vec![SagaState::Validating],
        }
    }

    pub fn project_key(&self) -> &str {
        &self.request.key
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// 走過的狀態（含目前狀態）
    pub fn history(&self) -> &[SagaState] {
        &self.history
    }

    pub fn transition(&mut self, next: SagaState) {
        if self.state == next {
            return;
        }
        if self.state.is_terminal() {
            tracing::warn!("⚠️ [{}] Ignoring {} after saga ended in {}", self.request.key, next, self.state);
            return;
        }
        tracing::info!("🔁 [{}] {} → {}", self.request.key, self.state, next);
        self.state = next;
        self.history.push(next);
    }

    pub fn record(&mut self, system: SystemKind, artifact: ArtifactKind) {
        self.tracker.record(system, artifact);
    }

    pub fn tracker(&self) -> &CompensationTracker {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_records_history_once() {
        let mut ctx = SagaContext::new(SagaKind::Create, ProjectRequest::default(), ProvisioningResult::default());
        ctx.transition(SagaState::CreatingScmProject);
        ctx.transition(SagaState::CreatingScmProject);
        ctx.transition(SagaState::CreatingScmRepositories);

        assert_eq!(ctx.state(), SagaState::CreatingScmRepositories);
        assert_eq!(
            ctx.history(),
            &[
                SagaState::Validating,
                SagaState::CreatingScmProject,
                SagaState::CreatingScmRepositories
            ]
        );
        assert!(!ctx.state().is_terminal());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut ctx = SagaContext::new(SagaKind::Update, ProjectRequest::default(), ProvisioningResult::default());
        ctx.transition(SagaState::RollingBack);
        ctx.transition(SagaState::Failed);
        ctx.transition(SagaState::Done);

        assert_eq!(ctx.state(), SagaState::Failed);
        assert_eq!(ctx.history().last(), Some(&SagaState::Failed));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(SagaState::entering(SystemKind::Ci).to_string(), "TRIGGERING_CI_JOBS");
        assert_eq!(SagaState::RollingBack.to_string(), "ROLLING_BACK");
    }
}
