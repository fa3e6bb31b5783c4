pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{Cli, Command};

pub use app::ProvisioningService;
pub use config::AppConfig;
pub use core::orchestrator::{ProvisioningOrchestrator, ProvisioningOutcome};
pub use domain::model::{
    CleanupOutcome, CleanupReport, LifecycleStage, ProjectRequest, ProvisioningResult, QuickstarterRequest,
    SystemKind,
};
pub use utils::error::{FailureStage, ProvisioningError, ProvisioningFailure, Result};
