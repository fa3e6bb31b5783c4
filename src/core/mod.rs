pub mod auth;
pub mod compensation;
pub mod http;
pub mod job_registry;
pub mod orchestrator;
pub mod preconditions;
pub mod request_validation;
pub mod saga;

pub use crate::domain::model::{ProjectRequest, ProvisioningResult};
pub use crate::domain::ports::{ProjectStore, SystemAdapter};
pub use crate::utils::error::Result;
pub use orchestrator::{ProvisioningOrchestrator, ProvisioningOutcome};
