pub mod service;

pub use service::ProvisioningService;
