pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{AccountError, ProvisioningOutcome, UserAccount};
pub use services::directory::UserDirectoryService;
pub use services::provisioning::AccountProvisioningService;
