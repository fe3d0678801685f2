use std::sync::Arc;

use tracing::{error, info};

use notification_cell::NotificationGateway;
use shared_config::AppConfig;
use shared_models::auth::Role;

use crate::models::{AccountError, CreateUserRequest, ProvisioningOutcome};
use crate::services::directory::UserDirectoryService;

/// Temporary credential for auto-provisioned patient accounts. Returned once
/// in the synchronous response and carried in the welcome mail; the patient
/// is asked to change it on first login.
pub const DEFAULT_TEMP_PASSWORD: &str = "123456";

/// Creates a patient account from a booking email when none exists yet.
/// Idempotent: a lost check-then-create race resolves through the store's
/// uniqueness constraint and is reported as "already exists".
pub struct AccountProvisioningService {
    directory: UserDirectoryService,
    gateway: Arc<dyn NotificationGateway>,
    clinic_name: String,
}

impl AccountProvisioningService {
    pub fn new(config: &AppConfig, gateway: Arc<dyn NotificationGateway>) -> Self {
        Self {
            directory: UserDirectoryService::new(config),
            gateway,
            clinic_name: config.clinic_name.clone(),
        }
    }

    pub fn with_parts(
        directory: UserDirectoryService,
        gateway: Arc<dyn NotificationGateway>,
        clinic_name: String,
    ) -> Self {
        Self {
            directory,
            gateway,
            clinic_name,
        }
    }

    pub async fn provision_patient(
        &self,
        email: Option<&str>,
        full_name: &str,
    ) -> ProvisioningOutcome {
        let email = match email {
            Some(email) if !email.trim().is_empty() => email.trim(),
            _ => return ProvisioningOutcome::skipped("No email available to create an account"),
        };

        match self.directory.exists_by_email(email).await {
            Ok(true) => {
                return ProvisioningOutcome::skipped("An account with this email already exists")
            }
            Ok(false) => {}
            Err(e) => {
                error!("Account lookup failed during provisioning for {}: {}", email, e);
                return ProvisioningOutcome::skipped(format!("Account lookup failed: {}", e));
            }
        }

        let request = CreateUserRequest {
            username: email.to_string(),
            email: email.to_string(),
            password: DEFAULT_TEMP_PASSWORD.to_string(),
            full_name: full_name.to_string(),
            birth_date: None,
            gender: None,
            role: Role::Patient,
            specialty: None,
        };

        match self.directory.create(request).await {
            Ok(account) => {
                info!("Patient account auto-created for email: {}", email);
                self.send_welcome_mail(email.to_string(), full_name.to_string());

                ProvisioningOutcome {
                    created: true,
                    username: Some(account.username),
                    temporary_password: Some(DEFAULT_TEMP_PASSWORD.to_string()),
                    message: "Patient account created automatically".to_string(),
                }
            }
            // A concurrent flow created the account between the existence
            // check and the insert; same outcome as "already exists".
            Err(AccountError::EmailTaken) | Err(AccountError::UsernameTaken) => {
                ProvisioningOutcome::skipped("An account with this email already exists")
            }
            Err(e) => {
                error!("Failed to auto-create patient account for {}: {}", email, e);
                ProvisioningOutcome::skipped(format!("Failed to create patient account: {}", e))
            }
        }
    }

    /// Best-effort: a failed welcome mail never fails provisioning.
    fn send_welcome_mail(&self, email: String, full_name: String) {
        let gateway = Arc::clone(&self.gateway);
        let clinic_name = self.clinic_name.clone();

        tokio::spawn(async move {
            let subject = format!("Your account at {}", clinic_name);
            let body = format!(
                "Dear {},\n\nAn account has been created for you:\n\
                 - Username: {}\n- Password: {}\n\n\
                 Please log in to follow your appointments and change your \
                 password.\n\nBest regards,\n{} Team",
                full_name, email, DEFAULT_TEMP_PASSWORD, clinic_name
            );

            if !gateway.send_simple(&email, &subject, &body).await {
                error!("Failed to send welcome email to: {}", email);
            }
        });
    }
}
