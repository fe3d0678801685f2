use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use shared_models::auth::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// A registered account: patient, doctor, staff, or admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub role: Role,
    /// Meaningful only for doctors; uses the same enumeration as the
    /// appointment department.
    pub specialty: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub role: Role,
    pub specialty: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Result of a patient auto-provisioning attempt. The temporary credential is
/// only ever carried in this synchronous response, never logged.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningOutcome {
    pub created: bool,
    pub username: Option<String>,
    pub temporary_password: Option<String>,
    pub message: String,
}

impl ProvisioningOutcome {
    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            created: false,
            username: None,
            temporary_password: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Account not found")]
    NotFound,

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("An account with this username already exists")]
    UsernameTaken,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account is deactivated")]
    AccountDisabled,

    #[error("Admin accounts cannot be modified this way")]
    AdminImmutable,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
