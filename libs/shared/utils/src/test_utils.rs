use std::sync::Arc;

use chrono::{DateTime, Utc};

use shared_config::AppConfig;
use shared_models::auth::{AuthUser, Role};

use crate::clock::Clock;
use crate::jwt::issue_token;

pub struct TestConfig {
    pub jwt_secret: String,
    pub store_url: String,
    pub store_service_key: String,
    pub mail_api_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            store_url: "http://localhost:54321".to_string(),
            store_service_key: "test-service-key".to_string(),
            mail_api_url: "http://localhost:54322".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_store_url(url: &str) -> Self {
        Self {
            store_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            store_url: self.store_url.clone(),
            store_service_key: self.store_service_key.clone(),
            jwt_secret: self.jwt_secret.clone(),
            mail_api_url: self.mail_api_url.clone(),
            mail_api_key: "test-mail-key".to_string(),
            mail_from: "no-reply@clinic.test".to_string(),
            clinic_name: "Test Clinic".to_string(),
            contact_email: "contact@clinic.test".to_string(),
            contact_phone: "1900 0000".to_string(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl TestUser {
    pub fn new(id: i64, username: &str, role: Role) -> Self {
        Self {
            id,
            username: username.to_string(),
            email: format!("{}@example.com", username),
            role,
        }
    }

    pub fn admin(id: i64) -> Self {
        Self::new(id, "admin", Role::Admin)
    }

    pub fn staff(id: i64) -> Self {
        Self::new(id, "staff", Role::Staff)
    }

    pub fn doctor(id: i64) -> Self {
        Self::new(id, "doctor", Role::Doctor)
    }

    pub fn patient(id: i64, email: &str) -> Self {
        Self {
            id,
            username: email.to_string(),
            email: email.to_string(),
            role: Role::Patient,
        }
    }

    pub fn to_auth_user(&self) -> AuthUser {
        AuthUser {
            id: self.id,
            username: self.username.clone(),
            email: Some(self.email.clone()),
            role: self.role,
        }
    }

    pub fn to_token(&self, jwt_secret: &str) -> String {
        issue_token(
            self.id,
            &self.username,
            Some(&self.email),
            self.role,
            jwt_secret,
            24,
        )
        .expect("failed to issue test token")
    }
}

/// Clock pinned to a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
