use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_url: String,
    pub store_service_key: String,
    pub jwt_secret: String,
    pub mail_api_url: String,
    pub mail_api_key: String,
    pub mail_from: String,
    pub clinic_name: String,
    pub contact_email: String,
    pub contact_phone: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            store_url: env::var("STORE_URL")
                .unwrap_or_else(|_| {
                    warn!("STORE_URL not set, using empty value");
                    String::new()
                }),
            store_service_key: env::var("STORE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("STORE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("JWT_SECRET not set, using empty value");
                    String::new()
                }),
            mail_api_url: env::var("MAIL_API_URL")
                .unwrap_or_else(|_| {
                    warn!("MAIL_API_URL not set, using empty value");
                    String::new()
                }),
            mail_api_key: env::var("MAIL_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("MAIL_API_KEY not set, using empty value");
                    String::new()
                }),
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@clinic.example".to_string()),
            clinic_name: env::var("CLINIC_NAME")
                .unwrap_or_else(|_| "Clinic Care".to_string()),
            contact_email: env::var("CONTACT_EMAIL")
                .unwrap_or_else(|_| "contact@clinic.example".to_string()),
            contact_phone: env::var("CONTACT_PHONE")
                .unwrap_or_else(|_| "1900 1234".to_string()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.store_url.is_empty()
            && !self.store_service_key.is_empty()
            && !self.jwt_secret.is_empty()
    }

    pub fn is_mail_configured(&self) -> bool {
        !self.mail_api_url.is_empty() && !self.mail_api_key.is_empty()
    }
}
