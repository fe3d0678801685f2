use std::sync::Arc;

use regex::Regex;
use serde_json::json;
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::{StoreClient, StoreError};
use shared_models::auth::Role;

use crate::models::{AccountError, CreateUserRequest, UserAccount};
use crate::services::password;

/// Lookup and mutation surface over the `users` table. Uniqueness of email
/// and username is enforced by the store; a conflict on insert is reported as
/// the matching "already taken" error rather than a failure.
pub struct UserDirectoryService {
    store: Arc<StoreClient>,
}

impl UserDirectoryService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<UserAccount, AccountError> {
        let rows: Vec<UserAccount> = self
            .store
            .select(&format!("/users?id=eq.{}", id))
            .await
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        rows.into_iter().next().ok_or(AccountError::NotFound)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, AccountError> {
        let path = format!("/users?email=eq.{}", urlencoding::encode(email));
        let rows: Vec<UserAccount> = self
            .store
            .select(&path)
            .await
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().next())
    }

    pub async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserAccount>, AccountError> {
        let path = format!("/users?username=eq.{}", urlencoding::encode(username));
        let rows: Vec<UserAccount> = self
            .store
            .select(&path)
            .await
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().next())
    }

    pub async fn exists_by_email(&self, email: &str) -> Result<bool, AccountError> {
        Ok(self.find_by_email(email).await?.is_some())
    }

    /// Active doctors, optionally narrowed to one specialty, for assignment
    /// pickers.
    pub async fn list_doctors(
        &self,
        specialty: Option<&str>,
    ) -> Result<Vec<UserAccount>, AccountError> {
        let mut path = "/users?role=eq.DOCTOR&active=is.true&order=full_name.asc".to_string();
        if let Some(specialty) = specialty {
            path.push_str(&format!("&specialty=eq.{}", urlencoding::encode(specialty)));
        }

        self.store
            .select(&path)
            .await
            .map_err(|e| AccountError::DatabaseError(e.to_string()))
    }

    pub async fn create(&self, request: CreateUserRequest) -> Result<UserAccount, AccountError> {
        debug!("Creating account for username: {}", request.username);

        validate_email(&request.email)?;
        if request.username.trim().is_empty() {
            return Err(AccountError::ValidationError(
                "Username must not be empty".to_string(),
            ));
        }
        if request.password.is_empty() {
            return Err(AccountError::ValidationError(
                "Password must not be empty".to_string(),
            ));
        }

        let password_hash = password::hash_password(&request.password)
            .map_err(|e| AccountError::ValidationError(format!("Unusable password: {}", e)))?;

        let row = json!({
            "username": request.username,
            "email": request.email,
            "password_hash": password_hash,
            "full_name": request.full_name,
            "birth_date": request.birth_date,
            "gender": request.gender,
            "role": request.role,
            "specialty": request.specialty,
            "active": true,
        });

        let created: UserAccount = self.store.insert("users", row).await.map_err(|e| match e {
            // The unique constraints are the arbiter for concurrent creates.
            StoreError::Conflict(detail) if detail.contains("username") => {
                AccountError::UsernameTaken
            }
            StoreError::Conflict(_) => AccountError::EmailTaken,
            other => AccountError::DatabaseError(other.to_string()),
        })?;

        info!("Account created: {} ({})", created.username, created.role);
        Ok(created)
    }

    /// Soft-deactivate a non-admin account.
    pub async fn deactivate(&self, id: i64) -> Result<UserAccount, AccountError> {
        let account = self.find_by_id(id).await?;
        if account.role == Role::Admin {
            warn!("Refusing to deactivate admin account {}", id);
            return Err(AccountError::AdminImmutable);
        }

        let updated: Vec<UserAccount> = self
            .store
            .update(&format!("/users?id=eq.{}", id), json!({ "active": false }))
            .await
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        updated.into_iter().next().ok_or(AccountError::NotFound)
    }

    /// Verify credentials for login. The username field also accepts the
    /// account email, since auto-provisioned patients use their email as
    /// username.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserAccount, AccountError> {
        let account = match self.find_by_username(username).await? {
            Some(account) => account,
            None => self
                .find_by_email(username)
                .await?
                .ok_or(AccountError::InvalidCredentials)?,
        };

        if !account.active {
            return Err(AccountError::AccountDisabled);
        }

        let valid = password::verify_password(password, &account.password_hash)
            .map_err(|e| AccountError::DatabaseError(format!("Corrupt credential: {}", e)))?;

        if !valid {
            return Err(AccountError::InvalidCredentials);
        }

        Ok(account)
    }
}

fn validate_email(email: &str) -> Result<(), AccountError> {
    // Shape check only; deliverability is the mail relay's problem.
    let pattern = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex");
    if pattern.is_match(email) {
        Ok(())
    } else {
        Err(AccountError::ValidationError(format!(
            "Invalid email address: {}",
            email
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plausible_emails() {
        assert!(validate_email("jane@example.com").is_ok());
        assert!(validate_email("a.b+c@sub.domain.org").is_ok());
    }

    #[test]
    fn rejects_malformed_emails() {
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("two@@example.com").is_err());
        assert!(validate_email("missing@tld").is_err());
    }
}
