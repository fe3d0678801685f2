use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use account_cell::models::AccountError;
use account_cell::services::password::hash_password;
use account_cell::{AccountProvisioningService, UserDirectoryService};
use notification_cell::{AppointmentNotice, NotificationGateway};
use shared_config::AppConfig;
use shared_utils::test_utils::TestConfig;

struct StubGateway;

#[async_trait]
impl NotificationGateway for StubGateway {
    async fn send_confirmation(&self, _notice: &AppointmentNotice) -> bool {
        false
    }
    async fn send_reminder(&self, _notice: &AppointmentNotice) -> bool {
        false
    }
    async fn send_cancellation(&self, _notice: &AppointmentNotice, _reason: &str) -> bool {
        false
    }
    async fn send_payment_request(&self, _notice: &AppointmentNotice) -> bool {
        false
    }
    async fn send_simple(&self, _to: &str, _subject: &str, _body: &str) -> bool {
        false
    }
}

fn provisioner(config: &AppConfig) -> AccountProvisioningService {
    AccountProvisioningService::with_parts(
        UserDirectoryService::new(config),
        Arc::new(StubGateway),
        "Test Clinic".to_string(),
    )
}

fn user_row(id: i64, email: &str, role: &str) -> Value {
    json!({
        "id": id,
        "username": email,
        "email": email,
        "password_hash": "$argon2id$stub",
        "full_name": "Jane Doe",
        "birth_date": null,
        "gender": null,
        "role": role,
        "specialty": null,
        "active": true,
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-01T00:00:00Z",
    })
}

#[tokio::test]
async fn provisions_a_patient_account_with_the_default_credential() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("email", "eq.jane@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/users"))
        .and(body_partial_json(json!({
            "username": "jane@example.com",
            "email": "jane@example.com",
            "full_name": "Jane Doe",
            "role": "PATIENT",
            "active": true,
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([user_row(50, "jane@example.com", "PATIENT")])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let outcome = provisioner(&config)
        .provision_patient(Some("jane@example.com"), "Jane Doe")
        .await;

    assert!(outcome.created);
    assert_eq!(outcome.username.as_deref(), Some("jane@example.com"));
    assert_eq!(outcome.temporary_password.as_deref(), Some("123456"));
}

#[tokio::test]
async fn reports_already_exists_for_known_emails() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("email", "eq.jane@example.com"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([user_row(50, "jane@example.com", "PATIENT")])),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let outcome = provisioner(&config)
        .provision_patient(Some("jane@example.com"), "Jane Doe")
        .await;

    assert!(!outcome.created);
    assert!(outcome.temporary_password.is_none());
    assert!(outcome.message.contains("already exists"));
}

#[tokio::test]
async fn treats_a_lost_creation_race_as_already_exists() {
    // Both the confirm flow and the payment flow can observe "no account" and
    // insert; the unique constraint decides, and the loser must not fail.
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("email", "eq.jane@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "duplicate key value violates unique constraint \"users_email_key\""
        })))
        .mount(&mock_server)
        .await;

    let outcome = provisioner(&config)
        .provision_patient(Some("jane@example.com"), "Jane Doe")
        .await;

    assert!(!outcome.created);
    assert!(outcome.message.contains("already exists"));
}

#[tokio::test]
async fn skips_bookings_without_an_email() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    let service = provisioner(&config);

    let outcome = service.provision_patient(None, "Jane Doe").await;
    assert!(!outcome.created);

    let outcome = service.provision_patient(Some("   "), "Jane Doe").await;
    assert!(!outcome.created);
}

#[tokio::test]
async fn admin_accounts_cannot_be_deactivated() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("id", "eq.1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([user_row(1, "root@clinic.test", "ADMIN")])),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let directory = UserDirectoryService::new(&config);

    assert_matches!(
        directory.deactivate(1).await,
        Err(AccountError::AdminImmutable)
    );
}

#[tokio::test]
async fn authenticates_with_username_or_email_and_checks_the_password() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    let mut row = user_row(50, "jane@example.com", "PATIENT");
    row["password_hash"] = json!(hash_password("123456").unwrap());

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("username", "eq.jane@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    let directory = UserDirectoryService::new(&config);

    let account = directory
        .authenticate("jane@example.com", "123456")
        .await
        .unwrap();
    assert_eq!(account.id, 50);

    assert_matches!(
        directory.authenticate("jane@example.com", "wrong").await,
        Err(AccountError::InvalidCredentials)
    );
}

#[tokio::test]
async fn deactivated_accounts_cannot_log_in() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    let mut row = user_row(60, "gone@example.com", "PATIENT");
    row["password_hash"] = json!(hash_password("123456").unwrap());
    row["active"] = json!(false);

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("username", "eq.gone@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    let directory = UserDirectoryService::new(&config);

    assert_matches!(
        directory.authenticate("gone@example.com", "123456").await,
        Err(AccountError::AccountDisabled)
    );
}
