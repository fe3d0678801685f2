use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::{AppointmentNotice, EmailNotificationService, NotificationGateway};
use shared_config::AppConfig;

fn config(mail_url: &str) -> AppConfig {
    AppConfig {
        store_url: "http://localhost:54321".to_string(),
        store_service_key: "unused".to_string(),
        jwt_secret: "unused".to_string(),
        mail_api_url: mail_url.to_string(),
        mail_api_key: "test-mail-key".to_string(),
        mail_from: "no-reply@clinic.test".to_string(),
        clinic_name: "Test Clinic".to_string(),
        contact_email: "contact@clinic.test".to_string(),
        contact_phone: "1900 0000".to_string(),
    }
}

fn notice() -> AppointmentNotice {
    AppointmentNotice {
        appointment_id: 42,
        full_name: "Jane Doe".to_string(),
        email: "jane@example.com".to_string(),
        appointment_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
        appointment_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        department_name: "Neurology".to_string(),
        doctor_name: Some("Dr. Gregory House".to_string()),
        payment_amount: None,
    }
}

#[tokio::test]
async fn posts_confirmation_to_the_relay_with_auth() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("authorization", "Bearer test-mail-key"))
        .and(body_partial_json(json!({
            "from": "no-reply@clinic.test",
            "to": "jane@example.com",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg_1" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = EmailNotificationService::new(&config(&mock_server.uri()));

    assert!(gateway.send_confirmation(&notice()).await);
}

#[tokio::test]
async fn relay_rejection_reports_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let gateway = EmailNotificationService::new(&config(&mock_server.uri()));

    assert!(!gateway.send_reminder(&notice()).await);
    assert!(!gateway.send_cancellation(&notice(), "clinic closed").await);
    assert!(!gateway.send_simple("x@example.com", "subject", "body").await);
}

#[tokio::test]
async fn unreachable_relay_reports_failure() {
    // Nothing listens here; the transport error must come back as a plain
    // failed send.
    let gateway = EmailNotificationService::new(&config("http://127.0.0.1:1"));

    assert!(!gateway.send_payment_request(&notice()).await);
}
