use std::sync::Arc;

use chrono::{TimeZone, Utc};
use mockall::mock;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::services::store::AppointmentStore;
use appointment_cell::SweeperService;
use notification_cell::{AppointmentNotice, NotificationGateway};
use shared_utils::test_utils::{FixedClock, TestConfig};

mock! {
    pub Gateway {}

    #[async_trait::async_trait]
    impl NotificationGateway for Gateway {
        async fn send_confirmation(&self, notice: &AppointmentNotice) -> bool;
        async fn send_reminder(&self, notice: &AppointmentNotice) -> bool;
        async fn send_cancellation(&self, notice: &AppointmentNotice, reason: &str) -> bool;
        async fn send_payment_request(&self, notice: &AppointmentNotice) -> bool;
        async fn send_simple(&self, to: &str, subject: &str, body: &str) -> bool;
    }
}

fn appointment_row(id: i64, email: &str) -> Value {
    json!({
        "id": id,
        "full_name": "Jane Doe",
        "phone": "0123456789",
        "email": email,
        "appointment_date": "2025-07-02",
        "appointment_time": "10:00:00",
        "department": "NEUROLOGY",
        "reason": null,
        "status": "CONFIRMED",
        "notes": null,
        "patient_id": null,
        "doctor_id": null,
        "doctor_notified_at": null,
        "doctor_responded_at": null,
        "doctor_response": null,
        "payment_requested": false,
        "payment_amount": null,
        "payment_requested_at": null,
        "payment_completed": false,
        "payment_completed_at": null,
        "email_sent": false,
        "reminder_sent": false,
        "created_at": "2025-06-01T09:00:00Z",
        "updated_at": "2025-06-01T09:00:00Z",
    })
}

/// Pinned to the day before the appointments above, so "tomorrow" selects
/// them.
fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap(),
    ))
}

#[tokio::test]
async fn reminder_sweep_marks_sent_rows_and_isolates_failures() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    Mock::given(method("GET"))
        .and(path("/appointments"))
        .and(query_param("appointment_date", "eq.2025-07-02"))
        .and(query_param("reminder_sent", "is.false"))
        .and(query_param("status", "eq.CONFIRMED"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(1, "a@example.com"),
            appointment_row(2, "b@example.com"),
        ])))
        .mount(&mock_server)
        .await;

    // Only the successfully reminded appointment gets its flag flipped.
    Mock::given(method("PATCH"))
        .and(path("/appointments"))
        .and(query_param("id", "eq.1"))
        .and(body_partial_json(json!({ "reminder_sent": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(1, "a@example.com")])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/appointments"))
        .and(query_param("id", "eq.2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut gateway = MockGateway::new();
    gateway
        .expect_send_reminder()
        .withf(|notice| notice.appointment_id == 1)
        .times(1)
        .returning(|_| true);
    gateway
        .expect_send_reminder()
        .withf(|notice| notice.appointment_id == 2)
        .times(1)
        .returning(|_| false);

    let sweeper = SweeperService::new(
        AppointmentStore::new(&config),
        Arc::new(gateway),
        clock(),
    );

    let report = sweeper.run_reminder_sweep().await;

    assert_eq!(report.examined, 2);
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn reminder_sweep_is_a_no_op_when_nothing_is_due() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    Mock::given(method("GET"))
        .and(path("/appointments"))
        .and(query_param("reminder_sent", "is.false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    // No expectations set: any gateway call would panic the test.
    let gateway = MockGateway::new();

    let sweeper = SweeperService::new(
        AppointmentStore::new(&config),
        Arc::new(gateway),
        clock(),
    );

    let report = sweeper.run_reminder_sweep().await;

    assert_eq!(report.examined, 0);
    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn confirmation_sweep_retries_unsent_mail_and_marks_success() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    Mock::given(method("GET"))
        .and(path("/appointments"))
        .and(query_param("email_sent", "is.false"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([appointment_row(7, "late@example.com")])),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/appointments"))
        .and(query_param("id", "eq.7"))
        .and(body_partial_json(json!({ "email_sent": true })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([appointment_row(7, "late@example.com")])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut gateway = MockGateway::new();
    gateway
        .expect_send_confirmation()
        .withf(|notice| notice.appointment_id == 7 && notice.email == "late@example.com")
        .times(1)
        .returning(|_| true);

    let sweeper = SweeperService::new(
        AppointmentStore::new(&config),
        Arc::new(gateway),
        clock(),
    );

    let report = sweeper.run_confirmation_sweep().await;

    assert_eq!(report.examined, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn failed_confirmation_leaves_the_flag_down_for_the_next_run() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    Mock::given(method("GET"))
        .and(path("/appointments"))
        .and(query_param("email_sent", "is.false"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([appointment_row(8, "down@example.com")])),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut gateway = MockGateway::new();
    gateway
        .expect_send_confirmation()
        .times(1)
        .returning(|_| false);

    let sweeper = SweeperService::new(
        AppointmentStore::new(&config),
        Arc::new(gateway),
        clock(),
    );

    let report = sweeper.run_confirmation_sweep().await;

    assert_eq!(report.examined, 1);
    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 1);
}
