use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};

use appointment_cell::handlers::{self, StatusListQuery};
use appointment_cell::models::{AssignDoctorRequest, AvailabilityQuery};
use shared_models::error::AppError;
use shared_utils::test_utils::{TestConfig, TestUser};

#[tokio::test]
async fn availability_rejects_past_dates() {
    let state = TestConfig::default().to_arc();

    let result = handlers::check_availability(
        State(state),
        Query(AvailabilityQuery {
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            department: "NEUROLOGY".to_string(),
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::BadRequest(_)));
}

#[tokio::test]
async fn availability_rejects_unknown_departments() {
    let state = TestConfig::default().to_arc();

    let result = handlers::check_availability(
        State(state),
        Query(AvailabilityQuery {
            date: Utc::now().date_naive() + Duration::days(1),
            time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            department: "ASTROLOGY".to_string(),
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::BadRequest(_)));
}

#[tokio::test]
async fn departments_listing_is_complete() {
    let Json(departments) = handlers::list_departments().await;

    assert_eq!(departments.len(), 22);
    assert!(departments.iter().any(|d| d.code == "NEUROLOGY"));
    assert!(departments
        .iter()
        .any(|d| d.code == "INTERNAL_MEDICINE" && d.display_name == "Internal Medicine"));
}

#[tokio::test]
async fn delete_is_admin_only() {
    let state = TestConfig::default().to_arc();
    let staff = TestUser::staff(2).to_auth_user();

    let result =
        handlers::delete_appointment(State(state), Path(1), Extension(staff)).await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn doctors_cannot_assign_doctors() {
    let state = TestConfig::default().to_arc();
    let doctor = TestUser::doctor(7).to_auth_user();

    let result = handlers::assign_doctor(
        State(state),
        Path(1),
        Extension(doctor),
        Json(AssignDoctorRequest { doctor_id: 7 }),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn status_listing_rejects_unknown_statuses() {
    let state = TestConfig::default().to_arc();
    let admin = TestUser::admin(1).to_auth_user();

    let result = handlers::appointments_by_status(
        State(state),
        Path("NOT_A_STATUS".to_string()),
        Extension(admin),
        Query(StatusListQuery { detailed: None }),
    )
    .await;

    assert_matches!(result, Err(AppError::BadRequest(_)));
}

#[tokio::test]
async fn patient_views_are_patient_only() {
    let state = TestConfig::default().to_arc();
    let doctor = TestUser::doctor(7).to_auth_user();

    let result = handlers::my_appointments(State(state.clone()), Extension(doctor)).await;
    assert_matches!(result, Err(AppError::Forbidden(_)));

    let patient = TestUser::patient(3, "jane@example.com").to_auth_user();
    let result = handlers::my_patients(State(state), Extension(patient)).await;
    assert_matches!(result, Err(AppError::Forbidden(_)));
}
