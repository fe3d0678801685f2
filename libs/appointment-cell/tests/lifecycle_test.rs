use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

use appointment_cell::models::{Appointment, AppointmentError, AppointmentStatus, Department};
use appointment_cell::services::lifecycle::AppointmentLifecycleService;

fn appointment(status: AppointmentStatus) -> Appointment {
    Appointment {
        id: 1,
        full_name: "Jane Doe".to_string(),
        phone: "0123456789".to_string(),
        email: Some("jane@example.com".to_string()),
        appointment_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
        appointment_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        department: Department::Neurology,
        reason: Some("headaches".to_string()),
        status,
        notes: None,
        patient_id: None,
        doctor_id: Some(7),
        doctor_notified_at: None,
        doctor_responded_at: None,
        doctor_response: None,
        payment_requested: false,
        payment_amount: None,
        payment_requested_at: None,
        payment_completed: false,
        payment_completed_at: None,
        email_sent: false,
        reminder_sent: false,
        created_at: Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
    }
}

#[test]
fn completed_is_only_reachable_from_paid_or_needs_payment() {
    let lifecycle = AppointmentLifecycleService::new();

    for source in [AppointmentStatus::Paid, AppointmentStatus::NeedsPayment] {
        assert!(lifecycle
            .validate_generic_update(source, AppointmentStatus::Completed)
            .is_ok());
    }

    for source in [
        AppointmentStatus::Pending,
        AppointmentStatus::AwaitingDoctorApproval,
        AppointmentStatus::Confirmed,
        AppointmentStatus::PaymentRequested,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ] {
        assert_matches!(
            lifecycle.validate_generic_update(source, AppointmentStatus::Completed),
            Err(AppointmentError::InvalidStatusTransition(s)) if s == source
        );
    }
}

#[test]
fn generic_update_allows_every_other_target() {
    let lifecycle = AppointmentLifecycleService::new();

    // Intentional operator override: anything except COMPLETED is settable,
    // including backwards moves like CONFIRMED -> PENDING.
    assert!(lifecycle
        .validate_generic_update(AppointmentStatus::Confirmed, AppointmentStatus::Pending)
        .is_ok());
    assert!(lifecycle
        .validate_generic_update(AppointmentStatus::Completed, AppointmentStatus::Cancelled)
        .is_ok());
    assert!(lifecycle
        .validate_generic_update(AppointmentStatus::Pending, AppointmentStatus::NoShow)
        .is_ok());
}

#[test]
fn doctor_assignment_requires_pending() {
    let lifecycle = AppointmentLifecycleService::new();

    assert!(lifecycle
        .validate_assign_doctor(AppointmentStatus::Pending)
        .is_ok());

    for status in [
        AppointmentStatus::AwaitingDoctorApproval,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ] {
        assert_matches!(
            lifecycle.validate_assign_doctor(status),
            Err(AppointmentError::InvalidStatusTransition(_))
        );
    }
}

#[test]
fn doctor_decision_checks_identity_and_status() {
    let lifecycle = AppointmentLifecycleService::new();

    let awaiting = appointment(AppointmentStatus::AwaitingDoctorApproval);
    assert!(lifecycle.validate_doctor_decision(&awaiting, 7).is_ok());

    // Wrong doctor is rejected regardless of the reason text.
    assert_matches!(
        lifecycle.validate_doctor_decision(&awaiting, 8),
        Err(AppointmentError::NotAssignedDoctor)
    );

    // Unassigned appointment cannot be decided by anyone.
    let mut unassigned = appointment(AppointmentStatus::AwaitingDoctorApproval);
    unassigned.doctor_id = None;
    assert_matches!(
        lifecycle.validate_doctor_decision(&unassigned, 7),
        Err(AppointmentError::NotAssignedDoctor)
    );

    // Only AWAITING_DOCTOR_APPROVAL accepts a decision.
    let confirmed = appointment(AppointmentStatus::Confirmed);
    assert_matches!(
        lifecycle.validate_doctor_decision(&confirmed, 7),
        Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Confirmed))
    );
}

#[test]
fn payment_request_rejects_terminal_states_and_bad_amounts() {
    let lifecycle = AppointmentLifecycleService::new();

    assert!(lifecycle
        .validate_payment_request(AppointmentStatus::Confirmed, 500_000.0)
        .is_ok());
    assert!(lifecycle
        .validate_payment_request(AppointmentStatus::PaymentRequested, 250_000.0)
        .is_ok());
    assert!(lifecycle
        .validate_payment_request(AppointmentStatus::NeedsPayment, 100_000.0)
        .is_ok());

    for terminal in [
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ] {
        assert_matches!(
            lifecycle.validate_payment_request(terminal, 500_000.0),
            Err(AppointmentError::InvalidStatusTransition(_))
        );
    }

    assert_matches!(
        lifecycle.validate_payment_request(AppointmentStatus::Confirmed, 0.0),
        Err(AppointmentError::ValidationError(_))
    );
    assert_matches!(
        lifecycle.validate_payment_request(AppointmentStatus::Confirmed, -5.0),
        Err(AppointmentError::ValidationError(_))
    );
}

#[test]
fn payment_outcome_depends_on_doctor_notes() {
    let lifecycle = AppointmentLifecycleService::new();

    let mut with_notes = appointment(AppointmentStatus::PaymentRequested);
    with_notes.notes = Some("Examination complete".to_string());
    assert_eq!(
        lifecycle.payment_outcome(&with_notes),
        AppointmentStatus::Completed
    );

    let without_notes = appointment(AppointmentStatus::PaymentRequested);
    assert_eq!(
        lifecycle.payment_outcome(&without_notes),
        AppointmentStatus::Paid
    );

    // Whitespace-only notes do not count as a finished examination.
    let mut blank_notes = appointment(AppointmentStatus::PaymentRequested);
    blank_notes.notes = Some("   ".to_string());
    assert_eq!(
        lifecycle.payment_outcome(&blank_notes),
        AppointmentStatus::Paid
    );

    let needs_payment = appointment(AppointmentStatus::NeedsPayment);
    assert_eq!(
        lifecycle.payment_outcome(&needs_payment),
        AppointmentStatus::Completed
    );
}

#[test]
fn payment_completion_is_rejected_once_terminal() {
    let lifecycle = AppointmentLifecycleService::new();

    for status in [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::PaymentRequested,
        AppointmentStatus::Paid,
    ] {
        assert!(lifecycle.validate_payment_completion(status).is_ok());
    }

    for terminal in [
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ] {
        assert_matches!(
            lifecycle.validate_payment_completion(terminal),
            Err(AppointmentError::InvalidStatusTransition(_))
        );
    }
}

#[test]
fn department_parses_code_and_display_name() {
    assert_eq!(Department::parse("NEUROLOGY"), Some(Department::Neurology));
    assert_eq!(Department::parse("Neurology"), Some(Department::Neurology));
    assert_eq!(
        Department::parse("Internal Medicine"),
        Some(Department::InternalMedicine)
    );
    assert_eq!(Department::parse("  CARDIOLOGY "), Some(Department::Cardiology));
    assert_eq!(Department::parse("PODIATRY"), None);
    assert_eq!(Department::parse(""), None);
}

#[test]
fn status_parses_case_insensitively() {
    assert_eq!(
        "pending".parse::<AppointmentStatus>().unwrap(),
        AppointmentStatus::Pending
    );
    assert_eq!(
        "AWAITING_DOCTOR_APPROVAL".parse::<AppointmentStatus>().unwrap(),
        AppointmentStatus::AwaitingDoctorApproval
    );
    assert!("NOT_A_STATUS".parse::<AppointmentStatus>().is_err());
}
