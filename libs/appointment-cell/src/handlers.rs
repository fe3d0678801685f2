use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use account_cell::models::ProvisioningOutcome;
use notification_cell::{EmailNotificationService, NotificationGateway};
use shared_config::AppConfig;
use shared_models::auth::{AuthUser, Role};
use shared_models::error::AppError;
use shared_utils::extractor::require_any_role;

use crate::models::{
    AppointmentError, AppointmentStatus, AssignDoctorRequest, AvailabilityQuery,
    CancelAppointmentRequest, ConfirmWithDoctorRequest, CreateAppointmentRequest, Department,
    DepartmentInfo, DoctorDecisionRequest, HandlePaymentRequest, RequestPaymentRequest,
    SearchQuery, SendPaymentConfirmationRequest, UpdateAppointmentRequest,
    UpdateNotificationRequest,
};
use crate::services::booking::AppointmentBookingService;

const MANAGEMENT_ROLES: [Role; 3] = [Role::Admin, Role::Doctor, Role::Staff];
const DESK_ROLES: [Role; 2] = [Role::Admin, Role::Staff];

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::SlotUnavailable => {
            AppError::BadRequest("Time slot is not available".to_string())
        }
        AppointmentError::InvalidDepartment(d) => {
            AppError::BadRequest(format!("Invalid department: {}", d))
        }
        AppointmentError::InvalidStatusTransition(s) => {
            AppError::BadRequest(format!("Operation not allowed in current status: {}", s))
        }
        AppointmentError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
        AppointmentError::NotADoctor(id) => {
            AppError::BadRequest(format!("User with ID {} is not a doctor", id))
        }
        AppointmentError::NotAssignedDoctor => {
            AppError::Forbidden("You are not assigned to this appointment".to_string())
        }
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Attach the auto-provisioning outcome to a response body the way callers
/// expect it: a created flag, a reason, and the one-time credentials when an
/// account was actually created.
fn attach_provisioning(body: &mut Map<String, Value>, outcome: &ProvisioningOutcome) {
    body.insert(
        "patient_account_created".to_string(),
        json!(outcome.created),
    );
    if outcome.created {
        body.insert(
            "patient_account".to_string(),
            json!({
                "username": outcome.username,
                "temporary_password": outcome.temporary_password,
                "message": outcome.message,
            }),
        );
    } else {
        body.insert(
            "patient_account_message".to_string(),
            json!(outcome.message),
        );
    }
}

// ==============================================================================
// PUBLIC TIER
// ==============================================================================

#[axum::debug_handler]
pub async fn create_public_appointment(
    State(state): State<Arc<AppConfig>>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    info!(
        "Creating public appointment: name={}, date={}, time={}, department={}",
        request.full_name, request.appointment_date, request.appointment_time, request.department
    );

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .create_appointment(request)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "appointment_id": appointment.id,
        "message": format!("Appointment booked successfully! Your code: #{}", appointment.id),
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn check_availability(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    if query.date < Utc::now().date_naive() {
        return Err(AppError::BadRequest(
            "Cannot book an appointment for a past date".to_string(),
        ));
    }

    let department = Department::parse(&query.department)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid department: {}", query.department)))?;

    let booking_service = AppointmentBookingService::new(&state);
    let available = booking_service
        .is_slot_available(query.date, query.time, department)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "available": available,
        "message": if available {
            "This time slot is open"
        } else {
            "This time slot is full. Please choose another time."
        },
    })))
}

#[axum::debug_handler]
pub async fn list_departments() -> Json<Vec<DepartmentInfo>> {
    let departments = Department::ALL
        .iter()
        .map(|d| DepartmentInfo {
            code: d.code(),
            display_name: d.display_name(),
        })
        .collect();

    Json(departments)
}

#[axum::debug_handler]
pub async fn complete_payment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    info!("Processing payment completion for appointment: {}", appointment_id);

    let booking_service = AppointmentBookingService::new(&state);
    let (appointment, provisioning) = booking_service
        .complete_payment(appointment_id)
        .await
        .map_err(map_appointment_error)?;

    let mut body = Map::new();
    body.insert("appointment_id".to_string(), json!(appointment_id));
    body.insert("message".to_string(), json!("Payment successful!"));
    body.insert("appointment".to_string(), json!(appointment));
    attach_provisioning(&mut body, &provisioning);

    Ok(Json(Value::Object(body)))
}

// ==============================================================================
// MANAGEMENT TIER
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub from: Option<chrono::NaiveDate>,
    pub to: Option<chrono::NaiveDate>,
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &MANAGEMENT_ROLES)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = match (query.from, query.to) {
        (Some(from), Some(to)) => booking_service.appointments_in_range(from, to).await,
        _ => booking_service.list_appointments().await,
    }
    .map_err(map_appointment_error)?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn appointments_by_date(
    State(state): State<Arc<AppConfig>>,
    Path(date): Path<chrono::NaiveDate>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &MANAGEMENT_ROLES)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .appointments_by_date(date)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn appointments_by_department(
    State(state): State<Arc<AppConfig>>,
    Path(department): Path<String>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &MANAGEMENT_ROLES)?;

    let department = Department::parse(&department)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid department: {}", department)))?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .appointments_by_department(department)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &MANAGEMENT_ROLES)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .get_appointment(appointment_id)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &MANAGEMENT_ROLES)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .update_appointment(appointment_id, request)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &MANAGEMENT_ROLES)?;

    let booking_service = AppointmentBookingService::new(&state);
    let (appointment, provisioning) = booking_service
        .confirm_appointment(appointment_id)
        .await
        .map_err(map_appointment_error)?;

    let mut body = Map::new();
    body.insert(
        "message".to_string(),
        json!("Appointment has been confirmed"),
    );
    body.insert("appointment".to_string(), json!(appointment));
    attach_provisioning(&mut body, &provisioning);

    Ok(Json(Value::Object(body)))
}

#[axum::debug_handler]
pub async fn confirm_with_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ConfirmWithDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &MANAGEMENT_ROLES)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .confirm_with_doctor(appointment_id, request.doctor_id)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "message": "Appointment confirmed and doctor assigned",
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn assign_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<AssignDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &DESK_ROLES)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .assign_doctor(appointment_id, request.doctor_id)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "message": "Doctor assigned. Awaiting doctor's response.",
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn doctor_accept(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<DoctorDecisionRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[Role::Doctor])?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .doctor_accept(appointment_id, user.id, request.response)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "message": "Appointment accepted successfully",
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn doctor_decline(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<DoctorDecisionRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[Role::Doctor])?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .doctor_decline(appointment_id, user.id, request.reason)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "message": "Appointment declined; returned to staff for reassignment",
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn request_payment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<RequestPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &DESK_ROLES)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .request_payment(appointment_id, request.amount)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "message": "Payment request recorded",
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn handle_payment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<HandlePaymentRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &MANAGEMENT_ROLES)?;

    if request.status.trim().is_empty() {
        return Err(AppError::BadRequest("Payment status is required".to_string()));
    }

    let booking_service = AppointmentBookingService::new(&state);
    let (appointment, provisioning) = booking_service
        .handle_payment(appointment_id)
        .await
        .map_err(map_appointment_error)?;

    let message = match appointment.status {
        AppointmentStatus::Completed => {
            "Payment successful! The appointment is complete."
        }
        _ => "Payment successful! Waiting for the doctor to finish the examination.",
    };

    let mut body = Map::new();
    body.insert("message".to_string(), json!(message));
    body.insert("appointment".to_string(), json!(appointment));
    attach_provisioning(&mut body, &provisioning);

    Ok(Json(Value::Object(body)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &MANAGEMENT_ROLES)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .cancel_appointment(appointment_id, request.reason)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "message": "Appointment has been cancelled",
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[Role::Admin])?;

    let booking_service = AppointmentBookingService::new(&state);
    booking_service
        .delete_appointment(appointment_id)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "message": "Appointment deleted successfully" })))
}

// ==============================================================================
// LISTINGS & STATISTICS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct StatusListQuery {
    pub detailed: Option<bool>,
}

#[axum::debug_handler]
pub async fn appointments_by_status(
    State(state): State<Arc<AppConfig>>,
    Path(status): Path<String>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<StatusListQuery>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &MANAGEMENT_ROLES)?;

    let status = status
        .parse()
        .map_err(|e: String| AppError::BadRequest(e))?;

    let booking_service = AppointmentBookingService::new(&state);

    if query.detailed.unwrap_or(false) {
        let appointments = booking_service
            .appointments_by_status_detailed(status)
            .await
            .map_err(map_appointment_error)?;
        Ok(Json(json!(appointments)))
    } else {
        let appointments = booking_service
            .appointments_by_status(status)
            .await
            .map_err(map_appointment_error)?;
        Ok(Json(json!(appointments)))
    }
}

#[axum::debug_handler]
pub async fn todays_appointments(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &MANAGEMENT_ROLES)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .todays_appointments()
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn upcoming_appointments(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &MANAGEMENT_ROLES)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .upcoming_appointments()
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &MANAGEMENT_ROLES)?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .search_appointments(query.q.as_deref())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn appointment_stats(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &MANAGEMENT_ROLES)?;

    let booking_service = AppointmentBookingService::new(&state);
    let stats = booking_service
        .appointment_stats()
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(stats)))
}

// ==============================================================================
// ROLE-SCOPED VIEWS
// ==============================================================================

#[axum::debug_handler]
pub async fn my_appointments(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[Role::Patient])?;

    // Auto-provisioned patients log in with their email as username.
    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .appointments_for_email(&user.username)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn my_medical_history(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[Role::Patient])?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .medical_history_for_email(&user.username)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn my_patients(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[Role::Doctor])?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .appointments_for_doctor(user.id)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn pending_my_approval(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[Role::Doctor])?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .appointments_pending_approval(user.id)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointments)))
}

// ==============================================================================
// MANUAL NOTIFICATIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn send_payment_confirmation(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SendPaymentConfirmationRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &DESK_ROLES)?;

    let booking_service = AppointmentBookingService::new(&state);
    let sent = booking_service
        .send_payment_confirmation(appointment_id, request.patient_email)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": sent,
        "message": if sent {
            "Payment confirmation email sent successfully"
        } else {
            "Failed to send payment confirmation email"
        },
    })))
}

#[axum::debug_handler]
pub async fn send_update_notification(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<UpdateNotificationRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &DESK_ROLES)?;

    // The appointment must exist even though the mail content is composed by
    // the caller.
    let booking_service = AppointmentBookingService::new(&state);
    booking_service
        .get_appointment(appointment_id)
        .await
        .map_err(map_appointment_error)?;

    let mut body = format!(
        "Dear {},\n\nYour appointment (code: {}) has been updated:\n\n",
        request.patient_name, appointment_id
    );
    for change in &request.changes {
        body.push_str(&format!("- {}\n", change));
    }
    body.push('\n');
    if let Some(date) = request.new_appointment_date.filter(|d| !d.is_empty()) {
        body.push_str(&format!("New date: {}\n", date));
    }
    if let Some(time) = request.new_appointment_time.filter(|t| !t.is_empty()) {
        body.push_str(&format!("New time: {}\n", time));
    }
    if let Some(department) = request.new_department.filter(|d| !d.is_empty()) {
        body.push_str(&format!("New department: {}\n", department));
    }
    body.push_str("\nPlease review the details and adjust your schedule.\n");

    let gateway = EmailNotificationService::new(&state);
    let sent = gateway
        .send_simple(
            &request.patient_email,
            "Your appointment has been updated",
            &body,
        )
        .await;

    Ok(Json(json!({
        "success": sent,
        "message": if sent {
            "Email notification sent successfully"
        } else {
            "Failed to send email notification"
        },
    })))
}
