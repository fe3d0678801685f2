use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use notification_cell::AppointmentNotice;

// ==============================================================================
// DEPARTMENTS
// ==============================================================================

/// Medical specialties. The same enumeration serves as the booking department
/// and the doctor's specialty, so assignment can match them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Department {
    Cardiology,
    Neurology,
    Dermatology,
    Orthopedics,
    Pediatrics,
    Gynecology,
    InternalMedicine,
    Surgery,
    Oncology,
    Psychiatry,
    Ophthalmology,
    Ent,
    Urology,
    Gastroenterology,
    Pulmonology,
    Endocrinology,
    Nephrology,
    Rheumatology,
    Radiology,
    Anesthesiology,
    EmergencyMedicine,
    GeneralPractice,
}

impl Department {
    pub const ALL: [Department; 22] = [
        Department::Cardiology,
        Department::Neurology,
        Department::Dermatology,
        Department::Orthopedics,
        Department::Pediatrics,
        Department::Gynecology,
        Department::InternalMedicine,
        Department::Surgery,
        Department::Oncology,
        Department::Psychiatry,
        Department::Ophthalmology,
        Department::Ent,
        Department::Urology,
        Department::Gastroenterology,
        Department::Pulmonology,
        Department::Endocrinology,
        Department::Nephrology,
        Department::Rheumatology,
        Department::Radiology,
        Department::Anesthesiology,
        Department::EmergencyMedicine,
        Department::GeneralPractice,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Department::Cardiology => "CARDIOLOGY",
            Department::Neurology => "NEUROLOGY",
            Department::Dermatology => "DERMATOLOGY",
            Department::Orthopedics => "ORTHOPEDICS",
            Department::Pediatrics => "PEDIATRICS",
            Department::Gynecology => "GYNECOLOGY",
            Department::InternalMedicine => "INTERNAL_MEDICINE",
            Department::Surgery => "SURGERY",
            Department::Oncology => "ONCOLOGY",
            Department::Psychiatry => "PSYCHIATRY",
            Department::Ophthalmology => "OPHTHALMOLOGY",
            Department::Ent => "ENT",
            Department::Urology => "UROLOGY",
            Department::Gastroenterology => "GASTROENTEROLOGY",
            Department::Pulmonology => "PULMONOLOGY",
            Department::Endocrinology => "ENDOCRINOLOGY",
            Department::Nephrology => "NEPHROLOGY",
            Department::Rheumatology => "RHEUMATOLOGY",
            Department::Radiology => "RADIOLOGY",
            Department::Anesthesiology => "ANESTHESIOLOGY",
            Department::EmergencyMedicine => "EMERGENCY_MEDICINE",
            Department::GeneralPractice => "GENERAL_PRACTICE",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Department::Cardiology => "Cardiology",
            Department::Neurology => "Neurology",
            Department::Dermatology => "Dermatology",
            Department::Orthopedics => "Orthopedics",
            Department::Pediatrics => "Pediatrics",
            Department::Gynecology => "Gynecology",
            Department::InternalMedicine => "Internal Medicine",
            Department::Surgery => "Surgery",
            Department::Oncology => "Oncology",
            Department::Psychiatry => "Psychiatry",
            Department::Ophthalmology => "Ophthalmology",
            Department::Ent => "Ear, Nose and Throat",
            Department::Urology => "Urology",
            Department::Gastroenterology => "Gastroenterology",
            Department::Pulmonology => "Pulmonology",
            Department::Endocrinology => "Endocrinology",
            Department::Nephrology => "Nephrology",
            Department::Rheumatology => "Rheumatology",
            Department::Radiology => "Radiology",
            Department::Anesthesiology => "Anesthesiology",
            Department::EmergencyMedicine => "Emergency Medicine",
            Department::GeneralPractice => "General Practice",
        }
    }

    /// Parse a department from its code, with a display-name fallback kept
    /// for older clients that still send the human-readable form.
    pub fn parse(input: &str) -> Option<Department> {
        let trimmed = input.trim();
        Department::ALL
            .iter()
            .copied()
            .find(|d| d.code() == trimmed)
            .or_else(|| {
                Department::ALL
                    .iter()
                    .copied()
                    .find(|d| d.display_name().eq_ignore_ascii_case(trimmed))
            })
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ==============================================================================
// APPOINTMENT STATUS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    AwaitingDoctorApproval,
    Confirmed,
    PaymentRequested,
    Paid,
    NeedsPayment,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Terminal statuses reject payment operations and are never left again
    /// through the dedicated transition endpoints.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "PENDING"),
            AppointmentStatus::AwaitingDoctorApproval => write!(f, "AWAITING_DOCTOR_APPROVAL"),
            AppointmentStatus::Confirmed => write!(f, "CONFIRMED"),
            AppointmentStatus::PaymentRequested => write!(f, "PAYMENT_REQUESTED"),
            AppointmentStatus::Paid => write!(f, "PAID"),
            AppointmentStatus::NeedsPayment => write!(f, "NEEDS_PAYMENT"),
            AppointmentStatus::Completed => write!(f, "COMPLETED"),
            AppointmentStatus::Cancelled => write!(f, "CANCELLED"),
            AppointmentStatus::NoShow => write!(f, "NO_SHOW"),
        }
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(AppointmentStatus::Pending),
            "AWAITING_DOCTOR_APPROVAL" => Ok(AppointmentStatus::AwaitingDoctorApproval),
            "CONFIRMED" => Ok(AppointmentStatus::Confirmed),
            "PAYMENT_REQUESTED" => Ok(AppointmentStatus::PaymentRequested),
            "PAID" => Ok(AppointmentStatus::Paid),
            "NEEDS_PAYMENT" => Ok(AppointmentStatus::NeedsPayment),
            "COMPLETED" => Ok(AppointmentStatus::Completed),
            "CANCELLED" => Ok(AppointmentStatus::Cancelled),
            "NO_SHOW" => Ok(AppointmentStatus::NoShow),
            other => Err(format!("Invalid status: {}", other)),
        }
    }
}

// ==============================================================================
// CORE APPOINTMENT MODEL
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub department: Department,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    /// Doctor's examination notes; their presence decides whether a completed
    /// payment closes the appointment or parks it as PAID.
    pub notes: Option<String>,
    /// Weak link to a registered patient account, resolved by email match at
    /// creation time.
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub doctor_notified_at: Option<DateTime<Utc>>,
    pub doctor_responded_at: Option<DateTime<Utc>>,
    pub doctor_response: Option<String>,
    pub payment_requested: bool,
    pub payment_amount: Option<f64>,
    pub payment_requested_at: Option<DateTime<Utc>>,
    pub payment_completed: bool,
    pub payment_completed_at: Option<DateTime<Utc>>,
    pub email_sent: bool,
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn has_contact_email(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    pub fn has_doctor_notes(&self) -> bool {
        self.notes.as_deref().is_some_and(|n| !n.trim().is_empty())
    }

    /// Project into the notification gateway's view. `None` when there is no
    /// usable contact email.
    pub fn to_notice(&self) -> Option<AppointmentNotice> {
        let email = self.email.clone().filter(|e| !e.trim().is_empty())?;
        Some(AppointmentNotice {
            appointment_id: self.id,
            full_name: self.full_name.clone(),
            email,
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time,
            department_name: self.department.display_name().to_string(),
            doctor_name: None,
            payment_amount: self.payment_amount,
        })
    }
}

/// Referenced account data for the eagerly-resolved listing shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyRef {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentDetailed {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient: Option<PartyRef>,
    pub doctor: Option<PartyRef>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointmentRequest {
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    /// Department code; display names are accepted as a fallback.
    pub department: String,
    pub reason: Option<String>,
}

/// Generic partial update: only supplied fields overwrite stored ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<NaiveTime>,
    pub department: Option<String>,
    pub reason: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
    pub doctor_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AssignDoctorRequest {
    pub doctor_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmWithDoctorRequest {
    pub doctor_id: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct DoctorDecisionRequest {
    pub response: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequestPaymentRequest {
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct HandlePaymentRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub department: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendPaymentConfirmationRequest {
    pub patient_email: Option<String>,
}

/// Manual "your appointment changed" notification, composed by staff.
#[derive(Debug, Deserialize)]
pub struct UpdateNotificationRequest {
    pub patient_email: String,
    pub patient_name: String,
    pub changes: Vec<String>,
    pub new_appointment_date: Option<String>,
    pub new_appointment_time: Option<String>,
    pub new_department: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepartmentInfo {
    pub code: &'static str,
    pub display_name: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentStats {
    pub total_appointments: i64,
    pub pending_appointments: i64,
    pub confirmed_appointments: i64,
    pub todays_appointments: i64,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Time slot is not available")]
    SlotUnavailable,

    #[error("Invalid department: {0}")]
    InvalidDepartment(String),

    #[error("Invalid status transition from {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("User {0} is not a doctor")]
    NotADoctor(i64),

    #[error("You are not assigned to this appointment")]
    NotAssignedDoctor,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
