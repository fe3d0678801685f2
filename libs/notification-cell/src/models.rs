use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The slice of an appointment a notification needs. Callers project their
/// domain record into this before handing it to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentNotice {
    pub appointment_id: i64,
    pub full_name: String,
    pub email: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub department_name: String,
    pub doctor_name: Option<String>,
    pub payment_amount: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Confirmation,
    Reminder,
    Cancellation,
    PaymentRequest,
    Welcome,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Confirmation => write!(f, "confirmation"),
            NotificationKind::Reminder => write!(f, "reminder"),
            NotificationKind::Cancellation => write!(f, "cancellation"),
            NotificationKind::PaymentRequest => write!(f, "payment_request"),
            NotificationKind::Welcome => write!(f, "welcome"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Sent,
    Failed,
}

/// Per-item result of a delivery attempt, as recorded by the sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub appointment_id: i64,
    pub kind: NotificationKind,
    pub state: DeliveryState,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn sent(appointment_id: i64, kind: NotificationKind) -> Self {
        Self {
            appointment_id,
            kind,
            state: DeliveryState::Sent,
            error: None,
        }
    }

    pub fn failed(appointment_id: i64, kind: NotificationKind, error: impl Into<String>) -> Self {
        Self {
            appointment_id,
            kind,
            state: DeliveryState::Failed,
            error: Some(error.into()),
        }
    }
}
