use tracing::{debug, warn};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

/// Guard logic for appointment status transitions. The dedicated endpoints
/// (assign, accept/decline, payment) each have a strict guard; the generic
/// update path is deliberately loose and only protects the COMPLETED target,
/// which keeps it usable as an operator override.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Generic-update guard: COMPLETED is only reachable from PAID or
    /// NEEDS_PAYMENT; every other target is freely settable on this path.
    pub fn validate_generic_update(
        &self,
        current: AppointmentStatus,
        new: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating generic status update {} -> {}", current, new);

        if new == AppointmentStatus::Completed
            && !matches!(
                current,
                AppointmentStatus::Paid | AppointmentStatus::NeedsPayment
            )
        {
            warn!("Rejected completion from status {}", current);
            return Err(AppointmentError::InvalidStatusTransition(current));
        }

        Ok(())
    }

    /// A doctor can only be assigned while the appointment is PENDING.
    pub fn validate_assign_doctor(
        &self,
        current: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if current != AppointmentStatus::Pending {
            warn!("Rejected doctor assignment from status {}", current);
            return Err(AppointmentError::InvalidStatusTransition(current));
        }
        Ok(())
    }

    /// Accept/decline is only valid while awaiting approval, and only for the
    /// assigned doctor.
    pub fn validate_doctor_decision(
        &self,
        appointment: &Appointment,
        acting_doctor_id: i64,
    ) -> Result<(), AppointmentError> {
        if appointment.status != AppointmentStatus::AwaitingDoctorApproval {
            warn!(
                "Rejected doctor decision on appointment {} in status {}",
                appointment.id, appointment.status
            );
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        match appointment.doctor_id {
            Some(doctor_id) if doctor_id == acting_doctor_id => Ok(()),
            _ => Err(AppointmentError::NotAssignedDoctor),
        }
    }

    /// Payment may be requested (or re-requested) for any non-terminal
    /// appointment with a positive amount.
    pub fn validate_payment_request(
        &self,
        current: AppointmentStatus,
        amount: f64,
    ) -> Result<(), AppointmentError> {
        if current.is_terminal() {
            return Err(AppointmentError::InvalidStatusTransition(current));
        }
        if amount <= 0.0 {
            return Err(AppointmentError::ValidationError(
                "Payment amount must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Payment completion is rejected once the appointment is terminal.
    pub fn validate_payment_completion(
        &self,
        current: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if current.is_terminal() {
            return Err(AppointmentError::InvalidStatusTransition(current));
        }
        Ok(())
    }

    /// Status a completed payment lands the appointment in: COMPLETED when
    /// the doctor has already written notes (or explicitly flagged
    /// NEEDS_PAYMENT after the exam), PAID while the exam is still open.
    pub fn payment_outcome(&self, appointment: &Appointment) -> AppointmentStatus {
        if appointment.has_doctor_notes()
            || appointment.status == AppointmentStatus::NeedsPayment
        {
            AppointmentStatus::Completed
        } else {
            AppointmentStatus::Paid
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
