use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use account_cell::models::ProvisioningOutcome;
use account_cell::{AccountProvisioningService, UserDirectoryService};
use notification_cell::{EmailNotificationService, NotificationGateway};
use shared_config::AppConfig;
use shared_models::auth::Role;

use crate::models::{
    Appointment, AppointmentDetailed, AppointmentError, AppointmentStats, AppointmentStatus,
    CreateAppointmentRequest, Department, UpdateAppointmentRequest,
};
use crate::services::availability::SlotAvailabilityService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::store::AppointmentStore;

/// Orchestrates the appointment lifecycle: validates transitions through the
/// lifecycle service, persists through the store, links and provisions
/// patient accounts, and schedules notifications. State changes commit
/// first; notification sends run detached and their failures are left to the
/// sweeper.
pub struct AppointmentBookingService {
    store: AppointmentStore,
    availability: SlotAvailabilityService,
    lifecycle: AppointmentLifecycleService,
    directory: UserDirectoryService,
    provisioner: AccountProvisioningService,
    gateway: Arc<dyn NotificationGateway>,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let gateway: Arc<dyn NotificationGateway> =
            Arc::new(EmailNotificationService::new(config));
        Self::with_parts(
            AppointmentStore::new(config),
            UserDirectoryService::new(config),
            AccountProvisioningService::new(config, Arc::clone(&gateway)),
            gateway,
        )
    }

    pub fn with_parts(
        store: AppointmentStore,
        directory: UserDirectoryService,
        provisioner: AccountProvisioningService,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            availability: SlotAvailabilityService::new(store.clone()),
            lifecycle: AppointmentLifecycleService::new(),
            store,
            directory,
            provisioner,
            gateway,
        }
    }

    // ==========================================================================
    // CREATION
    // ==========================================================================

    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        info!("Creating new appointment for: {}", request.full_name);

        if request.full_name.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "Full name must not be empty".to_string(),
            ));
        }
        if request.phone.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "Phone must not be empty".to_string(),
            ));
        }

        let department = Department::parse(&request.department)
            .ok_or_else(|| AppointmentError::InvalidDepartment(request.department.clone()))?;

        // Pre-flight capacity gate, re-evaluated here even when the client
        // already called the public availability endpoint. The store trigger
        // still decides under concurrent inserts.
        let available = self
            .availability
            .is_available(request.appointment_date, request.appointment_time, department)
            .await?;
        if !available {
            return Err(AppointmentError::SlotUnavailable);
        }

        // Link to a registered account when the booking email matches one.
        let mut patient_id = None;
        if let Some(email) = request.email.as_deref().filter(|e| !e.trim().is_empty()) {
            match self.directory.find_by_email(email).await {
                Ok(Some(account)) => {
                    info!("Linked appointment with existing user: {}", account.username);
                    patient_id = Some(account.id);
                }
                Ok(None) => {}
                Err(e) => warn!("Account lookup failed during booking: {}", e),
            }
        }

        let row = json!({
            "full_name": request.full_name,
            "phone": request.phone,
            "email": request.email,
            "appointment_date": request.appointment_date,
            "appointment_time": request.appointment_time,
            "department": department,
            "reason": request.reason,
            "status": AppointmentStatus::Pending,
            "patient_id": patient_id,
            "payment_requested": false,
            "payment_completed": false,
            "email_sent": false,
            "reminder_sent": false,
        });

        let appointment = self.store.insert(row).await?;

        self.dispatch_confirmation(&appointment);

        info!("Appointment created successfully with ID: {}", appointment.id);
        Ok(appointment)
    }

    // ==========================================================================
    // LOOKUPS
    // ==========================================================================

    pub async fn get_appointment(&self, id: i64) -> Result<Appointment, AppointmentError> {
        self.store.fetch(id).await
    }

    pub async fn list_appointments(&self) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.list_all().await
    }

    pub async fn appointments_by_status(
        &self,
        status: AppointmentStatus,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.find_by_status(status).await
    }

    pub async fn appointments_by_status_detailed(
        &self,
        status: AppointmentStatus,
    ) -> Result<Vec<AppointmentDetailed>, AppointmentError> {
        self.store.find_by_status_detailed(status).await
    }

    pub async fn appointments_by_date(
        &self,
        date: chrono::NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.find_by_date(date).await
    }

    pub async fn appointments_by_department(
        &self,
        department: Department,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.find_by_department(department).await
    }

    pub async fn appointments_in_range(
        &self,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.find_by_date_range(from, to).await
    }

    pub async fn todays_appointments(&self) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.find_today(Utc::now().date_naive()).await
    }

    pub async fn upcoming_appointments(&self) -> Result<Vec<Appointment>, AppointmentError> {
        let today = Utc::now().date_naive();
        self.store
            .find_upcoming(today, today + chrono::Duration::days(7))
            .await
    }

    pub async fn search_appointments(
        &self,
        term: Option<&str>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        match term {
            Some(term) if !term.trim().is_empty() => self.store.search(term.trim()).await,
            _ => self.store.list_all().await,
        }
    }

    /// Appointments booked under a patient's email (patients book with their
    /// account email, so a substring match on it is the self-service view).
    pub async fn appointments_for_email(
        &self,
        email: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.find_by_email_fragment(email).await
    }

    pub async fn medical_history_for_email(
        &self,
        email: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut completed: Vec<Appointment> = self
            .store
            .find_by_email_fragment(email)
            .await?
            .into_iter()
            .filter(|a| a.status == AppointmentStatus::Completed)
            .collect();
        completed.sort_by(|a, b| b.appointment_date.cmp(&a.appointment_date));
        Ok(completed)
    }

    pub async fn appointments_for_doctor(
        &self,
        doctor_id: i64,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.find_by_doctor(doctor_id).await
    }

    pub async fn appointments_pending_approval(
        &self,
        doctor_id: i64,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store
            .find_by_doctor_and_status(doctor_id, AppointmentStatus::AwaitingDoctorApproval)
            .await
    }

    pub async fn is_slot_available(
        &self,
        date: chrono::NaiveDate,
        time: chrono::NaiveTime,
        department: Department,
    ) -> Result<bool, AppointmentError> {
        self.availability.is_available(date, time, department).await
    }

    pub async fn appointment_stats(&self) -> Result<AppointmentStats, AppointmentError> {
        Ok(AppointmentStats {
            total_appointments: self.store.count_all().await?,
            pending_appointments: self
                .store
                .count_by_status(AppointmentStatus::Pending)
                .await?,
            confirmed_appointments: self
                .store
                .count_by_status(AppointmentStatus::Confirmed)
                .await?,
            todays_appointments: self.store.count_for_date(Utc::now().date_naive()).await?,
        })
    }

    // ==========================================================================
    // TRANSITIONS
    // ==========================================================================

    /// Generic partial update. Only supplied fields overwrite stored ones;
    /// the status field alone carries a guard (COMPLETED requires PAID or
    /// NEEDS_PAYMENT), every other status value is settable here by design.
    pub async fn update_appointment(
        &self,
        id: i64,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment: {}", id);

        let current = self.store.fetch(id).await?;

        if let Some(new_status) = request.status {
            self.lifecycle
                .validate_generic_update(current.status, new_status)?;
        }

        if let Some(doctor_id) = request.doctor_id {
            self.require_doctor(doctor_id).await?;
        }

        let mut patch = Map::new();
        if let Some(full_name) = request.full_name {
            patch.insert("full_name".to_string(), json!(full_name));
        }
        if let Some(phone) = request.phone {
            patch.insert("phone".to_string(), json!(phone));
        }
        if let Some(email) = request.email {
            patch.insert("email".to_string(), json!(email));
        }
        if let Some(date) = request.appointment_date {
            patch.insert("appointment_date".to_string(), json!(date));
        }
        if let Some(time) = request.appointment_time {
            patch.insert("appointment_time".to_string(), json!(time));
        }
        if let Some(department) = request.department {
            let department = Department::parse(&department)
                .ok_or(AppointmentError::InvalidDepartment(department))?;
            patch.insert("department".to_string(), json!(department));
        }
        if let Some(reason) = request.reason {
            patch.insert("reason".to_string(), json!(reason));
        }
        if let Some(status) = request.status {
            patch.insert("status".to_string(), json!(status));
        }
        if let Some(notes) = request.notes {
            patch.insert("notes".to_string(), json!(notes));
        }
        if let Some(doctor_id) = request.doctor_id {
            patch.insert("doctor_id".to_string(), json!(doctor_id));
        }

        if patch.is_empty() {
            return Ok(current);
        }

        let updated = self.store.update_fields(id, Value::Object(patch)).await?;
        info!("Appointment updated successfully: {}", updated.id);
        Ok(updated)
    }

    /// Legacy direct confirmation. Re-confirming simply re-persists the
    /// CONFIRMED status. Provisions a patient account from the booking email.
    pub async fn confirm_appointment(
        &self,
        id: i64,
    ) -> Result<(Appointment, ProvisioningOutcome), AppointmentError> {
        info!("Confirming appointment with ID: {}", id);

        let appointment = self.store.fetch(id).await?;
        let updated = self
            .store
            .update_fields(id, json!({ "status": AppointmentStatus::Confirmed }))
            .await?;

        let provisioning = self
            .provisioner
            .provision_patient(appointment.email.as_deref(), &appointment.full_name)
            .await;

        Ok((updated, provisioning))
    }

    /// Legacy confirmation combined with doctor assignment.
    pub async fn confirm_with_doctor(
        &self,
        id: i64,
        doctor_id: i64,
    ) -> Result<Appointment, AppointmentError> {
        info!("Confirming appointment {} with doctor {}", id, doctor_id);

        self.store.fetch(id).await?;
        self.require_doctor(doctor_id).await?;

        let updated = self
            .store
            .update_fields(
                id,
                json!({
                    "status": AppointmentStatus::Confirmed,
                    "doctor_id": doctor_id,
                }),
            )
            .await?;

        info!("Appointment confirmed with doctor assigned: {}", updated.id);
        Ok(updated)
    }

    /// Staff hands the appointment to a doctor for approval.
    pub async fn assign_doctor(
        &self,
        id: i64,
        doctor_id: i64,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.fetch(id).await?;
        self.lifecycle.validate_assign_doctor(appointment.status)?;
        let doctor = self.require_doctor(doctor_id).await?;

        let updated = self
            .store
            .update_fields(
                id,
                json!({
                    "status": AppointmentStatus::AwaitingDoctorApproval,
                    "doctor_id": doctor_id,
                    "doctor_notified_at": Utc::now(),
                }),
            )
            .await?;

        info!(
            "Doctor assigned to appointment {} and notified: {}",
            id, doctor.email
        );
        Ok(updated)
    }

    pub async fn doctor_accept(
        &self,
        id: i64,
        acting_doctor_id: i64,
        response: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.fetch(id).await?;
        self.lifecycle
            .validate_doctor_decision(&appointment, acting_doctor_id)?;

        let response = response.unwrap_or_else(|| "Accepted by doctor".to_string());
        let updated = self
            .store
            .update_fields(
                id,
                json!({
                    "status": AppointmentStatus::Confirmed,
                    "doctor_responded_at": Utc::now(),
                    "doctor_response": format!("ACCEPTED: {}", response),
                }),
            )
            .await?;

        info!("Doctor {} accepted appointment {}", acting_doctor_id, id);
        Ok(updated)
    }

    /// Decline resets the appointment to PENDING and clears the assignment so
    /// staff can pick another doctor.
    pub async fn doctor_decline(
        &self,
        id: i64,
        acting_doctor_id: i64,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.fetch(id).await?;
        self.lifecycle
            .validate_doctor_decision(&appointment, acting_doctor_id)?;

        let reason = reason.unwrap_or_else(|| "Declined by doctor".to_string());
        let updated = self
            .store
            .update_fields(
                id,
                json!({
                    "status": AppointmentStatus::Pending,
                    "doctor_id": Value::Null,
                    "doctor_notified_at": Value::Null,
                    "doctor_responded_at": Utc::now(),
                    "doctor_response": format!("DECLINED: {}", reason),
                }),
            )
            .await?;

        info!(
            "Doctor {} declined appointment {} with reason: {}",
            acting_doctor_id, id, reason
        );
        Ok(updated)
    }

    pub async fn request_payment(
        &self,
        id: i64,
        amount: f64,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.fetch(id).await?;
        self.lifecycle
            .validate_payment_request(appointment.status, amount)?;

        let updated = self
            .store
            .update_fields(
                id,
                json!({
                    "status": AppointmentStatus::PaymentRequested,
                    "payment_requested": true,
                    "payment_amount": amount,
                    "payment_requested_at": Utc::now(),
                }),
            )
            .await?;

        self.dispatch_payment_request(&updated);

        info!("Payment of {} requested for appointment {}", amount, id);
        Ok(updated)
    }

    /// Staff records a successful payment. Lands in COMPLETED when the doctor
    /// has finished (notes present or NEEDS_PAYMENT), otherwise in PAID.
    pub async fn handle_payment(
        &self,
        id: i64,
    ) -> Result<(Appointment, ProvisioningOutcome), AppointmentError> {
        let appointment = self.store.fetch(id).await?;
        self.lifecycle
            .validate_payment_completion(appointment.status)?;

        let target = self.lifecycle.payment_outcome(&appointment);
        let updated = self
            .store
            .update_fields(
                id,
                json!({
                    "status": target,
                    "payment_completed": true,
                    "payment_completed_at": Utc::now(),
                }),
            )
            .await?;

        let provisioning = self
            .provisioner
            .provision_patient(appointment.email.as_deref(), &appointment.full_name)
            .await;

        info!("Payment handled for appointment {}; status {}", id, target);
        Ok((updated, provisioning))
    }

    /// Public payment-completion flow: provisions the patient account, then
    /// confirms the appointment.
    pub async fn complete_payment(
        &self,
        id: i64,
    ) -> Result<(Appointment, ProvisioningOutcome), AppointmentError> {
        let appointment = self.store.fetch(id).await?;
        self.lifecycle
            .validate_payment_completion(appointment.status)?;

        let provisioning = self
            .provisioner
            .provision_patient(appointment.email.as_deref(), &appointment.full_name)
            .await;

        let updated = self
            .store
            .update_fields(id, json!({ "status": AppointmentStatus::Confirmed }))
            .await?;

        Ok((updated, provisioning))
    }

    pub async fn cancel_appointment(
        &self,
        id: i64,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        info!("Cancelling appointment with ID: {}", id);

        self.store.fetch(id).await?;
        let updated = self
            .store
            .update_fields(id, json!({ "status": AppointmentStatus::Cancelled }))
            .await?;

        let reason = reason.unwrap_or_else(|| "Cancelled by staff".to_string());
        self.dispatch_cancellation(&updated, reason);

        info!("Appointment cancelled successfully: {}", updated.id);
        Ok(updated)
    }

    /// Hard delete; irreversible and admin-only at the HTTP surface.
    pub async fn delete_appointment(&self, id: i64) -> Result<(), AppointmentError> {
        self.store.fetch(id).await?;
        self.store.delete(id).await?;
        info!("Appointment deleted: {}", id);
        Ok(())
    }

    /// Payment-confirmation receipt for a PAID appointment.
    pub async fn send_payment_confirmation(
        &self,
        id: i64,
        email_override: Option<String>,
    ) -> Result<bool, AppointmentError> {
        let appointment = self.store.fetch(id).await?;

        if appointment.status != AppointmentStatus::Paid {
            return Err(AppointmentError::ValidationError(
                "Can only send payment confirmation for PAID appointments".to_string(),
            ));
        }

        let to = email_override
            .filter(|e| !e.trim().is_empty())
            .or_else(|| appointment.email.clone())
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                AppointmentError::ValidationError(
                    "No email address available for this appointment".to_string(),
                )
            })?;

        let doctor_name = match appointment.doctor_id {
            Some(doctor_id) => self
                .directory
                .find_by_id(doctor_id)
                .await
                .map(|d| d.full_name)
                .ok(),
            None => None,
        };

        let mut body = format!(
            "Dear {},\n\nWe confirm that payment for your appointment has been received.\n\n\
             Appointment code: #{}\nDate: {}\nTime: {}\nDepartment: {}\n",
            appointment.full_name,
            appointment.id,
            appointment.appointment_date,
            appointment.appointment_time,
            appointment.department.display_name(),
        );
        if let Some(doctor_name) = doctor_name {
            body.push_str(&format!("Doctor in charge: {}\n", doctor_name));
        }
        if let Some(amount) = appointment.payment_amount {
            body.push_str(&format!("Amount paid: {:.0}\n", amount));
        }
        body.push_str("\nPlease arrive 15 minutes before your scheduled time.\n");

        let sent = self
            .gateway
            .send_simple(&to, "Payment received - appointment confirmed", &body)
            .await;

        Ok(sent)
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    async fn require_doctor(
        &self,
        doctor_id: i64,
    ) -> Result<account_cell::UserAccount, AppointmentError> {
        let account = self
            .directory
            .find_by_id(doctor_id)
            .await
            .map_err(|_| AppointmentError::DoctorNotFound)?;

        if account.role != Role::Doctor {
            return Err(AppointmentError::NotADoctor(doctor_id));
        }

        Ok(account)
    }

    /// Fire-and-forget confirmation send; `email_sent` flips only after a
    /// successful delivery, so the sweeper can retry failures.
    fn dispatch_confirmation(&self, appointment: &Appointment) {
        let Some(notice) = appointment.to_notice() else {
            return;
        };
        if appointment.email_sent {
            return;
        }

        let gateway = Arc::clone(&self.gateway);
        let store = self.store.clone();
        let id = appointment.id;

        tokio::spawn(async move {
            if gateway.send_confirmation(&notice).await {
                match store.update_fields(id, json!({ "email_sent": true })).await {
                    Ok(_) => info!("Confirmation email sent and marked for appointment: {}", id),
                    Err(e) => warn!("Confirmation sent but flag update failed for {}: {}", id, e),
                }
            } else {
                warn!("Confirmation email failed for appointment {}; sweeper will retry", id);
            }
        });
    }

    fn dispatch_payment_request(&self, appointment: &Appointment) {
        let Some(notice) = appointment.to_notice() else {
            return;
        };

        let gateway = Arc::clone(&self.gateway);
        let id = appointment.id;

        tokio::spawn(async move {
            if !gateway.send_payment_request(&notice).await {
                warn!("Payment request email failed for appointment {}", id);
            }
        });
    }

    fn dispatch_cancellation(&self, appointment: &Appointment, reason: String) {
        let Some(notice) = appointment.to_notice() else {
            return;
        };

        let gateway = Arc::clone(&self.gateway);
        let id = appointment.id;

        tokio::spawn(async move {
            if gateway.send_cancellation(&notice, &reason).await {
                info!("Cancellation email sent for appointment: {}", id);
            } else {
                warn!("Cancellation email failed for appointment {}", id);
            }
        });
    }
}
