use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::{StoreClient, StoreError};

use crate::models::{
    Appointment, AppointmentDetailed, AppointmentError, AppointmentStatus, Department,
};

/// Columns pulled in when the related patient/doctor accounts are resolved
/// alongside the appointment.
const DETAILED_SELECT: &str =
    "select=*,patient:users!patient_id(id,username,full_name,email,specialty),\
     doctor:users!doctor_id(id,username,full_name,email,specialty)";

/// Query surface over the `appointments` table. Every shape the lifecycle
/// engine or the sweeper selects by lives here.
#[derive(Clone)]
pub struct AppointmentStore {
    store: Arc<StoreClient>,
}

impl AppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    fn db_err(e: StoreError) -> AppointmentError {
        AppointmentError::DatabaseError(e.to_string())
    }

    pub async fn insert(&self, row: Value) -> Result<Appointment, AppointmentError> {
        self.store.insert("appointments", row).await.map_err(|e| match e {
            // The capacity trigger reports an over-booked slot as a conflict.
            StoreError::Conflict(_) => AppointmentError::SlotUnavailable,
            other => Self::db_err(other),
        })
    }

    pub async fn fetch(&self, id: i64) -> Result<Appointment, AppointmentError> {
        let rows: Vec<Appointment> = self
            .store
            .select(&format!("/appointments?id=eq.{}", id))
            .await
            .map_err(Self::db_err)?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    pub async fn update_fields(
        &self,
        id: i64,
        patch: Value,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Patching appointment {}: {}", id, patch);

        let rows: Vec<Appointment> = self
            .store
            .update(&format!("/appointments?id=eq.{}", id), patch)
            .await
            .map_err(Self::db_err)?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppointmentError> {
        self.store
            .delete(&format!("/appointments?id=eq.{}", id))
            .await
            .map_err(Self::db_err)
    }

    pub async fn list_all(&self) -> Result<Vec<Appointment>, AppointmentError> {
        self.store
            .select("/appointments?order=appointment_date.desc,appointment_time.desc")
            .await
            .map_err(Self::db_err)
    }

    pub async fn find_by_status(
        &self,
        status: AppointmentStatus,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store
            .select(&format!(
                "/appointments?status=eq.{}&order=appointment_date.asc,appointment_time.asc",
                status
            ))
            .await
            .map_err(Self::db_err)
    }

    /// Same as `find_by_status`, with the linked patient and doctor accounts
    /// resolved in one round trip.
    pub async fn find_by_status_detailed(
        &self,
        status: AppointmentStatus,
    ) -> Result<Vec<AppointmentDetailed>, AppointmentError> {
        self.store
            .select(&format!(
                "/appointments?status=eq.{}&{}&order=appointment_date.asc",
                status, DETAILED_SELECT
            ))
            .await
            .map_err(Self::db_err)
    }

    pub async fn find_by_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store
            .select(&format!(
                "/appointments?appointment_date=eq.{}&order=appointment_time.asc",
                date
            ))
            .await
            .map_err(Self::db_err)
    }

    pub async fn find_by_department(
        &self,
        department: Department,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store
            .select(&format!(
                "/appointments?department=eq.{}&order=appointment_date.asc",
                department
            ))
            .await
            .map_err(Self::db_err)
    }

    pub async fn find_by_email_fragment(
        &self,
        fragment: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let pattern = urlencoding::encode(&format!("*{}*", fragment)).into_owned();
        self.store
            .select(&format!("/appointments?email=ilike.{}", pattern))
            .await
            .map_err(Self::db_err)
    }

    pub async fn find_by_doctor(
        &self,
        doctor_id: i64,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store
            .select(&format!(
                "/appointments?doctor_id=eq.{}&order=appointment_date.asc,appointment_time.asc",
                doctor_id
            ))
            .await
            .map_err(Self::db_err)
    }

    pub async fn find_by_doctor_and_status(
        &self,
        doctor_id: i64,
        status: AppointmentStatus,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store
            .select(&format!(
                "/appointments?doctor_id=eq.{}&status=eq.{}&order=appointment_date.asc",
                doctor_id, status
            ))
            .await
            .map_err(Self::db_err)
    }

    pub async fn find_by_date_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store
            .select(&format!(
                "/appointments?appointment_date=gte.{}&appointment_date=lte.{}\
                 &order=appointment_date.asc,appointment_time.asc",
                from, to
            ))
            .await
            .map_err(Self::db_err)
    }

    /// Substring search across name, email, and phone. The three match sets
    /// are unioned and de-duplicated by id.
    pub async fn search(&self, term: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let pattern = urlencoding::encode(&format!("*{}*", term)).into_owned();

        let by_name: Vec<Appointment> = self
            .store
            .select(&format!("/appointments?full_name=ilike.{}", pattern))
            .await
            .map_err(Self::db_err)?;
        let by_email: Vec<Appointment> = self
            .store
            .select(&format!("/appointments?email=ilike.{}", pattern))
            .await
            .map_err(Self::db_err)?;
        let by_phone: Vec<Appointment> = self
            .store
            .select(&format!("/appointments?phone=ilike.{}", pattern))
            .await
            .map_err(Self::db_err)?;

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for appointment in by_name.into_iter().chain(by_email).chain(by_phone) {
            if seen.insert(appointment.id) {
                results.push(appointment);
            }
        }

        Ok(results)
    }

    pub async fn count_by_status(
        &self,
        status: AppointmentStatus,
    ) -> Result<i64, AppointmentError> {
        self.store
            .count(&format!("/appointments?status=eq.{}&select=id", status))
            .await
            .map_err(Self::db_err)
    }

    pub async fn count_all(&self) -> Result<i64, AppointmentError> {
        self.store
            .count("/appointments?select=id")
            .await
            .map_err(Self::db_err)
    }

    pub async fn count_for_date(&self, date: NaiveDate) -> Result<i64, AppointmentError> {
        self.store
            .count(&format!("/appointments?appointment_date=eq.{}&select=id", date))
            .await
            .map_err(Self::db_err)
    }

    /// Non-cancelled bookings holding the exact (date, time, department) slot.
    pub async fn count_slot(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        department: Department,
    ) -> Result<i64, AppointmentError> {
        let path = format!(
            "/appointments?appointment_date=eq.{}&appointment_time=eq.{}\
             &department=eq.{}&status=neq.CANCELLED&select=id",
            date,
            urlencoding::encode(&time.to_string()),
            department
        );
        self.store.count(&path).await.map_err(Self::db_err)
    }

    /// Confirmed appointments on `date` still waiting for their reminder,
    /// with a usable contact email.
    pub async fn find_needing_reminder(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store
            .select(&format!(
                "/appointments?appointment_date=eq.{}&reminder_sent=is.false\
                 &status=eq.CONFIRMED&email=not.is.null&email=neq.",
                date
            ))
            .await
            .map_err(Self::db_err)
    }

    /// Appointments whose confirmation mail has not gone out yet, regardless
    /// of status.
    pub async fn find_needing_confirmation(&self) -> Result<Vec<Appointment>, AppointmentError> {
        self.store
            .select("/appointments?email_sent=is.false&email=not.is.null&email=neq.")
            .await
            .map_err(Self::db_err)
    }

    pub async fn find_today(&self, today: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        self.store
            .select(&format!(
                "/appointments?appointment_date=eq.{}\
                 &status=in.(PENDING,CONFIRMED)&order=appointment_time.asc",
                today
            ))
            .await
            .map_err(Self::db_err)
    }

    pub async fn find_upcoming(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store
            .select(&format!(
                "/appointments?appointment_date=gte.{}&appointment_date=lte.{}\
                 &status=in.(PENDING,CONFIRMED)\
                 &order=appointment_date.asc,appointment_time.asc",
                from, to
            ))
            .await
            .map_err(Self::db_err)
    }
}
