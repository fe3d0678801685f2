use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

use crate::models::AppointmentNotice;

/// Upper bound on a single mail-relay call so a slow transport cannot pin a
/// worker. The caller treats a timeout as an ordinary send failure.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound notification surface. Every method reports plain success/failure;
/// retry policy lives with the callers (the sweeper re-scans unsent rows).
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_confirmation(&self, notice: &AppointmentNotice) -> bool;
    async fn send_reminder(&self, notice: &AppointmentNotice) -> bool;
    async fn send_cancellation(&self, notice: &AppointmentNotice, reason: &str) -> bool;
    async fn send_payment_request(&self, notice: &AppointmentNotice) -> bool;
    async fn send_simple(&self, to: &str, subject: &str, body: &str) -> bool;
}

/// Gateway implementation backed by an HTTP mail relay.
pub struct EmailNotificationService {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
    clinic_name: String,
    contact_email: String,
    contact_phone: String,
}

impl EmailNotificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.mail_api_url.clone(),
            api_key: config.mail_api_key.clone(),
            from: config.mail_from.clone(),
            clinic_name: config.clinic_name.clone(),
            contact_email: config.contact_email.clone(),
            contact_phone: config.contact_phone.clone(),
        }
    }

    async fn deliver(&self, to: &str, subject: &str, body: &str) -> bool {
        debug!("Sending email to {}: {}", to, subject);

        let request = self
            .client
            .post(format!("{}/messages", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": to,
                "subject": subject,
                "text": body,
            }))
            .send();

        match timeout(SEND_TIMEOUT, request).await {
            Ok(Ok(response)) if response.status().is_success() => {
                info!("Email sent successfully to: {}", to);
                true
            }
            Ok(Ok(response)) => {
                error!("Mail relay rejected message to {}: {}", to, response.status());
                false
            }
            Ok(Err(e)) => {
                error!("Failed to send email to {}: {}", to, e);
                false
            }
            Err(_) => {
                warn!("Email send to {} timed out after {:?}", to, SEND_TIMEOUT);
                false
            }
        }
    }

    fn signature(&self) -> String {
        format!(
            "Best regards,\n{} Team\nPhone: {}\nEmail: {}",
            self.clinic_name, self.contact_phone, self.contact_email
        )
    }

    fn appointment_summary(&self, notice: &AppointmentNotice) -> String {
        let mut summary = format!(
            "Appointment code: #{}\nDate: {}\nTime: {}\nDepartment: {}\n",
            notice.appointment_id,
            notice.appointment_date,
            notice.appointment_time,
            notice.department_name
        );
        if let Some(doctor) = &notice.doctor_name {
            summary.push_str(&format!("Doctor in charge: {}\n", doctor));
        }
        summary
    }
}

#[async_trait]
impl NotificationGateway for EmailNotificationService {
    async fn send_confirmation(&self, notice: &AppointmentNotice) -> bool {
        let subject = format!("Appointment confirmation - {}", self.clinic_name);
        let body = format!(
            "Dear {},\n\nYour appointment has been received.\n\n{}\n\
             Please arrive 15 minutes before your scheduled time.\n\n{}",
            notice.full_name,
            self.appointment_summary(notice),
            self.signature()
        );
        self.deliver(&notice.email, &subject, &body).await
    }

    async fn send_reminder(&self, notice: &AppointmentNotice) -> bool {
        let subject = format!("Appointment reminder for tomorrow - {}", self.clinic_name);
        let body = format!(
            "Dear {},\n\nThis is a reminder of your appointment tomorrow.\n\n{}\n{}",
            notice.full_name,
            self.appointment_summary(notice),
            self.signature()
        );
        self.deliver(&notice.email, &subject, &body).await
    }

    async fn send_cancellation(&self, notice: &AppointmentNotice, reason: &str) -> bool {
        let subject = format!("Appointment cancelled - {}", self.clinic_name);
        let body = format!(
            "Dear {},\n\nYour appointment has been cancelled.\n\n{}\nReason: {}\n\n\
             Please contact us to arrange a new appointment.\n\n{}",
            notice.full_name,
            self.appointment_summary(notice),
            reason,
            self.signature()
        );
        self.deliver(&notice.email, &subject, &body).await
    }

    async fn send_payment_request(&self, notice: &AppointmentNotice) -> bool {
        let subject = format!("Payment request for your appointment - {}", self.clinic_name);
        let amount_line = match notice.payment_amount {
            Some(amount) => format!("Amount due: {:.0}\n", amount),
            None => String::new(),
        };
        let body = format!(
            "Dear {},\n\nA payment has been requested for your appointment.\n\n{}{}\n{}",
            notice.full_name,
            self.appointment_summary(notice),
            amount_line,
            self.signature()
        );
        self.deliver(&notice.email, &subject, &body).await
    }

    async fn send_simple(&self, to: &str, subject: &str, body: &str) -> bool {
        self.deliver(to, subject, body).await
    }
}
