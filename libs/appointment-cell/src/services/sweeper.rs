use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, error, info, warn};

use notification_cell::{DeliveryOutcome, NotificationGateway, NotificationKind};
use shared_utils::clock::Clock;

use crate::models::Appointment;
use crate::services::store::AppointmentStore;

/// Fixed cadence of the confirmation catch-up job.
pub const CONFIRMATION_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);
/// Hour of day (UTC) the daily reminder sweep runs at.
pub const REMINDER_SWEEP_HOUR: u32 = 8;

#[derive(Debug, Default)]
pub struct SweepReport {
    pub examined: usize,
    pub sent: usize,
    pub failed: usize,
    pub outcomes: Vec<DeliveryOutcome>,
}

impl SweepReport {
    fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome.state {
            notification_cell::DeliveryState::Sent => self.sent += 1,
            _ => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// Catch-up jobs for notifications whose original fire-and-forget send
/// failed. Selection by the unsent flags plus marking only after a confirmed
/// send keeps overlapping runs from double-sending; one item's failure never
/// aborts the rest of a sweep.
pub struct SweeperService {
    store: AppointmentStore,
    gateway: Arc<dyn NotificationGateway>,
    clock: Arc<dyn Clock>,
}

impl SweeperService {
    pub fn new(
        store: AppointmentStore,
        gateway: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
        }
    }

    /// Daily job: remind CONFIRMED appointments dated exactly tomorrow that
    /// have not been reminded yet.
    pub async fn run_reminder_sweep(&self) -> SweepReport {
        info!("Starting daily reminder sweep");
        let mut report = SweepReport::default();

        let tomorrow = self.clock.today() + ChronoDuration::days(1);
        let pending = match self.store.find_needing_reminder(tomorrow).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Reminder sweep selection failed: {}", e);
                return report;
            }
        };

        report.examined = pending.len();
        info!("Found {} appointments needing reminder emails", pending.len());

        for appointment in pending {
            report.record(self.deliver_reminder(&appointment).await);
        }

        info!(
            "Completed daily reminder sweep: {} sent, {} failed",
            report.sent, report.failed
        );
        report
    }

    /// Interval job: re-attempt confirmation mails for any appointment whose
    /// `email_sent` flag is still down.
    pub async fn run_confirmation_sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let pending = match self.store.find_needing_confirmation().await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Confirmation sweep selection failed: {}", e);
                return report;
            }
        };

        report.examined = pending.len();
        if !pending.is_empty() {
            info!(
                "Found {} appointments needing confirmation emails",
                pending.len()
            );
        }

        for appointment in pending {
            report.record(self.deliver_confirmation(&appointment).await);
        }

        report
    }

    async fn deliver_reminder(&self, appointment: &Appointment) -> DeliveryOutcome {
        let Some(notice) = appointment.to_notice() else {
            return DeliveryOutcome::failed(
                appointment.id,
                NotificationKind::Reminder,
                "no contact email",
            );
        };

        if !self.gateway.send_reminder(&notice).await {
            warn!("Reminder email failed for appointment {}", appointment.id);
            return DeliveryOutcome::failed(
                appointment.id,
                NotificationKind::Reminder,
                "gateway send failed",
            );
        }

        match self
            .store
            .update_fields(appointment.id, json!({ "reminder_sent": true }))
            .await
        {
            Ok(_) => {
                info!("Reminder email sent for appointment: {}", appointment.id);
                DeliveryOutcome::sent(appointment.id, NotificationKind::Reminder)
            }
            Err(e) => {
                // Sent but unmarked: the next sweep may retry this row.
                warn!(
                    "Reminder sent but flag update failed for {}: {}",
                    appointment.id, e
                );
                DeliveryOutcome::sent(appointment.id, NotificationKind::Reminder)
            }
        }
    }

    async fn deliver_confirmation(&self, appointment: &Appointment) -> DeliveryOutcome {
        let Some(notice) = appointment.to_notice() else {
            return DeliveryOutcome::failed(
                appointment.id,
                NotificationKind::Confirmation,
                "no contact email",
            );
        };

        if !self.gateway.send_confirmation(&notice).await {
            warn!(
                "Confirmation email failed for appointment {}",
                appointment.id
            );
            return DeliveryOutcome::failed(
                appointment.id,
                NotificationKind::Confirmation,
                "gateway send failed",
            );
        }

        match self
            .store
            .update_fields(appointment.id, json!({ "email_sent": true }))
            .await
        {
            Ok(_) => {
                info!(
                    "Confirmation email sent and marked for appointment: {}",
                    appointment.id
                );
                DeliveryOutcome::sent(appointment.id, NotificationKind::Confirmation)
            }
            Err(e) => {
                warn!(
                    "Confirmation sent but flag update failed for {}: {}",
                    appointment.id, e
                );
                DeliveryOutcome::sent(appointment.id, NotificationKind::Confirmation)
            }
        }
    }

    /// Spawn both periodic jobs on independent timers. Runs are sequential
    /// within each job; a slow run simply delays its own next tick.
    pub fn spawn(self: Arc<Self>) -> (JoinHandle<()>, JoinHandle<()>) {
        let confirmation = {
            let sweeper = Arc::clone(&self);
            tokio::spawn(async move {
                let mut ticker = interval(CONFIRMATION_SWEEP_INTERVAL);
                loop {
                    ticker.tick().await;
                    let report = sweeper.run_confirmation_sweep().await;
                    debug!(
                        "Confirmation sweep done: {} examined, {} sent, {} failed",
                        report.examined, report.sent, report.failed
                    );
                }
            })
        };

        let reminder = {
            let sweeper = Arc::clone(&self);
            tokio::spawn(async move {
                loop {
                    let wait = duration_until_hour(sweeper.clock.now(), REMINDER_SWEEP_HOUR);
                    debug!("Next reminder sweep in {:?}", wait);
                    sleep(wait).await;
                    sweeper.run_reminder_sweep().await;
                }
            })
        };

        (confirmation, reminder)
    }
}

/// Wall-clock wait until the next occurrence of `hour`:00 UTC.
fn duration_until_hour(now: DateTime<Utc>, hour: u32) -> Duration {
    let todays_run = now
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .expect("valid hour")
        .and_utc();

    let next_run = if now < todays_run {
        todays_run
    } else {
        todays_run + ChronoDuration::days(1)
    };

    (next_run - now)
        .to_std()
        .unwrap_or_else(|_| std::time::Duration::from_secs(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn waits_until_today_when_before_the_hour() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 6, 30, 0).unwrap();
        assert_eq!(
            duration_until_hour(now, 8),
            Duration::from_secs(90 * 60)
        );
    }

    #[test]
    fn rolls_to_tomorrow_when_past_the_hour() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 1).unwrap();
        assert_eq!(
            duration_until_hour(now, 8),
            Duration::from_secs(24 * 3600 - 1)
        );
    }
}
