use chrono::{NaiveDate, NaiveTime};
use tracing::debug;

use crate::models::{AppointmentError, Department};
use crate::services::store::AppointmentStore;

/// Capacity ceiling for one (date, time, department) slot.
pub const SLOT_CAPACITY: i64 = 3;

/// Counts non-cancelled bookings for an exact slot against the ceiling. Used
/// both as a public pre-flight query and as the in-line gate during creation;
/// the store's capacity trigger remains the arbiter under concurrency.
pub struct SlotAvailabilityService {
    store: AppointmentStore,
}

impl SlotAvailabilityService {
    pub fn new(store: AppointmentStore) -> Self {
        Self { store }
    }

    pub async fn is_available(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        department: Department,
    ) -> Result<bool, AppointmentError> {
        let count = self.store.count_slot(date, time, department).await?;
        debug!(
            "Slot {} {} {} holds {} of {} bookings",
            date, time, department, count, SLOT_CAPACITY
        );
        Ok(count < SLOT_CAPACITY)
    }
}
