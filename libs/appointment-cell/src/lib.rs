pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{Appointment, AppointmentError, AppointmentStatus, Department};
pub use services::booking::AppointmentBookingService;
pub use services::sweeper::SweeperService;
