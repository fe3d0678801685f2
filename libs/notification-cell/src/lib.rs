pub mod models;
pub mod services;

pub use models::{AppointmentNotice, DeliveryOutcome, DeliveryState, NotificationKind};
pub use services::mailer::{EmailNotificationService, NotificationGateway};
