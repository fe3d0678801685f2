use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // Public tier: booking, availability, departments, payment completion.
    let public_routes = Router::new()
        .route("/public", post(handlers::create_public_appointment))
        .route("/public/availability", get(handlers::check_availability))
        .route("/public/departments", get(handlers::list_departments))
        .route(
            "/public/{appointment_id}/complete-payment",
            post(handlers::complete_payment),
        );

    let protected_routes = Router::new()
        // Core management
        .route("/", get(handlers::list_appointments))
        .route("/search", get(handlers::search_appointments))
        .route("/stats", get(handlers::appointment_stats))
        .route("/today", get(handlers::todays_appointments))
        .route("/upcoming", get(handlers::upcoming_appointments))
        .route("/status/{status}", get(handlers::appointments_by_status))
        .route("/date/{date}", get(handlers::appointments_by_date))
        .route("/department/{department}", get(handlers::appointments_by_department))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}", put(handlers::update_appointment))
        .route("/{appointment_id}", delete(handlers::delete_appointment))
        .route("/{appointment_id}/confirm", put(handlers::confirm_appointment))
        .route(
            "/{appointment_id}/confirm-with-doctor",
            put(handlers::confirm_with_doctor),
        )
        .route("/{appointment_id}/cancel", put(handlers::cancel_appointment))
        // Doctor-assignment workflow
        .route("/{appointment_id}/assign-doctor", put(handlers::assign_doctor))
        .route("/{appointment_id}/doctor-accept", put(handlers::doctor_accept))
        .route("/{appointment_id}/doctor-decline", put(handlers::doctor_decline))
        // Payment workflow
        .route("/{appointment_id}/request-payment", put(handlers::request_payment))
        .route("/{appointment_id}/handle-payment", post(handlers::handle_payment))
        .route(
            "/{appointment_id}/send-payment-confirmation",
            post(handlers::send_payment_confirmation),
        )
        .route(
            "/{appointment_id}/send-update-notification",
            post(handlers::send_update_notification),
        )
        // Role-scoped views
        .route("/my-appointments", get(handlers::my_appointments))
        .route("/my-medical-history", get(handlers::my_medical_history))
        .route("/my-patients", get(handlers::my_patients))
        .route("/pending-my-approval", get(handlers::pending_my_approval))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
