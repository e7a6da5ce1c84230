// libs/appointment-cell/src/router.rs
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post, put, patch},
    middleware,
};

use doctor_cell::SupabaseAvailabilityStore;
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::models::SchedulingRules;
use crate::services::booking::AppointmentBookingService;
use crate::services::rooms::{RoomAvailabilityService, SupabaseRoomStore};
use crate::services::store::SupabaseAppointmentStore;
use crate::services::timezone::{HttpEntityTimezoneLookup, TimezoneCache};

#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub supabase: Arc<SupabaseClient>,
    pub timezones: Arc<TimezoneCache>,
    pub rules: SchedulingRules,
}

impl AppointmentState {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let lookup = Arc::new(HttpEntityTimezoneLookup::from_config(&config));
        let timezones = Arc::new(TimezoneCache::new(
            lookup,
            Duration::from_secs(config.timezone_cache_ttl_secs),
        ));
        Self::with_timezones(config, timezones)
    }

    pub fn with_timezones(config: Arc<AppConfig>, timezones: Arc<TimezoneCache>) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(&config)),
            config,
            timezones,
            rules: SchedulingRules::default(),
        }
    }

    /// Stores act with the caller's token so row level security applies.
    pub fn booking_service(&self, auth_token: &str) -> AppointmentBookingService {
        let token = Some(auth_token.to_string());
        AppointmentBookingService::new(
            Arc::new(SupabaseAppointmentStore::new(self.supabase.clone(), token.clone())),
            Arc::new(SupabaseAvailabilityStore::new(self.supabase.clone(), token)),
            self.rules,
        )
    }

    pub fn room_service(&self, auth_token: &str) -> RoomAvailabilityService {
        let token = Some(auth_token.to_string());
        RoomAvailabilityService::new(
            Arc::new(SupabaseRoomStore::new(self.supabase.clone(), token.clone())),
            Arc::new(SupabaseAppointmentStore::new(self.supabase.clone(), token)),
        )
    }
}

pub fn appointment_routes(state: AppointmentState) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/book", post(handlers::book_appointment))
        .route("/conflicts/check", post(handlers::check_appointment_conflicts))
        .route("/slots", get(handlers::get_available_slots))
        .route("/schedules", get(handlers::get_doctor_schedule))
        .route("/calendar", get(handlers::get_availability_calendar))
        .route("/rooms/available", get(handlers::get_available_rooms))
        .route("/", get(handlers::search_appointments))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).delete(handlers::delete_appointment),
        )
        .route("/{appointment_id}/reschedule", put(handlers::reschedule_appointment))
        .route("/{appointment_id}/status", patch(handlers::update_appointment_status))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
