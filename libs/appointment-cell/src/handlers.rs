// libs/appointment-cell/src/handlers.rs
use std::collections::BTreeMap;

use axum::{
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::debug;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::healthcare_entity_id;

use crate::models::{
    AppointmentError, AppointmentSearch, BookingRequest, BookingResult, CalendarQuery,
    ConflictCheckRequest, ConflictQuery, RescheduleRequest, RoomQuery, ScheduleQuery, SlotQuery,
    StatusUpdateRequest,
};
use crate::router::AppointmentState;
use crate::services::booking::parse_instant;
use crate::services::interval::TimeRange;
use crate::services::timezone::TimezoneError;

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::InvalidTime(msg) => AppError::ValidationError(msg),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::ConflictDetected => {
                AppError::Conflict("Appointment conflicts with an existing booking".to_string())
            }
            err @ AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(err.to_string()),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
            AppointmentError::ExternalServiceError(msg) => AppError::ExternalService(msg),
        }
    }
}

impl From<TimezoneError> for AppError {
    fn from(err: TimezoneError) -> Self {
        match err {
            TimezoneError::Lookup(msg) => AppError::ExternalService(msg),
            other => AppError::ValidationError(other.to_string()),
        }
    }
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

/// 201 with the appointment on success; 200 with the conflicts and
/// alternatives when the slot could not be booked.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingResult>), AppError> {
    let entity_id = healthcare_entity_id(&user, &headers)?;

    let result = state
        .booking_service(auth.token())
        .book(request, entity_id, &user.id)
        .await?;

    let status = if result.success { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(result)))
}

pub async fn check_appointment_conflicts(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Json(request): Json<ConflictCheckRequest>,
) -> Result<Json<Value>, AppError> {
    let entity_id = healthcare_entity_id(&user, &headers)?;
    let date_time = parse_instant(&request.date_time)?;

    let query = ConflictQuery {
        healthcare_entity_id: entity_id,
        doctor_id: request.doctor_id,
        room_id: request.room_id,
        date_time,
        duration: request.duration,
        exclude_appointment_id: request.exclude_appointment_id,
    };

    let report = state.booking_service(auth.token()).check_conflict(&query).await?;

    Ok(Json(json!({
        "has_conflict": report.has_conflict(),
        "conflicts": report.to_conflict_infos(),
    })))
}

pub async fn get_available_slots(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let entity_id = healthcare_entity_id(&user, &headers)?;

    let slots = state
        .booking_service(auth.token())
        .available_slots(query.doctor_id, entity_id, query.date, query.duration)
        .await?;

    let converter = state.timezones.converter_for(entity_id).await;
    debug!("Rendering {} slots in {}", slots.len(), converter.zone_name());

    let mut grouped: BTreeMap<&'static str, Vec<Value>> = BTreeMap::new();
    let mut rendered = Vec::with_capacity(slots.len());

    for slot in &slots {
        let entry = json!({
            "date_time": slot.date_time,
            "duration": slot.duration,
            "is_available": slot.is_available,
            "slot_type": slot.slot_type,
            "local_time": converter.format_in_entity_zone(slot.date_time, "%H:%M"),
        });

        grouped.entry(slot.slot_type.as_str()).or_default().push(entry.clone());
        rendered.push(entry);
    }

    Ok(Json(json!({
        "doctor_id": query.doctor_id,
        "date": query.date,
        "duration": query.duration,
        "timezone": converter.zone_name(),
        "total": slots.len(),
        "available_count": slots.iter().filter(|slot| slot.is_available).count(),
        "slots": rendered,
        "grouped": grouped,
    })))
}

pub async fn get_doctor_schedule(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Value>, AppError> {
    let entity_id = healthcare_entity_id(&user, &headers)?;
    let converter = state.timezones.converter_for(entity_id).await;
    let date = query.date.unwrap_or_else(|| converter.entity_date(Utc::now()));

    let schedule = state
        .booking_service(auth.token())
        .doctor_schedule(query.doctor_id, entity_id, date)
        .await?;

    Ok(Json(json!({
        "schedule": schedule,
        "timezone": converter.zone_name(),
    })))
}

pub async fn get_availability_calendar(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    let entity_id = healthcare_entity_id(&user, &headers)?;

    let calendar = state
        .booking_service(auth.token())
        .availability_calendar(query.doctor_id, entity_id, &query.month)
        .await?;

    Ok(Json(json!(calendar)))
}

pub async fn get_available_rooms(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Query(query): Query<RoomQuery>,
) -> Result<Json<Value>, AppError> {
    let entity_id = healthcare_entity_id(&user, &headers)?;
    state.rules.validate_duration(query.duration)?;

    let converter = state.timezones.converter_for(entity_id).await;
    let start = converter.parse_entity_local(&query.date_time)?;
    let range = TimeRange::from_duration(start, query.duration);

    let rooms = state
        .room_service(auth.token())
        .available_rooms(entity_id, range, query.room_type.as_deref())
        .await?;

    Ok(Json(json!({
        "date_time": start,
        "duration": query.duration,
        "timezone": converter.zone_name(),
        "total": rooms.len(),
        "rooms": rooms,
    })))
}

// ==============================================================================
// APPOINTMENT MANAGEMENT HANDLERS
// ==============================================================================

pub async fn search_appointments(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Query(search): Query<AppointmentSearch>,
) -> Result<Json<Value>, AppError> {
    let entity_id = healthcare_entity_id(&user, &headers)?;

    let appointments = state
        .booking_service(auth.token())
        .search_appointments(entity_id, &search)
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
        "limit": search.effective_limit(),
        "offset": search.effective_offset(),
    })))
}

pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<i64>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let entity_id = healthcare_entity_id(&user, &headers)?;

    let appointment = state
        .booking_service(auth.token())
        .get_appointment(appointment_id, entity_id)
        .await?;

    Ok(Json(json!(appointment)))
}

pub async fn reschedule_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<i64>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let entity_id = healthcare_entity_id(&user, &headers)?;

    let appointment = state
        .booking_service(auth.token())
        .reschedule_appointment(appointment_id, entity_id, request)
        .await?;

    Ok(Json(json!({
        "appointment": appointment,
        "message": "Appointment rescheduled successfully",
    })))
}

pub async fn update_appointment_status(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<i64>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    let entity_id = healthcare_entity_id(&user, &headers)?;

    let appointment = state
        .booking_service(auth.token())
        .update_status(appointment_id, entity_id, request)
        .await?;

    Ok(Json(json!({
        "appointment": appointment,
        "message": "Appointment status updated successfully",
    })))
}

pub async fn delete_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<i64>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let entity_id = healthcare_entity_id(&user, &headers)?;

    state
        .booking_service(auth.token())
        .delete_appointment(appointment_id, entity_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment deleted successfully",
    })))
}
