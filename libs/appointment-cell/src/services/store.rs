use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use shared_database::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearch, AppointmentStatus, NewAppointment,
};
use crate::services::interval::TimeRange;

/// Longest appointment the system accepts; bounds the look-back when
/// searching for rows that started before a range but still run into it.
const MAX_APPOINTMENT_MINUTES: i64 = 480;

/// Which resource an interval query is about. Empty scope means the whole
/// healthcare entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppointmentScope {
    pub doctor_id: Option<i64>,
    pub room_id: Option<i64>,
}

impl AppointmentScope {
    pub fn doctor(doctor_id: i64) -> Self {
        Self { doctor_id: Some(doctor_id), room_id: None }
    }

    pub fn room(room_id: i64) -> Self {
        Self { doctor_id: None, room_id: Some(room_id) }
    }
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Non-deleted appointments in scope whose `[start, end)` intersects
    /// `range`, any status, ordered by start.
    async fn get_active_in_range(
        &self,
        healthcare_entity_id: i64,
        scope: AppointmentScope,
        range: TimeRange,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Fails with `ConflictDetected` when the write collides with another
    /// blocking appointment.
    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError>;

    async fn get(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
    ) -> Result<Option<Appointment>, AppointmentError>;

    async fn update_schedule(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
        date_time: DateTime<Utc>,
        duration: i32,
    ) -> Result<Appointment, AppointmentError>;

    async fn update_status(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
        status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError>;

    /// Returns false when no active appointment matched.
    async fn soft_delete(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
    ) -> Result<bool, AppointmentError>;

    async fn search(
        &self,
        healthcare_entity_id: i64,
        search: &AppointmentSearch,
    ) -> Result<Vec<Appointment>, AppointmentError>;
}

pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
    auth_token: Option<String>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>, auth_token: Option<String>) -> Self {
        Self { supabase, auth_token }
    }

    fn row_path(appointment_id: i64, healthcare_entity_id: i64) -> String {
        format!(
            "/rest/v1/appointments?id=eq.{}&healthcare_entity_id=eq.{}&is_active=eq.true",
            appointment_id, healthcare_entity_id
        )
    }

    async fn patch_row(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
        update: Value,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = Self::row_path(appointment_id, healthcare_entity_id);

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            self.auth_token.as_deref(),
            Some(update),
            Some(SupabaseClient::return_representation()),
        ).await?;

        parse_rows(result)
    }
}

fn timestamp_filter(instant: DateTime<Utc>) -> String {
    urlencoding::encode(&instant.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
}

fn parse_rows(rows: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|e| {
                AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
            })
        })
        .collect()
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn get_active_in_range(
        &self,
        healthcare_entity_id: i64,
        scope: AppointmentScope,
        range: TimeRange,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Fetching appointments for entity {} scope {:?} in {} - {}",
               healthcare_entity_id, scope, range.start, range.end);

        let mut query_parts = vec![
            format!("healthcare_entity_id=eq.{}", healthcare_entity_id),
            "is_active=eq.true".to_string(),
        ];

        if let Some(doctor_id) = scope.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(room_id) = scope.room_id {
            query_parts.push(format!("room_id=eq.{}", room_id));
        }

        let lookback = range.start - Duration::minutes(MAX_APPOINTMENT_MINUTES);
        query_parts.push(format!("date_time=gte.{}", timestamp_filter(lookback)));
        query_parts.push(format!("date_time=lt.{}", timestamp_filter(range.end)));
        query_parts.push("order=date_time.asc".to_string());

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            self.auth_token.as_deref(),
            None,
        ).await?;

        let appointments = parse_rows(result)?
            .into_iter()
            .filter(|appointment| appointment.time_range().overlaps(&range))
            .collect();

        Ok(appointments)
    }

    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError> {
        debug!("Inserting appointment for doctor {} at {}", appointment.doctor_id, appointment.date_time);

        let body = serde_json::to_value(&appointment)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to encode appointment: {}", e)))?;

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            self.auth_token.as_deref(),
            Some(body),
            Some(SupabaseClient::return_representation()),
        ).await?;

        let created = parse_rows(result)?
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to create appointment".to_string()))?;

        info!("Appointment {} created for doctor {}", created.id, created.doctor_id);
        Ok(created)
    }

    async fn get(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = Self::row_path(appointment_id, healthcare_entity_id);

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            self.auth_token.as_deref(),
            None,
        ).await?;

        Ok(parse_rows(result)?.into_iter().next())
    }

    async fn update_schedule(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
        date_time: DateTime<Utc>,
        duration: i32,
    ) -> Result<Appointment, AppointmentError> {
        let update = json!({
            "date_time": date_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            "duration": duration,
            "updated_at": Utc::now().to_rfc3339(),
        });

        self.patch_row(appointment_id, healthcare_entity_id, update)
            .await?
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)
    }

    async fn update_status(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
        status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let mut update = json!({
            "status": status.as_str(),
            "updated_at": Utc::now().to_rfc3339(),
        });
        if let Some(notes) = notes {
            update["notes"] = json!(notes);
        }

        self.patch_row(appointment_id, healthcare_entity_id, update)
            .await?
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)
    }

    async fn soft_delete(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
    ) -> Result<bool, AppointmentError> {
        let update = json!({
            "is_active": false,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let deleted = self.patch_row(appointment_id, healthcare_entity_id, update).await?;
        Ok(!deleted.is_empty())
    }

    async fn search(
        &self,
        healthcare_entity_id: i64,
        search: &AppointmentSearch,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = vec![
            format!("healthcare_entity_id=eq.{}", healthcare_entity_id),
            "is_active=eq.true".to_string(),
        ];

        if let Some(patient_id) = search.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(doctor_id) = search.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(status) = search.status {
            query_parts.push(format!("status=eq.{}", status.as_str()));
        }
        if let Some(appointment_type) = search.appointment_type {
            query_parts.push(format!("type=eq.{}", appointment_type.as_str()));
        }
        if let Some(from) = search.date_from {
            query_parts.push(format!("date_time=gte.{}", timestamp_filter(from)));
        }
        if let Some(to) = search.date_to {
            query_parts.push(format!("date_time=lte.{}", timestamp_filter(to)));
        }

        query_parts.push("order=date_time.asc".to_string());
        query_parts.push(format!("limit={}", search.effective_limit()));
        query_parts.push(format!("offset={}", search.effective_offset()));

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));
        debug!("Searching appointments: {}", path);

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            self.auth_token.as_deref(),
            None,
        ).await?;

        parse_rows(result)
    }
}
