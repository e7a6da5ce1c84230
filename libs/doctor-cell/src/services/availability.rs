use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use shared_database::SupabaseClient;

use crate::models::{AvailabilityError, DoctorAvailability};

/// Read side of the doctors' declared availability.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// The record whose `start_datetime` falls on `date` (UTC), if the doctor
    /// declared one.
    async fn get_for_date(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        date: NaiveDate,
    ) -> Result<Option<DoctorAvailability>, AvailabilityError>;

    /// Records starting on any UTC date in `from..=to`, ordered by start.
    async fn get_for_range(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DoctorAvailability>, AvailabilityError>;
}

pub struct SupabaseAvailabilityStore {
    supabase: Arc<SupabaseClient>,
    auth_token: Option<String>,
}

impl SupabaseAvailabilityStore {
    pub fn new(supabase: Arc<SupabaseClient>, auth_token: Option<String>) -> Self {
        Self { supabase, auth_token }
    }

    /// Rows whose `start_datetime` lies in the UTC days `from..=to`.
    async fn fetch_days(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        from: NaiveDate,
        to: NaiveDate,
        limit: usize,
    ) -> Result<Vec<DoctorAvailability>, AvailabilityError> {
        let range_start = midnight(from);
        let range_end = midnight(to) + Duration::days(1);

        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&healthcare_entity_id=eq.{}&start_datetime=gte.{}&start_datetime=lt.{}&order=start_datetime.asc&limit={}",
            doctor_id,
            healthcare_entity_id,
            timestamp_filter(range_start),
            timestamp_filter(range_end),
            limit,
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            self.auth_token.as_deref(),
            None,
        ).await?;

        result
            .into_iter()
            .map(|row| {
                let availability: DoctorAvailability = serde_json::from_value(row)
                    .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse availability: {}", e)))?;
                if let Err(e) = availability.validate() {
                    warn!("Availability {} for doctor {} is malformed: {}", availability.id, doctor_id, e);
                }
                Ok(availability)
            })
            .collect()
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn timestamp_filter(instant: DateTime<Utc>) -> String {
    urlencoding::encode(&instant.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
}

#[async_trait]
impl AvailabilityStore for SupabaseAvailabilityStore {
    async fn get_for_date(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        date: NaiveDate,
    ) -> Result<Option<DoctorAvailability>, AvailabilityError> {
        debug!("Fetching availability for doctor {} in entity {} on {}",
               doctor_id, healthcare_entity_id, date);

        let availability = self
            .fetch_days(doctor_id, healthcare_entity_id, date, date, 1)
            .await?
            .into_iter()
            .next();

        if availability.is_none() {
            debug!("No availability declared for doctor {} on {}", doctor_id, date);
        }

        Ok(availability)
    }

    async fn get_for_range(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DoctorAvailability>, AvailabilityError> {
        if from > to {
            return Ok(Vec::new());
        }

        debug!("Fetching availability for doctor {} in entity {} from {} to {}",
               doctor_id, healthcare_entity_id, from, to);

        let days = (to - from).num_days() as usize + 1;
        self.fetch_days(doctor_id, healthcare_entity_id, from, to, days).await
    }
}
