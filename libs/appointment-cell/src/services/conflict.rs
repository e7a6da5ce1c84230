use std::sync::Arc;

use futures::future::try_join;
use tracing::{debug, warn};

use crate::models::{Appointment, AppointmentError, ConflictInfo, ConflictQuery};
use crate::services::interval::TimeRange;
use crate::services::store::{AppointmentScope, AppointmentStore};

/// Blocking appointments in `existing` that intersect `range`, skipping
/// `exclude` (the appointment being moved, if any).
pub fn blocking_overlaps<'a>(
    existing: &'a [Appointment],
    range: &TimeRange,
    exclude: Option<i64>,
) -> Vec<&'a Appointment> {
    existing
        .iter()
        .filter(|appointment| appointment.is_blocking())
        .filter(|appointment| Some(appointment.id) != exclude)
        .filter(|appointment| appointment.time_range().overlaps(range))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConflictReport {
    pub doctor_conflicts: Vec<Appointment>,
    pub room_conflicts: Vec<Appointment>,
}

impl ConflictReport {
    pub fn has_conflict(&self) -> bool {
        !self.doctor_conflicts.is_empty() || !self.room_conflicts.is_empty()
    }

    pub fn to_conflict_infos(&self) -> Vec<ConflictInfo> {
        self.doctor_conflicts
            .iter()
            .map(ConflictInfo::doctor_busy)
            .chain(self.room_conflicts.iter().map(ConflictInfo::room_occupied))
            .collect()
    }
}

#[derive(Clone)]
pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Doctor conflict or, when a room was given, room conflict. The room is
    /// only queried when the doctor is free.
    pub async fn has_conflict(&self, query: &ConflictQuery) -> Result<bool, AppointmentError> {
        debug!("Checking conflicts for doctor {} at {} ({} min)",
               query.doctor_id, query.date_time, query.duration);

        if !self.doctor_conflicts(query).await?.is_empty() {
            warn!("Doctor {} is busy at {}", query.doctor_id, query.date_time);
            return Ok(true);
        }

        if let Some(room_id) = query.room() {
            if !self.room_conflicts(query, room_id).await?.is_empty() {
                warn!("Room {} is occupied at {}", room_id, query.date_time);
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Every conflicting appointment on both sides.
    pub async fn find_conflicts(&self, query: &ConflictQuery) -> Result<ConflictReport, AppointmentError> {
        let (doctor_conflicts, room_conflicts) = match query.room() {
            Some(room_id) => {
                try_join(self.doctor_conflicts(query), self.room_conflicts(query, room_id)).await?
            }
            None => (self.doctor_conflicts(query).await?, Vec::new()),
        };

        let report = ConflictReport { doctor_conflicts, room_conflicts };
        if report.has_conflict() {
            warn!("Conflict detected for doctor {} - {} doctor, {} room conflicts",
                  query.doctor_id, report.doctor_conflicts.len(), report.room_conflicts.len());
        }

        Ok(report)
    }

    async fn doctor_conflicts(&self, query: &ConflictQuery) -> Result<Vec<Appointment>, AppointmentError> {
        self.scoped_conflicts(query, AppointmentScope::doctor(query.doctor_id)).await
    }

    async fn room_conflicts(&self, query: &ConflictQuery, room_id: i64) -> Result<Vec<Appointment>, AppointmentError> {
        self.scoped_conflicts(query, AppointmentScope::room(room_id)).await
    }

    async fn scoped_conflicts(
        &self,
        query: &ConflictQuery,
        scope: AppointmentScope,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let range = query.time_range();
        let existing = self
            .store
            .get_active_in_range(query.healthcare_entity_id, scope, range)
            .await?;

        Ok(blocking_overlaps(&existing, &range, query.exclude_appointment_id)
            .into_iter()
            .cloned()
            .collect())
    }
}
