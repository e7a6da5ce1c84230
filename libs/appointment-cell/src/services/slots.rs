use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::{debug, warn};

use doctor_cell::AvailabilityStore;

use crate::models::{
    Appointment, AppointmentError, AvailabilitySlot, SchedulingRules, SlotType, WorkingWindow,
};
use crate::services::interval::TimeRange;
use crate::services::store::{AppointmentScope, AppointmentStore};

/// Cuts `window` into `slot_duration_minutes` candidates every `step_minutes`.
///
/// Candidates touching the break are dropped and the walk resumes at the end
/// of the break. Candidates overlapping an appointment that is neither
/// cancelled nor a no-show are kept but marked unavailable.
pub fn generate_slots(
    window: &WorkingWindow,
    existing: &[Appointment],
    slot_duration_minutes: i32,
    step_minutes: i32,
) -> Vec<AvailabilitySlot> {
    if slot_duration_minutes <= 0 || step_minutes <= 0 || window.start >= window.end {
        return Vec::new();
    }

    let slot_length = Duration::minutes(slot_duration_minutes as i64);
    let step = Duration::minutes(step_minutes as i64);
    let break_range = window.break_range();

    let occupied: Vec<TimeRange> = existing
        .iter()
        .filter(|appointment| appointment.is_active && appointment.status.occupies_slot())
        .map(Appointment::time_range)
        .collect();

    let mut slots = Vec::new();
    let mut cursor = window.start;

    while cursor + slot_length <= window.end {
        let candidate = TimeRange::new(cursor, cursor + slot_length);

        if let Some(break_range) = break_range {
            if candidate.overlaps(&break_range) {
                cursor = break_range.end;
                continue;
            }
        }

        let is_available = !occupied.iter().any(|taken| taken.overlaps(&candidate));

        slots.push(AvailabilitySlot {
            date_time: cursor,
            duration: slot_duration_minutes,
            is_available,
            slot_type: SlotType::for_instant(cursor),
        });

        cursor += step;
    }

    slots
}

/// A bookable day: the working window plus everything already on it.
#[derive(Debug, Clone)]
pub struct DaySchedule {
    pub window: WorkingWindow,
    pub appointments: Vec<Appointment>,
}

#[derive(Clone)]
pub struct SlotService {
    availability: Arc<dyn AvailabilityStore>,
    appointments: Arc<dyn AppointmentStore>,
    rules: SchedulingRules,
}

impl SlotService {
    pub fn new(
        availability: Arc<dyn AvailabilityStore>,
        appointments: Arc<dyn AppointmentStore>,
        rules: SchedulingRules,
    ) -> Self {
        Self { availability, appointments, rules }
    }

    /// The doctor's working window on `date`, or `None` when the doctor is
    /// not working that day.
    pub async fn working_window(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        date: NaiveDate,
    ) -> Result<Option<WorkingWindow>, AppointmentError> {
        let Some(availability) = self
            .availability
            .get_for_date(doctor_id, healthcare_entity_id, date)
            .await?
        else {
            debug!("Doctor {} has no availability on {}", doctor_id, date);
            return Ok(None);
        };

        if !availability.is_available() {
            debug!("Doctor {} is {} on {}", doctor_id, availability.status, date);
            return Ok(None);
        }

        if let Err(e) = availability.validate() {
            warn!("Skipping malformed availability {} for doctor {}: {}", availability.id, doctor_id, e);
            return Ok(None);
        }

        Ok(Some(WorkingWindow::from(&availability)))
    }

    /// The doctor's bookable window on `date` with its appointments, or
    /// `None` when the doctor is not working that day.
    pub async fn day_schedule(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        date: NaiveDate,
    ) -> Result<Option<DaySchedule>, AppointmentError> {
        let Some(window) = self.working_window(doctor_id, healthcare_entity_id, date).await? else {
            return Ok(None);
        };

        let appointments = self
            .appointments
            .get_active_in_range(healthcare_entity_id, AppointmentScope::doctor(doctor_id), window.range())
            .await?;

        Ok(Some(DaySchedule { window, appointments }))
    }

    pub async fn available_slots(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        date: NaiveDate,
        duration: i32,
    ) -> Result<Vec<AvailabilitySlot>, AppointmentError> {
        self.rules.validate_duration(duration)?;

        let Some(schedule) = self.day_schedule(doctor_id, healthcare_entity_id, date).await? else {
            return Ok(Vec::new());
        };

        let slots = generate_slots(
            &schedule.window,
            &schedule.appointments,
            duration,
            self.rules.slot_step_minutes,
        );

        debug!("Generated {} slots for doctor {} on {}", slots.len(), doctor_id, date);
        Ok(slots)
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }
}
