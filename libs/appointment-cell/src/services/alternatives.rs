use chrono::{DateTime, Days, Utc};
use tracing::{debug, warn};

use crate::models::{AppointmentError, AvailabilitySlot};
use crate::services::conflict::blocking_overlaps;
use crate::services::slots::{generate_slots, SlotService};

/// Proposes other times after a booking attempt failed.
#[derive(Clone)]
pub struct AlternativeSlotFinder {
    slots: SlotService,
}

impl AlternativeSlotFinder {
    pub fn new(slots: SlotService) -> Self {
        Self { slots }
    }

    /// Scans the requested day and the following ones, taking the earliest
    /// free slots of each working day. A day whose data cannot be read is
    /// skipped.
    pub async fn find_alternatives(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        from: DateTime<Utc>,
        duration: i32,
    ) -> Result<Vec<AvailabilitySlot>, AppointmentError> {
        let rules = *self.slots.rules();
        rules.validate_duration(duration)?;

        let first_day = from.date_naive();
        let mut alternatives = Vec::with_capacity(rules.max_alternatives);

        for offset in 0..rules.alternative_search_days {
            let Some(day) = first_day.checked_add_days(Days::new(offset as u64)) else {
                break;
            };

            let schedule = match self.slots.day_schedule(doctor_id, healthcare_entity_id, day).await {
                Ok(Some(schedule)) => schedule,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping {} while looking for alternatives for doctor {}: {}", day, doctor_id, e);
                    continue;
                }
            };

            let free = generate_slots(&schedule.window, &schedule.appointments, duration, rules.slot_step_minutes)
                .into_iter()
                .filter(|slot| slot.is_available)
                .filter(|slot| blocking_overlaps(&schedule.appointments, &slot.time_range(), None).is_empty())
                .take(rules.alternatives_per_day);

            alternatives.extend(free);

            if alternatives.len() >= rules.max_alternatives {
                break;
            }
        }

        alternatives.truncate(rules.max_alternatives);
        debug!("Found {} alternative slots for doctor {}", alternatives.len(), doctor_id);

        Ok(alternatives)
    }
}
