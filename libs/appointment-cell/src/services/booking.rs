use std::sync::Arc;

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, warn};

use doctor_cell::AvailabilityStore;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearch, AppointmentStatus, AvailabilityCalendar,
    AvailabilitySlot, BookingRequest, BookingResult, ConflictInfo, ConflictQuery, DoctorSchedule,
    NewAppointment, RescheduleRequest, SchedulingRules, StatusUpdateRequest,
};
use crate::services::alternatives::AlternativeSlotFinder;
use crate::services::conflict::{ConflictDetectionService, ConflictReport};
use crate::services::interval::TimeRange;
use crate::services::slots::{generate_slots, SlotService};
use crate::services::store::{AppointmentScope, AppointmentStore};

const UNAVAILABLE_MESSAGE: &str =
    "Doctor is not available on the selected date. Please choose an alternative time slot.";
const BUSY_MESSAGE: &str = "Time slot is not available. Please choose an alternative time.";
const SCHEDULE_SLOT_MINUTES: i32 = 30;

/// Parses an RFC3339 instant (offset honoured) into UTC.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, AppointmentError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| {
            AppointmentError::InvalidTime(format!(
                "'{}' is not an RFC3339 instant (expected e.g. 2024-01-15T10:00:00Z)",
                raw
            ))
        })
}

pub struct AppointmentBookingService {
    appointments: Arc<dyn AppointmentStore>,
    availability: Arc<dyn AvailabilityStore>,
    conflicts: ConflictDetectionService,
    slots: SlotService,
    alternatives: AlternativeSlotFinder,
    rules: SchedulingRules,
}

impl AppointmentBookingService {
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        availability: Arc<dyn AvailabilityStore>,
        rules: SchedulingRules,
    ) -> Self {
        let slots = SlotService::new(availability.clone(), appointments.clone(), rules);

        Self {
            conflicts: ConflictDetectionService::new(appointments.clone()),
            alternatives: AlternativeSlotFinder::new(slots.clone()),
            slots,
            appointments,
            availability,
            rules,
        }
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    /// Runs one booking attempt: request validation, then the availability
    /// gate, then the optional conflict gate, then the insert. Scheduling
    /// problems come back as a negative result; only store failures are
    /// errors.
    pub async fn book(
        &self,
        request: BookingRequest,
        healthcare_entity_id: i64,
        acting_user_id: &str,
    ) -> Result<BookingResult, AppointmentError> {
        let start = match parse_instant(&request.date_time) {
            Ok(start) => start,
            Err(e) => return Ok(BookingResult::rejected(e.to_string())),
        };

        if let Err(e) = self.validate_request(&request) {
            return Ok(BookingResult::rejected(e.to_string()));
        }

        let requested = TimeRange::from_duration(start, request.duration);
        debug!("Booking doctor {} for patient {} at {} ({} min)",
               request.doctor_id, request.patient_id, start, request.duration);

        let availability = self
            .availability
            .get_for_date(request.doctor_id, healthcare_entity_id, start.date_naive())
            .await?;

        if !availability.as_ref().is_some_and(|record| record.is_available()) {
            warn!("Doctor {} is not available on {}", request.doctor_id, start.date_naive());
            let alternatives = self
                .alternatives_for(request.doctor_id, healthcare_entity_id, start, request.duration)
                .await;
            return Ok(BookingResult::conflicted(
                vec![ConflictInfo::doctor_unavailable(requested)],
                alternatives,
                UNAVAILABLE_MESSAGE,
            ));
        }

        let query = ConflictQuery {
            healthcare_entity_id,
            doctor_id: request.doctor_id,
            room_id: request.room_id,
            date_time: start,
            duration: request.duration,
            exclude_appointment_id: None,
        };

        if request.check_conflicts {
            let report = self.conflicts.find_conflicts(&query).await?;
            if report.has_conflict() {
                return Ok(self.busy_result(&query, report).await);
            }
        }

        let new_appointment = NewAppointment {
            healthcare_entity_id,
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            date_time: start,
            duration: request.duration,
            appointment_type: request.appointment_type,
            status: AppointmentStatus::Scheduled,
            reason: request.reason.trim().to_string(),
            notes: request.notes.filter(|notes| !notes.trim().is_empty()),
            priority: request.priority.unwrap_or_default(),
            room_id: query.room(),
            is_active: true,
            created_by: acting_user_id.to_string(),
        };

        match self.appointments.insert(new_appointment).await {
            Ok(appointment) => {
                info!("Booked appointment {} for doctor {} at {}",
                      appointment.id, appointment.doctor_id, appointment.date_time);
                Ok(BookingResult::booked(appointment))
            }
            Err(AppointmentError::ConflictDetected) => {
                warn!("Insert for doctor {} at {} rejected by the overlap constraint", query.doctor_id, start);
                let report = self.conflicts.find_conflicts(&query).await?;
                Ok(self.busy_result(&query, report).await)
            }
            Err(e) => Err(e),
        }
    }

    fn validate_request(&self, request: &BookingRequest) -> Result<(), AppointmentError> {
        if request.patient_id <= 0 {
            return Err(AppointmentError::ValidationError("patient_id is required".to_string()));
        }
        if request.doctor_id <= 0 {
            return Err(AppointmentError::ValidationError("doctor_id is required".to_string()));
        }
        if request.reason.trim().is_empty() {
            return Err(AppointmentError::ValidationError("reason is required".to_string()));
        }
        self.rules.validate_duration(request.duration)
    }

    async fn busy_result(&self, query: &ConflictQuery, report: ConflictReport) -> BookingResult {
        let mut conflicts = report.to_conflict_infos();
        if conflicts.is_empty() {
            // Constraint fired but the re-read no longer sees the colliding row.
            conflicts.push(ConflictInfo::doctor_busy_at(query.time_range()));
        }

        let alternatives = self
            .alternatives_for(query.doctor_id, query.healthcare_entity_id, query.date_time, query.duration)
            .await;

        BookingResult::conflicted(conflicts, alternatives, BUSY_MESSAGE)
    }

    async fn alternatives_for(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        from: DateTime<Utc>,
        duration: i32,
    ) -> Vec<AvailabilitySlot> {
        match self
            .alternatives
            .find_alternatives(doctor_id, healthcare_entity_id, from, duration)
            .await
        {
            Ok(slots) => slots,
            Err(e) => {
                warn!("Could not compute alternatives for doctor {}: {}", doctor_id, e);
                Vec::new()
            }
        }
    }

    // ==============================================================================
    // APPOINTMENT MANAGEMENT
    // ==============================================================================

    pub async fn get_appointment(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
    ) -> Result<Appointment, AppointmentError> {
        self.appointments
            .get(appointment_id, healthcare_entity_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn search_appointments(
        &self,
        healthcare_entity_id: i64,
        search: &AppointmentSearch,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if let (Some(from), Some(to)) = (search.date_from, search.date_to) {
            if from > to {
                return Err(AppointmentError::ValidationError(
                    "date_from must not be after date_to".to_string(),
                ));
            }
        }

        self.appointments.search(healthcare_entity_id, search).await
    }

    /// Moves an appointment, keeping its duration unless a new one is given.
    pub async fn reschedule_appointment(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
        request: RescheduleRequest,
    ) -> Result<Appointment, AppointmentError> {
        let start = parse_instant(&request.date_time)?;
        let current = self.get_appointment(appointment_id, healthcare_entity_id).await?;

        if !matches!(current.status, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed) {
            return Err(AppointmentError::ValidationError(format!(
                "A {} appointment cannot be rescheduled",
                current.status
            )));
        }

        let duration = request.duration.unwrap_or(current.duration);
        self.rules.validate_duration(duration)?;

        let query = ConflictQuery {
            healthcare_entity_id,
            doctor_id: current.doctor_id,
            room_id: current.room_id,
            date_time: start,
            duration,
            exclude_appointment_id: Some(appointment_id),
        };

        if self.conflicts.has_conflict(&query).await? {
            return Err(AppointmentError::ConflictDetected);
        }

        let updated = self
            .appointments
            .update_schedule(appointment_id, healthcare_entity_id, start, duration)
            .await?;

        info!("Appointment {} rescheduled to {}", appointment_id, start);
        Ok(updated)
    }

    pub async fn update_status(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
        request: StatusUpdateRequest,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id, healthcare_entity_id).await?;

        if !current.status.can_transition_to(request.status) {
            return Err(AppointmentError::InvalidStatusTransition {
                from: current.status,
                to: request.status,
            });
        }

        // Reviving a cancelled appointment must not double-book its slot.
        if !current.status.is_blocking() && request.status.is_blocking() {
            let query = ConflictQuery {
                healthcare_entity_id,
                doctor_id: current.doctor_id,
                room_id: current.room_id,
                date_time: current.date_time,
                duration: current.duration,
                exclude_appointment_id: Some(appointment_id),
            };

            if self.conflicts.has_conflict(&query).await? {
                return Err(AppointmentError::ConflictDetected);
            }
        }

        let updated = self
            .appointments
            .update_status(appointment_id, healthcare_entity_id, request.status, request.notes)
            .await?;

        info!("Appointment {} moved from {} to {}", appointment_id, current.status, updated.status);
        Ok(updated)
    }

    pub async fn delete_appointment(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
    ) -> Result<(), AppointmentError> {
        if !self.appointments.soft_delete(appointment_id, healthcare_entity_id).await? {
            return Err(AppointmentError::NotFound);
        }

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn check_conflict(&self, query: &ConflictQuery) -> Result<ConflictReport, AppointmentError> {
        self.rules.validate_duration(query.duration)?;
        self.conflicts.find_conflicts(query).await
    }

    pub async fn available_slots(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        date: NaiveDate,
        duration: i32,
    ) -> Result<Vec<AvailabilitySlot>, AppointmentError> {
        self.slots
            .available_slots(doctor_id, healthcare_entity_id, date, duration)
            .await
    }

    /// The doctor's blocking appointments on the UTC day `date` (and anywhere
    /// in the working window), with the free 30-minute slots of that window.
    pub async fn doctor_schedule(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        date: NaiveDate,
    ) -> Result<DoctorSchedule, AppointmentError> {
        let window = self.slots.working_window(doctor_id, healthcare_entity_id, date).await?;

        let day_start = date.and_time(NaiveTime::MIN).and_utc();
        let mut range = TimeRange::new(day_start, day_start + Duration::days(1));
        if let Some(window) = &window {
            range = TimeRange::new(range.start.min(window.start), range.end.max(window.end));
        }

        let mut appointments: Vec<Appointment> = self
            .appointments
            .get_active_in_range(healthcare_entity_id, AppointmentScope::doctor(doctor_id), range)
            .await?
            .into_iter()
            .filter(Appointment::is_blocking)
            .collect();
        appointments.sort_by_key(|appointment| appointment.date_time);

        let available_slots = window
            .map(|window| {
                generate_slots(&window, &appointments, SCHEDULE_SLOT_MINUTES, SCHEDULE_SLOT_MINUTES)
                    .into_iter()
                    .filter(|slot| slot.is_available)
                    .collect()
            })
            .unwrap_or_default();

        Ok(DoctorSchedule {
            doctor_id,
            date,
            working_hours: window,
            appointments,
            available_slots,
        })
    }

    /// Every availability record the doctor declared in `month` (`YYYY-MM`),
    /// keyed by UTC date.
    pub async fn availability_calendar(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        month: &str,
    ) -> Result<AvailabilityCalendar, AppointmentError> {
        let month = month.trim();
        let first = NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d")
            .ok()
            .filter(|_| month.len() == 7)
            .ok_or_else(|| {
                AppointmentError::ValidationError(format!("'{}' is not a month (expected YYYY-MM)", month))
            })?;
        let last = first
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| AppointmentError::ValidationError(format!("'{}' is out of range", month)))?;

        let days = self
            .availability
            .get_for_range(doctor_id, healthcare_entity_id, first, last)
            .await?
            .into_iter()
            .map(|record| (record.date(), record))
            .collect();

        Ok(AvailabilityCalendar {
            doctor_id,
            month: month.to_string(),
            days,
        })
    }
}
