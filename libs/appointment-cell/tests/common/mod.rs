#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use tokio::sync::Barrier;

use appointment_cell::models::{
    Appointment, AppointmentError, AppointmentSearch, AppointmentStatus, AppointmentType,
    BookingRequest, NewAppointment, Priority, Room,
};
use appointment_cell::services::{AppointmentScope, AppointmentStore, RoomStore, TimeRange};
use doctor_cell::{AvailabilityError, AvailabilityStatus, AvailabilityStore, DoctorAvailability};

pub const ENTITY: i64 = 1;

pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn appointment(
    id: i64,
    doctor_id: i64,
    start: DateTime<Utc>,
    duration: i32,
    status: AppointmentStatus,
) -> Appointment {
    Appointment {
        id,
        healthcare_entity_id: ENTITY,
        patient_id: 100 + id,
        doctor_id,
        date_time: start,
        duration,
        appointment_type: AppointmentType::Consultation,
        status,
        reason: Some("Check-up".to_string()),
        notes: None,
        priority: Priority::Normal,
        room_id: None,
        is_active: true,
        created_at: start,
        updated_at: start,
        created_by: Some("1".to_string()),
    }
}

/// 09:00-17:00 UTC on `day`, optionally with a 12:00-13:00 break.
pub fn working_day(doctor_id: i64, day: NaiveDate, status: AvailabilityStatus, with_break: bool) -> DoctorAvailability {
    let start = day.and_hms_opt(9, 0, 0).unwrap().and_utc();
    let end = day.and_hms_opt(17, 0, 0).unwrap().and_utc();
    DoctorAvailability {
        id: doctor_id * 1000 + i64::from(day.day()),
        healthcare_entity_id: ENTITY,
        doctor_id,
        status,
        start_datetime: start,
        end_datetime: end,
        break_start_datetime: with_break.then(|| day.and_hms_opt(12, 0, 0).unwrap().and_utc()),
        break_end_datetime: with_break.then(|| day.and_hms_opt(13, 0, 0).unwrap().and_utc()),
        notes: None,
        created_at: start,
        updated_at: start,
        created_by: None,
    }
}

pub fn booking_request(doctor_id: i64, date_time: &str, duration: i32) -> BookingRequest {
    BookingRequest {
        patient_id: 42,
        doctor_id,
        date_time: date_time.to_string(),
        duration,
        appointment_type: AppointmentType::Consultation,
        reason: "Follow-up on blood work".to_string(),
        notes: None,
        priority: None,
        room_id: None,
        check_conflicts: true,
    }
}

// ==============================================================================
// AVAILABILITY STORE
// ==============================================================================

#[derive(Default)]
pub struct InMemoryAvailabilityStore {
    records: Mutex<HashMap<(i64, NaiveDate), DoctorAvailability>>,
    failing_dates: Mutex<HashSet<NaiveDate>>,
    calls: AtomicUsize,
}

impl InMemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, record: DoctorAvailability) -> Self {
        self.add(record);
        self
    }

    pub fn add(&self, record: DoctorAvailability) {
        self.records
            .lock()
            .unwrap()
            .insert((record.doctor_id, record.date()), record);
    }

    pub fn fail_on(&self, day: NaiveDate) {
        self.failing_dates.lock().unwrap().insert(day);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AvailabilityStore for InMemoryAvailabilityStore {
    async fn get_for_date(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        date: NaiveDate,
    ) -> Result<Option<DoctorAvailability>, AvailabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_dates.lock().unwrap().contains(&date) {
            return Err(AvailabilityError::DatabaseError("connection reset".to_string()));
        }

        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(doctor_id, date))
            .filter(|record| record.healthcare_entity_id == healthcare_entity_id)
            .cloned())
    }

    async fn get_for_range(
        &self,
        doctor_id: i64,
        healthcare_entity_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DoctorAvailability>, AvailabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut records: Vec<DoctorAvailability> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|record| {
                record.doctor_id == doctor_id
                    && record.healthcare_entity_id == healthcare_entity_id
                    && (from..=to).contains(&record.date())
            })
            .cloned()
            .collect();
        records.sort_by_key(|record| record.start_datetime);
        Ok(records)
    }
}

// ==============================================================================
// ROOM STORE
// ==============================================================================

pub fn room(id: i64, room_number: &str, room_type: &str, floor: i32) -> Room {
    Room {
        id,
        healthcare_entity_id: ENTITY,
        room_number: room_number.to_string(),
        room_name: None,
        room_type: Some(room_type.to_string()),
        floor: Some(floor),
        department: None,
        capacity: Some(1),
        is_active: true,
        notes: None,
    }
}

#[derive(Default)]
pub struct InMemoryRoomStore {
    rooms: Vec<Room>,
}

impl InMemoryRoomStore {
    pub fn new(rooms: Vec<Room>) -> Self {
        Self { rooms }
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn list_active(
        &self,
        healthcare_entity_id: i64,
        room_type: Option<&str>,
    ) -> Result<Vec<Room>, AppointmentError> {
        let mut rooms: Vec<Room> = self
            .rooms
            .iter()
            .filter(|room| room.is_active && room.healthcare_entity_id == healthcare_entity_id)
            .filter(|room| room_type.map_or(true, |wanted| room.room_type.as_deref() == Some(wanted)))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| (a.floor, &a.room_number).cmp(&(b.floor, &b.room_number)));
        Ok(rooms)
    }
}

// ==============================================================================
// APPOINTMENT STORE
// ==============================================================================

/// Appointment table double. Inserts enforce the same overlap rule as the
/// database exclusion constraint.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    rows: Mutex<Vec<Appointment>>,
    range_queries: AtomicUsize,
    /// Number of initial range queries that wait for each other before
    /// reading, so concurrent callers all see the pre-insert state.
    gate: Mutex<Option<(usize, Arc<Barrier>)>>,
    /// Next insert fails as if a row that has since been cancelled had
    /// collided with it.
    vanished_collision: AtomicBool,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, appointment: Appointment) -> Self {
        self.rows.lock().unwrap().push(appointment);
        self
    }

    pub fn hold_first_reads(&self, parties: usize) {
        *self.gate.lock().unwrap() = Some((parties, Arc::new(Barrier::new(parties))));
    }

    pub fn reject_next_insert(&self) {
        self.vanished_collision.store(true, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<Appointment> {
        self.rows.lock().unwrap().clone()
    }

    pub fn range_queries(&self) -> usize {
        self.range_queries.load(Ordering::SeqCst)
    }

    fn next_id(rows: &[Appointment]) -> i64 {
        rows.iter().map(|row| row.id).max().unwrap_or(0) + 1
    }

    fn collides(existing: &Appointment, candidate: &Appointment) -> bool {
        if !existing.is_blocking() || !candidate.is_blocking() || existing.id == candidate.id {
            return false;
        }
        if existing.healthcare_entity_id != candidate.healthcare_entity_id {
            return false;
        }
        let same_doctor = existing.doctor_id == candidate.doctor_id;
        let same_room = matches!((existing.room_id, candidate.room_id), (Some(a), Some(b)) if a > 0 && a == b);
        (same_doctor || same_room) && existing.time_range().overlaps(&candidate.time_range())
    }

    fn find_mut<'a>(
        rows: &'a mut [Appointment],
        id: i64,
        healthcare_entity_id: i64,
    ) -> Option<&'a mut Appointment> {
        rows.iter_mut()
            .find(|row| row.id == id && row.healthcare_entity_id == healthcare_entity_id && row.is_active)
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn get_active_in_range(
        &self,
        healthcare_entity_id: i64,
        scope: AppointmentScope,
        range: TimeRange,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let call = self.range_queries.fetch_add(1, Ordering::SeqCst);

        let barrier = self
            .gate
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(parties, _)| call < *parties)
            .map(|(_, barrier)| barrier.clone());
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.is_active && row.healthcare_entity_id == healthcare_entity_id)
            .filter(|row| scope.doctor_id.map_or(true, |doctor_id| row.doctor_id == doctor_id))
            .filter(|row| scope.room_id.map_or(true, |room_id| row.room_id == Some(room_id)))
            .filter(|row| row.time_range().overlaps(&range))
            .cloned()
            .collect())
    }

    async fn insert(&self, new: NewAppointment) -> Result<Appointment, AppointmentError> {
        if self.vanished_collision.swap(false, Ordering::SeqCst) {
            return Err(AppointmentError::ConflictDetected);
        }

        let mut rows = self.rows.lock().unwrap();

        let now = Utc::now();
        let candidate = Appointment {
            id: Self::next_id(&rows),
            healthcare_entity_id: new.healthcare_entity_id,
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            date_time: new.date_time,
            duration: new.duration,
            appointment_type: new.appointment_type,
            status: new.status,
            reason: Some(new.reason),
            notes: new.notes,
            priority: new.priority,
            room_id: new.room_id,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
            created_by: Some(new.created_by),
        };

        if rows.iter().any(|existing| Self::collides(existing, &candidate)) {
            return Err(AppointmentError::ConflictDetected);
        }

        rows.push(candidate.clone());
        Ok(candidate)
    }

    async fn get(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
    ) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.id == appointment_id && row.healthcare_entity_id == healthcare_entity_id && row.is_active)
            .cloned())
    }

    async fn update_schedule(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
        date_time: DateTime<Utc>,
        duration: i32,
    ) -> Result<Appointment, AppointmentError> {
        let mut rows = self.rows.lock().unwrap();

        let mut updated = Self::find_mut(&mut rows, appointment_id, healthcare_entity_id)
            .ok_or(AppointmentError::NotFound)?
            .clone();
        updated.date_time = date_time;
        updated.duration = duration;

        if rows.iter().any(|existing| Self::collides(existing, &updated)) {
            return Err(AppointmentError::ConflictDetected);
        }

        if let Some(row) = Self::find_mut(&mut rows, appointment_id, healthcare_entity_id) {
            *row = updated.clone();
        }
        Ok(updated)
    }

    async fn update_status(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
        status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let mut rows = self.rows.lock().unwrap();
        let row = Self::find_mut(&mut rows, appointment_id, healthcare_entity_id)
            .ok_or(AppointmentError::NotFound)?;

        row.status = status;
        if notes.is_some() {
            row.notes = notes;
        }
        Ok(row.clone())
    }

    async fn soft_delete(
        &self,
        appointment_id: i64,
        healthcare_entity_id: i64,
    ) -> Result<bool, AppointmentError> {
        let mut rows = self.rows.lock().unwrap();
        match Self::find_mut(&mut rows, appointment_id, healthcare_entity_id) {
            Some(row) => {
                row.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn search(
        &self,
        healthcare_entity_id: i64,
        search: &AppointmentSearch,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut found: Vec<Appointment> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.is_active && row.healthcare_entity_id == healthcare_entity_id)
            .filter(|row| search.doctor_id.map_or(true, |id| row.doctor_id == id))
            .filter(|row| search.patient_id.map_or(true, |id| row.patient_id == id))
            .filter(|row| search.status.map_or(true, |status| row.status == status))
            .cloned()
            .collect();

        found.sort_by_key(|row| row.date_time);
        Ok(found
            .into_iter()
            .skip(search.effective_offset() as usize)
            .take(search.effective_limit() as usize)
            .collect())
    }
}
