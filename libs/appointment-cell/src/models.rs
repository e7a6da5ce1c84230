// libs/appointment-cell/src/models.rs
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use doctor_cell::{AvailabilityError, DoctorAvailability};
use shared_database::DatabaseError;

use crate::services::interval::TimeRange;

// ==============================================================================
// ENUMERATIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentType {
    Consultation,
    FollowUp,
    Procedure,
    Emergency,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::Consultation => "consultation",
            AppointmentType::FollowUp => "follow-up",
            AppointmentType::Procedure => "procedure",
            AppointmentType::Emergency => "emergency",
        }
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentType {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consultation" => Ok(AppointmentType::Consultation),
            "follow-up" => Ok(AppointmentType::FollowUp),
            "procedure" => Ok(AppointmentType::Procedure),
            "emergency" => Ok(AppointmentType::Emergency),
            other => Err(AppointmentError::ValidationError(format!(
                "Unknown appointment type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in-progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no-show",
        }
    }

    /// Statuses that hold the doctor's (and room's) time.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed | AppointmentStatus::InProgress
        )
    }

    /// Statuses shown as taken when listing slots. Looser than `is_blocking`:
    /// completed appointments still mark their slot.
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::NoShow)
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;

        if *self == next {
            return true;
        }

        match self {
            Scheduled => matches!(next, Confirmed | InProgress | Cancelled | NoShow),
            Confirmed => matches!(next, InProgress | Cancelled | NoShow | Scheduled),
            InProgress => matches!(next, Completed | Cancelled),
            Cancelled => matches!(next, Scheduled),
            Completed | NoShow => false,
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "in-progress" => Ok(AppointmentStatus::InProgress),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "no-show" => Ok(AppointmentStatus::NoShow),
            other => Err(AppointmentError::ValidationError(format!(
                "Unknown appointment status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(AppointmentError::ValidationError(format!(
                "Unknown priority: {}",
                other
            ))),
        }
    }
}

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: i64,
    pub healthcare_entity_id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub date_time: DateTime<Utc>,
    pub duration: i32,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub room_id: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl Appointment {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.date_time + Duration::minutes(self.duration as i64)
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::from_duration(self.date_time, self.duration)
    }

    /// Soft-deleted rows and finished or abandoned visits never conflict.
    pub fn is_blocking(&self) -> bool {
        self.is_active && self.status.is_blocking()
    }
}

/// Insert payload for a new appointment row.
#[derive(Debug, Clone, Serialize)]
pub struct NewAppointment {
    pub healthcare_entity_id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub date_time: DateTime<Utc>,
    pub duration: i32,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<i64>,
    pub is_active: bool,
    pub created_by: String,
}

impl NewAppointment {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::from_duration(self.date_time, self.duration)
    }
}

// ==============================================================================
// CONFLICT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictQuery {
    pub healthcare_entity_id: i64,
    pub doctor_id: i64,
    pub room_id: Option<i64>,
    pub date_time: DateTime<Utc>,
    pub duration: i32,
    pub exclude_appointment_id: Option<i64>,
}

impl ConflictQuery {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::from_duration(self.date_time, self.duration)
    }

    /// Room to check, if one was actually requested.
    pub fn room(&self) -> Option<i64> {
        self.room_id.filter(|room_id| *room_id > 0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    DoctorUnavailable,
    DoctorBusy,
    RoomOccupied,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictInfo {
    pub conflict_type: ConflictType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_appointment: Option<Appointment>,
    pub conflict_time: DateTime<Utc>,
    pub conflict_end: DateTime<Utc>,
    pub description: String,
}

impl ConflictInfo {
    pub fn doctor_unavailable(requested: TimeRange) -> Self {
        Self {
            conflict_type: ConflictType::DoctorUnavailable,
            existing_appointment: None,
            conflict_time: requested.start,
            conflict_end: requested.end,
            description: "Doctor is not available on this date".to_string(),
        }
    }

    pub fn doctor_busy(existing: &Appointment) -> Self {
        Self {
            conflict_type: ConflictType::DoctorBusy,
            existing_appointment: Some(existing.clone()),
            conflict_time: existing.date_time,
            conflict_end: existing.end_time(),
            description: "Doctor has another appointment at this time".to_string(),
        }
    }

    /// Busy entry for a write the database rejected when the colliding row
    /// is no longer visible to a re-read.
    pub fn doctor_busy_at(requested: TimeRange) -> Self {
        Self {
            conflict_type: ConflictType::DoctorBusy,
            existing_appointment: None,
            conflict_time: requested.start,
            conflict_end: requested.end,
            description: "Doctor has another appointment at this time".to_string(),
        }
    }

    pub fn room_occupied(existing: &Appointment) -> Self {
        Self {
            conflict_type: ConflictType::RoomOccupied,
            existing_appointment: Some(existing.clone()),
            conflict_time: existing.date_time,
            conflict_end: existing.end_time(),
            description: "Room is occupied at this time".to_string(),
        }
    }
}

// ==============================================================================
// SLOT MODELS
// ==============================================================================

/// The bookable part of a doctor's day.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct WorkingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub break_start: Option<DateTime<Utc>>,
    pub break_end: Option<DateTime<Utc>>,
}

impl WorkingWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end, break_start: None, break_end: None }
    }

    pub fn with_break(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.break_start = Some(start);
        self.break_end = Some(end);
        self
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }

    pub fn break_range(&self) -> Option<TimeRange> {
        match (self.break_start, self.break_end) {
            (Some(start), Some(end)) if start < end => Some(TimeRange::new(start, end)),
            _ => None,
        }
    }
}

impl From<&DoctorAvailability> for WorkingWindow {
    fn from(availability: &DoctorAvailability) -> Self {
        Self {
            start: availability.start_datetime,
            end: availability.end_datetime,
            break_start: availability.break_start_datetime,
            break_end: availability.break_end_datetime,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SlotType {
    Morning,
    Afternoon,
    Evening,
}

impl SlotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotType::Morning => "morning",
            SlotType::Afternoon => "afternoon",
            SlotType::Evening => "evening",
        }
    }

    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=11 => SlotType::Morning,
            12..=16 => SlotType::Afternoon,
            _ => SlotType::Evening,
        }
    }

    /// Display hint only; derived from the UTC hour.
    pub fn for_instant(instant: DateTime<Utc>) -> Self {
        Self::from_hour(instant.hour())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilitySlot {
    pub date_time: DateTime<Utc>,
    pub duration: i32,
    pub is_available: bool,
    pub slot_type: SlotType,
}

impl AvailabilitySlot {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.date_time + Duration::minutes(self.duration as i64)
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::from_duration(self.date_time, self.duration)
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub patient_id: i64,
    pub doctor_id: i64,
    /// RFC3339 instant, e.g. `2024-01-15T10:00:00Z`.
    pub date_time: String,
    pub duration: i32,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub room_id: Option<i64>,
    #[serde(default)]
    pub check_conflicts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment: Option<Appointment>,
    #[serde(default)]
    pub conflicts: Vec<ConflictInfo>,
    #[serde(default)]
    pub alternative_slots: Vec<AvailabilitySlot>,
    pub message: String,
}

impl BookingResult {
    pub fn booked(appointment: Appointment) -> Self {
        Self {
            success: true,
            appointment_id: Some(appointment.id),
            appointment: Some(appointment),
            conflicts: Vec::new(),
            alternative_slots: Vec::new(),
            message: "Appointment booked successfully".to_string(),
        }
    }

    /// Malformed request; nothing was checked.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            appointment_id: None,
            appointment: None,
            conflicts: Vec::new(),
            alternative_slots: Vec::new(),
            message: message.into(),
        }
    }

    pub fn conflicted(
        conflicts: Vec<ConflictInfo>,
        alternative_slots: Vec<AvailabilitySlot>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            appointment_id: None,
            appointment: None,
            conflicts,
            alternative_slots,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckRequest {
    pub doctor_id: i64,
    #[serde(default)]
    pub room_id: Option<i64>,
    pub date_time: String,
    pub duration: i32,
    #[serde(default)]
    pub exclude_appointment_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub date_time: String,
    #[serde(default)]
    pub duration: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentSearch {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub status: Option<AppointmentStatus>,
    #[serde(rename = "type")]
    pub appointment_type: Option<AppointmentType>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AppointmentSearch {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn effective_limit(&self) -> u32 {
        match self.limit {
            Some(0) | None => Self::DEFAULT_LIMIT,
            Some(limit) => limit.min(Self::MAX_LIMIT),
        }
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub doctor_id: i64,
    pub date: NaiveDate,
    #[serde(default = "default_slot_duration")]
    pub duration: i32,
}

fn default_slot_duration() -> i32 {
    30
}

// ==============================================================================
// SCHEDULE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleQuery {
    pub doctor_id: i64,
    /// Defaults to today in the entity's zone.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// One day of a doctor's diary: the working window, what blocks it, and
/// the 30-minute slots still free.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DoctorSchedule {
    pub doctor_id: i64,
    pub date: NaiveDate,
    pub working_hours: Option<WorkingWindow>,
    pub appointments: Vec<Appointment>,
    pub available_slots: Vec<AvailabilitySlot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarQuery {
    pub doctor_id: i64,
    /// `YYYY-MM`
    pub month: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AvailabilityCalendar {
    pub doctor_id: i64,
    pub month: String,
    pub days: BTreeMap<NaiveDate, DoctorAvailability>,
}

// ==============================================================================
// ROOM MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: i64,
    pub healthcare_entity_id: i64,
    pub room_number: String,
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub room_type: Option<String>,
    #[serde(default)]
    pub floor: Option<i32>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub capacity: Option<i32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoomAvailability {
    #[serde(flatten)]
    pub room: Room,
    pub is_available: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomQuery {
    /// Wall-clock time in the entity's zone, or an RFC3339 instant.
    pub date_time: String,
    #[serde(default = "default_slot_duration")]
    pub duration: i32,
    #[serde(default)]
    pub room_type: Option<String>,
}

// ==============================================================================
// SCHEDULING RULES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingRules {
    pub min_duration_minutes: i32,
    pub max_duration_minutes: i32,
    pub slot_step_minutes: i32,
    pub alternative_search_days: i64,
    pub alternatives_per_day: usize,
    pub max_alternatives: usize,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            min_duration_minutes: 15,
            max_duration_minutes: 480,
            slot_step_minutes: 30,
            alternative_search_days: 7,
            alternatives_per_day: 3,
            max_alternatives: 10,
        }
    }
}

impl SchedulingRules {
    pub fn validate_duration(&self, duration: i32) -> Result<(), AppointmentError> {
        if duration < self.min_duration_minutes || duration > self.max_duration_minutes {
            return Err(AppointmentError::ValidationError(format!(
                "Duration must be between {} and {} minutes, got {}",
                self.min_duration_minutes, self.max_duration_minutes, duration
            )));
        }
        Ok(())
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Appointment conflicts with existing booking")]
    ConflictDetected,

    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),
}

impl From<DatabaseError> for AppointmentError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Conflict(_) => AppointmentError::ConflictDetected,
            DatabaseError::NotFound(_) => AppointmentError::NotFound,
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}

impl From<AvailabilityError> for AppointmentError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
            other => AppointmentError::ValidationError(other.to_string()),
        }
    }
}
