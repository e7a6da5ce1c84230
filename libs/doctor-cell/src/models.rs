use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_database::DatabaseError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    Available,
    Unavailable,
    Vacation,
    Training,
    SickLeave,
    Meeting,
}

impl AvailabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityStatus::Available => "available",
            AvailabilityStatus::Unavailable => "unavailable",
            AvailabilityStatus::Vacation => "vacation",
            AvailabilityStatus::Training => "training",
            AvailabilityStatus::SickLeave => "sick_leave",
            AvailabilityStatus::Meeting => "meeting",
        }
    }
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AvailabilityStatus {
    type Err = AvailabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(AvailabilityStatus::Available),
            "unavailable" => Ok(AvailabilityStatus::Unavailable),
            "vacation" => Ok(AvailabilityStatus::Vacation),
            "training" => Ok(AvailabilityStatus::Training),
            "sick_leave" => Ok(AvailabilityStatus::SickLeave),
            "meeting" => Ok(AvailabilityStatus::Meeting),
            other => Err(AvailabilityError::InvalidStatus(other.to_string())),
        }
    }
}

/// A doctor's declared working day. At most one record exists per
/// (entity, doctor, UTC date of `start_datetime`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorAvailability {
    pub id: i64,
    pub healthcare_entity_id: i64,
    pub doctor_id: i64,
    pub status: AvailabilityStatus,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub break_start_datetime: Option<DateTime<Utc>>,
    pub break_end_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl DoctorAvailability {
    pub fn is_available(&self) -> bool {
        self.status == AvailabilityStatus::Available
    }

    pub fn date(&self) -> NaiveDate {
        self.start_datetime.date_naive()
    }

    /// Break window, only when both ends are recorded.
    pub fn break_window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.break_start_datetime, self.break_end_datetime) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), AvailabilityError> {
        if self.start_datetime >= self.end_datetime {
            return Err(AvailabilityError::InvalidWindow(
                "start must be before end".to_string(),
            ));
        }

        match (self.break_start_datetime, self.break_end_datetime) {
            (None, None) => Ok(()),
            (Some(start), Some(end)) => {
                if start >= end {
                    return Err(AvailabilityError::InvalidWindow(
                        "break start must be before break end".to_string(),
                    ));
                }
                if start < self.start_datetime || end > self.end_datetime {
                    return Err(AvailabilityError::InvalidWindow(
                        "break must lie within the working window".to_string(),
                    ));
                }
                Ok(())
            }
            _ => Err(AvailabilityError::InvalidWindow(
                "break start and end must be given together".to_string(),
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum AvailabilityError {
    #[error("Invalid availability status: {0}")]
    InvalidStatus(String),

    #[error("Invalid availability window: {0}")]
    InvalidWindow(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<DatabaseError> for AvailabilityError {
    fn from(err: DatabaseError) -> Self {
        AvailabilityError::DatabaseError(err.to_string())
    }
}
