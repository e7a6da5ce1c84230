use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use shared_config::AppConfig;

/// Naive layouts accepted from clients, tried in order. RFC3339 is tried
/// between the timestamp layouts and the bare date.
const NAIVE_DATETIME_LAYOUTS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
const DATE_LAYOUT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum TimezoneError {
    #[error("Local time {0} does not exist in the entity's timezone")]
    NonexistentLocalTime(NaiveDateTime),

    #[error("Unrecognised date/time: {0}")]
    UnparseableTime(String),

    #[error("Timezone lookup failed: {0}")]
    Lookup(String),
}

/// Converts between UTC instants and a healthcare entity's wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimezoneConverter {
    zone: Tz,
    fallback: bool,
}

impl TimezoneConverter {
    /// Falls back to UTC when `iana` is empty or unknown.
    pub fn new(iana: &str) -> Self {
        let name = iana.trim();
        if name.is_empty() {
            warn!("No timezone configured, using UTC");
            return Self::fallback();
        }

        match name.parse::<Tz>() {
            Ok(zone) => Self { zone, fallback: false },
            Err(e) => {
                warn!("Unknown timezone '{}' ({}), using UTC", name, e);
                Self::fallback()
            }
        }
    }

    pub fn utc() -> Self {
        Self { zone: Tz::UTC, fallback: false }
    }

    fn fallback() -> Self {
        Self { zone: Tz::UTC, fallback: true }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn zone_name(&self) -> &'static str {
        self.zone.name()
    }

    /// True when the requested zone could not be used.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn to_entity_local(&self, instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.zone)
    }

    /// Wall-clock time to UTC. Times skipped by a DST jump are rejected;
    /// repeated times resolve to the earlier instant.
    pub fn to_utc(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, TimezoneError> {
        match self.zone.from_local_datetime(&local) {
            LocalResult::Single(resolved) => Ok(resolved.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => Err(TimezoneError::NonexistentLocalTime(local)),
        }
    }

    pub fn parse_entity_local(&self, raw: &str) -> Result<DateTime<Utc>, TimezoneError> {
        let raw = raw.trim();

        for layout in NAIVE_DATETIME_LAYOUTS {
            if let Ok(local) = NaiveDateTime::parse_from_str(raw, layout) {
                return self.to_utc(local);
            }
        }

        if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
            return Ok(instant.with_timezone(&Utc));
        }

        if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_LAYOUT) {
            return self.to_utc(date.and_time(NaiveTime::MIN));
        }

        Err(TimezoneError::UnparseableTime(raw.to_string()))
    }

    /// strftime-style formatting in the entity's zone. An invalid layout
    /// yields RFC3339.
    pub fn format_in_entity_zone(&self, instant: DateTime<Utc>, layout: &str) -> String {
        let local = self.to_entity_local(instant);
        let mut out = String::new();

        if write!(out, "{}", local.format(layout)).is_err() {
            warn!("Invalid time layout '{}'", layout);
            return local.to_rfc3339();
        }

        out
    }

    /// Calendar date of `instant` on the entity's wall clock.
    pub fn entity_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.to_entity_local(instant).date_naive()
    }
}

// ==============================================================================
// ENTITY TIMEZONE LOOKUP
// ==============================================================================

#[async_trait]
pub trait EntityTimezoneLookup: Send + Sync {
    /// IANA zone name configured for the healthcare entity.
    async fn get(&self, healthcare_entity_id: i64) -> Result<String, TimezoneError>;
}

#[derive(Debug, Deserialize)]
struct EntityTimezoneResponse {
    #[serde(default)]
    timezone: String,
}

/// Reads the entity's timezone from the user service.
pub struct HttpEntityTimezoneLookup {
    client: Client,
    base_url: String,
}

impl HttpEntityTimezoneLookup {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.user_service_url)
    }
}

#[async_trait]
impl EntityTimezoneLookup for HttpEntityTimezoneLookup {
    async fn get(&self, healthcare_entity_id: i64) -> Result<String, TimezoneError> {
        let url = format!("{}/api/internal/entity/{}", self.base_url, healthcare_entity_id);
        debug!("Fetching timezone for entity {} from {}", healthcare_entity_id, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TimezoneError::Lookup(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TimezoneError::Lookup(format!(
                "user service returned status {} for entity {}",
                status, healthcare_entity_id
            )));
        }

        let body: EntityTimezoneResponse = response
            .json()
            .await
            .map_err(|e| TimezoneError::Lookup(e.to_string()))?;

        Ok(body.timezone)
    }
}

// ==============================================================================
// CACHE
// ==============================================================================

struct CachedConverter {
    converter: TimezoneConverter,
    fetched_at: Instant,
}

/// Per-entity converters, refreshed after `ttl`. Failed lookups are not
/// cached; they yield a UTC converter and are retried on the next call.
pub struct TimezoneCache {
    lookup: Arc<dyn EntityTimezoneLookup>,
    ttl: Duration,
    entries: RwLock<HashMap<i64, CachedConverter>>,
}

impl TimezoneCache {
    pub fn new(lookup: Arc<dyn EntityTimezoneLookup>, ttl: Duration) -> Self {
        Self {
            lookup,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn converter_for(&self, healthcare_entity_id: i64) -> TimezoneConverter {
        if let Some(converter) = self.fresh_entry(healthcare_entity_id) {
            return converter;
        }

        let converter = match self.lookup.get(healthcare_entity_id).await {
            Ok(zone) => TimezoneConverter::new(&zone),
            Err(e) => {
                warn!("Using UTC for entity {}: {}", healthcare_entity_id, e);
                return TimezoneConverter::fallback();
            }
        };

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(healthcare_entity_id, CachedConverter { converter, fetched_at: Instant::now() });

        converter
    }

    fn fresh_entry(&self, healthcare_entity_id: i64) -> Option<TimezoneConverter> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&healthcare_entity_id)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.converter)
    }

    pub fn invalidate(&self, healthcare_entity_id: i64) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&healthcare_entity_id);
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
