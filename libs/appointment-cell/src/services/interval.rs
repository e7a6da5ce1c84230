use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-open `[start, end)` span of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn from_duration(start: DateTime<Utc>, minutes: i32) -> Self {
        Self {
            start,
            end: start + Duration::minutes(minutes as i64),
        }
    }

    /// Touching ranges do not overlap: one ending at 10:30 and another
    /// starting at 10:30 are compatible.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_range(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, h, m, 0).unwrap()
    }

    #[test]
    fn partial_overlap_conflicts() {
        let existing = TimeRange::from_duration(at(10, 0), 30);
        let proposed = TimeRange::from_duration(at(10, 15), 30);
        assert!(existing.overlaps(&proposed));
        assert!(proposed.overlaps(&existing));
    }

    #[test]
    fn boundary_touch_is_not_overlap() {
        let existing = TimeRange::from_duration(at(10, 0), 30);
        let after = TimeRange::from_duration(at(10, 30), 30);
        let before = TimeRange::from_duration(at(9, 30), 30);
        assert!(!existing.overlaps(&after));
        assert!(!existing.overlaps(&before));
    }

    #[test]
    fn enclosing_range_overlaps() {
        let inner = TimeRange::from_duration(at(10, 15), 15);
        let outer = TimeRange::from_duration(at(10, 0), 60);
        assert!(outer.overlaps(&inner));
        assert!(outer.contains_range(&inner));
        assert!(!inner.contains_range(&outer));
    }

    #[test]
    fn duration_in_minutes() {
        assert_eq!(TimeRange::new(at(9, 0), at(17, 0)).duration_minutes(), 480);
        assert!(TimeRange::new(at(9, 0), at(9, 0)).is_empty());
    }
}
