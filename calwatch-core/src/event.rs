//! Calendar event value type.
//!
//! Every component works on `Event`: the feed parser creates them, the aggregator
//! deduplicates them, the view filters them and the scheduler reminds about them.
//! Events are never mutated after creation; a changed feed record yields a new event.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of digest bytes kept in an event id (32 hex characters).
const ID_BYTES: usize = 16;

/// One calendar occurrence, with all times normalized to UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Content-derived identity, see [`event_id`].
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Identifier of the feed this event came from.
    pub source: String,
    /// Start carried only a calendar date in the feed (no time of day).
    pub is_all_day: bool,
}

impl Event {
    /// Create an event and derive its id.
    ///
    /// An end before the start is clamped to the start, so malformed upstream ranges
    /// become zero-duration events instead of errors.
    pub fn new(
        source: &str,
        title: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        let end_time = end_time.max(start_time);
        Event {
            id: event_id(source, start_time, end_time, title),
            title: title.to_string(),
            start_time,
            end_time,
            description: None,
            location: None,
            source: source.to_string(),
            is_all_day: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn all_day(mut self) -> Self {
        self.is_all_day = true;
        self
    }

    pub fn duration(&self) -> Duration {
        (self.end_time - self.start_time).max(Duration::zero())
    }

    /// An event is completed once its end lies strictly before `now`.
    pub fn is_completed(&self, now: DateTime<Utc>) -> bool {
        self.end_time < now
    }

    /// Calendar day the event starts on, as seen in `tz`.
    ///
    /// All-day events keep the feed's date in every timezone.
    pub fn start_date<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        if self.is_all_day {
            self.start_time.date_naive()
        } else {
            self.start_time.with_timezone(tz).date_naive()
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

/// Deterministic identity of an event.
///
/// Hashes `(source, start, end, title)`, so re-fetching an unchanged feed yields the
/// same ids. Editing the description keeps the id; editing the title or times does not.
pub fn event_id(
    source: &str,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    title: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0x1f]);
    hasher.update(start_time.timestamp().to_be_bytes());
    hasher.update(end_time.timestamp().to_be_bytes());
    hasher.update([0x1f]);
    hasher.update(title.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..ID_BYTES])
}

/// Urgency of a reminder, ordered `Low < Normal < High`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        };
        write!(f, "{}", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_identity_is_deterministic() {
        let a = Event::new("work", "Standup", at(9), at(10));
        let b = Event::new("work", "Standup", at(9), at(10)).with_description("changed");
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), ID_BYTES * 2);
    }

    #[test]
    fn test_identity_changes_with_identifying_fields() {
        let base = Event::new("work", "Standup", at(9), at(10));
        assert_ne!(base.id, Event::new("home", "Standup", at(9), at(10)).id);
        assert_ne!(base.id, Event::new("work", "Stand-up", at(9), at(10)).id);
        assert_ne!(base.id, Event::new("work", "Standup", at(8), at(10)).id);
        assert_ne!(base.id, Event::new("work", "Standup", at(9), at(11)).id);
    }

    #[test]
    fn test_inverted_range_becomes_zero_duration() {
        let event = Event::new("work", "Broken", at(10), at(9));
        assert_eq!(event.end_time, event.start_time);
        assert_eq!(event.duration(), Duration::zero());
    }

    #[test]
    fn test_completed_is_strictly_after_end() {
        let event = Event::new("work", "Review", at(9), at(10));
        assert!(!event.is_completed(at(10)));
        assert!(event.is_completed(at(10) + Duration::seconds(1)));
    }

    #[test]
    fn test_all_day_start_date_ignores_timezone() {
        let midnight = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let holiday = Event::new("home", "Holiday", midnight, midnight + Duration::days(1)).all_day();
        let call = Event::new("work", "Call", midnight, midnight + Duration::hours(1));
        let ny = chrono_tz::America::New_York;

        assert_eq!(holiday.start_date(&ny), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(call.start_date(&ny), NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert_eq!(Priority::High as i32, 2);
    }
}
