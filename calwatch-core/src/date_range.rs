//! Date range for selecting events.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::error::{CalWatchError, CalWatchResult};

/// Days covered by a default range, counted forward from now.
pub const DEFAULT_RANGE_DAYS: i64 = 7;

/// Date range for filtering events, inclusive on both ends.
/// None values mean unbounded in that direction.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Default range: now until +DEFAULT_RANGE_DAYS.
    pub fn upcoming(now: DateTime<Utc>) -> Self {
        DateRange {
            from: Some(now),
            to: Some(now + Duration::days(DEFAULT_RANGE_DAYS)),
        }
    }

    /// Parse command-line bounds into a DateRange.
    /// - `from`: "start" for unbounded, or YYYY-MM-DD; defaults to now
    /// - `to`: YYYY-MM-DD, defaults to +DEFAULT_RANGE_DAYS from `from`
    pub fn from_args(from: Option<&str>, to: Option<&str>, now: DateTime<Utc>) -> CalWatchResult<Self> {
        let from_dt = match from {
            Some("start") => None,
            Some(s) => Some(parse_date_start(s)?),
            None => Some(now),
        };

        let to_dt = match to {
            Some(s) => Some(parse_date_end(s)?),
            None => Some(from_dt.unwrap_or(now) + Duration::days(DEFAULT_RANGE_DAYS)),
        };

        if let (Some(from), Some(to)) = (from_dt, to_dt) {
            if from > to {
                return Err(CalWatchError::ConfigValidation(format!(
                    "Range start {} is after range end {}",
                    from.date_naive(),
                    to.date_naive()
                )));
            }
        }

        Ok(DateRange {
            from: from_dt,
            to: to_dt,
        })
    }

    /// Lower bound, using the earliest representable instant if unbounded.
    pub fn start(&self) -> DateTime<Utc> {
        self.from.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Upper bound, using the latest representable instant if unbounded.
    pub fn end(&self) -> DateTime<Utc> {
        self.to.unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start() <= instant && instant <= self.end()
    }
}

/// Midnight UTC of the day containing `instant`.
pub fn start_of_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Parse YYYY-MM-DD as start of day in UTC
fn parse_date_start(s: &str) -> CalWatchResult<DateTime<Utc>> {
    Ok(parse_date(s)?.and_time(NaiveTime::MIN).and_utc())
}

/// Parse YYYY-MM-DD as end of day in UTC
fn parse_date_end(s: &str) -> CalWatchResult<DateTime<Utc>> {
    Ok(parse_date_start(s)? + Duration::days(1) - Duration::seconds(1))
}

fn parse_date(s: &str) -> CalWatchResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        CalWatchError::ConfigValidation(format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))
    })
}
