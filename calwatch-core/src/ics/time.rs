//! Date/time values as they appear in a feed, before normalization to UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::parser::Property;
use icalendar::{CalendarDateTime, DatePerhapsTime};
use tracing::warn;

/// A DTSTART/DTEND/EXDATE/RECURRENCE-ID value, keeping the timezone form it was written in.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FeedTime {
    /// Calendar date only (all-day).
    Date(NaiveDate),
    Utc(DateTime<Utc>),
    /// Local time without a timezone; interpreted as UTC.
    Floating(NaiveDateTime),
    Zoned { datetime: NaiveDateTime, tzid: String },
}

impl FeedTime {
    pub(crate) fn from_property(prop: &Property) -> Result<Self, String> {
        DatePerhapsTime::try_from(prop)
            .map(FeedTime::from)
            .map_err(|_| {
                format!(
                    "unreadable {} value '{}'",
                    prop.name.as_ref(),
                    prop.val.as_ref()
                )
            })
    }

    /// Every value of a multi-valued property such as EXDATE (`a,b,c`).
    ///
    /// The TZID and `VALUE=DATE` parameters apply to each value. Unreadable values are
    /// dropped.
    pub(crate) fn list_from_property(prop: &Property) -> Vec<Self> {
        let tzid = param(prop, "TZID");
        let date_only = param(prop, "VALUE") == Some("DATE");
        prop.val
            .as_ref()
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .filter_map(|value| Self::parse_value(value, tzid, date_only))
            .collect()
    }

    /// One basic-format value: `20240108`, `20240108T100000` or `20240108T100000Z`.
    fn parse_value(value: &str, tzid: Option<&str>, date_only: bool) -> Option<Self> {
        if date_only || !value.contains('T') {
            return NaiveDate::parse_from_str(value, "%Y%m%d")
                .ok()
                .map(FeedTime::Date);
        }

        let (local, is_utc) = match value.strip_suffix('Z') {
            Some(local) => (local, true),
            None => (value, false),
        };
        let datetime = NaiveDateTime::parse_from_str(local, "%Y%m%dT%H%M%S").ok()?;
        Some(match (is_utc, tzid) {
            (true, _) => FeedTime::Utc(datetime.and_utc()),
            (false, Some(tzid)) => FeedTime::Zoned {
                datetime,
                tzid: tzid.to_string(),
            },
            (false, None) => FeedTime::Floating(datetime),
        })
    }

    pub(crate) fn is_date(&self) -> bool {
        matches!(self, FeedTime::Date(_))
    }

    /// Resolve to an absolute instant.
    ///
    /// Dates become midnight UTC. Unknown TZIDs fall back to UTC.
    pub(crate) fn to_utc(&self) -> DateTime<Utc> {
        match self {
            FeedTime::Date(d) => d.and_time(NaiveTime::MIN).and_utc(),
            FeedTime::Utc(dt) => *dt,
            FeedTime::Floating(naive) => naive.and_utc(),
            FeedTime::Zoned { datetime, tzid } => match resolve_tz(tzid) {
                Some(tz) => local_to_utc(&tz, *datetime),
                None => {
                    warn!(tzid = %tzid, "Unknown timezone, treating time as UTC");
                    datetime.and_utc()
                }
            },
        }
    }
}

impl From<DatePerhapsTime> for FeedTime {
    fn from(dpt: DatePerhapsTime) -> Self {
        match dpt {
            DatePerhapsTime::Date(d) => FeedTime::Date(d),
            DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
                CalendarDateTime::Utc(dt) => FeedTime::Utc(dt),
                CalendarDateTime::Floating(naive) => FeedTime::Floating(naive),
                CalendarDateTime::WithTimezone { date_time, tzid } => FeedTime::Zoned {
                    datetime: date_time,
                    tzid,
                },
            },
        }
    }
}

fn param<'p>(prop: &'p Property<'_>, key: &str) -> Option<&'p str> {
    prop.params
        .iter()
        .find(|p| p.key == key)
        .and_then(|p| p.val.as_ref())
        .map(|v| v.as_ref())
}

/// Look up an IANA timezone name.
pub(crate) fn resolve_tz(tzid: &str) -> Option<Tz> {
    tzid.trim_matches('"').parse::<Tz>().ok()
}

/// Convert a wall-clock time in `tz` to UTC.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times inside a DST gap
/// are moved forward by an hour.
fn local_to_utc(tz: &Tz, local: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| local.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoned_time_converts_with_dst() {
        // New York is on EDT (UTC-4) from 2024-03-10.
        let zoned = FeedTime::Zoned {
            datetime: NaiveDate::from_ymd_opt(2024, 3, 15)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            tzid: "America/New_York".to_string(),
        };
        assert_eq!(
            zoned.to_utc(),
            Utc.with_ymd_and_hms(2024, 3, 15, 14, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_utc() {
        let naive = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let zoned = FeedTime::Zoned {
            datetime: naive,
            tzid: "Mars/Olympus_Mons".to_string(),
        };
        assert_eq!(zoned.to_utc(), naive.and_utc());
    }

    #[test]
    fn test_date_is_midnight_utc() {
        let date = FeedTime::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert!(date.is_date());
        assert_eq!(
            date.to_utc(),
            Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_value_forms() {
        let at_ten = NaiveDate::from_ymd_opt(2024, 1, 8)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();

        assert_eq!(
            FeedTime::parse_value("20240108", None, false),
            Some(FeedTime::Date(at_ten.date()))
        );
        assert_eq!(
            FeedTime::parse_value("20240108T100000Z", Some("Europe/Paris"), false),
            Some(FeedTime::Utc(at_ten.and_utc()))
        );
        assert_eq!(
            FeedTime::parse_value("20240108T100000", Some("Europe/Paris"), false),
            Some(FeedTime::Zoned {
                datetime: at_ten,
                tzid: "Europe/Paris".to_string()
            })
        );
        assert_eq!(
            FeedTime::parse_value("20240108T100000", None, false),
            Some(FeedTime::Floating(at_ten))
        );
        assert_eq!(FeedTime::parse_value("20240108T100000", None, true), None);
        assert_eq!(FeedTime::parse_value("tomorrow", None, false), None);
    }

    #[test]
    fn test_dst_gap_moves_forward() {
        // 02:30 does not exist in New York on 2024-03-10.
        let gap = FeedTime::Zoned {
            datetime: NaiveDate::from_ymd_opt(2024, 3, 10)
                .unwrap()
                .and_hms_opt(2, 30, 0)
                .unwrap(),
            tzid: "America/New_York".to_string(),
        };
        assert_eq!(
            gap.to_utc(),
            Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap()
        );
    }
}
