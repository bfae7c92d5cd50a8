//! RRULE expansion for recurring feed events.
//!
//! Expands a master event's start into the occurrence starts that fall inside an
//! expansion window, honoring EXDATEs. Rule evaluation is delegated to the `rrule` crate.

use chrono::{DateTime, Duration, Utc};
use rrule::RRuleSet;
use tracing::debug;

use crate::ics::time::{FeedTime, resolve_tz};

/// Upper bound on occurrences generated per recurring event.
pub const DEFAULT_MAX_OCCURRENCES: u16 = 730;

/// Recurrence data of a master event.
#[derive(Debug, Clone)]
pub(crate) struct Recurrence {
    pub rrule: String,
    pub exdates: Vec<FeedTime>,
}

/// Range of occurrences to materialize. `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpansionWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub max_occurrences: u16,
}

impl Default for ExpansionWindow {
    fn default() -> Self {
        ExpansionWindow {
            from: None,
            to: None,
            max_occurrences: DEFAULT_MAX_OCCURRENCES,
        }
    }
}

impl ExpansionWindow {
    /// Window from `past_days` before `now` to `future_days` after it.
    ///
    /// A bound that falls outside the representable time range is left open.
    pub fn around(now: DateTime<Utc>, past_days: i64, future_days: i64) -> Self {
        ExpansionWindow {
            from: Duration::try_days(past_days).and_then(|d| now.checked_sub_signed(d)),
            to: Duration::try_days(future_days).and_then(|d| now.checked_add_signed(d)),
            max_occurrences: DEFAULT_MAX_OCCURRENCES,
        }
    }
}

/// Format a time as an rrule `DTSTART`/`EXDATE` line.
///
/// The rrule crate needs a datetime, so all-day dates become midnight UTC. Zoned times
/// with a TZID chrono-tz does not know are written as their UTC fallback.
fn rrule_line(prop: &str, time: &FeedTime) -> String {
    match time {
        FeedTime::Date(d) => format!("{}:{}T000000Z", prop, d.format("%Y%m%d")),
        FeedTime::Utc(dt) => format!("{}:{}", prop, dt.format("%Y%m%dT%H%M%SZ")),
        FeedTime::Floating(dt) => format!("{}:{}Z", prop, dt.format("%Y%m%dT%H%M%S")),
        FeedTime::Zoned { datetime, tzid } => match resolve_tz(tzid) {
            Some(tz) => format!(
                "{};TZID={}:{}",
                prop,
                tz.name(),
                datetime.format("%Y%m%dT%H%M%S")
            ),
            None => format!("{}:{}", prop, time.to_utc().format("%Y%m%dT%H%M%SZ")),
        },
    }
}

/// Build an iCalendar-format rule set string for the rrule crate parser.
fn build_rrule_string(start: &FeedTime, recurrence: &Recurrence) -> String {
    let mut lines = vec![
        rrule_line("DTSTART", start),
        format!("RRULE:{}", recurrence.rrule),
    ];
    lines.extend(
        recurrence
            .exdates
            .iter()
            .map(|exdate| rrule_line("EXDATE", exdate)),
    );
    lines.join("\n")
}

/// Expand a recurring start into occurrence starts inside `window`, in ascending order.
pub(crate) fn expand_occurrences(
    start: &FeedTime,
    recurrence: &Recurrence,
    window: &ExpansionWindow,
) -> Result<Vec<DateTime<Utc>>, String> {
    let rrule_str = build_rrule_string(start, recurrence);

    let mut rrule_set: RRuleSet = rrule_str
        .parse()
        .map_err(|e| format!("invalid RRULE '{}': {}", recurrence.rrule, e))?;

    // `after`/`before` are exclusive; widen by a second to keep the window inclusive.
    let tz: rrule::Tz = Utc.into();
    if let Some(from) = window.from {
        rrule_set = rrule_set.after((from - Duration::seconds(1)).with_timezone(&tz));
    }
    if let Some(to) = window.to {
        rrule_set = rrule_set.before((to + Duration::seconds(1)).with_timezone(&tz));
    }

    let result = rrule_set.all(window.max_occurrences);
    if result.limited {
        debug!(
            rrule = %recurrence.rrule,
            limit = window.max_occurrences,
            "Recurrence expansion truncated"
        );
    }

    Ok(result
        .dates
        .iter()
        .map(|occurrence| occurrence.with_timezone(&Utc))
        .collect())
}
