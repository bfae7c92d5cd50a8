//! Feed parsing using the icalendar crate's parser.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use icalendar::parser::{Component, Property, read_calendar, unfold};
use tracing::{debug, warn};

use crate::error::{CalWatchError, CalWatchResult};
use crate::event::Event;
use crate::ics::time::FeedTime;
use crate::recurrence::{ExpansionWindow, Recurrence, expand_occurrences};

const NO_TITLE: &str = "(No title)";

/// Turns raw calendar text into events tagged with a source.
#[derive(Debug, Clone, Default)]
pub struct FeedParser {
    window: ExpansionWindow,
}

impl FeedParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser whose recurring events are only expanded inside `window`.
    pub fn with_window(window: ExpansionWindow) -> Self {
        FeedParser { window }
    }

    pub fn window(&self) -> &ExpansionWindow {
        &self.window
    }

    /// Parse a calendar document into events sorted by start time.
    ///
    /// A structurally valid calendar without event blocks yields an empty list.
    /// Unreadable event blocks are skipped; the whole parse only fails when the text
    /// is not a calendar document, or when none of its event blocks can be read.
    pub fn parse(&self, raw: &str, source_name: &str) -> CalWatchResult<Vec<Event>> {
        let unfolded = unfold(raw.trim());
        validate_structure(&unfolded).map_err(|reason| CalWatchError::parse(source_name, reason))?;

        let calendar = read_calendar(&unfolded)
            .map_err(|e| CalWatchError::parse(source_name, e.to_string()))?;

        let vevents = collect_vevents(&calendar.components);
        if vevents.is_empty() {
            debug!(source = source_name, "Calendar has no event blocks");
            return Ok(Vec::new());
        }

        let overrides = overridden_instances(&vevents);

        let mut events = Vec::new();
        let mut readable = 0usize;
        for (index, vevent) in vevents.iter().enumerate() {
            match self.read_vevent(vevent, source_name, &overrides) {
                Ok(mut occurrences) => {
                    readable += 1;
                    events.append(&mut occurrences);
                }
                Err(reason) => {
                    warn!(source = source_name, block = index, %reason, "Skipping unreadable event block");
                }
            }
        }

        if readable == 0 {
            return Err(CalWatchError::parse(
                source_name,
                format!("none of {} event blocks could be read", vevents.len()),
            ));
        }

        events.sort_by_key(|e| e.start_time);
        debug!(source = source_name, events = events.len(), "Parsed feed");
        Ok(events)
    }

    /// Read one VEVENT into one event, or into its occurrences when it recurs.
    fn read_vevent(
        &self,
        vevent: &Component,
        source_name: &str,
        overrides: &HashMap<String, HashSet<DateTime<Utc>>>,
    ) -> Result<Vec<Event>, String> {
        let start = FeedTime::from_property(
            vevent
                .find_prop("DTSTART")
                .ok_or_else(|| "missing DTSTART".to_string())?,
        )?;
        let end = vevent
            .find_prop("DTEND")
            .map(FeedTime::from_property)
            .transpose()?;

        let title = text_prop(vevent, "SUMMARY").unwrap_or_else(|| NO_TITLE.to_string());
        let description = text_prop(vevent, "DESCRIPTION");
        let location = text_prop(vevent, "LOCATION");

        let start_utc = start.to_utc();
        let end_utc = match (&end, vevent.find_prop("DURATION").and_then(parse_duration)) {
            (Some(end), _) => end.to_utc(),
            (None, Some(duration)) => start_utc + duration,
            (None, None) if start.is_date() => start_utc + Duration::days(1),
            (None, None) => start_utc,
        };
        let duration = (end_utc - start_utc).max(Duration::zero());

        let build = |occurrence_start: DateTime<Utc>| {
            let mut event = Event::new(
                source_name,
                &title,
                occurrence_start,
                occurrence_start + duration,
            );
            event.description = description.clone();
            event.location = location.clone();
            event.is_all_day = start.is_date();
            event
        };

        // Instance overrides stand on their own; their master skips that occurrence.
        let rrule = vevent.find_prop("RRULE").map(|p| p.val.to_string());
        let (Some(rrule), None) = (rrule, vevent.find_prop("RECURRENCE-ID")) else {
            return Ok(vec![build(start_utc)]);
        };

        let recurrence = Recurrence {
            rrule,
            exdates: vevent
                .properties
                .iter()
                .filter(|p| p.name == "EXDATE")
                .flat_map(FeedTime::list_from_property)
                .collect(),
        };

        let occurrences = match expand_occurrences(&start, &recurrence, &self.window) {
            Ok(occurrences) => occurrences,
            Err(reason) => {
                warn!(source = source_name, title = %title, %reason, "Could not expand recurrence, keeping first occurrence");
                return Ok(vec![build(start_utc)]);
            }
        };

        let skipped = vevent
            .find_prop("UID")
            .and_then(|uid| overrides.get(uid.val.as_ref()));

        Ok(occurrences
            .into_iter()
            .filter(|occurrence| skipped.is_none_or(|set| !set.contains(occurrence)))
            .map(build)
            .collect())
    }
}

/// Check that `unfolded` is a calendar document: content lines only, starting with
/// `BEGIN:VCALENDAR`, with matching BEGIN/END blocks.
fn validate_structure(unfolded: &str) -> Result<(), String> {
    let mut open_blocks: Vec<String> = Vec::new();
    let mut saw_calendar = false;

    for (index, line) in unfolded.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;

        let Some((head, value)) = line.split_once(':') else {
            return Err(format!("line {}: '{}' is not a content line", line_no, line));
        };
        let name = head.split(';').next().unwrap_or(head).trim().to_ascii_uppercase();
        if name.is_empty() {
            return Err(format!("line {}: property name is missing", line_no));
        }

        match name.as_str() {
            "BEGIN" => {
                let block = value.trim().to_ascii_uppercase();
                if open_blocks.is_empty() {
                    if block != "VCALENDAR" {
                        return Err(format!(
                            "line {}: expected BEGIN:VCALENDAR, found BEGIN:{}",
                            line_no, block
                        ));
                    }
                    saw_calendar = true;
                }
                open_blocks.push(block);
            }
            "END" => {
                let block = value.trim().to_ascii_uppercase();
                match open_blocks.pop() {
                    Some(open) if open == block => {}
                    Some(open) => {
                        return Err(format!(
                            "line {}: END:{} does not close BEGIN:{}",
                            line_no, block, open
                        ));
                    }
                    None => return Err(format!("line {}: END:{} without BEGIN", line_no, block)),
                }
            }
            _ if open_blocks.is_empty() => {
                return Err(format!("line {}: content outside of a calendar", line_no));
            }
            _ => {}
        }
    }

    if !saw_calendar {
        return Err("not a calendar document".to_string());
    }
    if let Some(open) = open_blocks.last() {
        return Err(format!("BEGIN:{} is never closed", open));
    }
    Ok(())
}

/// VEVENT blocks at the top level or directly inside VCALENDAR blocks.
fn collect_vevents<'a, 'c>(components: &'a [Component<'c>]) -> Vec<&'a Component<'c>> {
    components
        .iter()
        .flat_map(|c| {
            if c.name == "VCALENDAR" {
                c.components.iter().filter(|inner| inner.name == "VEVENT").collect()
            } else if c.name == "VEVENT" {
                vec![c]
            } else {
                Vec::new()
            }
        })
        .collect()
}

/// Map of UID to the instants that have their own override VEVENT (RECURRENCE-ID).
fn overridden_instances(vevents: &[&Component]) -> HashMap<String, HashSet<DateTime<Utc>>> {
    let mut overrides: HashMap<String, HashSet<DateTime<Utc>>> = HashMap::new();
    for vevent in vevents {
        let (Some(uid), Some(recurrence_id)) =
            (vevent.find_prop("UID"), vevent.find_prop("RECURRENCE-ID"))
        else {
            continue;
        };
        if let Ok(instant) = FeedTime::from_property(recurrence_id) {
            overrides
                .entry(uid.val.to_string())
                .or_default()
                .insert(instant.to_utc());
        }
    }
    overrides
}

/// Non-empty, unescaped text value of a property.
fn text_prop(vevent: &Component, name: &str) -> Option<String> {
    vevent
        .find_prop(name)
        .map(|p| unescape_text(p.val.as_ref()))
        .filter(|text| !text.trim().is_empty())
}

/// Undo RFC 5545 TEXT escaping (`\n`, `\,`, `\;`, `\\`).
fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Parse a positive DURATION value (`PT1H30M`, `P1D`).
fn parse_duration(prop: &Property) -> Option<Duration> {
    let value = prop.val.as_ref().trim();
    let value = value.strip_prefix('+').unwrap_or(value);
    if value.starts_with('-') {
        return None;
    }
    let duration = iso8601::duration(value).ok()?;
    let std_duration: std::time::Duration = duration.into();
    Duration::from_std(std_duration).ok()
}
