//! Reminder message text.

use chrono::Duration;

use crate::event::Event;

/// Format the reminder text for `event` fired `lead_time` before its start.
///
/// Lead times of a minute or less read "Starting now"; longer ones read
/// "In N minutes" with N the whole minutes remaining. The location is appended
/// when the event has one.
pub fn format_message(event: &Event, lead_time: Duration) -> String {
    let prefix = if lead_time <= Duration::minutes(1) {
        "Starting now".to_string()
    } else {
        match lead_time.num_minutes() {
            1 => "In 1 minute".to_string(),
            minutes => format!("In {} minutes", minutes),
        }
    };

    match &event.location {
        Some(location) => format!("{}: {} at {}", prefix, event.title, location),
        None => format!("{}: {}", prefix, event.title),
    }
}
