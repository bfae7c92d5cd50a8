//! Terminal rendering of events.

use calwatch_core::Event;
use calwatch_core::config::{AppConfig, HexColor, TimeFormat};
use chrono::{Local, NaiveDate};
use owo_colors::OwoColorize;

/// Print events grouped under a heading per local calendar day.
pub fn print_grouped(events: &[&Event], config: &AppConfig) {
    if events.is_empty() {
        println!("{}", "No events found".dimmed());
        return;
    }

    let today = Local::now().date_naive();
    let mut current_date: Option<NaiveDate> = None;

    for event in events {
        let date = event.start_date(&Local);
        if current_date != Some(date) {
            if current_date.is_some() {
                println!();
            }
            println!("{}", format_date_label(date, today).bold());
            current_date = Some(date);
        }

        let color = config.sources.get(&event.source).and_then(|s| s.color);
        let label = config
            .sources
            .get(&event.source)
            .map(|s| s.display_name(&event.source))
            .unwrap_or(&event.source);
        println!(
            "  {}",
            event_line(event, label, color, config.display.time_format)
        );
    }
}

/// One event: time column, title, then location and source tag dimmed.
pub fn event_line(event: &Event, label: &str, color: Option<HexColor>, format: TimeFormat) -> String {
    let time = format!("{:>8}", format_time(event, format));
    let mut line = format!("{} {}", colorize(&time, color), event.title);
    if let Some(location) = &event.location {
        line.push_str(&format!(" {}", format!("@ {}", location).dimmed()));
    }
    line.push_str(&format!(" {}", format!("[{}]", label).dimmed()));
    line
}

/// A source swatch for listings.
pub fn swatch(color: Option<HexColor>) -> String {
    colorize("●", color)
}

fn colorize(text: &str, color: Option<HexColor>) -> String {
    match color {
        Some(c) => text.truecolor(c.r, c.g, c.b).to_string(),
        None => text.to_string(),
    }
}

/// Format a date as a human-readable label (e.g. "Today", "Tomorrow", "Wed Feb 25")
pub fn format_date_label(date: NaiveDate, today: NaiveDate) -> String {
    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        -1 => "Yesterday".to_string(),
        _ => date.format("%a %b %-d").to_string(),
    }
}

/// Local start time of an event, or "all-day".
pub fn format_time(event: &Event, format: TimeFormat) -> String {
    if event.is_all_day {
        return "all-day".to_string();
    }
    event
        .start_time
        .with_timezone(&Local)
        .format(format.pattern())
        .to_string()
}
