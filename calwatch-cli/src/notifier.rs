//! Reminder delivery for the terminal and the desktop.

use std::io::Write;

use calwatch_core::Priority;
use calwatch_core::notify::{HandlerError, Notification, NotificationHandler, SoundPlayer};
use chrono::Local;
use owo_colors::OwoColorize;

/// Prints reminders to stdout.
pub struct ConsoleNotifier;

impl NotificationHandler for ConsoleNotifier {
    fn on_notification(&self, notification: &Notification) -> Result<(), HandlerError> {
        let stamp = Local::now().format("%H:%M");
        let message = match notification.priority {
            Priority::High => notification.message.red().bold().to_string(),
            Priority::Normal => notification.message.bold().to_string(),
            Priority::Low => notification.message.clone(),
        };
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{} {}", stamp.dimmed(), message)?;
        stdout.flush()?;
        Ok(())
    }
}

/// Shows reminders as desktop notifications.
pub struct DesktopNotifier;

impl NotificationHandler for DesktopNotifier {
    fn on_notification(&self, notification: &Notification) -> Result<(), HandlerError> {
        let event = &notification.event;
        let mut body = event
            .start_time
            .with_timezone(&Local)
            .format("%a %b %-d, %H:%M")
            .to_string();
        if let Some(location) = &event.location {
            body.push_str(&format!("\n{}", location));
        }

        notify_rust::Notification::new()
            .appname("calwatch")
            .summary(&notification.message)
            .body(&body)
            .show()
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Rings the terminal bell; twice for high-priority reminders.
pub struct TerminalBell;

impl SoundPlayer for TerminalBell {
    fn play(&self, priority: Priority) -> Result<(), HandlerError> {
        let rings = if priority == Priority::High { 2 } else { 1 };
        let mut stderr = std::io::stderr().lock();
        for _ in 0..rings {
            stderr.write_all(b"\x07")?;
        }
        stderr.flush()?;
        Ok(())
    }
}
