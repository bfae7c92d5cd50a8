//! Collaborators invoked when a reminder fires.

use chrono::{DateTime, Duration, Utc};

use crate::event::{Event, Priority};

/// Error type returned by handlers and sound players.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A fired reminder.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub message: String,
    pub event: Event,
    pub priority: Priority,
    pub lead_time: Duration,
    pub fire_at: DateTime<Utc>,
}

/// Receives fired reminders.
///
/// Handlers run in registration order. A handler that errors or panics is logged and
/// skipped; the remaining handlers still run.
pub trait NotificationHandler: Send + Sync {
    fn on_notification(&self, notification: &Notification) -> Result<(), HandlerError>;
}

impl<F> NotificationHandler for F
where
    F: Fn(&Notification) -> Result<(), HandlerError> + Send + Sync,
{
    fn on_notification(&self, notification: &Notification) -> Result<(), HandlerError> {
        self(notification)
    }
}

/// Platform audio playback, requested for reminders of normal priority or higher.
pub trait SoundPlayer: Send + Sync {
    fn play(&self, priority: Priority) -> Result<(), HandlerError>;
}
