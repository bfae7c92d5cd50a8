//! Event reminders: settings, message text and the scheduler that fires them.

mod clock;
mod handler;
mod message;
mod scheduler;
mod settings;

pub use clock::{Clock, ManualClock, SystemClock};
pub use handler::{HandlerError, Notification, NotificationHandler, SoundPlayer};
pub use message::format_message;
pub use scheduler::{NotificationScheduler, Trigger};
pub use settings::{DEFAULT_LEAD_MINUTES, NotificationSettings};
