//! Core of calwatch: calendar feeds, the filtered event view and reminders.
//!
//! - `ics` / `feed`: read `.ics` feeds (remote or local) into [`Event`]s
//! - `aggregate`: merge feeds, dropping duplicates by event id
//! - `view`: the current event set with source, all-day and completed filters
//! - `notify`: lead-time reminders fired by a background timer
//! - `config`: the TOML configuration file

pub mod aggregate;
pub mod config;
pub mod countdown;
pub mod date_range;
pub mod error;
pub mod event;
pub mod feed;
pub mod ics;
pub mod notify;
pub mod recurrence;
pub mod view;

pub use aggregate::aggregate;
pub use error::{CalWatchError, CalWatchResult};
pub use event::{Event, Priority, event_id};
pub use feed::{FeedFetcher, FeedLocation, FeedSource};
pub use ics::FeedParser;
pub use view::{EventView, FilterState, ViewChange};
