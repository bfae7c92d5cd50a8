//! Calendar feed parsing.
//!
//! This module turns RFC 5545 text into [`Event`](crate::event::Event)s.

mod parse;
pub(crate) mod time;

pub use parse::FeedParser;
