//! Merging events from several feeds into one deduplicated timeline.

use std::collections::HashSet;

use crate::event::Event;

/// Merge event lists into one list sorted by start time, unique by id.
///
/// When ids collide the first event seen wins, in input-list order and then in
/// position within a list. Later duplicates are dropped without merging fields.
pub fn aggregate<I, S>(sources: I) -> Vec<Event>
where
    I: IntoIterator<Item = S>,
    S: IntoIterator<Item = Event>,
{
    let mut seen = HashSet::new();
    let mut merged: Vec<Event> = sources
        .into_iter()
        .flatten()
        .filter(|event| seen.insert(event.id.clone()))
        .collect();

    // Stable, so equal starts keep first-seen order.
    merged.sort_by_key(|event| event.start_time);
    merged
}
