//! Filtered view over the aggregated events.
//!
//! Holds the current event set plus the visibility rules (per-source, all-day,
//! completed) and tells registered listeners whenever either changes.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::{debug, error};

use crate::countdown::{format_countdown, time_until};
use crate::event::Event;

/// What a view mutation changed, passed to every listener.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewChange {
    Events { count: usize },
    SourceFilter { source: String, visible: bool },
    ShowAllDay(bool),
    ShowCompleted(bool),
}

/// Visibility rules applied by [`EventView`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    /// Explicit per-source visibility. Sources without an entry are visible.
    pub source_visibility: HashMap<String, bool>,
    pub show_all_day: bool,
    pub show_completed: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        FilterState {
            source_visibility: HashMap::new(),
            show_all_day: true,
            show_completed: false,
        }
    }
}

impl FilterState {
    pub fn is_source_visible(&self, source: &str) -> bool {
        self.source_visibility.get(source).copied().unwrap_or(true)
    }

    /// Apply the rules in order: source, all-day, completed (`end_time < now`).
    pub fn admits(&self, event: &Event, now: DateTime<Utc>) -> bool {
        if !self.is_source_visible(&event.source) {
            return false;
        }
        if event.is_all_day && !self.show_all_day {
            return false;
        }
        if !self.show_completed && event.is_completed(now) {
            return false;
        }
        true
    }
}

type Listener = Box<dyn Fn(&ViewChange) + Send + Sync>;

/// The current event set and its filter state.
pub struct EventView {
    events: Vec<Event>,
    filter: FilterState,
    listeners: Vec<Listener>,
}

impl Default for EventView {
    fn default() -> Self {
        Self::new()
    }
}

impl EventView {
    pub fn new() -> Self {
        Self::with_filter(FilterState::default())
    }

    pub fn with_filter(filter: FilterState) -> Self {
        EventView {
            events: Vec::new(),
            filter,
            listeners: Vec::new(),
        }
    }

    /// Register a listener. Listeners run synchronously, in registration order.
    pub fn add_listener<F>(&mut self, listener: F)
    where
        F: Fn(&ViewChange) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    /// Replace the event set (re-sorted by start) and notify listeners.
    pub fn set_events(&mut self, mut events: Vec<Event>) {
        events.sort_by_key(|event| event.start_time);
        let count = events.len();
        self.events = events;
        self.notify(ViewChange::Events { count });
    }

    /// Events passing the current filter at `now`, in start order.
    pub fn filtered(&self, now: DateTime<Utc>) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|event| self.filter.admits(event, now))
            .collect()
    }

    /// First visible event starting strictly after `now`.
    pub fn next_upcoming(&self, now: DateTime<Utc>) -> Option<&Event> {
        self.events
            .iter()
            .filter(|event| self.filter.admits(event, now))
            .find(|event| event.start_time > now)
    }

    /// Visible events with `start <= start_time <= end`.
    pub fn events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<&Event> {
        self.filtered(now)
            .into_iter()
            .filter(|event| start <= event.start_time && event.start_time <= end)
            .collect()
    }

    /// Visible events starting on `date` as seen in timezone `tz`.
    ///
    /// All-day events match their feed date regardless of `tz`.
    pub fn events_on_date<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        tz: &Tz,
        now: DateTime<Utc>,
    ) -> Vec<&Event> {
        self.filtered(now)
            .into_iter()
            .filter(|event| event.start_date(tz) == date)
            .collect()
    }

    /// `"Next: <title> in <countdown>"`, or `"No upcoming events"`.
    pub fn countdown_text(&self, now: DateTime<Utc>) -> String {
        match self.next_upcoming(now) {
            Some(event) => format!(
                "Next: {} in {}",
                event.title,
                format_countdown(time_until(event.start_time, now))
            ),
            None => "No upcoming events".to_string(),
        }
    }

    /// Listeners fire on every call, even if the value is unchanged.
    pub fn set_source_filter(&mut self, source: &str, visible: bool) {
        self.filter
            .source_visibility
            .insert(source.to_string(), visible);
        self.notify(ViewChange::SourceFilter {
            source: source.to_string(),
            visible,
        });
    }

    pub fn set_show_all_day(&mut self, show: bool) {
        self.filter.show_all_day = show;
        self.notify(ViewChange::ShowAllDay(show));
    }

    pub fn set_show_completed(&mut self, show: bool) {
        self.filter.show_completed = show;
        self.notify(ViewChange::ShowCompleted(show));
    }

    fn notify(&self, change: ViewChange) {
        debug!(?change, listeners = self.listeners.len(), "View changed");
        for (index, listener) in self.listeners.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener(&change))).is_err() {
                error!(listener = index, ?change, "View listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime};
    use std::sync::{Arc, Mutex};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn event(id: &str, title: &str, source: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event {
            id: id.to_string(),
            ..Event::new(source, title, start, end)
        }
    }

    fn sample_events() -> Vec<Event> {
        let now = now();
        let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        vec![
            event("1", "Past Event", "source1", now - Duration::hours(2), now - Duration::hours(1)),
            event("2", "Current Event", "source1", now - Duration::minutes(30), now + Duration::minutes(30)),
            event("3", "Future Event", "source2", now + Duration::hours(1), now + Duration::hours(2)),
            event("4", "All Day Event", "source2", midnight, midnight + Duration::days(1)).all_day(),
            event("5", "Next Week Event", "source3", now + Duration::days(7), now + Duration::days(7) + Duration::hours(1)),
            event("6", "Next Month Event", "source3", now + Duration::days(32), now + Duration::days(32) + Duration::hours(2)),
        ]
    }

    fn sample_view() -> EventView {
        let mut view = EventView::new();
        view.set_events(sample_events());
        view
    }

    fn ids(events: &[&Event]) -> Vec<String> {
        events.iter().map(|e| e.id.clone()).collect()
    }

    #[test]
    fn test_initial_state() {
        let view = EventView::new();
        assert!(view.filter().show_all_day);
        assert!(!view.filter().show_completed);
        assert!(view.filter().source_visibility.is_empty());
        assert!(view.events().is_empty());
    }

    #[test]
    fn test_set_events_sorts_by_start() {
        let mut events = sample_events();
        events.reverse();
        let mut view = EventView::new();
        view.set_events(events);

        let starts: Vec<_> = view.events().iter().map(|e| e.start_time).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn test_completed_events_hidden_by_default() {
        let view = sample_view();
        let visible = view.filtered(now());
        assert_eq!(ids(&visible), vec!["4", "2", "3", "5", "6"]);
        assert!(visible.iter().all(|e| e.end_time >= now()));
    }

    #[test]
    fn test_show_completed_shows_everything() {
        let mut view = sample_view();
        view.set_show_completed(true);
        assert_eq!(view.filtered(now()).len(), 6);
    }

    #[test]
    fn test_source_filtering() {
        let mut view = sample_view();
        view.set_show_completed(true);

        view.set_source_filter("source1", false);
        let visible = view.filtered(now());
        assert_eq!(visible.len(), 4);
        assert!(visible.iter().all(|e| e.source != "source1"));

        view.set_source_filter("source2", false);
        let visible = view.filtered(now());
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|e| e.source == "source3"));
    }

    #[test]
    fn test_all_day_filtering() {
        let mut view = sample_view();
        view.set_show_completed(true);
        view.set_show_all_day(false);

        let visible = view.filtered(now());
        assert_eq!(visible.len(), 5);
        assert!(visible.iter().all(|e| !e.is_all_day));
    }

    #[test]
    fn test_completed_check_uses_supplied_now() {
        let view = sample_view();
        let later = now() + Duration::hours(3);
        assert!(view.filtered(later).iter().all(|e| e.id != "3"));
        assert!(view.filtered(now()).iter().any(|e| e.id == "3"));
    }

    #[test]
    fn test_filtering_is_repeatable() {
        let view = sample_view();
        assert_eq!(view.filtered(now()), view.filtered(now()));
    }

    #[test]
    fn test_next_upcoming() {
        let mut view = sample_view();
        assert_eq!(view.next_upcoming(now()).map(|e| e.id.as_str()), Some("3"));

        view.set_source_filter("source2", false);
        assert_eq!(view.next_upcoming(now()).map(|e| e.id.as_str()), Some("5"));

        view.set_events(Vec::new());
        assert!(view.next_upcoming(now()).is_none());
    }

    #[test]
    fn test_range_is_inclusive() {
        let mut view = sample_view();
        view.set_show_completed(true);
        let day_start = now().date_naive().and_time(NaiveTime::MIN).and_utc();

        assert_eq!(view.events_in_range(day_start, day_start + Duration::days(1), now()).len(), 4);
        assert_eq!(view.events_in_range(day_start, day_start + Duration::days(7), now()).len(), 4);
        assert_eq!(view.events_in_range(day_start, now() + Duration::days(7), now()).len(), 5);
        assert_eq!(view.events_in_range(day_start, day_start + Duration::days(33), now()).len(), 6);

        let future = now() + Duration::hours(1);
        assert_eq!(ids(&view.events_in_range(future, future, now())), vec!["3"]);
    }

    #[test]
    fn test_events_on_date_respects_timezone() {
        let mut view = EventView::new();
        // 23:30 UTC on the 15th is already the 16th in Tokyo.
        let late = Utc.with_ymd_and_hms(2024, 3, 15, 23, 30, 0).unwrap();
        view.set_events(vec![event("late", "Late", "s", late, late + Duration::minutes(30))]);
        let before = late - Duration::hours(1);

        let utc_day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let tokyo_day = NaiveDate::from_ymd_opt(2024, 3, 16).unwrap();
        assert_eq!(view.events_on_date(utc_day, &Utc, before).len(), 1);
        assert_eq!(view.events_on_date(tokyo_day, &chrono_tz::Asia::Tokyo, before).len(), 1);
        assert!(view.events_on_date(tokyo_day, &Utc, before).is_empty());
    }

    #[test]
    fn test_all_day_events_stay_on_feed_date_west_of_utc() {
        let mut view = EventView::new();
        let midnight = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        view.set_events(vec![
            Event::new("s", "Holiday", midnight, midnight + Duration::days(1)).all_day(),
        ]);
        let ny = chrono_tz::America::New_York;
        let before = midnight - Duration::days(1);

        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let eve = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        assert_eq!(view.events_on_date(day, &ny, before).len(), 1);
        assert!(view.events_on_date(eve, &ny, before).is_empty());
    }

    #[test]
    fn test_countdown_text() {
        let mut view = sample_view();
        assert_eq!(view.countdown_text(now()), "Next: Future Event in 1h 0m 0s");

        view.set_events(Vec::new());
        assert_eq!(view.countdown_text(now()), "No upcoming events");
    }

    #[test]
    fn test_listeners_fire_once_per_mutation_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut view = sample_view();

        for name in ["first", "second"] {
            let calls = Arc::clone(&calls);
            view.add_listener(move |change| {
                calls.lock().unwrap().push((name, change.clone()));
            });
        }

        view.set_source_filter("source1", false);
        view.set_show_all_day(false);
        view.set_show_completed(true);
        view.set_events(Vec::new());

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 8);
        assert_eq!(calls[0].0, "first");
        assert_eq!(calls[1].0, "second");
        assert_eq!(calls[7].1, ViewChange::Events { count: 0 });
    }

    #[test]
    fn test_unchanged_value_still_notifies() {
        let count = Arc::new(Mutex::new(0));
        let mut view = EventView::new();
        let counter = Arc::clone(&count);
        view.add_listener(move |_| *counter.lock().unwrap() += 1);

        view.set_show_all_day(true);
        view.set_show_all_day(true);

        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let count = Arc::new(Mutex::new(0));
        let mut view = EventView::new();
        view.add_listener(|_| panic!("listener failure"));
        let counter = Arc::clone(&count);
        view.add_listener(move |_| *counter.lock().unwrap() += 1);

        view.set_show_completed(true);

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(view.filter().show_completed);
    }

    #[test]
    fn test_empty_view_with_filters() {
        let mut view = EventView::new();
        view.set_source_filter("source1", false);
        assert!(view.filtered(now()).is_empty());
        assert_eq!(view.countdown_text(now()), "No upcoming events");
    }
}
