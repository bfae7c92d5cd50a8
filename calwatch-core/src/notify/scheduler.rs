//! Reminder scheduler.
//!
//! Keeps the pending triggers of every scheduled event in one ordered set guarded by a
//! single mutex. Each trigger ends either fired or cancelled, never both: the firing
//! path claims due triggers by removing them under the lock, and `cancel` removes
//! whatever is still pending under the same lock. Handlers run after the lock is
//! released, so a slow handler never blocks `schedule` or `cancel`.

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{CalWatchError, CalWatchResult};
use crate::event::{Event, Priority};
use crate::notify::clock::{Clock, SystemClock};
use crate::notify::handler::{Notification, NotificationHandler, SoundPlayer};
use crate::notify::message::format_message;
use crate::notify::settings::NotificationSettings;

/// Longest the timer sleeps before re-reading the wall clock.
const MAX_TIMER_SLEEP: StdDuration = StdDuration::from_secs(60);

/// A pending reminder for one (event, lead time) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub event_id: String,
    pub lead_time: Duration,
    pub fire_at: DateTime<Utc>,
    pub priority: Priority,
}

/// Fire time first, then insertion order.
type TriggerKey = (DateTime<Utc>, u64);

struct ScheduledEvent {
    event: Event,
    priority: Priority,
}

struct DueReminder {
    notification: Notification,
    play_sound: bool,
}

struct SchedulerState {
    settings: NotificationSettings,
    pending: BTreeMap<TriggerKey, Trigger>,
    /// Events with pending triggers, plus those parked while reminders are disabled.
    events: HashMap<String, ScheduledEvent>,
    next_seq: u64,
    timer_running: bool,
    shut_down: bool,
}

impl SchedulerState {
    fn remove_triggers(&mut self, event_id: &str) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, trigger| trigger.event_id != event_id);
        before - self.pending.len()
    }

    fn has_triggers(&self, event_id: &str) -> bool {
        self.pending.values().any(|trigger| trigger.event_id == event_id)
    }

    /// Create a trigger per applicable lead time whose fire time is still ahead of `now`.
    fn insert_triggers(&mut self, event: &Event, priority: Priority, now: DateTime<Utc>) -> usize {
        let mut created = 0;
        for lead_time in self.settings.lead_times_for(&event.id) {
            let Some(fire_at) = event.start_time.checked_sub_signed(lead_time) else {
                warn!(event_id = %event.id, ?lead_time, "Reminder time out of range, not scheduling");
                continue;
            };
            if fire_at <= now {
                debug!(event_id = %event.id, %fire_at, "Reminder time already passed, not scheduling");
                continue;
            }

            let key = (fire_at, self.next_seq);
            self.next_seq += 1;
            self.pending.insert(
                key,
                Trigger {
                    event_id: event.id.clone(),
                    lead_time,
                    fire_at,
                    priority,
                },
            );
            created += 1;
        }
        created
    }
}

struct Shared {
    state: Mutex<SchedulerState>,
    handlers: Mutex<Vec<Arc<dyn NotificationHandler>>>,
    sound: Mutex<Option<Arc<dyn SoundPlayer>>>,
    clock: Arc<dyn Clock>,
    wake: Notify,
    cancel: CancellationToken,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Schedules and fires event reminders.
///
/// Cheap to clone; clones share the same pending set, handlers and timer.
#[derive(Clone)]
pub struct NotificationScheduler {
    shared: Arc<Shared>,
}

impl NotificationScheduler {
    pub fn new(settings: NotificationSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: NotificationSettings, clock: Arc<dyn Clock>) -> Self {
        NotificationScheduler {
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState {
                    settings,
                    pending: BTreeMap::new(),
                    events: HashMap::new(),
                    next_seq: 0,
                    timer_running: false,
                    shut_down: false,
                }),
                handlers: Mutex::new(Vec::new()),
                sound: Mutex::new(None),
                clock,
                wake: Notify::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Register a handler. Handlers are invoked in registration order.
    pub fn add_handler<H>(&self, handler: H)
    where
        H: NotificationHandler + 'static,
    {
        self.shared
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    pub fn set_sound_player<S>(&self, player: S)
    where
        S: SoundPlayer + 'static,
    {
        *self
            .shared
            .sound
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(player));
    }

    pub fn settings(&self) -> NotificationSettings {
        self.shared.state().settings.clone()
    }

    /// Schedule reminders for `event`, replacing any it already has.
    ///
    /// Returns the number of triggers created. Lead times whose fire time has already
    /// passed produce nothing; so does everything while reminders are disabled.
    pub fn schedule(&self, event: &Event, priority: Priority) -> usize {
        let now = self.shared.clock.now();
        let (replaced, created) = {
            let mut state = self.shared.state();
            if !state.settings.enabled {
                debug!(event_id = %event.id, "Reminders disabled, not scheduling");
                return 0;
            }

            let replaced = state.remove_triggers(&event.id);
            let created = state.insert_triggers(event, priority, now);
            if created > 0 {
                state.events.insert(
                    event.id.clone(),
                    ScheduledEvent {
                        event: event.clone(),
                        priority,
                    },
                );
            } else {
                state.events.remove(&event.id);
            }
            (replaced, created)
        };

        if created > 0 || replaced > 0 {
            self.shared.wake.notify_one();
        }
        debug!(event_id = %event.id, title = %event.title, created, replaced, "Scheduled reminders");
        created
    }

    /// Schedule every event in `events` at the same priority.
    pub fn schedule_all<'a, I>(&self, events: I, priority: Priority) -> usize
    where
        I: IntoIterator<Item = &'a Event>,
    {
        events
            .into_iter()
            .map(|event| self.schedule(event, priority))
            .sum()
    }

    /// Schedule the events in `events` that have no reminders pending yet.
    ///
    /// Events already tracked keep their triggers untouched, including any that are due
    /// but not yet claimed by the timer. Returns the number of triggers created.
    pub fn schedule_new<'a, I>(&self, events: I, priority: Priority) -> usize
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let now = self.shared.clock.now();
        let (created, skipped) = {
            let mut state = self.shared.state();
            if !state.settings.enabled {
                return 0;
            }

            let mut created = 0;
            let mut skipped = 0;
            for event in events {
                if state.events.contains_key(&event.id) {
                    skipped += 1;
                    continue;
                }
                let count = state.insert_triggers(event, priority, now);
                if count > 0 {
                    state.events.insert(
                        event.id.clone(),
                        ScheduledEvent {
                            event: event.clone(),
                            priority,
                        },
                    );
                }
                created += count;
            }
            (created, skipped)
        };

        if created > 0 {
            self.shared.wake.notify_one();
        }
        debug!(created, skipped, "Scheduled reminders for new events");
        created
    }

    /// Cancel every pending reminder of `event_id`. Returns how many were removed.
    ///
    /// Once this returns, none of those reminders will fire. A reminder whose firing
    /// already began is unaffected.
    pub fn cancel(&self, event_id: &str) -> usize {
        let removed = {
            let mut state = self.shared.state();
            state.events.remove(event_id);
            state.remove_triggers(event_id)
        };
        if removed > 0 {
            info!(event_id, removed, "Cancelled reminders");
            self.shared.wake.notify_one();
        }
        removed
    }

    /// Replace the settings.
    ///
    /// When the global enable flag flips, every pending trigger is cancelled, and if the
    /// new flag is on, the known events are scheduled again at their original priority
    /// under the new settings. Other changes apply to later `schedule` calls only.
    pub fn update_settings(&self, settings: NotificationSettings) {
        let now = self.shared.clock.now();
        let mut state = self.shared.state();
        let was_enabled = state.settings.enabled;
        state.settings = settings;
        if was_enabled == state.settings.enabled {
            return;
        }

        let cancelled = state.pending.len();
        state.pending.clear();

        let mut created = 0;
        if state.settings.enabled {
            let known = std::mem::take(&mut state.events);
            for (event_id, scheduled) in known {
                let count = state.insert_triggers(&scheduled.event, scheduled.priority, now);
                if count > 0 {
                    state.events.insert(event_id, scheduled);
                }
                created += count;
            }
        }
        drop(state);

        info!(cancelled, created, "Reminder settings toggled");
        self.shared.wake.notify_one();
    }

    /// Snapshot of pending triggers in firing order.
    pub fn pending(&self) -> Vec<Trigger> {
        self.shared.state().pending.values().cloned().collect()
    }

    pub fn pending_for(&self, event_id: &str) -> Vec<Trigger> {
        self.shared
            .state()
            .pending
            .values()
            .filter(|trigger| trigger.event_id == event_id)
            .cloned()
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.state().pending.len()
    }

    pub fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        self.shared
            .state()
            .pending
            .keys()
            .next()
            .map(|(fire_at, _)| *fire_at)
    }

    /// Fire every trigger due at the clock's current time. Returns how many fired.
    pub fn fire_due(&self) -> usize {
        let due = self.claim_due(self.shared.clock.now());
        let fired = due.len();
        for reminder in due {
            self.dispatch(reminder);
        }
        fired
    }

    /// Start the background timer on the current tokio runtime.
    pub fn start(&self) -> CalWatchResult<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CalWatchError::Scheduler(format!("no async runtime: {}", e)))?;
        {
            let mut state = self.shared.state();
            if state.shut_down {
                return Err(CalWatchError::Scheduler("scheduler was shut down".into()));
            }
            if state.timer_running {
                return Err(CalWatchError::Scheduler("timer already running".into()));
            }
            state.timer_running = true;
        }

        let scheduler = self.clone();
        Ok(runtime.spawn(async move { scheduler.run_timer().await }))
    }

    /// Stop the timer. Triggers still pending never fire.
    pub fn shutdown(&self) {
        let pending = {
            let mut state = self.shared.state();
            state.shut_down = true;
            state.pending.len()
        };
        self.shared.cancel.cancel();
        info!(pending, "Reminder scheduler shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state().shut_down
    }

    /// Remove and return every trigger with `fire_at <= now`, in firing order.
    fn claim_due(&self, now: DateTime<Utc>) -> Vec<DueReminder> {
        let mut state = self.shared.state();
        if state.shut_down {
            return Vec::new();
        }

        let later = state.pending.split_off(&(now, u64::MAX));
        let due = std::mem::replace(&mut state.pending, later);
        let sound_enabled = state.settings.sound_enabled;

        let mut reminders = Vec::with_capacity(due.len());
        for trigger in due.into_values() {
            let Some(scheduled) = state.events.get(&trigger.event_id) else {
                warn!(event_id = %trigger.event_id, "Dropping trigger for unknown event");
                continue;
            };
            let event = scheduled.event.clone();
            reminders.push(DueReminder {
                notification: Notification {
                    message: format_message(&event, trigger.lead_time),
                    event,
                    priority: trigger.priority,
                    lead_time: trigger.lead_time,
                    fire_at: trigger.fire_at,
                },
                play_sound: sound_enabled && trigger.priority >= Priority::Normal,
            });
        }

        for reminder in &reminders {
            let event_id = &reminder.notification.event.id;
            if !state.has_triggers(event_id) {
                state.events.remove(event_id);
            }
        }
        reminders
    }

    /// Run handlers and sound for one claimed reminder. Failures are logged and swallowed.
    fn dispatch(&self, reminder: DueReminder) {
        let notification = &reminder.notification;
        let handlers: Vec<Arc<dyn NotificationHandler>> = self
            .shared
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        info!(
            event_id = %notification.event.id,
            message = %notification.message,
            priority = %notification.priority,
            "Reminder fired"
        );

        for (index, handler) in handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler.on_notification(notification))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(handler = index, event_id = %notification.event.id, error = %e, "Notification handler failed");
                }
                Err(_) => {
                    error!(handler = index, event_id = %notification.event.id, "Notification handler panicked");
                }
            }
        }

        if reminder.play_sound {
            let player = self
                .shared
                .sound
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(player) = player {
                match catch_unwind(AssertUnwindSafe(|| player.play(notification.priority))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "Could not play reminder sound"),
                    Err(_) => warn!("Sound player panicked"),
                }
            }
        }
    }

    /// Time until the earliest trigger, capped so clock jumps are noticed.
    fn time_until_next(&self) -> StdDuration {
        let now = self.shared.clock.now();
        match self.next_fire_at() {
            Some(fire_at) => (fire_at - now)
                .to_std()
                .unwrap_or(StdDuration::ZERO)
                .min(MAX_TIMER_SLEEP),
            None => MAX_TIMER_SLEEP,
        }
    }

    async fn run_timer(self) {
        info!("Reminder timer started");
        loop {
            let sleep_for = self.time_until_next();
            tokio::select! {
                biased;
                _ = self.shared.cancel.cancelled() => break,
                _ = self.shared.wake.notified() => continue,
                _ = tokio::time::sleep(sleep_for) => {
                    let due = self.claim_due(self.shared.clock.now());
                    if due.is_empty() {
                        continue;
                    }
                    let scheduler = self.clone();
                    let dispatched = tokio::task::spawn_blocking(move || {
                        for reminder in due {
                            scheduler.dispatch(reminder);
                        }
                    })
                    .await;
                    if let Err(e) = dispatched {
                        error!(error = %e, "Reminder dispatch task failed");
                    }
                }
            }
        }
        self.shared.state().timer_running = false;
        info!("Reminder timer stopped");
    }
}
