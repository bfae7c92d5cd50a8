use std::collections::HashSet;

use anyhow::Result;
use calwatch_core::config::AppConfig;
use calwatch_core::notify::NotificationScheduler;
use calwatch_core::{Event, EventView, Priority};
use chrono::Utc;
use owo_colors::OwoColorize;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::fetch_events;
use crate::notifier::{ConsoleNotifier, DesktopNotifier, TerminalBell};

pub async fn run(config: AppConfig, desktop: bool) -> Result<()> {
    let scheduler = NotificationScheduler::new(config.notifications.to_settings()?);
    scheduler.add_handler(ConsoleNotifier);
    if desktop {
        scheduler.add_handler(DesktopNotifier);
    }
    scheduler.set_sound_player(TerminalBell);
    let timer = scheduler.start()?;

    let mut scheduled: HashSet<String> = HashSet::new();

    let mut refresh_timer = tokio::time::interval(config.refresh_interval.as_std());
    refresh_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    println!(
        "{}",
        format!(
            "Watching {} feeds, refreshing every {}. Press Ctrl-C to stop.",
            config.sources.values().filter(|s| s.enabled).count(),
            config.refresh_interval
        )
        .dimmed()
    );

    loop {
        tokio::select! {
            _ = &mut interrupted => break,
            _ = refresh_timer.tick() => {
                if let Err(e) = refresh(&config, &scheduler, &mut scheduled).await {
                    warn!(error = %e, "Refresh failed, keeping existing reminders");
                    eprintln!("{} {:#}", "warning:".yellow().bold(), e);
                }
            }
        }
    }

    scheduler.shutdown();
    timer.await?;
    println!("{}", "Stopped".dimmed());
    Ok(())
}

/// Re-fetch feeds, drop reminders of events that disappeared and schedule new ones.
///
/// The fetcher is rebuilt each time so recurring events expand around the current time.
async fn refresh(
    config: &AppConfig,
    scheduler: &NotificationScheduler,
    scheduled: &mut HashSet<String>,
) -> Result<()> {
    let fetcher = config.fetcher(Utc::now())?;
    let events = fetch_events(config, &fetcher).await?;
    let now = Utc::now();

    let mut view = EventView::with_filter(config.filter_state());
    view.set_events(events);
    let upcoming: Vec<&Event> = view
        .filtered(now)
        .into_iter()
        .filter(|event| event.start_time > now)
        .collect();

    let current: HashSet<String> = upcoming.iter().map(|event| event.id.clone()).collect();
    let mut cancelled = 0;
    for gone in scheduled.difference(&current) {
        cancelled += scheduler.cancel(gone);
    }

    let created = scheduler.schedule_new(upcoming.iter().copied(), Priority::Normal);
    *scheduled = current;

    info!(
        events = upcoming.len(),
        reminders = created,
        cancelled,
        next = ?scheduler.next_fire_at(),
        "Refreshed feeds"
    );
    Ok(())
}
