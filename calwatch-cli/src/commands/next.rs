use anyhow::Result;
use calwatch_core::EventView;
use calwatch_core::config::AppConfig;
use chrono::Utc;

use super::fetch_events;

pub async fn run(config: &AppConfig) -> Result<()> {
    let now = Utc::now();
    let fetcher = config.fetcher(now)?;
    let events = fetch_events(config, &fetcher).await?;

    let mut view = EventView::with_filter(config.filter_state());
    view.set_events(events);

    println!("{}", view.countdown_text(now));
    Ok(())
}
