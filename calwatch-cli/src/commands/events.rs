use anyhow::Result;
use calwatch_core::EventView;
use calwatch_core::config::AppConfig;
use calwatch_core::date_range::DateRange;
use chrono::Utc;

use super::fetch_events;
use crate::render;

pub struct Options {
    pub range: DateRange,
    pub show_completed: bool,
    pub show_all_day: bool,
    pub json: bool,
}

pub async fn run(config: &AppConfig, options: Options) -> Result<()> {
    let now = Utc::now();
    let fetcher = config.fetcher(now)?;
    let events = fetch_events(config, &fetcher).await?;

    let mut filter = config.filter_state();
    filter.show_completed = options.show_completed;
    filter.show_all_day = options.show_all_day;

    let mut view = EventView::with_filter(filter);
    view.set_events(events);
    let shown = view.events_in_range(options.range.start(), options.range.end(), now);

    if options.json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
    } else {
        render::print_grouped(&shown, config);
    }

    Ok(())
}
