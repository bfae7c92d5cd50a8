use anyhow::Result;
use calwatch_core::config::AppConfig;
use owo_colors::OwoColorize;

use crate::render::swatch;

pub fn run(config: &AppConfig) -> Result<()> {
    if config.sources.is_empty() {
        println!("{}", "No sources configured".dimmed());
        return Ok(());
    }

    for (id, source) in &config.sources {
        let name = source.display_name(id);
        let status = if source.enabled {
            String::new()
        } else {
            format!(" {}", "(disabled)".yellow())
        };
        println!("{} {}{}", swatch(source.color), name.bold(), status);
        if name != id.as_str() {
            println!("  {} {}", "id:".dimmed(), id);
        }
        println!("  {} {}", "url:".dimmed(), source.url);
    }

    Ok(())
}
