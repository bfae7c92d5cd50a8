use std::path::Path;

use anyhow::Result;
use calwatch_core::config::AppConfig;
use owo_colors::OwoColorize;

pub fn run(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!(
            "Config file already exists at {}\nEdit it directly, or remove it to start over.",
            path.display()
        );
    }

    AppConfig::create_default_config(path)?;
    println!("{} {}", "Created".green(), path.display());
    println!("{}", "Add a [sources.<id>] table with a feed url to get started.".dimmed());
    Ok(())
}
