mod commands;
mod notifier;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use calwatch_core::config::AppConfig;
use calwatch_core::date_range::{self, DateRange};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "calwatch")]
#[command(about = "Watch calendar feeds and get reminded before events start")]
struct Cli {
    /// Config file (default: ~/.config/calwatch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Less log output (-q warn, -qq error)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a commented default config file
    Init,
    /// List configured feeds
    Sources,
    /// Show events from all feeds, grouped by day
    Events {
        /// Show events from this date (YYYY-MM-DD, or "start" for all past events)
        #[arg(long)]
        from: Option<String>,

        /// Show events until this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Include events that have already ended (without --from, starts at today 00:00 UTC)
        #[arg(long)]
        completed: bool,

        /// Hide all-day events
        #[arg(long)]
        no_all_day: bool,

        /// Print events as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a countdown to the next event
    Next,
    /// Keep feeds fresh and deliver reminders until interrupted
    Watch {
        /// Print reminders only, without desktop notifications
        #[arg(long)]
        no_desktop: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let config_path = match cli.config {
        Some(path) => path,
        None => AppConfig::config_path()?,
    };

    match cli.command {
        Commands::Init => commands::init::run(&config_path),
        Commands::Sources => {
            let config = load_config(&config_path)?;
            commands::sources::run(&config)
        }
        Commands::Events {
            from,
            to,
            completed,
            no_all_day,
            json,
        } => {
            let config = load_config(&config_path)?;
            require_sources(&config, &config_path)?;
            let now = Utc::now();
            let show_completed = completed || config.display.show_completed_events;
            // Without --from, completed events from earlier today stay in range.
            let anchor = if show_completed && from.is_none() {
                date_range::start_of_day(now)
            } else {
                now
            };
            let mut range = DateRange::from_args(from.as_deref(), to.as_deref(), anchor)?;
            if to.is_none() {
                let span = Duration::days(config.display.default_view.span_days());
                range.to = Some(range.from.unwrap_or(anchor) + span);
            }
            let options = commands::events::Options {
                range,
                show_completed,
                show_all_day: !no_all_day && config.display.show_all_day_events,
                json,
            };
            commands::events::run(&config, options).await
        }
        Commands::Next => {
            let config = load_config(&config_path)?;
            require_sources(&config, &config_path)?;
            commands::next::run(&config).await
        }
        Commands::Watch { no_desktop } => {
            let config = load_config(&config_path)?;
            require_sources(&config, &config_path)?;
            commands::watch::run(config, !no_desktop).await
        }
    }
}

fn init_tracing(verbose: u8, quiet: u8) -> Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

fn load_config(path: &std::path::Path) -> Result<AppConfig> {
    AppConfig::load(Some(path)).with_context(|| format!("Failed to load {}", path.display()))
}

fn require_sources(config: &AppConfig, path: &std::path::Path) -> Result<()> {
    if config.sources.values().any(|source| source.enabled) {
        return Ok(());
    }

    anyhow::bail!(
        "No calendar feeds configured.\n\n\
        Create a config file with:\n  \
        calwatch init\n\n\
        Then add a feed to {}:\n  \
        [sources.work]\n  \
        url = \"webcal://example.com/work.ics\"",
        path.display()
    )
}
