//! calwatch configuration at ~/.config/calwatch/config.toml

mod values;

pub use values::{HexColor, HumanDuration, LeadTimes, TimeFormat, ViewMode, parse_lead_time};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CalWatchError, CalWatchResult};
use crate::feed::{DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT, FeedFetcher, FeedLocation, FeedSource};
use crate::ics::FeedParser;
use crate::notify::{DEFAULT_LEAD_MINUTES, NotificationSettings};
use crate::recurrence::ExpansionWindow;
use crate::view::FilterState;

const DEFAULT_EXPAND_PAST_DAYS: u32 = 30;
const DEFAULT_EXPAND_FUTURE_DAYS: u32 = 365;
/// Roughly a century in either direction.
const MAX_EXPAND_DAYS: u32 = 36_500;

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// How often `watch` re-fetches every feed.
    pub refresh_interval: HumanDuration,
    pub fetch_timeout: HumanDuration,
    /// How long a fetched feed is reused before hitting the network again.
    pub cache_ttl: HumanDuration,
    /// Recurring events are expanded from this many days in the past...
    pub expand_past_days: u32,
    /// ...to this many days in the future.
    pub expand_future_days: u32,
    /// Feeds keyed by source id. The id is the `source` of every event from the feed.
    pub sources: BTreeMap<String, SourceConfig>,
    pub notifications: NotificationConfig,
    pub display: DisplayConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            refresh_interval: HumanDuration::from_secs(15 * 60),
            fetch_timeout: HumanDuration::from_secs(DEFAULT_FETCH_TIMEOUT.as_secs()),
            cache_ttl: HumanDuration::from_secs(DEFAULT_CACHE_TTL.as_secs()),
            expand_past_days: DEFAULT_EXPAND_PAST_DAYS,
            expand_future_days: DEFAULT_EXPAND_FUTURE_DAYS,
            sources: BTreeMap::new(),
            notifications: NotificationConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// http(s)/webcal URL or local path.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<HexColor>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
}

impl SourceConfig {
    pub fn new(url: impl Into<String>) -> Self {
        SourceConfig {
            url: url.into(),
            name: None,
            color: None,
            enabled: true,
        }
    }

    /// Display name, falling back to the source id.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub sound_enabled: bool,
    pub default_lead: HumanDuration,
    /// Per-event lead times keyed by event id.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub custom_leads: HashMap<String, LeadTimes>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        NotificationConfig {
            enabled: true,
            sound_enabled: true,
            default_lead: HumanDuration::from_secs(DEFAULT_LEAD_MINUTES as u64 * 60),
            custom_leads: HashMap::new(),
        }
    }
}

impl NotificationConfig {
    /// Scheduler settings described by this section.
    pub fn to_settings(&self) -> CalWatchResult<NotificationSettings> {
        let mut custom_leads = HashMap::with_capacity(self.custom_leads.len());
        for (event_id, leads) in &self.custom_leads {
            let leads = leads
                .to_vec()
                .iter()
                .map(HumanDuration::as_chrono)
                .collect::<CalWatchResult<Vec<_>>>()?;
            custom_leads.insert(event_id.clone(), leads);
        }

        Ok(NotificationSettings {
            enabled: self.enabled,
            sound_enabled: self.sound_enabled,
            default_lead: self.default_lead.as_chrono()?,
            custom_leads,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub show_all_day_events: bool,
    pub show_completed_events: bool,
    pub default_view: ViewMode,
    pub time_format: TimeFormat,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            show_all_day_events: true,
            show_completed_events: false,
            default_view: ViewMode::default(),
            time_format: TimeFormat::default(),
        }
    }
}

impl AppConfig {
    pub fn config_path() -> CalWatchResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CalWatchError::Config("Could not determine config directory".into()))?
            .join("calwatch");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> CalWatchResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| CalWatchError::ConfigValidation(format!("{}: {}", path.display(), e)))?;
        config.validate()?;

        debug!(path = %path.display(), sources = config.sources.len(), "Loaded config");
        Ok(config)
    }

    /// Check what deserialization alone cannot.
    pub fn validate(&self) -> CalWatchResult<()> {
        if self.refresh_interval.as_std().is_zero() {
            return Err(CalWatchError::ConfigValidation(
                "refresh_interval must be greater than zero".into(),
            ));
        }
        if self.fetch_timeout.as_std().is_zero() {
            return Err(CalWatchError::ConfigValidation(
                "fetch_timeout must be greater than zero".into(),
            ));
        }

        for (key, days) in [
            ("expand_past_days", self.expand_past_days),
            ("expand_future_days", self.expand_future_days),
        ] {
            if days > MAX_EXPAND_DAYS {
                return Err(CalWatchError::ConfigValidation(format!(
                    "{} must be at most {}, got {}",
                    key, MAX_EXPAND_DAYS, days
                )));
            }
        }

        for (id, source) in &self.sources {
            if id.trim().is_empty() {
                return Err(CalWatchError::ConfigValidation("source id is empty".into()));
            }
            FeedLocation::parse(&source.url).map_err(|e| {
                CalWatchError::ConfigValidation(format!("source '{}': {}", id, e))
            })?;
        }

        self.notifications.to_settings()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> CalWatchResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CalWatchError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| CalWatchError::Config(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| CalWatchError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// Write a config file with every option commented out.
    pub fn create_default_config(path: &Path) -> CalWatchResult<()> {
        let contents = "\
# calwatch configuration

# How often feeds are re-fetched while watching:
# refresh_interval = \"15m\"
# fetch_timeout = \"10s\"
# cache_ttl = \"5m\"

# Recurring events are expanded over this window:
# expand_past_days = 30
# expand_future_days = 365

# One table per feed. The table name is the source id.
# [sources.work]
# url = \"webcal://example.com/work.ics\"
# name = \"Work\"
# color = \"#4a90d9\"
# enabled = true

# [notifications]
# enabled = true
# sound_enabled = true
# default_lead = \"10m\"

# [notifications.custom_leads]
# <event id> = [\"30m\", \"5m\"]

# [display]
# show_all_day_events = true
# show_completed_events = false
# default_view = \"week\"
# time_format = \"24h\"
";

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CalWatchError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| CalWatchError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// Enabled feeds, ordered by source id.
    pub fn feed_sources(&self) -> CalWatchResult<Vec<FeedSource>> {
        self.sources
            .iter()
            .filter(|(_, source)| source.enabled)
            .map(|(id, source)| FeedSource::new(id.clone(), &source.url))
            .collect()
    }

    /// Filter state matching the configured source enablement and display toggles.
    pub fn filter_state(&self) -> FilterState {
        FilterState {
            source_visibility: self
                .sources
                .iter()
                .map(|(id, source)| (id.clone(), source.enabled))
                .collect(),
            show_all_day: self.display.show_all_day_events,
            show_completed: self.display.show_completed_events,
        }
    }

    pub fn expansion_window(&self, now: DateTime<Utc>) -> ExpansionWindow {
        ExpansionWindow::around(
            now,
            i64::from(self.expand_past_days),
            i64::from(self.expand_future_days),
        )
    }

    /// A fetcher using the configured timeout, cache and expansion window.
    pub fn fetcher(&self, now: DateTime<Utc>) -> CalWatchResult<FeedFetcher> {
        FeedFetcher::new(
            FeedParser::with_window(self.expansion_window(now)),
            self.fetch_timeout.as_std(),
            self.cache_ttl.as_std(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_full_config() {
        let (_dir, path) = write_config(
            r##"
refresh_interval = "5m"
expand_future_days = 90

[sources.work]
url = "webcal://example.com/work.ics"
name = "Work"
color = "#4a90d9"

[sources.holidays]
url = "/tmp/holidays.ics"
enabled = false

[notifications]
sound_enabled = false
default_lead = "15m"

[notifications.custom_leads]
abc123 = ["30m", "5m"]
def456 = "1h"

[display]
show_all_day_events = false
default_view = "day"
time_format = "12h"
"##,
        );

        let config = AppConfig::load(Some(path.as_path())).unwrap();

        assert_eq!(config.refresh_interval.as_std(), std::time::Duration::from_secs(300));
        assert_eq!(config.expand_past_days, 30);
        assert_eq!(config.expand_future_days, 90);
        assert_eq!(config.sources["work"].display_name("work"), "Work");
        assert_eq!(config.sources["holidays"].display_name("holidays"), "holidays");
        assert_eq!(config.display.default_view, ViewMode::Day);
        assert_eq!(config.display.time_format, TimeFormat::Hour12);

        let settings = config.notifications.to_settings().unwrap();
        assert!(settings.enabled);
        assert!(!settings.sound_enabled);
        assert_eq!(settings.default_lead, Duration::minutes(15));
        assert_eq!(
            settings.lead_times_for("abc123"),
            vec![Duration::minutes(30), Duration::minutes(5)]
        );
        assert_eq!(settings.lead_times_for("def456"), vec![Duration::hours(1)]);

        let sources = config.feed_sources().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "work");

        let filter = config.filter_state();
        assert!(!filter.is_source_visible("holidays"));
        assert!(filter.is_source_visible("work"));
        assert!(!filter.show_all_day);
        assert!(!filter.show_completed);
    }

    #[test]
    fn test_invalid_values_are_validation_errors() {
        for contents in [
            "[sources.work]\nurl = \"https://example.com\"\ncolor = \"blue\"\n",
            "[notifications]\ndefault_lead = \"soon\"\n",
            "[display]\ndefault_view = \"year\"\n",
            "[display]\ntime_format = \"36h\"\n",
            "refresh_interval = \"0s\"\n",
            "[sources.work]\nurl = \"ftp://example.com/cal.ics\"\n",
            "expand_future_days = 100000000\n",
            "expand_past_days = 36501\n",
            "this is not toml",
        ] {
            let (_dir, path) = write_config(contents);
            assert!(
                matches!(AppConfig::load(Some(path.as_path())), Err(CalWatchError::ConfigValidation(_))),
                "{:?} should fail validation",
                contents
            );
        }
    }

    #[test]
    fn test_widest_expansion_window_builds_a_fetcher() {
        let (_dir, path) = write_config("expand_past_days = 36500\nexpand_future_days = 36500\n");
        let config = AppConfig::load(Some(path.as_path())).unwrap();

        let window = config.expansion_window(Utc::now());
        assert!(window.from.is_some());
        assert!(window.to.is_some());
        assert!(config.fetcher(Utc::now()).is_ok());
    }

    #[test]
    fn test_expansion_window_follows_now() {
        let config = AppConfig::default();
        let start = Utc::now();
        let week_later = start + Duration::days(7);

        let first = config.expansion_window(start);
        let second = config.expansion_window(week_later);
        assert_eq!(first.to, Some(start + Duration::days(365)));
        assert_eq!(second.to, Some(week_later + Duration::days(365)));
        assert_eq!(second.from, Some(week_later - Duration::days(30)));
    }

    #[test]
    fn test_save_then_load_preserves_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = AppConfig::default();
        let mut source = SourceConfig::new("https://example.com/team.ics");
        source.color = Some("#abc".parse().unwrap());
        config.sources.insert("team".into(), source);
        config.display.time_format = TimeFormat::Hour12;

        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(Some(path.as_path())).unwrap(), config);
    }

    #[test]
    fn test_default_template_loads_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calwatch/config.toml");

        AppConfig::create_default_config(&path).unwrap();
        assert_eq!(AppConfig::load(Some(path.as_path())).unwrap(), AppConfig::default());
    }
}
