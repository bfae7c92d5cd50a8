//! Validated configuration values.
//!
//! Each type checks its input when constructed, so a loaded config never holds an
//! invalid colour, duration or mode.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CalWatchError, CalWatchResult};

/// A `#RRGGBB` or `#RGB` colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl FromStr for HexColor {
    type Err = CalWatchError;

    fn from_str(s: &str) -> CalWatchResult<Self> {
        let invalid = || CalWatchError::ConfigValidation(format!("invalid colour '{}', expected #RRGGBB or #RGB", s));

        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| invalid());

        match hex.len() {
            6 => Ok(HexColor {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
            }),
            // #abc is shorthand for #aabbcc.
            3 => Ok(HexColor {
                r: channel(&hex[0..1])? * 17,
                g: channel(&hex[1..2])? * 17,
                b: channel(&hex[2..3])? * 17,
            }),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for HexColor {
    type Error = CalWatchError;

    fn try_from(value: String) -> CalWatchResult<Self> {
        value.parse()
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        color.to_string()
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A duration written in humantime form (`"10m"`, `"1h 30m"`, `"45s"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HumanDuration(Duration);

impl HumanDuration {
    pub const fn from_secs(secs: u64) -> Self {
        HumanDuration(Duration::from_secs(secs))
    }

    pub fn as_std(&self) -> Duration {
        self.0
    }

    /// As a signed chrono duration, for arithmetic with event times.
    pub fn as_chrono(&self) -> CalWatchResult<chrono::Duration> {
        chrono::Duration::from_std(self.0)
            .map_err(|_| CalWatchError::ConfigValidation(format!("duration '{}' is too large", self)))
    }
}

impl FromStr for HumanDuration {
    type Err = CalWatchError;

    fn from_str(s: &str) -> CalWatchResult<Self> {
        humantime::parse_duration(s.trim())
            .map(HumanDuration)
            .map_err(|e| CalWatchError::ConfigValidation(format!("invalid duration '{}': {}", s, e)))
    }
}

impl TryFrom<String> for HumanDuration {
    type Error = CalWatchError;

    fn try_from(value: String) -> CalWatchResult<Self> {
        value.parse()
    }
}

impl From<HumanDuration> for String {
    fn from(duration: HumanDuration) -> Self {
        duration.to_string()
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", humantime::format_duration(self.0))
    }
}

/// Parse a reminder lead time such as `"10m"` into a chrono duration.
pub fn parse_lead_time(s: &str) -> CalWatchResult<chrono::Duration> {
    s.parse::<HumanDuration>()?.as_chrono()
}

/// One lead time or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LeadTimes {
    One(HumanDuration),
    Many(Vec<HumanDuration>),
}

impl LeadTimes {
    pub fn to_vec(&self) -> Vec<HumanDuration> {
        match self {
            LeadTimes::One(lead) => vec![*lead],
            LeadTimes::Many(leads) => leads.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ViewMode {
    Day,
    #[default]
    Week,
    Month,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Day => "day",
            ViewMode::Week => "week",
            ViewMode::Month => "month",
        }
    }

    /// Days shown by this view.
    pub fn span_days(&self) -> i64 {
        match self {
            ViewMode::Day => 1,
            ViewMode::Week => 7,
            ViewMode::Month => 30,
        }
    }
}

impl FromStr for ViewMode {
    type Err = CalWatchError;

    fn from_str(s: &str) -> CalWatchResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(ViewMode::Day),
            "week" => Ok(ViewMode::Week),
            "month" => Ok(ViewMode::Month),
            _ => Err(CalWatchError::ConfigValidation(format!(
                "invalid view '{}', expected day, week or month",
                s
            ))),
        }
    }
}

impl TryFrom<String> for ViewMode {
    type Error = CalWatchError;

    fn try_from(value: String) -> CalWatchResult<Self> {
        value.parse()
    }
}

impl From<ViewMode> for String {
    fn from(mode: ViewMode) -> Self {
        mode.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeFormat {
    Hour12,
    #[default]
    Hour24,
}

impl TimeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFormat::Hour12 => "12h",
            TimeFormat::Hour24 => "24h",
        }
    }

    /// chrono format string for a time of day.
    pub fn pattern(&self) -> &'static str {
        match self {
            TimeFormat::Hour12 => "%-I:%M %p",
            TimeFormat::Hour24 => "%H:%M",
        }
    }
}

impl FromStr for TimeFormat {
    type Err = CalWatchError;

    fn from_str(s: &str) -> CalWatchResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "12h" => Ok(TimeFormat::Hour12),
            "24h" => Ok(TimeFormat::Hour24),
            _ => Err(CalWatchError::ConfigValidation(format!(
                "invalid time format '{}', expected 12h or 24h",
                s
            ))),
        }
    }
}

impl TryFrom<String> for TimeFormat {
    type Error = CalWatchError;

    fn try_from(value: String) -> CalWatchResult<Self> {
        value.parse()
    }
}

impl From<TimeFormat> for String {
    fn from(format: TimeFormat) -> Self {
        format.as_str().to_string()
    }
}
