//! Reminder settings snapshot.

use std::collections::HashMap;

use chrono::Duration;

/// Lead time used when neither configuration nor caller supplies one.
pub const DEFAULT_LEAD_MINUTES: i64 = 10;

/// Settings the scheduler reads when computing triggers.
///
/// Owned by the application; the scheduler receives a fresh copy through
/// `update_settings` whenever it changes.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationSettings {
    /// Global switch. When off nothing is scheduled.
    pub enabled: bool,
    pub sound_enabled: bool,
    pub default_lead: Duration,
    /// Per-event lead times, keyed by event id. A non-empty entry replaces the default.
    pub custom_leads: HashMap<String, Vec<Duration>>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            enabled: true,
            sound_enabled: true,
            default_lead: Duration::minutes(DEFAULT_LEAD_MINUTES),
            custom_leads: HashMap::new(),
        }
    }
}

impl NotificationSettings {
    /// Lead times that apply to `event_id`, deduplicated, longest first.
    pub fn lead_times_for(&self, event_id: &str) -> Vec<Duration> {
        let mut leads = match self.custom_leads.get(event_id) {
            Some(custom) if !custom.is_empty() => custom.clone(),
            _ => vec![self.default_lead],
        };
        leads.sort_by(|a, b| b.cmp(a));
        leads.dedup();
        leads
    }
}
