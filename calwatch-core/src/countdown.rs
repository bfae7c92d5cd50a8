//! Human-readable countdowns.

use chrono::{DateTime, Duration, Utc};

/// Time remaining from `now` until `target` (negative once passed).
pub fn time_until(target: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    target - now
}

/// Format a remaining duration, e.g. `3d 12h 30m`, `2h 15m 10s`, `5m 30s` or `45s`.
pub fn format_countdown(remaining: Duration) -> String {
    let total_seconds = remaining.num_seconds();
    if total_seconds < 0 {
        return "Event has passed".to_string();
    }

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(Duration::seconds(45)), "45s");
        assert_eq!(format_countdown(Duration::seconds(5 * 60 + 30)), "5m 30s");
        assert_eq!(
            format_countdown(Duration::hours(2) + Duration::minutes(15) + Duration::seconds(10)),
            "2h 15m 10s"
        );
        assert_eq!(
            format_countdown(Duration::days(3) + Duration::hours(12) + Duration::minutes(30)),
            "3d 12h 30m"
        );
        assert_eq!(format_countdown(Duration::zero()), "0s");
    }

    #[test]
    fn test_past_target() {
        let now = Utc::now();
        let remaining = time_until(now - Duration::minutes(30), now);
        assert!(remaining < Duration::zero());
        assert_eq!(format_countdown(remaining), "Event has passed");
    }
}
