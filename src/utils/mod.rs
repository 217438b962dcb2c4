/// Utility functions and helpers
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Generate an operation id for tracing, based on timestamp and a random component
pub fn generate_id(prefix: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();

    let random: u32 = rand::random();
    format!("{}-{}-{:x}", prefix, timestamp, random)
}

/// Format duration for human-readable output
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Describe how long ago a probe ran, or "never"
pub fn format_age(at: Option<SystemTime>) -> String {
    match at {
        Some(at) => {
            let elapsed = SystemTime::now().duration_since(at).unwrap_or_default();
            format!("{} ago", format_duration(elapsed))
        }
        None => "never".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h1m1s");
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(None), "never");
        assert_eq!(format_age(Some(SystemTime::now())), "0s ago");
    }

    #[test]
    fn test_generate_id() {
        let id1 = generate_id("op");
        let id2 = generate_id("op");

        assert!(id1.starts_with("op-"));
        assert!(id2.starts_with("op-"));
        assert_ne!(id1, id2);
    }
}
