//! Compact duration grammar
//!
//! Durations arrive from feeds in the form `3h24m59.5565s`, `3h24m5957ms`,
//! `149h` or `-45m`: optional hours, minutes, then seconds or milliseconds,
//! with an optional leading sign.

use std::sync::OnceLock;

use regex::Regex;

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(-?)(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)(?:\.\d+)?(m?)s)?")
            .expect("duration pattern is valid")
    })
}

/// Parse a compact duration string into signed whole seconds.
///
/// Returns 0 (and logs an error) when the string matches none of the grammar
/// components. Fractional digits written between the captured integer and the
/// `s`/`ms` unit are matched but ignored; this mirrors the feed grammar and is
/// intentional.
pub fn parse_duration_to_seconds(duration: &str) -> i64 {
    let caps = match duration_re().captures(duration) {
        Some(caps) if !caps.get(0).map(|m| m.is_empty()).unwrap_or(true) => caps,
        _ => {
            log::error!("Failed to parse decision duration: {:?}", duration);
            return 0;
        }
    };

    let mut seconds: f64 = 0.0;
    if let Some(hours) = caps.get(2) {
        seconds += hours.as_str().parse::<f64>().unwrap_or(0.0) * 3600.0;
    }
    if let Some(minutes) = caps.get(3) {
        seconds += minutes.as_str().parse::<f64>().unwrap_or(0.0) * 60.0;
    }
    let mut seconds_part: f64 = 0.0;
    if let Some(secs) = caps.get(4) {
        seconds_part = secs.as_str().parse::<f64>().unwrap_or(0.0);
    }
    if caps.get(5).map(|m| m.as_str()) == Some("m") {
        // Unit is milliseconds
        seconds_part *= 0.001;
    }
    seconds += seconds_part;
    if caps.get(1).map(|m| m.as_str()) == Some("-") {
        seconds = -seconds;
    }

    seconds.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hours_only() {
        assert_eq!(parse_duration_to_seconds("149h"), 536_400);
    }

    #[test]
    fn test_negative_minutes() {
        assert_eq!(parse_duration_to_seconds("-45m"), -2_700);
    }

    #[test]
    fn test_milliseconds_rounded() {
        // 3*3600 + 24*60 + round(5957 * 0.001)
        assert_eq!(parse_duration_to_seconds("3h24m5957ms"), 12_246);
    }

    #[test]
    fn test_fractional_seconds_truncated() {
        // The .5565 fraction is matched but not accumulated
        assert_eq!(parse_duration_to_seconds("3h24m59.5565s"), 12_299);
        assert_eq!(parse_duration_to_seconds("1.5s"), 1);
    }

    #[test]
    fn test_plain_seconds() {
        assert_eq!(parse_duration_to_seconds("30s"), 30);
        assert_eq!(parse_duration_to_seconds("0s"), 0);
    }

    #[test]
    fn test_all_components() {
        assert_eq!(parse_duration_to_seconds("1h1m1s"), 3_661);
        assert_eq!(parse_duration_to_seconds("-1h30m"), -5_400);
    }

    #[test]
    fn test_garbage_returns_zero() {
        assert_eq!(parse_duration_to_seconds("garbage"), 0);
        assert_eq!(parse_duration_to_seconds(""), 0);
    }

    #[test]
    fn test_small_millisecond_count_rounds_down() {
        assert_eq!(parse_duration_to_seconds("3h24m100ms"), 12_240);
    }
}
