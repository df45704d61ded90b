//! Locale-free display helpers for sizes, speeds, and durations.

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

fn format_value(value: f64) -> String {
    if value <= 0.0 {
        return "0 B".to_string();
    }
    let mut value = value;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Formats a byte count with base-1024 units and two decimals.
pub fn format_size(bytes: u64) -> String {
    format_value(bytes as f64)
}

/// Formats a transfer speed as `{size}/s`.
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", format_value(bytes_per_sec))
}

/// Formats a remaining-time estimate, bucketed into seconds, minutes, or
/// hours.
pub fn format_remaining_time(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{}s", seconds.round() as u64)
    } else if seconds < 3600.0 {
        format!("{}min", (seconds / 60.0).round() as u64)
    } else {
        format!("{}h", (seconds / 3600.0).round() as u64)
    }
}
