use std::time::Instant;

/// Derived throughput figures for one progress sample pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub speed_bytes_per_sec: f64,
    /// Seconds until completion at the current speed; `0.0` means unknown.
    pub remaining_time_secs: f64,
}

/// Derives instantaneous speed and remaining time from two loaded-byte
/// samples.
///
/// Pure: reads only its arguments, so it is safe to call from any task.
/// A non-positive elapsed interval or a regressing `loaded` yields a speed
/// of zero, and zero speed yields a remaining time of zero (callers treat
/// that as "unknown", not "instant").
pub fn estimate_progress(
    previous_loaded: u64,
    previous_at: Instant,
    loaded: u64,
    now: Instant,
    total: u64,
) -> Estimate {
    let elapsed = now.saturating_duration_since(previous_at).as_secs_f64();
    let speed = if elapsed > 0.0 {
        loaded.saturating_sub(previous_loaded) as f64 / elapsed
    } else {
        0.0
    };
    let remaining = if speed > 0.0 {
        total.saturating_sub(loaded) as f64 / speed
    } else {
        0.0
    };
    Estimate {
        speed_bytes_per_sec: speed,
        remaining_time_secs: remaining,
    }
}
