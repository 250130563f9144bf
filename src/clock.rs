use chrono::{DateTime, Duration, Utc};
use tokio::time::Instant;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time anchored once and then advanced by the tokio timer.
///
/// Timestamps therefore agree with `tokio::time::sleep`, also under a paused
/// test runtime, and do not jump when the system clock is adjusted.
pub struct TokioClock {
    anchor: DateTime<Utc>,
    started: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    pub fn anchored_at(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            started: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Duration::from_std(self.started.elapsed()).unwrap_or_else(|_| Duration::zero());
        self.anchor + elapsed
    }
}

/// Converts a (possibly negative) number of seconds into a sleep duration.
pub fn seconds_to_std(seconds: f64) -> std::time::Duration {
    if seconds.is_finite() && seconds > 0.0 {
        std::time::Duration::try_from_secs_f64(seconds).unwrap_or(std::time::Duration::MAX)
    } else {
        std::time::Duration::ZERO
    }
}

/// Fractional seconds between two timestamps, `later - earlier`.
pub fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let delta = later.signed_duration_since(earlier);
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_seconds() as f64,
    }
}

/// Offsets a timestamp by fractional seconds, saturating at the range of
/// representable timestamps.
pub fn add_seconds(time: DateTime<Utc>, seconds: f64) -> DateTime<Utc> {
    let micros = (seconds * 1_000_000.0).round() as i64;
    let saturated = if micros < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    };
    time.checked_add_signed(Duration::microseconds(micros))
        .unwrap_or(saturated)
}
