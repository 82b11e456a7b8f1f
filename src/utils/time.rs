use serde::Deserialize;
use std::time::{Duration, Instant};

pub fn now_instant() -> Instant {
    Instant::now()
}

pub fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Granularity of a rate window: "N requests per one unit".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Length of a single unit.
    pub fn as_duration(self) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(1),
            TimeUnit::Microseconds => Duration::from_micros(1),
            TimeUnit::Milliseconds => Duration::from_millis(1),
            TimeUnit::Seconds => Duration::from_secs(1),
            TimeUnit::Minutes => Duration::from_secs(60),
            TimeUnit::Hours => Duration::from_secs(60 * 60),
            TimeUnit::Days => Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl From<TimeUnit> for Duration {
    fn from(unit: TimeUnit) -> Self {
        unit.as_duration()
    }
}
