use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Supplies "now" in the configured timezone. Recurrence math and the timer
/// loops only ever see time through this trait, so tests can drive them on
/// tokio's paused clock.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Tz>;
}

pub struct TzClock {
    timezone: Tz,
}

impl TzClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Clock for TzClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone)
    }
}
