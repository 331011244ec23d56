use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

/// Source of "now" and of the zone used for day bucketing.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn timezone(&self) -> Tz;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

/// Manually advanced clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
    tz: Tz,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            now: Mutex::new(now),
            tz,
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}
