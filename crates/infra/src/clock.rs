//! Time source for the orchestrator.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Abstracts "now" so ledger timestamps and container codes are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct FixedClock {
    time: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    pub fn set(&self, time: DateTime<Utc>) {
        if let Ok(mut t) = self.time.lock() {
            *t = time;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut t) = self.time.lock() {
            *t += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.time.lock() {
            Ok(t) => *t,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
