//! Time source
//!
//! Services read "now" through [`Clock`] so tests can pin it.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and tooling
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
        *self.time.lock().unwrap_or_else(|e| e.into_inner()) = time;
    }

    pub fn advance(&self, by: Duration) {
        let mut time = self.time.lock().unwrap_or_else(|e| e.into_inner());
        *time += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.lock().unwrap_or_else(|e| e.into_inner())
    }
}
