//! Background schedulers: periodic scans that turn world state into control
//! queue intents.
//!
//! Schedulers never mutate the world directly. Every decision they make is
//! enqueued as a [`ControlCommand`](crate::world::command::ControlCommand)
//! and re-validated by the control consumer before it takes effect, so a
//! scan working from a stale snapshot is harmless.

pub mod ai;
pub mod spawn;

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Time source for scan decisions. Injected so scheduler tests drive time
/// explicitly instead of sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-cranked clock for tests.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("manual clock lock poisoned");
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().expect("manual clock lock poisoned") = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("manual clock lock poisoned")
    }
}
