//! Wall clock and sleeper.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of time for cooldowns, timeouts, and waits.
///
/// Tests substitute a manual clock whose `sleep` advances `now` instantly.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
