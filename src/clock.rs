//! Time source and waiting.
//!
//! Every timestamp the lock protocol writes, and every settle or backoff wait
//! it performs, goes through a [`Clock`]. Production code uses
//! [`SystemClock`]; tests and simulations use [`ManualClock`], whose `sleep`
//! advances time instantly.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of the current time and of blocking waits.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Block the calling thread for `duration`. Non-positive durations return
    /// immediately.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time and real thread sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        if let Ok(std_duration) = duration.to_std() {
            std::thread::sleep(std_duration);
        }
    }
}

/// A clock that only moves when told to.
///
/// `sleep` advances the clock by the requested amount and returns without
/// blocking, so a full obtain/verify cycle with multi-second settle windows
/// runs in microseconds.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poison| poison.into_inner());
        *now += by;
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|poison| poison.into_inner());
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        if duration > Duration::zero() {
            self.advance(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_sleep_advances_time() {
        let start = Utc::now();
        let clock = ManualClock::new(start);

        clock.sleep(Duration::seconds(3));
        assert_eq!(clock.now(), start + Duration::seconds(3));

        clock.sleep(Duration::milliseconds(-5));
        assert_eq!(clock.now(), start + Duration::seconds(3));
    }

    #[test]
    fn manual_clock_set_and_advance() {
        let clock = ManualClock::starting_now();
        let target = Utc::now() + Duration::days(2);

        clock.set(target);
        clock.advance(Duration::minutes(1));
        assert_eq!(clock.now(), target + Duration::minutes(1));
    }

    #[test]
    fn system_clock_ignores_negative_sleep() {
        let clock = SystemClock;
        let before = clock.now();
        clock.sleep(Duration::seconds(-10));
        assert!(clock.now() - before < Duration::seconds(1));
    }
}
