//! Clock abstraction
//!
//! Timestamps, retention windows, idle sweeps and escalation delays all read
//! time through [`Clock`], so tests can drive them deterministically with a
//! [`ManualClock`].

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use std::fmt::Debug;
use std::time::Duration;

/// A source of wall-clock time
pub trait Clock: Send + Sync + Debug {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a manual clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Create a manual clock frozen at the current system time
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let step =
            ChronoDuration::from_std(by).unwrap_or_else(|_| ChronoDuration::days(365 * 100));
        let mut now = self.now.write();
        *now = now.checked_add_signed(step).unwrap_or(*now);
    }

    /// Jump to an absolute time
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// Milliseconds elapsed from `earlier` to `later`, never negative
pub(crate) fn elapsed_ms(earlier: DateTime<Utc>, later: DateTime<Utc>) -> u64 {
    (later - earlier).num_milliseconds().max(0) as u64
}

/// Whether at least `window` has passed between `since` and `now`
pub(crate) fn has_elapsed(since: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    elapsed_ms(since, now) >= u64::try_from(window.as_millis()).unwrap_or(u64::MAX)
}
