//! Simulated clock

use std::sync::Mutex;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::clock::Clock;

/// A clock which only moves when something sleeps on it.
///
/// A cancellation can be scheduled for a point in simulated time, which is how tests stop a ramp
/// part way through.
#[derive(Debug, Default)]
pub struct SimClock {
    now: Mutex<Duration>,
    cancel_at: Mutex<Option<(Duration, CancelToken)>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel `token` once the clock reaches `at`.
    pub fn cancel_at(&self, at: Duration, token: CancelToken) {
        if let Ok(mut c) = self.cancel_at.lock() {
            *c = Some((at, token));
        }
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        match self.now.lock() {
            Ok(n) => *n,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn sleep(&self, duration: Duration) {
        let now = match self.now.lock() {
            Ok(mut n) => {
                *n += duration;
                *n
            }
            Err(_) => return,
        };

        if let Ok(mut c) = self.cancel_at.lock() {
            if let Some((at, token)) = c.as_ref() {
                if now >= *at {
                    token.cancel();
                    *c = None;
                }
            }
        }
    }
}
