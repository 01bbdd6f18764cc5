use crate::clock::Millis;

/// Lets an action through at most once per `min_interval_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiter {
    min_interval_ms: Millis,
    last: Option<Millis>,
}

impl RateLimiter {
    pub fn new(min_interval_ms: Millis) -> Self {
        Self {
            min_interval_ms,
            last: None,
        }
    }

    /// Starts the interval at `now`, so the first `try_acquire` waits a full period.
    pub fn primed(min_interval_ms: Millis, now: Millis) -> Self {
        Self {
            min_interval_ms,
            last: Some(now),
        }
    }

    /// Returns true and records `now` if the interval has elapsed.
    pub fn try_acquire(&mut self, now: Millis) -> bool {
        let ready = match self.last {
            None => true,
            // a clock that stepped back re-arms the limiter
            Some(last) if now < last => true,
            Some(last) => now - last >= self.min_interval_ms,
        };
        if ready {
            self.last = Some(now);
        }
        ready
    }

    /// Records `now` unconditionally (used for forced actions).
    pub fn mark(&mut self, now: Millis) {
        self.last = Some(now);
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn interval(&self) -> Millis {
        self.min_interval_ms
    }
}
