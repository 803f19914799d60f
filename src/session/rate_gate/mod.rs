
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// Result of asking the gate for a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Limited { retry_after: Duration },
}

/// Single-slot fixed-window limiter.
///
/// A call is admitted once at least `cooldown` has passed since the last
/// admitted call. Rejected calls do not move the window.
#[derive(Debug, Clone)]
pub struct RateGate {
    cooldown: Duration,
    last_call: Option<DateTime<Utc>>,
}

impl RateGate {
    #[inline]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_call: None,
        }
    }

    #[inline]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Timestamp of the last admitted call
    #[inline]
    pub fn last_call(&self) -> Option<DateTime<Utc>> {
        self.last_call
    }

    /// Try to take the slot at wall-clock time `now`
    #[inline]
    pub fn check_at(&mut self, now: DateTime<Utc>) -> Admission {
        if let Some(last_call) = self.last_call {
            // A clock that moved backwards counts as no time elapsed
            let elapsed = (now - last_call).to_std().unwrap_or(Duration::ZERO);
            if elapsed < self.cooldown {
                let retry_after = self.cooldown - elapsed;
                debug!("Rate gate closed for another {:?}", retry_after);
                return Admission::Limited { retry_after };
            }
        }

        self.last_call = Some(now);
        Admission::Allowed
    }

    #[inline]
    pub fn check(&mut self) -> Admission {
        self.check_at(Utc::now())
    }

    /// Forget the last admitted call
    #[inline]
    pub fn reset(&mut self) {
        self.last_call = None;
    }
}
