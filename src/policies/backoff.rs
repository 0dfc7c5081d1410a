//! # Backoff between reconnect attempts.
//!
//! [`BackoffPolicy`] controls how long the agent waits before trying to
//! re-establish a lost session. The delay for attempt `n` (0-indexed) is
//! `first × factor^n`, clamped to `max`, then jitter is applied. The base is
//! derived from the attempt number alone, so jitter never feeds back into
//! later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use fleetlink::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(1),
//!     max: Duration::from_secs(30),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay(0), Duration::from_secs(1));
//! assert_eq!(backoff.delay(3), Duration::from_secs(8));
//! assert_eq!(backoff.delay(10), Duration::from_secs(30));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Reconnect backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect attempt.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization applied to each delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 1s`, `factor = 2.0`, `max = 60s`, equal jitter.
    ///
    /// A whole fleet losing the controller at once reconnects spread out
    /// rather than in lockstep.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(60),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay before reconnect attempt `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.base(attempt))
    }

    /// Delay before jitter: `first × factor^attempt`, clamped to `max`.
    ///
    /// Non-finite or negative intermediate values clamp to `max`.
    pub fn base(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
