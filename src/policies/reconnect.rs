//! # What the agent does after losing its session.
//!
//! ```text
//! ReconnectPolicy::Never                  → Agent::run returns Terminated (default)
//! ReconnectPolicy::Backoff { backoff,     → reset session, wait backoff.delay(n),
//!                            max_attempts }  connect again; give up after max_attempts
//! ```
//!
//! The default is `Never`: a lost session usually means the controller has
//! already rescheduled this server, so the host is expected to shut down
//! rather than come back under a new identity.

use crate::policies::BackoffPolicy;

/// Policy applied by [`Agent::run`](crate::Agent::run) on `SessionLost`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum ReconnectPolicy {
    /// Surface the loss to the host and stop.
    #[default]
    Never,
    /// Try to establish a fresh session with backoff between attempts.
    Backoff {
        /// Delay schedule between attempts.
        backoff: BackoffPolicy,
        /// Maximum number of connect attempts per loss (`0` = unlimited).
        max_attempts: u32,
    },
}

impl ReconnectPolicy {
    /// Backoff with default delays and unlimited attempts.
    pub fn backoff() -> Self {
        ReconnectPolicy::Backoff {
            backoff: BackoffPolicy::default(),
            max_attempts: 0,
        }
    }

    /// Returns the backoff to use for the given 1-based attempt, or `None` when
    /// reconnecting is disabled or attempts are exhausted.
    pub fn schedule(&self, attempt: u32) -> Option<&BackoffPolicy> {
        match self {
            ReconnectPolicy::Never => None,
            ReconnectPolicy::Backoff {
                backoff,
                max_attempts,
            } => {
                if *max_attempts != 0 && attempt > *max_attempts {
                    None
                } else {
                    Some(backoff)
                }
            }
        }
    }
}
