//! Reconnect policies.
//!
//! This module groups the knobs that control **whether** the agent tries to
//! recover a lost session and **how long** it waits between attempts.
//!
//! ## Contents
//! - [`ReconnectPolicy`] never / backoff after `SessionLost`
//! - [`BackoffPolicy`] how delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid thundering herd
//!
//! ## Defaults
//! - `ReconnectPolicy::Never`.
//! - `BackoffPolicy::default()` → first=1s, factor=2.0, max=60s, jitter=Equal.

mod backoff;
mod jitter;
mod reconnect;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use reconnect::ReconnectPolicy;
