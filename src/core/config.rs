//! # Agent configuration.
//!
//! Provides [`AgentConfig`] centralized settings for the session manager,
//! the heartbeat scheduler and the agent lifecycle.
//!
//! ## Sentinel values
//! - `rpc_timeout = 0s` → use the heartbeat interval
//! - `grace = 0s` → do not wait for an in-flight beat on shutdown

use std::time::Duration;

use crate::error::ConfigError;
use crate::policies::ReconnectPolicy;

/// Configuration of the embedded agent.
///
/// ## Field semantics
/// - `interval`: time between heartbeat ticks (fixed-rate)
/// - `rpc_timeout`: per-call timeout, never larger than `interval`
/// - `degrade_after`: consecutive failures that mark the session `Degraded`
/// - `lose_after`: consecutive failures that close the session (`> degrade_after`)
/// - `reconnect`: what to do after `SessionLost`
/// - `grace`: how long shutdown waits for an in-flight beat
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `auto_ready`: mark the server ready when the host finishes enabling
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Heartbeat period.
    pub interval: Duration,

    /// Timeout applied to every control-plane call.
    pub rpc_timeout: Duration,

    /// Consecutive failures before `Active → Degraded`.
    pub degrade_after: u32,

    /// Consecutive failures before the session is considered lost.
    pub lose_after: u32,

    /// Reaction to session loss.
    pub reconnect: ReconnectPolicy,

    /// Maximum wait for the scheduler loop to exit on shutdown.
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,

    /// Report readiness automatically from `Agent::on_enable`.
    pub auto_ready: bool,
}

impl AgentConfig {
    /// Effective per-call timeout.
    ///
    /// `0s` and anything above `interval` resolve to `interval`, so a call can
    /// never outlive the tick that issued it by more than one period.
    #[inline]
    pub fn effective_rpc_timeout(&self) -> Duration {
        if self.rpc_timeout == Duration::ZERO {
            self.interval
        } else {
            self.rpc_timeout.min(self.interval)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Checks the invariants the session manager relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval == Duration::ZERO {
            return Err(ConfigError::Invalid {
                name: "interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.degrade_after == 0 {
            return Err(ConfigError::Invalid {
                name: "degrade_after",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.lose_after <= self.degrade_after {
            return Err(ConfigError::Invalid {
                name: "lose_after",
                reason: format!(
                    "must be greater than degrade_after ({} <= {})",
                    self.lose_after, self.degrade_after
                ),
            });
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    /// Default configuration:
    ///
    /// - `interval = 10s`
    /// - `rpc_timeout = 5s`
    /// - `degrade_after = 3`, `lose_after = 6`
    /// - `reconnect = ReconnectPolicy::Never`
    /// - `grace = 5s`
    /// - `bus_capacity = 1024`
    /// - `auto_ready = true`
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(5),
            degrade_after: 3,
            lose_after: 6,
            reconnect: ReconnectPolicy::default(),
            grace: Duration::from_secs(5),
            bus_capacity: 1024,
            auto_ready: true,
        }
    }
}
