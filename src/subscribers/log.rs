//! # LogWriter: event renderer backed by `tracing`.
//!
//! A subscriber that turns incoming [`Event`]s into structured `tracing` records.
//! Install any `tracing` subscriber in the host to see them.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO fleetlink: session connected session="s-42"
//! WARN fleetlink: heartbeat missed session="s-42" sequence=7 failures=2 reason="connection reset"
//! WARN fleetlink: session degraded session="s-42" failures=3
//! ERROR fleetlink: session lost session="s-42" failures=6 reason="..."
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let session = e.session.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::SessionConnecting => {
                tracing::info!(target: "fleetlink", "connecting to controller");
            }
            EventKind::SessionConnected => {
                tracing::info!(target: "fleetlink", session, "session connected");
            }
            EventKind::ConnectFailed => {
                tracing::error!(target: "fleetlink", reason, "connect failed");
            }
            EventKind::SessionDegraded => {
                tracing::warn!(target: "fleetlink", session, failures = ?e.failures, "session degraded");
            }
            EventKind::SessionRecovered => {
                tracing::info!(target: "fleetlink", session, sequence = ?e.sequence, "session recovered");
            }
            EventKind::SessionLost => {
                tracing::error!(target: "fleetlink", session, failures = ?e.failures, reason, "session lost");
            }
            EventKind::SessionClosed => {
                tracing::info!(target: "fleetlink", session, "session closed");
            }
            EventKind::HeartbeatAcked => {
                tracing::debug!(target: "fleetlink", session, sequence = ?e.sequence, "heartbeat acknowledged");
            }
            EventKind::HeartbeatMissed => {
                tracing::warn!(
                    target: "fleetlink",
                    session,
                    sequence = ?e.sequence,
                    failures = ?e.failures,
                    reason,
                    "heartbeat missed"
                );
            }
            EventKind::ConfigUpdated => {
                tracing::info!(target: "fleetlink", session, size = ?e.size, "configuration update received");
            }
            EventKind::TerminateRequested => {
                tracing::warn!(target: "fleetlink", session, sequence = ?e.sequence, "controller requested termination");
            }
            EventKind::SchedulerStarted => {
                tracing::info!(
                    target: "fleetlink",
                    heart = e.source.as_deref().unwrap_or("-"),
                    interval_ms = ?e.interval_ms,
                    "heart started"
                );
            }
            EventKind::SchedulerStopped => {
                tracing::info!(
                    target: "fleetlink",
                    heart = e.source.as_deref().unwrap_or("-"),
                    reason,
                    "heart stopped"
                );
            }
            EventKind::ReconnectScheduled => {
                tracing::warn!(
                    target: "fleetlink",
                    attempt = ?e.attempt,
                    delay_ms = ?e.delay_ms,
                    reason,
                    "reconnect scheduled"
                );
            }
            EventKind::ShutdownRequested => {
                tracing::info!(target: "fleetlink", "shutdown requested");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "fleetlink", subscriber = e.source.as_deref().unwrap_or("unknown"), reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(target: "fleetlink", subscriber = e.source.as_deref().unwrap_or("unknown"), reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }

    fn queue_capacity(&self) -> usize {
        1024
    }
}
