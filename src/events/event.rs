//! # Runtime events emitted by the session manager, scheduler and agent.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Session events**: connect, degrade, recover, loss, close
//! - **Heartbeat events**: acknowledged or missed beats, controller directives
//! - **Scheduler / agent events**: start, stop, reconnect, shutdown
//! - **Subscriber events**: overflow and panic of event subscribers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, session
//! identifier, heartbeat sequence numbers, failure counters and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//! It is unrelated to the per-session heartbeat `sequence`.
//!
//! ## Example
//! ```rust
//! use fleetlink::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::HeartbeatMissed)
//!     .with_session("s-42")
//!     .with_sequence(7)
//!     .with_failures(2)
//!     .with_reason("connection reset");
//!
//! assert_eq!(ev.kind, EventKind::HeartbeatMissed);
//! assert_eq!(ev.session.as_deref(), Some("s-42"));
//! assert_eq!(ev.sequence, Some(7));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Session events ===
    /// `connect()` started dialing the controller.
    SessionConnecting,

    /// Handshake succeeded.
    ///
    /// Sets:
    /// - `session`: identifier assigned by the controller
    SessionConnected,

    /// Dial or handshake failed; the manager is back in `Disconnected`.
    ///
    /// Sets:
    /// - `reason`: client failure
    ConnectFailed,

    /// Consecutive failures reached the degrade threshold.
    ///
    /// Sets:
    /// - `session`, `failures`
    SessionDegraded,

    /// A heartbeat succeeded while degraded.
    ///
    /// Sets:
    /// - `session`, `sequence`
    SessionRecovered,

    /// The session is gone (loss threshold or rejection).
    ///
    /// Sets:
    /// - `session`, `failures`, `reason`
    SessionLost,

    /// `disconnect()` finished; the session is closed.
    ///
    /// Sets:
    /// - `session` (if one was established)
    SessionClosed,

    // === Heartbeat events ===
    /// The controller acknowledged a heartbeat.
    ///
    /// Sets:
    /// - `session`, `sequence`
    HeartbeatAcked,

    /// A heartbeat failed transiently and was absorbed.
    ///
    /// Sets:
    /// - `session`, `sequence`, `failures`, `reason`
    HeartbeatMissed,

    /// The controller attached a configuration update to a heartbeat reply.
    ///
    /// Sets:
    /// - `session`, `sequence`, `size`: payload length in bytes
    ConfigUpdated,

    /// The controller answered a heartbeat with a `Terminate` directive.
    ///
    /// Sets:
    /// - `session`, `sequence`
    TerminateRequested,

    // === Scheduler / agent events ===
    /// The heartbeat scheduler started ticking.
    ///
    /// Sets:
    /// - `source`: heartbeat name
    /// - `interval_ms`
    SchedulerStarted,

    /// The heartbeat scheduler loop exited.
    ///
    /// Sets:
    /// - `source`: heartbeat name
    /// - `reason`: why it stopped
    SchedulerStopped,

    /// A reconnect attempt was scheduled after session loss.
    ///
    /// Sets:
    /// - `attempt`, `delay_ms`, `reason`
    ReconnectScheduled,

    /// Host shutdown requested (OS signal or lifecycle hook).
    ShutdownRequested,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Session identifier, if applicable.
    pub session: Option<Arc<str>>,
    /// Emitting component (subscriber or heartbeat name).
    pub source: Option<Arc<str>>,
    /// Heartbeat sequence number.
    pub sequence: Option<u64>,
    /// Consecutive failure counter after this event.
    pub failures: Option<u32>,
    /// Reconnect attempt (starting from 1).
    pub attempt: Option<u32>,
    /// Delay before the next reconnect attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Scheduler interval in milliseconds (compact).
    pub interval_ms: Option<u32>,
    /// Payload size in bytes.
    pub size: Option<usize>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            session: None,
            source: None,
            sequence: None,
            failures: None,
            attempt: None,
            delay_ms: None,
            interval_ms: None,
            size: None,
            reason: None,
        }
    }

    /// Attaches a session identifier.
    #[inline]
    pub fn with_session(mut self, session: impl Into<Arc<str>>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Attaches the emitting component name.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches a heartbeat sequence number.
    #[inline]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Attaches the consecutive failure counter.
    #[inline]
    pub fn with_failures(mut self, failures: u32) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Attaches a reconnect attempt number.
    #[inline]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Attaches a reconnect delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a scheduler interval (stored as milliseconds).
    #[inline]
    pub fn with_interval(mut self, d: Duration) -> Self {
        self.interval_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a payload size.
    #[inline]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_source(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_source(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}
