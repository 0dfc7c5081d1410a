//! # SessionManager: the session state machine.
//!
//! Owns at most one control-plane session and interprets every heartbeat
//! result. The scheduler only decides *when* to beat; this module decides
//! what a success or a failure *means*.
//!
//! ## States
//! ```text
//!                connect()               handshake ok
//! Disconnected ───────────► Connecting ───────────────► Active ◄──┐
//!      ▲                        │ dial/handshake failed     │      │ beat ok
//!      └────────────────────────┘                           │      │
//!      │                                  failures ≥ degrade │      │
//!      │ reset()                                             ▼      │
//!      │                                                  Degraded ─┘
//!      │                                                     │
//!      │               failures ≥ lose_after or Rejected     │
//!    Closed ◄────────────────────────────────────────────────┘
//!      ▲
//!      └── ShuttingDown ◄── disconnect() (from any other state)
//! ```
//!
//! ## Rules
//! - Every heartbeat attempt consumes one sequence number; the first is `0`.
//! - A reply must echo the sequence that was sent, otherwise it counts as a
//!   protocol failure. A replayed acknowledgement therefore never passes.
//! - `Transport`/`Protocol` failures are absorbed below `lose_after`;
//!   `Rejected` closes the session immediately.
//! - The session mutex is never held across an RPC. A result is applied only
//!   if the session that issued the request is still the current one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::client::{
    ConnectAck, Connector, ControlPlaneClient, ControlPlaneEndpoint, Directive, HeartbeatReply,
    HostDescriptor,
};
use crate::core::config::AgentConfig;
use crate::core::scheduler::Heartbeat;
use crate::error::{ClientError, SessionError};
use crate::events::{Bus, Event, EventKind};

/// Lifecycle state of a [`SessionManager`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Active,
    Degraded,
    ShuttingDown,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Degraded => "degraded",
            SessionState::ShuttingDown => "shutting_down",
            SessionState::Closed => "closed",
        }
    }

    /// `true` for states in which heartbeats and status calls are allowed.
    pub fn is_established(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Degraded)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a heartbeat that did not lose the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BeatOutcome {
    /// The controller acknowledged `sequence`.
    Acknowledged {
        sequence: u64,
        directive: Directive,
    },
    /// The beat failed transiently; `failures` is the consecutive count so far.
    Missed { sequence: u64, failures: u32 },
}

/// Point-in-time copy of the session, for diagnostics and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Identifier assigned by the controller, while a session exists.
    pub session_id: Option<String>,
    /// Consecutive heartbeat failures.
    pub failures: u32,
    /// Sequence number the next heartbeat will carry.
    pub next_sequence: u64,
    pub last_acked: Option<u64>,
    /// When the last heartbeat was acknowledged.
    pub last_heartbeat: Option<Instant>,
    /// Last configuration pushed by the controller.
    pub config: Option<Vec<u8>>,
}

/// Thresholds and timeouts of the session state machine.
#[derive(Clone, Copy, Debug)]
pub struct SessionParams {
    /// Per-call timeout handed to the [`ControlPlaneClient`].
    pub rpc_timeout: Duration,
    pub degrade_after: u32,
    pub lose_after: u32,
}

impl From<&AgentConfig> for SessionParams {
    fn from(cfg: &AgentConfig) -> Self {
        Self {
            rpc_timeout: cfg.effective_rpc_timeout(),
            degrade_after: cfg.degrade_after,
            lose_after: cfg.lose_after,
        }
    }
}

/// A session established with the controller.
struct Live {
    id: Arc<str>,
    client: ControlPlaneClient,
    next_sequence: u64,
    last_acked: Option<u64>,
    failures: u32,
    last_heartbeat: Option<Instant>,
    config: Option<Vec<u8>>,
}

struct Inner {
    state: SessionState,
    /// Bumped on every `connect()`; identifies which session issued an RPC.
    epoch: u64,
    live: Option<Live>,
}

/// Owns the session with the fleet controller.
///
/// All methods take `&self`; lifecycle calls and heartbeat ticks may come
/// from different tasks.
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    endpoint: Arc<ControlPlaneEndpoint>,
    host: HostDescriptor,
    params: SessionParams,
    bus: Bus,
    inner: Mutex<Inner>,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        endpoint: Arc<ControlPlaneEndpoint>,
        host: HostDescriptor,
        params: SessionParams,
        bus: Bus,
    ) -> Self {
        Self {
            connector,
            endpoint,
            host,
            params,
            bus,
            inner: Mutex::new(Inner {
                state: SessionState::Disconnected,
                epoch: 0,
                live: None,
            }),
        }
    }

    /// Dials the controller and opens a session; returns its identifier.
    ///
    /// Valid only from `Disconnected`. On failure the manager is back in
    /// `Disconnected` and the caller decides whether to retry.
    pub async fn connect(&self) -> Result<String, SessionError> {
        let epoch = {
            let mut inner = self.inner.lock().await;
            if inner.state != SessionState::Disconnected {
                return Err(SessionError::InvalidState {
                    op: "connect",
                    state: inner.state,
                });
            }
            inner.state = SessionState::Connecting;
            inner.epoch += 1;
            inner.epoch
        };
        self.bus.publish(Event::new(EventKind::SessionConnecting));
        tracing::debug!(address = %self.endpoint.address(), "connecting to controller");

        let established = self.establish().await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch || inner.state != SessionState::Connecting {
            // disconnect() won the race; the fresh channel is dropped here.
            return Err(SessionError::InvalidState {
                op: "connect",
                state: inner.state,
            });
        }

        match established {
            Ok((client, ack)) => {
                let id: Arc<str> = Arc::from(ack.session_id);
                inner.state = SessionState::Active;
                inner.live = Some(Live {
                    id: id.clone(),
                    client,
                    next_sequence: 0,
                    last_acked: None,
                    failures: 0,
                    last_heartbeat: None,
                    config: None,
                });
                self.bus
                    .publish(Event::new(EventKind::SessionConnected).with_session(id.clone()));
                Ok(id.to_string())
            }
            Err(source) => {
                inner.state = SessionState::Disconnected;
                self.bus
                    .publish(Event::new(EventKind::ConnectFailed).with_reason(source.to_string()));
                Err(SessionError::ConnectionFailed { source })
            }
        }
    }

    async fn establish(&self) -> Result<(ControlPlaneClient, ConnectAck), ClientError> {
        let client = ControlPlaneClient::dial(
            self.connector.as_ref(),
            self.endpoint.clone(),
            self.params.rpc_timeout,
        )
        .await?;
        let ack = client.handshake(&self.host).await?;
        Ok((client, ack))
    }

    /// Sends one heartbeat with the next sequence number and applies the result.
    ///
    /// Valid from `Active` and `Degraded`.
    pub async fn beat(&self) -> Result<BeatOutcome, SessionError> {
        let (epoch, id, client, sequence) = {
            let mut inner = self.inner.lock().await;
            let state = inner.state;
            let epoch = inner.epoch;
            match inner.live.as_mut() {
                Some(live) if state.is_established() => {
                    let sequence = live.next_sequence;
                    live.next_sequence += 1;
                    (epoch, live.id.clone(), live.client.clone(), sequence)
                }
                _ => return Err(SessionError::InvalidState { op: "beat", state }),
            }
        };

        let result = client.send_heartbeat(&id, sequence).await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch || !inner.state.is_established() {
            return Err(SessionError::InvalidState {
                op: "beat",
                state: inner.state,
            });
        }
        self.apply(&mut inner, sequence, result)
    }

    fn apply(
        &self,
        inner: &mut Inner,
        sequence: u64,
        result: Result<HeartbeatReply, ClientError>,
    ) -> Result<BeatOutcome, SessionError> {
        let Some(live) = inner.live.as_mut() else {
            return Err(SessionError::InvalidState {
                op: "beat",
                state: inner.state,
            });
        };
        let result = result.and_then(|reply| check_sequence(reply, sequence));

        match result {
            Ok(reply) => {
                live.failures = 0;
                live.last_acked = Some(sequence);
                live.last_heartbeat = Some(Instant::now());
                let id = live.id.clone();

                if inner.state == SessionState::Degraded {
                    inner.state = SessionState::Active;
                    self.bus.publish(
                        Event::new(EventKind::SessionRecovered)
                            .with_session(id.clone())
                            .with_sequence(sequence),
                    );
                }
                self.bus.publish(
                    Event::new(EventKind::HeartbeatAcked)
                        .with_session(id.clone())
                        .with_sequence(sequence),
                );
                if let Some(config) = reply.config_update {
                    self.bus.publish(
                        Event::new(EventKind::ConfigUpdated)
                            .with_session(id.clone())
                            .with_sequence(sequence)
                            .with_size(config.len()),
                    );
                    if let Some(live) = inner.live.as_mut() {
                        live.config = Some(config);
                    }
                }
                if reply.directive == Directive::Terminate {
                    self.bus.publish(
                        Event::new(EventKind::TerminateRequested)
                            .with_session(id)
                            .with_sequence(sequence),
                    );
                }
                Ok(BeatOutcome::Acknowledged {
                    sequence,
                    directive: reply.directive,
                })
            }
            Err(err) if err.is_transient() => {
                live.failures += 1;
                let failures = live.failures;
                let id = live.id.clone();

                if failures >= self.params.lose_after {
                    let reason = format!("{failures} consecutive heartbeat failures, last: {err}");
                    return Err(self.lose(inner, failures, reason));
                }
                self.bus.publish(
                    Event::new(EventKind::HeartbeatMissed)
                        .with_session(id.clone())
                        .with_sequence(sequence)
                        .with_failures(failures)
                        .with_reason(err.to_string()),
                );
                if failures >= self.params.degrade_after && inner.state == SessionState::Active {
                    inner.state = SessionState::Degraded;
                    self.bus.publish(
                        Event::new(EventKind::SessionDegraded)
                            .with_session(id)
                            .with_failures(failures),
                    );
                }
                Ok(BeatOutcome::Missed { sequence, failures })
            }
            Err(err @ ClientError::Rejected { .. }) => {
                let failures = live.failures;
                Err(self.lose(inner, failures, err.to_string()))
            }
            Err(err) => Err(SessionError::Client(err)),
        }
    }

    /// Closes the session after loss and builds the error reported to the caller.
    fn lose(&self, inner: &mut Inner, failures: u32, reason: String) -> SessionError {
        inner.state = SessionState::Closed;
        let session = inner
            .live
            .take()
            .map(|live| live.id.to_string())
            .unwrap_or_default();

        tracing::warn!(session = %session, %reason, "session lost");
        self.bus.publish(
            Event::new(EventKind::SessionLost)
                .with_session(session.as_str())
                .with_failures(failures)
                .with_reason(reason.as_str()),
        );
        SessionError::SessionLost { session, reason }
    }

    /// Tears the session down. Idempotent once `Closed`.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let live = {
            let mut inner = self.inner.lock().await;
            if inner.state == SessionState::Closed {
                return Ok(());
            }
            inner.state = SessionState::ShuttingDown;
            inner.live.take()
        };

        let session = live.as_ref().map(|l| l.id.clone());
        drop(live);

        self.inner.lock().await.state = SessionState::Closed;
        let ev = Event::new(EventKind::SessionClosed);
        self.bus.publish(match session {
            Some(id) => ev.with_session(id),
            None => ev,
        });
        Ok(())
    }

    /// Moves a `Closed` manager back to `Disconnected` so it can connect again.
    pub async fn reset(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Closed {
            return Err(SessionError::InvalidState {
                op: "reset",
                state: inner.state,
            });
        }
        inner.state = SessionState::Disconnected;
        Ok(())
    }

    /// Client and session id of the established session.
    pub async fn client(&self) -> Result<(String, ControlPlaneClient), SessionError> {
        let inner = self.inner.lock().await;
        match inner.live.as_ref() {
            Some(live) if inner.state.is_established() => {
                Ok((live.id.to_string(), live.client.clone()))
            }
            _ => Err(SessionError::InvalidState {
                op: "client",
                state: inner.state,
            }),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        let live = inner.live.as_ref();
        SessionSnapshot {
            state: inner.state,
            session_id: live.map(|l| l.id.to_string()),
            failures: live.map_or(0, |l| l.failures),
            next_sequence: live.map_or(0, |l| l.next_sequence),
            last_acked: live.and_then(|l| l.last_acked),
            last_heartbeat: live.and_then(|l| l.last_heartbeat),
            config: live.and_then(|l| l.config.clone()),
        }
    }

    pub fn host(&self) -> &HostDescriptor {
        &self.host
    }
}

#[async_trait]
impl Heartbeat for SessionManager {
    fn name(&self) -> &str {
        &self.host.name
    }

    async fn beat(&self) -> Result<BeatOutcome, SessionError> {
        SessionManager::beat(self).await
    }
}

/// Sequences only grow, so an exact echo is always newer than the last ack.
fn check_sequence(reply: HeartbeatReply, sent: u64) -> Result<HeartbeatReply, ClientError> {
    if reply.sequence != sent {
        return Err(ClientError::protocol(format!(
            "reply acknowledges sequence {} but {sent} was sent",
            reply.sequence
        )));
    }
    Ok(reply)
}
