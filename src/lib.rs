//! # fleetlink
//!
//! **fleetlink** is the agent a game server embeds to stay known to its fleet
//! controller. It registers a control-plane API handle exactly once, opens a
//! session with the controller, and keeps it alive with fixed-rate,
//! cancellable heartbeats that never overlap.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   host hooks: on_load / on_enable / on_disable / run
//!                           │
//!                           ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Agent                                                            │
//! │  - AgentContext (Registration<dyn CloudApi>, set exactly once)    │
//! │  - CloudHandle  (set_ready / set_running / request_stop)          │
//! │  - ReconnectPolicy applied on Termination::Lost                   │
//! └──────┬───────────────────────────────┬────────────────────────────┘
//!        │ start/stop/join               │ connect/disconnect/reset
//!        ▼                               ▼
//! ┌──────────────────────┐  beat()  ┌──────────────────────────────┐
//! │  HeartbeatScheduler  │ ───────► │  SessionManager              │
//! │  (spawned loop,      │          │  Disconnected → Connecting → │
//! │   interval + Skip)   │ ◄─────── │  Active ⇄ Degraded → Closed  │
//! └──────────┬───────────┘ outcome  └──────────────┬───────────────┘
//!            │ Termination (mpsc)                  │ send_heartbeat(id, seq)
//!            ▼                                     ▼
//!          Agent::run                   ┌──────────────────────────┐
//!                                       │  ControlPlaneClient      │
//!                                       │  (timeout, no retries)   │
//!                                       └────────────┬─────────────┘
//!                                                    ▼
//!                                       ControlPlane (gRPC / tonic)
//!
//! All components ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                              ├─► LogWriter
//!                                                              └─► custom
//! ```
//!
//! ### Failure handling
//! ```text
//! beat() result
//!   ├─ ack (sequence matches)     → failures = 0, Degraded → Active
//!   ├─ Transport / Protocol       → failures += 1
//!   │     ├─ failures ≥ degrade_after → Degraded
//!   │     └─ failures ≥ lose_after    → Closed, SessionLost
//!   └─ Rejected                   → Closed, SessionLost
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                         |
//! |-------------------|----------------------------------------------------------|--------------------------------------------|
//! | **Lifecycle**     | Host hooks wiring everything together.                   | [`Agent`], [`AgentBuilder`]                |
//! | **Registration**  | Exactly-once control-plane handle in an explicit context.| [`AgentContext`], [`Registration`]         |
//! | **Session**       | State machine, thresholds, sequence validation.          | [`SessionManager`], [`SessionState`]       |
//! | **Heartbeat**     | Fixed-rate, non-overlapping, cancellable ticks.          | [`HeartbeatScheduler`], [`Heartbeat`]      |
//! | **Client**        | Bounded RPCs and the gRPC transport.                     | [`ControlPlaneClient`], [`GrpcConnector`]  |
//! | **Subscriber API**| Hook into runtime events.                                | [`Subscribe`], [`Event`]                   |
//! | **Policies**      | Reconnect behaviour after session loss.                  | [`ReconnectPolicy`], [`BackoffPolicy`]     |
//! | **Errors**        | Typed errors per layer.                                  | [`SessionError`], [`RuntimeError`]         |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] that renders events via `tracing`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use fleetlink::{AgentBuilder, AgentConfig, ControlPlaneEndpoint, HostDescriptor, Subscribe};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint = ControlPlaneEndpoint::from_env()?;
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(fleetlink::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//!
//!     let agent = AgentBuilder::new(AgentConfig::default(), endpoint, HostDescriptor::new("lobby-1"))
//!         .with_subscribers(subs)
//!         .build()?;
//!
//!     agent.on_load().await?;
//!     agent.on_enable().await?;
//!     let outcome = agent.run().await;
//!     agent.on_disable().await?;
//!     outcome?;
//!     Ok(())
//! }
//! ```
mod api;
mod client;
mod core;
mod error;
mod events;
mod policies;
mod subscribers;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use crate::api::{CloudApi, CloudHandle};
pub use crate::client::{
    ConnectAck, Connector, ControlPlane, ControlPlaneClient, ControlPlaneEndpoint, Directive,
    GrpcConnector, GrpcControlPlane, HeartbeatReply, HeartbeatRequest, HostDescriptor,
};
pub use crate::core::{
    Agent, AgentBuilder, AgentConfig, AgentContext, BeatOutcome, Heartbeat, HeartbeatScheduler,
    Registration, SessionManager, SessionParams, SessionSnapshot, SessionState, Termination,
};
pub use crate::error::{ClientError, ConfigError, RegistrationError, RuntimeError, SessionError};
pub use crate::events::{Bus, Event, EventKind};
pub use crate::policies::{BackoffPolicy, JitterPolicy, ReconnectPolicy};
pub use crate::subscribers::{Subscribe, SubscriberSet};

/// Wire messages of the `fleetlink.v1` gRPC service.
pub use crate::client::grpc::proto;

// Optional: built-in subscriber that renders events through `tracing`.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use crate::subscribers::LogWriter;
