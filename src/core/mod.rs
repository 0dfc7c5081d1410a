//! Agent core: registration, session state machine, heartbeat loop and host lifecycle.
//!
//! - [`registration`]: exactly-once registration of the control-plane API in an [`AgentContext`];
//! - [`session`]: [`SessionManager`] owns the session and interprets heartbeat results;
//! - [`scheduler`]: [`HeartbeatScheduler`] drives fixed-rate, non-overlapping beats;
//! - [`agent`]: [`Agent`] maps the host hooks onto the components above;
//! - [`config`]: [`AgentConfig`] thresholds and timings;
//! - `shutdown`: cross-platform shutdown signal handling.

pub mod agent;
mod builder;
pub mod config;
pub mod registration;
pub mod scheduler;
pub mod session;
mod shutdown;

pub use agent::Agent;
pub use builder::AgentBuilder;
pub use config::AgentConfig;
pub use registration::{AgentContext, Registration};
pub use scheduler::{Heartbeat, HeartbeatScheduler, Termination};
pub use session::{BeatOutcome, SessionManager, SessionParams, SessionSnapshot, SessionState};
