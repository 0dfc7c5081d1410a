//! # Event subscribers for the fleetlink agent.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! SessionManager / HeartbeatScheduler / Agent
//!        │ publish(Event)
//!        ▼
//!       Bus ──► Agent listener ──► SubscriberSet::emit(&Event)
//!                                        │
//!                              ┌─────────┼─────────┐
//!                              ▼         ▼         ▼
//!                          LogWriter  Metrics   Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
