//! Error types used by the fleetlink agent.
//!
//! This module defines the error enums of each layer:
//!
//! - [`RegistrationError`]: misuse of the control-plane registration guard.
//! - [`ClientError`]: failures of a single control-plane RPC.
//! - [`SessionError`]: session state machine failures surfaced to the host.
//! - [`ConfigError`]: invalid agent configuration or environment.
//! - [`RuntimeError`]: top-level errors returned by [`Agent`](crate::Agent).
//!
//! Every type provides `as_label` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

use crate::core::SessionState;

/// # Errors produced by the registration guard.
///
/// Both variants are programmer misuse and are never silently swallowed.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    /// A control-plane handle was already registered for this context.
    #[error("control-plane handle already registered")]
    AlreadyRegistered,

    /// No control-plane handle has been registered yet.
    #[error("control-plane handle not registered; call setup first")]
    NotRegistered,
}

impl RegistrationError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use fleetlink::RegistrationError;
    ///
    /// assert_eq!(RegistrationError::AlreadyRegistered.as_label(), "already_registered");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistrationError::AlreadyRegistered => "already_registered",
            RegistrationError::NotRegistered => "not_registered",
        }
    }
}

/// # Errors produced by a single control-plane call.
///
/// The client never retries; the session manager decides what a failure means.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Connectivity problem or call timeout.
    #[error("transport error: {reason}")]
    Transport {
        /// The underlying error message.
        reason: String,
    },

    /// The controller does not recognise the session (authoritative).
    #[error("rejected by controller: {reason}")]
    Rejected {
        /// The underlying error message.
        reason: String,
    },

    /// Unexpected response shape or ordering.
    #[error("protocol violation: {reason}")]
    Protocol {
        /// What was wrong with the response.
        reason: String,
    },

    /// The request was refused locally before being sent.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Why the request is invalid.
        reason: String,
    },

    /// The endpoint cannot be used to build a channel.
    #[error("invalid endpoint: {reason}")]
    InvalidEndpoint {
        /// Why the endpoint is invalid.
        reason: String,
    },
}

impl ClientError {
    /// Shorthand for [`ClientError::Transport`].
    pub fn transport(reason: impl Into<String>) -> Self {
        ClientError::Transport {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ClientError::Rejected`].
    pub fn rejected(reason: impl Into<String>) -> Self {
        ClientError::Rejected {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ClientError::Protocol`].
    pub fn protocol(reason: impl Into<String>) -> Self {
        ClientError::Protocol {
            reason: reason.into(),
        }
    }

    /// Creates a transport error for an elapsed call timeout.
    pub fn timed_out(timeout: Duration) -> Self {
        ClientError::Transport {
            reason: format!("call timed out after {timeout:?}"),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ClientError::Transport { .. } => "client_transport",
            ClientError::Rejected { .. } => "client_rejected",
            ClientError::Protocol { .. } => "client_protocol",
            ClientError::InvalidRequest { .. } => "client_invalid_request",
            ClientError::InvalidEndpoint { .. } => "client_invalid_endpoint",
        }
    }

    /// Indicates whether the failure counts toward the degradation threshold.
    ///
    /// Returns `true` for [`ClientError::Transport`] and [`ClientError::Protocol`].
    ///
    /// # Example
    /// ```
    /// use fleetlink::ClientError;
    ///
    /// assert!(ClientError::transport("connection reset").is_transient());
    /// assert!(!ClientError::rejected("unknown session").is_transient());
    /// ```
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Transport { .. } | ClientError::Protocol { .. }
        )
    }
}

/// # Errors produced by the session state machine.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The operation is not valid in the current state.
    #[error("{op} is not valid in state {state}")]
    InvalidState {
        /// Operation that was attempted.
        op: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// Establishing the session failed; the manager is back in `Disconnected`.
    #[error("connection failed: {source}")]
    ConnectionFailed {
        /// The client failure that prevented the handshake.
        #[source]
        source: ClientError,
    },

    /// The session is gone (threshold crossed or rejected by the controller).
    #[error("session {session} lost: {reason}")]
    SessionLost {
        /// Identifier of the lost session.
        session: String,
        /// Why the session was considered lost.
        reason: String,
    },

    /// A status call on an established session failed.
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl SessionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SessionError::InvalidState { .. } => "session_invalid_state",
            SessionError::ConnectionFailed { .. } => "session_connection_failed",
            SessionError::SessionLost { .. } => "session_lost",
            SessionError::Client(e) => e.as_label(),
        }
    }

    /// Returns `true` for [`SessionError::SessionLost`].
    pub fn is_lost(&self) -> bool {
        matches!(self, SessionError::SessionLost { .. })
    }
}

/// # Invalid agent configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing environment variable {name}")]
    MissingVar {
        /// Variable name.
        name: &'static str,
    },

    /// An environment variable or field holds an unusable value.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Variable or field name.
        name: &'static str,
        /// Why the value was refused.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::MissingVar { .. } => "config_missing_var",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

/// # Errors returned to the host by the agent runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Registration misuse; the host should fail fast.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Session failure (connect failed, session lost, ...).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A control-plane call made on behalf of the host failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// OS signal listener could not be installed.
    #[error("failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),

    /// The controller asked the agent to terminate, or the session could not be recovered.
    #[error("agent terminated: {reason}")]
    Terminated {
        /// Human-readable termination reason.
        reason: String,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Registration(e) => e.as_label(),
            RuntimeError::Session(e) => e.as_label(),
            RuntimeError::Config(e) => e.as_label(),
            RuntimeError::Client(e) => e.as_label(),
            RuntimeError::Signal(_) => "runtime_signal",
            RuntimeError::Terminated { .. } => "runtime_terminated",
        }
    }
}
