//! # ControlPlaneClient: one bounded RPC per call.
//!
//! Wraps a dialed [`ControlPlane`] with the endpoint it was dialed from and a
//! per-call timeout.
//!
//! ## Rules
//! - Every call is bounded by `timeout`; an elapsed timeout is a
//!   [`ClientError::Transport`].
//! - Requests with an empty session id are refused locally
//!   ([`ClientError::InvalidRequest`]) and never reach the wire.
//! - No retries: the session manager owns retry policy.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time;

use crate::client::{
    ConnectAck, Connector, ControlPlane, ControlPlaneEndpoint, HeartbeatReply, HeartbeatRequest,
    HostDescriptor,
};
use crate::error::ClientError;

/// Bounded, non-retrying access to the fleet controller.
///
/// Cheap to clone; clones share the underlying channel.
#[derive(Clone)]
pub struct ControlPlaneClient {
    endpoint: Arc<ControlPlaneEndpoint>,
    plane: Arc<dyn ControlPlane>,
    timeout: Duration,
}

impl ControlPlaneClient {
    /// Wraps an already dialed control plane.
    pub fn new(
        endpoint: Arc<ControlPlaneEndpoint>,
        plane: Arc<dyn ControlPlane>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            plane,
            timeout,
        }
    }

    /// Dials `endpoint` through `connector`; the dial itself is bounded by `timeout`.
    pub async fn dial(
        connector: &dyn Connector,
        endpoint: Arc<ControlPlaneEndpoint>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let plane = bounded(timeout, connector.dial(&endpoint)).await?;
        Ok(Self::new(endpoint, plane, timeout))
    }

    /// Endpoint this client talks to.
    pub fn endpoint(&self) -> &ControlPlaneEndpoint {
        &self.endpoint
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Opens a session and returns the identifier assigned by the controller.
    ///
    /// An empty identifier is a protocol violation.
    pub async fn handshake(&self, host: &HostDescriptor) -> Result<ConnectAck, ClientError> {
        let ack = bounded(self.timeout, self.plane.connect(host)).await?;
        if ack.session_id.is_empty() {
            return Err(ClientError::protocol("controller assigned an empty session id"));
        }
        Ok(ack)
    }

    /// Sends one heartbeat for `session_id` carrying `sequence`.
    pub async fn send_heartbeat(
        &self,
        session_id: &str,
        sequence: u64,
    ) -> Result<HeartbeatReply, ClientError> {
        require_session(session_id)?;
        let request = HeartbeatRequest {
            session_id: session_id.to_string(),
            sequence,
        };
        bounded(self.timeout, self.plane.heartbeat(request)).await
    }

    /// Reports whether the server accepts players.
    pub async fn set_ready(&self, session_id: &str, ready: bool) -> Result<(), ClientError> {
        require_session(session_id)?;
        bounded(self.timeout, self.plane.set_ready(session_id, ready)).await
    }

    /// Reports that the server finished starting.
    pub async fn set_running(&self, session_id: &str) -> Result<(), ClientError> {
        require_session(session_id)?;
        bounded(self.timeout, self.plane.set_running(session_id)).await
    }

    /// Asks the controller to stop this server.
    pub async fn request_stop(&self, session_id: &str) -> Result<(), ClientError> {
        require_session(session_id)?;
        bounded(self.timeout, self.plane.request_stop(session_id)).await
    }
}

fn require_session(session_id: &str) -> Result<(), ClientError> {
    if session_id.is_empty() {
        return Err(ClientError::InvalidRequest {
            reason: "session id is empty".to_string(),
        });
    }
    Ok(())
}

async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_elapsed) => Err(ClientError::timed_out(timeout)),
    }
}
