//! # The RPC surface of the fleet controller.
//!
//! [`ControlPlane`] is the seam between the session logic and the wire. The
//! production implementation is the gRPC one in [`grpc`](super::grpc); tests
//! plug in in-memory fakes.
//!
//! ```text
//! Connector::dial(endpoint) ──► Arc<dyn ControlPlane>
//!                                   ├─ connect(HostDescriptor)     → ConnectAck
//!                                   ├─ heartbeat(HeartbeatRequest) → HeartbeatReply
//!                                   ├─ set_ready / set_running
//!                                   └─ request_stop
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::ControlPlaneEndpoint;
use crate::error::ClientError;

/// Identity the agent presents when opening a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostDescriptor {
    /// Server name as known to the host.
    pub name: String,
    /// Agent version.
    pub version: String,
}

impl HostDescriptor {
    /// Descriptor carrying this crate's version.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Controller answer to `Connect`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectAck {
    /// Session identifier assigned by the controller.
    pub session_id: String,
}

/// One heartbeat as sent on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeartbeatRequest {
    pub session_id: String,
    pub sequence: u64,
}

/// What the controller wants the agent to do next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Directive {
    #[default]
    Continue,
    Terminate,
}

/// Controller answer to `Heartbeat`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeartbeatReply {
    pub directive: Directive,
    /// Sequence number the controller is acknowledging.
    pub sequence: u64,
    /// Opaque configuration pushed by the controller.
    pub config_update: Option<Vec<u8>>,
}

impl HeartbeatReply {
    /// `Continue` acknowledgement without configuration.
    pub fn ack(sequence: u64) -> Self {
        Self {
            directive: Directive::Continue,
            sequence,
            config_update: None,
        }
    }
}

/// RPC surface of the fleet controller.
///
/// Implementations perform exactly one call per method: no retries, no
/// timeouts (both belong to the layers above).
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    async fn connect(&self, host: &HostDescriptor) -> Result<ConnectAck, ClientError>;

    async fn heartbeat(&self, request: HeartbeatRequest) -> Result<HeartbeatReply, ClientError>;

    async fn set_ready(&self, session_id: &str, ready: bool) -> Result<(), ClientError>;

    async fn set_running(&self, session_id: &str) -> Result<(), ClientError>;

    async fn request_stop(&self, session_id: &str) -> Result<(), ClientError>;
}

/// Opens channels to the controller.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Dials `endpoint` and returns a ready-to-use control plane.
    async fn dial(&self, endpoint: &ControlPlaneEndpoint)
    -> Result<Arc<dyn ControlPlane>, ClientError>;
}
