//! Control-plane client: endpoint, RPC surface and the gRPC transport.
//!
//! ## Contents
//! - [`ControlPlaneEndpoint`] immutable address/credentials (env loading)
//! - [`ControlPlane`], [`Connector`] the RPC seam and how channels are opened
//! - [`ControlPlaneClient`] bounded, non-retrying calls used by the session manager
//! - [`grpc`] `tonic` implementation of the seam

#[allow(clippy::module_inception)]
mod client;
mod endpoint;
pub mod grpc;
mod transport;

pub use client::ControlPlaneClient;
pub use endpoint::ControlPlaneEndpoint;
pub use grpc::{GrpcConnector, GrpcControlPlane};
pub use transport::{
    ConnectAck, Connector, ControlPlane, Directive, HeartbeatReply, HeartbeatRequest,
    HostDescriptor,
};
