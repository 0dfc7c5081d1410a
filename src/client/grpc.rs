//! # gRPC transport (`tonic`).
//!
//! Speaks the `fleetlink.v1.ControlPlane` service. The message types are
//! declared with `prost` derives so no build-time code generation is needed;
//! they mirror this schema:
//!
//! ```proto
//! syntax = "proto3";
//! package fleetlink.v1;
//!
//! service ControlPlane {
//!   rpc Connect(ConnectRequest) returns (ConnectResponse);
//!   rpc Heartbeat(HeartbeatRequest) returns (HeartbeatResponse);
//!   rpc SetReady(ReadyRequest) returns (google.protobuf.Empty);
//!   rpc SetRunning(SessionRequest) returns (google.protobuf.Empty);
//!   rpc RequestStop(SessionRequest) returns (google.protobuf.Empty);
//! }
//!
//! enum Directive { CONTINUE = 0; TERMINATE = 1; }
//! message ConnectRequest    { string name = 1; string version = 2; }
//! message ConnectResponse   { string session_id = 1; }
//! message HeartbeatRequest  { string session_id = 1; uint64 sequence = 2; }
//! message HeartbeatResponse { Directive directive = 1; uint64 sequence = 2; optional bytes config_update = 3; }
//! message ReadyRequest      { string session_id = 1; bool ready = 2; }
//! message SessionRequest    { string session_id = 1; }
//! ```
//!
//! ## Status mapping
//! | gRPC code                                        | [`ClientError`]  |
//! |--------------------------------------------------|------------------|
//! | `Unauthenticated`, `PermissionDenied`, `NotFound` | `Rejected`       |
//! | `Unimplemented`, `DataLoss`                       | `Protocol`       |
//! | anything else                                     | `Transport`      |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Certificate, Channel, ClientTlsConfig};
use tonic::{Code, Request, Status};

use crate::client::{
    ConnectAck, Connector, ControlPlane, ControlPlaneEndpoint, Directive, HeartbeatReply,
    HeartbeatRequest, HostDescriptor,
};
use crate::error::ClientError;

pub mod proto {
    //! Wire messages of `fleetlink.v1`.
    #![allow(clippy::all, clippy::pedantic)]

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ConnectRequest {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub version: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ConnectResponse {
        #[prost(string, tag = "1")]
        pub session_id: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct HeartbeatRequest {
        #[prost(string, tag = "1")]
        pub session_id: String,
        #[prost(uint64, tag = "2")]
        pub sequence: u64,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct HeartbeatResponse {
        #[prost(enumeration = "Directive", tag = "1")]
        pub directive: i32,
        #[prost(uint64, tag = "2")]
        pub sequence: u64,
        #[prost(bytes = "vec", optional, tag = "3")]
        pub config_update: Option<Vec<u8>>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReadyRequest {
        #[prost(string, tag = "1")]
        pub session_id: String,
        #[prost(bool, tag = "2")]
        pub ready: bool,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SessionRequest {
        #[prost(string, tag = "1")]
        pub session_id: String,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Directive {
        Continue = 0,
        Terminate = 1,
    }
}

const CONNECT: &str = "/fleetlink.v1.ControlPlane/Connect";
const HEARTBEAT: &str = "/fleetlink.v1.ControlPlane/Heartbeat";
const SET_READY: &str = "/fleetlink.v1.ControlPlane/SetReady";
const SET_RUNNING: &str = "/fleetlink.v1.ControlPlane/SetRunning";
const REQUEST_STOP: &str = "/fleetlink.v1.ControlPlane/RequestStop";

/// Dials the controller over HTTP/2 with `tonic`.
#[derive(Clone, Debug)]
pub struct GrpcConnector {
    connect_timeout: Duration,
}

impl GrpcConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for GrpcConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    async fn dial(
        &self,
        endpoint: &ControlPlaneEndpoint,
    ) -> Result<Arc<dyn ControlPlane>, ClientError> {
        let token: MetadataValue<Ascii> =
            endpoint
                .token()
                .parse()
                .map_err(|_| ClientError::InvalidEndpoint {
                    reason: "token is not valid ASCII metadata".to_string(),
                })?;

        let mut builder = Channel::from_shared(endpoint.address().to_string())
            .map_err(|e| ClientError::InvalidEndpoint {
                reason: e.to_string(),
            })?
            .connect_timeout(self.connect_timeout);

        if endpoint.uses_tls() {
            let mut tls = ClientTlsConfig::new().with_enabled_roots();
            if let Some(pem) = endpoint.certificate() {
                tls = tls.ca_certificate(Certificate::from_pem(pem));
            }
            builder = builder
                .tls_config(tls)
                .map_err(|e| ClientError::InvalidEndpoint {
                    reason: e.to_string(),
                })?;
        }

        let channel = builder
            .connect()
            .await
            .map_err(|e| ClientError::transport(e.to_string()))?;
        tracing::debug!(address = %endpoint.address(), "channel to controller established");

        Ok(Arc::new(GrpcControlPlane::new(channel, token)))
    }
}

/// [`ControlPlane`] over a `tonic` channel.
#[derive(Clone)]
pub struct GrpcControlPlane {
    inner: tonic::client::Grpc<Channel>,
    token: MetadataValue<Ascii>,
}

impl GrpcControlPlane {
    pub fn new(channel: Channel, token: MetadataValue<Ascii>) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
            token,
        }
    }

    async fn unary<Req, Res>(&self, path: &'static str, body: Req) -> Result<Res, ClientError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Res: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.inner.clone();
        grpc.ready()
            .await
            .map_err(|e| ClientError::transport(format!("channel not ready: {e}")))?;

        let mut request = Request::new(body);
        request
            .metadata_mut()
            .insert("authorization", self.token.clone());

        let codec: ProstCodec<Req, Res> = ProstCodec::default();
        grpc.unary(request, PathAndQuery::from_static(path), codec)
            .await
            .map(tonic::Response::into_inner)
            .map_err(|status| map_status(&status))
    }
}

#[async_trait]
impl ControlPlane for GrpcControlPlane {
    async fn connect(&self, host: &HostDescriptor) -> Result<ConnectAck, ClientError> {
        let res: proto::ConnectResponse = self
            .unary(
                CONNECT,
                proto::ConnectRequest {
                    name: host.name.clone(),
                    version: host.version.clone(),
                },
            )
            .await?;
        Ok(ConnectAck {
            session_id: res.session_id,
        })
    }

    async fn heartbeat(&self, request: HeartbeatRequest) -> Result<HeartbeatReply, ClientError> {
        let res: proto::HeartbeatResponse = self
            .unary(
                HEARTBEAT,
                proto::HeartbeatRequest {
                    session_id: request.session_id,
                    sequence: request.sequence,
                },
            )
            .await?;
        reply_from_wire(res)
    }

    async fn set_ready(&self, session_id: &str, ready: bool) -> Result<(), ClientError> {
        let () = self
            .unary(
                SET_READY,
                proto::ReadyRequest {
                    session_id: session_id.to_string(),
                    ready,
                },
            )
            .await?;
        Ok(())
    }

    async fn set_running(&self, session_id: &str) -> Result<(), ClientError> {
        let () = self
            .unary(
                SET_RUNNING,
                proto::SessionRequest {
                    session_id: session_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn request_stop(&self, session_id: &str) -> Result<(), ClientError> {
        let () = self
            .unary(
                REQUEST_STOP,
                proto::SessionRequest {
                    session_id: session_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }
}

fn reply_from_wire(res: proto::HeartbeatResponse) -> Result<HeartbeatReply, ClientError> {
    let directive = match proto::Directive::try_from(res.directive) {
        Ok(proto::Directive::Continue) => Directive::Continue,
        Ok(proto::Directive::Terminate) => Directive::Terminate,
        Err(_) => {
            return Err(ClientError::protocol(format!(
                "unknown directive {}",
                res.directive
            )));
        }
    };
    Ok(HeartbeatReply {
        directive,
        sequence: res.sequence,
        config_update: res.config_update,
    })
}

fn map_status(status: &Status) -> ClientError {
    let reason = format!("{:?}: {}", status.code(), status.message());
    match status.code() {
        Code::Unauthenticated | Code::PermissionDenied | Code::NotFound => {
            ClientError::Rejected { reason }
        }
        Code::Unimplemented | Code::DataLoss => ClientError::Protocol { reason },
        _ => ClientError::Transport { reason },
    }
}
