//! In-memory control plane used by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::client::{
    ConnectAck, Connector, ControlPlane, ControlPlaneEndpoint, Directive, HeartbeatReply,
    HeartbeatRequest, HostDescriptor,
};
use crate::error::ClientError;

pub fn endpoint() -> ControlPlaneEndpoint {
    ControlPlaneEndpoint::new(
        Url::parse("http://127.0.0.1:12892").expect("static url"),
        "test-token",
        None,
    )
    .expect("static endpoint")
}

/// Scripted answer for the next heartbeat; an empty script acknowledges.
#[derive(Clone, Debug)]
pub enum Script {
    Ack,
    Fail,
    Reject,
    Terminate,
    Config(Vec<u8>),
    /// Acknowledge a sequence other than the one sent.
    EchoSequence(u64),
    /// Acknowledge after sleeping.
    Slow(Duration),
    Hang,
}

pub struct FakePlane {
    session_id: String,
    script: Mutex<VecDeque<Script>>,
    sent: Mutex<Vec<(String, u64)>>,
    status: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakePlane {
    pub fn new() -> Arc<Self> {
        Self::with_session_id("session-1")
    }

    pub fn with_session_id(id: &str) -> Arc<Self> {
        Arc::new(Self {
            session_id: id.to_string(),
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            status: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn push(&self, step: Script) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn push_n(&self, step: Script, n: usize) {
        for _ in 0..n {
            self.push(step.clone());
        }
    }

    pub fn sent(&self) -> Vec<(String, u64)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.sent().into_iter().map(|(_, seq)| seq).collect()
    }

    pub fn status_calls(&self) -> Vec<String> {
        self.status.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ControlPlane for FakePlane {
    async fn connect(&self, _host: &HostDescriptor) -> Result<ConnectAck, ClientError> {
        Ok(ConnectAck {
            session_id: self.session_id.clone(),
        })
    }

    async fn heartbeat(&self, request: HeartbeatRequest) -> Result<HeartbeatReply, ClientError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        self.sent
            .lock()
            .unwrap()
            .push((request.session_id.clone(), request.sequence));
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Script::Ack);

        match step {
            Script::Ack => Ok(HeartbeatReply::ack(request.sequence)),
            Script::Fail => Err(ClientError::transport("connection refused")),
            Script::Reject => Err(ClientError::rejected("unknown session")),
            Script::Terminate => Ok(HeartbeatReply {
                directive: Directive::Terminate,
                ..HeartbeatReply::ack(request.sequence)
            }),
            Script::Config(bytes) => Ok(HeartbeatReply {
                config_update: Some(bytes),
                ..HeartbeatReply::ack(request.sequence)
            }),
            Script::EchoSequence(seq) => Ok(HeartbeatReply::ack(seq)),
            Script::Slow(d) => {
                tokio::time::sleep(d).await;
                Ok(HeartbeatReply::ack(request.sequence))
            }
            Script::Hang => {
                std::future::pending::<()>().await;
                unreachable!("pending never resolves")
            }
        }
    }

    async fn set_ready(&self, session_id: &str, ready: bool) -> Result<(), ClientError> {
        self.status
            .lock()
            .unwrap()
            .push(format!("ready={ready}@{session_id}"));
        Ok(())
    }

    async fn set_running(&self, session_id: &str) -> Result<(), ClientError> {
        self.status
            .lock()
            .unwrap()
            .push(format!("running@{session_id}"));
        Ok(())
    }

    async fn request_stop(&self, session_id: &str) -> Result<(), ClientError> {
        self.status.lock().unwrap().push(format!("stop@{session_id}"));
        Ok(())
    }
}

/// Hands out the same [`FakePlane`]; the first `failures` dials fail.
pub struct FakeConnector {
    plane: Arc<FakePlane>,
    failures: AtomicU32,
    dials: AtomicU32,
}

impl FakeConnector {
    pub fn new(plane: Arc<FakePlane>) -> Arc<Self> {
        Self::failing(plane, 0)
    }

    pub fn failing(plane: Arc<FakePlane>, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            plane,
            failures: AtomicU32::new(failures),
            dials: AtomicU32::new(0),
        })
    }

    /// Makes the next `n` dials fail.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn dials(&self) -> u32 {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn dial(
        &self,
        _endpoint: &ControlPlaneEndpoint,
    ) -> Result<Arc<dyn ControlPlane>, ClientError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ClientError::transport("connection refused"));
        }
        Ok(self.plane.clone())
    }
}
