use std::sync::Arc;

use tokio::sync::mpsc;

use crate::api::CloudHandle;
use crate::client::{Connector, ControlPlaneEndpoint, GrpcConnector, HostDescriptor};
use crate::core::{
    AgentConfig, AgentContext,
    agent::Agent,
    scheduler::HeartbeatScheduler,
    session::{SessionManager, SessionParams},
};
use crate::error::RuntimeError;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for an [`Agent`].
pub struct AgentBuilder {
    cfg: AgentConfig,
    endpoint: ControlPlaneEndpoint,
    host: HostDescriptor,
    connector: Option<Arc<dyn Connector>>,
    ctx: Option<Arc<AgentContext>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl AgentBuilder {
    /// Creates a builder for the server described by `host`, managed by the
    /// controller at `endpoint`.
    pub fn new(cfg: AgentConfig, endpoint: ControlPlaneEndpoint, host: HostDescriptor) -> Self {
        Self {
            cfg,
            endpoint,
            host,
            connector: None,
            ctx: None,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (session lifecycle, heartbeats,
    /// reconnects) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the gRPC connector (default: [`GrpcConnector::default`]).
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Uses an existing context instead of a fresh one.
    pub fn with_context(mut self, ctx: Arc<AgentContext>) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// Validates the configuration and wires all components.
    ///
    /// Must be called from within a tokio runtime (subscriber workers are spawned here).
    pub fn build(self) -> Result<Agent, RuntimeError> {
        self.cfg.validate()?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(GrpcConnector::default()) as Arc<dyn Connector>);

        let session = Arc::new(SessionManager::new(
            connector,
            Arc::new(self.endpoint),
            self.host,
            SessionParams::from(&self.cfg),
            bus.clone(),
        ));
        let (tx, rx) = mpsc::channel(4);
        let heart = HeartbeatScheduler::new(session.clone(), self.cfg.interval, bus.clone(), tx);
        let cloud = Arc::new(CloudHandle::new(session.clone(), self.cfg.auto_ready));

        Ok(Agent::new_internal(
            self.cfg,
            self.ctx.unwrap_or_default(),
            bus,
            subs,
            session,
            heart,
            cloud,
            rx,
        ))
    }
}
