//! # Agent: host lifecycle integration.
//!
//! The [`Agent`] ties the [`SessionManager`], the [`HeartbeatScheduler`] and
//! the control-plane API to the three hooks a game host exposes.
//!
//! ## Lifecycle
//! ```text
//! on_load()    ── session.connect() ─► ctx.setup(CloudHandle) ─► heart.start()
//!                  (a failed connect leaves the context empty, so on_load may be retried)
//! on_enable()  ── set_running ─► set_ready (if auto-ready is still on)
//! run()        ── waits for: OS signal | on_disable() | Termination notice
//!                   ├─ signal / on_disable      → Ok(())
//!                   ├─ Termination::Requested   → Err(Terminated)
//!                   └─ Termination::Lost(e)     → ReconnectPolicy:
//!                         Never   → Err(Terminated)
//!                         Backoff → reset, sleep, connect, heart.start(), keep waiting
//! on_disable() ── heart.stop() ─► heart.join(grace) ─► session.disconnect()
//!                  ─► flush subscribers (bounded by grace)
//! ```
//!
//! Events from every component flow through the [`Bus`] to a listener task
//! that fans them out to the configured subscribers. `on_disable` stops the
//! listener only after it has forwarded everything already on the bus and
//! every subscriber worker has drained its queue.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{CloudApi, CloudHandle};
use crate::core::{
    AgentConfig, AgentContext,
    scheduler::{HeartbeatScheduler, Termination},
    session::{SessionManager, SessionState},
    shutdown,
};
use crate::error::{RegistrationError, RuntimeError, SessionError};
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::SubscriberSet;

/// Embedded fleet agent.
///
/// Built with [`AgentBuilder`](crate::AgentBuilder). All hooks take `&self`.
pub struct Agent {
    cfg: AgentConfig,
    ctx: Arc<AgentContext>,
    bus: Bus,
    session: Arc<SessionManager>,
    heart: HeartbeatScheduler,
    cloud: Arc<CloudHandle>,
    notices: Mutex<mpsc::Receiver<Termination>>,
    stopping: CancellationToken,
    enabled: AtomicBool,
    listener: StdMutex<Option<JoinHandle<()>>>,
    listener_stop: CancellationToken,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        cfg: AgentConfig,
        ctx: Arc<AgentContext>,
        bus: Bus,
        subs: SubscriberSet,
        session: Arc<SessionManager>,
        heart: HeartbeatScheduler,
        cloud: Arc<CloudHandle>,
        notices: mpsc::Receiver<Termination>,
    ) -> Self {
        let listener_stop = CancellationToken::new();
        let listener = subscriber_listener(&bus, subs, listener_stop.clone());
        Self {
            cfg,
            ctx,
            bus,
            session,
            heart,
            cloud,
            notices: Mutex::new(notices),
            stopping: CancellationToken::new(),
            enabled: AtomicBool::new(false),
            listener: StdMutex::new(Some(listener)),
            listener_stop,
        }
    }

    /// Host startup: registers the control-plane API, opens the session and
    /// starts heartbeating.
    pub async fn on_load(&self) -> Result<(), RuntimeError> {
        if self.ctx.is_registered() {
            return Err(RegistrationError::AlreadyRegistered.into());
        }
        let session = self.session.connect().await?;
        if let Err(e) = self.ctx.setup(self.cloud.clone()) {
            // Another handle was registered while we were connecting.
            self.session.disconnect().await?;
            self.session.reset().await?;
            return Err(e.into());
        }
        self.heart.start();
        tracing::info!(%session, server = %self.session.host().name, "agent loaded");
        Ok(())
    }

    /// Host finished enabling: reports the server as running and, unless
    /// auto-ready was disabled, as ready.
    pub async fn on_enable(&self) -> Result<(), RuntimeError> {
        self.cloud.mark_running().await?;
        self.enabled.store(true, Ordering::SeqCst);
        if self.cloud.is_auto_ready() {
            self.cloud.mark_ready().await?;
        }
        Ok(())
    }

    /// Host shutdown: stops heartbeating and closes the session.
    ///
    /// Waits at most `grace` for an in-flight beat. Safe to call more than once.
    pub async fn on_disable(&self) -> Result<(), RuntimeError> {
        self.request_shutdown();
        self.heart.stop();
        if !self.heart.join(self.cfg.grace).await {
            tracing::warn!(grace = ?self.cfg.grace, "heartbeat still in flight after grace period");
        }
        self.session.disconnect().await?;
        self.flush_subscribers(self.cfg.grace).await;
        Ok(())
    }

    /// Stops the bus listener once it has forwarded every pending event and
    /// waits up to `grace` for the subscribers to process them.
    async fn flush_subscribers(&self, grace: Duration) {
        let handle = match self.listener.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(handle) = handle else {
            return;
        };
        self.listener_stop.cancel();
        if tokio::time::timeout(grace, handle).await.is_err() {
            tracing::warn!(grace = ?grace, "subscribers still busy after grace period");
        }
    }

    /// Blocks until an OS shutdown signal, [`on_disable`](Self::on_disable),
    /// or a termination the reconnect policy cannot recover from.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        self.run_until(shutdown::wait_for_shutdown_signal()).await
    }

    /// Like [`run`](Self::run) with a caller-provided shutdown future instead of OS signals.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), RuntimeError>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        tokio::pin!(shutdown);
        let mut notices = self.notices.lock().await;

        loop {
            let notice = tokio::select! {
                res = &mut shutdown => {
                    res?;
                    self.request_shutdown();
                    return Ok(());
                }
                _ = self.stopping.cancelled() => return Ok(()),
                notice = notices.recv() => notice,
            };

            let cause = match notice {
                Some(Termination::Requested) => {
                    return Err(RuntimeError::Terminated {
                        reason: "controller requested termination".to_string(),
                    });
                }
                Some(Termination::Lost(e)) => e,
                None => {
                    return Err(RuntimeError::Terminated {
                        reason: "heartbeat scheduler is gone".to_string(),
                    });
                }
            };

            tokio::select! {
                res = &mut shutdown => {
                    res?;
                    self.request_shutdown();
                    return Ok(());
                }
                _ = self.stopping.cancelled() => return Ok(()),
                res = self.recover(cause) => res?,
            }
        }
    }

    /// Applies the reconnect policy after the scheduler reported a loss.
    async fn recover(&self, cause: SessionError) -> Result<(), RuntimeError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let Some(backoff) = self.cfg.reconnect.schedule(attempt) else {
                let reason = if attempt == 1 {
                    cause.to_string()
                } else {
                    format!("{cause}; gave up after {} reconnect attempts", attempt - 1)
                };
                return Err(RuntimeError::Terminated { reason });
            };

            let delay = backoff.delay(attempt - 1);
            self.bus.publish(
                Event::new(EventKind::ReconnectScheduled)
                    .with_attempt(attempt)
                    .with_delay(delay)
                    .with_reason(cause.to_string()),
            );
            tokio::time::sleep(delay).await;

            if self.session.state().await == SessionState::Closed {
                self.session.reset().await?;
            }
            match self.session.connect().await {
                Ok(session) => {
                    tracing::info!(%session, attempt, "session re-established");
                    self.heart.start();
                    self.restore_status().await;
                    return Ok(());
                }
                Err(SessionError::ConnectionFailed { source }) => {
                    tracing::debug!(attempt, error = %source, "reconnect attempt failed");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Re-reports status for a fresh session; failures are logged, not fatal.
    async fn restore_status(&self) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.cloud.mark_running().await {
            tracing::warn!(error = %e, "failed to report running after reconnect");
        }
        if self.cloud.is_ready() {
            if let Err(e) = self.cloud.mark_ready().await {
                tracing::warn!(error = %e, "failed to report ready after reconnect");
            }
        }
    }

    fn request_shutdown(&self) {
        if !self.stopping.is_cancelled() {
            self.stopping.cancel();
            self.bus.publish(Event::new(EventKind::ShutdownRequested));
        }
    }

    pub fn context(&self) -> &Arc<AgentContext> {
        &self.ctx
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn scheduler(&self) -> &HeartbeatScheduler {
        &self.heart
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn config(&self) -> &AgentConfig {
        &self.cfg
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

/// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
///
/// On `stop` it forwards whatever is still buffered, then shuts the set down
/// so every worker drains its queue.
fn subscriber_listener(
    bus: &Bus,
    subs: SubscriberSet,
    stop: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                res = rx.recv() => match res {
                    Ok(ev) => subs.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = stop.cancelled() => break,
            }
        }
        loop {
            match rx.try_recv() {
                Ok(ev) => subs.emit(&ev),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event listener lagged behind the bus");
                }
                Err(_) => break,
            }
        }
        subs.shutdown().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Directive, HostDescriptor};
    use crate::core::AgentBuilder;
    use crate::policies::{BackoffPolicy, JitterPolicy, ReconnectPolicy};
    use crate::testing::{FakeConnector, FakePlane, Script, endpoint};
    use std::time::Duration;

    fn config() -> AgentConfig {
        AgentConfig {
            interval: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(1),
            grace: Duration::from_secs(1),
            ..AgentConfig::default()
        }
    }

    fn reconnecting(max_attempts: u32) -> AgentConfig {
        AgentConfig {
            reconnect: ReconnectPolicy::Backoff {
                backoff: BackoffPolicy {
                    first: Duration::from_millis(100),
                    max: Duration::from_secs(1),
                    factor: 2.0,
                    jitter: JitterPolicy::None,
                },
                max_attempts,
            },
            ..config()
        }
    }

    fn agent(cfg: AgentConfig, connector: Arc<FakeConnector>) -> Agent {
        AgentBuilder::new(cfg, endpoint(), HostDescriptor::new("lobby-1"))
            .with_connector(connector)
            .build()
            .expect("valid config")
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        kinds
    }

    #[tokio::test]
    async fn build_rejects_invalid_config() {
        let cfg = AgentConfig {
            lose_after: 2,
            ..AgentConfig::default()
        };
        let res = AgentBuilder::new(cfg, endpoint(), HostDescriptor::new("lobby-1")).build();
        assert!(matches!(res, Err(RuntimeError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn load_registers_api_and_starts_heartbeat() {
        let plane = FakePlane::new();
        let agent = agent(config(), FakeConnector::new(plane.clone()));
        assert!(agent.context().api().is_err());

        agent.on_load().await.unwrap();
        assert!(agent.context().api().is_ok());
        assert_eq!(agent.session().state().await, SessionState::Active);
        assert!(agent.scheduler().is_running());

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(plane.sequences(), vec![0]);

        // Registration is exactly-once for the context.
        let err = agent.on_load().await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Registration(RegistrationError::AlreadyRegistered)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn load_can_be_retried_after_failed_connect() {
        let plane = FakePlane::new();
        let connector = FakeConnector::failing(plane.clone(), 1);
        let agent = agent(config(), connector.clone());

        let err = agent.on_load().await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Session(SessionError::ConnectionFailed { .. })
        ));
        assert!(!agent.context().is_registered());
        assert!(!agent.scheduler().is_running());

        agent.on_load().await.unwrap();
        assert!(agent.context().api().is_ok());
        assert_eq!(connector.dials(), 2);
        assert_eq!(agent.session().state().await, SessionState::Active);
        assert!(agent.scheduler().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn shared_context_rejects_second_agent_before_dialing() {
        let ctx = Arc::new(AgentContext::new());
        let first = FakeConnector::new(FakePlane::new());
        let second = FakeConnector::new(FakePlane::new());
        let a = AgentBuilder::new(config(), endpoint(), HostDescriptor::new("lobby-1"))
            .with_connector(first)
            .with_context(ctx.clone())
            .build()
            .unwrap();
        let b = AgentBuilder::new(config(), endpoint(), HostDescriptor::new("lobby-2"))
            .with_connector(second.clone())
            .with_context(ctx.clone())
            .build()
            .unwrap();

        a.on_load().await.unwrap();
        let err = b.on_load().await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Registration(RegistrationError::AlreadyRegistered)
        ));
        assert_eq!(second.dials(), 0);
        assert_eq!(b.session().state().await, SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn enable_reports_running_and_ready() {
        let plane = FakePlane::new();
        let agent = agent(config(), FakeConnector::new(plane.clone()));
        agent.on_load().await.unwrap();
        agent.on_enable().await.unwrap();

        assert_eq!(
            plane.status_calls(),
            vec!["running@session-1", "ready=true@session-1"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_auto_ready_skips_ready_report() {
        let plane = FakePlane::new();
        let agent = agent(config(), FakeConnector::new(plane.clone()));
        agent.on_load().await.unwrap();

        agent.context().api().unwrap().disable_auto_ready();
        agent.on_enable().await.unwrap();
        assert_eq!(plane.status_calls(), vec!["running@session-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_stops_heartbeat_and_closes_session() {
        let plane = FakePlane::new();
        let agent = agent(config(), FakeConnector::new(plane.clone()));
        let mut rx = agent.bus().subscribe();
        agent.on_load().await.unwrap();
        tokio::time::sleep(Duration::from_secs(15)).await;

        agent.on_disable().await.unwrap();
        assert!(!agent.scheduler().is_running());
        assert_eq!(agent.session().state().await, SessionState::Closed);

        let sent = plane.sequences().len();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(plane.sequences().len(), sent);

        agent.on_disable().await.unwrap();
        // run() returns at once after on_disable.
        agent.run_until(std::future::pending()).await.unwrap();

        let kinds = drain(&mut rx);
        assert!(kinds.contains(&EventKind::ShutdownRequested));
        assert!(kinds.contains(&EventKind::SessionClosed));
    }

    struct Recorder(Arc<StdMutex<Vec<EventKind>>>);

    #[async_trait::async_trait]
    impl crate::subscribers::Subscribe for Recorder {
        async fn on_event(&self, event: &Event) {
            self.0.lock().unwrap().push(event.kind);
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disable_flushes_final_events_to_subscribers() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let agent = AgentBuilder::new(config(), endpoint(), HostDescriptor::new("lobby-1"))
            .with_connector(FakeConnector::new(FakePlane::new()))
            .with_subscribers(vec![Arc::new(Recorder(seen.clone()))])
            .build()
            .unwrap();

        agent.on_load().await.unwrap();
        agent.on_disable().await.unwrap();
        agent.on_disable().await.unwrap();
        drop(agent);

        let kinds = seen.lock().unwrap().clone();
        for expected in [
            EventKind::SessionConnected,
            EventKind::ShutdownRequested,
            EventKind::SchedulerStopped,
            EventKind::SessionClosed,
        ] {
            assert!(kinds.contains(&expected), "missing {expected:?} in {kinds:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn terminate_directive_ends_run() {
        let plane = FakePlane::new();
        plane.push(Script::Terminate);
        let agent = agent(config(), FakeConnector::new(plane.clone()));
        agent.on_load().await.unwrap();

        let err = agent.run_until(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Terminated { .. }));
        assert_eq!(err.as_label(), "runtime_terminated");
    }

    #[tokio::test(start_paused = true)]
    async fn loss_without_reconnect_policy_ends_run() {
        let plane = FakePlane::new();
        plane.push(Script::Reject);
        let connector = FakeConnector::new(plane.clone());
        let agent = agent(config(), connector.clone());
        agent.on_load().await.unwrap();

        let err = agent.run_until(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Terminated { ref reason } if reason.contains("lost")));
        assert_eq!(connector.dials(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn loss_with_backoff_reconnects_and_restores_status() {
        let plane = FakePlane::new();
        plane.push(Script::Reject);
        let connector = FakeConnector::new(plane.clone());
        let agent = agent(reconnecting(0), connector.clone());
        let mut rx = agent.bus().subscribe();
        agent.on_load().await.unwrap();
        agent.on_enable().await.unwrap();
        // The controller needs one retry before it accepts us again.
        connector.fail_next(1);

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let run = agent.run_until(async move {
            let _ = stop_rx.await;
            Ok(())
        });
        let check = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let _ = stop_tx.send(());
        };
        let (res, ()) = tokio::join!(run, check);
        res.unwrap();

        assert_eq!(connector.dials(), 3);
        assert!(agent.scheduler().is_running());
        assert_eq!(agent.session().state().await, SessionState::Active);
        // New session heartbeats start from zero again.
        assert_eq!(plane.sequences(), vec![0, 0]);
        assert_eq!(
            plane.status_calls(),
            vec![
                "running@session-1",
                "ready=true@session-1",
                "running@session-1",
                "ready=true@session-1"
            ]
        );

        let kinds = drain(&mut rx);
        let scheduled = kinds
            .iter()
            .filter(|k| **k == EventKind::ReconnectScheduled)
            .count();
        assert_eq!(scheduled, 2);
        assert!(kinds.contains(&EventKind::SessionLost));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_gives_up_after_max_attempts() {
        let plane = FakePlane::new();
        plane.push(Script::Reject);
        let connector = FakeConnector::new(plane.clone());
        let agent = agent(reconnecting(2), connector.clone());
        agent.on_load().await.unwrap();
        connector.fail_next(10);

        let err = agent.run_until(std::future::pending()).await.unwrap_err();
        assert!(
            matches!(err, RuntimeError::Terminated { ref reason } if reason.contains("gave up after 2"))
        );
        assert_eq!(connector.dials(), 3);
        assert_eq!(agent.session().state().await, SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_future_ends_run() {
        let plane = FakePlane::new();
        let agent = agent(config(), FakeConnector::new(plane.clone()));
        let mut rx = agent.bus().subscribe();
        agent.on_load().await.unwrap();

        agent
            .run_until(async {
                tokio::time::sleep(Duration::from_secs(25)).await;
                Ok(())
            })
            .await
            .unwrap();
        // Heartbeats keep going until the host disables the agent.
        assert!(agent.scheduler().is_running());
        assert_eq!(plane.sequences(), vec![0, 1, 2]);
        assert!(drain(&mut rx).contains(&EventKind::ShutdownRequested));

        let out = agent.session().beat().await.unwrap();
        assert!(matches!(
            out,
            crate::BeatOutcome::Acknowledged {
                directive: Directive::Continue,
                ..
            }
        ));
    }
}
