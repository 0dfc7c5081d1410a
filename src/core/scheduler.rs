//! # HeartbeatScheduler: fixed-rate, non-overlapping ticks.
//!
//! Drives a [`Heartbeat`] on a spawned tokio task and reports why it stopped
//! on a [`Termination`] channel owned by the host.
//!
//! ## Loop
//! ```text
//! start()
//!   └─► spawn drive():
//!         await previous loop (if any)
//!         interval(period), MissedTickBehavior::Skip
//!         loop {
//!           select! { cancelled → exit, tick → () }
//!           in_flight = true; heart.beat().await; in_flight = false
//!           ├─ Acknowledged(Continue) | Missed → next tick
//!           ├─ Acknowledged(Terminate)        → cancel, send Termination::Requested, exit
//!           └─ Err(e)                         → cancel, send Termination::Lost(e), exit
//!         }
//!         publish SchedulerStopped
//! ```
//!
//! ## Rules
//! - The first tick fires immediately; later ticks are fixed-rate and an
//!   overrun skips missed ticks instead of bursting.
//! - `beat()` is awaited inline, so two beats never overlap, including across
//!   `stop()`/`start()` cycles.
//! - `stop()` never waits for an in-flight beat; it wakes a sleeping loop.
//! - Termination notices are sent with `try_send`; if the host never drains
//!   them the notice is dropped and logged, and the loop still exits.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::Directive;
use crate::core::session::BeatOutcome;
use crate::error::SessionError;
use crate::events::{Bus, Event, EventKind};

/// Something that can be beaten periodically.
#[async_trait]
pub trait Heartbeat: Send + Sync + 'static {
    /// Name used in events and logs.
    fn name(&self) -> &str;

    /// Performs one heartbeat.
    async fn beat(&self) -> Result<BeatOutcome, SessionError>;
}

/// Why the scheduler stopped on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The controller answered with a `Terminate` directive.
    Requested,
    /// The session is gone or no longer usable.
    Lost(SessionError),
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic driver of a [`Heartbeat`].
pub struct HeartbeatScheduler {
    heart: Arc<dyn Heartbeat>,
    interval: Duration,
    bus: Bus,
    notices: mpsc::Sender<Termination>,
    in_flight: Arc<AtomicBool>,
    running: Mutex<Option<Running>>,
}

impl HeartbeatScheduler {
    /// Creates a stopped scheduler. `interval` is clamped to at least 1ms.
    pub fn new(
        heart: Arc<dyn Heartbeat>,
        interval: Duration,
        bus: Bus,
        notices: mpsc::Sender<Termination>,
    ) -> Self {
        Self {
            heart,
            interval: interval.max(Duration::from_millis(1)),
            bus,
            notices,
            in_flight: Arc::new(AtomicBool::new(false)),
            running: Mutex::new(None),
        }
    }

    /// Starts ticking. Returns `false` (and does nothing) if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let Ok(mut slot) = self.running.lock() else {
            return false;
        };
        if slot.as_ref().is_some_and(|r| !r.token.is_cancelled()) {
            return false;
        }

        let token = CancellationToken::new();
        let previous = slot.take().map(|r| r.handle);
        let handle = tokio::spawn(drive(
            self.heart.clone(),
            self.interval,
            token.clone(),
            self.bus.clone(),
            self.notices.clone(),
            self.in_flight.clone(),
            previous,
        ));
        *slot = Some(Running { token, handle });

        self.bus.publish(
            Event::new(EventKind::SchedulerStarted)
                .with_source(self.heart.name())
                .with_interval(self.interval),
        );
        true
    }

    /// Requests the loop to stop; does not wait for an in-flight beat.
    pub fn stop(&self) {
        if let Ok(slot) = self.running.lock() {
            if let Some(r) = slot.as_ref() {
                r.token.cancel();
            }
        }
    }

    /// `true` between `start()` and the moment the loop is asked to stop.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|slot| {
                slot.as_ref()
                    .is_some_and(|r| !r.token.is_cancelled() && !r.handle.is_finished())
            })
            .unwrap_or(false)
    }

    /// `true` while a beat is executing.
    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Waits up to `grace` for the loop task to exit.
    ///
    /// Returns `true` if no loop is left running. On `false` the loop is
    /// detached and finishes its current beat on its own.
    pub async fn join(&self, grace: Duration) -> bool {
        let handle = match self.running.lock() {
            Ok(mut slot) => slot.take().map(|r| {
                r.token.cancel();
                r.handle
            }),
            Err(_) => None,
        };
        let Some(handle) = handle else {
            return true;
        };
        time::timeout(grace, handle).await.is_ok()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn drive(
    heart: Arc<dyn Heartbeat>,
    period: Duration,
    token: CancellationToken,
    bus: Bus,
    notices: mpsc::Sender<Termination>,
    in_flight: Arc<AtomicBool>,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let reason = loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break "stopped",
            _ = ticker.tick() => {}
        }

        in_flight.store(true, Ordering::SeqCst);
        let result = heart.beat().await;
        in_flight.store(false, Ordering::SeqCst);

        let notice = match result {
            Ok(BeatOutcome::Acknowledged {
                directive: Directive::Terminate,
                ..
            }) => Termination::Requested,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(heart = heart.name(), error = %e, "heartbeat loop ending");
                Termination::Lost(e)
            }
        };

        token.cancel();
        let reason = match notice {
            Termination::Requested => "terminate requested",
            Termination::Lost(_) => "session lost",
        };
        match notices.try_send(notice) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                tracing::warn!(
                    heart = heart.name(),
                    notice = ?dropped,
                    "termination notice dropped, host is not draining notices"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(heart = heart.name(), "no host listening for termination notices");
            }
        }
        break reason;
    };

    bus.publish(
        Event::new(EventKind::SchedulerStopped)
            .with_source(heart.name())
            .with_reason(reason),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HostDescriptor;
    use crate::core::session::{SessionManager, SessionParams, SessionState};
    use crate::testing::{FakeConnector, FakePlane, Script, endpoint};

    async fn session(plane: Arc<FakePlane>, rpc_timeout: Duration) -> Arc<SessionManager> {
        let mgr = SessionManager::new(
            FakeConnector::new(plane),
            Arc::new(endpoint()),
            HostDescriptor::new("lobby-1"),
            SessionParams {
                rpc_timeout,
                degrade_after: 3,
                lose_after: 6,
            },
            Bus::new(256),
        );
        mgr.connect().await.expect("connect");
        Arc::new(mgr)
    }

    fn scheduler(
        heart: Arc<dyn Heartbeat>,
        interval: Duration,
    ) -> (HeartbeatScheduler, mpsc::Receiver<Termination>) {
        let (tx, rx) = mpsc::channel(4);
        (HeartbeatScheduler::new(heart, interval, Bus::new(256), tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_immediate_then_fixed_rate() {
        let plane = FakePlane::new();
        let mgr = session(plane.clone(), Duration::from_secs(1)).await;
        let (sched, _rx) = scheduler(mgr, Duration::from_secs(10));

        assert!(sched.start());
        assert!(!sched.start(), "second start is a no-op");

        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(plane.sequences(), vec![0]);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(plane.sequences(), vec![0, 1]);

        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(plane.sequences(), vec![0, 1, 2, 3]);
        assert!(sched.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_beats_never_overlap() {
        let plane = FakePlane::new();
        // Each beat takes longer than the interval.
        plane.push_n(Script::Slow(Duration::from_millis(2500)), 8);
        let mgr = session(plane.clone(), Duration::from_secs(5)).await;
        let (sched, _rx) = scheduler(mgr, Duration::from_secs(1));

        sched.start();
        time::sleep(Duration::from_secs(20)).await;
        sched.stop();
        assert!(sched.join(Duration::from_secs(5)).await);

        assert_eq!(plane.max_in_flight(), 1);
        let seqs = plane.sequences();
        assert!(seqs.len() >= 6, "got {seqs:?}");
        assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn no_beats_after_stop() {
        let plane = FakePlane::new();
        let mgr = session(plane.clone(), Duration::from_secs(1)).await;
        let (sched, _rx) = scheduler(mgr, Duration::from_secs(10));

        sched.start();
        time::sleep(Duration::from_secs(25)).await;
        let before = plane.sequences().len();

        sched.stop();
        assert!(!sched.is_running());
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(plane.sequences().len(), before);
        assert!(sched.join(Duration::from_millis(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_does_not_wait_for_in_flight_beat() {
        let plane = FakePlane::new();
        plane.push(Script::Slow(Duration::from_secs(3)));
        let mgr = session(plane.clone(), Duration::from_secs(5)).await;
        let (sched, _rx) = scheduler(mgr, Duration::from_secs(10));

        sched.start();
        time::sleep(Duration::from_millis(10)).await;
        assert!(sched.in_flight());

        let started = time::Instant::now();
        sched.stop();
        assert_eq!(started.elapsed(), Duration::ZERO);

        assert!(!sched.join(Duration::from_secs(1)).await);
        time::sleep(Duration::from_secs(3)).await;
        assert!(!sched.in_flight());
        assert_eq!(plane.sequences(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resumes_without_overlap() {
        let plane = FakePlane::new();
        plane.push(Script::Slow(Duration::from_secs(2)));
        let mgr = session(plane.clone(), Duration::from_secs(5)).await;
        let (sched, _rx) = scheduler(mgr, Duration::from_secs(10));

        sched.start();
        time::sleep(Duration::from_millis(10)).await;
        sched.stop();
        assert!(sched.start());

        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(plane.max_in_flight(), 1);
        assert_eq!(plane.sequences(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn terminate_directive_is_surfaced() {
        let plane = FakePlane::new();
        plane.push(Script::Ack);
        plane.push(Script::Terminate);
        let mgr = session(plane.clone(), Duration::from_secs(1)).await;
        let (sched, mut rx) = scheduler(mgr, Duration::from_secs(10));

        sched.start();
        assert_eq!(rx.recv().await, Some(Termination::Requested));
        assert!(!sched.is_running());
        assert_eq!(plane.sequences(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn session_loss_is_surfaced_and_stops_ticking() {
        let plane = FakePlane::new();
        plane.push(Script::Reject);
        let mgr = session(plane.clone(), Duration::from_secs(1)).await;
        let (sched, mut rx) = scheduler(mgr.clone(), Duration::from_secs(10));

        sched.start();
        let notice = rx.recv().await.expect("notice");
        assert!(matches!(notice, Termination::Lost(ref e) if e.is_lost()));
        assert_eq!(mgr.state().await, SessionState::Closed);

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(plane.sequences(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn undrained_notices_do_not_block_restart() {
        let plane = FakePlane::new();
        plane.push(Script::Terminate);
        let mgr = session(plane.clone(), Duration::from_secs(1)).await;
        let bus = Bus::new(256);
        let mut events = bus.subscribe();
        let (tx, _rx) = mpsc::channel(1);
        tx.try_send(Termination::Requested).unwrap();
        let sched = HeartbeatScheduler::new(mgr, Duration::from_secs(10), bus, tx);

        sched.start();
        time::sleep(Duration::from_millis(1)).await;
        assert!(!sched.is_running());

        let mut kinds = Vec::new();
        while let Ok(ev) = events.try_recv() {
            kinds.push(ev.kind);
        }
        assert!(kinds.contains(&EventKind::SchedulerStopped), "{kinds:?}");

        assert!(sched.start());
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(plane.sequences(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_underneath_ends_the_loop() {
        let plane = FakePlane::new();
        let mgr = session(plane.clone(), Duration::from_secs(1)).await;
        let (sched, mut rx) = scheduler(mgr.clone(), Duration::from_secs(10));

        sched.start();
        time::sleep(Duration::from_millis(1)).await;
        mgr.disconnect().await.unwrap();

        let notice = rx.recv().await.expect("notice");
        assert!(matches!(
            notice,
            Termination::Lost(SessionError::InvalidState {
                state: SessionState::Closed,
                ..
            })
        ));
    }
}
