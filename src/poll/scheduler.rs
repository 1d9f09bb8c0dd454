//! Fixed-cadence poll loop with a single-flight guarantee.
//!
//! The scheduler is a small state machine ([`PollState`]) guarded by a mutex. A timer task
//! feeds it `Tick`s; a tick that lands while a cycle is still running is dropped, so at
//! most one [`Fetcher::fetch_all`] is ever outstanding and snapshots are applied in
//! cycle-start order.
//!
//! `stop()` disarms the timer but never aborts a running cycle: that cycle finishes, its
//! snapshot is published, and only then does the scheduler settle in `Idle`.

use crate::poll::{reconcile, Backend, Fetcher, Snapshot};
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    /// No timer armed, nothing in flight.
    Idle,
    /// Timer armed, waiting for the next tick.
    Scheduled,
    /// A cycle is in flight. `stop_requested` means the timer is already disarmed and the
    /// scheduler drops to `Idle` once the cycle lands.
    Polling { stop_requested: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    Start,
    Stop,
    Tick,
    CycleDone,
}

/// Side effect the caller must carry out after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    ArmTimer,
    DisarmTimer,
    RunCycle,
    SkipTick,
}

impl PollState {
    pub fn on(self, event: PollEvent) -> (PollState, Action) {
        use PollEvent::*;
        use PollState::*;

        match (self, event) {
            (Idle, Start) => (Scheduled, Action::ArmTimer),
            (Idle, _) => (Idle, Action::None),

            (Scheduled, Start) => (Scheduled, Action::None),
            (Scheduled, Stop) => (Idle, Action::DisarmTimer),
            (Scheduled, Tick) => (Polling { stop_requested: false }, Action::RunCycle),
            (Scheduled, CycleDone) => (Scheduled, Action::None),

            (Polling { stop_requested: false }, Start) => (self, Action::None),
            (Polling { stop_requested: true }, Start) => {
                (Polling { stop_requested: false }, Action::ArmTimer)
            }
            (Polling { stop_requested: false }, Stop) => {
                (Polling { stop_requested: true }, Action::DisarmTimer)
            }
            (Polling { stop_requested: true }, Stop) => (self, Action::None),
            (Polling { .. }, Tick) => (self, Action::SkipTick),
            (Polling { stop_requested: false }, CycleDone) => (Scheduled, Action::None),
            (Polling { stop_requested: true }, CycleDone) => (Idle, Action::None),
        }
    }

    pub fn is_polling(self) -> bool {
        matches!(self, PollState::Polling { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollCounters {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub ticks_skipped: u64,
}

struct Inner {
    state: PollState,
    timer: Option<JoinHandle<()>>,
    /// Bumped every time a timer is armed so ticks from a replaced timer are ignored.
    generation: u64,
    cycle: Option<JoinHandle<()>>,
}

struct Shared<B> {
    fetcher: Fetcher<B>,
    interval: Duration,
    inner: Mutex<Inner>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    started: AtomicU64,
    completed: AtomicU64,
    skipped: AtomicU64,
}

/// Drives [`Fetcher`] on a fixed interval and publishes each reconciled [`Snapshot`].
///
/// Cloning is cheap; clones control the same scheduler. `start`, `refresh_now` need to be
/// called from within a tokio runtime.
pub struct Poller<B> {
    shared: Arc<Shared<B>>,
}

impl<B> Clone for Poller<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: Backend> Poller<B> {
    pub fn new(fetcher: Fetcher<B>, interval: Duration) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::empty()));
        Self {
            shared: Arc::new(Shared {
                fetcher,
                interval,
                inner: Mutex::new(Inner {
                    state: PollState::Idle,
                    timer: None,
                    generation: 0,
                    cycle: None,
                }),
                snapshot_tx,
                started: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
            }),
        }
    }

    /// Begin polling. The first cycle runs right away. Calling it again while running is a
    /// no-op.
    pub fn start(&self) {
        let mut inner = self.shared.lock();
        let (next, action) = inner.state.on(PollEvent::Start);
        inner.state = next;
        if action == Action::ArmTimer {
            inner.generation += 1;
            let generation = inner.generation;
            let weak = Arc::downgrade(&self.shared);
            let interval = self.shared.interval;
            inner.timer = Some(tokio::spawn(timer_loop(weak, interval, generation)));
            info!(interval_ms = interval.as_millis() as u64, "polling started");
        }
    }

    /// Stop scheduling new cycles. A cycle already in flight finishes and is applied.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        let (next, action) = inner.state.on(PollEvent::Stop);
        inner.state = next;
        if action == Action::DisarmTimer {
            if let Some(timer) = inner.timer.take() {
                timer.abort();
            }
            info!(draining = next.is_polling(), "polling stopped");
        }
    }

    /// Wait for the in-flight cycle, if any, to be applied.
    pub async fn drain(&self) {
        let cycle = self.shared.lock().cycle.take();
        if let Some(handle) = cycle {
            if let Err(e) = handle.await {
                warn!(error = %e, "poll cycle task failed");
            }
        }
    }

    /// `stop` followed by `drain`, for shutdown paths.
    pub async fn shutdown(&self) {
        self.stop();
        self.drain().await;
    }

    /// Request a cycle now. Follows the same rules as a timer tick: ignored when idle,
    /// skipped while a cycle is in flight.
    pub fn refresh_now(&self) {
        Shared::tick(&self.shared, None);
    }

    pub fn state(&self) -> PollState {
        self.shared.lock().state
    }

    pub fn counters(&self) -> PollCounters {
        PollCounters {
            cycles_started: self.shared.started.load(Ordering::SeqCst),
            cycles_completed: self.shared.completed.load(Ordering::SeqCst),
            ticks_skipped: self.shared.skipped.load(Ordering::SeqCst),
        }
    }

    /// The latest published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.shared.snapshot_tx.subscribe()
    }
}

impl<B: Backend> Shared<B> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Nothing panics while holding the lock; recover the guard if it ever does.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn tick(this: &Arc<Self>, generation: Option<u64>) {
        let mut inner = this.lock();
        if generation.is_some_and(|g| g != inner.generation) {
            return;
        }
        let (next, action) = inner.state.on(PollEvent::Tick);
        inner.state = next;
        match action {
            Action::RunCycle => {
                let cycle = this.started.fetch_add(1, Ordering::SeqCst) + 1;
                inner.cycle = Some(tokio::spawn(Self::run_cycle(Arc::clone(this), cycle)));
            }
            Action::SkipTick => {
                this.skipped.fetch_add(1, Ordering::SeqCst);
                debug!("cycle still in flight, skipping tick");
            }
            _ => {}
        }
    }

    async fn run_cycle(this: Arc<Self>, cycle: u64) {
        debug!(cycle, "poll cycle started");
        let results = this.fetcher.fetch_all().await;

        for source in results.failed_sources() {
            if let Some(err) = results.error(source) {
                warn!(cycle, %source, error = %err, "source failed, keeping last known data");
            }
        }

        let prev = this.snapshot_tx.borrow().clone();
        let next = reconcile(&prev, results, Utc::now());
        this.snapshot_tx.send_replace(Arc::new(next));
        this.completed.fetch_add(1, Ordering::SeqCst);

        let mut inner = this.lock();
        let (state, _) = inner.state.on(PollEvent::CycleDone);
        inner.state = state;
        debug!(cycle, ?state, "poll cycle applied");
    }
}

async fn timer_loop<B: Backend>(shared: Weak<Shared<B>>, interval: Duration, generation: u64) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        Shared::tick(&shared, Some(generation));
    }
}
