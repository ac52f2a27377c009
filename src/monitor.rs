use chrono::{DateTime, Utc};
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::{
    select,
    sync::watch,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::models::{CheckResult, MonitorState};
use crate::probe::{HttpProbe, Probe};
use crate::strategy::FallbackStrategy;
use crate::target::{CHECK_INTERVAL, Target};

/// Source of check timestamps.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Lifecycle of the scheduled loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopped,
}

enum LoopState {
    Idle,
    Running(CancellationToken),
    Stopped,
}

struct Shared<P, C> {
    strategy: FallbackStrategy<P>,
    target: Target,
    clock: C,
    state: watch::Sender<MonitorState>,
    // Bumped by every stop(). A cycle only applies its result if the epoch it
    // started in is still current, checked under this lock.
    epoch: Mutex<u64>,
}

impl<P: Probe, C: Clock> Shared<P, C> {
    async fn run_cycle(&self) -> Option<CheckResult> {
        let epoch = *lock(&self.epoch);
        let status = self.strategy.resolve(&self.target).await;
        let result = CheckResult {
            status,
            checked_at: self.clock.now(),
        };

        let current = lock(&self.epoch);
        if *current != epoch {
            debug!("Discarding {status} result finished after stop");
            return None;
        }
        self.state.send_replace(result.into());
        debug!("Last checked updated: {}", result.checked_at.to_rfc3339());
        Some(result)
    }
}

/// Periodically checks one [`Target`] and publishes its [`MonitorState`].
///
/// The monitor is the only writer of the state. Consumers either poll
/// [`Monitor::state`] or [`Monitor::subscribe`] to changes. Every published
/// state pairs a status with the timestamp of the cycle that produced it.
pub struct Monitor<P = HttpProbe, C = SystemClock> {
    shared: Arc<Shared<P, C>>,
    run: Mutex<LoopState>,
}

impl<P: Probe + 'static> Monitor<P, SystemClock> {
    #[must_use]
    pub fn new(target: Target, probe: P) -> Self {
        Self::with_clock(target, probe, SystemClock)
    }
}

impl<P: Probe + 'static, C: Clock> Monitor<P, C> {
    #[must_use]
    pub fn with_clock(target: Target, probe: P, clock: C) -> Self {
        let (state, _) = watch::channel(MonitorState::default());
        Self {
            shared: Arc::new(Shared {
                strategy: FallbackStrategy::new(probe),
                target,
                clock,
                state,
                epoch: Mutex::new(0),
            }),
            run: Mutex::new(LoopState::Idle),
        }
    }

    #[must_use]
    pub fn target(&self) -> &Target {
        &self.shared.target
    }

    /// Current status and last-checked time.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        *self.shared.state.borrow()
    }

    /// Receiver notified on every applied check result.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn run_state(&self) -> RunState {
        match *lock(&self.run) {
            LoopState::Idle => RunState::Idle,
            LoopState::Running(_) => RunState::Running,
            LoopState::Stopped => RunState::Stopped,
        }
    }

    /// Starts the scheduled loop: one check right away, then one every
    /// [`CHECK_INTERVAL`].
    ///
    /// A loop that is already running is cancelled and replaced, so there is
    /// never more than one schedule.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn start(&self) {
        let mut run = lock(&self.run);
        if let LoopState::Running(token) = &*run {
            info!("Restarting monitor loop");
            token.cancel();
        } else {
            info!("Starting monitor loop for {}", self.shared.target.primary());
        }

        let token = CancellationToken::new();
        tokio::spawn(run_schedule(Arc::clone(&self.shared), token.clone()));
        *run = LoopState::Running(token);
    }

    /// Cancels the scheduled loop. Results of checks still in flight are
    /// dropped. Does nothing unless the loop is running.
    pub fn stop(&self) {
        let mut run = lock(&self.run);
        let LoopState::Running(token) = &*run else {
            debug!("Stop requested but monitor loop is not running");
            return;
        };

        info!("Stopping monitor loop");
        *lock(&self.shared.epoch) += 1;
        token.cancel();
        *run = LoopState::Stopped;
    }

    /// Runs one check cycle right away without touching the schedule.
    ///
    /// Returns the applied result, or `None` if [`Monitor::stop`] was called
    /// while the check was in flight.
    pub async fn check_now(&self) -> Option<CheckResult> {
        info!("Manual check requested");
        self.shared.run_cycle().await
    }
}

impl<P, C> Drop for Monitor<P, C> {
    fn drop(&mut self) {
        if let LoopState::Running(token) = &*lock(&self.run) {
            token.cancel();
        }
    }
}

async fn run_schedule<P: Probe, C: Clock>(shared: Arc<Shared<P, C>>, token: CancellationToken) {
    let mut ticker = time::interval(CHECK_INTERVAL);

    loop {
        select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        select! {
            biased;
            () = token.cancelled() => break,
            _ = shared.run_cycle() => {}
        }

        // Ticks missed while a cycle overran are dropped and the next cycle
        // waits a full period from when the slow one finished.
        let elapsed = started.elapsed();
        if elapsed >= CHECK_INTERVAL {
            debug!("Check took {}s, delaying the next one", elapsed.as_secs());
            ticker.reset();
        }
    }

    info!("Monitor loop for {} stopped", shared.target.primary());
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
