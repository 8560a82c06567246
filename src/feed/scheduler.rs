use std::future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::feed::refresh::Refresher;

/// Sweep period of the reference deployment
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Control handle for the background sweep task.
pub struct SchedulerHandle {
    shutdown_tx: broadcast::Sender<()>,
    trigger_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask for a sweep now.
    ///
    /// Returns `false` when a manual trigger is already pending. A trigger
    /// that lands while a sweep runs is dropped by the overlap guard.
    pub fn trigger(&self) -> bool {
        self.trigger_tx.try_send(()).is_ok()
    }

    /// Stop the scheduler loop.
    ///
    /// Does not wait for a sweep already in flight; it finishes on its own
    /// or is dropped with the runtime.
    pub async fn stop(self) -> Result<(), JoinError> {
        let _ = self.shutdown_tx.send(());
        self.join.await
    }
}

/// Spawn the scheduler task.
///
/// With `Some(period)` a sweep starts every `period`, the first one a full
/// period after start. `None` disables the timer; sweeps then run only on
/// [`SchedulerHandle::trigger`]. Each sweep runs on its own task so the
/// loop keeps answering shutdown while feeds are being fetched.
pub fn spawn_scheduler(refresher: Arc<Refresher>, period: Option<Duration>) -> SchedulerHandle {
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let (trigger_tx, mut trigger_rx) = mpsc::channel(1);

    let join = tokio::spawn(async move {
        let mut ticker = period.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        info!(interval = ?period, "Scheduler started");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Scheduler shutdown requested");
                    break;
                }
                _ = next_tick(&mut ticker) => launch_sweep(&refresher, "timer"),
                Some(()) = trigger_rx.recv() => launch_sweep(&refresher, "manual"),
            }
        }
    });

    SchedulerHandle {
        shutdown_tx,
        trigger_tx,
        join,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}

fn launch_sweep(refresher: &Arc<Refresher>, cause: &'static str) {
    let refresher = Arc::clone(refresher);
    tokio::spawn(async move {
        if refresher.sweep().await.is_none() {
            debug!(cause, "Previous sweep still running, trigger skipped");
        }
    });
}
