//! Cycle scheduler.
//!
//! Fires one orchestrator cycle per interval tick. Cycles never overlap: a
//! tick that arrives while the previous cycle is still running is skipped.
//! A failed cycle is logged and the scheduler keeps going. On shutdown the
//! ticker stops and any in-flight cycle is allowed to finish.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::orchestrator::{CycleOrchestrator, CycleReport};

/// Running counters, shared with spawned cycle tasks.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    ticks: AtomicU64,
    started: AtomicU64,
    skipped: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub started: u64,
    pub skipped: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl SchedulerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

pub struct Scheduler {
    interval: Duration,
    /// Held by the running cycle for its whole lifetime.
    in_flight: Arc<Mutex<()>>,
    stats: Arc<SchedulerStats>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            in_flight: Arc::new(Mutex::new(())),
            stats: Arc::new(SchedulerStats::default()),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Tick until `shutdown` resolves, then wait for the in-flight cycle.
    ///
    /// The first tick fires immediately.
    pub async fn run<F>(&self, orchestrator: Arc<CycleOrchestrator>, shutdown: F) -> StatsSnapshot
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            interval_secs = self.interval.as_secs(),
            "Entering main loop. Press Ctrl+C to stop."
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.fire(&orchestrator);
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    break;
                }
            }
        }

        // Blocks until the running cycle, if any, releases its guard.
        drop(self.in_flight.lock().await);

        let stats = self.stats();
        info!(
            cycles = stats.started,
            succeeded = stats.succeeded,
            failed = stats.failed,
            skipped = stats.skipped,
            "Scheduler stopped"
        );
        stats
    }

    /// Handle one tick: start a cycle unless one is already running.
    ///
    /// Returns the spawned cycle task, or `None` if the tick was skipped.
    pub fn fire(&self, orchestrator: &Arc<CycleOrchestrator>) -> Option<JoinHandle<()>> {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);

        let permit = match self.in_flight.clone().try_lock_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                warn!("Previous cycle still running, skipping tick");
                return None;
            }
        };

        let cycle = self.stats.started.fetch_add(1, Ordering::Relaxed) + 1;
        let orchestrator = Arc::clone(orchestrator);
        let stats = Arc::clone(&self.stats);

        Some(tokio::spawn(async move {
            let _permit = permit;
            info!(cycle, "Starting cycle");

            match orchestrator.run_cycle().await {
                Ok(report) => {
                    stats.succeeded.fetch_add(1, Ordering::Relaxed);
                    log_cycle_report(cycle, &report);
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        cycle,
                        stage = e.stage(),
                        error = %e,
                        "Cycle aborted, continuing to next"
                    );
                }
            }
        }))
    }
}

fn log_cycle_report(cycle: u64, report: &CycleReport) {
    info!(
        cycle,
        height = report.height,
        mode = ?report.mode,
        kind = %report.intent.kind,
        intent = %report.intent,
        tx_hash = %report.receipt.tx_hash,
        dry_run = report.receipt.dry_run,
        "Cycle complete"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
