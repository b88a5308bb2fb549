//! Periodic background TTL sweep.
//!
//! The first sweep runs as soon as the scheduler starts, then once per
//! interval. A tick that arrives while a sweep is still running is skipped.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::MemoryEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Sweeping,
}

pub struct SweepScheduler {
    shutdown_tx: watch::Sender<bool>,
    cancel: Arc<AtomicBool>,
    sweeping: Arc<AtomicBool>,
    completed: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl SweepScheduler {
    pub fn spawn(engine: MemoryEngine, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cancel = Arc::new(AtomicBool::new(false));
        let sweeping = Arc::new(AtomicBool::new(false));
        let completed = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(run_loop(
            engine,
            interval.max(Duration::from_millis(1)),
            shutdown_rx,
            Arc::clone(&cancel),
            Arc::clone(&sweeping),
            Arc::clone(&completed),
        ));
        tracing::info!(interval_secs = interval.as_secs(), "sweep scheduler started");

        Self {
            shutdown_tx,
            cancel,
            sweeping,
            completed,
            handle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.sweeping.load(Ordering::SeqCst) {
            SchedulerState::Sweeping
        } else {
            SchedulerState::Idle
        }
    }

    /// Sweeps finished since the scheduler started, including failed ones.
    pub fn completed_sweeps(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Cancel any running sweep between entries, stop the loop and wait for it.
    pub async fn shutdown(self) {
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "sweep scheduler task ended abnormally");
        }
        tracing::info!("sweep scheduler stopped");
    }
}

async fn run_loop(
    engine: MemoryEngine,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    cancel: Arc<AtomicBool>,
    sweeping: Arc<AtomicBool>,
    completed: Arc<AtomicU64>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut current: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if sweeping.swap(true, Ordering::SeqCst) {
                    tracing::debug!("previous sweep still running, skipping tick");
                    continue;
                }
                let engine = engine.clone();
                let cancel = Arc::clone(&cancel);
                let sweeping = Arc::clone(&sweeping);
                let completed = Arc::clone(&completed);
                current = Some(tokio::spawn(async move {
                    match engine.run_sweep(false, cancel).await {
                        Ok(report) => tracing::debug!(
                            evicted = report.evicted,
                            errors = report.errors,
                            cancelled = report.cancelled,
                            "scheduled sweep done"
                        ),
                        Err(e) => tracing::warn!(error = %e, "scheduled sweep failed"),
                    }
                    completed.fetch_add(1, Ordering::SeqCst);
                    sweeping.store(false, Ordering::SeqCst);
                }));
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    if let Some(task) = current {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "in-flight sweep ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrataConfig;
    use rusqlite::params;

    async fn wait_for(scheduler: &SweepScheduler, sweeps: u64) {
        for _ in 0..200 {
            if scheduler.completed_sweeps() >= sweeps {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("scheduler did not complete {sweeps} sweeps");
    }

    #[tokio::test]
    async fn periodic_sweep_evicts_expired_entries() {
        let engine = MemoryEngine::in_memory(StrataConfig::default()).unwrap();
        engine
            .connection()
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO cache_entries (key, value, category, created_at, expires_at)
                 VALUES (?1, 'x', 'stock', 0, 1)",
                params!["stale"],
            )
            .unwrap();

        let scheduler = SweepScheduler::spawn(engine.clone(), Duration::from_millis(20));
        wait_for(&scheduler, 2).await;
        assert!(engine.cache_get("stale").await.unwrap().is_none());

        let remaining: i64 = engine
            .connection()
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_prompt_with_long_interval() {
        let engine = MemoryEngine::in_memory(StrataConfig::default()).unwrap();
        let scheduler = SweepScheduler::spawn(engine, Duration::from_secs(3600));
        wait_for(&scheduler, 1).await;
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        tokio::time::timeout(Duration::from_secs(2), scheduler.shutdown())
            .await
            .unwrap();
    }
}
