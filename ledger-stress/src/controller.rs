//! Lifecycle controller
//!
//! Owns the cancellation token and the task tracker. Workers only ever see a
//! clone of the token; the tracker's live count is the completion counter the
//! drain waits on.

use crate::classifier::OutcomeClassifier;
use crate::config::WorkloadConfig;
use crate::worker::{ChurnSettings, Worker, WorkerRole};
use ledger_accounting::{Accounting, LedgerStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, info_span, warn, Instrument, Span};

/// Spawns the worker pool and drains it on shutdown
#[derive(Debug)]
pub struct LifecycleController<S> {
    accounting: Arc<Accounting<S>>,
    classifier: OutcomeClassifier,
    config: WorkloadConfig,
    run_span: Span,
    token: CancellationToken,
    tracker: TaskTracker,
    started: AtomicBool,
}

impl<S: LedgerStore + 'static> LifecycleController<S> {
    /// Controller for a pool shaped by `config`; nothing runs until [`start`](Self::start)
    pub fn new(
        accounting: Arc<Accounting<S>>,
        classifier: OutcomeClassifier,
        config: WorkloadConfig,
        run_span: Span,
    ) -> Self {
        Self {
            accounting,
            classifier,
            config,
            run_span,
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Spawn every worker without waiting for them to start.
    ///
    /// Returns how many were spawned; a second call spawns nothing.
    pub fn start(&self) -> usize {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(parent: &self.run_span, "Worker pool already started");
            return 0;
        }

        let seed = self.config.rng_seed.unwrap_or_else(rand::random);
        let mut master = StdRng::seed_from_u64(seed);
        let churn = ChurnSettings {
            interval: self.config.churn_interval(),
            replacement_balance_cents: self.config.replacement_balance_cents,
        };

        let mut spawned = 0;
        for index in 0..self.config.worker_pairs {
            for role in [WorkerRole::Reader, WorkerRole::Transactor] {
                self.spawn(role, index, churn, StdRng::seed_from_u64(master.gen()));
                spawned += 1;
            }
        }
        self.spawn(
            WorkerRole::Churner,
            0,
            churn,
            StdRng::seed_from_u64(master.gen()),
        );
        spawned += 1;

        self.tracker.close();
        info!(parent: &self.run_span, workers = spawned, seed, "Worker pool started");
        spawned
    }

    fn spawn(&self, role: WorkerRole, index: usize, churn: ChurnSettings, rng: StdRng) {
        let worker = Worker::new(
            role,
            Arc::clone(&self.accounting),
            self.classifier.clone(),
            churn,
            rng,
        );
        let span = info_span!(parent: &self.run_span, "worker", role = %role, index);
        self.tracker
            .spawn(worker.run(self.token.clone()).instrument(span));
    }

    /// Workers that have not exited yet
    pub fn active_workers(&self) -> usize {
        self.tracker.len()
    }

    /// Clone of the shared token, for collaborators that stop with the pool
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fire the cancellation signal; later calls do nothing
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!(parent: &self.run_span, "Shutdown requested");
        }
        self.token.cancel();
    }

    /// Block until every spawned worker has exited
    pub async fn drain(&self) {
        info!(parent: &self.run_span, active = self.active_workers(), "waiting for workers");
        self.tracker.close();
        self.tracker.wait().await;
        info!(parent: &self.run_span, "All workers stopped");
    }

    /// Wait for `signal`, then cancel and drain
    pub async fn run_until<F: Future>(&self, signal: F) {
        signal.await;
        self.shutdown();
        self.drain().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Metrics;
    use ledger_accounting::MemoryStore;
    use std::time::Duration;

    fn controller(pairs: usize) -> LifecycleController<MemoryStore> {
        let metrics = Metrics::new("test").unwrap();
        let config = WorkloadConfig {
            worker_pairs: pairs,
            churn_interval_ms: 1,
            rng_seed: Some(42),
            ..WorkloadConfig::default()
        };
        LifecycleController::new(
            Arc::new(Accounting::new(MemoryStore::new())),
            OutcomeClassifier::new(Arc::new(metrics)),
            config,
            Span::none(),
        )
    }

    #[tokio::test]
    async fn test_start_spawns_pairs_plus_churner() {
        let controller = controller(3);
        assert_eq!(controller.start(), 7);
        assert_eq!(controller.start(), 0);

        controller.shutdown();
        controller.drain().await;
        assert_eq!(controller.active_workers(), 0);
    }

    #[tokio::test]
    async fn test_drain_without_start_returns() {
        let controller = controller(1);
        controller.shutdown();
        tokio::time::timeout(Duration::from_secs(1), controller.drain())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_after_early_drain_still_spawns() {
        let controller = controller(1);
        controller.drain().await;

        assert_eq!(controller.start(), 3);
        assert_eq!(controller.active_workers(), 3);

        controller.shutdown();
        controller.drain().await;
        assert_eq!(controller.active_workers(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_is_one_shot() {
        let controller = controller(1);
        let token = controller.token();
        controller.shutdown();
        controller.shutdown();
        assert!(token.is_cancelled());
    }
}
