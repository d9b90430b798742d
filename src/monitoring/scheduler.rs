//! Periodic driver that selects due APIs and fans probes out to the pool.

use chrono::Utc;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::alerting::{AppliedCheck, EvaluationService};
use crate::db::error::StoreError;
use crate::db::models::{HealthCheck, TrackedApi};
use crate::db::store::MonitorStore;
use crate::monitoring::CheckError;
use crate::monitoring::probe::Prober;
use crate::monitoring::target_locks::TargetLocks;
use crate::monitoring::worker_pool::WorkerPool;

pub const DEFAULT_TICK_SECS: u64 = 60;

type CheckResult = Result<Option<AppliedCheck>, CheckError>;

/// Work items submitted by one tick. Dropping this detaches them.
#[derive(Debug, Default)]
pub struct DispatchedChecks {
    handles: Vec<(i32, JoinHandle<CheckResult>)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub applied: usize,
    /// Already in flight, or no longer due by the time the item ran.
    pub skipped: usize,
    pub failed: usize,
}

impl DispatchedChecks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub async fn join(self) -> DispatchReport {
        let (api_ids, handles): (Vec<i32>, Vec<_>) = self.handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut report = DispatchReport::default();
        for (api_id, result) in api_ids.into_iter().zip(results) {
            match result {
                Ok(Ok(Some(_))) => report.applied += 1,
                Ok(Ok(None)) => report.skipped += 1,
                Ok(Err(_)) => report.failed += 1,
                Err(e) => {
                    error!(api_id, error = %e, "Health check task aborted.");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[derive(Clone)]
pub struct HealthCheckScheduler {
    store: Arc<dyn MonitorStore>,
    prober: Arc<dyn Prober>,
    engine: Arc<EvaluationService>,
    pool: WorkerPool,
    locks: Arc<TargetLocks>,
}

impl HealthCheckScheduler {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        prober: Arc<dyn Prober>,
        engine: Arc<EvaluationService>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            store,
            prober,
            engine,
            pool,
            locks: Arc::new(TargetLocks::new()),
        }
    }

    /// Submits one work item per due API and returns without waiting for them.
    pub async fn run_due_checks(&self) -> Result<DispatchedChecks, StoreError> {
        self.locks.prune_idle();
        let due = self.store.list_due(Utc::now()).await?;
        if due.is_empty() {
            debug!("No APIs due for a health check.");
            return Ok(DispatchedChecks::default());
        }
        info!(count = due.len(), pool_size = self.pool.size(), "Dispatching health checks.");

        let handles = due
            .into_iter()
            .map(|api| {
                let scheduler = self.clone();
                let api_id = api.id;
                let handle = self.pool.submit(async move {
                    let result = scheduler.check_scheduled(api_id).await;
                    if let Err(e) = &result {
                        warn!(api_id, error = %e, "Scheduled health check failed.");
                    }
                    result
                });
                (api_id, handle)
            })
            .collect();
        Ok(DispatchedChecks { handles })
    }

    /// Probes one API immediately, outside the pool and regardless of its due time.
    /// Waits for a scheduled probe of the same API to finish first.
    pub async fn check_now(&self, api_id: i32) -> Result<HealthCheck, CheckError> {
        let _guard = self.locks.acquire(api_id).await;
        let Some(api) = self.store.get_api(api_id).await? else {
            self.locks.forget(api_id);
            return Err(CheckError::NotFound(api_id));
        };
        let applied = self.probe_and_apply(&api).await?;
        Ok(applied.check)
    }

    /// Ticks every `period` until `shutdown` resolves, then waits for in-flight checks.
    pub async fn run_until<F>(&self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(tick_secs = period.as_secs(), "Health check scheduler started.");
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight: Vec<JoinHandle<DispatchReport>> = Vec::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    in_flight.retain(|reaper| !reaper.is_finished());
                    match self.run_due_checks().await {
                        Ok(dispatched) if !dispatched.is_empty() => {
                            in_flight.push(tokio::spawn(dispatched.join()));
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Failed to load due APIs."),
                    }
                }
            }
        }

        info!(batches = in_flight.len(), "Scheduler stopping; waiting for in-flight checks.");
        for reaper in in_flight {
            if let Ok(report) = reaper.await {
                debug!(?report, "Batch finished.");
            }
        }
    }

    async fn check_scheduled(&self, api_id: i32) -> CheckResult {
        let Some(_guard) = self.locks.try_acquire(api_id) else {
            debug!(api_id, "Check already in flight; skipping.");
            return Ok(None);
        };
        let api = match self.store.get_api(api_id).await? {
            Some(api) if api.is_due(Utc::now()) => api,
            Some(_) => {
                debug!(api_id, "API no longer due; skipping.");
                return Ok(None);
            }
            None => {
                self.locks.forget(api_id);
                return Ok(None);
            }
        };
        self.probe_and_apply(&api).await.map(Some)
    }

    async fn probe_and_apply(&self, api: &TrackedApi) -> Result<AppliedCheck, CheckError> {
        let check = self.prober.probe(api).await;
        Ok(self.engine.apply(api, check).await?)
    }
}
