pub mod probe;
pub mod scheduler;
pub mod target_locks;
pub mod worker_pool;

use crate::alerting::EvaluationError;
use crate::db::error::StoreError;

pub use probe::{HttpProber, ProbeSetupError, Prober};
pub use scheduler::{DispatchReport, DispatchedChecks, HealthCheckScheduler};
pub use worker_pool::WorkerPool;

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("Tracked API {0} not found")]
    NotFound(i32),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}
