//! Store seams consumed by the health-check engine.
//!
//! The engine never talks to a database directly. It depends on these traits,
//! which are implemented by [`SeaOrmStore`](crate::db::services::SeaOrmStore)
//! for production and [`MemoryStore`](crate::db::services::MemoryStore) for
//! tests and ephemeral runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::error::StoreError;
use crate::db::models::{
    Alert, AlertFilter, HealthCheck, NewAlert, NewHealthCheck, NewTrackedApi, Page, PageParams,
    RuntimeUpdate, TrackedApi,
};

/// Persisted tracked-API records.
#[async_trait]
pub trait TrackedApiStore: Send + Sync {
    /// Active APIs whose `next_check_at` is at or before `now`.
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<TrackedApi>, StoreError>;

    async fn get_api(&self, api_id: i32) -> Result<Option<TrackedApi>, StoreError>;

    async fn save_api(&self, api: &TrackedApi) -> Result<(), StoreError>;

    async fn list_apis_by_user(&self, user_id: i32) -> Result<Vec<TrackedApi>, StoreError>;

    /// Registers an API; the first check is due [`INITIAL_CHECK_DELAY_SECS`] from now.
    ///
    /// [`INITIAL_CHECK_DELAY_SECS`]: crate::db::models::INITIAL_CHECK_DELAY_SECS
    async fn create_api(&self, new_api: NewTrackedApi) -> Result<TrackedApi, StoreError>;

    /// Deletes an API together with its health checks and alerts.
    /// Returns `false` when no such API exists.
    async fn delete_api(&self, api_id: i32) -> Result<bool, StoreError>;
}

/// Append-only probe history.
#[async_trait]
pub trait HealthCheckStore: Send + Sync {
    async fn append_check(&self, check: NewHealthCheck) -> Result<HealthCheck, StoreError>;

    /// Newest first.
    async fn list_checks_by_api(
        &self,
        api_id: i32,
        params: PageParams,
    ) -> Result<Page<HealthCheck>, StoreError>;

    /// Average response time of successful checks since `since`.
    async fn avg_response_time_since(
        &self,
        api_id: i32,
        since: DateTime<Utc>,
    ) -> Result<Option<f64>, StoreError>;

    async fn count_successful_since(
        &self,
        api_id: i32,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn count_total_since(&self, api_id: i32, since: DateTime<Utc>)
    -> Result<u64, StoreError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn append_alert(&self, alert: NewAlert) -> Result<Alert, StoreError>;

    /// Newest first.
    async fn list_alerts_by_user(
        &self,
        user_id: i32,
        filter: AlertFilter,
        params: PageParams,
    ) -> Result<Page<Alert>, StoreError>;

    async fn count_alerts_by_user(
        &self,
        user_id: i32,
        filter: AlertFilter,
    ) -> Result<u64, StoreError>;

    async fn count_unresolved_by_user(&self, user_id: i32) -> Result<u64, StoreError> {
        self.count_alerts_by_user(
            user_id,
            AlertFilter {
                resolved: Some(false),
                severity: None,
            },
        )
        .await
    }

    /// Marks the alert resolved. Returns `None` when the alert does not exist.
    async fn resolve_alert(&self, alert_id: i32) -> Result<Option<Alert>, StoreError>;
}

/// Writes the outcome of one check as a single unit: the API's runtime
/// columns, then the health check, then the alert if any. Either all three
/// land or none.
///
/// The API row is only updated while it still matches
/// `update.prior_status`/`update.prior_failures`; otherwise the call fails
/// with [`StoreError::Conflict`] and nothing is written. Configuration columns
/// (name, URL, interval, active flag) are never touched.
#[async_trait]
pub trait CheckRecorder: Send + Sync {
    async fn record_check(
        &self,
        update: &RuntimeUpdate,
        check: NewHealthCheck,
        alert: Option<NewAlert>,
    ) -> Result<(HealthCheck, Option<Alert>), StoreError>;
}

/// Everything the engine and the read side need from persistence.
pub trait MonitorStore: TrackedApiStore + HealthCheckStore + AlertStore + CheckRecorder {}

impl<T> MonitorStore for T where T: TrackedApiStore + HealthCheckStore + AlertStore + CheckRecorder
{}
