//! In-process store backed by hash maps.
//!
//! Used by tests and for ephemeral runs without a database. A single mutex
//! guards all three tables, which makes `record_check` trivially atomic.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

use crate::db::enums::{ApiStatus, HttpMethod};
use crate::db::error::StoreError;
use crate::db::models::{
    Alert, AlertFilter, DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_EXPECTED_STATUS, HealthCheck,
    INITIAL_CHECK_DELAY_SECS, NewAlert, NewHealthCheck, NewTrackedApi, Page, PageParams,
    RuntimeUpdate, TrackedApi,
};
use crate::db::store::{AlertStore, CheckRecorder, HealthCheckStore, TrackedApiStore};

#[derive(Default)]
struct MemoryState {
    apis: BTreeMap<i32, TrackedApi>,
    checks: BTreeMap<i32, HealthCheck>,
    alerts: BTreeMap<i32, Alert>,
    next_api_id: i32,
    next_check_id: i32,
    next_alert_id: i32,
    unavailable_apis: BTreeSet<i32>,
    #[cfg(test)]
    edits_before_record: BTreeMap<i32, TrackedApi>,
}

impl MemoryState {
    fn insert_check(&mut self, check: NewHealthCheck) -> HealthCheck {
        self.next_check_id += 1;
        let saved = HealthCheck {
            id: self.next_check_id,
            api_id: check.api_id,
            checked_at: check.checked_at,
            http_status: check.http_status,
            response_time_ms: check.response_time_ms,
            is_up: check.is_up,
            error_message: check.error_message,
            response_hash: check.response_hash,
        };
        self.checks.insert(saved.id, saved.clone());
        saved
    }

    fn insert_alert(&mut self, alert: NewAlert) -> Alert {
        self.next_alert_id += 1;
        let saved = Alert {
            id: self.next_alert_id,
            api_id: alert.api_id,
            user_id: alert.user_id,
            alert_type: alert.alert_type,
            severity: alert.severity,
            title: alert.title,
            description: alert.description,
            is_resolved: false,
            resolved_at: None,
            created_at: alert.created_at,
        };
        self.alerts.insert(saved.id, saved.clone());
        saved
    }

    fn checks_since(&self, api_id: i32, since: DateTime<Utc>) -> impl Iterator<Item = &HealthCheck> {
        self.checks
            .values()
            .filter(move |c| c.api_id == api_id && c.checked_at >= since)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed record, keeping its id. Intended for seeding tests.
    pub async fn insert_api(&self, api: TrackedApi) {
        let mut state = self.state.lock().await;
        state.next_api_id = state.next_api_id.max(api.id);
        state.apis.insert(api.id, api);
    }

    /// Makes every later `record_check` for `api_id` fail as if the database were down.
    #[cfg(test)]
    pub async fn fail_records_for(&self, api_id: i32) {
        self.state.lock().await.unavailable_apis.insert(api_id);
    }

    /// Replaces the API row just before the next `record_check` for it, as a
    /// concurrent writer would.
    #[cfg(test)]
    pub async fn edit_before_next_record(&self, api: TrackedApi) {
        self.state.lock().await.edits_before_record.insert(api.id, api);
    }

    /// All health checks of an API, oldest first.
    pub async fn checks_for(&self, api_id: i32) -> Vec<HealthCheck> {
        let state = self.state.lock().await;
        state
            .checks
            .values()
            .filter(|c| c.api_id == api_id)
            .cloned()
            .collect()
    }

    /// All alerts of an API, oldest first.
    pub async fn alerts_for(&self, api_id: i32) -> Vec<Alert> {
        let state = self.state.lock().await;
        state
            .alerts
            .values()
            .filter(|a| a.api_id == api_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TrackedApiStore for MemoryStore {
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<TrackedApi>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .apis
            .values()
            .filter(|api| api.is_due(now))
            .cloned()
            .collect())
    }

    async fn get_api(&self, api_id: i32) -> Result<Option<TrackedApi>, StoreError> {
        Ok(self.state.lock().await.apis.get(&api_id).cloned())
    }

    async fn save_api(&self, api: &TrackedApi) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        match state.apis.get_mut(&api.id) {
            Some(existing) => {
                *existing = api.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("tracked api {}", api.id))),
        }
    }

    async fn list_apis_by_user(&self, user_id: i32) -> Result<Vec<TrackedApi>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .apis
            .values()
            .filter(|api| api.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_api(&self, new_api: NewTrackedApi) -> Result<TrackedApi, StoreError> {
        let mut state = self.state.lock().await;
        state.next_api_id += 1;
        let now = Utc::now();
        let api = TrackedApi {
            id: state.next_api_id,
            user_id: new_api.user_id,
            api_name: new_api.api_name,
            base_url: new_api.base_url,
            documentation_url: new_api.documentation_url,
            health_check_url: new_api.health_check_url,
            http_method: new_api.http_method.unwrap_or(HttpMethod::Get),
            expected_status: new_api.expected_status.unwrap_or(DEFAULT_EXPECTED_STATUS),
            check_interval: new_api.check_interval.unwrap_or(DEFAULT_CHECK_INTERVAL_SECS),
            current_status: ApiStatus::Unknown,
            last_checked: None,
            next_check_at: Some(now + Duration::seconds(INITIAL_CHECK_DELAY_SECS)),
            is_active: new_api.is_active.unwrap_or(true),
            consecutive_failures: 0,
            created_at: now,
        };
        state.apis.insert(api.id, api.clone());
        Ok(api)
    }

    async fn delete_api(&self, api_id: i32) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if state.apis.remove(&api_id).is_none() {
            return Ok(false);
        }
        state.checks.retain(|_, c| c.api_id != api_id);
        state.alerts.retain(|_, a| a.api_id != api_id);
        Ok(true)
    }
}

#[async_trait]
impl HealthCheckStore for MemoryStore {
    async fn append_check(&self, check: NewHealthCheck) -> Result<HealthCheck, StoreError> {
        Ok(self.state.lock().await.insert_check(check))
    }

    async fn list_checks_by_api(
        &self,
        api_id: i32,
        params: PageParams,
    ) -> Result<Page<HealthCheck>, StoreError> {
        let state = self.state.lock().await;
        let mut checks: Vec<HealthCheck> = state
            .checks
            .values()
            .filter(|c| c.api_id == api_id)
            .cloned()
            .collect();
        checks.sort_by(|a, b| b.checked_at.cmp(&a.checked_at).then(b.id.cmp(&a.id)));
        Ok(Page::from_sorted(checks, params))
    }

    async fn avg_response_time_since(
        &self,
        api_id: i32,
        since: DateTime<Utc>,
    ) -> Result<Option<f64>, StoreError> {
        let state = self.state.lock().await;
        let (sum, count) = state
            .checks_since(api_id, since)
            .filter(|c| c.is_up)
            .fold((0i64, 0u64), |(sum, count), c| {
                (sum + i64::from(c.response_time_ms), count + 1)
            });
        Ok((count > 0).then(|| sum as f64 / count as f64))
    }

    async fn count_successful_since(
        &self,
        api_id: i32,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.checks_since(api_id, since).filter(|c| c.is_up).count() as u64)
    }

    async fn count_total_since(
        &self,
        api_id: i32,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.checks_since(api_id, since).count() as u64)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn append_alert(&self, alert: NewAlert) -> Result<Alert, StoreError> {
        Ok(self.state.lock().await.insert_alert(alert))
    }

    async fn list_alerts_by_user(
        &self,
        user_id: i32,
        filter: AlertFilter,
        params: PageParams,
    ) -> Result<Page<Alert>, StoreError> {
        let state = self.state.lock().await;
        let mut alerts: Vec<Alert> = state
            .alerts
            .values()
            .filter(|a| a.user_id == user_id && filter.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(Page::from_sorted(alerts, params))
    }

    async fn count_alerts_by_user(
        &self,
        user_id: i32,
        filter: AlertFilter,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .alerts
            .values()
            .filter(|a| a.user_id == user_id && filter.matches(a))
            .count() as u64)
    }

    async fn resolve_alert(&self, alert_id: i32) -> Result<Option<Alert>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.alerts.get_mut(&alert_id).map(|alert| {
            if !alert.is_resolved {
                alert.is_resolved = true;
                alert.resolved_at = Some(Utc::now());
            }
            alert.clone()
        }))
    }
}

#[async_trait]
impl CheckRecorder for MemoryStore {
    async fn record_check(
        &self,
        update: &RuntimeUpdate,
        check: NewHealthCheck,
        alert: Option<NewAlert>,
    ) -> Result<(HealthCheck, Option<Alert>), StoreError> {
        let mut state = self.state.lock().await;
        if state.unavailable_apis.contains(&update.api_id) {
            return Err(StoreError::Unavailable(format!(
                "writes for tracked api {}",
                update.api_id
            )));
        }
        #[cfg(test)]
        if let Some(edited) = state.edits_before_record.remove(&update.api_id) {
            state.apis.insert(edited.id, edited);
        }
        let Some(existing) = state.apis.get_mut(&update.api_id) else {
            return Err(StoreError::NotFound(format!("tracked api {}", update.api_id)));
        };
        if !update.matches_prior(existing) {
            return Err(StoreError::Conflict(format!(
                "tracked api {} changed while it was being checked",
                update.api_id
            )));
        }
        update.apply_to(existing);
        let saved_check = state.insert_check(check);
        let saved_alert = alert.map(|a| state.insert_alert(a));
        Ok((saved_check, saved_alert))
    }
}
