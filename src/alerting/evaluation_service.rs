use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::alerting::transition::{self, ApiState, ProbeVerdict};
use crate::db::enums::AlertType;
use crate::db::error::StoreError;
use crate::db::models::{
    Alert, HealthCheck, MAX_ALERT_TITLE_LEN, MAX_ERROR_MESSAGE_LEN, NewAlert, NewHealthCheck,
    RuntimeUpdate, TrackedApi, truncate_chars,
};
use crate::db::store::MonitorStore;
use crate::server::alert_broadcaster::AlertBroadcaster;

/// Attempts before a write that keeps losing to concurrent status changes gives up.
const MAX_RECORD_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Failed to persist check outcome: {0}")]
    Store(#[from] StoreError),
}

/// Everything one applied probe wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCheck {
    pub api: TrackedApi,
    pub check: HealthCheck,
    pub alert: Option<Alert>,
}

pub struct EvaluationService {
    store: Arc<dyn MonitorStore>,
    broadcaster: AlertBroadcaster,
}

impl EvaluationService {
    pub fn new(store: Arc<dyn MonitorStore>, broadcaster: AlertBroadcaster) -> Self {
        Self { store, broadcaster }
    }

    pub fn broadcaster(&self) -> &AlertBroadcaster {
        &self.broadcaster
    }

    /// Folds one probe outcome into the API's state and persists the runtime
    /// columns, the check and any alert as one unit.
    ///
    /// The transition is computed against the stored row, not the caller's copy,
    /// so edits made while the request was in flight are respected. A concurrent
    /// status change makes the store reject the write; the outcome is then
    /// re-evaluated against the fresh row.
    pub async fn apply(
        &self,
        api: &TrackedApi,
        mut check: NewHealthCheck,
    ) -> Result<AppliedCheck, EvaluationError> {
        let now = Utc::now();
        check.api_id = api.id;
        check.error_message = check
            .error_message
            .map(|message| truncate_chars(&message, MAX_ERROR_MESSAGE_LEN));

        let mut attempt = 1;
        loop {
            let current = self
                .store
                .get_api(api.id)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("tracked api {}", api.id)))?;

            match self.record(&current, check.clone(), now).await {
                Ok(applied) => return Ok(applied),
                Err(StoreError::Conflict(reason)) if attempt < MAX_RECORD_ATTEMPTS => {
                    debug!(api_id = api.id, attempt, %reason, "API changed during check, re-evaluating.");
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        api_id = api.id,
                        api_name = %current.api_name,
                        error = %e,
                        "Failed to persist health check outcome."
                    );
                    return Err(e.into());
                }
            }
        }
    }

    async fn record(
        &self,
        current: &TrackedApi,
        check: NewHealthCheck,
        now: DateTime<Utc>,
    ) -> Result<AppliedCheck, StoreError> {
        let prior = ApiState {
            status: current.current_status,
            consecutive_failures: current.consecutive_failures,
        };
        let verdict = if check.is_up {
            ProbeVerdict::Up
        } else {
            ProbeVerdict::Failed {
                error: check.error_message.as_deref(),
            }
        };
        let transition = transition::evaluate(prior, &current.api_name, verdict);

        let update = RuntimeUpdate {
            api_id: current.id,
            prior_status: prior.status,
            prior_failures: prior.consecutive_failures,
            current_status: transition.next.status,
            consecutive_failures: transition.next.consecutive_failures,
            last_checked: now,
            next_check_at: now + current.check_interval_duration(),
        };
        let new_alert = transition.alert.map(|draft| NewAlert {
            api_id: current.id,
            user_id: current.user_id,
            alert_type: draft.alert_type,
            severity: draft.severity,
            title: truncate_chars(&draft.title, MAX_ALERT_TITLE_LEN),
            description: Some(draft.description),
            created_at: now,
        });

        let (saved_check, saved_alert) =
            self.store.record_check(&update, check, new_alert).await?;

        let mut updated = current.clone();
        update.apply_to(&mut updated);

        if prior.status != updated.current_status {
            debug!(
                api_id = updated.id,
                from = %prior.status,
                to = %updated.current_status,
                "API status changed."
            );
        }
        if let Some(alert) = &saved_alert {
            match alert.alert_type {
                AlertType::Down | AlertType::Degraded => warn!(
                    api_id = updated.id,
                    alert_id = alert.id,
                    severity = %alert.severity,
                    consecutive_failures = updated.consecutive_failures,
                    "{}",
                    alert.title
                ),
                AlertType::StatusChange => info!(
                    api_id = updated.id,
                    alert_id = alert.id,
                    "{}",
                    alert.title
                ),
            }
            self.broadcaster.publish(alert);
        }

        Ok(AppliedCheck {
            api: updated,
            check: saved_check,
            alert: saved_alert,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::{ApiStatus, HttpMethod, Severity};
    use crate::db::services::MemoryStore;
    use crate::db::store::TrackedApiStore;
    use chrono::Duration;

    fn api(status: ApiStatus, failures: i32) -> TrackedApi {
        let now = Utc::now();
        TrackedApi {
            id: 1,
            user_id: 7,
            api_name: "Payments".to_string(),
            base_url: "https://pay.example.com".to_string(),
            documentation_url: None,
            health_check_url: None,
            http_method: HttpMethod::Get,
            expected_status: 200,
            check_interval: 3600,
            current_status: status,
            last_checked: None,
            next_check_at: Some(now),
            is_active: true,
            consecutive_failures: failures,
            created_at: now,
        }
    }

    fn probe(status: i32, at: DateTime<Utc>) -> NewHealthCheck {
        let is_up = status == 200;
        NewHealthCheck {
            api_id: 1,
            checked_at: at,
            http_status: Some(status),
            response_time_ms: 42,
            is_up,
            error_message: (!is_up).then(|| format!("HTTP {status} (expected 200)")),
            response_hash: None,
        }
    }

    async fn setup(api: TrackedApi) -> (Arc<MemoryStore>, EvaluationService) {
        let store = Arc::new(MemoryStore::new());
        store.insert_api(api).await;
        let service = EvaluationService::new(store.clone(), AlertBroadcaster::default());
        (store, service)
    }

    #[tokio::test]
    async fn outage_and_recovery_produce_exactly_three_alerts() {
        let mut current = api(ApiStatus::Active, 0);
        let (store, service) = setup(current.clone()).await;

        let mut seen = Vec::new();
        for status in [500, 500, 500, 200] {
            let applied = service.apply(&current, probe(status, Utc::now())).await.unwrap();
            assert_eq!(applied.check.http_status, Some(status));
            seen.push((
                applied.api.current_status,
                applied.api.consecutive_failures,
                applied.alert.map(|a| (a.severity, a.title)),
            ));
            current = applied.api;
        }

        assert_eq!(
            seen,
            vec![
                (
                    ApiStatus::Degraded,
                    1,
                    Some((Severity::Medium, "Payments may be degraded".to_string()))
                ),
                (ApiStatus::Degraded, 2, None),
                (
                    ApiStatus::Down,
                    3,
                    Some((Severity::Critical, "Payments is DOWN".to_string()))
                ),
                (
                    ApiStatus::Active,
                    0,
                    Some((Severity::Low, "Payments has recovered".to_string()))
                ),
            ]
        );

        let alerts = store.alerts_for(1).await;
        assert_eq!(alerts.len(), 3);
        assert!(alerts[1].description.as_deref().unwrap().contains("HTTP 500 (expected 200)"));
        assert!(alerts[2].description.as_deref().unwrap().contains("after 3 failed checks"));
        assert_eq!(store.checks_for(1).await.len(), 4);
    }

    #[tokio::test]
    async fn next_check_is_last_checked_plus_interval() {
        for status in [200, 503] {
            let (store, service) = setup(api(ApiStatus::Active, 0)).await;
            let applied = service
                .apply(&api(ApiStatus::Active, 0), probe(status, Utc::now()))
                .await
                .unwrap();
            let saved = store.get_api(1).await.unwrap().unwrap();
            assert_eq!(saved, applied.api);
            let last = saved.last_checked.unwrap();
            assert_eq!(saved.next_check_at, Some(last + Duration::seconds(3600)));
        }
    }

    #[tokio::test]
    async fn deprecated_api_records_history_without_state_change() {
        let (store, service) = setup(api(ApiStatus::Deprecated, 2)).await;
        let applied = service
            .apply(&api(ApiStatus::Deprecated, 2), probe(500, Utc::now()))
            .await
            .unwrap();

        assert_eq!(applied.api.current_status, ApiStatus::Deprecated);
        assert_eq!(applied.api.consecutive_failures, 2);
        assert!(applied.api.last_checked.is_some());
        assert!(applied.alert.is_none());
        assert_eq!(store.checks_for(1).await.len(), 1);
        assert!(store.alerts_for(1).await.is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_surfaced_and_writes_nothing() {
        let (store, service) = setup(api(ApiStatus::Active, 0)).await;
        store.fail_records_for(1).await;

        let err = service
            .apply(&api(ApiStatus::Active, 0), probe(500, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluationError::Store(StoreError::Unavailable(_))));

        let saved = store.get_api(1).await.unwrap().unwrap();
        assert_eq!(saved.current_status, ApiStatus::Active);
        assert_eq!(saved.consecutive_failures, 0);
        assert!(store.checks_for(1).await.is_empty());
        assert!(store.alerts_for(1).await.is_empty());
    }

    #[tokio::test]
    async fn committed_alerts_are_broadcast() {
        let (_store, service) = setup(api(ApiStatus::Degraded, 2)).await;
        let mut rx = service.broadcaster().subscribe();

        let applied = service
            .apply(&api(ApiStatus::Degraded, 2), probe(500, Utc::now()))
            .await
            .unwrap();
        let published = rx.recv().await.unwrap();
        assert_eq!(Some(published), applied.alert);
    }

    #[tokio::test]
    async fn long_titles_and_errors_are_truncated() {
        let mut long = api(ApiStatus::Degraded, 2);
        long.api_name = "n".repeat(300);
        let (store, service) = setup(long.clone()).await;

        let mut check = probe(500, Utc::now());
        check.error_message = Some("e".repeat(900));
        let applied = service.apply(&long, check).await.unwrap();

        assert_eq!(applied.alert.unwrap().title.chars().count(), MAX_ALERT_TITLE_LEN);
        let stored = &store.checks_for(1).await[0];
        assert_eq!(
            stored.error_message.as_ref().map(|m| m.chars().count()),
            Some(MAX_ERROR_MESSAGE_LEN)
        );
    }

    #[tokio::test]
    async fn stored_row_wins_over_stale_copy() {
        let mut stored = api(ApiStatus::Deprecated, 2);
        stored.check_interval = 60;
        stored.is_active = false;
        let (store, service) = setup(stored).await;

        let applied = service
            .apply(&api(ApiStatus::Active, 0), probe(500, Utc::now()))
            .await
            .unwrap();

        let saved = store.get_api(1).await.unwrap().unwrap();
        assert_eq!(saved, applied.api);
        assert_eq!(saved.current_status, ApiStatus::Deprecated);
        assert_eq!(saved.consecutive_failures, 2);
        assert!(!saved.is_active);
        assert_eq!(
            saved.next_check_at,
            Some(saved.last_checked.unwrap() + Duration::seconds(60))
        );
        assert!(applied.alert.is_none());
        assert!(store.alerts_for(1).await.is_empty());
        assert_eq!(store.checks_for(1).await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_status_change_is_re_evaluated() {
        let (store, service) = setup(api(ApiStatus::Active, 0)).await;
        store.edit_before_next_record(api(ApiStatus::Degraded, 2)).await;

        let applied = service
            .apply(&api(ApiStatus::Active, 0), probe(500, Utc::now()))
            .await
            .unwrap();

        assert_eq!(applied.api.current_status, ApiStatus::Down);
        assert_eq!(applied.api.consecutive_failures, 3);
        assert_eq!(applied.alert.map(|a| a.severity), Some(Severity::Critical));
        let alerts = store.alerts_for(1).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Payments is DOWN");
        assert_eq!(store.checks_for(1).await.len(), 1);
    }

    #[tokio::test]
    async fn deleted_api_is_not_found() {
        let (store, service) = setup(api(ApiStatus::Active, 0)).await;
        store.delete_api(1).await.unwrap();

        let err = service
            .apply(&api(ApiStatus::Active, 0), probe(500, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluationError::Store(StoreError::NotFound(_))));
        assert!(store.checks_for(1).await.is_empty());
    }
}
