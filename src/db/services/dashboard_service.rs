//! Per-user summary and per-API health statistics.

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::db::enums::{ApiStatus, Severity};
use crate::db::error::StoreError;
use crate::db::models::AlertFilter;
use crate::db::store::MonitorStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_apis: u64,
    pub active_apis: u64,
    pub degraded_apis: u64,
    pub down_apis: u64,
    pub open_alerts: u64,
    pub critical_alerts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealthStats {
    pub api_id: i32,
    pub window_hours: i64,
    pub total_checks: u64,
    pub successful_checks: u64,
    /// `None` when there were no checks in the window.
    pub uptime_percent: Option<f64>,
    pub avg_response_time_ms: Option<f64>,
}

pub async fn summary<S>(store: &S, user_id: i32) -> Result<DashboardSummary, StoreError>
where
    S: MonitorStore + ?Sized,
{
    let apis = store.list_apis_by_user(user_id).await?;
    let count_status =
        |status: ApiStatus| apis.iter().filter(|a| a.current_status == status).count() as u64;

    let open_alerts = store.count_unresolved_by_user(user_id).await?;
    let critical_alerts = store
        .count_alerts_by_user(
            user_id,
            AlertFilter {
                resolved: Some(false),
                severity: Some(Severity::Critical),
            },
        )
        .await?;

    Ok(DashboardSummary {
        total_apis: apis.len() as u64,
        active_apis: count_status(ApiStatus::Active),
        degraded_apis: count_status(ApiStatus::Degraded),
        down_apis: count_status(ApiStatus::Down),
        open_alerts,
        critical_alerts,
    })
}

pub async fn api_stats<S>(
    store: &S,
    api_id: i32,
    window: Duration,
) -> Result<ApiHealthStats, StoreError>
where
    S: MonitorStore + ?Sized,
{
    let since = Utc::now() - window;
    let total_checks = store.count_total_since(api_id, since).await?;
    let successful_checks = store.count_successful_since(api_id, since).await?;
    let avg_response_time_ms = store.avg_response_time_since(api_id, since).await?;

    let uptime_percent =
        (total_checks > 0).then(|| successful_checks as f64 * 100.0 / total_checks as f64);

    Ok(ApiHealthStats {
        api_id,
        window_hours: window.num_hours(),
        total_checks,
        successful_checks,
        uptime_percent,
        avg_response_time_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::AlertType;
    use crate::db::models::{NewAlert, NewHealthCheck, NewTrackedApi};
    use crate::db::services::MemoryStore;
    use crate::db::store::{AlertStore, HealthCheckStore, TrackedApiStore};

    #[tokio::test]
    async fn summary_counts_statuses_and_open_alerts() {
        let store = MemoryStore::new();
        for (name, status) in [
            ("a", ApiStatus::Active),
            ("b", ApiStatus::Active),
            ("c", ApiStatus::Degraded),
            ("d", ApiStatus::Down),
            ("e", ApiStatus::Unknown),
        ] {
            let mut api = store
                .create_api(NewTrackedApi::new(1, name, "http://example.com"))
                .await
                .unwrap();
            api.current_status = status;
            store.save_api(&api).await.unwrap();
        }
        store
            .create_api(NewTrackedApi::new(2, "other user", "http://example.com"))
            .await
            .unwrap();

        for severity in [Severity::Critical, Severity::Medium, Severity::Critical] {
            store
                .append_alert(NewAlert {
                    api_id: 4,
                    user_id: 1,
                    alert_type: AlertType::Down,
                    severity,
                    title: "d is DOWN".to_string(),
                    description: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        store.resolve_alert(1).await.unwrap();

        let summary = summary(&store, 1).await.unwrap();
        assert_eq!(
            summary,
            DashboardSummary {
                total_apis: 5,
                active_apis: 2,
                degraded_apis: 1,
                down_apis: 1,
                open_alerts: 2,
                critical_alerts: 1,
            }
        );
    }

    #[tokio::test]
    async fn stats_compute_uptime_over_window() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (minutes_ago, is_up, ms) in [(5, true, 120), (15, false, 9000), (25, true, 80), (35, true, 100)] {
            store
                .append_check(NewHealthCheck {
                    api_id: 1,
                    checked_at: now - Duration::minutes(minutes_ago),
                    http_status: Some(if is_up { 200 } else { 500 }),
                    response_time_ms: ms,
                    is_up,
                    error_message: None,
                    response_hash: None,
                })
                .await
                .unwrap();
        }

        let stats = api_stats(&store, 1, Duration::hours(24)).await.unwrap();
        assert_eq!(stats.total_checks, 4);
        assert_eq!(stats.successful_checks, 3);
        assert_eq!(stats.uptime_percent, Some(75.0));
        assert_eq!(stats.avg_response_time_ms, Some(100.0));
        assert_eq!(stats.window_hours, 24);

        let empty = api_stats(&store, 2, Duration::hours(24)).await.unwrap();
        assert_eq!(empty.uptime_percent, None);
        assert_eq!(empty.avg_response_time_ms, None);
    }
}
