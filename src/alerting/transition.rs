//! Status transitions driven by probe outcomes.
//!
//! Alerts fire on exact failure counts only: the first failure of an ACTIVE
//! API warns (DEGRADED), the third consecutive failure declares it DOWN, and
//! later failures stay silent until the API recovers.

use serde::Serialize;

use crate::db::enums::{AlertType, ApiStatus, Severity};

/// Consecutive failure count at which an ACTIVE API is flagged DEGRADED.
pub const DEGRADED_AFTER_FAILURES: i32 = 1;
/// Consecutive failure count at which an API is declared DOWN.
pub const DOWN_AFTER_FAILURES: i32 = 3;

/// The mutable health state of one tracked API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApiState {
    pub status: ApiStatus,
    pub consecutive_failures: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertDraft {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub next: ApiState,
    pub alert: Option<AlertDraft>,
}

/// What the engine learned from one probe.
#[derive(Debug, Clone, Copy)]
pub enum ProbeVerdict<'a> {
    Up,
    Failed { error: Option<&'a str> },
}

pub fn evaluate(prior: ApiState, api_name: &str, verdict: ProbeVerdict<'_>) -> Transition {
    match (prior.status, verdict) {
        // Deprecation is owned by target management; probing never changes it.
        (ApiStatus::Deprecated, _) => Transition {
            next: prior,
            alert: None,
        },

        (status, ProbeVerdict::Failed { error }) => {
            let failures = prior.consecutive_failures.saturating_add(1);
            let (next_status, alert) = if failures == DOWN_AFTER_FAILURES {
                (ApiStatus::Down, Some(down_alert(api_name, failures, error)))
            } else if failures == DEGRADED_AFTER_FAILURES && status == ApiStatus::Active {
                (ApiStatus::Degraded, Some(degraded_alert(api_name)))
            } else {
                (status, None)
            };
            Transition {
                next: ApiState {
                    status: next_status,
                    consecutive_failures: failures,
                },
                alert,
            }
        }

        (ApiStatus::Down | ApiStatus::Degraded, ProbeVerdict::Up) => Transition {
            next: ApiState {
                status: ApiStatus::Active,
                consecutive_failures: 0,
            },
            alert: Some(recovered_alert(api_name, prior.consecutive_failures)),
        },

        (ApiStatus::Unknown | ApiStatus::Active, ProbeVerdict::Up) => Transition {
            next: ApiState {
                status: ApiStatus::Active,
                consecutive_failures: 0,
            },
            alert: None,
        },
    }
}

fn degraded_alert(api_name: &str) -> AlertDraft {
    AlertDraft {
        alert_type: AlertType::Degraded,
        severity: Severity::Medium,
        title: format!("{api_name} may be degraded"),
        description: "API failed 1 health check. Monitoring closely.".to_string(),
    }
}

fn down_alert(api_name: &str, failures: i32, error: Option<&str>) -> AlertDraft {
    AlertDraft {
        alert_type: AlertType::Down,
        severity: Severity::Critical,
        title: format!("{api_name} is DOWN"),
        description: format!(
            "API failed {failures} consecutive health checks. Last error: {}",
            error.unwrap_or("none")
        ),
    }
}

fn recovered_alert(api_name: &str, failures: i32) -> AlertDraft {
    AlertDraft {
        alert_type: AlertType::StatusChange,
        severity: Severity::Low,
        title: format!("{api_name} has recovered"),
        description: format!("API is back online after {failures} failed checks."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAILED: ProbeVerdict<'static> = ProbeVerdict::Failed {
        error: Some("HTTP 500 Internal Server Error (expected 200)"),
    };

    fn state(status: ApiStatus, consecutive_failures: i32) -> ApiState {
        ApiState {
            status,
            consecutive_failures,
        }
    }

    #[test]
    fn first_failure_of_active_api_degrades() {
        let t = evaluate(state(ApiStatus::Active, 0), "Payments", FAILED);
        assert_eq!(t.next, state(ApiStatus::Degraded, 1));
        let alert = t.alert.unwrap();
        assert_eq!(alert.alert_type, AlertType::Degraded);
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.title, "Payments may be degraded");
    }

    #[test]
    fn first_failure_of_unknown_api_is_silent() {
        let t = evaluate(state(ApiStatus::Unknown, 0), "Payments", FAILED);
        assert_eq!(t.next, state(ApiStatus::Unknown, 1));
        assert!(t.alert.is_none());
    }

    #[test]
    fn third_failure_goes_down_and_echoes_error() {
        let t = evaluate(state(ApiStatus::Degraded, 2), "Payments", FAILED);
        assert_eq!(t.next, state(ApiStatus::Down, 3));
        let alert = t.alert.unwrap();
        assert_eq!(alert.alert_type, AlertType::Down);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.title, "Payments is DOWN");
        assert!(alert.description.contains("3 consecutive"));
        assert!(alert.description.contains("HTTP 500"));
    }

    #[test]
    fn unknown_api_goes_down_on_third_failure() {
        let t = evaluate(state(ApiStatus::Unknown, 2), "Payments", ProbeVerdict::Failed { error: None });
        assert_eq!(t.next, state(ApiStatus::Down, 3));
        assert!(t.alert.unwrap().description.ends_with("Last error: none"));
    }

    #[test]
    fn failures_past_three_do_not_alert_again() {
        for prior in [2, 3, 4, 5, 10] {
            let prior_status = if prior >= 3 { ApiStatus::Down } else { ApiStatus::Degraded };
            let t = evaluate(state(prior_status, prior), "Payments", FAILED);
            assert_eq!(t.next.consecutive_failures, prior + 1);
            if prior + 1 == DOWN_AFTER_FAILURES {
                assert!(t.alert.is_some());
            } else {
                assert!(t.alert.is_none(), "unexpected alert at failure {}", prior + 1);
                assert_eq!(t.next.status, prior_status);
            }
        }
    }

    #[test]
    fn recovery_from_down_reports_prior_failure_count() {
        let t = evaluate(state(ApiStatus::Down, 3), "Payments", ProbeVerdict::Up);
        assert_eq!(t.next, state(ApiStatus::Active, 0));
        let alert = t.alert.unwrap();
        assert_eq!(alert.alert_type, AlertType::StatusChange);
        assert_eq!(alert.severity, Severity::Low);
        assert_eq!(alert.title, "Payments has recovered");
        assert!(alert.description.contains("after 3 failed checks"));
    }

    #[test]
    fn recovery_from_degraded_alerts() {
        let t = evaluate(state(ApiStatus::Degraded, 1), "Payments", ProbeVerdict::Up);
        assert_eq!(t.next, state(ApiStatus::Active, 0));
        assert!(t.alert.unwrap().description.contains("after 1 failed checks"));
    }

    #[test]
    fn success_while_active_or_unknown_is_silent() {
        for status in [ApiStatus::Active, ApiStatus::Unknown] {
            let t = evaluate(state(status, 0), "Payments", ProbeVerdict::Up);
            assert_eq!(t.next, state(ApiStatus::Active, 0));
            assert!(t.alert.is_none());
        }
        // Failures below the DOWN threshold on an UNKNOWN API are cleared silently.
        let t = evaluate(state(ApiStatus::Unknown, 2), "Payments", ProbeVerdict::Up);
        assert_eq!(t.next, state(ApiStatus::Active, 0));
        assert!(t.alert.is_none());
    }

    #[test]
    fn deprecated_is_left_alone() {
        let prior = state(ApiStatus::Deprecated, 2);
        for verdict in [ProbeVerdict::Up, FAILED] {
            let t = evaluate(prior, "Payments", verdict);
            assert_eq!(t.next, prior);
            assert!(t.alert.is_none());
        }
    }
}
