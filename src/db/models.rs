//! Records exchanged across the store seam.
//!
//! Persisted rows are the sea-orm entity models themselves; this module adds
//! the insert payloads, paging types and a few helpers on top of them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::entities::{alert, health_check, tracked_api};
use crate::db::enums::{AlertType, ApiStatus, HttpMethod, Severity};

pub type TrackedApi = tracked_api::Model;
pub type HealthCheck = health_check::Model;
pub type Alert = alert::Model;

/// Delay between registering an API and its first probe.
pub const INITIAL_CHECK_DELAY_SECS: i64 = 60;
pub const DEFAULT_EXPECTED_STATUS: i32 = 200;
pub const DEFAULT_CHECK_INTERVAL_SECS: i32 = 3600;

/// Maximum stored length of a probe error message, in characters.
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;
/// Maximum stored length of an alert title, in characters.
pub const MAX_ALERT_TITLE_LEN: usize = 200;

impl TrackedApi {
    /// URL the probe is sent to: the health check URL, or the base URL when unset.
    pub fn probe_url(&self) -> &str {
        match self.health_check_url.as_deref() {
            Some(url) if !url.trim().is_empty() => url,
            _ => &self.base_url,
        }
    }

    pub fn check_interval_duration(&self) -> Duration {
        Duration::seconds(i64::from(self.check_interval))
    }

    /// Whether the scheduler should pick this API at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.next_check_at.is_some_and(|next| next <= now)
    }
}

/// The post-probe write to a tracked API. Only the runtime columns change,
/// and only while the row still holds the state the outcome was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeUpdate {
    pub api_id: i32,
    pub prior_status: ApiStatus,
    pub prior_failures: i32,
    pub current_status: ApiStatus,
    pub consecutive_failures: i32,
    pub last_checked: DateTime<Utc>,
    pub next_check_at: DateTime<Utc>,
}

impl RuntimeUpdate {
    /// Whether `api` is still in the state this update was computed from.
    pub fn matches_prior(&self, api: &TrackedApi) -> bool {
        api.id == self.api_id
            && api.current_status == self.prior_status
            && api.consecutive_failures == self.prior_failures
    }

    pub fn apply_to(&self, api: &mut TrackedApi) {
        api.current_status = self.current_status;
        api.consecutive_failures = self.consecutive_failures;
        api.last_checked = Some(self.last_checked);
        api.next_check_at = Some(self.next_check_at);
    }
}

/// Payload used by the target-management collaborator to register an API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrackedApi {
    pub user_id: i32,
    pub api_name: String,
    pub base_url: String,
    pub documentation_url: Option<String>,
    pub health_check_url: Option<String>,
    pub http_method: Option<HttpMethod>,
    pub expected_status: Option<i32>,
    pub check_interval: Option<i32>,
    pub is_active: Option<bool>,
}

impl NewTrackedApi {
    pub fn new(user_id: i32, api_name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            user_id,
            api_name: api_name.into(),
            base_url: base_url.into(),
            documentation_url: None,
            health_check_url: None,
            http_method: None,
            expected_status: None,
            check_interval: None,
            is_active: None,
        }
    }
}

/// Outcome of one probe, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHealthCheck {
    pub api_id: i32,
    pub checked_at: DateTime<Utc>,
    pub http_status: Option<i32>,
    pub response_time_ms: i32,
    pub is_up: bool,
    pub error_message: Option<String>,
    pub response_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub api_id: i32,
    pub user_id: i32,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
    pub page: u64,
    pub size: u64,
}

impl Default for PageParams {
    fn default() -> Self {
        Self { page: 0, size: 20 }
    }
}

impl PageParams {
    /// Zero-sized pages are read as single-item pages.
    pub fn normalized(self) -> Self {
        Self {
            page: self.page,
            size: self.size.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_elements: u64,
    pub page: u64,
    pub size: u64,
}

impl<T> Page<T> {
    /// Slices an already ordered list into the requested page.
    pub fn from_sorted(items: Vec<T>, params: PageParams) -> Self {
        let params = params.normalized();
        let total_elements = items.len() as u64;
        let content = items
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.size as usize)
            .collect();
        Self {
            content,
            total_elements,
            page: params.page,
            size: params.size,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFilter {
    /// `Some(false)` selects open alerts only.
    pub resolved: Option<bool>,
    pub severity: Option<Severity>,
}

impl AlertFilter {
    pub fn matches(&self, alert: &Alert) -> bool {
        self.resolved.is_none_or(|resolved| alert.is_resolved == resolved)
            && self.severity.is_none_or(|severity| alert.severity == severity)
    }
}

/// Cuts `message` to at most `max_chars` characters without splitting a char.
pub fn truncate_chars(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => message[..byte_idx].to_string(),
        None => message.to_string(),
    }
}
