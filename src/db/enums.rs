use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health verdict of a tracked API.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "api_status_enum")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiStatus {
    #[sea_orm(string_value = "UNKNOWN")]
    Unknown,
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    #[sea_orm(string_value = "DEGRADED")]
    Degraded,
    #[sea_orm(string_value = "DOWN")]
    Down,
    #[sea_orm(string_value = "DEPRECATED")]
    Deprecated,
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApiStatus::Unknown => "UNKNOWN",
            ApiStatus::Active => "ACTIVE",
            ApiStatus::Degraded => "DEGRADED",
            ApiStatus::Down => "DOWN",
            ApiStatus::Deprecated => "DEPRECATED",
        })
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "http_method_enum")]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    #[sea_orm(string_value = "GET")]
    Get,
    #[sea_orm(string_value = "POST")]
    Post,
    #[sea_orm(string_value = "PUT")]
    Put,
    #[sea_orm(string_value = "DELETE")]
    Delete,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(reqwest::Method::from(*self).as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "alert_type_enum")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    #[sea_orm(string_value = "DOWN")]
    Down,
    #[sea_orm(string_value = "DEGRADED")]
    Degraded,
    /// Emitted when an API recovers from DOWN or DEGRADED.
    #[sea_orm(string_value = "STATUS_CHANGE")]
    StatusChange,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlertType::Down => "DOWN",
            AlertType::Degraded => "DEGRADED",
            AlertType::StatusChange => "STATUS_CHANGE",
        })
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "severity_enum")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[sea_orm(string_value = "LOW")]
    Low,
    #[sea_orm(string_value = "MEDIUM")]
    Medium,
    #[sea_orm(string_value = "CRITICAL")]
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::Critical => "CRITICAL",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ActiveEnum, Iterable};

    #[test]
    fn display_matches_stored_value() {
        for status in ApiStatus::iter() {
            assert_eq!(status.to_string(), status.to_value());
        }
        for alert_type in AlertType::iter() {
            assert_eq!(alert_type.to_string(), alert_type.to_value());
        }
        for severity in Severity::iter() {
            assert_eq!(severity.to_string(), severity.to_value());
        }
        assert_eq!(AlertType::StatusChange.to_string(), "STATUS_CHANGE");
        assert_eq!(Severity::Critical.to_string(), "CRITICAL");
    }

    #[test]
    fn display_matches_json() {
        assert_eq!(
            serde_json::to_string(&AlertType::StatusChange).unwrap(),
            format!("\"{}\"", AlertType::StatusChange)
        );
        assert_eq!(
            serde_json::to_string(&Severity::Medium).unwrap(),
            format!("\"{}\"", Severity::Medium)
        );
    }
}
