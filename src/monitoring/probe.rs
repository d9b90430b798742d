//! Probe executor: one HTTP request per tracked API, classified and hashed.
//!
//! Failures that originate at the target (bad status, refused connection,
//! DNS, timeout) never escape as errors. They come back as a check with
//! `is_up = false` and a populated error message.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::error::Error as StdError;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::db::models::{MAX_ERROR_MESSAGE_LEN, NewHealthCheck, TrackedApi, truncate_chars};
use crate::version::VERSION;

pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ProbeSetupError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, api: &TrackedApi) -> NewHealthCheck;
}

pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout_secs: u64) -> Result<Self, ProbeSetupError> {
        Self::with_timeout(Duration::from_secs(timeout_secs.max(1)))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ProbeSetupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("apigraveyard/{VERSION}"))
            .build()?;
        Ok(Self { client, timeout })
    }

    fn describe_error(&self, e: &reqwest::Error) -> String {
        if e.is_timeout() {
            return format!("Request timed out after {}s", self.timeout.as_secs());
        }
        // reqwest's top-level message rarely names the cause; walk the chain.
        let mut message = e.to_string();
        let mut source = e.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, api: &TrackedApi) -> NewHealthCheck {
        let checked_at = Utc::now();
        let url = api.probe_url();
        let started = Instant::now();
        let result = self
            .client
            .request(api.http_method.into(), url)
            .send()
            .await;
        let response_time_ms = elapsed_ms(started);

        match result {
            Ok(response) => {
                let status = i32::from(response.status().as_u16());
                let is_up = status == api.expected_status;
                let response_hash = match hash_response(response).await {
                    Ok(hash) => hash,
                    Err(e) => {
                        debug!(api_id = api.id, error = %e, "Response body unreadable; skipping hash.");
                        None
                    }
                };
                let error_message = (!is_up).then(|| {
                    warn!(api_id = api.id, url, status, expected = api.expected_status, "Unexpected status code.");
                    format!("HTTP {status} (expected {})", api.expected_status)
                });
                NewHealthCheck {
                    api_id: api.id,
                    checked_at,
                    http_status: Some(status),
                    response_time_ms,
                    is_up,
                    error_message,
                    response_hash,
                }
            }
            Err(e) => {
                let message = truncate_chars(&self.describe_error(&e), MAX_ERROR_MESSAGE_LEN);
                warn!(api_id = api.id, url, error = %message, "Probe failed.");
                NewHealthCheck {
                    api_id: api.id,
                    checked_at,
                    http_status: None,
                    response_time_ms,
                    is_up: false,
                    error_message: Some(message),
                    response_hash: None,
                }
            }
        }
    }
}

/// Lowercase hex SHA-256 of the body, or `None` for an empty body.
pub fn hash_body(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    Some(hex::encode(Sha256::digest(body)))
}

/// Same digest as [`hash_body`], fed chunk by chunk so the body is never buffered whole.
async fn hash_response(mut response: reqwest::Response) -> Result<Option<String>, reqwest::Error> {
    let mut hasher = Sha256::new();
    let mut empty = true;
    while let Some(chunk) = response.chunk().await? {
        empty &= chunk.is_empty();
        hasher.update(&chunk);
    }
    Ok((!empty).then(|| hex::encode(hasher.finalize())))
}

fn elapsed_ms(started: Instant) -> i32 {
    i32::try_from(started.elapsed().as_millis()).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::{ApiStatus, HttpMethod};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(base_url: &str) -> TrackedApi {
        let now = Utc::now();
        TrackedApi {
            id: 3,
            user_id: 7,
            api_name: "Weather".to_string(),
            base_url: base_url.to_string(),
            documentation_url: None,
            health_check_url: None,
            http_method: HttpMethod::Get,
            expected_status: 200,
            check_interval: 3600,
            current_status: ApiStatus::Active,
            last_checked: None,
            next_check_at: Some(now),
            is_active: true,
            consecutive_failures: 0,
            created_at: now,
        }
    }

    #[test]
    fn hash_is_lowercase_sha256_hex() {
        assert_eq!(
            hash_body(b"abc").as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(hash_body(b""), None);
    }

    #[tokio::test]
    async fn expected_status_is_up_with_hash() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string("abc"))
            .mount(&server)
            .await;

        let mut target = api(&server.uri());
        target.health_check_url = Some(format!("{}/health", server.uri()));
        let check = HttpProber::new(5).unwrap().probe(&target).await;

        assert!(check.is_up);
        assert_eq!(check.api_id, 3);
        assert_eq!(check.http_status, Some(200));
        assert_eq!(check.error_message, None);
        assert_eq!(check.response_hash, hash_body(b"abc"));
        assert!(check.response_time_ms >= 0);
    }

    #[tokio::test]
    async fn unexpected_status_is_down_with_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let check = HttpProber::new(5).unwrap().probe(&api(&server.uri())).await;

        assert!(!check.is_up);
        assert_eq!(check.http_status, Some(500));
        assert_eq!(check.error_message.as_deref(), Some("HTTP 500 (expected 200)"));
        assert_eq!(check.response_hash, hash_body(b"boom"));
    }

    #[tokio::test]
    async fn non_default_expected_status_and_method_are_honoured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let mut target = api(&server.uri());
        target.http_method = HttpMethod::Post;
        target.expected_status = 204;
        let check = HttpProber::new(5).unwrap().probe(&target).await;

        assert!(check.is_up);
        assert_eq!(check.http_status, Some(204));
        assert_eq!(check.response_hash, None);
    }

    #[tokio::test]
    async fn refused_connection_is_a_failed_check() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let check = HttpProber::new(5)
            .unwrap()
            .probe(&api(&format!("http://{addr}")))
            .await;

        assert!(!check.is_up);
        assert_eq!(check.http_status, None);
        assert_eq!(check.response_hash, None);
        let message = check.error_message.unwrap();
        assert!(!message.is_empty());
        assert!(message.chars().count() <= MAX_ERROR_MESSAGE_LEN);
    }

    #[tokio::test]
    async fn slow_target_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let check = HttpProber::new(1).unwrap().probe(&api(&server.uri())).await;

        assert!(!check.is_up);
        assert_eq!(check.http_status, None);
        assert_eq!(check.error_message.as_deref(), Some("Request timed out after 1s"));
        assert!(check.response_time_ms >= 900);
    }

    #[tokio::test]
    async fn malformed_url_is_a_failed_check() {
        let check = HttpProber::new(5).unwrap().probe(&api("not a url")).await;
        assert!(!check.is_up);
        assert!(check.error_message.is_some());
    }

    #[tokio::test]
    async fn large_body_hash_matches_whole_body_digest() {
        let body: Vec<u8> = (0..512 * 1024).map(|i| (i % 251) as u8).collect();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let check = HttpProber::new(5).unwrap().probe(&api(&server.uri())).await;

        assert!(check.is_up);
        assert_eq!(check.response_hash, hash_body(&body));
    }

    #[tokio::test]
    async fn empty_body_has_no_hash() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let mut target = api(&server.uri());
        target.expected_status = 204;
        let check = HttpProber::new(5).unwrap().probe(&target).await;

        assert!(check.is_up);
        assert_eq!(check.response_hash, None);
    }
}
