// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Rate-limited HTTP client with bounded exponential-backoff retry

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::ratelimit::RateLimiter;
use crate::{PanoscopeError, Result};

/// Query parameters of a GET request
pub type Query = Vec<(&'static str, String)>;

/// A completed HTTP exchange, whatever its status
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Failure below the HTTP status layer
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("server returned {0}")]
    ServerStatus(u16),

    #[error("{0}")]
    Other(String),
}

/// Outbound GET transport; the seam for in-process fakes
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, query: &Query) -> std::result::Result<HttpResponse, TransportError>;
}

/// Transport backed by reqwest
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with a fixed per-call timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PanoscopeError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, query: &Query) -> std::result::Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(classify_reqwest_error)?
            .to_vec();

        Ok(HttpResponse { status, body })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    // Strip the URL so the API key in the query string never reaches logs
    let e = e.without_url();
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

/// Retry schedule: `base * 2^(attempt-1)`, capped at `max_delay`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(api: &ApiConfig) -> Self {
        Self {
            max_attempts: api.max_attempts.max(1),
            base_delay: Duration::from_millis(api.backoff_base_ms),
            max_delay: Duration::from_millis(api.backoff_max_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based count of failed attempts)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Every attempt waits on the shared limiter; retries never bypass it
pub struct RetryingClient {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(transport: Arc<dyn HttpTransport>, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self { transport, limiter, policy }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Issue a GET, returning the body of the first 2xx response
    pub async fn get(&self, url: &str, query: &Query) -> Result<Vec<u8>> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.limiter.acquire().await;

            let failure = match self.transport.get(url, query).await {
                Ok(resp) if (200..300).contains(&resp.status) => {
                    debug!("Success {} from {}", resp.status, url);
                    return Ok(resp.body);
                }
                Ok(resp) if resp.status >= 500 => {
                    warn!("Server error {} from {}", resp.status, url);
                    TransportError::ServerStatus(resp.status)
                }
                Ok(resp) if (400..500).contains(&resp.status) => {
                    warn!("Client error {} from {}", resp.status, url);
                    return Err(PanoscopeError::Client {
                        status: resp.status,
                        url: url.to_string(),
                    });
                }
                Ok(resp) => {
                    warn!("Unexpected status {} from {}", resp.status, url);
                    return Err(PanoscopeError::UnexpectedStatus {
                        status: resp.status,
                        url: url.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Request to {} failed: {}", url, e);
                    e
                }
            };

            if attempt >= self.policy.max_attempts {
                return Err(PanoscopeError::Transient {
                    url: url.to_string(),
                    attempts: attempt,
                    source: failure,
                });
            }

            let delay = self.policy.delay_after(attempt);
            debug!("Retrying {} in {:?} (attempt {})", url, delay, attempt + 1);
            tokio::time::sleep(delay).await;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
        assert_eq!(policy.delay_after(4), Duration::from_secs(10));
        assert_eq!(policy.delay_after(40), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_success_returns_body() {
        let fake = Arc::new(FakeTransport::scripted(vec![ok_body("hello")]));
        let client = client_for(fake.clone());
        let body = client.get("https://example.test", &Vec::new()).await.unwrap();
        assert_eq!(body, b"hello");
        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let fake = Arc::new(FakeTransport::scripted(vec![status(403), ok_body("never")]));
        let client = client_for(fake.clone());
        let err = client.get("https://example.test", &Vec::new()).await.unwrap_err();
        assert!(matches!(err, PanoscopeError::Client { status: 403, .. }));
        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_redirect_status_is_terminal_but_not_client_error() {
        let fake = Arc::new(FakeTransport::scripted(vec![status(304), ok_body("never")]));
        let client = client_for(fake.clone());
        let err = client.get("https://example.test", &Vec::new()).await.unwrap_err();
        assert!(matches!(err, PanoscopeError::UnexpectedStatus { status: 304, .. }));
        assert!(err.is_isolated());
        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_retried_until_success() {
        let fake = Arc::new(FakeTransport::scripted(vec![
            status(503),
            Err(TransportError::Timeout("slow".to_string())),
            ok_body("ok"),
        ]));
        let client = client_for(fake.clone());
        let body = client.get("https://example.test", &Vec::new()).await.unwrap();
        assert_eq!(body, b"ok");
        assert_eq!(fake.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_keep_last_cause() {
        let fake = Arc::new(FakeTransport::scripted(vec![
            status(500),
            status(502),
            Err(TransportError::Connect("refused".to_string())),
            ok_body("too late"),
        ]));
        let client = client_for(fake.clone());
        let err = client.get("https://example.test", &Vec::new()).await.unwrap_err();
        match err {
            PanoscopeError::Transient { attempts, source, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, TransportError::Connect(_)));
            }
            other => panic!("expected transient error, got {:?}", other),
        }
        assert_eq!(fake.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_every_attempt_takes_a_token() {
        let fake = Arc::new(FakeTransport::scripted(vec![status(500), status(500), status(500)]));
        let limiter = Arc::new(RateLimiter::with_burst(60, 3));
        let client = RetryingClient::new(fake, limiter.clone(), fast_policy());
        let _ = client.get("https://example.test", &Vec::new()).await;
        assert!(!limiter.try_acquire());
    }
}
