// src/ingest/fetcher.rs
//! Upstream feed retrieval with bounded retries.
//!
//! The network itself sits behind [`FeedTransport`] so the pipeline can be
//! driven by an in-memory transport in tests.

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::config::FetchSettings;
use crate::error::{FetchError, TransportError};
use crate::ingest::types::{RawFeed, Source};

pub const USER_AGENT: &str = "YouTube RSS Shorts Filter/1.0";

/// The only piece of the network layer the pipeline depends on.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, TransportError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedTransport for ReqwestTransport {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let map = |e: reqwest::Error| TransportError::from_reqwest(e, timeout);
        let resp = self.client.get(url).timeout(timeout).send().await.map_err(map)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await.map_err(map)?;
        Ok(body.to_vec())
    }
}

/// Attempt budget and backoff schedule for one source.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay slept before retry number `retry` (1-based): `base * 2^(retry-1)`.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << shift)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&FetchSettings::default())
    }
}

impl From<&FetchSettings> for RetryPolicy {
    fn from(s: &FetchSettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            attempt_timeout: s.timeout(),
            backoff_base: s.backoff_base(),
        }
    }
}

#[derive(Clone)]
pub struct FeedFetcher {
    transport: Arc<dyn FeedTransport>,
    policy: RetryPolicy,
}

impl FeedFetcher {
    pub fn new(transport: Arc<dyn FeedTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch one source, retrying transport failures with exponential backoff.
    ///
    /// Only the final failure is returned; intermediate ones are logged.
    pub async fn fetch(&self, source: Arc<Source>) -> Result<RawFeed, FetchError> {
        let url = source.feed_url();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            counter!("feed_fetch_attempts_total").increment(1);
            tracing::debug!(url = %url, attempt, "fetching feed");

            match self.attempt(&url).await {
                Ok(bytes) => {
                    tracing::info!(url = %url, attempt, bytes = bytes.len(), "fetched feed");
                    return Ok(RawFeed {
                        source,
                        bytes,
                        fetched_at: Utc::now(),
                    });
                }
                Err(e) if attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_before_retry(attempt);
                    tracing::warn!(url = %url, attempt, error = %e, ?delay, "feed fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(FetchError {
                        url,
                        attempts: attempt,
                        last: e,
                    });
                }
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let timeout = self.policy.attempt_timeout;
        match tokio::time::timeout(timeout, self.transport.fetch(url, timeout)).await {
            Ok(res) => res,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        fail_first: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl FeedTransport for Flaky {
        async fn fetch(&self, _url: &str, _t: Duration) -> Result<Vec<u8>, TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                Err(TransportError::Status { status: 503 })
            } else {
                Ok(b"<feed/>".to_vec())
            }
        }
    }

    struct Stalled;

    #[async_trait]
    impl FeedTransport for Stalled {
        async fn fetch(&self, _url: &str, _t: Duration) -> Result<Vec<u8>, TransportError> {
            std::future::pending().await
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            attempt_timeout: Duration::from_millis(200),
            backoff_base: Duration::from_millis(1),
        }
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let p = RetryPolicy {
            max_attempts: 4,
            attempt_timeout: Duration::from_secs(1),
            backoff_base: Duration::from_millis(100),
        };
        assert_eq!(p.delay_before_retry(1), Duration::from_millis(100));
        assert_eq!(p.delay_before_retry(2), Duration::from_millis(200));
        assert_eq!(p.delay_before_retry(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let t = Arc::new(Flaky {
            fail_first: 2,
            calls: AtomicU32::new(0),
        });
        let f = FeedFetcher::new(t.clone(), policy(3));
        let raw = f.fetch(Arc::new(Source::channel("UC1"))).await.unwrap();
        assert_eq!(raw.bytes, b"<feed/>".to_vec());
        assert_eq!(t.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_with_last_cause() {
        let t = Arc::new(Flaky {
            fail_first: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let f = FeedFetcher::new(t.clone(), policy(3));
        let err = f.fetch(Arc::new(Source::username("bob"))).await.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert!(matches!(err.last, TransportError::Status { status: 503 }));
        assert!(err.url.ends_with("?user=bob"));
        assert_eq!(t.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn reqwest_timeouts_map_to_timeout_variant() {
        // Accepts the connection and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(sock);
        });

        let t = ReqwestTransport::new().unwrap();
        let budget = Duration::from_millis(150);
        let err = t
            .fetch(&format!("http://{addr}/feeds/videos.xml"), budget)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(d) if d == budget), "{err:?}");
        hold.abort();
    }

    #[tokio::test]
    async fn stalled_attempts_time_out() {
        let f = FeedFetcher::new(Arc::new(Stalled), policy(2));
        let err = f.fetch(Arc::new(Source::channel("UC1"))).await.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(matches!(err.last, TransportError::Timeout(_)));
    }
}
