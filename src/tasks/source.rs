use rand::Rng;
use reqwest::Url;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::{TaskListSettings, TASK_LIST_PATH};
use crate::error::FetchError;

/// Something that can hand back the raw task listing page.
pub trait ListingSource: Send + Sync {
    /// Base URL that relative task links resolve against.
    fn base_url(&self) -> &Url;

    fn fetch_listing(&self) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Retry policy for listing fetches: `tries` attempts, sleeping
/// `base * attempt + rand(0..jitter)` between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub tries: usize,
    pub backoff_base: Duration,
    pub backoff_jitter: Duration,
}

impl RetryConfig {
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let jitter_ms = self.backoff_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter_ms)
        };
        self.backoff_base * attempt as u32 + Duration::from_millis(jitter)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            tries: 3,
            backoff_base: Duration::from_millis(180),
            backoff_jitter: Duration::from_millis(90),
        }
    }
}

/// Pulls the listing over HTTP with a per-request timeout and retries.
pub struct HttpListingSource {
    client: reqwest::Client,
    base_url: Url,
    list_url: Url,
    retry: RetryConfig,
}

impl HttpListingSource {
    pub fn new(settings: &TaskListSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms.max(1_000)))
            .build()?;
        let retry = RetryConfig {
            tries: settings.tries.max(1),
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            backoff_jitter: Duration::from_millis(settings.backoff_jitter_ms),
        };
        Self::with_client(client, &settings.base_url, retry)
    }

    /// Build from an existing `reqwest::Client` (e.g. shared in tests).
    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        retry: RetryConfig,
    ) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url).map_err(|e| FetchError::Url(e.to_string()))?;
        let list_url = base_url
            .join(TASK_LIST_PATH)
            .map_err(|e| FetchError::Url(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            list_url,
            retry,
        })
    }

    pub fn list_url(&self) -> &Url {
        &self.list_url
    }

    async fn fetch_once(&self) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(self.list_url.clone())
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(resp.text().await?)
    }
}

impl ListingSource for HttpListingSource {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn fetch_listing(&self) -> Result<String, FetchError> {
        let max_attempts = self.retry.tries.max(1);
        let mut last = None;

        for attempt in 1..=max_attempts {
            match self.fetch_once().await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "listing fetch attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, max_attempts, e, delay
                    );
                    last = Some(e);
                    if attempt < max_attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(FetchError::Exhausted {
            attempts: max_attempts,
            last: Box::new(last.unwrap_or(FetchError::Status(0))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_attempt() {
        let retry = RetryConfig {
            tries: 3,
            backoff_base: Duration::from_millis(100),
            backoff_jitter: Duration::from_millis(50),
        };
        for attempt in 1..=3 {
            let d = retry.delay_for(attempt);
            let floor = Duration::from_millis(100 * attempt as u64);
            assert!(d >= floor && d < floor + Duration::from_millis(50), "{d:?}");
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let retry = RetryConfig {
            tries: 1,
            backoff_base: Duration::from_millis(10),
            backoff_jitter: Duration::ZERO,
        };
        assert_eq!(retry.delay_for(2), Duration::from_millis(20));
    }

    #[test]
    fn list_url_is_joined_to_base() {
        let src = HttpListingSource::with_client(
            reqwest::Client::new(),
            "https://annotate.example/",
            RetryConfig::default(),
        )
        .unwrap();
        assert_eq!(
            src.list_url().as_str(),
            "https://annotate.example/v2/tasks/list/"
        );
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let err = HttpListingSource::with_client(
            reqwest::Client::new(),
            "not a url",
            RetryConfig::default(),
        );
        assert!(matches!(err, Err(FetchError::Url(_))));
    }
}
