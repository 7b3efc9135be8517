use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tracing::{debug, warn};

use crate::config::CrawlConfig;
use crate::errors::FetchError;

/// Body and status of one fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub html: String,
    pub status: u16,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The transport boundary. Implementations return whatever status the server
/// gave; deciding what is a failure is the caller's job.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt)
    }
}

/// Fetch with exponential backoff. Non-2xx responses and transport errors are
/// retried alike; after `max_retries` retries the last failure is returned
/// wrapped in [`FetchError::RetriesExhausted`].
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    url: &str,
    policy: &RetryPolicy,
) -> Result<String, FetchError> {
    let mut attempt = 0;
    loop {
        let err = match fetcher.fetch(url).await {
            Ok(page) if page.is_success() => return Ok(page.html),
            Ok(page) => FetchError::Status {
                url: url.to_string(),
                status: page.status,
            },
            Err(e) => e,
        };

        if attempt >= policy.max_retries {
            return Err(FetchError::RetriesExhausted {
                url: url.to_string(),
                attempts: attempt + 1,
                last: Box::new(err),
            });
        }

        let backoff = policy.backoff(attempt);
        warn!(
            "Fetch failed for {} (attempt {}/{}): {}; backing off {:.1}s",
            url,
            attempt + 1,
            policy.max_retries + 1,
            err,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

/// Minimum spacing between requests to the same host, shared by every worker.
pub struct Politeness {
    limiter: Option<RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>>,
}

impl Politeness {
    pub fn new(interval: Duration) -> Self {
        Self {
            limiter: Quota::with_period(interval).map(RateLimiter::keyed),
        }
    }

    pub async fn wait(&self, url: &str) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        limiter.until_key_ready(&host).await;
    }
}

/// Plain HTTP backend for server-rendered listings.
pub struct HttpFetcher {
    client: reqwest::Client,
    politeness: Arc<Politeness>,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig, politeness: Arc<Politeness>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, politeness })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.politeness.wait(url).await;

        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;
        let status = response.status().as_u16();
        let html = response
            .text()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        debug!(
            "Fetched {} ({}) in {}ms",
            url,
            status,
            start.elapsed().as_millis()
        );
        Ok(FetchedPage { html, status })
    }
}

/// Rendered-page backend via spider.cloud, for listings that only exist after
/// scripts run.
pub struct SpiderFetcher {
    spider: Spider,
    politeness: Arc<Politeness>,
}

impl SpiderFetcher {
    pub fn from_env(politeness: Arc<Politeness>) -> Result<Self> {
        let api_key = std::env::var("SPIDER_API_KEY")
            .context("SPIDER_API_KEY environment variable must be set")?;
        let spider = Spider::new(Some(api_key))
            .map_err(|e| anyhow::anyhow!("Failed to create Spider client: {}", e))?;
        Ok(Self { spider, politeness })
    }
}

#[async_trait]
impl Fetcher for SpiderFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.politeness.wait(url).await;

        let params = RequestParams {
            return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
            ..Default::default()
        };
        let response = self
            .spider
            .scrape_url(url, Some(params), "application/json")
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        let parsed: serde_json::Value = match response.as_str() {
            Some(s) => serde_json::from_str(s).unwrap_or(response.clone()),
            None => response,
        };
        let first = parsed.as_array().and_then(|arr| arr.first());

        let html = first
            .and_then(|obj| obj.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| FetchError::transport(url, "no content in spider response"))?;
        let status = first
            .and_then(|obj| obj.get("status"))
            .and_then(|s| s.as_u64())
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(200);

        Ok(FetchedPage { html, status })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Scripted responses keyed by URL. A URL with a queue pops one response
    /// per call and repeats the last one; unknown URLs are transport errors.
    #[derive(Default)]
    pub struct ScriptedFetcher {
        responses: Mutex<HashMap<String, Vec<Result<FetchedPage, FetchError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        pub fn page(self, url: &str, html: &str) -> Self {
            self.push(url, Ok(FetchedPage { html: html.into(), status: 200 }))
        }

        pub fn status(self, url: &str, status: u16) -> Self {
            self.push(url, Ok(FetchedPage { html: String::new(), status }))
        }

        pub fn push(self, url: &str, response: Result<FetchedPage, FetchError>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push(response);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.remove(0),
                Some(queue) => queue[0].clone(),
                None => Err(FetchError::transport(url, "connection refused")),
            }
        }
    }
}
