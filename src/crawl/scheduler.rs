use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use super::links::profile_links;
use super::paginator::{ListingTarget, PageState, Paginator};
use crate::config::{render_template, CrawlConfig};
use crate::errors::{ConfigError, FetchError};
use crate::fetch::{fetch_with_retry, Fetcher, RetryPolicy};

/// Walks the listing pages of one target and hands out new profile URLs a
/// page at a time. Once terminal it stays terminal; retrying a target means
/// building a new scheduler.
pub struct CrawlScheduler {
    fetcher: Arc<dyn Fetcher>,
    paginator: Paginator,
    primary: String,
    alternate: Option<String>,
    base: Url,
    retry: RetryPolicy,
}

impl CrawlScheduler {
    pub fn new(
        config: &CrawlConfig,
        fetcher: Arc<dyn Fetcher>,
        target: ListingTarget,
    ) -> Result<Self, ConfigError> {
        let base = Url::parse(&config.site_base)
            .map_err(|e| ConfigError::Invalid(format!("site_base {}: {e}", config.site_base)))?;
        Ok(Self {
            fetcher,
            paginator: Paginator::new(
                target,
                config.max_pages,
                config.max_consecutive_empty_pages,
            ),
            primary: config.listing_template.clone(),
            alternate: config.alternate_template.clone(),
            base,
            retry: config.retry_policy(),
        })
    }

    pub fn state(&self) -> &PageState {
        self.paginator.state()
    }

    pub fn target(&self) -> &ListingTarget {
        self.paginator.target()
    }

    pub fn pages_fetched(&self) -> u32 {
        self.paginator.pages_fetched()
    }

    /// The next batch of unseen profile URLs, or `None` when the run is over.
    /// Pages that add nothing new are consumed silently.
    pub async fn next_links(&mut self) -> Option<Vec<String>> {
        while let Some(page) = self.paginator.next_request() {
            match self.page_links(page).await {
                Ok(links) => {
                    let found = links.len();
                    let fresh = self.paginator.record_links(links);
                    debug!(
                        region = %self.target().region,
                        category = %self.target().category,
                        page,
                        found,
                        new = fresh.len(),
                        "listing page"
                    );
                    if !fresh.is_empty() {
                        return Some(fresh);
                    }
                }
                Err(e) => {
                    warn!(
                        "Listing page {} for {} / {} failed: {}",
                        page,
                        self.target().region,
                        self.target().category,
                        e
                    );
                    self.paginator.record_failure(e);
                }
            }
        }
        None
    }

    /// Links for one page number. The alternate template is only consulted
    /// when the primary page has no profile links at all.
    async fn page_links(&self, page: u32) -> Result<Vec<String>, FetchError> {
        let target = self.paginator.target();
        let url = render_template(&self.primary, &target.region, &target.category, page);
        let html = fetch_with_retry(self.fetcher.as_ref(), &url, &self.retry).await?;
        let links = profile_links(&html, &self.base);

        let Some(alternate) = self.alternate.as_deref().filter(|_| links.is_empty()) else {
            return Ok(links);
        };

        let url = render_template(alternate, &target.region, &target.category, page);
        match fetch_with_retry(self.fetcher.as_ref(), &url, &self.retry).await {
            Ok(html) => Ok(profile_links(&html, &self.base)),
            Err(e) => {
                warn!("Alternate listing {} failed, treating page as empty: {}", url, e);
                Ok(links)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::paginator::{AbortReason, ExhaustReason};
    use crate::fetch::testing::ScriptedFetcher;

    const PRIMARY: &str = "https://list.test/bangalore/dentist?page=";
    const ALTERNATE: &str = "https://list.test/search?city=bangalore&q=dentist&page=";

    fn config(max_pages: u32) -> CrawlConfig {
        CrawlConfig {
            site_base: "https://www.practo.com".into(),
            listing_template: "https://list.test/{region}/{category}?page={page}".into(),
            alternate_template: Some(
                "https://list.test/search?city={region}&q={category}&page={page}".into(),
            ),
            max_pages,
            max_consecutive_empty_pages: 2,
            max_retries: 1,
            base_backoff_ms: 0,
            ..CrawlConfig::default()
        }
    }

    fn listing(ids: std::ops::Range<u32>) -> String {
        ids.map(|i| format!("<a href='/bangalore/doctor/d{i}'>Dr. D{i}</a>"))
            .collect()
    }

    fn scheduler(config: &CrawlConfig, fetcher: Arc<ScriptedFetcher>) -> CrawlScheduler {
        CrawlScheduler::new(config, fetcher, ListingTarget::new("Bangalore", "Dentist")).unwrap()
    }

    async fn drain(s: &mut CrawlScheduler) -> Vec<String> {
        let mut all = Vec::new();
        while let Some(batch) = s.next_links().await {
            all.extend(batch);
        }
        all
    }

    #[tokio::test]
    async fn stops_when_server_repeats_first_page() {
        let config = config(20);
        let mut fetcher = ScriptedFetcher::default();
        for page in 1..=20 {
            fetcher = fetcher
                .page(&format!("{PRIMARY}{page}"), &listing(0..20))
                .page(&format!("{ALTERNATE}{page}"), &listing(0..20));
        }
        let fetcher = Arc::new(fetcher);
        let mut s = scheduler(&config, fetcher.clone());

        let urls = drain(&mut s).await;
        assert_eq!(urls.len(), 20);
        assert_eq!(s.state(), &PageState::Exhausted(ExhaustReason::EmptyStreak));
        assert!(fetcher.calls().len() as u32 <= config.max_pages + config.max_consecutive_empty_pages);
        assert!(s.next_links().await.is_none());
    }

    #[tokio::test]
    async fn alternate_template_fills_empty_primary() {
        let config = config(2);
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .page(&format!("{PRIMARY}1"), "<p>no results</p>")
                .page(&format!("{ALTERNATE}1"), &listing(0..3))
                .page(&format!("{PRIMARY}2"), &listing(3..5)),
        );
        let mut s = scheduler(&config, fetcher.clone());

        assert_eq!(s.next_links().await.map(|b| b.len()), Some(3));
        assert_eq!(s.next_links().await.map(|b| b.len()), Some(2));
        assert!(s.next_links().await.is_none());
        assert_eq!(s.state(), &PageState::Exhausted(ExhaustReason::PageLimit));
        assert_eq!(s.pages_fetched(), 2);
        // Page 2 had primary links, so its alternate was never requested.
        assert_eq!(fetcher.calls_to(&format!("{ALTERNATE}2")), 0);
    }

    #[tokio::test]
    async fn exhausted_retries_abort_with_partial_results() {
        let config = config(5);
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .page(&format!("{PRIMARY}1"), &listing(0..4))
                .status(&format!("{PRIMARY}2"), 503),
        );
        let mut s = scheduler(&config, fetcher.clone());

        let urls = drain(&mut s).await;
        assert_eq!(urls.len(), 4);
        match s.state() {
            PageState::Aborted(AbortReason::RetriesExhausted { page, .. }) => assert_eq!(*page, 2),
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(fetcher.calls_to(&format!("{PRIMARY}2")), 2);
    }

    #[tokio::test]
    async fn unreachable_first_page_aborts() {
        let config = config(5);
        let mut s = scheduler(&config, Arc::new(ScriptedFetcher::default()));
        assert!(s.next_links().await.is_none());
        assert!(matches!(
            s.state(),
            PageState::Aborted(AbortReason::FirstPageFailed(FetchError::RetriesExhausted { .. }))
        ));
    }

    #[test]
    fn bad_site_base_is_a_config_error() {
        let config = CrawlConfig {
            site_base: "not a url".into(),
            ..CrawlConfig::default()
        };
        let result = CrawlScheduler::new(
            &config,
            Arc::new(ScriptedFetcher::default()),
            ListingTarget::new("Delhi", "Dentist"),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
