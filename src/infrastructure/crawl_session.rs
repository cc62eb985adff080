//! One browser session scoped to one source crawl
//!
//! The session is acquired on entry and released on every exit path. The
//! pagination loop is bounded by a page cap and a listing cap; a missing or
//! disabled next control, a failed click, or a listing wait timeout ends it
//! early and the listings gathered so far are returned.

#![allow(clippy::uninlined_format_args)]

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::errors::SessionResult;
use crate::domain::job::Source;
use crate::domain::listing::{RawDetail, RawListing, SearchQuery};
use crate::infrastructure::adapters::SourceAdapter;
use crate::infrastructure::browser::{BrowserLauncher, BrowserPage, NextControl};
use crate::infrastructure::config::{CrawlerConfig, defaults};
use crate::infrastructure::stealth::StealthPolicy;

/// Caps and waits applied to every session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlLimits {
    pub max_pages: u32,
    pub max_listings: usize,
    pub results_timeout: Duration,
    pub listing_timeout: Duration,
    pub detail_timeout: Duration,
}

impl CrawlLimits {
    /// Pull both caps down to the hard ceiling of 5 pages and 100 listings
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.max_pages = self.max_pages.clamp(1, defaults::MAX_PAGES);
        self.max_listings = self.max_listings.clamp(1, defaults::MAX_LISTINGS);
        self
    }
}

impl From<&CrawlerConfig> for CrawlLimits {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            max_listings: config.max_listings,
            results_timeout: config.results_timeout(),
            listing_timeout: config.listing_timeout(),
            detail_timeout: config.detail_timeout(),
        }
        .clamped()
    }
}

impl Default for CrawlLimits {
    fn default() -> Self {
        Self::from(&CrawlerConfig::default())
    }
}

/// Why the pagination loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    PageCap,
    ListingCap,
    NoNextControl,
    NextDisabled,
    NextClickFailed,
    ResultsTimeout,
    ListingTimeout,
}

/// Listings of one source crawl plus how the crawl ended
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub source: Source,
    pub listings: Vec<RawListing>,
    pub pages_visited: u32,
    pub stop_reason: StopReason,
}

pub struct CrawlSession {
    adapter: Arc<dyn SourceAdapter>,
    launcher: Arc<dyn BrowserLauncher>,
    policy: Arc<StealthPolicy>,
    limits: CrawlLimits,
}

impl CrawlSession {
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        launcher: Arc<dyn BrowserLauncher>,
        policy: Arc<StealthPolicy>,
        limits: CrawlLimits,
    ) -> Self {
        Self {
            adapter,
            launcher,
            policy,
            limits: limits.clamped(),
        }
    }

    pub fn source(&self) -> Source {
        self.adapter.source()
    }

    /// Search listings for `query` across at most `max_pages` result pages
    pub async fn search(self, query: &SearchQuery) -> SessionResult<CrawlOutcome> {
        let url = self.adapter.search_url(query)?;
        let profile = self.policy.profile();
        let mut page = self.launcher.launch(&profile).await?;

        info!("[{}] Searching '{}'", self.source(), query.term());
        let result = self.paginate(page.as_mut(), &url).await;

        if let Err(e) = page.close().await {
            warn!("[{}] Failed to close browser session: {}", self.source(), e);
        }

        if let Ok(outcome) = &result {
            info!(
                "[{}] Found {} listings on {} page(s), stopped: {:?}",
                outcome.source,
                outcome.listings.len(),
                outcome.pages_visited,
                outcome.stop_reason
            );
        }
        result
    }

    /// Open one detail page and extract its raw fields
    pub async fn fetch_detail(self, reference: &str) -> SessionResult<RawDetail> {
        let profile = self.policy.profile();
        let mut page = self.launcher.launch(&profile).await?;

        let result = async {
            page.goto(reference).await?;
            self.policy.pace().await;
            let selector = &self.adapter.page_selectors().detail;
            if !page.wait_for(selector, self.limits.detail_timeout).await? {
                debug!("[{}] Detail marker '{}' not found, extracting anyway", self.source(), selector);
            }
            let html = page.content().await?;
            Ok(self.adapter.extract_detail(&html, reference)?)
        }
        .await;

        if let Err(e) = page.close().await {
            warn!("[{}] Failed to close browser session: {}", self.source(), e);
        }
        result
    }

    async fn paginate(&self, page: &mut dyn BrowserPage, url: &str) -> SessionResult<CrawlOutcome> {
        let selectors = self.adapter.page_selectors();
        let mut outcome = CrawlOutcome {
            source: self.source(),
            listings: Vec::new(),
            pages_visited: 0,
            stop_reason: StopReason::PageCap,
        };

        page.goto(url).await?;
        self.policy.pace().await;

        if !page.wait_for(&selectors.results, self.limits.results_timeout).await? {
            warn!("[{}] Results container did not appear", outcome.source);
            outcome.stop_reason = StopReason::ResultsTimeout;
            return Ok(outcome);
        }

        loop {
            if !page.wait_for(&selectors.listing, self.limits.listing_timeout).await? {
                warn!("[{}] No listings found on page {}", outcome.source, outcome.pages_visited + 1);
                outcome.stop_reason = StopReason::ListingTimeout;
                break;
            }

            let html = page.content().await?;
            outcome.pages_visited += 1;

            let batch = self.adapter.extract_listings(&html);
            debug!("[{}] Page {}: {} listings", outcome.source, outcome.pages_visited, batch.len());

            for mut listing in batch {
                if outcome.listings.len() >= self.limits.max_listings {
                    break;
                }
                listing.position = u32::try_from(outcome.listings.len() + 1).unwrap_or(u32::MAX);
                outcome.listings.push(listing);
            }

            if outcome.listings.len() >= self.limits.max_listings {
                outcome.stop_reason = StopReason::ListingCap;
                break;
            }
            if outcome.pages_visited >= self.limits.max_pages {
                outcome.stop_reason = StopReason::PageCap;
                break;
            }

            match page.next_control(&selectors.next_page).await? {
                NextControl::Missing => {
                    outcome.stop_reason = StopReason::NoNextControl;
                    break;
                }
                NextControl::Disabled => {
                    outcome.stop_reason = StopReason::NextDisabled;
                    break;
                }
                NextControl::Enabled => {}
            }

            if let Err(e) = page.click(&selectors.next_page).await {
                warn!("[{}] Error navigating to next page: {}", outcome.source, e);
                outcome.stop_reason = StopReason::NextClickFailed;
                break;
            }
            self.policy.pace().await;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::SessionError;
    use crate::infrastructure::adapters::MapsAdapter;
    use crate::test_utils::{FakeLauncher, ScriptedPage, maps_results_page, quiet_policy};

    fn session(launcher: &Arc<FakeLauncher>) -> CrawlSession {
        CrawlSession::new(
            Arc::new(MapsAdapter::new().unwrap()),
            launcher.clone(),
            quiet_policy(),
            CrawlLimits::default(),
        )
    }

    fn query() -> SearchQuery {
        SearchQuery::new("pizza", "Brooklyn, NY", 25)
    }

    #[tokio::test]
    async fn test_stops_at_page_cap() {
        // 8 pages of 10 listings: the page cap (5) triggers before the listing cap
        let pages = (0..8).map(|p| maps_results_page(p * 10, 10, true)).collect();
        let launcher = Arc::new(FakeLauncher::with_page(ScriptedPage::new(pages)));

        let outcome = session(&launcher).search(&query()).await.unwrap();

        assert_eq!(outcome.pages_visited, 5);
        assert_eq!(outcome.listings.len(), 50);
        assert_eq!(outcome.stop_reason, StopReason::PageCap);
        assert_eq!(launcher.pages_requested(), 5);
        assert_eq!(launcher.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn test_raised_limits_cannot_pass_hard_caps() {
        let pages = (0..20).map(|p| maps_results_page(p * 20, 20, true)).collect();
        let launcher = Arc::new(FakeLauncher::with_page(ScriptedPage::new(pages)));
        let limits = CrawlLimits {
            max_pages: 20,
            max_listings: 1000,
            ..CrawlLimits::default()
        };
        let session = CrawlSession::new(Arc::new(MapsAdapter::new().unwrap()), launcher.clone(), quiet_policy(), limits);

        let outcome = session.search(&query()).await.unwrap();

        assert!(outcome.pages_visited <= 5);
        assert!(outcome.listings.len() <= 100);
        assert_eq!(launcher.pages_requested(), 5);
    }

    #[test]
    fn test_limits_from_config_are_clamped() {
        let config = CrawlerConfig {
            max_pages: 20,
            max_listings: 1000,
            ..CrawlerConfig::default()
        };
        let limits = CrawlLimits::from(&config);
        assert_eq!(limits.max_pages, 5);
        assert_eq!(limits.max_listings, 100);
    }

    #[tokio::test]
    async fn test_stops_at_listing_cap() {
        let pages = (0..8).map(|p| maps_results_page(p * 40, 40, true)).collect();
        let launcher = Arc::new(FakeLauncher::with_page(ScriptedPage::new(pages)));

        let outcome = session(&launcher).search(&query()).await.unwrap();

        assert_eq!(outcome.listings.len(), 100);
        assert_eq!(outcome.pages_visited, 3);
        assert_eq!(outcome.stop_reason, StopReason::ListingCap);
        let positions: Vec<u32> = outcome.listings.iter().map(|l| l.position).collect();
        assert_eq!(positions, (1..=100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_disabled_next_control_returns_partial_set() {
        let pages = vec![maps_results_page(0, 7, true), maps_results_page(7, 3, false)];
        let launcher = Arc::new(FakeLauncher::with_page(ScriptedPage::new(pages)));

        let outcome = session(&launcher).search(&query()).await.unwrap();

        assert_eq!(outcome.listings.len(), 10);
        assert_eq!(outcome.stop_reason, StopReason::NextDisabled);
    }

    #[tokio::test]
    async fn test_listing_timeout_keeps_collected_listings() {
        let pages = vec![maps_results_page(0, 4, true), "<div data-value='Search results'></div>".to_string()];
        let launcher = Arc::new(FakeLauncher::with_page(ScriptedPage::new(pages)));

        let outcome = session(&launcher).search(&query()).await.unwrap();

        assert_eq!(outcome.listings.len(), 4);
        assert_eq!(outcome.stop_reason, StopReason::ListingTimeout);
        assert_eq!(launcher.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn test_navigation_failure_still_closes_session() {
        let page = ScriptedPage::new(vec![maps_results_page(0, 4, true)]).failing_navigation();
        let launcher = Arc::new(FakeLauncher::with_page(page));

        let err = session(&launcher).search(&query()).await.unwrap_err();

        assert!(matches!(err, SessionError::Navigation { .. }));
        assert_eq!(launcher.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_is_session_error() {
        let launcher = Arc::new(FakeLauncher::failing());
        let err = session(&launcher).search(&query()).await.unwrap_err();
        assert!(matches!(err, SessionError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_fetch_detail_extracts_and_closes() {
        let html = "<h1 data-value='Business name'>Joe's Pizza</h1><div data-value='Phone'>212-366-1182</div>";
        let launcher = Arc::new(FakeLauncher::with_page(ScriptedPage::new(vec![html.to_string()])));

        let detail = session(&launcher)
            .fetch_detail("https://www.google.com/maps/place/joes")
            .await
            .unwrap();

        assert_eq!(detail.fields["name"], "Joe's Pizza");
        assert_eq!(detail.fields["phone"], "212-366-1182");
        assert_eq!(launcher.closed_sessions(), 1);
    }
}
