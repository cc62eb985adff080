//! Runs one crawl session per requested source, in order
//!
//! A source whose session fails entirely contributes an empty batch; the
//! remaining sources still run.

#![allow(clippy::uninlined_format_args)]

use std::sync::Arc;
use tracing::{error, info};

use crate::domain::errors::SessionResult;
use crate::domain::job::Source;
use crate::domain::listing::{RawDetail, RawListing, SearchQuery};
use crate::infrastructure::adapters::AdapterRegistry;
use crate::infrastructure::browser::BrowserLauncher;
use crate::infrastructure::crawl_session::{CrawlLimits, CrawlOutcome, CrawlSession};
use crate::infrastructure::stealth::StealthPolicy;

/// Listings of one source, in source order
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub source: Source,
    pub listings: Vec<RawListing>,
}

pub struct CrawlOrchestrator {
    registry: AdapterRegistry,
    launcher: Arc<dyn BrowserLauncher>,
    policy: Arc<StealthPolicy>,
    limits: CrawlLimits,
}

impl CrawlOrchestrator {
    pub fn new(
        registry: AdapterRegistry,
        launcher: Arc<dyn BrowserLauncher>,
        policy: Arc<StealthPolicy>,
        limits: CrawlLimits,
    ) -> Self {
        Self {
            registry,
            launcher,
            policy,
            limits,
        }
    }

    /// Crawl every source sequentially
    pub async fn run(&self, sources: &[Source], query: &SearchQuery) -> Vec<SourceBatch> {
        let mut batches = Vec::with_capacity(sources.len());

        for &source in sources {
            info!("Starting scraping from {}", source);
            let listings = match self.crawl_source(source, query).await {
                Ok(outcome) => {
                    info!("Completed scraping from {}: {} businesses", source, outcome.listings.len());
                    outcome.listings
                }
                Err(e) => {
                    error!("Error scraping from {}: {}", source, e);
                    Vec::new()
                }
            };
            batches.push(SourceBatch { source, listings });
        }

        batches
    }

    async fn crawl_source(&self, source: Source, query: &SearchQuery) -> SessionResult<CrawlOutcome> {
        self.session(source)?.search(query).await
    }

    /// Open a detail page on `source` and extract its raw fields
    pub async fn fetch_detail(&self, source: Source, reference: &str) -> SessionResult<RawDetail> {
        self.session(source)?.fetch_detail(reference).await
    }

    fn session(&self, source: Source) -> SessionResult<CrawlSession> {
        let adapter = self.registry.adapter_for(source)?;
        Ok(CrawlSession::new(
            adapter,
            self.launcher.clone(),
            self.policy.clone(),
            self.limits.clone(),
        ))
    }
}
