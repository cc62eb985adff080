//! Test utilities for bizscout
//!
//! Provides common testing infrastructure: an isolated in-memory database,
//! a scripted browser that serves canned result pages, and recording
//! doubles for the store, queue and progress seams.

use anyhow::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::application::crawl_orchestrator::CrawlOrchestrator;
use crate::application::entity_resolver::EntityResolver;
use crate::application::job_runner::JobRunner;
use crate::application::progress::{ProgressSink, ProgressUpdate};
use crate::application::task_queue::{QueueError, TaskQueue};
use crate::domain::business::{Attribution, BusinessRecord};
use crate::domain::errors::{SessionError, SessionResult, StoreError, StoreResult};
use crate::domain::job::Job;
use crate::domain::repositories::{AttributionRepository, BusinessRepository, DiscoveryStore, JobRepository};
use crate::infrastructure::adapters::AdapterRegistry;
use crate::infrastructure::browser::{BrowserLauncher, BrowserPage, NextControl};
use crate::infrastructure::config::{BrowserConfig, CrawlerConfig, ResolverConfig};
use crate::infrastructure::crawl_session::CrawlLimits;
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::sqlite_store::SqliteDiscoveryStore;
use crate::infrastructure::stealth::{SessionProfile, StealthPolicy};

/// Test database configuration
pub struct TestDatabase {
    pub connection: DatabaseConnection,
}

impl TestDatabase {
    /// Create a new, migrated in-memory database.
    ///
    /// Each test gets a fresh, clean database state.
    pub async fn new() -> Result<Self> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;
        db.migrate().await?;
        Ok(Self { connection: db })
    }

    /// Get the database pool for use in repositories
    pub fn pool(&self) -> sqlx::Pool<sqlx::Sqlite> {
        self.connection.pool().clone()
    }

    pub fn store(&self) -> SqliteDiscoveryStore {
        SqliteDiscoveryStore::new(self.pool())
    }
}

/// Stealth policy with pacing disabled
pub fn quiet_policy() -> Arc<StealthPolicy> {
    Arc::new(
        StealthPolicy::new(BrowserConfig::default(), &CrawlerConfig::default())
            .with_pacing(Duration::ZERO, Duration::ZERO),
    )
}

/// One business rendered into a maps results page
#[derive(Debug, Clone, Copy)]
pub struct MapsEntry<'a> {
    pub name: &'a str,
    pub address: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub rating: Option<&'a str>,
}

impl<'a> MapsEntry<'a> {
    pub const fn named(name: &'a str) -> Self {
        Self {
            name,
            address: None,
            phone: None,
            rating: None,
        }
    }

    #[must_use]
    pub const fn at(mut self, address: &'a str) -> Self {
        self.address = Some(address);
        self
    }

    #[must_use]
    pub const fn phone(mut self, phone: &'a str) -> Self {
        self.phone = Some(phone);
        self
    }

    #[must_use]
    pub const fn rating(mut self, rating: &'a str) -> Self {
        self.rating = Some(rating);
        self
    }
}

/// Maps results page with the given entries and pagination control
pub fn maps_page(entries: &[MapsEntry<'_>], start: usize, has_next_enabled: bool) -> String {
    let mut html = String::from("<html><body><div data-value='Search results'>");
    for (offset, entry) in entries.iter().enumerate() {
        html.push_str(&format!("<div data-result-index='{}'>", start + offset));
        html.push_str(&format!("<div data-value='Business name'>{}</div>", entry.name));
        if let Some(address) = entry.address {
            html.push_str(&format!("<div data-value='Address'>{address}</div>"));
        }
        if let Some(phone) = entry.phone {
            html.push_str(&format!("<div data-value='Phone'>{phone}</div>"));
        }
        if let Some(rating) = entry.rating {
            html.push_str(&format!("<span data-value='Rating'>{rating}</span>"));
        }
        html.push_str("</div>");
    }
    html.push_str("</div>");
    if has_next_enabled {
        html.push_str("<button aria-label='Next page'>Next</button>");
    } else {
        html.push_str("<button aria-label='Next page' disabled>Next</button>");
    }
    html.push_str("</body></html>");
    html
}

/// Maps results page of `count` generic listings numbered from `start`
pub fn maps_results_page(start: usize, count: usize, has_next_enabled: bool) -> String {
    let names: Vec<String> = (start..start + count).map(|i| format!("Listing {i}")).collect();
    let entries: Vec<MapsEntry<'_>> = names.iter().map(|name| MapsEntry::named(name)).collect();
    maps_page(&entries, start, has_next_enabled)
}

#[derive(Debug, Default)]
struct PageCounters {
    contents: AtomicUsize,
    closed: AtomicUsize,
    launches: AtomicUsize,
}

/// Browser page serving a fixed sequence of documents; `click` advances
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    pages: Arc<Vec<String>>,
    index: usize,
    fail_navigation: bool,
    closed: bool,
    counters: Arc<PageCounters>,
}

impl ScriptedPage {
    pub fn new(pages: Vec<String>) -> Self {
        Self {
            pages: Arc::new(pages),
            index: 0,
            fail_navigation: false,
            closed: false,
            counters: Arc::new(PageCounters::default()),
        }
    }

    #[must_use]
    pub fn failing_navigation(mut self) -> Self {
        self.fail_navigation = true;
        self
    }

    fn fresh(&self) -> Self {
        Self {
            index: 0,
            closed: false,
            ..self.clone()
        }
    }

    fn current(&self) -> &str {
        self.pages.get(self.index).map_or("", String::as_str)
    }

    fn parse_selector(selector: &str) -> SessionResult<Selector> {
        Selector::parse(selector).map_err(|e| SessionError::driver(format!("invalid selector '{selector}': {e}")))
    }

    fn matches(&self, selector: &str) -> SessionResult<bool> {
        let selector = Self::parse_selector(selector)?;
        let document = Html::parse_document(self.current());
        let found = document.select(&selector).next().is_some();
        Ok(found)
    }

    fn control_state(&self, selector: &str) -> SessionResult<NextControl> {
        let selector = Self::parse_selector(selector)?;
        let document = Html::parse_document(self.current());
        let state = match document.select(&selector).next() {
            None => NextControl::Missing,
            Some(element) => {
                let value = element.value();
                if value.attr("disabled").is_some() || value.attr("aria-disabled") == Some("true") {
                    NextControl::Disabled
                } else {
                    NextControl::Enabled
                }
            }
        };
        Ok(state)
    }
}

#[async_trait]
impl BrowserPage for ScriptedPage {
    async fn goto(&mut self, url: &str) -> SessionResult<()> {
        if self.fail_navigation {
            return Err(SessionError::navigation(url, "net::ERR_CONNECTION_REFUSED"));
        }
        self.index = 0;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> SessionResult<bool> {
        self.matches(selector)
    }

    async fn content(&mut self) -> SessionResult<String> {
        self.counters.contents.fetch_add(1, Ordering::SeqCst);
        Ok(self.current().to_string())
    }

    async fn next_control(&mut self, selector: &str) -> SessionResult<NextControl> {
        self.control_state(selector)
    }

    async fn click(&mut self, selector: &str) -> SessionResult<()> {
        if !self.matches(selector)? {
            return Err(SessionError::driver(format!("no element matches '{selector}'")));
        }
        if self.index + 1 >= self.pages.len() {
            return Err(SessionError::driver("click did not load another page"));
        }
        self.index += 1;
        Ok(())
    }

    async fn close(&mut self) -> SessionResult<()> {
        if !self.closed {
            self.closed = true;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Launcher handing out fresh copies of one scripted page
pub struct FakeLauncher {
    template: Option<ScriptedPage>,
    counters: Arc<PageCounters>,
}

impl FakeLauncher {
    pub fn with_page(page: ScriptedPage) -> Self {
        let counters = page.counters.clone();
        Self {
            template: Some(page),
            counters,
        }
    }

    /// Launcher whose every launch fails
    pub fn failing() -> Self {
        Self {
            template: None,
            counters: Arc::new(PageCounters::default()),
        }
    }

    /// Result pages read across all sessions
    pub fn pages_requested(&self) -> usize {
        self.counters.contents.load(Ordering::SeqCst)
    }

    pub fn closed_sessions(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _profile: &SessionProfile) -> SessionResult<Box<dyn BrowserPage>> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        match &self.template {
            Some(page) => Ok(Box::new(page.fresh())),
            None => Err(SessionError::Launch {
                message: "chromedriver not reachable".to_string(),
            }),
        }
    }
}

/// Store wrapper that fails selected operations
pub struct FailingStore {
    inner: SqliteDiscoveryStore,
    fail_lookups: bool,
    /// Attribution inserts allowed before they start failing
    attribution_budget: Option<usize>,
    attributions: AtomicUsize,
}

impl FailingStore {
    /// Phone and name-candidate queries fail
    pub fn failing_lookups(inner: SqliteDiscoveryStore) -> Self {
        Self {
            inner,
            fail_lookups: true,
            attribution_budget: None,
            attributions: AtomicUsize::new(0),
        }
    }

    /// Attribution inserts fail once `succeeding` of them went through
    pub fn failing_attributions_after(inner: SqliteDiscoveryStore, succeeding: usize) -> Self {
        Self {
            inner,
            fail_lookups: false,
            attribution_budget: Some(succeeding),
            attributions: AtomicUsize::new(0),
        }
    }

    fn injected(table: &'static str) -> StoreError {
        StoreError::corrupt(table, "injected failure")
    }
}

#[async_trait]
impl JobRepository for FailingStore {
    async fn create_job(&self, job: &Job) -> StoreResult<()> {
        self.inner.create_job(job).await
    }

    async fn find_job(&self, job_id: Uuid) -> StoreResult<Option<Job>> {
        self.inner.find_job(job_id).await
    }

    async fn update_job(&self, job: &Job) -> StoreResult<()> {
        self.inner.update_job(job).await
    }

    async fn list_jobs(&self, limit: u32) -> StoreResult<Vec<Job>> {
        self.inner.list_jobs(limit).await
    }
}

#[async_trait]
impl BusinessRepository for FailingStore {
    async fn find_by_phone(&self, phone: &str) -> StoreResult<Vec<BusinessRecord>> {
        if self.fail_lookups {
            return Err(Self::injected("businesses"));
        }
        self.inner.find_by_phone(phone).await
    }

    async fn find_name_candidates(&self, terms: &[String]) -> StoreResult<Vec<BusinessRecord>> {
        if self.fail_lookups {
            return Err(Self::injected("businesses"));
        }
        self.inner.find_name_candidates(terms).await
    }

    async fn find_business(&self, business_id: Uuid) -> StoreResult<Option<BusinessRecord>> {
        self.inner.find_business(business_id).await
    }

    async fn create_business(&self, record: &BusinessRecord) -> StoreResult<()> {
        self.inner.create_business(record).await
    }

    async fn update_business(&self, record: &BusinessRecord) -> StoreResult<()> {
        self.inner.update_business(record).await
    }

    async fn count_businesses(&self) -> StoreResult<u64> {
        self.inner.count_businesses().await
    }
}

#[async_trait]
impl AttributionRepository for FailingStore {
    async fn create_attribution(&self, attribution: &Attribution) -> StoreResult<()> {
        let attempt = self.attributions.fetch_add(1, Ordering::SeqCst);
        if self.attribution_budget.is_some_and(|budget| attempt >= budget) {
            return Err(Self::injected("job_results"));
        }
        self.inner.create_attribution(attribution).await
    }

    async fn find_attributions_for_job(&self, job_id: Uuid) -> StoreResult<Vec<Attribution>> {
        self.inner.find_attributions_for_job(job_id).await
    }

    async fn find_attributions_for_business(&self, business_id: Uuid) -> StoreResult<Vec<Attribution>> {
        self.inner.find_attributions_for_business(business_id).await
    }
}

/// Queue that only records what was scheduled, or refuses everything while full
#[derive(Debug, Default)]
pub struct RecordingQueue {
    calls: Mutex<Vec<(String, Vec<String>, String)>>,
    full: AtomicBool,
}

impl RecordingQueue {
    pub fn full() -> Self {
        let queue = Self::default();
        queue.refuse();
        queue
    }

    pub fn refuse(&self) {
        self.full.store(true, Ordering::SeqCst);
    }

    pub fn accept(&self) {
        self.full.store(false, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>, String)> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn enqueue(&self, task_name: &str, args: Vec<String>, queue_name: &str) -> Result<(), QueueError> {
        if self.full.load(Ordering::SeqCst) {
            return Err(QueueError::Full(queue_name.to_string()));
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((task_name.to_string(), args, queue_name.to_string()));
        }
        Ok(())
    }
}

/// Progress sink keeping every update
#[derive(Debug, Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingProgress {
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().map(|updates| updates.clone()).unwrap_or_default()
    }

    pub fn progress_values(&self) -> Vec<u8> {
        self.updates().iter().map(|update| update.progress).collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, update: ProgressUpdate) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update);
        }
    }
}

/// Job runner wired to a scripted browser and default adapters
pub fn test_runner(
    store: Arc<dyn DiscoveryStore>,
    launcher: Arc<FakeLauncher>,
    progress: Arc<dyn ProgressSink>,
) -> Result<JobRunner> {
    let orchestrator = CrawlOrchestrator::new(
        AdapterRegistry::with_defaults()?,
        launcher,
        quiet_policy(),
        CrawlLimits::default(),
    );
    let resolver = EntityResolver::new(store.clone(), ResolverConfig::default());
    Ok(JobRunner::new(store, Arc::new(orchestrator), resolver, progress))
}
