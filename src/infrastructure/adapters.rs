//! Source adapters - per-directory search and detail extraction
//!
//! An adapter knows how to address one directory (search URL, page
//! selectors) and how to turn its markup into raw listings. It never cleans
//! values; that is the normalizer's job. Browser driving lives in
//! [`CrawlSession`](crate::infrastructure::crawl_session::CrawlSession).

#![allow(clippy::uninlined_format_args)]

pub mod maps;
pub mod yellow_pages;

use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::errors::{ExtractionError, SessionError};
use crate::domain::job::Source;
use crate::domain::listing::{RawDetail, RawListing, SearchQuery};

pub use maps::MapsAdapter;
pub use yellow_pages::YellowPagesAdapter;

/// Selectors the crawl session waits on and clicks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelectors {
    /// Container that signals the results page has rendered
    pub results: String,
    /// One element per listing
    pub listing: String,
    /// Pagination control
    pub next_page: String,
    /// Main element of a detail page
    pub detail: String,
}

/// Per-directory capability used by a crawl session
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    fn search_url(&self, query: &SearchQuery) -> Result<String, ExtractionError>;

    fn page_selectors(&self) -> &PageSelectors;

    /// Listings on one results page. Listings that fail to extract are
    /// logged and left out.
    fn extract_listings(&self, html: &str) -> Vec<RawListing>;

    fn extract_detail(&self, html: &str, reference: &str) -> Result<RawDetail, ExtractionError>;
}

/// How to read one raw field: fallback selectors tried in order, reading
/// either the element text or an attribute
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: &'static str,
    pub selectors: &'static [&'static str],
    pub attribute: Option<&'static str>,
}

impl FieldRule {
    pub const fn text(field: &'static str, selectors: &'static [&'static str]) -> Self {
        Self {
            field,
            selectors,
            attribute: None,
        }
    }

    pub const fn attr(field: &'static str, selectors: &'static [&'static str], attribute: &'static str) -> Self {
        Self {
            field,
            selectors,
            attribute: Some(attribute),
        }
    }
}

struct CompiledRule {
    field: &'static str,
    selectors: Vec<Selector>,
    attribute: Option<&'static str>,
}

/// Compile multiple selector strings; fails only when none compiles
pub fn compile_selectors(selector_strings: &[&str]) -> Result<Vec<Selector>, ExtractionError> {
    let mut selectors = Vec::new();
    let mut errors = Vec::new();

    for selector_str in selector_strings {
        match Selector::parse(selector_str) {
            Ok(selector) => selectors.push(selector),
            Err(e) => {
                warn!("Failed to compile selector '{}': {}", selector_str, e);
                errors.push(format!("'{}': {}", selector_str, e));
            }
        }
    }

    if selectors.is_empty() {
        return Err(ExtractionError::invalid_selector(
            selector_strings.join(", "),
            errors.join(", "),
        ));
    }

    Ok(selectors)
}

/// Collapse an element's text nodes into one string
pub fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rule-driven field extraction shared by the adapters
pub struct ListingExtractor {
    source: Source,
    containers: Vec<Selector>,
    rules: Vec<CompiledRule>,
    required: &'static [&'static str],
}

impl ListingExtractor {
    pub fn new(
        source: Source,
        containers: &[&str],
        rules: &[FieldRule],
        required: &'static [&'static str],
    ) -> Result<Self, ExtractionError> {
        Ok(Self {
            source,
            containers: compile_selectors(containers)?,
            rules: compile_rules(rules)?,
            required,
        })
    }

    /// Extract every listing on the page, skipping failed ones
    pub fn extract_all(&self, html: &str) -> Vec<RawListing> {
        let document = Html::parse_document(html);

        for (i, container) in self.containers.iter().enumerate() {
            let elements: Vec<ElementRef<'_>> = document.select(container).collect();
            if elements.is_empty() {
                continue;
            }
            debug!("[{}] {} listing containers via selector #{}", self.source, elements.len(), i);

            let mut listings = Vec::with_capacity(elements.len());
            for (index, element) in elements.iter().enumerate() {
                match self.extract_one(element) {
                    Ok(listing) => listings.push(listing),
                    Err(e) => warn!("[{}] Skipping listing {} on page: {}", self.source, index, e),
                }
            }
            return listings;
        }

        debug!("[{}] No listing containers on page", self.source);
        Vec::new()
    }

    /// Extract one listing from its container element
    pub fn extract_one(&self, element: &ElementRef<'_>) -> Result<RawListing, ExtractionError> {
        let mut listing = RawListing::new(self.source);
        listing.fields = self.extract_fields(element);

        for field in self.required {
            if !listing.fields.contains_key(*field) {
                return Err(ExtractionError::missing_field(*field));
            }
        }
        Ok(listing)
    }

    /// Apply every rule below `root`, keeping the first non-empty match
    pub fn extract_fields(&self, root: &ElementRef<'_>) -> BTreeMap<String, String> {
        extract_with_rules(root, &self.rules)
    }
}

/// Rules evaluated against a whole detail page
pub struct DetailExtractor {
    source: Source,
    rules: Vec<CompiledRule>,
    required: &'static [&'static str],
}

impl DetailExtractor {
    pub fn new(source: Source, rules: &[FieldRule], required: &'static [&'static str]) -> Result<Self, ExtractionError> {
        Ok(Self {
            source,
            rules: compile_rules(rules)?,
            required,
        })
    }

    pub fn extract(&self, html: &str, reference: &str) -> Result<RawDetail, ExtractionError> {
        let document = Html::parse_document(html);
        let fields = extract_with_rules(&document.root_element(), &self.rules);

        for field in self.required {
            if !fields.contains_key(*field) {
                return Err(ExtractionError::missing_field(*field));
            }
        }

        Ok(RawDetail {
            source: self.source,
            reference: reference.to_string(),
            fields,
        })
    }
}

fn compile_rules(rules: &[FieldRule]) -> Result<Vec<CompiledRule>, ExtractionError> {
    rules
        .iter()
        .map(|rule| {
            Ok(CompiledRule {
                field: rule.field,
                selectors: compile_selectors(rule.selectors)?,
                attribute: rule.attribute,
            })
        })
        .collect()
}

fn extract_with_rules(root: &ElementRef<'_>, rules: &[CompiledRule]) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    for rule in rules {
        let value = rule.selectors.iter().find_map(|selector| {
            root.select(selector).find_map(|element| {
                let value = match rule.attribute {
                    Some(attribute) => element.value().attr(attribute).map(str::trim).map(String::from),
                    None => Some(element_text(&element)),
                };
                value.filter(|v| !v.is_empty())
            })
        });

        if let Some(value) = value {
            fields.insert(rule.field.to_string(), value);
        }
    }

    fields
}

/// Adapters available to the orchestrator, keyed by source
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Source, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in adapter
    pub fn with_defaults() -> Result<Self, ExtractionError> {
        let mut registry = Self::new();
        registry.register(Arc::new(MapsAdapter::new()?));
        registry.register(Arc::new(YellowPagesAdapter::new()?));
        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.source(), adapter);
    }

    /// Adapter for `source`; sources without one fail like a broken session
    pub fn adapter_for(&self, source: Source) -> Result<Arc<dyn SourceAdapter>, SessionError> {
        self.adapters
            .get(&source)
            .cloned()
            .ok_or(SessionError::UnsupportedSource { requested: source })
    }

    pub fn sources(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self.adapters.keys().copied().collect();
        sources.sort();
        sources
    }
}
