//! Maps directory adapter
//!
//! Results are rendered client-side into elements tagged with
//! `data-result-index`; listing fields carry `data-value` labels.

use url::Url;

use super::{DetailExtractor, FieldRule, ListingExtractor, PageSelectors, SourceAdapter};
use crate::domain::errors::ExtractionError;
use crate::domain::job::Source;
use crate::domain::listing::{RawDetail, RawListing, SearchQuery, fields};

pub const BASE_URL: &str = "https://www.google.com/maps";

const LISTING_CONTAINERS: &[&str] = &["[data-result-index]", "div[role='article']"];

const LISTING_RULES: &[FieldRule] = &[
    FieldRule::text(fields::NAME, &["[data-value='Business name']", ".qBF1Pd", ".fontHeadlineSmall"]),
    FieldRule::text(fields::RATING, &["[data-value='Rating']", ".MW4etd"]),
    FieldRule::text(fields::REVIEW_COUNT, &["[data-value='Reviews']", ".UY7F9"]),
    FieldRule::text(fields::ADDRESS, &["[data-value='Address']"]),
    FieldRule::text(fields::PHONE, &["[data-value='Phone']", ".UsdlK"]),
    FieldRule::attr("maps_url", &["a[href*='/maps/place/']"], "href"),
];

const DETAIL_RULES: &[FieldRule] = &[
    FieldRule::text(fields::NAME, &["h1[data-value='Business name']", "h1"]),
    FieldRule::text(fields::ADDRESS, &["[data-value='Address']", "button[data-item-id='address']"]),
    FieldRule::text(fields::PHONE, &["[data-value='Phone']", "button[data-item-id^='phone']"]),
    FieldRule::attr(fields::WEBSITE, &["[data-value='Website'] a", "a[data-item-id='authority']"], "href"),
    FieldRule::text("hours", &["[data-value='Hours']"]),
    FieldRule::text("description", &["[data-value='Description']"]),
];

const REQUIRED: &[&str] = &[fields::NAME];

pub struct MapsAdapter {
    selectors: PageSelectors,
    listings: ListingExtractor,
    detail: DetailExtractor,
}

impl MapsAdapter {
    pub fn new() -> Result<Self, ExtractionError> {
        Ok(Self {
            selectors: PageSelectors {
                results: "[data-value='Search results']".to_string(),
                listing: "[data-result-index]".to_string(),
                next_page: "[aria-label='Next page']".to_string(),
                detail: "h1".to_string(),
            },
            listings: ListingExtractor::new(Source::Maps, LISTING_CONTAINERS, LISTING_RULES, REQUIRED)?,
            detail: DetailExtractor::new(Source::Maps, DETAIL_RULES, REQUIRED)?,
        })
    }
}

impl SourceAdapter for MapsAdapter {
    fn source(&self) -> Source {
        Source::Maps
    }

    /// `{BASE_URL}/search/{keyword near location}` with the term percent-encoded
    fn search_url(&self, query: &SearchQuery) -> Result<String, ExtractionError> {
        let mut url = Url::parse(BASE_URL).map_err(|e| ExtractionError::InvalidUrl { message: e.to_string() })?;
        url.path_segments_mut()
            .map_err(|()| ExtractionError::InvalidUrl {
                message: format!("{BASE_URL} cannot carry path segments"),
            })?
            .push("search")
            .push(&query.term());
        Ok(url.to_string())
    }

    fn page_selectors(&self) -> &PageSelectors {
        &self.selectors
    }

    fn extract_listings(&self, html: &str) -> Vec<RawListing> {
        self.listings.extract_all(html)
    }

    fn extract_detail(&self, html: &str, reference: &str) -> Result<RawDetail, ExtractionError> {
        let mut detail = self.detail.extract(html, reference)?;
        detail.fields.insert("scraped_url".to_string(), reference.to_string());
        Ok(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS_PAGE: &str = r#"
        <div data-value="Search results">
          <div data-result-index="0">
            <a href="https://www.google.com/maps/place/Joes+Pizza/@40.73">link</a>
            <span data-value="Business name">Joe's Pizza</span>
            <span data-value="Rating">4.6</span>
            <span data-value="Reviews">(12,345)</span>
            <span data-value="Address">7 Carmine St, New York, NY 10014</span>
            <span data-value="Phone">(212) 366-1182</span>
          </div>
          <div data-result-index="1">
            <span data-value="Rating">3.9</span>
          </div>
          <div data-result-index="2">
            <span data-value="Business name">Prince Street Pizza</span>
          </div>
        </div>
    "#;

    #[test]
    fn test_search_url_encodes_term() {
        let adapter = MapsAdapter::new().unwrap();
        let url = adapter
            .search_url(&SearchQuery::new("pizza", "Brooklyn, NY", 25))
            .unwrap();
        assert_eq!(url, "https://www.google.com/maps/search/pizza%20near%20Brooklyn,%20NY");
    }

    #[test]
    fn test_extract_listings_requires_name() {
        let adapter = MapsAdapter::new().unwrap();
        let listings = adapter.extract_listings(RESULTS_PAGE);

        assert_eq!(listings.len(), 2);
        let first = &listings[0];
        assert_eq!(first.get(fields::NAME), Some("Joe's Pizza"));
        assert_eq!(first.get(fields::REVIEW_COUNT), Some("(12,345)"));
        assert_eq!(first.get(fields::PHONE), Some("(212) 366-1182"));
        assert_eq!(
            first.get("maps_url"),
            Some("https://www.google.com/maps/place/Joes+Pizza/@40.73")
        );
        assert_eq!(listings[1].get(fields::NAME), Some("Prince Street Pizza"));
    }

    #[test]
    fn test_extract_detail_records_reference() {
        let adapter = MapsAdapter::new().unwrap();
        let html = r#"
            <h1 data-value="Business name">Joe's Pizza</h1>
            <div data-value="Website"><a href="https://joespizzanyc.com">site</a></div>
            <div data-value="Hours">Open 24 hours</div>
        "#;

        let detail = adapter.extract_detail(html, "https://www.google.com/maps/place/x").unwrap();
        assert_eq!(detail.fields["name"], "Joe's Pizza");
        assert_eq!(detail.fields["website"], "https://joespizzanyc.com");
        assert_eq!(detail.fields["hours"], "Open 24 hours");
        assert_eq!(detail.fields["scraped_url"], "https://www.google.com/maps/place/x");

        assert!(adapter.extract_detail("<p>nothing</p>", "x").is_err());
    }
}
