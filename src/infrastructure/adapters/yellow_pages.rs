//! Yellow Pages directory adapter
//!
//! Server-rendered result cards. Ratings are encoded as class words
//! (`result-rating four half`), addresses are split into street and
//! locality, and detail links are relative.

use url::Url;

use super::{DetailExtractor, FieldRule, ListingExtractor, PageSelectors, SourceAdapter};
use crate::domain::errors::ExtractionError;
use crate::domain::job::Source;
use crate::domain::listing::{RawDetail, RawListing, SearchQuery, fields};

pub const BASE_URL: &str = "https://www.yellowpages.com";

const LISTING_CONTAINERS: &[&str] = &["div.search-results div.result", "div.result", ".srp-listing"];

const LISTING_RULES: &[FieldRule] = &[
    FieldRule::text(fields::NAME, &["a.business-name span", "a.business-name", "h2.n a"]),
    FieldRule::text(fields::PHONE, &["div.phones", ".phone"]),
    FieldRule::text("street", &["div.street-address", ".adr .street-address"]),
    FieldRule::text("locality", &["div.locality", ".adr .locality"]),
    FieldRule::attr(fields::WEBSITE, &["a.track-visit-website"], "href"),
    FieldRule::text(fields::REVIEW_COUNT, &["a.rating span.count", "span.count"]),
    FieldRule::attr("rating_class", &["div.result-rating"], "class"),
    FieldRule::text("categories", &["div.categories"]),
    FieldRule::attr("detail_url", &["a.business-name"], "href"),
];

const DETAIL_RULES: &[FieldRule] = &[
    FieldRule::text(fields::NAME, &["h1.business-name", "h1"]),
    FieldRule::text(fields::ADDRESS, &["span.address", ".address"]),
    FieldRule::text(fields::PHONE, &["a.phone", ".phone"]),
    FieldRule::attr(fields::WEBSITE, &["a.website-link", "a.primary-btn.website-link"], "href"),
    FieldRule::text(fields::EMAIL, &["a.email-business"]),
    FieldRule::text("hours", &["div.open-details", ".hours"]),
    FieldRule::text("description", &["dd.general-info", ".general-info"]),
];

const REQUIRED: &[&str] = &[fields::NAME];

const RATING_WORDS: &[(&str, f64)] = &[("one", 1.0), ("two", 2.0), ("three", 3.0), ("four", 4.0), ("five", 5.0)];

pub struct YellowPagesAdapter {
    selectors: PageSelectors,
    listings: ListingExtractor,
    detail: DetailExtractor,
}

impl YellowPagesAdapter {
    pub fn new() -> Result<Self, ExtractionError> {
        Ok(Self {
            selectors: PageSelectors {
                results: "div.search-results".to_string(),
                listing: "div.result".to_string(),
                next_page: "a.next".to_string(),
                detail: "h1".to_string(),
            },
            listings: ListingExtractor::new(Source::YellowPages, LISTING_CONTAINERS, LISTING_RULES, REQUIRED)?,
            detail: DetailExtractor::new(Source::YellowPages, DETAIL_RULES, REQUIRED)?,
        })
    }

    /// Combine split address parts and decode class-word ratings
    fn finish_listing(mut listing: RawListing) -> RawListing {
        let street = listing.fields.remove("street");
        let locality = listing.fields.remove("locality");
        let address = [street, locality].into_iter().flatten().collect::<Vec<_>>().join(", ");
        if !address.is_empty() {
            listing.insert(fields::ADDRESS, address);
        }

        if let Some(classes) = listing.fields.remove("rating_class") {
            if let Some(rating) = rating_from_classes(&classes) {
                listing.insert(fields::RATING, rating);
            }
        }

        if let Some(href) = listing.fields.get("detail_url").cloned() {
            match Url::parse(BASE_URL).and_then(|base| base.join(&href)) {
                Ok(url) => listing.insert("detail_url", url.to_string()),
                Err(_) => {
                    listing.fields.remove("detail_url");
                }
            }
        }

        listing
    }
}

/// `"result-rating four half"` -> `"4.5"`
pub fn rating_from_classes(classes: &str) -> Option<String> {
    let words: Vec<&str> = classes.split_whitespace().collect();
    let whole = RATING_WORDS
        .iter()
        .find(|(word, _)| words.contains(word))
        .map(|(_, value)| *value)?;
    let half = if words.contains(&"half") { 0.5 } else { 0.0 };
    Some(format!("{:.1}", whole + half))
}

impl SourceAdapter for YellowPagesAdapter {
    fn source(&self) -> Source {
        Source::YellowPages
    }

    fn search_url(&self, query: &SearchQuery) -> Result<String, ExtractionError> {
        let url = Url::parse_with_params(
            &format!("{BASE_URL}/search"),
            &[
                ("search_terms", query.keyword.as_str()),
                ("geo_location_terms", query.location.as_str()),
            ],
        )
        .map_err(|e| ExtractionError::InvalidUrl { message: e.to_string() })?;
        Ok(url.to_string())
    }

    fn page_selectors(&self) -> &PageSelectors {
        &self.selectors
    }

    fn extract_listings(&self, html: &str) -> Vec<RawListing> {
        self.listings
            .extract_all(html)
            .into_iter()
            .map(Self::finish_listing)
            .collect()
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

    #[test]
    fn test_search_url_uses_query_params() {
        let adapter = YellowPagesAdapter::new().unwrap();
        let url = adapter
            .search_url(&SearchQuery::new("plumbers", "Austin, TX", 10))
            .unwrap();
        assert_eq!(
            url,
            "https://www.yellowpages.com/search?search_terms=plumbers&geo_location_terms=Austin%2C+TX"
        );
    }

    #[test]
    fn test_rating_from_classes() {
        assert_eq!(rating_from_classes("result-rating four half").as_deref(), Some("4.5"));
        assert_eq!(rating_from_classes("result-rating three").as_deref(), Some("3.0"));
        assert_eq!(rating_from_classes("result-rating"), None);
    }

    #[test]
    fn test_extract_listings_combines_fields() {
        let adapter = YellowPagesAdapter::new().unwrap();
        let html = r#"
            <div class="search-results organic">
              <div class="result">
                <a class="business-name" href="/austin-tx/mip/acme-plumbing-123"><span>Acme Plumbing</span></a>
                <div class="phones phone primary">(512) 555-0134</div>
                <div class="adr">
                  <div class="street-address">100 Congress Ave</div>
                  <div class="locality">Austin, TX 78701</div>
                </div>
                <a class="rating"><div class="result-rating four half"></div><span class="count">(23)</span></a>
              </div>
              <div class="result"><div class="phones">(512) 555-0000</div></div>
            </div>
        "#;

        let listings = adapter.extract_listings(html);
        assert_eq!(listings.len(), 1);
        let listing = &listings[0];
        assert_eq!(listing.source, Source::YellowPages);
        assert_eq!(listing.get(fields::NAME), Some("Acme Plumbing"));
        assert_eq!(listing.get(fields::ADDRESS), Some("100 Congress Ave, Austin, TX 78701"));
        assert_eq!(listing.get(fields::RATING), Some("4.5"));
        assert_eq!(listing.get(fields::REVIEW_COUNT), Some("(23)"));
        assert_eq!(
            listing.get("detail_url"),
            Some("https://www.yellowpages.com/austin-tx/mip/acme-plumbing-123")
        );
        assert_eq!(listing.get("rating_class"), None);
    }
}
