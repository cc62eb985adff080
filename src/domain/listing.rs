//! Raw and normalized listings flowing from the crawl into resolution

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::domain::job::{Job, Source};

/// Well-known raw field keys
pub mod fields {
    pub const NAME: &str = "name";
    pub const ADDRESS: &str = "address";
    pub const PHONE: &str = "phone";
    pub const EMAIL: &str = "email";
    pub const WEBSITE: &str = "website";
    pub const RATING: &str = "rating";
    pub const REVIEW_COUNT: &str = "review_count";
}

/// Keyword/location/radius triple handed to a source adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub keyword: String,
    pub location: String,
    pub radius_miles: u32,
}

impl SearchQuery {
    pub fn new(keyword: impl Into<String>, location: impl Into<String>, radius_miles: u32) -> Self {
        Self {
            keyword: keyword.into(),
            location: location.into(),
            radius_miles,
        }
    }

    pub fn from_job(job: &Job) -> Self {
        Self::new(job.keyword.clone(), job.location.clone(), job.radius_miles)
    }

    /// Free-text form used by directory search boxes
    pub fn term(&self) -> String {
        format!("{} near {}", self.keyword, self.location)
    }
}

/// Unvalidated listing as extracted from a results page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawListing {
    pub source: Source,
    /// 1-based position in the source's aggregated result list
    pub position: u32,
    pub fields: BTreeMap<String, String>,
}

impl RawListing {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            position: 0,
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }
}

/// Unvalidated detail page of one business
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawDetail {
    pub source: Source,
    pub reference: String,
    pub fields: BTreeMap<String, String>,
}

/// Cleaned listing; every field that failed validation is `None`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedListing {
    pub source: Source,
    pub position: u32,
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub rating: Option<String>,
    pub review_count: Option<u32>,
    pub attributes: Map<String, Value>,
}

impl Default for NormalizedListing {
    fn default() -> Self {
        Self {
            source: Source::Maps,
            position: 0,
            name: None,
            address: None,
            phone: None,
            email: None,
            website: None,
            rating: None,
            review_count: None,
            attributes: Map::new(),
        }
    }
}

impl NormalizedListing {
    /// Numeric view of the one-decimal rating text
    pub fn rating_value(&self) -> Option<f64> {
        self.rating.as_deref().and_then(|r| r.parse().ok())
    }
}
