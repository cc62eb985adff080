//! Canonical business records and their attributions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::job::Source;
use crate::domain::listing::NormalizedListing;

/// Canonical deduplicated business entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessRecord {
    pub id: Uuid,
    pub name: Option<String>,
    pub address: Option<String>,
    /// E.164 text; never overwritten once set
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    /// One decimal place, 0.0 to 5.0
    pub rating: Option<String>,
    pub review_count: Option<u32>,
    pub attributes: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BusinessRecord {
    pub fn from_listing(listing: &NormalizedListing) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: listing.name.clone(),
            address: listing.address.clone(),
            phone: listing.phone.clone(),
            email: listing.email.clone(),
            website: listing.website.clone(),
            rating: listing.rating.clone(),
            review_count: listing.review_count,
            attributes: listing.attributes.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Fill empty fields from a newer listing and merge its attributes.
    ///
    /// Populated fields are kept as they are. Attribute keys present on both
    /// sides take the listing's value. Returns whether anything changed.
    pub fn merge_from(&mut self, listing: &NormalizedListing) -> bool {
        let mut changed = false;

        changed |= fill_if_empty(&mut self.name, listing.name.as_ref());
        changed |= fill_if_empty(&mut self.address, listing.address.as_ref());
        changed |= fill_if_empty(&mut self.phone, listing.phone.as_ref());
        changed |= fill_if_empty(&mut self.email, listing.email.as_ref());
        changed |= fill_if_empty(&mut self.website, listing.website.as_ref());
        changed |= fill_if_empty(&mut self.rating, listing.rating.as_ref());

        if self.review_count.is_none() && listing.review_count.is_some() {
            self.review_count = listing.review_count;
            changed = true;
        }

        for (key, value) in &listing.attributes {
            if self.attributes.get(key) != Some(value) {
                self.attributes.insert(key.clone(), value.clone());
                changed = true;
            }
        }

        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }
}

fn fill_if_empty(field: &mut Option<String>, incoming: Option<&String>) -> bool {
    let is_empty = field.as_deref().is_none_or(|v| v.trim().is_empty());
    match incoming {
        Some(value) if is_empty && !value.trim().is_empty() => {
            *field = Some(value.clone());
            true
        }
        _ => false,
    }
}

/// Evidence link between a job, the source that produced a listing and the
/// record it resolved to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attribution {
    pub id: Uuid,
    pub job_id: Uuid,
    pub business_id: Uuid,
    pub source: Source,
    /// Informational similarity score in [0, 1]
    pub confidence_score: f64,
    pub search_term: String,
    /// 1-based index in the source's aggregated result list
    pub search_position: u32,
    pub created_at: DateTime<Utc>,
}

impl Attribution {
    pub fn new(
        job_id: Uuid,
        business_id: Uuid,
        source: Source,
        confidence_score: f64,
        search_term: impl Into<String>,
        search_position: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            business_id,
            source,
            confidence_score: confidence_score.clamp(0.0, 1.0),
            search_term: search_term.into(),
            search_position,
            created_at: Utc::now(),
        }
    }
}
