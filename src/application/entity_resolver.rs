//! Entity resolution against the canonical business store
//!
//! A normalized listing is either matched to an existing record (exact phone,
//! then name and address similarity) and merged into it, or stored as a new
//! record. Matching queries that fail are logged and treated as no match.

#![allow(clippy::uninlined_format_args)]

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::similarity::indel_ratio;
use crate::domain::business::BusinessRecord;
use crate::domain::errors::{ResolutionError, StoreResult};
use crate::domain::listing::NormalizedListing;
use crate::domain::repositories::DiscoveryStore;
use crate::infrastructure::config::ResolverConfig;

/// Rule that declared a duplicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Phone,
    NameAndAddress,
    StrongName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Matched(MatchKind),
    Created,
}

/// Record a listing resolved to
#[derive(Debug, Clone)]
pub struct Resolution {
    pub record: BusinessRecord,
    pub outcome: ResolutionOutcome,
    /// Informational similarity score in [0, 1]
    pub confidence: f64,
}

pub struct EntityResolver {
    store: Arc<dyn DiscoveryStore>,
    config: ResolverConfig,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn DiscoveryStore>, config: ResolverConfig) -> Self {
        Self { store, config }
    }

    /// Resolve `listing` to a canonical record, merging or creating as needed
    pub async fn resolve(&self, listing: &NormalizedListing) -> StoreResult<Resolution> {
        if let Some((mut record, kind)) = self.find_duplicate(listing).await {
            let confidence = self.confidence(listing, &record);
            if record.merge_from(listing) {
                self.store.update_business(&record).await?;
                debug!("Merged new fields into business {}", record.id);
            }
            return Ok(Resolution {
                record,
                outcome: ResolutionOutcome::Matched(kind),
                confidence,
            });
        }

        let record = BusinessRecord::from_listing(listing);
        self.store.create_business(&record).await?;
        info!(
            "Created business {} ({})",
            record.id,
            record.name.as_deref().unwrap_or("unnamed")
        );
        Ok(Resolution {
            record,
            outcome: ResolutionOutcome::Created,
            confidence: 1.0,
        })
    }

    /// First existing record that `listing` duplicates, in priority order
    pub async fn find_duplicate(&self, listing: &NormalizedListing) -> Option<(BusinessRecord, MatchKind)> {
        if let Some(phone) = listing.phone.as_deref().filter(|p| !p.is_empty()) {
            match self.phone_match(phone).await {
                Ok(Some(record)) => return Some((record, MatchKind::Phone)),
                Ok(None) => {}
                Err(e) => warn!("{}", e),
            }
        }

        let (Some(name), Some(address)) = (listing.name.as_deref(), listing.address.as_deref()) else {
            return None;
        };

        match self.name_address_match(name, address).await {
            Ok(found) => found,
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    async fn phone_match(&self, phone: &str) -> Result<Option<BusinessRecord>, ResolutionError> {
        let records = self
            .store
            .find_by_phone(phone)
            .await
            .map_err(|source| ResolutionError { query: "find_by_phone", source })?;
        Ok(records.into_iter().next())
    }

    async fn name_address_match(
        &self,
        name: &str,
        address: &str,
    ) -> Result<Option<(BusinessRecord, MatchKind)>, ResolutionError> {
        let terms = name_terms(name, &self.config);
        if terms.is_empty() {
            return Ok(None);
        }

        let candidates = self
            .store
            .find_name_candidates(&terms)
            .await
            .map_err(|source| ResolutionError {
                query: "find_name_candidates",
                source,
            })?;

        for candidate in candidates {
            let name_similarity = indel_ratio(name, candidate.name.as_deref().unwrap_or_default());
            let address_similarity = candidate
                .address
                .as_deref()
                .map_or(0.0, |existing| indel_ratio(address, existing));

            if let Some(kind) = duplicate_kind(name_similarity, address_similarity, &self.config) {
                debug!(
                    "'{}' matches business {} (name {:.3}, address {:.3})",
                    name, candidate.id, name_similarity, address_similarity
                );
                return Ok(Some((candidate, kind)));
            }
        }
        Ok(None)
    }

    /// Weighted similarity over the fields both sides carry
    pub fn confidence(&self, listing: &NormalizedListing, existing: &BusinessRecord) -> f64 {
        let mut score = 0.0;
        let mut weights = 0.0;

        if let (Some(a), Some(b)) = (listing.name.as_deref(), existing.name.as_deref()) {
            score += self.config.name_weight * indel_ratio(a, b);
            weights += self.config.name_weight;
        }
        if let (Some(a), Some(b)) = (listing.address.as_deref(), existing.address.as_deref()) {
            score += self.config.address_weight * indel_ratio(a, b);
            weights += self.config.address_weight;
        }
        if let (Some(a), Some(b)) = (listing.phone.as_deref(), existing.phone.as_deref()) {
            if a == b {
                score += self.config.phone_weight;
            }
            weights += self.config.phone_weight;
        }

        if weights > 0.0 {
            (score / weights).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Duplicate rule satisfied by a pair of similarities, if any
pub fn duplicate_kind(name_similarity: f64, address_similarity: f64, config: &ResolverConfig) -> Option<MatchKind> {
    if name_similarity >= config.strong_name_threshold {
        Some(MatchKind::StrongName)
    } else if name_similarity >= config.name_threshold && address_similarity >= config.address_threshold {
        Some(MatchKind::NameAndAddress)
    } else {
        None
    }
}

/// Lower-cased name tokens used to prefilter candidates
pub fn name_terms(name: &str, config: &ResolverConfig) -> Vec<String> {
    name.to_lowercase()
        .split_whitespace()
        .filter(|token| token.chars().count() > config.min_term_chars)
        .take(config.max_name_terms)
        .map(String::from)
        .collect()
}
