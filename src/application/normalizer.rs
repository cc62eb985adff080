//! Field-level cleaning of raw listings
//!
//! Every function is pure and deterministic. A value that cannot be cleaned
//! is dropped (`None`) and logged; it never blocks the rest of the record.

#![allow(clippy::uninlined_format_args)]

use once_cell::sync::Lazy;
use phonenumber::{Mode, country};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::errors::ValidationError;
use crate::domain::listing::{NormalizedListing, RawListing, fields};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static NAME_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(business name|name):\s*").expect("valid regex"));
static ADDRESS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(address|located at):\s*").expect("valid regex"));
static PHONE_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d+]").expect("valid regex"));
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$")
        .expect("valid regex")
});
static SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https?://").expect("valid regex"));
static WEBSITE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^https?://(?:(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+[A-Z]{2,6}\.?|localhost|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})(?::\d+)?(?:/?|[/?]\S+)$",
    )
    .expect("valid regex")
});
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.?\d*").expect("valid regex"));
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Region assumed for numbers written without a country code
pub const DEFAULT_REGION: country::Id = country::Id::US;

/// Collapse whitespace, trim and drop a leading name label
pub fn clean_text(raw: &str) -> String {
    let collapsed = WHITESPACE.replace_all(raw.trim(), " ");
    NAME_LABEL.replace(&collapsed, "").into_owned()
}

/// Business name; `None` when nothing is left after cleaning
pub fn clean_name(raw: &str) -> Option<String> {
    Some(clean_text(raw)).filter(|name| !name.is_empty())
}

/// Address; additionally drops `Address:` / `Located at:` labels
pub fn clean_address(raw: &str) -> Option<String> {
    let text = clean_text(raw);
    Some(ADDRESS_LABEL.replace(&text, "").trim().to_string()).filter(|address| !address.is_empty())
}

/// Parse against the default region, retrying once with only digits and
/// `+` kept, and format as E.164.
pub fn validate_phone(raw: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::Empty { field: fields::PHONE });
    }

    let parsed = match phonenumber::parse(Some(DEFAULT_REGION), raw) {
        Ok(number) => number,
        Err(first_err) => {
            let stripped = PHONE_STRIP.replace_all(raw, "");
            phonenumber::parse(Some(DEFAULT_REGION), stripped.as_ref()).map_err(|e| {
                ValidationError::invalid(fields::PHONE, raw, format!("{first_err}; retry: {e}"))
            })?
        }
    };

    if !phonenumber::is_valid(&parsed) {
        return Err(ValidationError::invalid(fields::PHONE, raw, "not a valid number"));
    }

    Ok(parsed.format().mode(Mode::E164).to_string())
}

pub fn clean_phone(raw: &str) -> Option<String> {
    validate_phone(raw)
        .map_err(|e| debug!("Dropping phone: {}", e))
        .ok()
}

pub fn validate_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::Empty { field: fields::EMAIL });
    }
    if email.len() > 254 || !EMAIL.is_match(&email) {
        return Err(ValidationError::invalid(fields::EMAIL, raw, "malformed address"));
    }
    Ok(email)
}

pub fn clean_email(raw: &str) -> Option<String> {
    validate_email(raw)
        .map_err(|e| debug!("Dropping email: {}", e))
        .ok()
}

/// Prepend `https://` when no scheme is present, then validate
pub fn validate_website(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field: fields::WEBSITE });
    }

    let url = if SCHEME.is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    if !WEBSITE.is_match(&url) {
        return Err(ValidationError::invalid(fields::WEBSITE, raw, "not a domain, localhost or IPv4 URL"));
    }
    Ok(url)
}

pub fn clean_website(raw: &str) -> Option<String> {
    validate_website(raw)
        .map_err(|e| debug!("Dropping website: {}", e))
        .ok()
}

/// First numeric token, kept when within [0, 5], one decimal place
pub fn clean_rating(raw: &str) -> Option<String> {
    let token = NUMBER.find(raw)?;
    let value: f64 = token.as_str().parse().ok()?;
    if (0.0..=5.0).contains(&value) {
        Some(format!("{:.1}", value))
    } else {
        debug!("Dropping rating out of range: {}", raw);
        None
    }
}

/// First digit run after removing thousands separators
pub fn clean_review_count(raw: &str) -> Option<u32> {
    let without_separators = raw.replace(',', "");
    let digits = DIGITS.find(&without_separators)?.as_str();
    match digits.parse() {
        Ok(count) => Some(count),
        Err(e) => {
            debug!("Dropping review count {}: {}", raw, e);
            None
        }
    }
}

/// Clean every known field; unknown fields go to the attribute map unchanged
pub fn normalize(listing: &RawListing) -> NormalizedListing {
    normalize_fields(listing, &listing.fields)
}

fn normalize_fields(listing: &RawListing, raw: &BTreeMap<String, String>) -> NormalizedListing {
    let mut normalized = NormalizedListing {
        source: listing.source,
        position: listing.position,
        ..NormalizedListing::default()
    };
    let mut attributes = Map::new();

    for (key, value) in raw {
        match key.as_str() {
            fields::NAME => normalized.name = clean_name(value),
            fields::ADDRESS => normalized.address = clean_address(value),
            fields::PHONE => normalized.phone = clean_phone(value),
            fields::EMAIL => normalized.email = clean_email(value),
            fields::WEBSITE => normalized.website = clean_website(value),
            fields::RATING => normalized.rating = clean_rating(value),
            fields::REVIEW_COUNT => normalized.review_count = clean_review_count(value),
            _ => {
                attributes.insert(key.clone(), Value::String(value.clone()));
            }
        }
    }

    normalized.attributes = attributes;
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::Source;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("  Joe's   Pizza \n", Some("Joe's Pizza"))]
    #[case("Business Name: Joe's Pizza", Some("Joe's Pizza"))]
    #[case("name:   Joe's Pizza", Some("Joe's Pizza"))]
    #[case("   ", None)]
    fn test_clean_name(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(clean_name(raw).as_deref(), expected);
    }

    #[rstest]
    #[case("Address:  7 Carmine St,\n New York", Some("7 Carmine St, New York"))]
    #[case("located at: 1 Main St", Some("1 Main St"))]
    #[case("Address:", None)]
    fn test_clean_address(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(clean_address(raw).as_deref(), expected);
    }

    #[rstest]
    #[case("(212) 366-1182", Some("+12123661182"))]
    #[case("212.366.1182", Some("+12123661182"))]
    #[case("+1 212 366 1182", Some("+12123661182"))]
    #[case("Phone: 212-366-1182", Some("+12123661182"))]
    #[case("call us", None)]
    #[case("123", None)]
    fn test_clean_phone(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(clean_phone(raw).as_deref(), expected);
    }

    #[rstest]
    #[case(" Info@JoesPizza.com ", Some("info@joespizza.com"))]
    #[case("first.last+tag@mail.example.org", Some("first.last+tag@mail.example.org"))]
    #[case("not-an-email", None)]
    #[case("a@b", None)]
    #[case("a@-bad.com", None)]
    fn test_clean_email(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(clean_email(raw).as_deref(), expected);
    }

    #[rstest]
    #[case("joespizzanyc.com", Some("https://joespizzanyc.com"))]
    #[case("http://joespizzanyc.com/menu?x=1", Some("http://joespizzanyc.com/menu?x=1"))]
    #[case("localhost:8080", Some("https://localhost:8080"))]
    #[case("http://192.168.0.1/status", Some("http://192.168.0.1/status"))]
    #[case("not a url", None)]
    #[case("ftp://files.example.com", None)]
    fn test_clean_website(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(clean_website(raw).as_deref(), expected);
    }

    #[rstest]
    #[case("4.6 stars", Some("4.6"))]
    #[case("Rated 4", Some("4.0"))]
    #[case("4.26", Some("4.3"))]
    #[case("7.5", None)]
    #[case("no rating", None)]
    fn test_clean_rating(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(clean_rating(raw).as_deref(), expected);
    }

    #[rstest]
    #[case("(12,345)", Some(12_345))]
    #[case("87 reviews", Some(87))]
    #[case("no reviews", None)]
    #[case("4,294,967,295 reviews", Some(u32::MAX))]
    #[case("4,294,967,296 reviews", None)]
    fn test_clean_review_count(#[case] raw: &str, #[case] expected: Option<u32>) {
        assert_eq!(clean_review_count(raw), expected);
    }

    #[test]
    fn test_normalize_keeps_unknown_fields_and_drops_bad_ones() {
        let mut raw = RawListing::new(Source::Maps);
        raw.position = 4;
        raw.insert("name", "Name: Joe's  Pizza");
        raw.insert("phone", "not a phone");
        raw.insert("rating", "4.6");
        raw.insert("maps_url", "https://www.google.com/maps/place/x");

        let normalized = normalize(&raw);
        assert_eq!(normalized.position, 4);
        assert_eq!(normalized.name.as_deref(), Some("Joe's Pizza"));
        assert_eq!(normalized.phone, None);
        assert_eq!(normalized.rating.as_deref(), Some("4.6"));
        assert_eq!(
            normalized.attributes.get("maps_url"),
            Some(&Value::String("https://www.google.com/maps/place/x".into()))
        );
        assert!(!normalized.attributes.contains_key("phone"));
    }

    proptest! {
        #[test]
        fn prop_clean_phone_is_idempotent(
            area in "[2-9][0-9]{2}",
            exchange in "[2-9][0-9]{2}",
            line in "[0-9]{4}",
            style in 0usize..4,
        ) {
            let raw = match style {
                0 => format!("({area}) {exchange}-{line}"),
                1 => format!("{area}.{exchange}.{line}"),
                2 => format!("+1 {area} {exchange} {line}"),
                _ => format!("1-{area}-{exchange}-{line}"),
            };

            // Unassigned area codes are dropped; anything kept is canonical
            if let Some(e164) = clean_phone(&raw) {
                prop_assert_eq!(&e164, &format!("+1{area}{exchange}{line}"));
                prop_assert_eq!(clean_phone(&e164), Some(e164.clone()));
            }
        }

        #[test]
        fn prop_clean_phone_is_idempotent_for_any_text(raw in "\\PC{0,40}") {
            let once = clean_phone(&raw);
            let twice = once.as_deref().and_then(clean_phone);
            prop_assert_eq!(twice, once);
        }

        #[test]
        fn prop_clean_phone_is_idempotent_for_phone_like_text(raw in "[0-9+()\\-. a-z]{0,25}") {
            let once = clean_phone(&raw);
            let twice = once.as_deref().and_then(clean_phone);
            prop_assert_eq!(twice, once);
        }
    }
}
