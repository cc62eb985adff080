//! Entity resolution hot path: similarity scoring and field normalization

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use bizscout_lib::application::normalizer::{clean_phone, normalize};
use bizscout_lib::application::similarity::indel_ratio;
use bizscout_lib::domain::{RawListing, Source};

const NAMES: &[(&str, &str)] = &[
    ("Joe's Pizza", "Joes Pizza"),
    ("Prince Street Pizza", "Prince St. Pizza Co"),
    ("Acme Plumbing & Heating of Central Texas", "ACME Plumbing and Heating - Central TX"),
];

fn bench_indel_ratio(c: &mut Criterion) {
    c.bench_function("indel_ratio_names", |b| {
        b.iter(|| {
            for (a, other) in NAMES {
                black_box(indel_ratio(black_box(a), black_box(other)));
            }
        });
    });

    let address = "575 Henry St, Brooklyn, NY 11231, United States";
    let variant = "575 Henry Street, Brooklyn NY 11231";
    c.bench_function("indel_ratio_address", |b| {
        b.iter(|| black_box(indel_ratio(black_box(address), black_box(variant))));
    });
}

fn bench_normalize(c: &mut Criterion) {
    let mut listing = RawListing::new(Source::Maps);
    listing.insert("name", "Business Name:  Joe's   Pizza");
    listing.insert("address", "Address: 7 Carmine St, New York, NY 10014");
    listing.insert("phone", "(212) 366-1182");
    listing.insert("website", "joespizzanyc.com");
    listing.insert("rating", "4.6 stars");
    listing.insert("review_count", "(12,345)");

    c.bench_function("normalize_listing", |b| b.iter(|| black_box(normalize(black_box(&listing)))));
    c.bench_function("clean_phone", |b| b.iter(|| black_box(clean_phone(black_box("212.366.1182")))));
}

criterion_group!(benches, bench_indel_ratio, bench_normalize);
criterion_main!(benches);
