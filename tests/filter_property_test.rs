//! Property tests for filter canonicalization: permuting array-valued
//! fields must never change the canonical form or the cache key.

use medequip_api::filters::{sanitize, TransferFilter};
use proptest::prelude::*;
use uuid::Uuid;

const STATUS_VALUES: &[&str] = &[
    "pending_approval",
    "approved",
    "in_transfer",
    "handed_over",
    "completed",
    "cancelled", // unrecognized on purpose
    "",
];

const TYPE_VALUES: &[&str] = &["internal", "external", "disposal", "loan"];

fn permutations<T: Clone>(values: &[T]) -> Vec<Vec<T>> {
    let mut out = Vec::new();
    let reversed: Vec<T> = values.iter().rev().cloned().collect();
    out.push(reversed);
    for rotation in 1..values.len().max(1) {
        let mut rotated = values.to_vec();
        rotated.rotate_left(rotation);
        out.push(rotated);
    }
    out
}

proptest! {
    #[test]
    fn status_and_type_order_is_irrelevant(
        statuses in prop::collection::vec(prop::sample::select(STATUS_VALUES), 0..8),
        types in prop::collection::vec(prop::sample::select(TYPE_VALUES), 0..6),
        facility_id in prop::option::of(1i64..100),
        page in prop::option::of(1u64..50),
    ) {
        let statuses: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        let types: Vec<String> = types.iter().map(|s| s.to_string()).collect();
        let base = TransferFilter {
            statuses: statuses.clone(),
            types: types.clone(),
            facility_id,
            page,
            ..TransferFilter::default()
        };
        let canonical = sanitize(&base);

        for permuted_statuses in permutations(&statuses) {
            for permuted_types in permutations(&types) {
                let permuted = TransferFilter {
                    statuses: permuted_statuses.clone(),
                    types: permuted_types,
                    facility_id,
                    page,
                    ..TransferFilter::default()
                };
                let other = sanitize(&permuted);
                prop_assert_eq!(&canonical, &other);
                prop_assert_eq!(canonical.cache_key(), other.cache_key());
            }
        }

        // The canonical arrays are sorted and deduplicated.
        let mut sorted = canonical.statuses.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(&canonical.statuses, &sorted);
    }

    #[test]
    fn assignee_order_is_irrelevant(
        seeds in prop::collection::vec(0u128..1_000_000, 0..6),
    ) {
        let assignee_ids: Vec<Uuid> = seeds.iter().map(|s| Uuid::from_u128(*s)).collect();
        let base = TransferFilter {
            assignee_ids: assignee_ids.clone(),
            ..TransferFilter::default()
        };
        let canonical = sanitize(&base);

        for permuted in permutations(&assignee_ids) {
            let other = sanitize(&TransferFilter {
                assignee_ids: permuted,
                ..TransferFilter::default()
            });
            prop_assert_eq!(&canonical, &other);
            prop_assert_eq!(canonical.cache_key(), other.cache_key());
        }
    }

    #[test]
    fn sanitizing_a_canonical_rendering_is_a_fixed_point(
        statuses in prop::collection::vec(prop::sample::select(STATUS_VALUES), 0..8),
    ) {
        let raw = TransferFilter {
            statuses: statuses.iter().map(|s| s.to_string()).collect(),
            ..TransferFilter::default()
        };
        let canonical = sanitize(&raw);

        // Render the canonical statuses back to strings and sanitize again.
        let rendered = TransferFilter {
            statuses: canonical.statuses.iter().map(|s| s.to_string()).collect(),
            page: Some(canonical.page),
            page_size: Some(canonical.page_size),
            ..TransferFilter::default()
        };
        prop_assert_eq!(sanitize(&rendered), canonical);
    }
}
