// Property-based tests for key reconciliation, attribute diff and ranking.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::{BTreeMap, BTreeSet};

use geodiff_recon::attributes::diff_attributes;
use geodiff_recon::ranking::{ranking_for, score, NO_BASELINE};
use geodiff_recon::reconcile::reconcile;
use geodiff_recon::{FieldType, TabularSnapshot, Value};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// (key, label) rows. Small key space so duplicates and overlaps are common.
fn arb_rows() -> impl Strategy<Value = Vec<(u8, Option<String>)>> {
    proptest::collection::vec((0u8..20, proptest::option::of("[a-c]{0,2}")), 0..30)
}

fn build(name: &str, rows: &[(u8, Option<String>)]) -> TabularSnapshot {
    let mut b = TabularSnapshot::builder(name, "KEY")
        .field("KEY", FieldType::Number)
        .field("LABEL", FieldType::Text);
    for (key, label) in rows {
        let label = label.as_deref().map_or(Value::Null, Value::text);
        b.push_row(vec![Value::number(f64::from(*key)), label], None).unwrap();
    }
    b.build()
}

/// Keys occurring exactly once.
fn unique_keys(rows: &[(u8, Option<String>)]) -> BTreeSet<Value> {
    let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
    for (k, _) in rows {
        *counts.entry(*k).or_default() += 1;
    }
    counts.into_iter().filter(|(_, n)| *n == 1).map(|(k, _)| Value::number(f64::from(k))).collect()
}

// ---------------------------------------------------------------------------
// Partition
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn partition_is_disjoint_and_covers_both_sides(old in arb_rows(), new in arb_rows()) {
        let p = reconcile(&build("old", &old), &build("new", &new), "KEY").unwrap();

        prop_assert!(p.added.is_disjoint(&p.removed));
        prop_assert!(p.added.is_disjoint(&p.common));
        prop_assert!(p.removed.is_disjoint(&p.common));

        let old_keys = unique_keys(&old);
        let new_keys = unique_keys(&new);
        let union: BTreeSet<Value> = old_keys.union(&new_keys).cloned().collect();
        let covered: BTreeSet<Value> =
            p.added.iter().chain(&p.removed).chain(&p.common).cloned().collect();
        prop_assert_eq!(covered, union);
        let common: BTreeSet<Value> = old_keys.intersection(&new_keys).cloned().collect();
        prop_assert_eq!(&p.common, &common);
    }

    #[test]
    fn dedup_drops_every_row_of_a_repeated_key(rows in arb_rows()) {
        let s = build("s", &rows);
        let p = reconcile(&s, &s, "KEY").unwrap();
        let survivors = unique_keys(&rows).len();
        prop_assert_eq!(p.old_dedup.rows_before, rows.len());
        prop_assert_eq!(p.old_dedup.rows_after, survivors);
        let repeated: usize = p.old_dedup.duplicate_keys.iter().map(|d| d.count).sum();
        prop_assert_eq!(p.old_dedup.dropped(), repeated);
    }

    #[test]
    fn snapshot_against_itself_has_no_changes(rows in arb_rows()) {
        let s = build("s", &rows);
        let p = reconcile(&s, &s, "KEY").unwrap();
        prop_assert!(p.added.is_empty());
        prop_assert!(p.removed.is_empty());

        let diff = diff_attributes(&s, &s, &p, &["LABEL".to_string()], 7).unwrap();
        prop_assert!(diff.ledger.is_empty());
        prop_assert!(diff.modified.is_empty());
    }

    #[test]
    fn attribute_diff_ignores_chunk_size(
        old in arb_rows(),
        new in arb_rows(),
        chunk in 1usize..10,
    ) {
        let (old, new) = (build("old", &old), build("new", &new));
        let p = reconcile(&old, &new, "KEY").unwrap();
        let fields = ["LABEL".to_string()];
        let whole = diff_attributes(&old, &new, &p, &fields, usize::MAX).unwrap();
        let chunked = diff_attributes(&old, &new, &p, &fields, chunk).unwrap();
        prop_assert_eq!(whole.ledger, chunked.ledger);
        prop_assert_eq!(whole.modified, chunked.modified);
    }

    #[test]
    fn modified_keys_are_common_keys(old in arb_rows(), new in arb_rows()) {
        let (old, new) = (build("old", &old), build("new", &new));
        let p = reconcile(&old, &new, "KEY").unwrap();
        let diff = diff_attributes(&old, &new, &p, &["LABEL".to_string()], 3).unwrap();
        for m in &diff.modified {
            prop_assert!(p.common.contains(&m.key));
            prop_assert_eq!(m.edit_count, 1);
        }
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn ranking_sign_follows_direction(old in 0u32..50, new in 0u32..50) {
        let (o, n) = (f64::from(old), f64::from(new));
        let r = ranking_for(o, n);
        if old == 0 && new == 0 {
            prop_assert_eq!(r, 0);
        } else {
            prop_assert!((1..=5).contains(&r.abs()));
            prop_assert_eq!(r < 0, new < old);
        }
    }

    #[test]
    fn score_is_ratio_or_no_baseline(old in 0u32..50, new in 0u32..50) {
        let s = score(f64::from(old), f64::from(new));
        if old == 0 {
            prop_assert_eq!(s, NO_BASELINE);
        } else {
            prop_assert_eq!(s, f64::from(new) / f64::from(old));
        }
    }

    #[test]
    fn ranking_is_pure(old in 0.0f64..1e6, new in 0.0f64..1e6) {
        prop_assert_eq!(ranking_for(old, new), ranking_for(old, new));
    }
}
