//! Column statistics tests

use qopt_core::stats::{ColumnStats, SchemaStats};
use qopt_core::types::Scalar;

fn ranged(lo: i64, hi: i64, total: u64, nulls: u64) -> ColumnStats {
    ColumnStats {
        min: Some(Scalar::I64(lo)),
        max: Some(Scalar::I64(hi)),
        null_count: nulls,
        distinct_count: None,
        total_count: total,
    }
}

#[test]
fn test_column_stats_new() {
    let stats = ColumnStats::new();
    assert_eq!(stats.total_count, 0);
    assert_eq!(stats.null_count, 0);
    assert!(stats.min.is_none());
    assert!(stats.max.is_none());
    assert!(stats.distinct_count.is_none());
    assert_eq!(stats, ColumnStats::default());
}

#[test]
fn test_null_counts() {
    let stats = ranged(0, 10, 200, 50);
    assert_eq!(stats.non_null_count(), 150);
    assert!((stats.null_fraction() - 0.25).abs() < 1e-9);
    assert_eq!(ColumnStats::new().null_fraction(), 0.0);
}

#[test]
fn test_equality_selectivity_uses_distinct() {
    let stats = ColumnStats::with_distinct(1000, 50);
    assert!((stats.estimate_equality_selectivity() - 0.02).abs() < 1e-9);

    let unknown = ColumnStats::new();
    assert!((unknown.estimate_equality_selectivity() - 0.01).abs() < 1e-9);
}

#[test]
fn test_all_null_column_matches_nothing() {
    let stats = ColumnStats {
        null_count: 10,
        total_count: 10,
        ..ColumnStats::new()
    };
    assert_eq!(stats.estimate_equality_selectivity(), 0.0);
    assert_eq!(stats.estimate_range_selectivity(Some(&Scalar::I64(1)), None), 0.0);
}

#[test]
fn test_range_selectivity_outside_bounds() {
    let stats = ranged(10, 20, 100, 0);
    assert_eq!(
        stats.estimate_range_selectivity(Some(&Scalar::I64(25)), Some(&Scalar::I64(30))),
        0.0
    );
    assert_eq!(stats.estimate_range_selectivity(Some(&Scalar::I64(21)), None), 0.0);
    assert_eq!(stats.estimate_range_selectivity(None, Some(&Scalar::I64(9))), 0.0);
}

#[test]
fn test_range_selectivity_covering_bounds() {
    let stats = ranged(10, 20, 100, 0);
    assert_eq!(stats.estimate_range_selectivity(Some(&Scalar::I64(5)), None), 1.0);
    assert_eq!(stats.estimate_range_selectivity(None, Some(&Scalar::I64(20))), 1.0);
    assert_eq!(stats.estimate_range_selectivity(None, None), 1.0);
}

#[test]
fn test_range_selectivity_partial() {
    let stats = ranged(10, 20, 100, 0);
    assert_eq!(
        stats.estimate_range_selectivity(Some(&Scalar::I64(12)), Some(&Scalar::I64(15))),
        0.3
    );
    assert_eq!(stats.estimate_range_selectivity(Some(&Scalar::I64(15)), None), 0.5);
    // No bounds recorded.
    assert_eq!(
        ColumnStats::with_distinct(100, 10).estimate_range_selectivity(Some(&Scalar::I64(1)), None),
        0.5
    );
}

#[test]
fn test_schema_stats() {
    let mut schema = SchemaStats::new();
    assert!(schema.get("b").is_none());

    *schema.get_or_create("b".to_string()) = ColumnStats::with_distinct(100, 4);
    schema.get_or_create("c".to_string()).null_count = 3;

    assert_eq!(schema.get("b").and_then(|s| s.distinct_count), Some(4));
    assert_eq!(schema.get("c").map(|s| s.null_count), Some(3));
    let names: Vec<&String> = schema.column_stats.keys().collect();
    assert_eq!(names, vec!["b", "c"]);
}

#[test]
fn test_stats_serialize() {
    let stats = ColumnStats::with_distinct(10, 5);
    let json = serde_json::to_string(&stats).unwrap();
    let back: ColumnStats = serde_json::from_str(&json).unwrap();
    assert_eq!(back, stats);
}
