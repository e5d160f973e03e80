//! Property tests: partition matching against brute force, arbitrary rule
//! subsets producing a valid plan, fixed points and monotone rule firing.

mod common;

use std::collections::{BTreeSet, HashSet};

use proptest::prelude::*;
use qopt_core::catalog::PartitionInfo;
use qopt_planner::rules::partition_processor::{hash_partition, matching_partitions, ValueSet};
use qopt_planner::{optimize, registry, RuleFlags};

/// Strictly increasing range bounds, the last one optionally MAXVALUE.
fn range_bounds() -> impl Strategy<Value = Vec<Option<i64>>> {
    (prop::collection::vec(1i64..20, 1..5), any::<bool>()).prop_map(|(steps, maxvalue)| {
        let mut bound = -30;
        let mut out: Vec<Option<i64>> = steps
            .into_iter()
            .map(|s| {
                bound += s;
                Some(bound)
            })
            .collect();
        if maxvalue {
            out.push(None);
        }
        out
    })
}

fn named<T: Clone>(items: &[T]) -> (Vec<String>, Vec<T>) {
    let names = (0..items.len()).map(|i| format!("p{}", i)).collect();
    (names, items.to_vec())
}

fn range_owner(bounds: &[Option<i64>], v: i64) -> Option<usize> {
    bounds.iter().position(|b| b.map_or(true, |b| v < b))
}

proptest! {
    #[test]
    fn prop_range_matches_brute_force(bounds in range_bounds(), lo in -60i64..60, len in 0i64..40) {
        let hi = lo + len;
        let (names, bounds) = named(&bounds);
        let defs: Vec<(&str, Option<i64>)> = names.iter().map(String::as_str).zip(bounds.iter().copied()).collect();
        let info = PartitionInfo::range("k", &defs);

        let expected: BTreeSet<usize> = (lo..=hi).filter_map(|v| range_owner(&bounds, v)).collect();
        let actual = matching_partitions(&info, &ValueSet::range(lo, hi));
        prop_assert_eq!(actual.iter().copied().collect::<BTreeSet<_>>(), expected);
        prop_assert!(actual.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn prop_hash_matches_brute_force(n in 1usize..6, lo in -40i64..40, len in 0i64..20) {
        let hi = lo + len;
        let names: Vec<String> = (0..n).map(|i| format!("p{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let info = PartitionInfo::hash("k", &refs);

        let expected: BTreeSet<usize> = (lo..=hi).map(|v| hash_partition(v, n)).collect();
        let actual = matching_partitions(&info, &ValueSet::range(lo, hi));
        prop_assert_eq!(actual.into_iter().collect::<BTreeSet<_>>(), expected);
    }

    #[test]
    fn prop_list_matches_brute_force(
        lists in prop::collection::vec(prop::collection::vec(-10i64..10, 1..4), 1..5),
        v in -12i64..12,
    ) {
        let (names, lists) = named(&lists);
        let defs: Vec<(&str, Vec<Option<i64>>)> = names
            .iter()
            .map(String::as_str)
            .zip(lists.iter().map(|l| l.iter().copied().map(Some).collect()))
            .collect();
        let info = PartitionInfo::list("k", &defs);

        let expected: Vec<usize> = (0..lists.len()).filter(|i| lists[*i].contains(&v)).collect();
        prop_assert_eq!(matching_partitions(&info, &ValueSet::point(v)), expected);
    }

    #[test]
    fn prop_hash_partition_in_bounds(v in any::<i64>(), n in 1usize..64) {
        prop_assert!(hash_partition(v, n) < n);
    }
}

const PLAN: &str = r#"  limit:
    count: 5
    input:
      sort:
        by: ["s"]
        input:
          aggregate:
            group_by: ["x.b"]
            funcs: ["sum(y.c) as s", "max(x.a) as m", "firstrow(x.b)"]
            input:
              filter:
                conditions: ["x.e > 2", "y.a in (1, 2, 3)"]
                input:
                  join:
                    type: left
                    left: { scan: { table: t, alias: x } }
                    right:
                      project:
                        exprs: ["a", "c", "c + 1 as c1"]
                        input: { scan: { table: t, alias: y } }
                    on: ["x.a = y.a"]
"#;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_any_rule_subset_yields_valid_plan(mask in 0u64..(1 << 12)) {
        let flags = RuleFlags(mask);
        prop_assert_eq!(registry().iter().filter(|e| flags.contains(e.flag)).count(), mask.count_ones() as usize);
        let mut built = common::build(PLAN);
        let width = built.plan.schema.len();
        let optimized = optimize(&mut built.ctx, flags, built.plan, true).unwrap();
        prop_assert!(optimized.plan.validate().is_ok());
        prop_assert_eq!(optimized.plan.schema.len(), width);
    }
}

/// Plans covering every rewrite family, each optimized to a fixed point.
const FIXED_POINT_PLANS: &[&str] = &[
    PLAN,
    r#"  project:
    exprs: ["mx - mn"]
    input:
      aggregate:
        funcs: ["max(a) as mx", "min(a) as mn"]
        input: { scan: { table: t } }
"#,
    r#"  project:
    exprs: ["m"]
    input:
      aggregate:
        funcs: ["max(e) as m"]
        input: { scan: { table: t } }
"#,
    r#"  limit:
    count: 10
    input:
      sort:
        by: ["t1.a"]
        input:
          project:
            exprs: ["t1.a", "t1.b", "t2.a", "t2.b"]
            input:
              join:
                type: left
                left: { scan: { table: t, alias: t1 } }
                right: { scan: { table: t, alias: t2 } }
                on: ["t1.a = t2.a"]
"#,
    r#"  project:
    exprs: ["n"]
    input:
      aggregate:
        funcs: ["count(*) as n"]
        input:
          join:
            left:
              join:
                left: { scan: { table: t, alias: a } }
                right: { scan: { table: t, alias: b } }
            right: { scan: { table: t, alias: c } }
"#,
    r#"  project:
    exprs: ["s"]
    input:
      aggregate:
        funcs: ["sum(b) as s"]
        input:
          union:
            inputs:
              - project:
                  exprs: ["b"]
                  input: { scan: { table: t } }
              - project:
                  exprs: ["c"]
                  input: { scan: { table: t } }
"#,
    r#"  project:
    exprs: ["id", "ptn"]
    input:
      filter:
        conditions: ["ptn > 3"]
        input: { scan: { table: pt1 } }
"#,
];

fn fired_rules(optimized: &qopt_planner::Optimized) -> HashSet<String> {
    optimized
        .trace
        .as_ref()
        .map(|t| t.rule_names().into_iter().map(str::to_string).collect())
        .unwrap_or_default()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_full_rule_set_reaches_fixed_point(plan in prop::sample::select(FIXED_POINT_PLANS)) {
        let mut built = common::build(plan);
        let first = optimize(&mut built.ctx, RuleFlags::all(), built.plan, true).unwrap();
        prop_assert!(first.trace.as_ref().is_some_and(|t| t.total_steps() > 0));
        let nodes = first.plan.node_count();

        let second = optimize(&mut built.ctx, RuleFlags::all(), first.plan, true).unwrap();
        let trace = second.trace.unwrap();
        prop_assert_eq!(trace.total_steps(), 0, "second pass rewrote:\n{}", trace.render_text());
        prop_assert_eq!(second.plan.node_count(), nodes);
    }

    #[test]
    fn prop_rules_fired_under_subset_fire_under_all(mask in 0u64..(1 << 12)) {
        let mut built = common::build(PLAN);
        let subset = optimize(&mut built.ctx, RuleFlags(mask), built.plan, true).unwrap();

        let mut built = common::build(PLAN);
        let all = optimize(&mut built.ctx, RuleFlags::all(), built.plan, true).unwrap();

        let fired = fired_rules(&subset);
        let fired_all = fired_rules(&all);
        prop_assert!(
            fired.is_subset(&fired_all),
            "{:?} fired under {} but not under every rule",
            fired.difference(&fired_all).collect::<Vec<_>>(),
            RuleFlags(mask)
        );
    }
}
