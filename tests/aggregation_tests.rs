//! Aggregation elimination and push-down.

mod common;

use common::{node_ids, run, step, steps};
use qopt_core::plan::{AggMode, Operator};

#[test]
fn test_min_distinct_on_key_is_projection() {
    let plan = r#"  project:
    exprs: ["m"]
    input:
      aggregate:
        group_by: ["a"]
        funcs: ["min(distinct a) as m"]
        input: { scan: { table: t } }
"#;
    let out = run(plan, &["build_keys", "aggregation_eliminate"]);
    assert_eq!(
        steps(&out, "aggregation_eliminate"),
        vec![
            step("min(distinct ...) is simplified to min(...)", "[test.t.a] is a unique key"),
            step("Aggregation_2 is simplified to a Projection_4", "[test.t.a] is a unique key"),
        ]
    );
    assert_eq!(node_ids(&out.plan), vec!["Projection_3", "Projection_4", "DataSource_1"]);
}

#[test]
fn test_count_on_key_group_checks_nulls() {
    let plan = r#"  aggregate:
    group_by: ["a"]
    funcs: ["count(b) as n", "count(a) as m"]
    input: { scan: { table: t } }
"#;
    let out = run(plan, &["build_keys", "aggregation_eliminate"]);
    let Operator::Projection(proj) = &out.plan.op else {
        panic!("expected projection, got {:?}", out.plan.op);
    };
    assert_eq!(proj.exprs[0].to_string(), "if(isnull(test.t.b), 0, 1)");
    assert_eq!(proj.exprs[1].to_string(), "1");
}

#[test]
fn test_distinct_dropped_on_nullable_unique_column() {
    let plan = r#"  aggregate:
    group_by: ["c"]
    funcs: ["count(distinct b) as n"]
    input: { scan: { table: t } }
"#;
    let out = run(plan, &["build_keys", "aggregation_eliminate"]);
    assert_eq!(
        steps(&out, "aggregation_eliminate"),
        vec![step("count(distinct ...) is simplified to count(...)", "[test.t.b] is a unique key")]
    );
    assert!(matches!(out.plan.op, Operator::Aggregation(_)));
}

#[test]
fn test_group_by_nullable_unique_column_kept() {
    let plan = r#"  aggregate:
    group_by: ["b"]
    funcs: ["sum(a) as s"]
    input: { scan: { table: t } }
"#;
    let out = run(plan, &["build_keys", "aggregation_eliminate"]);
    assert!(steps(&out, "aggregation_eliminate").is_empty());
    assert!(matches!(out.plan.op, Operator::Aggregation(_)));
}

#[test]
fn test_count_star_pushed_across_join() {
    let plan = r#"  project:
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
"#;
    let out = run(plan, &["column_prune", "build_keys", "aggregation_push_down"]);
    assert_eq!(
        steps(&out, "aggregation_push_down"),
        vec![step(
            "Aggregation_6 pushed down across Join_5, and Join_5 right path becomes Aggregation_8",
            "Aggregation_6's functions[count(Column#26)] are decomposable with join",
        )]
    );
    let agg = &out.plan.children[0];
    let Operator::Aggregation(final_agg) = &agg.op else {
        panic!("expected aggregation, got {:?}", agg.op);
    };
    assert_eq!(final_agg.agg_funcs[0].mode, AggMode::Final);
    let partial = &agg.children[0].children[1];
    let Operator::Aggregation(partial_agg) = &partial.op else {
        panic!("expected partial aggregation, got {:?}", partial.op);
    };
    assert_eq!(partial_agg.agg_funcs[0].mode, AggMode::Partial);
}

#[test]
fn test_sum_pushed_across_union() {
    let plan = r#"  project:
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
"#;
    let out = run(plan, &["column_prune", "build_keys", "aggregation_push_down"]);
    assert_eq!(
        steps(&out, "aggregation_push_down"),
        vec![
            step(
                "Aggregation_6 pushed down, and Union_5's children changed into[Aggregation_8,Aggregation_9]",
                "Aggregation_6 functions[sum(Column#21)] are decomposable with Union_5",
            ),
            step(
                "Projection_2 is eliminated, and Aggregation_8's functions changed into[sum(test.t.b)]",
                "Projection_2 is directly below an Aggregation_8 and has no side effects",
            ),
            step(
                "Projection_4 is eliminated, and Aggregation_9's functions changed into[sum(test.t.c)]",
                "Projection_4 is directly below an Aggregation_9 and has no side effects",
            ),
        ]
    );
    assert_eq!(
        node_ids(&out.plan),
        vec![
            "Projection_7",
            "Aggregation_6",
            "Union_5",
            "Aggregation_8",
            "DataSource_1",
            "Aggregation_9",
            "DataSource_3",
        ]
    );
}

#[test]
fn test_projection_folded_into_aggregation() {
    let plan = r#"  aggregate:
    funcs: ["sum(x) as s"]
    input:
      project:
        exprs: ["b + 1 as x"]
        input: { scan: { table: t } }
"#;
    let out = run(plan, &["aggregation_push_down"]);
    assert_eq!(
        steps(&out, "aggregation_push_down"),
        vec![step(
            "Projection_2 is eliminated, and Aggregation_3's functions changed into[sum(plus(test.t.b, 1))]",
            "Projection_2 is directly below an Aggregation_3 and has no side effects",
        )]
    );
    assert_eq!(node_ids(&out.plan), vec!["Aggregation_3", "DataSource_1"]);
}

#[test]
fn test_outer_join_blocks_push_down() {
    let plan = r#"  aggregate:
    funcs: ["count(*) as n"]
    input:
      join:
        type: left
        left: { scan: { table: t, alias: t1 } }
        right: { scan: { table: t, alias: t2 } }
        on: ["t1.a = t2.a"]
"#;
    let out = run(plan, &["build_keys", "aggregation_push_down"]);
    assert!(steps(&out, "aggregation_push_down").is_empty());
}
