//! Column pruning.

mod common;

use common::{run, step, steps};

#[test]
fn test_scan_keeps_read_columns() {
    let plan = r#"  project:
    exprs: ["a", "b"]
    input: { scan: { table: t } }
"#;
    let out = run(plan, &["column_prune"]);
    assert_eq!(
        steps(&out, "column_prune"),
        vec![step(
            "DataSource_1's columns[test.t.c,test.t.d,test.t.e,test.t.f,test.t.g,test.t.h] have been pruned",
            "",
        )]
    );
    assert_eq!(out.plan.children[0].schema.len(), 2);
}

#[test]
fn test_join_keys_survive() {
    let plan = r#"  project:
    exprs: ["t1.a"]
    input:
      join:
        left: { scan: { table: t, alias: t1 } }
        right: { scan: { table: t, alias: t2 } }
        on: ["t1.b = t2.b"]
"#;
    let out = run(plan, &["column_prune"]);
    assert_eq!(
        steps(&out, "column_prune"),
        vec![
            step(
                "DataSource_1's columns[test.t.c,test.t.d,test.t.e,test.t.f,test.t.g,test.t.h] have been pruned",
                "",
            ),
            step(
                "DataSource_2's columns[test.t.a,test.t.c,test.t.d,test.t.e,test.t.f,test.t.g,test.t.h] have been pruned",
                "",
            ),
        ]
    );
    assert_eq!(out.plan.children[0].schema.len(), 3);
}

#[test]
fn test_unused_aggregate_dropped() {
    let plan = r#"  project:
    exprs: ["s"]
    input:
      aggregate:
        group_by: ["a"]
        funcs: ["sum(b) as s", "max(c) as m"]
        input: { scan: { table: t } }
"#;
    let out = run(plan, &["column_prune"]);
    assert_eq!(
        steps(&out, "column_prune"),
        vec![
            step("Aggregation_2's columns[Column#10] have been pruned", ""),
            step(
                "DataSource_1's columns[test.t.c,test.t.d,test.t.e,test.t.f,test.t.g,test.t.h] have been pruned",
                "",
            ),
        ]
    );
}

#[test]
fn test_union_positions_pruned_through_projections() {
    let plan = r#"  project:
    exprs: ["a"]
    input:
      union:
        inputs:
          - project:
              exprs: ["a", "b"]
              input: { scan: { table: t } }
          - project:
              exprs: ["c", "d"]
              input: { scan: { table: t } }
"#;
    let out = run(plan, &["column_prune"]);
    assert_eq!(
        steps(&out, "column_prune"),
        vec![
            step("Projection_2's columns[test.t.b] have been pruned", ""),
            step(
                "DataSource_1's columns[test.t.b,test.t.c,test.t.d,test.t.e,test.t.f,test.t.g,test.t.h] have been pruned",
                "",
            ),
            step("Projection_4's columns[test.t.d] have been pruned", ""),
            step(
                "DataSource_3's columns[test.t.a,test.t.b,test.t.d,test.t.e,test.t.f,test.t.g,test.t.h] have been pruned",
                "",
            ),
        ]
    );
    assert_eq!(out.plan.children[0].schema.len(), 1);
}

#[test]
fn test_scan_with_nothing_read_keeps_handle() {
    let plan = r#"  project:
    exprs: ["1 as one"]
    input: { scan: { table: t } }
"#;
    let out = run(plan, &["column_prune"]);
    let scan = &out.plan.children[0];
    assert_eq!(scan.schema.len(), 1);
    assert_eq!(scan.schema.columns[0].name, "test.t.a");
}
