//! Outer join elimination.

mod common;

use common::{node_ids, run, step, steps};

const RULES: &[&str] = &["build_keys", "outer_join_eliminate"];

#[test]
fn test_left_join_on_unique_inner_key() {
    let plan = r#"  project:
    exprs: ["t1.a", "t1.b"]
    input:
      join:
        type: left
        left: { scan: { table: t, alias: t1 } }
        right: { scan: { table: t, alias: t2 } }
        on: ["t1.b = t2.b"]
"#;
    let out = run(plan, RULES);
    assert_eq!(
        steps(&out, "outer_join_eliminate"),
        vec![step(
            "Outer Join_3 is eliminated and become DataSource_1",
            "The columns[test.t.a,test.t.b] are from outer table, and the inner join keys[test.t.b] are unique",
        )]
    );
    assert_eq!(node_ids(&out.plan), vec!["Projection_4", "DataSource_1"]);
}

#[test]
fn test_right_join_on_primary_key() {
    let plan = r#"  project:
    exprs: ["t2.c"]
    input:
      join:
        type: right
        left: { scan: { table: t, alias: t1 } }
        right: { scan: { table: t, alias: t2 } }
        on: ["t1.a = t2.a"]
"#;
    let out = run(plan, RULES);
    assert_eq!(
        steps(&out, "outer_join_eliminate"),
        vec![step(
            "Outer Join_3 is eliminated and become DataSource_2",
            "The columns[test.t.c] are from outer table, and the inner join keys[test.t.a] are unique",
        )]
    );
}

#[test]
fn test_duplicate_agnostic_aggregate() {
    let plan = r#"  aggregate:
    funcs: ["count(distinct t1.b) as n"]
    input:
      join:
        type: left
        left: { scan: { table: t, alias: t1 } }
        right: { scan: { table: t, alias: t2 } }
        on: ["t1.b = t2.e"]
"#;
    let out = run(plan, RULES);
    assert_eq!(
        steps(&out, "outer_join_eliminate"),
        vec![step(
            "Outer Join_3 is eliminated and become DataSource_1",
            "The columns[test.t.b] in agg are from outer table, and the agg functions are duplicate agnostic",
        )]
    );
}

#[test]
fn test_inner_columns_read_above() {
    let plan = r#"  project:
    exprs: ["t1.a", "t2.b"]
    input:
      join:
        type: left
        left: { scan: { table: t, alias: t1 } }
        right: { scan: { table: t, alias: t2 } }
        on: ["t1.b = t2.b"]
"#;
    let out = run(plan, RULES);
    assert!(steps(&out, "outer_join_eliminate").is_empty());
}

#[test]
fn test_non_unique_inner_key_kept() {
    let plan = r#"  project:
    exprs: ["t1.a"]
    input:
      join:
        type: left
        left: { scan: { table: t, alias: t1 } }
        right: { scan: { table: t, alias: t2 } }
        on: ["t1.b = t2.e"]
"#;
    let out = run(plan, RULES);
    assert!(steps(&out, "outer_join_eliminate").is_empty());
}

#[test]
fn test_nested_outer_joins_eliminated_in_turn() {
    let plan = r#"  project:
    exprs: ["t1.a"]
    input:
      join:
        type: left
        left:
          join:
            type: left
            left: { scan: { table: t, alias: t1 } }
            right: { scan: { table: t, alias: t2 } }
            on: ["t1.a = t2.a"]
        right: { scan: { table: t, alias: t3 } }
        on: ["t1.a = t3.a"]
"#;
    let out = run(plan, RULES);
    let actions: Vec<String> = steps(&out, "outer_join_eliminate").into_iter().map(|s| s.0).collect();
    assert_eq!(
        actions,
        vec![
            "Outer Join_5 is eliminated and become Join_3",
            "Outer Join_3 is eliminated and become DataSource_1",
        ]
    );
    assert_eq!(node_ids(&out.plan), vec!["Projection_6", "DataSource_1"]);
}

#[test]
fn test_single_row_inner_side_is_unique() {
    let plan = r#"  project:
    exprs: ["t1.a"]
    input:
      join:
        type: left
        left: { scan: { table: t, alias: t1 } }
        right:
          limit:
            count: 1
            input: { scan: { table: t, alias: t2 } }
        on: ["t1.f = t2.f"]
"#;
    let out = run(plan, RULES);
    assert_eq!(
        steps(&out, "outer_join_eliminate"),
        vec![step(
            "Outer Join_4 is eliminated and become DataSource_1",
            "The columns[test.t.a] are from outer table, and the inner join keys[test.t.f] are unique",
        )]
    );
    assert_eq!(node_ids(&out.plan), vec!["Projection_5", "DataSource_1"]);
}

#[test]
fn test_multi_row_inner_side_is_not_unique() {
    let plan = r#"  project:
    exprs: ["t1.a"]
    input:
      join:
        type: left
        left: { scan: { table: t, alias: t1 } }
        right:
          limit:
            count: 2
            input: { scan: { table: t, alias: t2 } }
        on: ["t1.f = t2.f"]
"#;
    let out = run(plan, RULES);
    assert!(steps(&out, "outer_join_eliminate").is_empty());
}
