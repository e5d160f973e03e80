//! Greedy join reordering and its cost listing.

mod common;

use common::{node_ids, run, step, steps};
use qopt_core::plan::Operator;

const RULES: &[&str] = &[
    "column_prune",
    "build_keys",
    "predicate_push_down",
    "outer_join_eliminate",
    "join_reorder",
];

fn cross(left: &str, right: &str) -> String {
    format!("{{ join: {{ left: {left}, right: {right} }} }}")
}

fn scan(alias: &str) -> String {
    format!("{{ scan: {{ table: t, alias: {alias} }} }}")
}

/// `(((a*b)*c)*d)` as cartesian joins.
fn left_deep(aliases: [&str; 4]) -> String {
    let ab = cross(&scan(aliases[0]), &scan(aliases[1]));
    let abc = cross(&ab, &scan(aliases[2]));
    cross(&abc, &scan(aliases[3]))
}

#[test]
fn test_three_way_equi_join() {
    let plan = r#"  project:
    exprs: ["t1.a", "t2.a", "t3.a"]
    input:
      filter:
        conditions: ["t1.a = t2.a and t3.a = t2.a and t1.a = t3.a"]
        input:
          join:
            left:
              join:
                left: { scan: { table: t, alias: t1 } }
                right: { scan: { table: t, alias: t2 } }
            right: { scan: { table: t, alias: t3 } }
"#;
    let out = run(plan, RULES);
    assert_eq!(
        steps(&out, "join_reorder"),
        vec![step(
            "join order becomes ((t1*t2)*t3) from original ((t1*t2)*t3)",
            "join cost during reorder: [[((t1*t2)*t3), cost:58125],[(t1*t2), cost:32500],[(t1*t3), cost:32500],[t1, cost:10000],[t2, cost:10000],[t3, cost:10000]]",
        )]
    );
    let top = &out.plan.children[0];
    match &top.op {
        Operator::Join(join) => {
            assert!(join.reordered);
            assert_eq!(join.eq_conds.len(), 2);
        }
        other => panic!("expected join, got {:?}", other),
    }
}

#[test]
fn test_cartesian_groups_become_bushy() {
    let plan = format!(
        "  union:\n    inputs:\n      - {}\n      - {}\n",
        left_deep(["t1", "t2", "t3", "t4"]),
        left_deep(["t5", "t6", "t7", "t8"])
    );
    let out = run(&plan, RULES);
    assert_eq!(
        steps(&out, "join_reorder"),
        vec![step(
            "join order becomes [((t1*t2)*(t3*t4)),((t5*t6)*(t7*t8))] from original [(((t1*t2)*t3)*t4),(((t5*t6)*t7)*t8)]",
            "join cost during reorder: [[t1, cost:10000],[t2, cost:10000],[t3, cost:10000],[t4, cost:10000],[t5, cost:10000],[t6, cost:10000],[t7, cost:10000],[t8, cost:10000]]",
        )]
    );
}

#[test]
fn test_cheaper_leaf_starts_the_order() {
    let plan = r#"  project:
    exprs: ["t1.a", "t2.a"]
    input:
      join:
        left: { scan: { table: t, alias: t1 } }
        right:
          filter:
            conditions: ["t2.b = 1"]
            input: { scan: { table: t, alias: t2 } }
        on: ["t1.a = t2.a"]
"#;
    let out = run(plan, RULES);
    let reorder = steps(&out, "join_reorder");
    assert_eq!(reorder.len(), 1);
    assert!(
        reorder[0].0.starts_with("join order becomes (t2*t1) from original (t1*t2)"),
        "{:?}",
        reorder
    );
    // The swapped inputs are restored to the original column order.
    assert_eq!(out.plan.children[0].tp(), "Projection");
}

#[test]
fn test_outer_join_is_a_boundary() {
    let plan = r#"  join:
    type: left
    left: { scan: { table: t, alias: t1 } }
    right: { scan: { table: t, alias: t2 } }
    on: ["t1.a = t2.a"]
"#;
    let out = run(plan, RULES);
    assert!(steps(&out, "join_reorder").is_empty());
    assert_eq!(node_ids(&out.plan), vec!["Join_3", "DataSource_1", "DataSource_2"]);
}

#[test]
fn test_reordered_group_is_not_revisited() {
    let plan = r#"  join:
    left: { scan: { table: t, alias: t1 } }
    right: { scan: { table: t, alias: t2 } }
    on: ["t1.a = t2.a"]
"#;
    let mut built = common::build(plan);
    let flags = common::flags(&["join_reorder"]);
    let first = qopt_planner::optimize(&mut built.ctx, flags, built.plan, true).expect("first pass");
    assert_eq!(steps(&first, "join_reorder").len(), 1);
    let second = qopt_planner::optimize(&mut built.ctx, flags, first.plan, true).expect("second pass");
    assert!(steps(&second, "join_reorder").is_empty());
}
