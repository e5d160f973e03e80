//! TopN push-down: Limit conversion, Sort fusion, outer joins and unions.

mod common;

use common::{node_ids, run, step, steps};
use qopt_core::plan::Operator;

const RULES: &[&str] = &["column_prune", "build_keys", "topn_push_down"];

#[test]
fn test_limit_over_sort_becomes_topn() {
    let plan = r#"  limit:
    count: 10
    input:
      sort:
        by: ["a"]
        input:
          project:
            exprs: ["a", "b", "c", "d", "e", "f", "g", "h"]
            input: { scan: { table: t } }
"#;
    let out = run(plan, RULES);
    assert_eq!(
        steps(&out, "topn_push_down"),
        vec![
            step("Limit_4 is converted into TopN_5", ""),
            step("Sort_3 passes ByItems[test.t.a] to TopN_5", "TopN_5 is Limit originally"),
            step("TopN_5 is added as DataSource_1's parent", "TopN is pushed down"),
        ]
    );
    assert_eq!(node_ids(&out.plan), vec!["Projection_2", "TopN_5", "DataSource_1"]);
}

#[test]
fn test_topn_copied_into_left_outer_join() {
    let plan = r#"  limit:
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
"#;
    let out = run(plan, RULES);
    assert_eq!(
        steps(&out, "topn_push_down"),
        vec![
            step("Limit_6 is converted into TopN_7", ""),
            step("Sort_5 passes ByItems[test.t.a] to TopN_7", "TopN_7 is Limit originally"),
            step(
                "TopN_8 is added and pushed into Join_3's left table",
                "Join_3's joinType is left outer join, and all ByItems[test.t.a] contained in left table",
            ),
            step("TopN_8 is added as DataSource_1's parent", "TopN is pushed down"),
            step("TopN_7 is added as Join_3's parent", "TopN is pushed down"),
        ]
    );
    assert_eq!(
        node_ids(&out.plan),
        vec!["Projection_4", "TopN_7", "Join_3", "TopN_8", "DataSource_1", "DataSource_2"]
    );
    match &out.plan.children[0].children[0].children[0].op {
        Operator::TopN(copy) => {
            assert_eq!(copy.offset, 0);
            assert_eq!(copy.count, 10);
        }
        other => panic!("expected TopN copy, got {:?}", other),
    }
}

#[test]
fn test_copy_bound_includes_offset() {
    let plan = r#"  limit:
    offset: 5
    count: 10
    input:
      sort:
        by: ["t1.a"]
        input:
          join:
            type: left
            left: { scan: { table: t, alias: t1 } }
            right: { scan: { table: t, alias: t2 } }
            on: ["t1.a = t2.a"]
"#;
    let out = run(plan, RULES);
    let join = &out.plan.children[0];
    match (&out.plan.op, &join.children[0].op) {
        (Operator::TopN(top), Operator::TopN(copy)) => {
            assert_eq!((top.offset, top.count), (5, 10));
            assert_eq!((copy.offset, copy.count), (0, 15));
        }
        other => panic!("unexpected shape {:?}", other),
    }
}

#[test]
fn test_no_copy_when_order_uses_inner_side() {
    let plan = r#"  limit:
    count: 10
    input:
      sort:
        by: ["t2.b"]
        input:
          join:
            type: left
            left: { scan: { table: t, alias: t1 } }
            right: { scan: { table: t, alias: t2 } }
            on: ["t1.a = t2.a"]
"#;
    let out = run(plan, RULES);
    let actions: Vec<String> = steps(&out, "topn_push_down").into_iter().map(|s| s.0).collect();
    assert!(actions.iter().all(|a| !a.contains("pushed into")), "{:?}", actions);
    assert_eq!(node_ids(&out.plan), vec!["TopN_6", "Join_3", "DataSource_1", "DataSource_2"]);
}

#[test]
fn test_lone_limit_stays() {
    let plan = r#"  limit:
    count: 3
    input: { scan: { table: t } }
"#;
    let out = run(plan, RULES);
    assert!(steps(&out, "topn_push_down").is_empty());
    assert_eq!(node_ids(&out.plan), vec!["Limit_2", "DataSource_1"]);
}

#[test]
fn test_topn_copied_to_union_inputs() {
    let plan = r#"  limit:
    count: 4
    input:
      union:
        inputs:
          - project:
              exprs: ["a"]
              input: { scan: { table: t } }
          - project:
              exprs: ["b"]
              input: { scan: { table: t } }
"#;
    let out = run(plan, RULES);
    let actions: Vec<String> = steps(&out, "topn_push_down").into_iter().map(|s| s.0).collect();
    assert_eq!(actions[0], "Limit_6 is converted into TopN_7");
    assert_eq!(actions[1], "TopN_8 is added and pushed down across Union_5");
    let copies = actions.iter().filter(|a| a.ends_with("pushed down across Union_5")).count();
    assert_eq!(copies, 2);
    // Without ordering items every materialized node is a Limit.
    assert!(matches!(out.plan.op, Operator::Limit(_)));
    for input in &out.plan.children[0].children {
        assert!(matches!(input.op, Operator::Projection(_)));
        assert!(matches!(input.children[0].op, Operator::Limit(_)));
    }
}
