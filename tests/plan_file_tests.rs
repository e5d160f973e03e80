//! Plan file parsing and validation tests

mod common;

use qopt_core::prelude::{Error, JoinType, Operator};
use qopt_planner::dsl::{build_plan, parse_plan_file};

#[test]
fn test_parse_simple_plan() {
    let yaml = r#"
tables:
  - name: users
    columns:
      - { name: id, type: Int64, nullable: false }
      - { name: name, type: Utf8 }
    primary_key: id
plan:
  filter:
    conditions: ["id > 10"]
    input: { scan: { table: users } }
"#;
    let file = parse_plan_file(yaml).expect("parses");
    assert_eq!(file.tables.len(), 1);
    assert_eq!(file.tables[0].db, "test");
    assert!(file.tables[0].columns[1].nullable);
    assert!(file.plan.filter.is_some());
}

#[test]
fn test_build_assigns_ids_bottom_up() {
    let built = common::build(
        r#"  project:
    exprs: ["a", "b + 1 as b1"]
    input:
      filter:
        conditions: ["a > 1"]
        input: { scan: { table: t } }
"#,
    );
    assert_eq!(common::node_ids(&built.plan), vec!["Projection_3", "Selection_2", "DataSource_1"]);
    assert_eq!(built.plan.schema.columns[0].name, "test.t.a");
    assert_eq!(built.plan.schema.columns[1].name, "Column#9");
    assert_eq!(
        built.plan.to_string(),
        "Projection_3 [test.t.a,plus(test.t.b, 1)]\n└─Selection_2 [gt(test.t.a, 1)]\n  └─DataSource_1 table:t\n"
    );
}

#[test]
fn test_join_conditions_split_into_keys() {
    let built = common::build(
        r#"  join:
    type: left
    left: { scan: { table: t, alias: t1 } }
    right: { scan: { table: t, alias: t2 } }
    on: ["t1.a = t2.a", "t1.b > t2.b", "t2.c = 1"]
"#,
    );
    let Operator::Join(join) = &built.plan.op else {
        panic!("expected join");
    };
    assert_eq!(join.join_type, JoinType::LeftOuter);
    assert_eq!(join.eq_conds.len(), 1);
    assert_eq!(join.other_conds.len(), 2);
    // Inner side of a left join is nullable.
    assert!(!built.plan.schema.columns[0].nullable);
    assert!(built.plan.schema.columns[8].nullable);
}

#[test]
fn test_parse_plan_with_aggregate() {
    let built = common::build(
        r#"  aggregate:
    group_by: ["c"]
    funcs: ["count(*) as n", "sum(distinct b) as s", "firstrow(c)"]
    input: { scan: { table: t } }
"#,
    );
    let Operator::Aggregation(agg) = &built.plan.op else {
        panic!("expected aggregation");
    };
    assert_eq!(agg.agg_funcs.len(), 3);
    assert_eq!(agg.agg_funcs[0].to_string(), "count(1)");
    assert_eq!(agg.agg_funcs[1].to_string(), "sum(distinct test.t.b)");
    // firstrow of a column keeps that column.
    assert_eq!(built.plan.schema.columns[2].name, "test.t.c");
}

#[test]
fn test_parse_invalid_yaml() {
    let err = parse_plan_file("invalid: yaml: [").unwrap_err();
    assert!(matches!(err, Error::Plan(_)));
}

#[test]
fn test_unknown_field_rejected() {
    let yaml = "plan:\n  scan: { table: t, where: x }\n";
    assert!(parse_plan_file(yaml).is_err());
}

#[test]
fn test_node_needs_exactly_one_operator() {
    let empty = format!("{}plan: {{}}\n", common::TABLES);
    assert!(matches!(build_plan(&empty), Err(Error::Plan(_))));

    let two = format!(
        "{}plan:\n  scan: {{ table: t }}\n  limit: {{ count: 1, input: {{ scan: {{ table: t }} }} }}\n",
        common::TABLES
    );
    assert!(matches!(build_plan(&two), Err(Error::Plan(_))));
}

#[test]
fn test_union_width_mismatch() {
    let yaml = format!(
        r#"{}plan:
  union:
    inputs:
      - project: {{ exprs: ["a"], input: {{ scan: {{ table: t }} }} }}
      - project: {{ exprs: ["a", "b"], input: {{ scan: {{ table: t }} }} }}
"#,
        common::TABLES
    );
    assert!(matches!(build_plan(&yaml), Err(Error::MalformedPlan { .. })));
}

#[test]
fn test_partition_definitions() {
    let yaml = format!("{}plan:\n  scan: {{ table: pt3 }}\n", common::TABLES);
    let built = build_plan(&yaml).expect("builds");
    let table = built.catalog.table("pt3").expect("declared");
    let info = table.partition.as_ref().expect("partitioned");
    assert_eq!(info.names(), vec!["p1", "p2", "p3"]);
}

#[test]
fn test_bad_range_bound_rejected() {
    let yaml = r#"
tables:
  - name: r
    columns: [{ name: k, type: Int64 }]
    partition:
      type: range
      column: k
      partitions: [{ name: p0, less_than: lots }]
plan:
  scan: { table: r }
"#;
    assert!(matches!(build_plan(yaml), Err(Error::Catalog(_))));
}

#[test]
fn test_validated_plan_counts_nodes() {
    let built = common::build(
        r#"  limit:
    count: 5
    input:
      sort:
        by: ["a desc"]
        input: { scan: { table: t } }
"#,
    );
    built.plan.validate().expect("valid");
    assert_eq!(built.plan.node_count(), 3);
}
