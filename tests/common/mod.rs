// Shared fixtures for the integration tests.
#![allow(dead_code)]

use qopt_core::plan::LogicalPlan;
use qopt_planner::dsl::{build_plan, BuiltPlan};
use qopt_planner::{optimize, Optimized, RuleFlags, TraceStep};

/// Catalog shared by every fixture plan.
///
/// `t.a` is a non-null primary key, `t.b` a nullable unique column, `(c, d)` a
/// composite unique index, `e` carries a plain index. `pt1`..`pt3` are range,
/// hash and list partitioned on `ptn`.
pub const TABLES: &str = r#"
tables:
  - name: t
    columns:
      - { name: a, type: Int64, nullable: false }
      - { name: b, type: Int64 }
      - { name: c, type: Int64 }
      - { name: d, type: Int64 }
      - { name: e, type: Int64 }
      - { name: f, type: Int64, nullable: false }
      - { name: g, type: Int64 }
      - { name: h, type: Int64 }
    primary_key: a
    indexes:
      - { name: b, columns: [b], unique: true }
      - { name: c_d, columns: [c, d], unique: true }
      - { name: e, columns: [e] }
  - name: pt1
    columns:
      - { name: id, type: Int64 }
      - { name: ptn, type: Int64 }
    partition:
      type: range
      column: ptn
      partitions:
        - { name: p1, less_than: 16 }
        - { name: p2, less_than: 32 }
  - name: pt2
    columns:
      - { name: id, type: Int64 }
      - { name: ptn, type: Int64 }
    partition:
      type: hash
      column: ptn
      partitions:
        - { name: p1 }
        - { name: p2 }
  - name: pt3
    columns:
      - { name: id, type: Int64 }
      - { name: ptn, type: Int64 }
    partition:
      type: list
      column: ptn
      partitions:
        - { name: p1, values: [1, 2, 3, 4] }
        - { name: p2, values: [5, 6, 7, 8] }
        - { name: p3, values: [null] }
"#;

/// Build `plan` (a YAML mapping indented under `plan:`) against [`TABLES`].
pub fn build(plan: &str) -> BuiltPlan {
    let src = format!("{}plan:\n{}", TABLES, plan);
    build_plan(&src).expect("fixture plan should build")
}

pub fn flags(names: &[&str]) -> RuleFlags {
    RuleFlags::from_names(names).expect("known rule names")
}

/// Build and optimize with tracing on.
pub fn run(plan: &str, rules: &[&str]) -> Optimized {
    let mut built = build(plan);
    optimize(&mut built.ctx, flags(rules), built.plan, true).expect("optimize")
}

/// Steps recorded under `rule_name`, as `(action, reason)` pairs.
pub fn steps(optimized: &Optimized, rule_name: &str) -> Vec<(String, String)> {
    optimized
        .trace
        .as_ref()
        .expect("trace enabled")
        .rule(rule_name)
        .map(|r| r.steps.iter().map(|s: &TraceStep| (s.action.clone(), s.reason.clone())).collect())
        .unwrap_or_default()
}

pub fn step(action: &str, reason: &str) -> (String, String) {
    (action.to_string(), reason.to_string())
}

/// Display ids of the plan, preorder.
pub fn node_ids(plan: &LogicalPlan) -> Vec<String> {
    let mut out = vec![plan.display_id()];
    for child in &plan.children {
        out.extend(node_ids(child));
    }
    out
}
