//! Plan files: YAML documents describing a catalog and an operator tree.

pub mod expr;
pub mod yaml;

pub use yaml::{build_plan, parse_plan_file, BuiltPlan, NodeDef, PlanBuilder, PlanFile, TableDef};
