//! qopt-planner: rule registry, optimizer driver, trace, cost model and the
//! rewrite rules themselves.
//!
//! Entry point is [`optimize`]: it threads one `LogicalPlan` through every rule
//! whose flag is set, in registry order, and optionally collects an
//! [`OptimizeTrace`] describing each rewrite.

pub mod cost;
pub mod dsl;
pub mod optimizer;
pub mod rules;
pub mod trace;

pub use optimizer::{optimize, Optimized, Optimizer, RuleContext};
pub use rules::{registry, LogicalRule, RuleEntry, RuleFlags};
pub use trace::{OptimizeTrace, RuleTrace, TraceStep};
