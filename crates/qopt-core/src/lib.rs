#![forbid(unsafe_code)]
//! qopt-core: shared kernel for the qopt logical optimizer.
//!
//! This crate contains only *pure* data: the operator tree and its payloads,
//! columns and expressions, the catalog snapshot (tables, indexes, partitions,
//! statistics), key info, the per-invocation id allocator, configuration and
//! the error type. There is **no I/O** and **no logging** here.
//!
//! Crates that use this:
//! - qopt-planner: rewrites `LogicalPlan` trees through the rule registry.
//! - qopt-cli: builds plans from YAML and prints optimized trees and traces.

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod expr;
pub mod hash;
pub mod keys;
pub mod plan;
pub mod prelude;
pub mod schema;
pub mod stats;
pub mod types;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
