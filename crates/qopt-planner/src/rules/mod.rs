//! The rule registry.
//!
//! Rules run in the fixed order of [`registry`]; a [`RuleFlags`] set selects
//! which of them run. Each rule takes ownership of the tree and returns the
//! rewritten one.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use qopt_core::error::{Error, Result};
use qopt_core::plan::LogicalPlan;

use crate::optimizer::RuleContext;

pub mod aggregation_elimination;
pub mod aggregation_push_down;
pub mod build_key_info;
pub mod column_pruning;
pub mod join_reorder;
pub mod max_min_elimination;
pub mod outer_join_elimination;
pub mod partition_processor;
pub mod predicate_push_down;
pub mod projection_elimination;
pub mod topn_push_down;

pub use aggregation_elimination::AggregationEliminator;
pub use aggregation_push_down::AggregationPushDown;
pub use build_key_info::BuildKeyInfo;
pub use column_pruning::ColumnPruner;
pub use join_reorder::JoinReorder;
pub use max_min_elimination::MaxMinEliminator;
pub use outer_join_elimination::OuterJoinEliminator;
pub use partition_processor::PartitionProcessor;
pub use predicate_push_down::PredicatePushDown;
pub use projection_elimination::ProjectionEliminator;
pub use topn_push_down::TopNPushDown;

/// A logical rewrite.
pub trait LogicalRule: Send + Sync {
    /// Name recorded in trace entries.
    fn name(&self) -> &'static str;

    fn optimize(&self, plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan>;
}

/// Set of enabled rules, one bit per registry entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleFlags(pub u64);

impl RuleFlags {
    pub const PRUNE_COLUMNS: RuleFlags = RuleFlags(1 << 0);
    pub const BUILD_KEY_INFO: RuleFlags = RuleFlags(1 << 1);
    pub const ELIMINATE_AGG: RuleFlags = RuleFlags(1 << 2);
    pub const ELIMINATE_PROJECTION: RuleFlags = RuleFlags(1 << 3);
    pub const MAX_MIN_ELIMINATE: RuleFlags = RuleFlags(1 << 4);
    pub const PREDICATE_PUSH_DOWN: RuleFlags = RuleFlags(1 << 5);
    pub const ELIMINATE_OUTER_JOIN: RuleFlags = RuleFlags(1 << 6);
    pub const PARTITION_PROCESSOR: RuleFlags = RuleFlags(1 << 7);
    pub const PUSH_DOWN_AGG: RuleFlags = RuleFlags(1 << 8);
    pub const PUSH_DOWN_TOPN: RuleFlags = RuleFlags(1 << 9);
    pub const JOIN_REORDER: RuleFlags = RuleFlags(1 << 10);
    pub const PRUNE_COLUMNS_AGAIN: RuleFlags = RuleFlags(1 << 11);

    pub const fn empty() -> Self {
        RuleFlags(0)
    }

    pub fn all() -> Self {
        registry().iter().fold(RuleFlags::empty(), |acc, e| acc | e.flag)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: RuleFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Build a flag set from registry keys, e.g. `["column_prune", "topn_push_down"]`.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut flags = RuleFlags::empty();
        for name in names {
            let name = name.as_ref().trim();
            let entry = registry()
                .iter()
                .find(|e| e.key == name)
                .ok_or_else(|| Error::Config(format!("unknown rule {}", name)))?;
            flags |= entry.flag;
        }
        Ok(flags)
    }
}

impl BitOr for RuleFlags {
    type Output = RuleFlags;

    fn bitor(self, rhs: RuleFlags) -> RuleFlags {
        RuleFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for RuleFlags {
    fn bitor_assign(&mut self, rhs: RuleFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for RuleFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = registry()
            .iter()
            .filter(|e| self.contains(e.flag))
            .map(|e| e.key)
            .collect();
        write!(f, "[{}]", keys.join(","))
    }
}

pub struct RuleEntry {
    pub flag: RuleFlags,
    /// Unique key used to select the entry by name.
    pub key: &'static str,
    pub rule: &'static dyn LogicalRule,
}

static REGISTRY: [RuleEntry; 12] = [
    RuleEntry {
        flag: RuleFlags::PRUNE_COLUMNS,
        key: "column_prune",
        rule: &ColumnPruner,
    },
    RuleEntry {
        flag: RuleFlags::BUILD_KEY_INFO,
        key: "build_keys",
        rule: &BuildKeyInfo,
    },
    RuleEntry {
        flag: RuleFlags::ELIMINATE_AGG,
        key: "aggregation_eliminate",
        rule: &AggregationEliminator,
    },
    RuleEntry {
        flag: RuleFlags::ELIMINATE_PROJECTION,
        key: "projection_eliminate",
        rule: &ProjectionEliminator,
    },
    RuleEntry {
        flag: RuleFlags::MAX_MIN_ELIMINATE,
        key: "max_min_eliminate",
        rule: &MaxMinEliminator,
    },
    RuleEntry {
        flag: RuleFlags::PREDICATE_PUSH_DOWN,
        key: "predicate_push_down",
        rule: &PredicatePushDown,
    },
    RuleEntry {
        flag: RuleFlags::ELIMINATE_OUTER_JOIN,
        key: "outer_join_eliminate",
        rule: &OuterJoinEliminator,
    },
    RuleEntry {
        flag: RuleFlags::PARTITION_PROCESSOR,
        key: "partition_processor",
        rule: &PartitionProcessor,
    },
    RuleEntry {
        flag: RuleFlags::PUSH_DOWN_AGG,
        key: "aggregation_push_down",
        rule: &AggregationPushDown,
    },
    RuleEntry {
        flag: RuleFlags::PUSH_DOWN_TOPN,
        key: "topn_push_down",
        rule: &TopNPushDown,
    },
    RuleEntry {
        flag: RuleFlags::JOIN_REORDER,
        key: "join_reorder",
        rule: &JoinReorder,
    },
    RuleEntry {
        flag: RuleFlags::PRUNE_COLUMNS_AGAIN,
        key: "column_prune_again",
        rule: &ColumnPruner,
    },
];

/// Every rule, in run order.
pub fn registry() -> &'static [RuleEntry] {
    &REGISTRY
}
