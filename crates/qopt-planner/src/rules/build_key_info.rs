//! Unique-key derivation.
//!
//! A bottom-up pass annotating every node with the column sets that identify
//! its output rows. Internal bookkeeping only: it never records trace steps.

use std::collections::HashSet;

use qopt_core::error::Result;
use qopt_core::keys::KeyInfo;
use qopt_core::plan::{JoinType, LogicalPlan, Operator};
use qopt_core::schema::ColumnId;

use crate::optimizer::RuleContext;
use crate::rules::LogicalRule;

pub struct BuildKeyInfo;

impl LogicalRule for BuildKeyInfo {
    fn name(&self) -> &'static str {
        "build_keys"
    }

    fn optimize(&self, plan: LogicalPlan, _ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
        Ok(build(plan))
    }
}

fn build(plan: LogicalPlan) -> LogicalPlan {
    let mut plan = plan;
    let children = std::mem::take(&mut plan.children);
    plan.children = children.into_iter().map(build).collect();
    plan.key_info = Some(derive_key_info(&plan));
    plan
}

/// Key info of `plan` from its own payload and its children's annotations.
pub fn derive_key_info(plan: &LogicalPlan) -> KeyInfo {
    let child_keys = |i: usize| -> KeyInfo {
        plan.children
            .get(i)
            .and_then(|c| c.key_info.clone())
            .unwrap_or_default()
    };
    let mut info = KeyInfo::empty();
    match &plan.op {
        Operator::DataSource(ds) => {
            for offsets in ds.table.unique_key_offsets() {
                let cols: Option<Vec<_>> = offsets.iter().map(|o| ds.table_columns.get(*o)).collect();
                let Some(cols) = cols else { continue };
                if !cols.iter().all(|c| plan.schema.contains(c.id)) {
                    continue;
                }
                let key: Vec<ColumnId> = cols.iter().map(|c| c.id).collect();
                if cols.iter().all(|c| !c.nullable) {
                    info.add_key(key);
                } else {
                    info.add_unique_key(key);
                }
            }
        }
        Operator::Selection(_) | Operator::Sort(_) | Operator::PartitionUnion => {
            info = child_keys(0);
        }
        Operator::Limit(_) | Operator::TopN(_) => {
            info = child_keys(0);
            // At most one row: every output column identifies it.
            if plan.max_one_row() {
                for col in &plan.schema.columns {
                    if col.nullable {
                        info.add_unique_key(vec![col.id]);
                    } else {
                        info.add_key(vec![col.id]);
                    }
                }
            }
        }
        Operator::Projection(_) => {
            info = child_keys(0);
            info.retain_in(&plan.schema);
        }
        Operator::Aggregation(agg) => {
            // firstrow outputs keep their input column id, so surviving child
            // keys are still unique across groups.
            info = child_keys(0);
            info.retain_in(&plan.schema);
            let group_cols = agg.group_by_columns();
            if !group_cols.is_empty()
                && group_cols.len() == agg.group_by.len()
                && group_cols.iter().all(|c| plan.schema.contains(c.id))
            {
                info.add_key(group_cols.iter().map(|c| c.id).collect());
            }
        }
        Operator::Join(join) => {
            if join.eq_conds.is_empty() {
                return info;
            }
            let left = child_keys(0);
            let right = child_keys(1);
            let left_join_cols: HashSet<ColumnId> = join.eq_conds.iter().map(|(l, _)| l.id).collect();
            let right_join_cols: HashSet<ColumnId> = join.eq_conds.iter().map(|(_, r)| r.id).collect();
            // Each right row matches at most one left row: right keys survive.
            if left.covering_any_key(&left_join_cols).is_some() && join.join_type != JoinType::LeftOuter {
                info.extend(&right);
            }
            if right.covering_any_key(&right_join_cols).is_some() && join.join_type != JoinType::RightOuter {
                info.extend(&left);
            }
        }
        Operator::Union | Operator::TableDual(_) => {}
    }
    info
}

/// Recompute the annotation of a node a rule has just rebuilt, if key info
/// has been derived for this tree.
pub(crate) fn refresh_key_info(plan: &mut LogicalPlan) {
    let annotated = plan.key_info.is_some() || plan.children.iter().any(|c| c.key_info.is_some());
    if annotated {
        plan.key_info = Some(derive_key_info(plan));
    }
}
