pub use crate::catalog::{Catalog, PartitionInfo, TableInfo, TableStats};
pub use crate::config::OptimizerConfig;
pub use crate::context::PlanContext;
pub use crate::error::{Error, Result};
pub use crate::expr::{BinOp, Expr, UnaryOp};
pub use crate::keys::KeyInfo;
pub use crate::plan::{
    AggFunc, AggKind, AggMode, ByItem, JoinType, LogicalPlan, Operator, PlanId,
};
pub use crate::schema::{Column, ColumnId, DataType, Schema};
pub use crate::types::Scalar;
