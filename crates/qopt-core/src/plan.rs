//! The logical operator tree.
//!
//! A `LogicalPlan` node owns its children exclusively. The operator kind and
//! its payload live in `Operator`; the output schema, display identity and
//! key info are shared by every kind and live on the node itself, so generic
//! traversal never needs to look inside the payload.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::TableInfo;
use crate::context::PlanContext;
use crate::error::{Error, Result};
use crate::expr::{expr_list, Expr};
use crate::keys::KeyInfo;
use crate::schema::{Column, ColumnId, DataType, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlanId(pub u64);

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Aggregate functions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggKind {
    Count,
    Sum,
    Avg,
    Max,
    Min,
    FirstRow,
}

impl AggKind {
    pub fn name(self) -> &'static str {
        match self {
            AggKind::Count => "count",
            AggKind::Sum => "sum",
            AggKind::Avg => "avg",
            AggKind::Max => "max",
            AggKind::Min => "min",
            AggKind::FirstRow => "firstrow",
        }
    }

    pub fn parse(name: &str) -> Option<AggKind> {
        Some(match name.to_ascii_lowercase().as_str() {
            "count" => AggKind::Count,
            "sum" => AggKind::Sum,
            "avg" => AggKind::Avg,
            "max" => AggKind::Max,
            "min" => AggKind::Min,
            "firstrow" => AggKind::FirstRow,
            _ => return None,
        })
    }
}

/// Where a function sits in a two-phase aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggMode {
    Complete,
    /// Produces a partial state below a join or union.
    Partial,
    /// Combines partial states. A final `count` sums partial counts.
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggFunc {
    pub kind: AggKind,
    pub args: Vec<Expr>,
    pub distinct: bool,
    pub mode: AggMode,
}

impl AggFunc {
    pub fn new(kind: AggKind, args: Vec<Expr>) -> Self {
        Self {
            kind,
            args,
            distinct: false,
            mode: AggMode::Complete,
        }
    }

    /// `count(*)`, stored as `count(1)`.
    pub fn count_star() -> Self {
        Self::new(AggKind::Count, vec![Expr::int(1)])
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn with_mode(mut self, mode: AggMode) -> Self {
        self.mode = mode;
        self
    }

    /// Result over a union of row sets equals a combine of per-set results.
    pub fn is_decomposable(&self) -> bool {
        !self.distinct
            && matches!(
                self.kind,
                AggKind::Count | AggKind::Sum | AggKind::Max | AggKind::Min | AggKind::FirstRow
            )
    }

    /// Result does not change when input rows are duplicated.
    pub fn is_duplicate_agnostic(&self) -> bool {
        self.distinct || matches!(self.kind, AggKind::Max | AggKind::Min | AggKind::FirstRow)
    }

    pub fn columns(&self) -> Vec<Column> {
        let mut out: Vec<Column> = Vec::new();
        for arg in &self.args {
            for c in arg.columns() {
                if !out.iter().any(|o| o.id == c.id) {
                    out.push(c);
                }
            }
        }
        out
    }

    pub fn return_type(&self) -> DataType {
        let arg_type = self.args.first().map(Expr::data_type);
        match self.kind {
            AggKind::Count => DataType::Int64,
            AggKind::Avg => DataType::Float64,
            AggKind::Sum => match arg_type {
                Some(t) if t.is_integer() => DataType::Int64,
                Some(DataType::Decimal128) => DataType::Decimal128,
                _ => DataType::Float64,
            },
            AggKind::Max | AggKind::Min | AggKind::FirstRow => arg_type.unwrap_or(DataType::Int64),
        }
    }

    pub fn return_nullable(&self) -> bool {
        match self.kind {
            AggKind::Count => false,
            AggKind::FirstRow => self.args.first().map(Expr::nullable).unwrap_or(true),
            _ => true,
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind.name())?;
        if self.distinct {
            write!(f, "distinct ")?;
        }
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

pub fn agg_func_list<'a>(funcs: impl IntoIterator<Item = &'a AggFunc>) -> String {
    let parts: Vec<String> = funcs.into_iter().map(|f| f.to_string()).collect();
    format!("[{}]", parts.join(","))
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ByItem {
    pub expr: Expr,
    pub desc: bool,
}

impl ByItem {
    pub fn asc(expr: Expr) -> Self {
        Self { expr, desc: false }
    }

    pub fn desc(expr: Expr) -> Self {
        Self { expr, desc: true }
    }
}

impl fmt::Display for ByItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.desc {
            write!(f, "{} desc", self.expr)
        } else {
            write!(f, "{}", self.expr)
        }
    }
}

pub fn by_item_list(items: &[ByItem]) -> String {
    let parts: Vec<String> = items.iter().map(|b| b.to_string()).collect();
    format!("[{}]", parts.join(","))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinType::Inner => "inner join",
            JoinType::LeftOuter => "left outer join",
            JoinType::RightOuter => "right outer join",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub table: Arc<TableInfo>,
    pub alias: Option<String>,
    /// Every column of the table, in table order; the node schema is a subset.
    pub table_columns: Vec<Column>,
    /// Conditions evaluated by the scan itself.
    pub pushed_conds: Vec<Expr>,
    /// Index into the table's partition definitions once pruned to one.
    pub partition: Option<usize>,
}

impl DataSource {
    /// Name used in join order text: the alias, else the table name.
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table.name)
    }

    /// Table column offset of a schema column.
    pub fn table_offset(&self, id: ColumnId) -> Option<usize> {
        self.table_columns.iter().position(|c| c.id == id)
    }

    pub fn partition_name(&self) -> Option<&str> {
        let idx = self.partition?;
        self.table
            .partition
            .as_ref()
            .and_then(|p| p.definitions.get(idx))
            .map(|d| d.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub conditions: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// One expression per output column.
    pub exprs: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub group_by: Vec<Expr>,
    /// One function per output column.
    pub agg_funcs: Vec<AggFunc>,
}

impl Aggregation {
    /// Group-by items that are plain column references.
    pub fn group_by_columns(&self) -> Vec<Column> {
        self.group_by
            .iter()
            .filter_map(|e| e.as_column().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub join_type: JoinType,
    /// `(left column, right column)` equality keys.
    pub eq_conds: Vec<(Column, Column)>,
    pub other_conds: Vec<Expr>,
    /// Produced by join reordering; a group made only of such joins is final.
    pub reordered: bool,
}

impl Join {
    pub fn new(join_type: JoinType) -> Self {
        Self {
            join_type,
            eq_conds: Vec::new(),
            other_conds: Vec::new(),
            reordered: false,
        }
    }

    pub fn eq_exprs(&self) -> Vec<Expr> {
        self.eq_conds
            .iter()
            .map(|(l, r)| Expr::equal(Expr::col(l), Expr::col(r)))
            .collect()
    }

    pub fn left_keys(&self) -> Vec<Column> {
        self.eq_conds.iter().map(|(l, _)| l.clone()).collect()
    }

    pub fn right_keys(&self) -> Vec<Column> {
        self.eq_conds.iter().map(|(_, r)| r.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub by_items: Vec<ByItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    pub offset: u64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopN {
    pub by_items: Vec<ByItem>,
    pub offset: u64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDual {
    pub row_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operator {
    DataSource(DataSource),
    Selection(Selection),
    Projection(Projection),
    Aggregation(Aggregation),
    Join(Join),
    Sort(Sort),
    Limit(Limit),
    TopN(TopN),
    Union,
    PartitionUnion,
    TableDual(TableDual),
}

impl Operator {
    /// Allowed number of children: `(min, max)`.
    fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Operator::DataSource(_) | Operator::TableDual(_) => (0, Some(0)),
            Operator::Join(_) => (2, Some(2)),
            Operator::Union | Operator::PartitionUnion => (1, None),
            _ => (1, Some(1)),
        }
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalPlan {
    pub id: PlanId,
    pub op: Operator,
    pub schema: Schema,
    pub children: Vec<LogicalPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_info: Option<KeyInfo>,
}

impl LogicalPlan {
    pub fn from_parts(id: PlanId, op: Operator, schema: Schema, children: Vec<LogicalPlan>) -> Self {
        Self {
            id,
            op,
            schema,
            children,
            key_info: None,
        }
    }

    pub fn data_source(ctx: &mut PlanContext, table: Arc<TableInfo>, alias: Option<&str>) -> Self {
        let id = ctx.next_plan_id();
        let table_columns: Vec<Column> = table
            .columns
            .iter()
            .map(|c| {
                Column::new(
                    ctx.next_column_id(),
                    table.qualified_name(&c.name),
                    c.data_type.clone(),
                    c.nullable,
                )
            })
            .collect();
        let schema = Schema::new(table_columns.clone());
        let op = Operator::DataSource(DataSource {
            table,
            alias: alias.map(str::to_string),
            table_columns,
            pushed_conds: Vec::new(),
            partition: None,
        });
        Self::from_parts(id, op, schema, Vec::new())
    }

    pub fn selection(ctx: &mut PlanContext, child: LogicalPlan, conditions: Vec<Expr>) -> Self {
        let schema = child.schema.clone();
        Self::from_parts(
            ctx.next_plan_id(),
            Operator::Selection(Selection { conditions }),
            schema,
            vec![child],
        )
    }

    /// Plain column expressions keep their column; anything else gets a fresh
    /// `Column#N` output.
    pub fn projection(ctx: &mut PlanContext, child: LogicalPlan, exprs: Vec<Expr>) -> Self {
        let id = ctx.next_plan_id();
        let columns = exprs
            .iter()
            .map(|e| match e {
                Expr::Column(c) => child
                    .schema
                    .index_of(c.id)
                    .and_then(|i| child.schema.column(i))
                    .cloned()
                    .unwrap_or_else(|| c.clone()),
                other => ctx.derived_column(other.data_type(), other.nullable()),
            })
            .collect();
        Self::from_parts(
            id,
            Operator::Projection(Projection { exprs }),
            Schema::new(columns),
            vec![child],
        )
    }

    /// `firstrow(col)` outputs keep the column; other functions get a fresh
    /// `Column#N` output.
    pub fn aggregation(
        ctx: &mut PlanContext,
        child: LogicalPlan,
        group_by: Vec<Expr>,
        agg_funcs: Vec<AggFunc>,
    ) -> Self {
        let id = ctx.next_plan_id();
        let columns = agg_funcs
            .iter()
            .map(|f| agg_output_column(ctx, f))
            .collect();
        Self::from_parts(
            id,
            Operator::Aggregation(Aggregation {
                group_by,
                agg_funcs,
            }),
            Schema::new(columns),
            vec![child],
        )
    }

    pub fn join(
        ctx: &mut PlanContext,
        join_type: JoinType,
        left: LogicalPlan,
        right: LogicalPlan,
        eq_conds: Vec<(Column, Column)>,
        other_conds: Vec<Expr>,
    ) -> Self {
        let schema = join_schema(join_type, &left.schema, &right.schema);
        let mut join = Join::new(join_type);
        join.eq_conds = eq_conds;
        join.other_conds = other_conds;
        Self::from_parts(ctx.next_plan_id(), Operator::Join(join), schema, vec![left, right])
    }

    pub fn sort(ctx: &mut PlanContext, child: LogicalPlan, by_items: Vec<ByItem>) -> Self {
        let schema = child.schema.clone();
        Self::from_parts(ctx.next_plan_id(), Operator::Sort(Sort { by_items }), schema, vec![child])
    }

    pub fn limit(ctx: &mut PlanContext, child: LogicalPlan, offset: u64, count: u64) -> Self {
        let schema = child.schema.clone();
        Self::from_parts(
            ctx.next_plan_id(),
            Operator::Limit(Limit { offset, count }),
            schema,
            vec![child],
        )
    }

    pub fn top_n(
        ctx: &mut PlanContext,
        child: LogicalPlan,
        by_items: Vec<ByItem>,
        offset: u64,
        count: u64,
    ) -> Self {
        let schema = child.schema.clone();
        Self::from_parts(
            ctx.next_plan_id(),
            Operator::TopN(TopN {
                by_items,
                offset,
                count,
            }),
            schema,
            vec![child],
        )
    }

    /// `UNION ALL`; output columns are fresh and match children by position.
    pub fn union_all(ctx: &mut PlanContext, children: Vec<LogicalPlan>) -> Result<Self> {
        let id = ctx.next_plan_id();
        let first = children
            .first()
            .ok_or_else(|| Error::malformed(format!("Union_{}", id), "union needs at least one input"))?;
        let width = first.schema.len();
        if let Some(child) = children.iter().find(|c| c.schema.len() != width) {
            return Err(Error::malformed(
                format!("Union_{}", id),
                format!("input {} has {} columns, expected {}", child.display_id(), child.schema.len(), width),
            ));
        }
        let mut columns = Vec::with_capacity(width);
        for pos in 0..width {
            let mut nullable = false;
            for child in &children {
                nullable |= child.schema.column(pos).is_some_and(|c| c.nullable);
            }
            let data_type = first.schema.columns[pos].data_type.clone();
            columns.push(ctx.derived_column(data_type, nullable));
        }
        Ok(Self::from_parts(id, Operator::Union, Schema::new(columns), children))
    }

    pub fn table_dual(ctx: &mut PlanContext, schema: Schema, row_count: u64) -> Self {
        Self::from_parts(
            ctx.next_plan_id(),
            Operator::TableDual(TableDual { row_count }),
            schema,
            Vec::new(),
        )
    }

    /// Operator type name as it appears in trace text.
    pub fn tp(&self) -> &'static str {
        match &self.op {
            Operator::DataSource(ds) if ds.partition.is_some() => "TableScan",
            Operator::DataSource(_) => "DataSource",
            Operator::Selection(_) => "Selection",
            Operator::Projection(_) => "Projection",
            Operator::Aggregation(_) => "Aggregation",
            Operator::Join(_) => "Join",
            Operator::Sort(_) => "Sort",
            Operator::Limit(_) => "Limit",
            Operator::TopN(_) => "TopN",
            Operator::Union => "Union",
            Operator::PartitionUnion => "PartitionUnion",
            Operator::TableDual(_) => "TableDual",
        }
    }

    /// `Kind_id`, e.g. `DataSource_1`.
    pub fn display_id(&self) -> String {
        format!("{}_{}", self.tp(), self.id)
    }

    pub fn child(&self, idx: usize) -> Result<&LogicalPlan> {
        self.children.get(idx).ok_or_else(|| {
            Error::malformed(self.display_id(), format!("missing input #{}", idx))
        })
    }

    /// Remove and return the only child of a unary node.
    pub fn take_single_child(&mut self) -> Result<LogicalPlan> {
        if self.children.len() != 1 {
            return Err(Error::malformed(
                self.display_id(),
                format!("expected 1 input, found {}", self.children.len()),
            ));
        }
        self.children
            .pop()
            .ok_or_else(|| Error::malformed(self.display_id(), "expected 1 input, found 0"))
    }

    /// Remove and return both children of a join.
    pub fn take_join_children(&mut self) -> Result<(LogicalPlan, LogicalPlan)> {
        if self.children.len() != 2 {
            return Err(Error::malformed(
                self.display_id(),
                format!("expected 2 inputs, found {}", self.children.len()),
            ));
        }
        let right = self.children.pop();
        let left = self.children.pop();
        match (left, right) {
            (Some(l), Some(r)) => Ok((l, r)),
            _ => Err(Error::malformed(self.display_id(), "expected 2 inputs")),
        }
    }

    /// Rebuild with every child passed through `f`.
    pub fn map_children<F>(mut self, mut f: F) -> Result<LogicalPlan>
    where
        F: FnMut(LogicalPlan) -> Result<LogicalPlan>,
    {
        let children = std::mem::take(&mut self.children);
        self.children = children.into_iter().map(&mut f).collect::<Result<_>>()?;
        Ok(self)
    }

    /// Pre-order visit.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a LogicalPlan)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    /// Limit or TopN returning at most one row.
    pub fn max_one_row(&self) -> bool {
        match &self.op {
            Operator::Limit(l) => l.count <= 1,
            Operator::TopN(t) => t.count <= 1,
            _ => false,
        }
    }

    pub fn node_count(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |_| n += 1);
        n
    }

    /// Deep copy where every node gets a new id; column ids are kept.
    pub fn clone_with_new_ids(&self, ctx: &mut PlanContext) -> LogicalPlan {
        let id = ctx.next_plan_id();
        let children = self
            .children
            .iter()
            .map(|c| c.clone_with_new_ids(ctx))
            .collect();
        LogicalPlan {
            id,
            op: self.op.clone(),
            schema: self.schema.clone(),
            children,
            key_info: self.key_info.clone(),
        }
    }

    /// Recompute the schema of nodes whose output is derived from children
    /// (joins and pass-through operators) after children changed.
    pub fn refresh_schema(&mut self) {
        match &self.op {
            Operator::Join(j) => {
                if let (Some(l), Some(r)) = (self.children.first(), self.children.get(1)) {
                    self.schema = join_schema(j.join_type, &l.schema, &r.schema);
                }
            }
            Operator::Selection(_)
            | Operator::Sort(_)
            | Operator::Limit(_)
            | Operator::TopN(_)
            | Operator::PartitionUnion => {
                if let Some(c) = self.children.first() {
                    self.schema = c.schema.clone();
                }
            }
            _ => {}
        }
    }

    /// Check arity and column resolution of the whole tree.
    pub fn validate(&self) -> Result<()> {
        let (min, max) = self.op.arity();
        let n = self.children.len();
        if n < min || max.is_some_and(|m| n > m) {
            let expected = match max {
                Some(m) if m == min => format!("{}", m),
                Some(m) => format!("{}..{}", min, m),
                None => format!("at least {}", min),
            };
            return Err(Error::malformed(
                self.display_id(),
                format!("expected {} inputs, found {}", expected, n),
            ));
        }

        match &self.op {
            Operator::DataSource(ds) => {
                let table_schema = Schema::new(ds.table_columns.clone());
                if let Some(extra) = self.schema.columns.iter().find(|c| !table_schema.contains(c.id)) {
                    return Err(Error::UnresolvedColumn {
                        node: self.display_id(),
                        column: extra.name.clone(),
                    });
                }
                self.check_resolved(&table_schema, ds.pushed_conds.iter())?;
            }
            Operator::Selection(sel) => {
                self.check_resolved(&self.children[0].schema, sel.conditions.iter())?;
            }
            Operator::Projection(proj) => {
                self.check_width(proj.exprs.len())?;
                self.check_resolved(&self.children[0].schema, proj.exprs.iter())?;
            }
            Operator::Aggregation(agg) => {
                self.check_width(agg.agg_funcs.len())?;
                let input = &self.children[0].schema;
                self.check_resolved(input, agg.group_by.iter())?;
                for func in &agg.agg_funcs {
                    self.check_resolved(input, func.args.iter())?;
                }
            }
            Operator::Join(join) => {
                let (left, right) = (&self.children[0].schema, &self.children[1].schema);
                for (l, r) in &join.eq_conds {
                    self.check_resolved(left, std::iter::once(&Expr::col(l)))?;
                    self.check_resolved(right, std::iter::once(&Expr::col(r)))?;
                }
                let merged = Schema::merge(left, right);
                self.check_resolved(&merged, join.other_conds.iter())?;
            }
            Operator::Sort(sort) => {
                self.check_resolved(&self.children[0].schema, sort.by_items.iter().map(|b| &b.expr))?;
            }
            Operator::TopN(topn) => {
                self.check_resolved(&self.children[0].schema, topn.by_items.iter().map(|b| &b.expr))?;
            }
            Operator::Union | Operator::PartitionUnion => {
                for child in &self.children {
                    if child.schema.len() != self.schema.len() {
                        return Err(Error::malformed(
                            self.display_id(),
                            format!(
                                "input {} has {} columns, expected {}",
                                child.display_id(),
                                child.schema.len(),
                                self.schema.len()
                            ),
                        ));
                    }
                }
            }
            Operator::Limit(_) | Operator::TableDual(_) => {}
        }

        for child in &self.children {
            child.validate()?;
        }
        Ok(())
    }

    fn check_width(&self, n: usize) -> Result<()> {
        if n != self.schema.len() {
            return Err(Error::malformed(
                self.display_id(),
                format!("{} expressions for {} output columns", n, self.schema.len()),
            ));
        }
        Ok(())
    }

    fn check_resolved<'a>(&self, input: &Schema, exprs: impl Iterator<Item = &'a Expr>) -> Result<()> {
        let ids = input.id_set();
        for expr in exprs {
            if let Some(missing) = expr.columns().into_iter().find(|c| !ids.contains(&c.id)) {
                return Err(Error::UnresolvedColumn {
                    node: self.display_id(),
                    column: missing.name,
                });
            }
        }
        Ok(())
    }

    fn explain_info(&self) -> String {
        match &self.op {
            Operator::DataSource(ds) => {
                let mut s = format!("table:{}", ds.display_name());
                if let Some(p) = ds.partition_name() {
                    s.push_str(&format!(", partition:{}", p));
                }
                if !ds.pushed_conds.is_empty() {
                    s.push_str(&format!(", cond:{}", expr_list(&ds.pushed_conds)));
                }
                s
            }
            Operator::Selection(sel) => expr_list(&sel.conditions),
            Operator::Projection(proj) => expr_list(&proj.exprs),
            Operator::Aggregation(agg) => format!(
                "group by:{}, funcs:{}",
                expr_list(&agg.group_by),
                agg_func_list(&agg.agg_funcs)
            ),
            Operator::Join(join) => {
                let mut s = join.join_type.to_string();
                if !join.eq_conds.is_empty() {
                    s.push_str(&format!(", equal:{}", expr_list(&join.eq_exprs())));
                }
                if !join.other_conds.is_empty() {
                    s.push_str(&format!(", other cond:{}", expr_list(&join.other_conds)));
                }
                s
            }
            Operator::Sort(sort) => by_item_list(&sort.by_items),
            Operator::Limit(l) => format!("offset:{}, count:{}", l.offset, l.count),
            Operator::TopN(t) => format!(
                "{}, offset:{}, count:{}",
                by_item_list(&t.by_items),
                t.offset,
                t.count
            ),
            Operator::Union | Operator::PartitionUnion => String::new(),
            Operator::TableDual(d) => format!("rows:{}", d.row_count),
        }
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, prefix: &str, connector: &str, child_prefix: &str) -> fmt::Result {
        let info = self.explain_info();
        if info.is_empty() {
            writeln!(f, "{}{}{}", prefix, connector, self.display_id())?;
        } else {
            writeln!(f, "{}{}{} {}", prefix, connector, self.display_id(), info)?;
        }
        let next_prefix = format!("{}{}", prefix, child_prefix);
        let last = self.children.len().saturating_sub(1);
        for (i, child) in self.children.iter().enumerate() {
            if i == last {
                child.fmt_tree(f, &next_prefix, "└─", "  ")?;
            } else {
                child.fmt_tree(f, &next_prefix, "├─", "│ ")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, "", "", "")
    }
}

/// Output column for one aggregate function.
pub fn agg_output_column(ctx: &mut PlanContext, func: &AggFunc) -> Column {
    if func.kind == AggKind::FirstRow {
        if let Some(Expr::Column(c)) = func.args.first() {
            return c.clone();
        }
    }
    ctx.derived_column(func.return_type(), func.return_nullable())
}

/// Join output: left columns then right columns, the inner side of an outer
/// join made nullable.
pub fn join_schema(join_type: JoinType, left: &Schema, right: &Schema) -> Schema {
    let nullable = |s: &Schema| -> Vec<Column> { s.columns.iter().map(|c| c.with_nullable(true)).collect() };
    let (l, r) = match join_type {
        JoinType::Inner => (left.columns.clone(), right.columns.clone()),
        JoinType::LeftOuter => (left.columns.clone(), nullable(right)),
        JoinType::RightOuter => (nullable(left), right.columns.clone()),
    };
    let mut columns = l;
    columns.extend(r);
    Schema::new(columns)
}
