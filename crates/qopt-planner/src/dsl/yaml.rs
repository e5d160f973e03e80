//! YAML plan files: a catalog plus a recursive operator description.
//!
//! Example:
//! ```yaml
//! tables:
//!   - name: t
//!     columns:
//!       - { name: a, type: Int64, nullable: false }
//!       - { name: b, type: Int64 }
//!     primary_key: a
//!     stats: { row_count: 1000, columns: { b: { distinct: 10 } } }
//! plan:
//!   project:
//!     exprs: ["t1.a", "b + 1 as b1"]
//!     input:
//!       filter:
//!         conditions: ["t1.b > 3"]
//!         input: { scan: { table: t, alias: t1 } }
//! ```
//!
//! Names resolve against the output of the operator's input: a scan exposes
//! its columns under the alias (else the table name), `as` names the outputs of
//! `project` and `aggregate`, and a join exposes both sides.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use qopt_core::catalog::{Catalog, PartitionInfo, TableInfo, TableStats};
use qopt_core::context::PlanContext;
use qopt_core::error::{Error, Result};
use qopt_core::expr::{BinOp, Expr, UnaryOp};
use qopt_core::plan::{AggFunc, AggKind, ByItem, JoinType, LogicalPlan};
use qopt_core::schema::{Column, DataType};
use qopt_core::stats::{ColumnStats, SchemaStats};

use super::expr::{parse_expression, parse_item, Ast, Item};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanFile {
    #[serde(default)]
    pub tables: Vec<TableDef>,
    pub plan: NodeDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDef {
    #[serde(default = "default_db")]
    pub db: String,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
    #[serde(default)]
    pub partition: Option<PartitionDef>,
    #[serde(default)]
    pub stats: Option<StatsDef>,
}

fn default_db() -> String {
    "test".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartitionDef {
    /// `range`, `hash` or `list`.
    #[serde(rename = "type")]
    pub kind: String,
    pub column: String,
    pub partitions: Vec<PartitionItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartitionItem {
    pub name: String,
    /// Range bound; an integer or `maxvalue`.
    #[serde(default)]
    pub less_than: Option<RangeBound>,
    /// List values; `null` is allowed.
    #[serde(default)]
    pub values: Option<Vec<Option<i64>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangeBound {
    Value(i64),
    Keyword(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsDef {
    pub row_count: f64,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnStatsDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnStatsDef {
    #[serde(default)]
    pub distinct: Option<u64>,
    #[serde(default)]
    pub nulls: u64,
}

/// One operator; exactly one field is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregateDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<LimitDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub union: Option<UnionDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanDef {
    pub table: String,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterDef {
    pub conditions: Vec<String>,
    pub input: Box<NodeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectDef {
    pub exprs: Vec<String>,
    pub input: Box<NodeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregateDef {
    #[serde(default)]
    pub group_by: Vec<String>,
    pub funcs: Vec<String>,
    pub input: Box<NodeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinDef {
    /// `inner` (default), `left` or `right`.
    #[serde(rename = "type", default = "default_join_type")]
    pub join_type: String,
    pub left: Box<NodeDef>,
    pub right: Box<NodeDef>,
    #[serde(default)]
    pub on: Vec<String>,
}

fn default_join_type() -> String {
    "inner".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortDef {
    pub by: Vec<String>,
    pub input: Box<NodeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitDef {
    #[serde(default)]
    pub offset: u64,
    pub count: u64,
    pub input: Box<NodeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnionDef {
    pub inputs: Vec<NodeDef>,
}

/// A resolved plan file: the catalog, the tree, and the context that minted
/// its ids (the optimizer continues from it).
#[derive(Debug, Clone)]
pub struct BuiltPlan {
    pub catalog: Catalog,
    pub plan: LogicalPlan,
    pub ctx: PlanContext,
}

pub fn parse_plan_file(src: &str) -> Result<PlanFile> {
    serde_yaml::from_str(src).map_err(|e| Error::Plan(format!("invalid plan file: {}", e)))
}

/// Parse and resolve a plan file.
pub fn build_plan(src: &str) -> Result<BuiltPlan> {
    parse_plan_file(src)?.build()
}

impl PlanFile {
    pub fn build(&self) -> Result<BuiltPlan> {
        let mut catalog = Catalog::new();
        for def in &self.tables {
            catalog.add(def.to_table()?)?;
        }
        let mut builder = PlanBuilder::new(&catalog);
        let (plan, _) = builder.build(&self.plan)?;
        let ctx = builder.ctx;
        Ok(BuiltPlan { catalog, plan, ctx })
    }
}

impl TableDef {
    pub fn to_table(&self) -> Result<std::sync::Arc<TableInfo>> {
        let mut builder = TableInfo::builder(&self.db, &self.name);
        for col in &self.columns {
            let data_type = DataType::parse(&col.data_type).ok_or_else(|| {
                Error::Catalog(format!("unknown type {} for column {}.{}", col.data_type, self.name, col.name))
            })?;
            builder = builder.column(&col.name, data_type, col.nullable);
        }
        if let Some(pk) = &self.primary_key {
            builder = builder.primary_key(pk);
        }
        for idx in &self.indexes {
            let columns: Vec<&str> = idx.columns.iter().map(String::as_str).collect();
            builder = builder.index(&idx.name, &columns, idx.unique);
        }
        if let Some(part) = &self.partition {
            builder = builder.partition(part.to_info(&self.name)?);
        }
        if let Some(stats) = &self.stats {
            let mut columns = SchemaStats::new();
            for (name, def) in &stats.columns {
                let entry = columns.get_or_create(name.clone());
                *entry = ColumnStats {
                    null_count: def.nulls,
                    distinct_count: def.distinct,
                    total_count: stats.row_count as u64,
                    ..ColumnStats::new()
                };
            }
            builder = builder.stats(TableStats {
                row_count: stats.row_count,
                columns,
            });
        }
        builder.build()
    }
}

impl PartitionDef {
    fn to_info(&self, table: &str) -> Result<PartitionInfo> {
        match self.kind.to_ascii_lowercase().as_str() {
            "range" => {
                let bounds = self
                    .partitions
                    .iter()
                    .map(|p| {
                        let bound = match &p.less_than {
                            Some(RangeBound::Value(v)) => Some(*v),
                            Some(RangeBound::Keyword(k)) if k.eq_ignore_ascii_case("maxvalue") => None,
                            _ => {
                                return Err(Error::Catalog(format!(
                                    "range partition {} of table {} needs `less_than: <int>|maxvalue`",
                                    p.name, table
                                )))
                            }
                        };
                        Ok((p.name.as_str(), bound))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(PartitionInfo::range(&self.column, &bounds))
            }
            "hash" => {
                let names: Vec<&str> = self.partitions.iter().map(|p| p.name.as_str()).collect();
                Ok(PartitionInfo::hash(&self.column, &names))
            }
            "list" => {
                let lists = self
                    .partitions
                    .iter()
                    .map(|p| {
                        p.values.clone().map(|v| (p.name.as_str(), v)).ok_or_else(|| {
                            Error::Catalog(format!("list partition {} of table {} needs `values`", p.name, table))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(PartitionInfo::list(&self.column, &lists))
            }
            other => Err(Error::Catalog(format!(
                "unknown partition type {} for table {}, expected range, hash or list",
                other, table
            ))),
        }
    }
}

/// A column visible by name.
#[derive(Debug, Clone)]
struct ScopeEntry {
    qualifier: Option<String>,
    name: String,
    column: Column,
}

/// Output columns of a built node, in schema order.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    entries: Vec<ScopeEntry>,
}

impl Scope {
    fn resolve(&self, qualifier: Option<&str>, name: &str) -> Result<Column> {
        let mut found: Option<&Column> = None;
        for entry in &self.entries {
            let qualifier_ok = match qualifier {
                Some(q) => entry.qualifier.as_deref().is_some_and(|eq| eq.eq_ignore_ascii_case(q)),
                None => true,
            };
            if !qualifier_ok || !entry.name.eq_ignore_ascii_case(name) {
                continue;
            }
            match found {
                Some(prev) if prev.id != entry.column.id => {
                    return Err(Error::Schema(format!("ambiguous column {}", display_name(qualifier, name))));
                }
                _ => found = Some(&entry.column),
            }
        }
        found
            .cloned()
            .ok_or_else(|| Error::Schema(format!("unknown column {}", display_name(qualifier, name))))
    }

    /// Entry for an output column, named after the item.
    fn output(&self, item: &Item, column: Column) -> ScopeEntry {
        if let Some(alias) = &item.alias {
            return ScopeEntry {
                qualifier: None,
                name: alias.clone(),
                column,
            };
        }
        let source = match &item.ast {
            Ast::Ident { .. } => self.entries.iter().find(|e| e.column.id == column.id),
            Ast::Call { name, args, .. } if name.eq_ignore_ascii_case("firstrow") && args.len() == 1 => {
                self.entries.iter().find(|e| e.column.id == column.id)
            }
            _ => None,
        };
        match source {
            Some(entry) => ScopeEntry {
                column,
                ..entry.clone()
            },
            None => ScopeEntry {
                qualifier: None,
                name: column.name.clone(),
                column,
            },
        }
    }
}

fn display_name(qualifier: Option<&str>, name: &str) -> String {
    match qualifier {
        Some(q) => format!("{}.{}", q, name),
        None => name.to_string(),
    }
}

/// Resolves [`NodeDef`] trees against a catalog, minting ids bottom-up.
pub struct PlanBuilder<'c> {
    catalog: &'c Catalog,
    pub ctx: PlanContext,
}

impl<'c> PlanBuilder<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Self {
            catalog,
            ctx: PlanContext::new(),
        }
    }

    pub fn build(&mut self, node: &NodeDef) -> Result<(LogicalPlan, Scope)> {
        let set = [
            node.scan.is_some(),
            node.filter.is_some(),
            node.project.is_some(),
            node.aggregate.is_some(),
            node.join.is_some(),
            node.sort.is_some(),
            node.limit.is_some(),
            node.union.is_some(),
        ]
        .iter()
        .filter(|s| **s)
        .count();
        if set != 1 {
            return Err(Error::Plan(format!(
                "a plan node needs exactly one of scan, filter, project, aggregate, join, sort, limit, union; found {}",
                set
            )));
        }

        if let Some(scan) = &node.scan {
            return self.scan(scan);
        }
        if let Some(filter) = &node.filter {
            let (child, scope) = self.build(&filter.input)?;
            let mut conditions = Vec::new();
            for text in &filter.conditions {
                let expr = lower_scalar(&parse_expression(text)?, &scope)?;
                conditions.extend(expr.split_conjunction());
            }
            return Ok((LogicalPlan::selection(&mut self.ctx, child, conditions), scope));
        }
        if let Some(project) = &node.project {
            let (child, scope) = self.build(&project.input)?;
            let items = project
                .exprs
                .iter()
                .map(|t| parse_item(t))
                .collect::<Result<Vec<_>>>()?;
            let exprs = items
                .iter()
                .map(|item| lower_scalar(&item.ast, &scope))
                .collect::<Result<Vec<_>>>()?;
            let plan = LogicalPlan::projection(&mut self.ctx, child, exprs);
            let out = output_scope(&scope, &items, &plan);
            return Ok((plan, out));
        }
        if let Some(agg) = &node.aggregate {
            let (child, scope) = self.build(&agg.input)?;
            let group_by = agg
                .group_by
                .iter()
                .map(|t| lower_scalar(&parse_expression(t)?, &scope))
                .collect::<Result<Vec<_>>>()?;
            let items = agg.funcs.iter().map(|t| parse_item(t)).collect::<Result<Vec<_>>>()?;
            let funcs = items
                .iter()
                .map(|item| lower_agg(&item.ast, &scope))
                .collect::<Result<Vec<_>>>()?;
            let plan = LogicalPlan::aggregation(&mut self.ctx, child, group_by, funcs);
            let out = output_scope(&scope, &items, &plan);
            return Ok((plan, out));
        }
        if let Some(join) = &node.join {
            return self.join(join);
        }
        if let Some(sort) = &node.sort {
            let (child, scope) = self.build(&sort.input)?;
            let by_items = sort
                .by
                .iter()
                .map(|t| {
                    let item = parse_item(t)?;
                    if item.alias.is_some() {
                        return Err(Error::Plan(format!("sort item `{}` cannot be renamed", t)));
                    }
                    Ok(ByItem {
                        expr: lower_scalar(&item.ast, &scope)?,
                        desc: item.desc,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok((LogicalPlan::sort(&mut self.ctx, child, by_items), scope));
        }
        if let Some(limit) = &node.limit {
            let (child, scope) = self.build(&limit.input)?;
            let plan = LogicalPlan::limit(&mut self.ctx, child, limit.offset, limit.count);
            return Ok((plan, scope));
        }
        if let Some(union) = &node.union {
            return self.union(union);
        }
        Err(Error::Invariant("plan node kind not handled".into()))
    }

    fn scan(&mut self, scan: &ScanDef) -> Result<(LogicalPlan, Scope)> {
        let table = self.catalog.table(&scan.table)?;
        let qualifier = scan.alias.clone().unwrap_or_else(|| table.name.clone());
        let plan = LogicalPlan::data_source(&mut self.ctx, table.clone(), scan.alias.as_deref());
        let entries = table
            .columns
            .iter()
            .zip(&plan.schema.columns)
            .map(|(info, column)| ScopeEntry {
                qualifier: Some(qualifier.clone()),
                name: info.name.clone(),
                column: column.clone(),
            })
            .collect();
        Ok((plan, Scope { entries }))
    }

    fn join(&mut self, def: &JoinDef) -> Result<(LogicalPlan, Scope)> {
        let join_type = match def.join_type.to_ascii_lowercase().as_str() {
            "inner" => JoinType::Inner,
            "left" | "left outer" => JoinType::LeftOuter,
            "right" | "right outer" => JoinType::RightOuter,
            other => {
                return Err(Error::Plan(format!(
                    "unknown join type {}, expected inner, left or right",
                    other
                )))
            }
        };
        let (left, left_scope) = self.build(&def.left)?;
        let (right, right_scope) = self.build(&def.right)?;
        let mut scope = left_scope;
        scope.entries.extend(right_scope.entries);

        let mut eq_conds = Vec::new();
        let mut other_conds = Vec::new();
        for text in &def.on {
            let expr = lower_scalar(&parse_expression(text)?, &scope)?;
            for cond in expr.split_conjunction() {
                match equi_key(&cond, &left, &right) {
                    Some(key) => eq_conds.push(key),
                    None => other_conds.push(cond),
                }
            }
        }
        let plan = LogicalPlan::join(&mut self.ctx, join_type, left, right, eq_conds, other_conds);
        // Outer joins make the inner side nullable.
        for entry in scope.entries.iter_mut() {
            if let Some(col) = plan.schema.columns.iter().find(|c| c.id == entry.column.id) {
                entry.column = col.clone();
            }
        }
        Ok((plan, scope))
    }

    fn union(&mut self, def: &UnionDef) -> Result<(LogicalPlan, Scope)> {
        let mut children = Vec::with_capacity(def.inputs.len());
        let mut first_scope = None;
        for input in &def.inputs {
            let (child, scope) = self.build(input)?;
            first_scope.get_or_insert(scope);
            children.push(child);
        }
        let plan = LogicalPlan::union_all(&mut self.ctx, children)?;
        let names = first_scope.unwrap_or_default();
        let entries = plan
            .schema
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| ScopeEntry {
                qualifier: None,
                name: names
                    .entries
                    .get(i)
                    .map(|e| e.name.clone())
                    .unwrap_or_else(|| column.name.clone()),
                column: column.clone(),
            })
            .collect();
        Ok((plan, Scope { entries }))
    }
}

fn output_scope(input: &Scope, items: &[Item], plan: &LogicalPlan) -> Scope {
    Scope {
        entries: items
            .iter()
            .zip(&plan.schema.columns)
            .map(|(item, column)| input.output(item, column.clone()))
            .collect(),
    }
}

/// `l = r` with one column from each join input, oriented `(left, right)`.
fn equi_key(cond: &Expr, left: &LogicalPlan, right: &LogicalPlan) -> Option<(Column, Column)> {
    let Expr::BinaryOp {
        op: BinOp::Eq,
        left: a,
        right: b,
    } = cond
    else {
        return None;
    };
    let (a, b) = (a.as_column()?, b.as_column()?);
    if left.schema.contains(a.id) && right.schema.contains(b.id) {
        Some((a.clone(), b.clone()))
    } else if left.schema.contains(b.id) && right.schema.contains(a.id) {
        Some((b.clone(), a.clone()))
    } else {
        None
    }
}

fn lower_scalar(ast: &Ast, scope: &Scope) -> Result<Expr> {
    Ok(match ast {
        Ast::Ident { qualifier, name } => Expr::col(&scope.resolve(qualifier.as_deref(), name)?),
        Ast::Literal(value) => Expr::lit(value.clone()),
        Ast::Binary { op, left, right } => Expr::binary(*op, lower_scalar(left, scope)?, lower_scalar(right, scope)?),
        Ast::Unary { op, arg } => Expr::unary(*op, lower_scalar(arg, scope)?),
        Ast::InList { expr, list, negated } => {
            let list = list
                .iter()
                .map(|e| lower_scalar(e, scope))
                .collect::<Result<Vec<_>>>()?;
            let expr = Expr::in_list(lower_scalar(expr, scope)?, list);
            if *negated {
                Expr::unary(UnaryOp::Not, expr)
            } else {
                expr
            }
        }
        Ast::Call { name, args, .. } if name.eq_ignore_ascii_case("if") => match args.as_slice() {
            [cond, then, otherwise] => Expr::If {
                cond: Box::new(lower_scalar(cond, scope)?),
                then: Box::new(lower_scalar(then, scope)?),
                otherwise: Box::new(lower_scalar(otherwise, scope)?),
            },
            _ => return Err(Error::Plan(format!("if takes 3 arguments, got {}", args.len()))),
        },
        Ast::Call { name, .. } if AggKind::parse(name).is_some() => {
            return Err(Error::Plan(format!("aggregate {} is only allowed under `aggregate.funcs`", name)))
        }
        Ast::Call { name, .. } => return Err(Error::Plan(format!("unknown function {}", name))),
    })
}

fn lower_agg(ast: &Ast, scope: &Scope) -> Result<AggFunc> {
    let Ast::Call {
        name,
        distinct,
        star,
        args,
    } = ast
    else {
        return Err(Error::Plan("aggregate items must be function calls".into()));
    };
    let kind = AggKind::parse(name).ok_or_else(|| Error::Plan(format!("unknown aggregate function {}", name)))?;
    if *star {
        if kind != AggKind::Count {
            return Err(Error::Plan(format!("{}(*) is not allowed", name)));
        }
        return Ok(AggFunc::count_star().with_distinct(*distinct));
    }
    if args.len() != 1 {
        return Err(Error::Plan(format!("{} takes 1 argument, got {}", name, args.len())));
    }
    let args = args
        .iter()
        .map(|a| lower_scalar(a, scope))
        .collect::<Result<Vec<_>>>()?;
    Ok(AggFunc::new(kind, args).with_distinct(*distinct))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qopt_core::plan::Operator;

    const TABLES: &str = r#"
tables:
  - name: t
    columns:
      - { name: a, type: Int64, nullable: false }
      - { name: b, type: Int64 }
    primary_key: a
"#;

    fn build(plan: &str) -> Result<BuiltPlan> {
        build_plan(&format!("{}plan:\n{}", TABLES, plan))
    }

    #[test]
    fn test_scan_filter_project() {
        let built = build(
            r#"
  project:
    exprs: ["t1.a", "b + 1 as b1"]
    input:
      filter:
        conditions: ["a > 1 and b = 2"]
        input: { scan: { table: t, alias: t1 } }
"#,
        )
        .unwrap();
        let plan = &built.plan;
        assert_eq!(plan.display_id(), "Projection_3");
        assert_eq!(plan.schema.columns[0].name, "test.t.a");
        assert_eq!(plan.schema.columns[1].name, "Column#3");
        let Operator::Selection(sel) = &plan.children[0].op else {
            panic!("expected selection");
        };
        assert_eq!(sel.conditions.len(), 2);
        assert_eq!(sel.conditions[0].to_string(), "gt(test.t.a, 1)");
        plan.validate().unwrap();
    }

    #[test]
    fn test_join_keys_and_ambiguity() {
        let built = build(
            r#"
  join:
    type: left
    left: { scan: { table: t, alias: t1 } }
    right: { scan: { table: t, alias: t2 } }
    on: ["t1.a = t2.a", "t1.b > t2.b"]
"#,
        )
        .unwrap();
        let Operator::Join(join) = &built.plan.op else {
            panic!("expected join");
        };
        assert_eq!(join.join_type, JoinType::LeftOuter);
        assert_eq!(join.eq_conds.len(), 1);
        assert_eq!(join.other_conds.len(), 1);
        assert!(built.plan.schema.columns[2].nullable);

        let err = build(
            r#"
  join:
    left: { scan: { table: t, alias: t1 } }
    right: { scan: { table: t, alias: t2 } }
    on: ["a = 1"]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("ambiguous column a"));
    }

    #[test]
    fn test_aggregate_names() {
        let built = build(
            r#"
  project:
    exprs: ["n", "a"]
    input:
      aggregate:
        group_by: ["a"]
        funcs: ["count(*) as n", "firstrow(a)"]
        input: { scan: { table: t } }
"#,
        )
        .unwrap();
        let Operator::Aggregation(agg) = &built.plan.children[0].op else {
            panic!("expected aggregation");
        };
        assert_eq!(agg.agg_funcs[0].to_string(), "count(1)");
        assert_eq!(built.plan.schema.columns[1].name, "test.t.a");
    }

    #[test]
    fn test_rejects_bad_documents() {
        assert!(build("  scan: { table: missing }\n").is_err());
        assert!(build("  scan: { table: t, extra: 1 }\n").is_err());
        assert!(build("  project: { exprs: [\"zz\"], input: { scan: { table: t } } }\n").is_err());
        assert!(build("  project: { exprs: [\"max(a)\"], input: { scan: { table: t } } }\n").is_err());
        assert!(build_plan(&format!("{}plan: {{}}\n", TABLES)).is_err());
    }

    #[test]
    fn test_partition_definitions() {
        let src = r#"
tables:
  - name: pt
    columns:
      - { name: id, type: Int64 }
    partition:
      type: range
      column: id
      partitions:
        - { name: p1, less_than: 16 }
        - { name: p2, less_than: maxvalue }
plan:
  scan: { table: pt }
"#;
        let built = build_plan(src).unwrap();
        let table = built.catalog.table("pt").unwrap();
        let info = table.partition.as_ref().unwrap();
        assert_eq!(info.names(), vec!["p1", "p2"]);
    }
}
