//! Read-only catalog snapshot: tables, indexes, partitions and statistics.
//!
//! The optimizer never looks anything up at run time; a `DataSource` holds an
//! `Arc<TableInfo>` resolved by the plan builder.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::DataType;
use crate::stats::SchemaStats;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionKind {
    Range,
    Hash,
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartitionBound {
    /// `VALUES LESS THAN (v)`; `None` is `MAXVALUE`.
    LessThan(Option<i64>),
    /// `VALUES IN (...)`; `None` stands for `NULL`.
    In(Vec<Option<i64>>),
    /// Hash partitions are addressed by position.
    Hash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionDef {
    pub name: String,
    pub bound: PartitionBound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub kind: PartitionKind,
    /// Partitioning column; must be an integer column of the table.
    pub column: String,
    pub definitions: Vec<PartitionDef>,
}

impl PartitionInfo {
    pub fn range(column: impl Into<String>, bounds: &[(&str, Option<i64>)]) -> Self {
        Self {
            kind: PartitionKind::Range,
            column: column.into(),
            definitions: bounds
                .iter()
                .map(|(name, bound)| PartitionDef {
                    name: (*name).to_string(),
                    bound: PartitionBound::LessThan(*bound),
                })
                .collect(),
        }
    }

    /// `PARTITION BY HASH(column)`; row `v` lands in `names[abs(v mod n)]`.
    pub fn hash(column: impl Into<String>, names: &[&str]) -> Self {
        Self {
            kind: PartitionKind::Hash,
            column: column.into(),
            definitions: names
                .iter()
                .map(|name| PartitionDef {
                    name: (*name).to_string(),
                    bound: PartitionBound::Hash,
                })
                .collect(),
        }
    }

    pub fn list(column: impl Into<String>, lists: &[(&str, Vec<Option<i64>>)]) -> Self {
        Self {
            kind: PartitionKind::List,
            column: column.into(),
            definitions: lists
                .iter()
                .map(|(name, values)| PartitionDef {
                    name: (*name).to_string(),
                    bound: PartitionBound::In(values.clone()),
                })
                .collect(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub row_count: f64,
    #[serde(default)]
    pub columns: SchemaStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub db: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    /// Integer handle column, if the table has a clustered primary key.
    pub primary_key: Option<String>,
    pub indexes: Vec<IndexInfo>,
    pub partition: Option<PartitionInfo>,
    pub stats: Option<TableStats>,
}

impl TableInfo {
    pub fn builder(db: impl Into<String>, name: impl Into<String>) -> TableBuilder {
        TableBuilder {
            table: TableInfo {
                db: db.into(),
                name: name.into(),
                columns: Vec::new(),
                primary_key: None,
                indexes: Vec::new(),
                partition: None,
                stats: None,
            },
        }
    }

    pub fn column_offset(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn qualified_name(&self, column: &str) -> String {
        format!("{}.{}.{}", self.db, self.name, column)
    }

    /// Column offsets of every unique key: the primary key first, then the
    /// unique indexes in declaration order.
    pub fn unique_key_offsets(&self) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        if let Some(off) = self.primary_key.as_deref().and_then(|pk| self.column_offset(pk)) {
            out.push(vec![off]);
        }
        for idx in self.indexes.iter().filter(|i| i.unique) {
            let offs: Option<Vec<usize>> = idx.columns.iter().map(|c| self.column_offset(c)).collect();
            if let Some(offs) = offs {
                out.push(offs);
            }
        }
        out
    }

    /// True when `column` is the handle or the leading column of an index.
    pub fn is_index_prefix(&self, column: &str) -> bool {
        let is_pk = self
            .primary_key
            .as_deref()
            .is_some_and(|pk| pk.eq_ignore_ascii_case(column));
        is_pk
            || self.indexes.iter().any(|i| {
                i.columns
                    .first()
                    .is_some_and(|first| first.eq_ignore_ascii_case(column))
            })
    }

    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::Catalog(format!("table {} has no columns", self.name)));
        }
        if let Some(pk) = &self.primary_key {
            let off = self.column_offset(pk).ok_or_else(|| {
                Error::Catalog(format!("primary key column {} not found in table {}", pk, self.name))
            })?;
            if !self.columns[off].data_type.is_integer() {
                return Err(Error::Catalog(format!(
                    "primary key column {} of table {} must be an integer",
                    pk, self.name
                )));
            }
        }
        for idx in &self.indexes {
            for col in &idx.columns {
                if self.column_offset(col).is_none() {
                    return Err(Error::Catalog(format!(
                        "index {} references unknown column {} in table {}",
                        idx.name, col, self.name
                    )));
                }
            }
        }
        if let Some(part) = &self.partition {
            let off = self.column_offset(&part.column).ok_or_else(|| {
                Error::Catalog(format!(
                    "partition column {} not found in table {}",
                    part.column, self.name
                ))
            })?;
            if !self.columns[off].data_type.is_integer() {
                return Err(Error::Catalog(format!(
                    "partition column {} of table {} must be an integer",
                    part.column, self.name
                )));
            }
            if part.definitions.is_empty() {
                return Err(Error::Catalog(format!("table {} has no partitions", self.name)));
            }
        }
        Ok(())
    }
}

pub struct TableBuilder {
    table: TableInfo,
}

impl TableBuilder {
    pub fn column(mut self, name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        self.table.columns.push(ColumnInfo {
            name: name.into(),
            data_type,
            nullable,
        });
        self
    }

    /// The handle column is implicitly `NOT NULL`.
    pub fn primary_key(mut self, column: &str) -> Self {
        if let Some(off) = self.table.column_offset(column) {
            self.table.columns[off].nullable = false;
        }
        self.table.primary_key = Some(column.to_string());
        self
    }

    pub fn index(mut self, name: impl Into<String>, columns: &[&str], unique: bool) -> Self {
        self.table.indexes.push(IndexInfo {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            unique,
        });
        self
    }

    pub fn partition(mut self, partition: PartitionInfo) -> Self {
        self.table.partition = Some(partition);
        self
    }

    pub fn stats(mut self, stats: TableStats) -> Self {
        self.table.stats = Some(stats);
        self
    }

    pub fn build(self) -> Result<Arc<TableInfo>> {
        self.table.validate()?;
        Ok(Arc::new(self.table))
    }
}

/// Tables visible to one optimization, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: BTreeMap<String, Arc<TableInfo>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, table: Arc<TableInfo>) -> Result<()> {
        if self.tables.contains_key(&table.name) {
            return Err(Error::Catalog(format!("table {} is declared twice", table.name)));
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<Arc<TableInfo>> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Catalog(format!("unknown table {}", name)))
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableInfo>> {
        self.tables.values()
    }
}
