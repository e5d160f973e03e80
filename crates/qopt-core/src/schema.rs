//! Output columns and schemas of plan operators.
//!
//! Every column carries a `ColumnId` that is unique within one optimization
//! invocation. Expressions reference columns by id; the display name is only
//! used for trace and explain text.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
    Binary,
    Date64,
    Decimal128,
}

impl DataType {
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64)
    }

    pub fn parse(s: &str) -> Option<DataType> {
        Some(match s {
            "Boolean" | "bool" => DataType::Boolean,
            "Int32" | "i32" | "int" => DataType::Int32,
            "Int64" | "i64" | "bigint" => DataType::Int64,
            "Float32" | "f32" | "float" => DataType::Float32,
            "Float64" | "f64" | "double" => DataType::Float64,
            "Utf8" | "string" | "varchar" => DataType::Utf8,
            "Binary" | "bytes" => DataType::Binary,
            "Date64" | "date" => DataType::Date64,
            "Decimal128" | "decimal" => DataType::Decimal128,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    /// `db.table.column` for base columns, `Column#N` for derived ones.
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Column {
    pub fn new(id: ColumnId, name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            id,
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn derived(id: ColumnId, data_type: DataType, nullable: bool) -> Self {
        Self::new(id, format!("Column#{}", id.0), data_type, nullable)
    }

    /// Same column with a different nullability (outer join inner side).
    pub fn with_nullable(&self, nullable: bool) -> Self {
        Self {
            nullable,
            ..self.clone()
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn index_of(&self, id: ColumnId) -> Option<usize> {
        self.columns.iter().position(|c| c.id == id)
    }

    pub fn contains(&self, id: ColumnId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn contains_all<'a>(&self, ids: impl IntoIterator<Item = &'a ColumnId>) -> bool {
        let own = self.id_set();
        ids.into_iter().all(|id| own.contains(id))
    }

    pub fn ids(&self) -> Vec<ColumnId> {
        self.columns.iter().map(|c| c.id).collect()
    }

    pub fn id_set(&self) -> HashSet<ColumnId> {
        self.columns.iter().map(|c| c.id).collect()
    }

    /// Concatenate two schemas, as a join does.
    pub fn merge(left: &Schema, right: &Schema) -> Schema {
        let mut columns = left.columns.clone();
        columns.extend(right.columns.iter().cloned());
        Schema { columns }
    }
}

/// Render `[a,b,c]` the way trace text lists columns.
pub fn column_list<'a>(cols: impl IntoIterator<Item = &'a Column>) -> String {
    let names: Vec<&str> = cols.into_iter().map(|c| c.name.as_str()).collect();
    format!("[{}]", names.join(","))
}
