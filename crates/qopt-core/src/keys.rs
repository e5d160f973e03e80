//! Unique-key annotations attached to plan nodes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::schema::{Column, ColumnId, Schema};

/// Column sets proven to identify output rows.
///
/// `keys` hold only non-null columns; `unique_keys` may contain nulls, so two
/// rows can share a key there as long as it is NULL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub keys: Vec<Vec<ColumnId>>,
    pub unique_keys: Vec<Vec<ColumnId>>,
}

impl KeyInfo {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.unique_keys.is_empty()
    }

    pub fn add_key(&mut self, key: Vec<ColumnId>) {
        if !key.is_empty() && !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    pub fn add_unique_key(&mut self, key: Vec<ColumnId>) {
        if !key.is_empty() && !self.unique_keys.contains(&key) {
            self.unique_keys.push(key);
        }
    }

    pub fn extend(&mut self, other: &KeyInfo) {
        for k in &other.keys {
            self.add_key(k.clone());
        }
        for k in &other.unique_keys {
            self.add_unique_key(k.clone());
        }
    }

    /// First non-null key fully contained in `cols`.
    pub fn covering_key(&self, cols: &HashSet<ColumnId>) -> Option<&[ColumnId]> {
        self.keys
            .iter()
            .find(|k| k.iter().all(|c| cols.contains(c)))
            .map(Vec::as_slice)
    }

    /// First key of either kind fully contained in `cols`.
    pub fn covering_any_key(&self, cols: &HashSet<ColumnId>) -> Option<&[ColumnId]> {
        self.covering_key(cols).or_else(|| {
            self.unique_keys
                .iter()
                .find(|k| k.iter().all(|c| cols.contains(c)))
                .map(Vec::as_slice)
        })
    }

    /// Keep only keys whose columns all survive in `schema`.
    pub fn retain_in(&mut self, schema: &Schema) {
        let ids = schema.id_set();
        self.keys.retain(|k| k.iter().all(|c| ids.contains(c)));
        self.unique_keys.retain(|k| k.iter().all(|c| ids.contains(c)));
    }
}

/// Resolve key column ids back to schema columns for display.
pub fn key_columns<'a>(key: &[ColumnId], schema: &'a Schema) -> Vec<&'a Column> {
    key.iter()
        .filter_map(|id| schema.index_of(*id).and_then(|i| schema.column(i)))
        .collect()
}
