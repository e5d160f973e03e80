//! Column statistics snapshot consumed by the cost model.
//!
//! Statistics are collected elsewhere and handed to the optimizer read-only,
//! attached to a table in the catalog. Every consumer must tolerate their
//! absence and fall back to the configured defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{scalar_cmp, Scalar};

/// Statistics for a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Minimum value observed (None if no non-null values)
    pub min: Option<Scalar>,
    /// Maximum value observed (None if no non-null values)
    pub max: Option<Scalar>,
    /// Number of null values
    pub null_count: u64,
    /// Estimated distinct count (None if not computed)
    pub distinct_count: Option<u64>,
    /// Total number of values (including nulls)
    pub total_count: u64,
}

impl ColumnStats {
    /// Create empty statistics.
    pub fn new() -> Self {
        Self {
            min: None,
            max: None,
            null_count: 0,
            distinct_count: None,
            total_count: 0,
        }
    }

    pub fn with_distinct(total_count: u64, distinct_count: u64) -> Self {
        Self {
            distinct_count: Some(distinct_count),
            total_count,
            ..Self::new()
        }
    }

    /// Get the number of non-null values.
    pub fn non_null_count(&self) -> u64 {
        self.total_count.saturating_sub(self.null_count)
    }

    pub fn null_fraction(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        self.null_count as f64 / self.total_count as f64
    }

    /// Estimate selectivity for a range predicate (min <= value <= max).
    ///
    /// Returns a value between 0.0 and 1.0 representing the fraction of rows
    /// that would match the predicate.
    pub fn estimate_range_selectivity(&self, min_val: Option<&Scalar>, max_val: Option<&Scalar>) -> f64 {
        if self.total_count > 0 && self.non_null_count() == 0 {
            return 0.0;
        }

        let (lo, hi) = match (&self.min, &self.max) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => return 0.5,
        };

        match (min_val, max_val) {
            (Some(min), Some(max)) => {
                if scalar_cmp(min, hi).is_gt() || scalar_cmp(max, lo).is_lt() {
                    return 0.0;
                }
                0.3
            }
            (Some(min), None) => {
                if scalar_cmp(min, hi).is_gt() {
                    return 0.0;
                }
                if scalar_cmp(min, lo).is_le() {
                    return 1.0;
                }
                0.5
            }
            (None, Some(max)) => {
                if scalar_cmp(max, lo).is_lt() {
                    return 0.0;
                }
                if scalar_cmp(max, hi).is_ge() {
                    return 1.0;
                }
                0.5
            }
            (None, None) => 1.0,
        }
    }

    /// Estimate selectivity for an equality predicate.
    ///
    /// Uses distinct_count if available, otherwise returns a conservative estimate.
    pub fn estimate_equality_selectivity(&self) -> f64 {
        if self.total_count > 0 && self.non_null_count() == 0 {
            return 0.0;
        }

        if let Some(distinct) = self.distinct_count {
            if distinct > 0 {
                return 1.0 / (distinct as f64);
            }
        }

        0.01
    }
}

impl Default for ColumnStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for the columns of one table, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaStats {
    pub column_stats: BTreeMap<String, ColumnStats>,
}

impl SchemaStats {
    /// Create empty schema statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get statistics for a column by name.
    pub fn get(&self, column_name: &str) -> Option<&ColumnStats> {
        self.column_stats.get(column_name)
    }

    /// Get or create statistics for a column.
    pub fn get_or_create(&mut self, column_name: String) -> &mut ColumnStats {
        self.column_stats.entry(column_name).or_default()
    }
}
