//! Scalar values carried by literals, statistics and partition bounds.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::DataType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Integer view used by partition pruning; `None` for non-integral values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::I32(v) => Some(i64::from(*v)),
            Scalar::I64(v) => Some(*v),
            Scalar::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Scalar::Null | Scalar::I64(_) => DataType::Int64,
            Scalar::Bool(_) => DataType::Boolean,
            Scalar::I32(_) => DataType::Int32,
            Scalar::F32(_) => DataType::Float32,
            Scalar::F64(_) => DataType::Float64,
            Scalar::Str(_) => DataType::Utf8,
            Scalar::Bin(_) => DataType::Binary,
        }
    }

    /// Parse a literal token: booleans, integers, floats, quoted strings, `NULL`.
    pub fn parse_literal(literal: &str) -> Option<Scalar> {
        let trimmed = literal.trim();

        if trimmed.eq_ignore_ascii_case("null") {
            return Some(Scalar::Null);
        }
        if let Ok(b) = trimmed.parse::<bool>() {
            return Some(Scalar::Bool(b));
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Some(Scalar::I64(i));
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Some(Scalar::F64(f));
        }
        let quoted = trimmed.len() >= 2
            && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
                || (trimmed.starts_with('\'') && trimmed.ends_with('\'')));
        if quoted {
            return Some(Scalar::Str(trimmed[1..trimmed.len() - 1].to_string()));
        }
        None
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "<nil>"),
            Scalar::Bool(b) => write!(f, "{}", i32::from(*b)),
            Scalar::I32(v) => write!(f, "{v}"),
            Scalar::I64(v) => write!(f, "{v}"),
            Scalar::F32(v) => write!(f, "{v}"),
            Scalar::F64(v) => write!(f, "{v}"),
            Scalar::Str(s) => write!(f, "\"{s}\""),
            Scalar::Bin(b) => write!(f, "0x{}", b.iter().map(|x| format!("{x:02x}")).collect::<String>()),
        }
    }
}

/// Compare two scalars for ordering. NULL sorts first; integers of different
/// widths compare numerically.
pub fn scalar_cmp(a: &Scalar, b: &Scalar) -> Ordering {
    use Scalar::*;

    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (Bool(x), Bool(y)) => x.cmp(y),
        (F32(x), F32(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (F64(x), F64(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Str(x), Str(y)) => x.cmp(y),
        (Bin(x), Bin(y)) => x.cmp(y),
        _ => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => scalar_type_order(a).cmp(&scalar_type_order(b)),
        },
    }
}

fn scalar_type_order(s: &Scalar) -> u8 {
    use Scalar::*;
    match s {
        Null => 0,
        Bool(_) => 1,
        I32(_) => 2,
        I64(_) => 3,
        F32(_) => 4,
        F64(_) => 5,
        Str(_) => 6,
        Bin(_) => 7,
    }
}
