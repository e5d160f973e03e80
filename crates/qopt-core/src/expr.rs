//! Scalar expressions referenced by plan operators.
//!
//! Expressions point at columns by `ColumnId` and render in function style
//! (`plus(1, test.t.a)`, `eq(test.t.a, 1)`), which is the form trace text uses.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{Column, ColumnId, DataType};
use crate::types::Scalar;

/// Binary operators for expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    // Comparison operators
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical operators
    And,
    Or,
    // Arithmetic operators
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    /// Parse a binary operator from a string.
    pub fn parse(op: &str) -> Result<Self, String> {
        match op {
            "==" | "=" => Ok(BinOp::Eq),
            "!=" | "<>" => Ok(BinOp::Ne),
            "<" => Ok(BinOp::Lt),
            "<=" => Ok(BinOp::Le),
            ">" => Ok(BinOp::Gt),
            ">=" => Ok(BinOp::Ge),
            "AND" | "and" | "&&" => Ok(BinOp::And),
            "OR" | "or" | "||" => Ok(BinOp::Or),
            "+" => Ok(BinOp::Add),
            "-" => Ok(BinOp::Sub),
            "*" => Ok(BinOp::Mul),
            "/" => Ok(BinOp::Div),
            "%" => Ok(BinOp::Mod),
            _ => Err(format!("unknown binary operator: {}", op)),
        }
    }

    pub fn func_name(self) -> &'static str {
        match self {
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::Lt => "lt",
            BinOp::Le => "le",
            BinOp::Gt => "gt",
            BinOp::Ge => "ge",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Add => "plus",
            BinOp::Sub => "minus",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Mod => "mod",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    /// The operator obtained by swapping operands (`a < b` is `b > a`).
    pub fn flip(self) -> Self {
        match self {
            BinOp::Lt => BinOp::Gt,
            BinOp::Le => BinOp::Ge,
            BinOp::Gt => BinOp::Lt,
            BinOp::Ge => BinOp::Le,
            other => other,
        }
    }
}

/// Unary operators for expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    IsNull,
    Neg,
}

impl UnaryOp {
    /// Parse a unary operator from a string.
    pub fn parse(op: &str) -> Result<Self, String> {
        match op.to_uppercase().as_str() {
            "NOT" | "!" => Ok(UnaryOp::Not),
            "ISNULL" | "IS NULL" => Ok(UnaryOp::IsNull),
            "NEG" | "-" => Ok(UnaryOp::Neg),
            _ => Err(format!("unknown unary operator: {}", op)),
        }
    }

    pub fn func_name(self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::IsNull => "isnull",
            UnaryOp::Neg => "unaryminus",
        }
    }
}

/// Expression AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Column(Column),
    Literal(Scalar),
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    /// `expr IN (list...)`
    InList { expr: Box<Expr>, list: Vec<Expr> },
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    pub fn col(column: &Column) -> Expr {
        Expr::Column(column.clone())
    }

    pub fn lit(value: Scalar) -> Expr {
        Expr::Literal(value)
    }

    pub fn int(value: i64) -> Expr {
        Expr::Literal(Scalar::I64(value))
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, arg: Expr) -> Expr {
        Expr::UnaryOp {
            op,
            arg: Box::new(arg),
        }
    }

    pub fn equal(left: Expr, right: Expr) -> Expr {
        Expr::binary(BinOp::Eq, left, right)
    }

    pub fn in_list(expr: Expr, list: Vec<Expr>) -> Expr {
        Expr::InList {
            expr: Box::new(expr),
            list,
        }
    }

    /// `not(isnull(expr))`
    pub fn not_null(expr: Expr) -> Expr {
        Expr::unary(UnaryOp::Not, Expr::unary(UnaryOp::IsNull, expr))
    }

    pub fn as_column(&self) -> Option<&Column> {
        match self {
            Expr::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Scalar> {
        match self {
            Expr::Literal(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.columns().is_empty()
    }

    /// Distinct referenced columns, in first-occurrence order.
    pub fn columns(&self) -> Vec<Column> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.collect_columns(&mut out, &mut seen);
        out
    }

    pub fn column_ids(&self) -> HashSet<ColumnId> {
        self.columns().into_iter().map(|c| c.id).collect()
    }

    fn collect_columns(&self, out: &mut Vec<Column>, seen: &mut HashSet<ColumnId>) {
        match self {
            Expr::Column(c) => {
                if seen.insert(c.id) {
                    out.push(c.clone());
                }
            }
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(out, seen);
                right.collect_columns(out, seen);
            }
            Expr::UnaryOp { arg, .. } => arg.collect_columns(out, seen),
            Expr::InList { expr, list } => {
                expr.collect_columns(out, seen);
                for item in list {
                    item.collect_columns(out, seen);
                }
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_columns(out, seen);
                then.collect_columns(out, seen);
                otherwise.collect_columns(out, seen);
            }
        }
    }

    /// Replace column references found in `map`.
    pub fn substitute(&self, map: &HashMap<ColumnId, Expr>) -> Expr {
        match self {
            Expr::Column(c) => map.get(&c.id).cloned().unwrap_or_else(|| self.clone()),
            Expr::Literal(_) => self.clone(),
            Expr::BinaryOp { op, left, right } => {
                Expr::binary(*op, left.substitute(map), right.substitute(map))
            }
            Expr::UnaryOp { op, arg } => Expr::unary(*op, arg.substitute(map)),
            Expr::InList { expr, list } => Expr::in_list(
                expr.substitute(map),
                list.iter().map(|e| e.substitute(map)).collect(),
            ),
            Expr::If {
                cond,
                then,
                otherwise,
            } => Expr::If {
                cond: Box::new(cond.substitute(map)),
                then: Box::new(then.substitute(map)),
                otherwise: Box::new(otherwise.substitute(map)),
            },
        }
    }

    /// Flatten nested `and` into a list of conjuncts.
    pub fn split_conjunction(self) -> Vec<Expr> {
        match self {
            Expr::BinaryOp {
                op: BinOp::And,
                left,
                right,
            } => {
                let mut out = left.split_conjunction();
                out.extend(right.split_conjunction());
                out
            }
            other => vec![other],
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Expr::Column(c) => c.data_type.clone(),
            Expr::Literal(s) => s.data_type(),
            Expr::BinaryOp { op, left, right } => match op {
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Mod => {
                    let (l, r) = (left.data_type(), right.data_type());
                    if l.is_integer() && r.is_integer() {
                        DataType::Int64
                    } else {
                        DataType::Float64
                    }
                }
                BinOp::Div => DataType::Float64,
                _ => DataType::Boolean,
            },
            Expr::UnaryOp { op, arg } => match op {
                UnaryOp::Neg => arg.data_type(),
                _ => DataType::Boolean,
            },
            Expr::InList { .. } => DataType::Boolean,
            Expr::If { then, .. } => then.data_type(),
        }
    }

    pub fn nullable(&self) -> bool {
        match self {
            Expr::Column(c) => c.nullable,
            Expr::Literal(s) => s.is_null(),
            Expr::BinaryOp { left, right, .. } => left.nullable() || right.nullable(),
            Expr::UnaryOp { op, arg } => match op {
                UnaryOp::IsNull => false,
                _ => arg.nullable(),
            },
            Expr::InList { expr, list } => expr.nullable() || list.iter().any(Expr::nullable),
            Expr::If {
                then, otherwise, ..
            } => then.nullable() || otherwise.nullable(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{}", c),
            Expr::Literal(s) => write!(f, "{}", s),
            Expr::BinaryOp { op, left, right } => {
                write!(f, "{}({}, {})", op.func_name(), left, right)
            }
            Expr::UnaryOp { op, arg } => write!(f, "{}({})", op.func_name(), arg),
            Expr::InList { expr, list } => {
                write!(f, "in({}", expr)?;
                for item in list {
                    write!(f, ", {}", item)?;
                }
                write!(f, ")")
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => write!(f, "if({}, {}, {})", cond, then, otherwise),
        }
    }
}

/// Render `[e1,e2]` the way trace text lists expressions.
pub fn expr_list<'a>(exprs: impl IntoIterator<Item = &'a Expr>) -> String {
    let parts: Vec<String> = exprs.into_iter().map(|e| e.to_string()).collect();
    format!("[{}]", parts.join(","))
}
