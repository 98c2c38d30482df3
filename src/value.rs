//! Canonical value model for rows flowing through the dataflow.
//!
//! The engine has no structural-equality "any" type the way a JS host does,
//! so we fix a concrete sum type here. `Value` is the unit that `Multiset`
//! and `Index` key consolidation and joins on; it must be cheap to hash and
//! compare, since `consolidate`/`distinct`/`reduce` depend on that being
//! total (spec §9).

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single cell. Distinct variants never compare equal to one another,
/// even when their textual representation coincides (`1 != "1"`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(String),
    Array(Vec<Value>),
    Record(Row),
}

/// A namespaced relational row: `{ alias: { column: value, ... }, ... }`.
///
/// Using `BTreeMap` (rather than `HashMap`) gives rows a deterministic
/// iteration order, which in turn gives `Value::Record` a deterministic
/// `Hash`/`Ord`, which consolidation depends on.
pub type Row = BTreeMap<String, Value>;

/// The primary key assigned by the source collection to each row.
pub type PrimaryKey = Value;

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(f.0),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a.as_slice()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_record(&self) -> Option<&Row> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// SQL-style truthiness used by `where`/`having` predicates: only
    /// `Bool(true)` is truthy, everything else (including `Null`) is not.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    #[must_use]
    pub fn from_f64(f: f64) -> Self {
        Value::Float(OrderedFloat(f))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{}", x.0),
            Value::Text(s) => write!(f, "{s}"),
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Record(r) => {
                write!(f, "{{")?;
                for (i, (k, v)) in r.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Builds a namespaced row from (alias, row-or-null) pairs. Used by `from`,
/// join namespace merging, and outer-join null-padding in the compiler.
#[must_use]
pub fn namespaced(pairs: impl IntoIterator<Item = (String, Value)>) -> Row {
    pairs.into_iter().collect()
}
