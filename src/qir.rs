//! Query Intermediate Representation (spec §6.3): the plain tree the
//! compiler walks. Mirrors the wire format exactly so a caller can ship it
//! as JSON; every `Query` carries an explicit `id` so the compiler's
//! sub-query cache can key on that rather than on object identity (spec
//! §9's design note — this is a systems-language port, not a JS runtime).

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type NodeId = u64;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub id: NodeId,
    pub from: Source,
    #[serde(default)]
    pub join: Vec<Join>,
    #[serde(default, rename = "where")]
    pub where_clauses: Vec<Expr>,
    #[serde(default)]
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    #[serde(default)]
    pub order_by: Vec<Order>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub select: Option<BTreeMap<String, Expr>>,
    #[serde(default)]
    pub with: Vec<Cte>,
}

/// A `with`-clause entry: a named sub-query available to `from`/`join.from`
/// by alias within this query's scope.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cte {
    #[serde(rename = "as")]
    pub as_alias: String,
    pub query: Query,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Source {
    CollectionRef { alias: String, id: String },
    QueryRef { alias: String, query: Box<Query> },
}

impl Source {
    #[must_use]
    pub fn alias(&self) -> &str {
        match self {
            Source::CollectionRef { alias, .. } | Source::QueryRef { alias, .. } => alias,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Anti,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Join {
    #[serde(rename = "type")]
    pub kind: JoinType,
    pub from: Source,
    pub left: Expr,
    pub right: Expr,
    pub where_clause: Option<Expr>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Expr {
    Ref { path: Vec<String> },
    Val { value: Value },
    Func { name: String, args: Vec<Expr> },
    Agg { name: String, args: Vec<Expr> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringSort {
    Locale,
    Lexical,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub expression: Expr,
    pub direction: Direction,
    #[serde(default = "NullsOrder::default_last")]
    pub nulls: NullsOrder,
    #[serde(default = "StringSort::default_lexical")]
    pub string_sort: StringSort,
    pub locale: Option<String>,
}

impl NullsOrder {
    fn default_last() -> Self {
        NullsOrder::Last
    }
}

impl StringSort {
    fn default_lexical() -> Self {
        StringSort::Lexical
    }
}
