//! Error taxonomy (spec §7): `CompileError`, `ExecError`, `GraphError`,
//! unified behind `EngineError` for callers that don't need to distinguish.
//!
//! Modeled on the teacher's `protocol::error::InputLayerError` /
//! `storage::error::StorageError`: struct-like variants carrying the
//! offending names, `#[error("...")]` templates, `#[from]` where a
//! sub-error wraps a foreign error type.

use thiserror::Error;

/// Malformed QIR, raised synchronously at compile time. No partial graph
/// is left behind when this is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("query has no `from` source")]
    MissingFrom,

    #[error("unknown input alias: {alias}")]
    UnknownInput { alias: String },

    #[error("duplicate CTE name: {name}")]
    DuplicateCteName { name: String },

    #[error("CTE is missing an `as` alias")]
    CteMissingAlias,

    #[error("CTE `{name}` recurses into itself")]
    CteRecurses { name: String },

    #[error("`limit`/`offset` requires `orderBy`")]
    LimitOffsetWithoutOrderBy,

    #[error("unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("empty property reference path")]
    EmptyRefPath,

    #[error("aggregate `{name}` used outside group-by scope")]
    AggregateOutsideGroupBy { name: String },

    #[error("invalid join type: {kind}")]
    InvalidJoinType { kind: String },
}

/// Raised from within a predicate/function during a tick.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    #[error("invalid date value: {message}")]
    InvalidDate { message: String },

    #[error("invalid json: {message}")]
    InvalidJson { message: String },

    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },

    #[error("attempted to evaluate an aggregate expression outside group-by")]
    AggregateEvaluatedDirectly,
}

/// Attempting to mutate a finalized graph, or wiring streams across graphs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("graph is already finalized; structure is frozen")]
    AlreadyFinalized,

    #[error("operator {op} belongs to a different graph than operator {other}")]
    CrossGraphWiring { op: usize, other: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}
