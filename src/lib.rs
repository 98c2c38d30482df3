//! Incremental view maintenance engine: a differential-style dataflow
//! core (multisets, keyed indexes, a FIFO-edge graph of operators) and a
//! relational query compiler that turns a compiled QIR tree into a wired
//! pipeline over that core.
//!
//! Top-level flow: [`qir::Query`] → [`compiler::compile`] → a
//! [`graph::Graph`] of [`operators`] → repeated [`graph::Graph::run`]
//! ticks, each consuming a round of input [`multiset::Multiset`] deltas
//! and producing the corresponding output deltas.

pub mod compiler;
pub mod config;
pub mod error;
pub mod eval;
pub mod graph;
pub mod index;
pub mod multiset;
pub mod operators;
pub mod qir;
pub mod value;

pub use error::{CompileError, EngineError, ExecError, GraphError};
pub use graph::{Graph, GraphBuilder, Reader, Writer};
pub use multiset::Multiset;
pub use value::{PrimaryKey, Row, Value};
