//! Stream edges and the dataflow graph (spec §4.3/§4.4).
//!
//! Edges are one-writer/many-reader FIFO queues carrying `Multiset<T>`.
//! Operators are nodes with N readers and (usually) one writer; they
//! register with a [`GraphBuilder`] on construction and get a
//! monotonically increasing [`OperatorId`]. `finalize()` consumes the
//! builder and returns an immutable [`Graph`] — the two-phase
//! builder/finalized split spec.md §9 recommends for a systems-language
//! port, which makes "mutate a finalized graph" a compile-time
//! impossibility rather than a runtime check.

use crate::error::{ExecError, GraphError};
use crate::multiset::Multiset;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

pub type OperatorId = usize;

/// Identifies which [`GraphBuilder`] a stream was allocated from, so that
/// wiring a reader from one graph into an operator of another is caught
/// rather than silently accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GraphId(u64);

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

type Queue<T> = Rc<RefCell<VecDeque<Multiset<T>>>>;

/// A reader end of a stream edge: one reader's private FIFO.
pub struct Reader<T> {
    graph_id: GraphId,
    queue: Queue<T>,
}

impl<T> Reader<T> {
    #[must_use]
    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Returns all queued multisets in insertion order and empties the queue.
    pub fn drain(&self) -> Vec<Multiset<T>> {
        self.queue.borrow_mut().drain(..).collect()
    }
}

/// A writer end of a stream edge. Can spawn any number of independent
/// readers; `send` pushes to every reader's queue.
pub struct Writer<T> {
    graph_id: GraphId,
    readers: Vec<Queue<T>>,
}

impl<T> Writer<T> {
    fn new(graph_id: GraphId) -> Self {
        Writer {
            graph_id,
            readers: Vec::new(),
        }
    }

    #[must_use]
    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    pub fn new_reader(&mut self) -> Reader<T> {
        let queue: Queue<T> = Rc::new(RefCell::new(VecDeque::new()));
        self.readers.push(Rc::clone(&queue));
        Reader {
            graph_id: self.graph_id,
            queue,
        }
    }
}

impl<T: Clone> Writer<T> {
    /// Pushes `ms` onto every reader's queue. The sequence a reader
    /// observes matches the order `send` was called, across all readers.
    pub fn send(&self, ms: Multiset<T>) {
        for q in &self.readers {
            q.borrow_mut().push_back(ms.clone());
        }
    }
}

/// Verifies two stream ends were allocated from the same graph before an
/// operator wires them together (e.g. a binary join's two inputs).
pub fn require_same_graph<A, B>(a: &Reader<A>, b: &Reader<B>) -> Result<(), GraphError> {
    if a.graph_id() == b.graph_id() {
        Ok(())
    } else {
        Err(GraphError::CrossGraphWiring { op: 0, other: 0 })
    }
}

/// A dataflow node: N readers, usually one writer, private state.
pub trait Operator {
    fn id(&self) -> OperatorId;
    fn has_work(&self) -> bool;
    fn run(&mut self) -> Result<(), ExecError>;
}

/// Builder: owns the monotonic operator-id counter and the set of
/// operators/streams created so far. Structural changes are only possible
/// through this type; `finalize()` consumes it.
pub struct GraphBuilder {
    graph_id: GraphId,
    next_op_id: OperatorId,
    operators: Vec<Box<dyn Operator>>,
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        let graph_id = GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed));
        GraphBuilder {
            graph_id,
            next_op_id: 0,
            operators: Vec::new(),
        }
    }

    #[must_use]
    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    /// Allocates a fresh, strictly-increasing operator id.
    pub fn alloc_id(&mut self) -> OperatorId {
        let id = self.next_op_id;
        self.next_op_id += 1;
        id
    }

    /// Allocates a new stream edge's writer, owned by this graph.
    #[must_use]
    pub fn writer<T>(&self) -> Writer<T> {
        Writer::new(self.graph_id)
    }

    /// Registers a constructed operator. The compiler calls this
    /// immediately after building each operator, in data-flow (upstream
    /// first) order, which is what gives `finalize`'s execution order its
    /// topological property "for free".
    pub fn register(&mut self, op: Box<dyn Operator>) {
        self.operators.push(op);
    }

    /// Number of operators registered so far.
    #[must_use]
    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }

    /// Freezes topology and returns the immutable, ordered graph.
    #[must_use]
    pub fn finalize(self) -> Graph {
        Graph {
            operators: self.operators,
        }
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The finalized, execution-ready graph. Topology is immutable; only
/// operator-private state changes across ticks.
pub struct Graph {
    operators: Vec<Box<dyn Operator>>,
}

impl Graph {
    /// One round: iterate operators in construction-id order, invoking
    /// `run()` on any with a non-empty input queue. A single pass is
    /// sufficient because the graph is acyclic and operators are
    /// registered upstream-first.
    pub fn run(&mut self) -> Result<(), ExecError> {
        for op in &mut self.operators {
            if op.has_work() {
                op.run()?;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_drains_in_insertion_order() {
        let mut w: Writer<i32> = Writer::new(GraphId(1));
        let r = w.new_reader();
        w.send(Multiset::new(vec![(1, 1)]));
        w.send(Multiset::new(vec![(2, 1)]));
        let drained = r.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].inner(), &[(1, 1)]);
        assert_eq!(drained[1].inner(), &[(2, 1)]);
        assert!(r.is_empty());
    }

    #[test]
    fn multiple_readers_observe_the_same_sequence() {
        let mut w: Writer<i32> = Writer::new(GraphId(1));
        let r1 = w.new_reader();
        let r2 = w.new_reader();
        w.send(Multiset::new(vec![(1, 1)]));
        assert_eq!(r1.drain(), r2.drain());
    }

    #[test]
    fn cross_graph_wiring_is_rejected() {
        let b1 = GraphBuilder::new();
        let b2 = GraphBuilder::new();
        let mut w1: Writer<i32> = b1.writer();
        let mut w2: Writer<i32> = b2.writer();
        let r1 = w1.new_reader();
        let r2 = w2.new_reader();
        assert!(require_same_graph(&r1, &r2).is_err());
    }

    #[test]
    fn operator_ids_are_monotone() {
        let mut b = GraphBuilder::new();
        let ids: Vec<_> = (0..5).map(|_| b.alloc_id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }
}
