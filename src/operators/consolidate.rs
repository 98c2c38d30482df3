//! `consolidate()` (spec §4.5): the only round-scoped buffer in the core.
//! Accumulates every multiset queued since the last tick and emits a
//! single consolidated multiset per round; an empty round emits nothing.

use crate::error::ExecError;
use crate::graph::{GraphBuilder, Operator, OperatorId, Reader, Writer};
use crate::multiset::Multiset;
use std::hash::Hash;

pub struct Consolidate<T> {
    id: OperatorId,
    input: Reader<T>,
    output: Writer<T>,
}

impl<T: Clone + Eq + Hash + 'static> Consolidate<T> {
    pub fn wire(builder: &mut GraphBuilder, input: Reader<T>) -> Reader<T> {
        let id = builder.alloc_id();
        let mut writer: Writer<T> = builder.writer();
        let out = writer.new_reader();
        builder.register(Box::new(Consolidate {
            id,
            input,
            output: writer,
        }));
        out
    }
}

impl<T: Clone + Eq + Hash> Operator for Consolidate<T> {
    fn id(&self) -> OperatorId {
        self.id
    }

    fn has_work(&self) -> bool {
        !self.input.is_empty()
    }

    fn run(&mut self) -> Result<(), ExecError> {
        let mut acc = Multiset::empty();
        for ms in self.input.drain() {
            acc = acc.concat(ms);
        }
        let acc = acc.consolidate();
        if !acc.is_empty() {
            self.output.send(acc);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Writer;

    #[test]
    fn empty_round_emits_nothing() {
        // P7: round idempotence.
        let mut b = GraphBuilder::new();
        let mut root: Writer<i32> = b.writer();
        let r0 = root.new_reader();
        let out = Consolidate::wire(&mut b, r0);
        let mut g = b.finalize();

        root.send(Multiset::new(vec![(1, 1)]));
        g.run().unwrap();
        let _ = out.drain();

        g.run().unwrap();
        assert!(out.drain().is_empty());
    }

    #[test]
    fn accumulates_across_the_round_and_drops_zeros() {
        let mut b = GraphBuilder::new();
        let mut root: Writer<i32> = b.writer();
        let r0 = root.new_reader();
        let out = Consolidate::wire(&mut b, r0);
        let mut g = b.finalize();

        root.send(Multiset::new(vec![(1, 1)]));
        root.send(Multiset::new(vec![(1, -1), (2, 1)]));
        g.run().unwrap();

        let got: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).collect();
        assert_eq!(got, vec![(2, 1)]);
    }
}
