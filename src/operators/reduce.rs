//! Keyed aggregate operator (spec §4.5 `reduce`): the workhorse that
//! group-by's aggregates and top-K are built from.

use crate::error::ExecError;
use crate::graph::{GraphBuilder, Operator, OperatorId, Reader, Writer};
use crate::multiset::Multiset;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// `reduce(fn)`: input is keyed `(K, V)`. Maintains `by_key: K ->
/// Multiset<V>`. Per round, computes the set of keys touched, applies
/// `fn(values)` per touched key to produce the new output list, and emits
/// the diff against the previously-emitted output for that key. An empty
/// new output means the key disappears from the output entirely.
pub struct Reduce<K, V, O, F> {
    id: OperatorId,
    input: Reader<(K, V)>,
    output: Writer<(K, O)>,
    by_key: HashMap<K, Multiset<V>>,
    last_output: HashMap<K, Multiset<O>>,
    f: F,
}

impl<K, V, O, F> Reduce<K, V, O, F>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + Eq + Hash + 'static,
    O: Clone + Eq + Hash + 'static,
    F: FnMut(&Multiset<V>) -> Multiset<O> + 'static,
{
    pub fn wire(builder: &mut GraphBuilder, input: Reader<(K, V)>, f: F) -> Reader<(K, O)> {
        let id = builder.alloc_id();
        let mut writer: Writer<(K, O)> = builder.writer();
        let out = writer.new_reader();
        builder.register(Box::new(Reduce {
            id,
            input,
            output: writer,
            by_key: HashMap::new(),
            last_output: HashMap::new(),
            f,
        }));
        out
    }
}

impl<K, V, O, F> Operator for Reduce<K, V, O, F>
where
    K: Clone + Eq + Hash,
    V: Clone + Eq + Hash,
    O: Clone + Eq + Hash,
    F: FnMut(&Multiset<V>) -> Multiset<O>,
{
    fn id(&self) -> OperatorId {
        self.id
    }

    fn has_work(&self) -> bool {
        !self.input.is_empty()
    }

    fn run(&mut self) -> Result<(), ExecError> {
        let mut touched: HashSet<K> = HashSet::new();
        for ms in self.input.drain() {
            for ((k, v), m) in ms.into_inner() {
                self.by_key.entry(k.clone()).or_default().concat_in_place(v, m);
                touched.insert(k);
            }
        }

        let mut diff: Vec<((K, O), i64)> = Vec::new();
        for k in touched {
            let group = self
                .by_key
                .get(&k)
                .cloned()
                .unwrap_or_else(Multiset::empty)
                .stable_consolidate();
            self.by_key.insert(k.clone(), group.clone());

            let new_output = (self.f)(&group).stable_consolidate();
            let old_output = self.last_output.remove(&k).unwrap_or_else(Multiset::empty);

            let delta = old_output.negate().concat(new_output.clone()).consolidate();
            for (o, m) in delta.into_inner() {
                diff.push(((k.clone(), o), m));
            }

            if new_output.is_empty() {
                self.by_key.remove(&k);
            } else {
                self.last_output.insert(k, new_output);
            }
        }

        if !diff.is_empty() {
            self.output.send(Multiset::new(diff));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Writer;

    #[test]
    fn reduce_emits_sum_and_retracts_on_empty_group() {
        let mut b = GraphBuilder::new();
        let mut root: Writer<(&'static str, i64)> = b.writer();
        let r0 = root.new_reader();
        let out = Reduce::wire(&mut b, r0, |values: &Multiset<i64>| {
            if values.inner().is_empty() {
                return Multiset::empty();
            }
            let total: i64 = values.inner().iter().map(|(v, m)| v * m).sum();
            Multiset::new(vec![(total, 1)])
        });
        let mut g = b.finalize();

        root.send(Multiset::new(vec![(("k", 10), 1), (("k", 20), 1)]));
        g.run().unwrap();
        let mut first: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).collect();
        first.sort();
        assert_eq!(first, vec![(("k", 30), 1)]);

        // Retract both inputs: the group becomes empty and the key disappears.
        root.send(Multiset::new(vec![(("k", 10), -1), (("k", 20), -1)]));
        g.run().unwrap();
        let mut second: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).collect();
        second.sort();
        assert_eq!(second, vec![(("k", 30), -1)]);
    }
}
