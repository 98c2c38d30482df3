//! Transforms between unkeyed and keyed stream form (spec §4.5).

use crate::graph::{GraphBuilder, Reader};
use crate::operators::linear::Map;
use std::hash::Hash;

/// `keyBy(f)`: maps `v` to `(f(v), v)`.
pub fn key_by<V, K>(
    builder: &mut GraphBuilder,
    input: Reader<V>,
    f: impl Fn(&V) -> K + 'static,
) -> Reader<(K, V)>
where
    V: Clone + 'static,
    K: Clone + Eq + Hash + 'static,
{
    Map::wire(builder, input, move |v: &V| (f(v), v.clone()))
}

/// `unkey`: drops the key.
pub fn unkey<K, V>(builder: &mut GraphBuilder, input: Reader<(K, V)>) -> Reader<V>
where
    K: Clone + 'static,
    V: Clone + 'static,
{
    Map::wire(builder, input, |(_, v): &(K, V)| v.clone())
}

/// `rekey(f)`: swaps keys, keeping the same value.
pub fn rekey<K1, K2, V>(
    builder: &mut GraphBuilder,
    input: Reader<(K1, V)>,
    f: impl Fn(&K1, &V) -> K2 + 'static,
) -> Reader<(K2, V)>
where
    K1: Clone + 'static,
    K2: Clone + Eq + Hash + 'static,
    V: Clone + 'static,
{
    Map::wire(builder, input, move |(k, v): &(K1, V)| (f(k, v), v.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, Writer};
    use crate::multiset::Multiset;

    #[test]
    fn key_by_then_unkey_round_trips() {
        let mut b = GraphBuilder::new();
        let mut root: Writer<i32> = b.writer();
        let r0 = root.new_reader();
        let keyed = key_by(&mut b, r0, |v: &i32| v % 2);
        let back = unkey(&mut b, keyed);
        let mut g = b.finalize();

        root.send(Multiset::new(vec![(1, 1), (2, 1)]));
        g.run().unwrap();

        let mut got: Vec<_> = back.drain().into_iter().flat_map(Multiset::into_inner).collect();
        got.sort();
        assert_eq!(got, vec![(1, 1), (2, 1)]);
    }
}
