//! Keyed multiset storage (spec §4.2), grounded on the teacher's
//! `hash_index.rs` shape (`HashMap<Key, Vec<Value>>` with lazy
//! maintenance) but specialized to incremental-join's append/compact/join
//! contract instead of a static build-once index.

use crate::multiset::Multiset;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Per-key multiset store. Compaction is lazy: a key is only re-summed
/// when it is read after having been touched (spec's "Index compaction"
/// invariant).
#[derive(Clone, Debug, Default)]
pub struct Index<K, V> {
    map: HashMap<K, Vec<(V, i64)>>,
    dirty: HashSet<K>,
}

impl<K: Eq + Hash + Clone, V: Eq + Hash + Clone> Index<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Index {
            map: HashMap::new(),
            dirty: HashSet::new(),
        }
    }

    /// Append a single `(v, m)` pair under key `k`; marks `k` dirty.
    pub fn add_value(&mut self, k: K, pair: (V, i64)) {
        self.map.entry(k.clone()).or_default().push(pair);
        self.dirty.insert(k);
    }

    /// Merge another index's entries in; marks every touched key dirty.
    pub fn append(&mut self, other: &Index<K, V>) {
        for (k, pairs) in &other.map {
            self.map.entry(k.clone()).or_default().extend(pairs.iter().cloned());
            self.dirty.insert(k.clone());
        }
    }

    /// Lazily compact `k` (sum multiplicities of equal `v`, drop zeros)
    /// and return its current pair list. May be empty.
    pub fn get(&mut self, k: &K) -> &[(V, i64)] {
        if self.dirty.remove(k) {
            if let Some(pairs) = self.map.get_mut(k) {
                compact(pairs);
            }
        }
        self.map.get(k).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    #[must_use]
    pub fn contains_key(&self, k: &K) -> bool {
        self.map.contains_key(k)
    }

    /// Produce `(k, (v_a, v_b))` for all pairs of compacted entries sharing
    /// a key with `other`; multiplicity is the product, zero products
    /// omitted. Restricted to keys present in both indexes.
    pub fn join<V2: Eq + Hash + Clone>(
        &mut self,
        other: &mut Index<K, V2>,
    ) -> Multiset<(K, (V, V2))> {
        let shared: Vec<K> = self
            .map
            .keys()
            .filter(|k| other.contains_key(k))
            .cloned()
            .collect();
        let mut out = Vec::new();
        for k in shared {
            let left: Vec<(V, i64)> = self.get(&k).to_vec();
            let right: Vec<(V2, i64)> = other.get(&k).to_vec();
            for (lv, lm) in &left {
                for (rv, rm) in &right {
                    let product = lm * rm;
                    if product != 0 {
                        out.push(((k.clone(), (lv.clone(), rv.clone())), product));
                    }
                }
            }
        }
        Multiset::new(out)
    }
}

fn compact<V: Eq + Hash + Clone>(pairs: &mut Vec<(V, i64)>) {
    let mut totals: HashMap<V, i64> = HashMap::with_capacity(pairs.len());
    for (v, m) in pairs.drain(..) {
        *totals.entry(v).or_insert(0) += m;
    }
    *pairs = totals.into_iter().filter(|(_, m)| *m != 0).collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compaction_drops_zero_entries_on_read() {
        let mut idx: Index<i32, &'static str> = Index::new();
        idx.add_value(1, ("a", 2));
        idx.add_value(1, ("a", -2));
        idx.add_value(1, ("b", 1));
        let got = idx.get(&1).to_vec();
        assert_eq!(got, vec![("b", 1)]);
    }

    #[test]
    fn join_restricts_to_shared_keys_and_multiplies() {
        let mut a: Index<i32, &'static str> = Index::new();
        a.add_value(1, ("x", 2));
        a.add_value(2, ("y", 1));
        let mut b: Index<i32, &'static str> = Index::new();
        b.add_value(1, ("p", 3));
        b.add_value(3, ("q", 1));

        let out = a.join(&mut b).consolidate();
        let mut inner = out.into_inner();
        inner.sort_by_key(|((k, _), _)| *k);
        assert_eq!(inner, vec![((1, ("x", "p")), 6)]);
    }

    #[test]
    fn append_marks_touched_keys_dirty() {
        let mut a: Index<i32, &'static str> = Index::new();
        a.add_value(1, ("a", 1));
        let _ = a.get(&1); // clears dirty

        let mut b: Index<i32, &'static str> = Index::new();
        b.add_value(1, ("a", 1));
        b.add_value(1, ("b", 1));

        a.append(&b);
        let got = a.get(&1).to_vec();
        let mut sorted = got;
        sorted.sort();
        assert_eq!(sorted, vec![("a", 2), ("b", 1)]);
    }
}
