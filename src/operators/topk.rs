//! Top-K (spec §4.5/§9): windowed re-ranking of a keyed group. Two flavors:
//! [`top_k`] emits plain ranked rows, [`frac_top_k`] additionally assigns
//! each row a stable fractional-index string (spec §4.9) so that a caller
//! rendering an ordered list only has to move the rows whose neighbours
//! actually changed, not renumber the whole window.
//!
//! Both are built on the same materialize-the-group approach as
//! [`crate::operators::reduce::Reduce`]: ranking a bag inherently needs the
//! whole group in hand, there is no way around that. `frac_top_k` takes a
//! [`TopKBackend`] choosing how the previous window is kept between rounds
//! purely as an implementation-texture choice (`Array`: a plain `Vec` in
//! window order; `BTree`: a `BTreeMap` keyed by the fractional index
//! string, the representation an ordered-list store would actually use) —
//! the two backends are observably identical.

use crate::error::ExecError;
use crate::graph::{GraphBuilder, Operator, OperatorId, Reader, Writer};
use crate::multiset::Multiset;
use crate::operators::frac_index;
use crate::operators::reduce::Reduce;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

/// Which structure a [`frac_top_k`] window uses to remember the previous
/// round's ordering between rounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopKBackend {
    Array,
    BTree,
}

/// Plain top-K: sort each group with `cmp`, keep `[offset, offset +
/// limit)`. Ties break by insertion order (first-wins), matching the
/// stable ordering `Reduce`'s group materialization already preserves.
pub fn top_k<K, V>(
    builder: &mut GraphBuilder,
    input: Reader<(K, V)>,
    limit: usize,
    offset: usize,
    mut cmp: impl FnMut(&V, &V) -> Ordering + 'static,
) -> Reader<(K, V)>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + Eq + Hash + 'static,
{
    Reduce::wire(builder, input, move |values: &Multiset<V>| {
        let rows = materialize(values);
        let mut sorted = rows;
        sorted.sort_by(|a, b| cmp(a, b));
        let window: Vec<(V, i64)> = sorted.into_iter().skip(offset).take(limit).map(|v| (v, 1)).collect();
        Multiset::new(window)
    })
}

fn materialize<V: Clone>(values: &Multiset<V>) -> Vec<V> {
    let mut rows = Vec::with_capacity(values.len());
    for (v, m) in values.iter() {
        if *m <= 0 {
            continue;
        }
        for _ in 0..*m {
            rows.push(v.clone());
        }
    }
    rows
}

enum WindowState<V> {
    Array(Vec<(V, String)>),
    BTree(BTreeMap<String, V>),
}

impl<V: Clone> WindowState<V> {
    fn as_pairs(&self) -> Vec<(V, String)> {
        match self {
            WindowState::Array(v) => v.clone(),
            WindowState::BTree(m) => m.iter().map(|(k, v)| (v.clone(), k.clone())).collect(),
        }
    }

    fn from_pairs(backend: TopKBackend, pairs: Vec<(V, String)>) -> Self {
        match backend {
            TopKBackend::Array => WindowState::Array(pairs),
            TopKBackend::BTree => WindowState::BTree(pairs.into_iter().map(|(v, k)| (k, v)).collect()),
        }
    }
}

/// Free-function form of [`FracTopK::wire`], matching [`top_k`]'s calling
/// convention.
pub fn frac_top_k<K, V>(
    builder: &mut GraphBuilder,
    input: Reader<(K, V)>,
    limit: usize,
    offset: usize,
    cmp: impl FnMut(&V, &V) -> Ordering + 'static,
    backend: TopKBackend,
) -> Reader<(K, (V, String))>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + Eq + Hash + 'static,
{
    FracTopK::wire(builder, input, limit, offset, cmp, backend)
}

/// Fractional-index top-K: like [`top_k`], but output rows are `(value,
/// frac_key)` pairs. A value that stays within the window keeps the same
/// `frac_key` across rounds as long as its immediate neighbours haven't
/// changed; only newly-entered rows get a freshly minted key, computed as
/// the midpoint between the (possibly also new) keys on either side.
pub struct FracTopK<K, V, F> {
    id: OperatorId,
    input: Reader<(K, V)>,
    output: Writer<(K, (V, String))>,
    by_key: HashMap<K, Multiset<V>>,
    windows: HashMap<K, WindowState<V>>,
    limit: usize,
    offset: usize,
    cmp: F,
    backend: TopKBackend,
}

impl<K, V, F> FracTopK<K, V, F>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + Eq + Hash + 'static,
    F: FnMut(&V, &V) -> Ordering + 'static,
{
    pub fn wire(
        builder: &mut GraphBuilder,
        input: Reader<(K, V)>,
        limit: usize,
        offset: usize,
        cmp: F,
        backend: TopKBackend,
    ) -> Reader<(K, (V, String))> {
        let id = builder.alloc_id();
        let mut writer: Writer<(K, (V, String))> = builder.writer();
        let out = writer.new_reader();
        builder.register(Box::new(FracTopK {
            id,
            input,
            output: writer,
            by_key: HashMap::new(),
            windows: HashMap::new(),
            limit,
            offset,
            cmp,
            backend,
        }));
        out
    }
}

impl<K, V, F> Operator for FracTopK<K, V, F>
where
    K: Clone + Eq + Hash,
    V: Clone + Eq + Hash,
    F: FnMut(&V, &V) -> Ordering,
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

        let mut diff: Vec<((K, (V, String)), i64)> = Vec::new();
        for k in touched {
            let group = self
                .by_key
                .get(&k)
                .cloned()
                .unwrap_or_else(Multiset::empty)
                .stable_consolidate();
            if group.is_empty() {
                self.by_key.remove(&k);
            } else {
                self.by_key.insert(k.clone(), group.clone());
            }

            let mut rows = materialize(&group);
            rows.sort_by(|a, b| (self.cmp)(a, b));
            let new_values: Vec<V> = rows.into_iter().skip(self.offset).take(self.limit).collect();

            let old_window = self.windows.remove(&k).map(|w| w.as_pairs()).unwrap_or_default();
            let new_window = assign_keys(new_values, &old_window);

            let old_output: Multiset<(V, String)> = Multiset::new(old_window.iter().map(|p| (p.clone(), 1)).collect());
            let new_output: Multiset<(V, String)> = Multiset::new(new_window.iter().map(|p| (p.clone(), 1)).collect());
            let delta = old_output.negate().concat(new_output).consolidate();
            for (o, m) in delta.into_inner() {
                diff.push(((k.clone(), o), m));
            }

            if new_window.is_empty() {
                self.windows.remove(&k);
            } else {
                self.windows.insert(k, WindowState::from_pairs(self.backend, new_window));
            }
        }

        if !diff.is_empty() {
            self.output.send(Multiset::new(diff));
        }
        Ok(())
    }
}

/// Reuses a frac key for every value present in both `old_window` and
/// `new_values`; fills every gap left-to-right with the midpoint between
/// its (possibly just-assigned) neighbours.
fn assign_keys<V: Clone + Eq + Hash>(new_values: Vec<V>, old_window: &[(V, String)]) -> Vec<(V, String)> {
    let mut old_map: HashMap<V, String> = old_window.iter().cloned().collect();

    let mut result: Vec<(V, Option<String>)> = new_values
        .into_iter()
        .map(|v| {
            let key = old_map.remove(&v);
            (v, key)
        })
        .collect();

    for i in 0..result.len() {
        if result[i].1.is_some() {
            continue;
        }
        let prev = if i == 0 { None } else { result[i - 1].1.clone() };
        let next = result[(i + 1)..].iter().find_map(|(_, k)| k.clone());
        let new_key = frac_index::between(prev.as_deref(), next.as_deref());
        result[i].1 = Some(new_key);
    }

    result.into_iter().map(|(v, k)| (v, k.expect("filled above"))).collect()
}
