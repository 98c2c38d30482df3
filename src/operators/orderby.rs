//! `order-by` (spec §4.5): rekeys the stream to a single sentinel key,
//! applies top-K (with or without a fractional index), joins the ordered
//! keys back against the original stream to restore full payloads, and
//! consolidates.

use crate::graph::{GraphBuilder, Reader};
use crate::operators::consolidate::Consolidate;
use crate::operators::join::InnerJoin;
use crate::operators::linear::{Map, Tee};
use crate::operators::topk::{frac_top_k, top_k, TopKBackend};
use std::hash::Hash;

/// Plain order-by: output carries only the restored `(K, V)` pairs, in no
/// particular stream order (ordering is expressed by which rows survive
/// the window, not by emission order — callers needing position use
/// [`order_by_with_frac_index`]).
pub fn order_by<K, V, S>(
    builder: &mut GraphBuilder,
    input: Reader<(K, V)>,
    sort_key: impl Fn(&V) -> S + 'static,
    limit: usize,
    offset: usize,
) -> Reader<(K, V)>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + Eq + Hash + 'static,
    S: Clone + Eq + Hash + Ord + 'static,
{
    let [input1, input2] = Tee::wire2(builder, input);

    let sentinel = Map::wire(builder, input1, move |(k, v): &(K, V)| ((), (sort_key(v), k.clone())));
    let ranked = top_k(builder, sentinel, limit, offset, |a: &(S, K), b: &(S, K)| a.0.cmp(&b.0));
    let ranked_keys = Map::wire(builder, ranked, |((), (_, k)): &((), (S, K))| (k.clone(), ()));

    let joined = InnerJoin::wire(builder, ranked_keys, input2);
    let restored = Map::wire(builder, joined, |(k, ((), v)): &(K, ((), V))| (k.clone(), v.clone()));
    Consolidate::wire(builder, restored)
}

/// Order-by with a stable fractional index (spec §4.9) attached to each
/// surviving row, for callers rendering an ordered list.
pub fn order_by_with_frac_index<K, V, S>(
    builder: &mut GraphBuilder,
    input: Reader<(K, V)>,
    sort_key: impl Fn(&V) -> S + 'static,
    limit: usize,
    offset: usize,
    backend: TopKBackend,
) -> Reader<(K, (V, String))>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + Eq + Hash + 'static,
    S: Clone + Eq + Hash + Ord + 'static,
{
    let [input1, input2] = Tee::wire2(builder, input);

    let sentinel = Map::wire(builder, input1, move |(k, v): &(K, V)| ((), (sort_key(v), k.clone())));
    let ranked = frac_top_k(builder, sentinel, limit, offset, |a: &(S, K), b: &(S, K)| a.0.cmp(&b.0), backend);
    let ranked_keys = Map::wire(builder, ranked, |((), ((_, k), frac)): &((), ((S, K), String))| (k.clone(), frac.clone()));

    let joined = InnerJoin::wire(builder, ranked_keys, input2);
    let restored = Map::wire(builder, joined, |(k, (frac, v)): &(K, (String, V))| (k.clone(), (v.clone(), frac.clone())));
    Consolidate::wire(builder, restored)
}
