//! Binary keyed join (spec §4.5 `join`). Inner join is the primitive;
//! left/right/full/anti are expressed by composing it with `negate`,
//! `concat`, and `map`, per spec.md §9's design note (implementers may
//! special-case for performance but must preserve the same delta
//! semantics — P2/P4).

use crate::error::ExecError;
use crate::graph::{GraphBuilder, Operator, OperatorId, Reader, Writer};
use crate::index::Index;
use crate::multiset::Multiset;
use crate::operators::linear::{Concat, Map, Tee};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Maintains two `Index`es, `A` and `B`. Collects deltas across *every*
/// message received this round (not just the first — correctness
/// critical), then emits `deltaA ⋈ B_old ∪ A_old ⋈ deltaB ∪ deltaA ⋈
/// deltaB` by joining `deltaA` against `B` before appending `deltaB`, and
/// appending `deltaA` to `A` before joining `A` (now old+new) against
/// `deltaB`.
pub struct InnerJoin<K, VA, VB> {
    id: OperatorId,
    left: Reader<(K, VA)>,
    right: Reader<(K, VB)>,
    output: Writer<(K, (VA, VB))>,
    a: Index<K, VA>,
    b: Index<K, VB>,
}

impl<K, VA, VB> InnerJoin<K, VA, VB>
where
    K: Clone + Eq + Hash + 'static,
    VA: Clone + Eq + Hash + 'static,
    VB: Clone + Eq + Hash + 'static,
{
    pub fn wire(
        builder: &mut GraphBuilder,
        left: Reader<(K, VA)>,
        right: Reader<(K, VB)>,
    ) -> Reader<(K, (VA, VB))> {
        let id = builder.alloc_id();
        let mut writer: Writer<(K, (VA, VB))> = builder.writer();
        let out = writer.new_reader();
        builder.register(Box::new(InnerJoin {
            id,
            left,
            right,
            output: writer,
            a: Index::new(),
            b: Index::new(),
        }));
        out
    }
}

impl<K, VA, VB> Operator for InnerJoin<K, VA, VB>
where
    K: Clone + Eq + Hash,
    VA: Clone + Eq + Hash,
    VB: Clone + Eq + Hash,
{
    fn id(&self) -> OperatorId {
        self.id
    }

    fn has_work(&self) -> bool {
        !self.left.is_empty() || !self.right.is_empty()
    }

    fn run(&mut self) -> Result<(), ExecError> {
        let mut delta_a: Index<K, VA> = Index::new();
        for ms in self.left.drain() {
            for ((k, v), m) in ms.into_inner() {
                delta_a.add_value(k, (v, m));
            }
        }
        let mut delta_b: Index<K, VB> = Index::new();
        for ms in self.right.drain() {
            for ((k, v), m) in ms.into_inner() {
                delta_b.add_value(k, (v, m));
            }
        }

        // deltaA ⋈ B_old
        let out1 = delta_a.join(&mut self.b);
        // A now covers old+new
        self.a.append(&delta_a);
        // (A_old ∪ deltaA) ⋈ deltaB = A_old⋈deltaB ∪ deltaA⋈deltaB
        let out2 = self.a.join(&mut delta_b);
        self.b.append(&delta_b);

        let combined = out1.concat(out2);
        if !combined.is_empty() {
            self.output.send(combined);
        }
        Ok(())
    }
}

/// `anti`: keeps left rows whose key has no (net-positive) match on the
/// right. Maintains a left index and the right side's per-key running
/// count; a key's matched state can flip even on a round where the left
/// side itself wasn't touched, so touched keys are the union of both
/// sides' deltas, mirroring `reduce`'s diffing discipline.
pub struct AntiJoin<K, VA> {
    id: OperatorId,
    left: Reader<(K, VA)>,
    right: Reader<(K, ())>,
    output: Writer<(K, VA)>,
    left_index: Index<K, VA>,
    right_count: Index<K, ()>,
    last_output: HashMap<K, Multiset<VA>>,
}

impl<K, VA> AntiJoin<K, VA>
where
    K: Clone + Eq + Hash + 'static,
    VA: Clone + Eq + Hash + 'static,
{
    pub fn wire(
        builder: &mut GraphBuilder,
        left: Reader<(K, VA)>,
        right: Reader<(K, ())>,
    ) -> Reader<(K, VA)> {
        let id = builder.alloc_id();
        let mut writer: Writer<(K, VA)> = builder.writer();
        let out = writer.new_reader();
        builder.register(Box::new(AntiJoin {
            id,
            left,
            right,
            output: writer,
            left_index: Index::new(),
            right_count: Index::new(),
            last_output: HashMap::new(),
        }));
        out
    }
}

impl<K, VA> Operator for AntiJoin<K, VA>
where
    K: Clone + Eq + Hash,
    VA: Clone + Eq + Hash,
{
    fn id(&self) -> OperatorId {
        self.id
    }

    fn has_work(&self) -> bool {
        !self.left.is_empty() || !self.right.is_empty()
    }

    fn run(&mut self) -> Result<(), ExecError> {
        let mut touched: HashSet<K> = HashSet::new();
        for ms in self.left.drain() {
            for ((k, v), m) in ms.into_inner() {
                touched.insert(k.clone());
                self.left_index.add_value(k, (v, m));
            }
        }
        for ms in self.right.drain() {
            for ((k, ()), m) in ms.into_inner() {
                touched.insert(k.clone());
                self.right_count.add_value(k, ((), m));
            }
        }

        let mut diff: Vec<((K, VA), i64)> = Vec::new();
        for k in touched {
            let right_total: i64 = self.right_count.get(&k).iter().map(|(_, m)| m).sum();
            let new_output = if right_total <= 0 {
                Multiset::new(self.left_index.get(&k).to_vec()).stable_consolidate()
            } else {
                Multiset::empty()
            };
            let old_output = self.last_output.remove(&k).unwrap_or_else(Multiset::empty);
            let delta = old_output.negate().concat(new_output.clone()).consolidate();
            for (v, m) in delta.into_inner() {
                diff.push(((k.clone(), v), m));
            }
            if !new_output.is_empty() {
                self.last_output.insert(k, new_output);
            }
        }

        if !diff.is_empty() {
            self.output.send(Multiset::new(diff));
        }
        Ok(())
    }
}

/// Projects a keyed `(K, V)` stream down to its keys, value replaced by
/// `()` — what an anti-join's right-hand "does this key exist at all"
/// side needs.
fn keys_only<K, V>(builder: &mut GraphBuilder, input: Reader<(K, V)>) -> Reader<(K, ())>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + 'static,
{
    Map::wire(builder, input, |(k, _): &(K, V)| (k.clone(), ()))
}

/// `left` = inner ∪ (left rows unmatched on the right, padded with `None`).
pub fn left_join<K, VA, VB>(
    builder: &mut GraphBuilder,
    left: Reader<(K, VA)>,
    right: Reader<(K, VB)>,
) -> Reader<(K, (VA, Option<VB>))>
where
    K: Clone + Eq + Hash + 'static,
    VA: Clone + Eq + Hash + 'static,
    VB: Clone + Eq + Hash + 'static,
{
    let [left1, left2] = Tee::wire2(builder, left);
    let [right1, right2] = Tee::wire2(builder, right);

    let inner = InnerJoin::wire(builder, left1, right1);
    let matched = Map::wire(builder, inner, |(k, (a, b)): &(K, (VA, VB))| {
        (k.clone(), (a.clone(), Some(b.clone())))
    });

    let right_keys = keys_only(builder, right2);
    let unmatched = AntiJoin::wire(builder, left2, right_keys);
    let unmatched = Map::wire(builder, unmatched, |(k, a): &(K, VA)| {
        (k.clone(), (a.clone(), None))
    });

    Concat::wire(builder, matched, unmatched)
}

/// `right` = symmetric to `left_join`, with sides swapped back at the end.
pub fn right_join<K, VA, VB>(
    builder: &mut GraphBuilder,
    left: Reader<(K, VA)>,
    right: Reader<(K, VB)>,
) -> Reader<(K, (Option<VA>, VB))>
where
    K: Clone + Eq + Hash + 'static,
    VA: Clone + Eq + Hash + 'static,
    VB: Clone + Eq + Hash + 'static,
{
    let swapped = left_join(builder, right, left);
    Map::wire(builder, swapped, |(k, (b, a)): &(K, (VB, Option<VA>))| {
        (k.clone(), (a.clone(), b.clone()))
    })
}

/// `full` = inner ∪ left-anti ∪ right-anti, both sides padded with `None`
/// where unmatched on the other side.
pub fn full_join<K, VA, VB>(
    builder: &mut GraphBuilder,
    left: Reader<(K, VA)>,
    right: Reader<(K, VB)>,
) -> Reader<(K, (Option<VA>, Option<VB>))>
where
    K: Clone + Eq + Hash + 'static,
    VA: Clone + Eq + Hash + 'static,
    VB: Clone + Eq + Hash + 'static,
{
    let [l1, l2, l3] = Tee::wire3(builder, left);
    let [r1, r2, r3] = Tee::wire3(builder, right);

    let inner = InnerJoin::wire(builder, l1, r1);
    let matched = Map::wire(builder, inner, |(k, (a, b)): &(K, (VA, VB))| {
        (k.clone(), (Some(a.clone()), Some(b.clone())))
    });

    let right_keys = keys_only(builder, r2);
    let left_anti = AntiJoin::wire(builder, l2, right_keys);
    let left_anti = Map::wire(builder, left_anti, |(k, a): &(K, VA)| {
        (k.clone(), (Some(a.clone()), None))
    });

    let left_keys = keys_only(builder, l3);
    let right_anti = AntiJoin::wire(builder, r3, left_keys);
    let right_anti = Map::wire(builder, right_anti, |(k, b): &(K, VB)| {
        (k.clone(), (None, Some(b.clone())))
    });

    let partial = Concat::wire(builder, matched, left_anti);
    Concat::wire(builder, partial, right_anti)
}

/// `cross` = inner join after mapping both sides' keys to the same
/// constant — every left row matches every right row.
pub fn cross_join<VA, VB>(
    builder: &mut GraphBuilder,
    left: Reader<VA>,
    right: Reader<VB>,
) -> Reader<(VA, VB)>
where
    VA: Clone + Eq + Hash + 'static,
    VB: Clone + Eq + Hash + 'static,
{
    let keyed_left = Map::wire(builder, left, |v: &VA| ((), v.clone()));
    let keyed_right = Map::wire(builder, right, |v: &VB| ((), v.clone()));
    let joined = InnerJoin::wire(builder, keyed_left, keyed_right);
    Map::wire(builder, joined, |((), pair): &((), (VA, VB))| pair.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Writer;

    #[test]
    fn scenario_s2_inner_join_with_late_arrivals() {
        let mut b = GraphBuilder::new();
        let mut wa: Writer<(i32, &'static str)> = b.writer();
        let mut wb: Writer<(i32, &'static str)> = b.writer();
        let ra = wa.new_reader();
        let rb = wb.new_reader();
        let out = InnerJoin::wire(&mut b, ra, rb);
        let mut g = b.finalize();

        wa.send(Multiset::new(vec![((1, "a"), 1), ((2, "b"), 1)]));
        g.run().unwrap();
        let tick_a: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).collect();
        assert!(tick_a.is_empty());

        wb.send(Multiset::new(vec![
            ((1, "x"), 1),
            ((2, "y"), 1),
            ((3, "z"), 1),
        ]));
        g.run().unwrap();
        let mut tick_b: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).collect();
        tick_b.sort_by_key(|((k, _), _)| *k);
        assert_eq!(
            tick_b,
            vec![((1, ("a", "x")), 1), ((2, ("b", "y")), 1)]
        );
    }

    #[test]
    fn p4_join_is_invariant_under_splitting_a_delta_across_ticks() {
        let combined = {
            let mut b = GraphBuilder::new();
            let mut wa: Writer<(i32, &'static str)> = b.writer();
            let mut wb: Writer<(i32, &'static str)> = b.writer();
            let ra = wa.new_reader();
            let rb = wb.new_reader();
            let out = InnerJoin::wire(&mut b, ra, rb);
            let mut g = b.finalize();
            wa.send(Multiset::new(vec![((1, "a"), 1), ((2, "b"), 1)]));
            wb.send(Multiset::new(vec![((1, "x"), 1), ((2, "y"), 1)]));
            g.run().unwrap();
            let mut v: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).collect();
            v.sort();
            v
        };

        let split = {
            let mut b = GraphBuilder::new();
            let mut wa: Writer<(i32, &'static str)> = b.writer();
            let mut wb: Writer<(i32, &'static str)> = b.writer();
            let ra = wa.new_reader();
            let rb = wb.new_reader();
            let out = InnerJoin::wire(&mut b, ra, rb);
            let mut g = b.finalize();
            wa.send(Multiset::new(vec![((1, "a"), 1)]));
            g.run().unwrap();
            wb.send(Multiset::new(vec![((1, "x"), 1)]));
            g.run().unwrap();
            wa.send(Multiset::new(vec![((2, "b"), 1)]));
            g.run().unwrap();
            wb.send(Multiset::new(vec![((2, "y"), 1)]));
            g.run().unwrap();
            let mut v: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).collect();
            v.sort();
            v
        };

        assert_eq!(
            Multiset::new(combined).consolidate(),
            Multiset::new(split).consolidate()
        );
    }

    #[test]
    fn anti_join_keeps_only_unmatched_left_rows() {
        let mut b = GraphBuilder::new();
        let mut wa: Writer<(i32, &'static str)> = b.writer();
        let mut wb: Writer<(i32, ())> = b.writer();
        let ra = wa.new_reader();
        let rb = wb.new_reader();
        let out = AntiJoin::wire(&mut b, ra, rb);
        let mut g = b.finalize();

        wa.send(Multiset::new(vec![((1, "a"), 1), ((2, "b"), 1)]));
        wb.send(Multiset::new(vec![((1, ()), 1)]));
        g.run().unwrap();

        let got: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).collect();
        assert_eq!(got, vec![((2, "b"), 1)]);
    }

    #[test]
    fn left_join_pads_unmatched_rows_with_none() {
        let mut b = GraphBuilder::new();
        let mut wa: Writer<(i32, &'static str)> = b.writer();
        let mut wb: Writer<(i32, &'static str)> = b.writer();
        let ra = wa.new_reader();
        let rb = wb.new_reader();
        let out = left_join(&mut b, ra, rb);
        let mut g = b.finalize();

        wa.send(Multiset::new(vec![((1, "a"), 1), ((2, "b"), 1)]));
        wb.send(Multiset::new(vec![((1, "x"), 1)]));
        g.run().unwrap();

        let mut got: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).collect();
        got.sort_by_key(|((k, _), _)| *k);
        assert_eq!(
            got,
            vec![
                ((1, ("a", Some("x"))), 1),
                ((2, ("b", None)), 1),
            ]
        );
    }
}
