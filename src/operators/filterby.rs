//! `filter-by(other)` (spec §4.5): a semi-join. Keeps left rows whose key
//! has a net-positive match in `other`; built directly on `Index::join`
//! the same way `InnerJoin` is, but discards the right-hand payload.

use crate::graph::{GraphBuilder, Reader};
use crate::operators::distinct::Distinct;
use crate::operators::join::InnerJoin;
use crate::operators::linear::Map;
use std::hash::Hash;

/// Keeps every `(K, VA)` row from `left` whose key also appears (with
/// positive multiplicity) in `other`, dropping `other`'s payload.
///
/// `other` is reduced to key-presence at multiplicity 1 before the join —
/// without this, a key with right-side multiplicity > 1 (duplicate match
/// rows, or an `other` carrying multiplicity itself) would scale the left
/// row's own multiplicity by the match count instead of just gating its
/// presence.
pub fn filter_by<K, VA>(
    builder: &mut GraphBuilder,
    left: Reader<(K, VA)>,
    other: Reader<(K, ())>,
) -> Reader<(K, VA)>
where
    K: Clone + Eq + Hash + 'static,
    VA: Clone + Eq + Hash + 'static,
{
    let present = Distinct::wire(builder, other, |(k, ()): &(K, ())| k.clone());
    let joined = InnerJoin::wire(builder, left, present);
    Map::wire(builder, joined, |(k, (a, ())): &(K, (VA, ()))| (k.clone(), a.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, Writer};
    use crate::multiset::Multiset;

    #[test]
    fn filter_by_keeps_only_rows_with_a_match() {
        let mut b = GraphBuilder::new();
        let mut wa: Writer<(i32, &'static str)> = b.writer();
        let mut wb: Writer<(i32, ())> = b.writer();
        let ra = wa.new_reader();
        let rb = wb.new_reader();
        let out = filter_by(&mut b, ra, rb);
        let mut g = b.finalize();

        wa.send(Multiset::new(vec![((1, "a"), 1), ((2, "b"), 1)]));
        wb.send(Multiset::new(vec![((1, ()), 1)]));
        g.run().unwrap();

        let got: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).collect();
        assert_eq!(got, vec![((1, "a"), 1)]);
    }

    #[test]
    fn filter_by_drops_rows_when_the_match_is_retracted() {
        let mut b = GraphBuilder::new();
        let mut wa: Writer<(i32, &'static str)> = b.writer();
        let mut wb: Writer<(i32, ())> = b.writer();
        let ra = wa.new_reader();
        let rb = wb.new_reader();
        let out = filter_by(&mut b, ra, rb);
        let mut g = b.finalize();

        wa.send(Multiset::new(vec![((1, "a"), 1)]));
        wb.send(Multiset::new(vec![((1, ()), 1)]));
        g.run().unwrap();
        let _ = out.drain();

        wb.send(Multiset::new(vec![((1, ()), -1)]));
        g.run().unwrap();
        let got: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).collect();
        assert_eq!(got, vec![((1, "a"), -1)]);
    }

    #[test]
    fn a_right_side_key_with_multiplicity_above_one_does_not_scale_the_left_row() {
        let mut b = GraphBuilder::new();
        let mut wa: Writer<(i32, &'static str)> = b.writer();
        let mut wb: Writer<(i32, ())> = b.writer();
        let ra = wa.new_reader();
        let rb = wb.new_reader();
        let out = filter_by(&mut b, ra, rb);
        let mut g = b.finalize();

        wa.send(Multiset::new(vec![((1, "a"), 1)]));
        // Three matching right-hand rows for the same key.
        wb.send(Multiset::new(vec![((1, ()), 3)]));
        g.run().unwrap();

        let got: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).collect();
        let consolidated = Multiset::new(got).consolidate();
        assert_eq!(consolidated.into_inner(), vec![((1, "a"), 1)]);
    }
}
