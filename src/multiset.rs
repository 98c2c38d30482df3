//! The delta datum (spec §4.1): an unordered bag of `(value, multiplicity)`
//! pairs. All operations are total; there are no failure modes here.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A finite bag of `(T, multiplicity)` pairs. `multiplicity == 0` means
/// absent; order is insignificant once [`Multiset::consolidate`] has run,
/// but is preserved verbatim before that (first-wins tie-breaking in
/// downstream operators depends on insertion order being stable).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Multiset<T> {
    inner: Vec<(T, i64)>,
}

impl<T> Multiset<T> {
    #[must_use]
    pub fn new(inner: Vec<(T, i64)>) -> Self {
        Multiset { inner }
    }

    #[must_use]
    pub fn empty() -> Self {
        Multiset { inner: Vec::new() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Read-only view of the underlying pair sequence.
    #[must_use]
    pub fn inner(&self) -> &[(T, i64)] {
        &self.inner
    }

    pub fn into_inner(self) -> Vec<(T, i64)> {
        self.inner
    }

    pub fn iter(&self) -> impl Iterator<Item = &(T, i64)> {
        self.inner.iter()
    }
}

impl<T: Clone> Multiset<T> {
    /// Bag union; no consolidation.
    #[must_use]
    pub fn concat(mut self, mut other: Multiset<T>) -> Self {
        self.inner.append(&mut other.inner);
        self
    }

    /// Appends a single `(v, m)` pair in place. Helper for operators that
    /// accumulate a per-key buffer value-by-value (e.g. `reduce`).
    pub fn concat_in_place(&mut self, v: T, m: i64) {
        self.inner.push((v, m));
    }

    /// Apply `f` to each value; multiplicities unchanged.
    #[must_use]
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> Multiset<U> {
        Multiset {
            inner: self.inner.iter().map(|(v, m)| (f(v), *m)).collect(),
        }
    }

    /// Retain pairs whose value satisfies `p`.
    #[must_use]
    pub fn filter(&self, mut p: impl FnMut(&T) -> bool) -> Self {
        Multiset {
            inner: self
                .inner
                .iter()
                .filter(|(v, _)| p(v))
                .cloned()
                .collect(),
        }
    }

    /// Flip the sign of every multiplicity.
    #[must_use]
    pub fn negate(&self) -> Self {
        Multiset {
            inner: self.inner.iter().map(|(v, m)| (v.clone(), -m)).collect(),
        }
    }
}

impl<T: Clone + Eq + Hash> Multiset<T> {
    /// Group by structural equality, sum multiplicities, drop zeros.
    #[must_use]
    pub fn consolidate(&self) -> Self {
        let mut totals: HashMap<T, i64> = HashMap::with_capacity(self.inner.len());
        for (v, m) in &self.inner {
            *totals.entry(v.clone()).or_insert(0) += m;
        }
        Multiset {
            inner: totals.into_iter().filter(|(_, m)| *m != 0).collect(),
        }
    }
}

impl<T: Clone + Eq + Hash> Multiset<T> {
    /// Like [`Multiset::consolidate`], but preserves first-seen insertion
    /// order among survivors rather than an arbitrary hash order. Used by
    /// operators (reduce's per-key buffer, top-K) whose tie-breaking rule
    /// is "insertion order, first wins" (spec's top-K invariant).
    #[must_use]
    pub fn stable_consolidate(&self) -> Self {
        let mut totals: HashMap<T, i64> = HashMap::with_capacity(self.inner.len());
        let mut order: Vec<T> = Vec::new();
        for (v, m) in &self.inner {
            let entry = totals.entry(v.clone()).or_insert_with(|| {
                order.push(v.clone());
                0
            });
            *entry += m;
        }
        Multiset {
            inner: order
                .into_iter()
                .filter_map(|v| {
                    let m = totals[&v];
                    if m == 0 {
                        None
                    } else {
                        Some((v, m))
                    }
                })
                .collect(),
        }
    }
}

impl<T: fmt::Debug> Multiset<T> {
    /// Debug string form suitable for logs.
    #[must_use]
    pub fn debug_string(&self, indent: bool) -> String {
        if indent {
            let mut s = String::from("Multiset [\n");
            for (v, m) in &self.inner {
                s.push_str(&format!("  {v:?} => {m}\n"));
            }
            s.push(']');
            s
        } else {
            let body: Vec<String> = self
                .inner
                .iter()
                .map(|(v, m)| format!("{v:?} => {m}"))
                .collect();
            format!("Multiset [{}]", body.join(", "))
        }
    }
}

impl<T> FromIterator<(T, i64)> for Multiset<T> {
    fn from_iter<I: IntoIterator<Item = (T, i64)>>(iter: I) -> Self {
        Multiset {
            inner: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for Multiset<T> {
    type Item = (T, i64);
    type IntoIter = std::vec::IntoIter<(T, i64)>;
    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(pairs: &[(i32, i64)]) -> Multiset<i32> {
        Multiset::new(pairs.to_vec())
    }

    #[test]
    fn consolidate_sums_and_drops_zeros() {
        let m = ms(&[(1, 2), (1, -2), (2, 3), (3, -1)]).consolidate();
        let mut inner = m.into_inner();
        inner.sort();
        assert_eq!(inner, vec![(2, 3), (3, -1)]);
    }

    #[test]
    fn map_preserves_multiplicities() {
        let m = ms(&[(1, 2), (2, -1)]).map(|v| v * 10);
        let mut inner = m.into_inner();
        inner.sort();
        assert_eq!(inner, vec![(10, 2), (20, -1)]);
    }

    #[test]
    fn negate_flips_sign() {
        let m = ms(&[(1, 2), (2, -3)]).negate();
        let mut inner = m.into_inner();
        inner.sort();
        assert_eq!(inner, vec![(1, -2), (2, 3)]);
    }

    #[test]
    fn concat_is_bag_union_without_consolidation() {
        let a = ms(&[(1, 1)]);
        let b = ms(&[(1, 1)]);
        assert_eq!(a.concat(b).into_inner(), vec![(1, 1), (1, 1)]);
    }

    #[test]
    fn consolidate_never_emits_zero_entries_property() {
        // P1 in miniature: any concatenation consolidates with no zeros.
        let a = ms(&[(1, 3), (2, -2)]);
        let b = ms(&[(1, -3), (2, 2), (3, 5)]);
        let out = a.concat(b).consolidate();
        assert!(out.inner().iter().all(|(_, m)| *m != 0));
        let mut inner = out.into_inner();
        inner.sort();
        assert_eq!(inner, vec![(3, 5)]);
    }
}
