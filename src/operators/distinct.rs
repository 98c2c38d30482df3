//! `distinct(by)` (spec §4.5): emits a `+1`/`-1` transition marker when a
//! value's running multiplicity crosses the `0` boundary, never a raw
//! count. Consolidated output therefore always has every surviving value
//! at multiplicity exactly 1 (P3, distinct-idempotence).

use crate::error::ExecError;
use crate::graph::{GraphBuilder, Operator, OperatorId, Reader, Writer};
use crate::multiset::Multiset;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

pub struct Distinct<T, K, F> {
    id: OperatorId,
    input: Reader<T>,
    output: Writer<T>,
    seen: HashMap<K, i64>,
    /// The last value observed for each key, needed to re-emit it on a
    /// sign transition (the key we dedupe by may not be the whole value).
    representative: HashMap<K, T>,
    by: F,
}

impl<T, K, F> Distinct<T, K, F>
where
    T: Clone + 'static,
    K: Clone + Eq + Hash + 'static,
    F: FnMut(&T) -> K + 'static,
{
    pub fn wire(builder: &mut GraphBuilder, input: Reader<T>, by: F) -> Reader<T> {
        let id = builder.alloc_id();
        let mut writer: Writer<T> = builder.writer();
        let out = writer.new_reader();
        builder.register(Box::new(Distinct {
            id,
            input,
            output: writer,
            seen: HashMap::new(),
            representative: HashMap::new(),
            by,
        }));
        out
    }
}

impl<T, K, F> Operator for Distinct<T, K, F>
where
    T: Clone,
    K: Clone + Eq + Hash,
    F: FnMut(&T) -> K,
{
    fn id(&self) -> OperatorId {
        self.id
    }

    fn has_work(&self) -> bool {
        !self.input.is_empty()
    }

    fn run(&mut self) -> Result<(), ExecError> {
        let mut touched: HashSet<K> = HashSet::new();
        let mut deltas: HashMap<K, i64> = HashMap::new();
        for ms in self.input.drain() {
            for (v, m) in ms.into_inner() {
                let k = (self.by)(&v);
                *deltas.entry(k.clone()).or_insert(0) += m;
                self.representative.insert(k.clone(), v);
                touched.insert(k);
            }
        }

        let mut out: Vec<(T, i64)> = Vec::new();
        for k in touched {
            let before = *self.seen.get(&k).unwrap_or(&0);
            let after = before + deltas.get(&k).copied().unwrap_or(0);
            self.seen.insert(k.clone(), after);

            let was_present = before > 0;
            let is_present = after > 0;
            if !was_present && is_present {
                out.push((self.representative[&k].clone(), 1));
            } else if was_present && !is_present {
                out.push((self.representative[&k].clone(), -1));
            }
        }

        if !out.is_empty() {
            self.output.send(Multiset::new(out));
        }
        Ok(())
    }
}
