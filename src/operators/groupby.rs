//! `group-by(keyFn, aggregates)` (spec §4.5, catalog in SPEC_FULL §4.8):
//! built on `map + reduce`. Each aggregate is a `preMap → reduce → postMap`
//! triple; `preMap` extracts a row's per-aggregate partial, `reduce` folds
//! partials associatively, `postMap` turns the fold into the presented
//! value (e.g. dividing a running sum by a running count for `avg`).

use crate::error::ExecError;
use crate::graph::{GraphBuilder, Reader};
use crate::multiset::Multiset;
use crate::operators::keyed::key_by;
use crate::operators::reduce::Reduce;
use crate::value::{Row, Value};
use ordered_float::OrderedFloat;

/// One of the standard aggregates (SPEC_FULL §4.8). `mode` ties break by
/// smallest value, deterministically.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateKind {
    Sum,
    Count,
    Avg,
    Min,
    Max,
    Median,
    Mode,
}

/// One `select`-clause aggregate entry: reads `field` from each row in the
/// group and writes `output_name` into the group's result row.
#[derive(Clone, Debug)]
pub struct AggregateSpec {
    pub output_name: String,
    pub kind: AggregateKind,
    pub field: String,
}

impl AggregateSpec {
    #[must_use]
    pub fn new(output_name: impl Into<String>, kind: AggregateKind, field: impl Into<String>) -> Self {
        AggregateSpec {
            output_name: output_name.into(),
            kind,
            field,
        }
    }

    /// `preMap`: this aggregate's per-row contribution.
    fn pre_map(&self, row: &Row) -> Value {
        row.get(&self.field).cloned().unwrap_or(Value::Null)
    }

    /// `reduce` + `postMap` collapsed: given every row's partial in the
    /// group (already expanded by multiplicity), produce the presented
    /// value. Returns `None` for an empty group (the aggregate vanishes
    /// along with the group).
    fn combine(&self, partials: &[Value]) -> Option<Value> {
        combine_partials(self.kind, partials)
    }
}

/// `reduce` + `postMap` collapsed for a single [`AggregateKind`], shared
/// by this operator and the query compiler's inline group-by stage.
/// Returns `None` for an empty group.
pub(crate) fn combine_partials(kind: AggregateKind, partials: &[Value]) -> Option<Value> {
    if partials.is_empty() {
        return None;
    }
    match kind {
        AggregateKind::Count => Some(Value::Int(partials.len() as i64)),
        AggregateKind::Sum => Some(sum_numeric(partials)),
        AggregateKind::Avg => {
            let total = sum_numeric(partials).as_f64().unwrap_or(0.0);
            Some(Value::from_f64(total / partials.len() as f64))
        }
        AggregateKind::Min => partials.iter().min().cloned(),
        AggregateKind::Max => partials.iter().max().cloned(),
        AggregateKind::Median => Some(median(partials)),
        AggregateKind::Mode => Some(mode(partials)),
    }
}

fn sum_numeric(partials: &[Value]) -> Value {
    let mut int_sum: i64 = 0;
    let mut float_sum: f64 = 0.0;
    let mut saw_float = false;
    for v in partials {
        match v {
            Value::Int(i) => int_sum += i,
            Value::Float(f) => {
                saw_float = true;
                float_sum += f.0;
            }
            Value::Null => {}
            _ => saw_float = true,
        }
    }
    if saw_float {
        Value::from_f64(float_sum + int_sum as f64)
    } else {
        Value::Int(int_sum)
    }
}

fn median(partials: &[Value]) -> Value {
    let mut nums: Vec<f64> = partials.iter().filter_map(Value::as_f64).collect();
    nums.sort_by_key(|f| OrderedFloat(*f));
    if nums.is_empty() {
        return Value::Null;
    }
    let mid = nums.len() / 2;
    if nums.len() % 2 == 1 {
        Value::from_f64(nums[mid])
    } else {
        Value::from_f64((nums[mid - 1] + nums[mid]) / 2.0)
    }
}

fn mode(partials: &[Value]) -> Value {
    use std::collections::HashMap;
    let mut counts: HashMap<Value, usize> = HashMap::new();
    for v in partials {
        *counts.entry(v.clone()).or_insert(0) += 1;
    }
    let best = counts
        .into_iter()
        .max_by(|(av, ac), (bv, bc)| ac.cmp(bc).then(bv.cmp(av)))
        .map(|(v, _)| v);
    best.unwrap_or(Value::Null)
}

/// Groups `input` rows by the values of `key_fields`, applying every
/// `AggregateSpec` to each group. Output rows contain the key columns
/// followed by each aggregate's `output_name`; an empty group (total
/// multiplicity drops to zero) disappears entirely.
pub fn group_by(
    builder: &mut GraphBuilder,
    input: Reader<Row>,
    key_fields: Vec<String>,
    aggregates: Vec<AggregateSpec>,
) -> Reader<Row> {
    let keyed = key_by(builder, input, move |row: &Row| {
        key_fields.iter().map(|f| row.get(f).cloned().unwrap_or(Value::Null)).collect::<Vec<_>>()
    });

    Reduce::wire(builder, keyed, move |group: &Multiset<Row>| {
        let mut rows: Vec<Row> = Vec::with_capacity(group.len());
        for (row, m) in group.iter() {
            if *m <= 0 {
                continue;
            }
            for _ in 0..*m {
                rows.push(row.clone());
            }
        }
        if rows.is_empty() {
            return Multiset::empty();
        }

        let mut out = Row::new();
        let key_row = &rows[0];
        for spec in &aggregates {
            let partials: Vec<Value> = rows.iter().map(|r| spec.pre_map(r)).collect();
            if let Some(v) = spec.combine(&partials) {
                out.insert(spec.output_name.clone(), v);
            }
        }
        // Key columns ride along unmodified from any one member row; all
        // members share the same key-field values by construction.
        for (k, v) in key_row {
            out.entry(k.clone()).or_insert_with(|| v.clone());
        }
        Multiset::new(vec![(out, 1)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, Writer};
    use std::collections::BTreeMap;

    fn row(cust: &str, amount: i64) -> Row {
        let mut r = BTreeMap::new();
        r.insert("cust".to_string(), Value::Text(cust.to_string()));
        r.insert("amount".to_string(), Value::Int(amount));
        r
    }

    #[test]
    fn scenario_s5_sum_and_count_per_customer() {
        let mut b = GraphBuilder::new();
        let mut root: Writer<Row> = b.writer();
        let r0 = root.new_reader();
        let out = group_by(
            &mut b,
            r0,
            vec!["cust".to_string()],
            vec![
                AggregateSpec::new("total", AggregateKind::Sum, "amount"),
                AggregateSpec::new("n", AggregateKind::Count, "amount"),
            ],
        );
        let mut g = b.finalize();

        root.send(Multiset::new(vec![
            (row("alice", 100), 1),
            (row("alice", 50), 1),
            (row("bob", 30), 1),
        ]));
        g.run().unwrap();

        let got: Vec<Row> = out
            .drain()
            .into_iter()
            .flat_map(Multiset::into_inner)
            .filter(|(_, m)| *m > 0)
            .map(|(r, _)| r)
            .collect();
        let alice = got.iter().find(|r| r["cust"] == Value::Text("alice".into())).unwrap();
        assert_eq!(alice["total"], Value::Int(150));
        assert_eq!(alice["n"], Value::Int(2));
        let bob = got.iter().find(|r| r["cust"] == Value::Text("bob".into())).unwrap();
        assert_eq!(bob["total"], Value::Int(30));
    }

    #[test]
    fn group_disappears_when_fully_retracted() {
        let mut b = GraphBuilder::new();
        let mut root: Writer<Row> = b.writer();
        let r0 = root.new_reader();
        let out = group_by(
            &mut b,
            r0,
            vec!["cust".to_string()],
            vec![AggregateSpec::new("total", AggregateKind::Sum, "amount")],
        );
        let mut g = b.finalize();

        root.send(Multiset::new(vec![(row("alice", 100), 1)]));
        g.run().unwrap();
        let _ = out.drain();

        root.send(Multiset::new(vec![(row("alice", 100), -1)]));
        g.run().unwrap();
        let got: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).collect();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].1, -1);
    }

    #[test]
    fn mode_ties_break_by_smallest_value() {
        let partials = vec![Value::Int(5), Value::Int(1), Value::Int(5), Value::Int(1)];
        assert_eq!(mode(&partials), Value::Int(1));
    }
}
