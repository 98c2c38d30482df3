//! Query compiler (spec §4.6): walks a [`crate::qir::Query`] tree and
//! wires operators into a pipeline. Input is a map of external collection
//! streams keyed by collection id; output is a keyed stream of `(primary
//! key, namespaced-or-flat row)` pairs.
//!
//! Sub-queries (`queryRef`, `with`-CTEs) are compiled once no matter how
//! many aliases reference them: the first compile is wired through a
//! [`Tee`], one branch used immediately and the other kept in the cache,
//! so every subsequent lookup just tees again (spec §9's node-id cache,
//! since Rust has no JS-style object identity to key on).

use crate::error::{CompileError, ExecError};
use crate::eval::{compile_expr, CompiledExpr};
use crate::multiset::Multiset;
use crate::operators::groupby::{combine_partials, AggregateKind};
use crate::operators::join::{cross_join, full_join, left_join, right_join, AntiJoin, InnerJoin};
use crate::operators::linear::{Map, Tee, TryFilter, TryMap};
use crate::operators::orderby::{order_by, order_by_with_frac_index};
use crate::operators::reduce::Reduce;
use crate::operators::topk::TopKBackend;
use crate::qir::{Direction, Expr, Join, JoinType, NodeId, NullsOrder, Order, Query, Source};
use crate::value::{namespaced, Row, Value};
use crate::graph::{GraphBuilder, Reader};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// A keyed row stream: the shape every stage of the compiler consumes and
/// produces.
pub type RowStream = Reader<(Value, Row)>;

/// Compiler state: the builder, the external/CTE input namespace (mutated
/// as CTEs are registered and as sources get re-teed for reuse), and the
/// sub-query compile cache.
pub struct CompileContext<'a> {
    builder: &'a mut GraphBuilder,
    inputs: HashMap<String, RowStream>,
    cache: HashMap<NodeId, RowStream>,
}

impl<'a> CompileContext<'a> {
    #[must_use]
    pub fn new(builder: &'a mut GraphBuilder, inputs: HashMap<String, RowStream>) -> Self {
        CompileContext {
            builder,
            inputs,
            cache: HashMap::new(),
        }
    }

    fn fetch_input(&mut self, id: &str) -> Result<RowStream, CompileError> {
        let r = self.inputs.remove(id).ok_or_else(|| CompileError::UnknownInput { alias: id.to_string() })?;
        let [r1, r2] = Tee::wire2(self.builder, r);
        self.inputs.insert(id.to_string(), r2);
        Ok(r1)
    }

    fn get_or_compile_query(&mut self, query: &Query) -> Result<RowStream, CompileError> {
        if let Some(cached) = self.cache.remove(&query.id) {
            let [r1, r2] = Tee::wire2(self.builder, cached);
            self.cache.insert(query.id, r2);
            return Ok(r1);
        }
        let compiled = compile_query(self, query)?;
        let [r1, r2] = Tee::wire2(self.builder, compiled);
        self.cache.insert(query.id, r2);
        Ok(r1)
    }
}

/// Compiles `query` against `inputs` (collection id → raw keyed stream)
/// into a pipeline wired onto `builder`. Top-level entry point.
pub fn compile(builder: &mut GraphBuilder, inputs: HashMap<String, RowStream>, query: &Query) -> Result<RowStream, CompileError> {
    let mut ctx = CompileContext::new(builder, inputs);
    compile_query(&mut ctx, query)
}

fn compile_query(ctx: &mut CompileContext, query: &Query) -> Result<RowStream, CompileError> {
    // 1. CTE expansion.
    let mut seen_names: HashSet<String> = HashSet::new();
    for cte in &query.with {
        if cte.as_alias.is_empty() {
            return Err(CompileError::CteMissingAlias);
        }
        if !seen_names.insert(cte.as_alias.clone()) {
            return Err(CompileError::DuplicateCteName { name: cte.as_alias.clone() });
        }
        if source_tree_references_alias(&Source::CollectionRef { alias: String::new(), id: cte.as_alias.clone() }, &cte.query, &cte.as_alias) {
            return Err(CompileError::CteRecurses { name: cte.as_alias.clone() });
        }
        let compiled = ctx.get_or_compile_query(&cte.query)?;
        ctx.inputs.insert(cte.as_alias.clone(), compiled);
    }

    // 2. From.
    let mut stream = compile_source(ctx, &query.from)?;

    // 3. Joins.
    for j in &query.join {
        let right = compile_source(ctx, &j.from)?;
        stream = compile_join(ctx, stream, right, j)?;
    }

    // 4. Where.
    for w in &query.where_clauses {
        let f = compile_expr(w)?;
        stream = TryFilter::wire(ctx.builder, stream, move |(_, row): &(Value, Row)| f(row).map(|v| v.is_truthy()));
    }

    // 5. Group-by.
    let grouped = compile_group_by(ctx, stream, query)?;

    // 6. Having.
    let mut stream = grouped;
    if let Some(having) = &query.having {
        let f = compile_expr(having)?;
        stream = TryFilter::wire(ctx.builder, stream, move |(_, row): &(Value, Row)| f(row).map(|v| v.is_truthy()));
    }

    // 7. Order-by.
    if (query.limit.is_some() || query.offset.is_some()) && query.order_by.is_empty() {
        return Err(CompileError::LimitOffsetWithoutOrderBy);
    }
    if !query.order_by.is_empty() {
        stream = compile_order_by(ctx, stream, query)?;
    }

    // 8. Select.
    if let Some(select) = &query.select {
        stream = compile_select(ctx, stream, select)?;
    }

    Ok(stream)
}

/// True if `cte_query` (transitively, through its own `from`/`join`
/// sources) references a collection/CTE named `alias` — i.e. the CTE
/// recurses into itself.
fn source_tree_references_alias(_self_marker: &Source, cte_query: &Query, alias: &str) -> bool {
    fn source_refs(source: &Source, alias: &str) -> bool {
        match source {
            Source::CollectionRef { id, .. } => id == alias,
            Source::QueryRef { query, .. } => query_refs(query, alias),
        }
    }
    fn query_refs(q: &Query, alias: &str) -> bool {
        if source_refs(&q.from, alias) {
            return true;
        }
        q.join.iter().any(|j| source_refs(&j.from, alias))
    }
    query_refs(cte_query, alias)
}

fn compile_source(ctx: &mut CompileContext, source: &Source) -> Result<RowStream, CompileError> {
    match source {
        Source::CollectionRef { alias, id } => {
            let raw = ctx.fetch_input(id)?;
            let alias = alias.clone();
            Ok(Map::wire(ctx.builder, raw, move |(pk, row): &(Value, Row)| {
                (pk.clone(), namespaced([(alias.clone(), Value::Record(row.clone()))]))
            }))
        }
        Source::QueryRef { alias, query } => {
            let inner = ctx.get_or_compile_query(query)?;
            let alias = alias.clone();
            Ok(Map::wire(ctx.builder, inner, move |(pk, row): &(Value, Row)| {
                (pk.clone(), namespaced([(alias.clone(), Value::Record(row.clone()))]))
            }))
        }
    }
}

fn merge_rows(a: &Row, b: &Row) -> Row {
    let mut out = a.clone();
    out.extend(b.clone());
    out
}

fn combined_pk(a: &Value, b: &Value) -> Value {
    Value::Array(vec![a.clone(), b.clone()])
}

fn compile_join(ctx: &mut CompileContext, left: RowStream, right: RowStream, join: &Join) -> Result<RowStream, CompileError> {
    if join.kind == JoinType::Cross {
        let joined = cross_join(ctx.builder, left, right);
        let merged = Map::wire(ctx.builder, joined, |((pkl, rowl), (pkr, rowr)): &((Value, Row), (Value, Row))| {
            (combined_pk(pkl, pkr), merge_rows(rowl, rowr))
        });
        return apply_join_predicate(ctx, merged, join);
    }

    let left_key = compile_expr(&join.left)?;
    let right_key = compile_expr(&join.right)?;

    let left_keyed = TryMap::wire(ctx.builder, left, move |(pk, row): &(Value, Row)| {
        left_key(row).map(|k| (k, (pk.clone(), row.clone())))
    });
    let right_keyed = TryMap::wire(ctx.builder, right, move |(pk, row): &(Value, Row)| {
        right_key(row).map(|k| (k, (pk.clone(), row.clone())))
    });

    let out = match join.kind {
        JoinType::Inner => {
            let joined = InnerJoin::wire(ctx.builder, left_keyed, right_keyed);
            Map::wire(ctx.builder, joined, |(_, ((pkl, rowl), (pkr, rowr))): &(Value, ((Value, Row), (Value, Row)))| {
                (combined_pk(pkl, pkr), merge_rows(rowl, rowr))
            })
        }
        JoinType::Left => {
            let joined = left_join(ctx.builder, left_keyed, right_keyed);
            Map::wire(
                ctx.builder,
                joined,
                |(_, ((pkl, rowl), opt)): &(Value, ((Value, Row), Option<(Value, Row)>))| match opt {
                    Some((pkr, rowr)) => (combined_pk(pkl, pkr), merge_rows(rowl, rowr)),
                    None => (pkl.clone(), rowl.clone()),
                },
            )
        }
        JoinType::Right => {
            let joined = right_join(ctx.builder, left_keyed, right_keyed);
            Map::wire(
                ctx.builder,
                joined,
                |(_, (opt, (pkr, rowr))): &(Value, (Option<(Value, Row)>, (Value, Row)))| match opt {
                    Some((pkl, rowl)) => (combined_pk(pkl, pkr), merge_rows(rowl, rowr)),
                    None => (pkr.clone(), rowr.clone()),
                },
            )
        }
        JoinType::Full => {
            let joined = full_join(ctx.builder, left_keyed, right_keyed);
            Map::wire(
                ctx.builder,
                joined,
                |(_, (a, b)): &(Value, (Option<(Value, Row)>, Option<(Value, Row)>))| match (a, b) {
                    (Some((pkl, rowl)), Some((pkr, rowr))) => (combined_pk(pkl, pkr), merge_rows(rowl, rowr)),
                    (Some((pkl, rowl)), None) => (pkl.clone(), rowl.clone()),
                    (None, Some((pkr, rowr))) => (pkr.clone(), rowr.clone()),
                    (None, None) => unreachable!("full join never emits a row matched on neither side"),
                },
            )
        }
        JoinType::Anti => {
            let right_keys = Map::wire(ctx.builder, right_keyed, |(k, _): &(Value, (Value, Row))| (k.clone(), ()));
            let unmatched = AntiJoin::wire(ctx.builder, left_keyed, right_keys);
            Map::wire(ctx.builder, unmatched, |(_, (pkl, rowl)): &(Value, (Value, Row))| (pkl.clone(), rowl.clone()))
        }
        JoinType::Cross => unreachable!("handled above"),
    };

    apply_join_predicate(ctx, out, join)
}

fn apply_join_predicate(ctx: &mut CompileContext, stream: RowStream, join: &Join) -> Result<RowStream, CompileError> {
    match &join.where_clause {
        None => Ok(stream),
        Some(expr) => {
            let f = compile_expr(expr)?;
            Ok(TryFilter::wire(ctx.builder, stream, move |(_, row): &(Value, Row)| f(row).map(|v| v.is_truthy())))
        }
    }
}

fn aggregate_kind(name: &str) -> Result<AggregateKind, CompileError> {
    match name {
        "sum" => Ok(AggregateKind::Sum),
        "count" => Ok(AggregateKind::Count),
        "avg" => Ok(AggregateKind::Avg),
        "min" => Ok(AggregateKind::Min),
        "max" => Ok(AggregateKind::Max),
        "median" => Ok(AggregateKind::Median),
        "mode" => Ok(AggregateKind::Mode),
        other => Err(CompileError::UnknownFunction { name: other.to_string() }),
    }
}

struct CompiledAggregate {
    output_name: String,
    kind: AggregateKind,
    pre: CompiledExpr,
}

fn compile_group_by(ctx: &mut CompileContext, stream: RowStream, query: &Query) -> Result<RowStream, CompileError> {
    if query.group_by.is_empty() {
        if let Some(select) = &query.select {
            for expr in select.values() {
                if let Expr::Agg { name, .. } = expr {
                    return Err(CompileError::AggregateOutsideGroupBy { name: name.clone() });
                }
            }
        }
        return Ok(stream);
    }

    let key_exprs: Vec<CompiledExpr> = query.group_by.iter().map(compile_expr).collect::<Result<_, _>>()?;
    let key_names: Vec<String> = query
        .group_by
        .iter()
        .map(|e| match e {
            Expr::Ref { path } => path.last().cloned().unwrap_or_else(|| "key".to_string()),
            _ => "key".to_string(),
        })
        .collect();

    let mut aggregates: Vec<CompiledAggregate> = Vec::new();
    if let Some(select) = &query.select {
        for (name, expr) in select {
            if let Expr::Agg { name: agg_name, args } = expr {
                let kind = aggregate_kind(agg_name)?;
                let pre: CompiledExpr = if args.is_empty() {
                    Box::new(|_row: &Row| Ok(Value::Null))
                } else {
                    compile_expr(&args[0])?
                };
                aggregates.push(CompiledAggregate { output_name: name.clone(), kind, pre });
            }
        }
    }

    let keyed = TryMap::wire(ctx.builder, stream, move |(_, row): &(Value, Row)| {
        let keys: Result<Vec<Value>, ExecError> = key_exprs.iter().map(|f| f(row)).collect();
        keys.map(|k| (Value::Array(k.clone()), (k, row.clone())))
    });

    let out = Reduce::wire(ctx.builder, keyed, move |group: &Multiset<(Vec<Value>, Row)>| {
        let mut members: Vec<(Vec<Value>, Row)> = Vec::new();
        for ((keys, row), m) in group.iter() {
            if *m <= 0 {
                continue;
            }
            for _ in 0..*m {
                members.push((keys.clone(), row.clone()));
            }
        }
        if members.is_empty() {
            return Multiset::empty();
        }

        let mut out_row = Row::new();
        for (name, v) in key_names.iter().zip(members[0].0.iter()) {
            out_row.insert(name.clone(), v.clone());
        }
        for agg in &aggregates {
            let partials: Vec<Value> = members.iter().map(|(_, row)| (agg.pre)(row).unwrap_or(Value::Null)).collect();
            if let Some(v) = combine_partials(agg.kind, &partials) {
                out_row.insert(agg.output_name.clone(), v);
            }
        }
        Multiset::new(vec![(out_row, 1)])
    });

    Ok(out)
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct SortComponent {
    null_rank: u8,
    value: Value,
    desc: bool,
}

impl PartialOrd for SortComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortComponent {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.null_rank.cmp(&other.null_rank) {
            Ordering::Equal => {
                let base = self.value.cmp(&other.value);
                if self.desc {
                    base.reverse()
                } else {
                    base
                }
            }
            rank_order => rank_order,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct SortKey(Vec<SortComponent>);

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

fn compile_order_component(order: &Order) -> Result<impl Fn(&Row) -> SortComponent, CompileError> {
    let expr_fn = compile_expr(&order.expression)?;
    let desc = order.direction == Direction::Desc;
    let nulls_first = order.nulls == NullsOrder::First;
    Ok(move |row: &Row| {
        let value = expr_fn(row).unwrap_or(Value::Null);
        let is_null = value.is_null();
        let null_rank = match (is_null, nulls_first) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 1,
            (false, false) => 0,
        };
        SortComponent { null_rank, value, desc }
    })
}

fn compile_order_by(ctx: &mut CompileContext, stream: RowStream, query: &Query) -> Result<RowStream, CompileError> {
    let components: Vec<_> = query.order_by.iter().map(compile_order_component).collect::<Result<_, _>>()?;
    let sort_key = move |row: &Row| SortKey(components.iter().map(|f| f(row)).collect());

    let limit = query.limit.unwrap_or(usize::MAX);
    let offset = query.offset.unwrap_or(0);

    if query.limit.is_some() || query.offset.is_some() {
        let ranked = order_by_with_frac_index(ctx.builder, stream, sort_key, limit, offset, TopKBackend::Array);
        Ok(Map::wire(ctx.builder, ranked, |(pk, (row, frac_index)): &(Value, (Row, String))| {
            let mut row = row.clone();
            row.insert("__order_index".to_string(), Value::Text(frac_index.clone()));
            (pk.clone(), row)
        }))
    } else {
        Ok(order_by(ctx.builder, stream, sort_key, limit, offset))
    }
}

fn compile_select(ctx: &mut CompileContext, stream: RowStream, select: &std::collections::BTreeMap<String, Expr>) -> Result<RowStream, CompileError> {
    // Pre-validate and pre-compile every non-agg, non-whole-table-spread
    // expression once; whole-table spreads and agg passthroughs are
    // resolved per-row since they depend on the row's own shape.
    let mut compiled: Vec<(String, Expr, Option<CompiledExpr>)> = Vec::new();
    for (name, expr) in select {
        let precompiled = match expr {
            Expr::Agg { .. } => None,
            Expr::Ref { path } if path.len() == 1 => None,
            _ => Some(compile_expr(expr)?),
        };
        compiled.push((name.clone(), expr.clone(), precompiled));
    }

    Ok(TryMap::wire(ctx.builder, stream, move |(pk, row): &(Value, Row)| {
        let mut out = Row::new();
        for (name, expr, precompiled) in &compiled {
            match (expr, precompiled) {
                (Expr::Agg { .. }, _) => {
                    out.insert(name.clone(), row.get(name).cloned().unwrap_or(Value::Null));
                }
                (Expr::Ref { path }, _) if path.len() == 1 => match row.get(&path[0]) {
                    Some(Value::Record(inner)) => out.extend(inner.clone()),
                    Some(v) => {
                        out.insert(name.clone(), v.clone());
                    }
                    None => {
                        out.insert(name.clone(), Value::Null);
                    }
                },
                (_, Some(f)) => {
                    out.insert(name.clone(), f(row)?);
                }
                _ => unreachable!("every non-special expr was precompiled above"),
            }
        }
        Ok((pk.clone(), out))
    }))
}

#[allow(dead_code)]
fn stable_hash(v: &Value) -> u64 {
    let mut h = std::collections::hash_map::DefaultHasher::new();
    v.hash(&mut h);
    h.finish()
}
