//! Compiler + graph integration tests (SPEC_FULL §10.4): exercises the
//! query compiler against a live graph end to end, rather than unit
//! testing individual operators in isolation.

use ivm_engine::compiler::compile;
use ivm_engine::graph::{GraphBuilder, Writer};
use ivm_engine::multiset::Multiset;
use ivm_engine::qir::{Direction, Expr, Join, JoinType, Order, Query, Source};
use ivm_engine::value::{Row, Value};
use std::collections::{BTreeMap, HashMap};

fn row(fields: &[(&str, Value)]) -> Row {
    fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn empty_query(id: u64, from: Source) -> Query {
    Query {
        id,
        from,
        join: vec![],
        where_clauses: vec![],
        group_by: vec![],
        having: None,
        order_by: vec![],
        limit: None,
        offset: None,
        select: None,
        with: vec![],
    }
}

#[test]
fn scenario_s2_join_then_select_restricted_columns() {
    let mut b = GraphBuilder::new();
    let mut users_w: Writer<(Value, Row)> = b.writer();
    let mut orders_w: Writer<(Value, Row)> = b.writer();
    let users_r = users_w.new_reader();
    let orders_r = orders_w.new_reader();

    let mut inputs = HashMap::new();
    inputs.insert("users".to_string(), users_r);
    inputs.insert("orders".to_string(), orders_r);

    let mut query = empty_query(1, Source::CollectionRef { alias: "u".into(), id: "users".into() });
    query.join.push(Join {
        kind: JoinType::Inner,
        from: Source::CollectionRef { alias: "o".into(), id: "orders".into() },
        left: Expr::Ref { path: vec!["u".into(), "id".into()] },
        right: Expr::Ref { path: vec!["o".into(), "user_id".into()] },
        where_clause: None,
    });
    let mut select = BTreeMap::new();
    select.insert("name".to_string(), Expr::Ref { path: vec!["u".into(), "name".into()] });
    select.insert("amount".to_string(), Expr::Ref { path: vec!["o".into(), "amount".into()] });
    query.select = Some(select);

    let out = compile(&mut b, inputs, &query).unwrap();
    let mut g = b.finalize();

    users_w.send(Multiset::new(vec![
        ((Value::Int(1), row(&[("id", Value::Int(1)), ("name", Value::Text("alice".into()))])), 1),
        ((Value::Int(2), row(&[("id", Value::Int(2)), ("name", Value::Text("bob".into()))])), 1),
    ]));
    orders_w.send(Multiset::new(vec![
        ((Value::Int(10), row(&[("user_id", Value::Int(1)), ("amount", Value::Int(99))])), 1),
    ]));
    g.run().unwrap();

    let got: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).filter(|(_, m)| *m > 0).collect();
    assert_eq!(got.len(), 1);
    let (_, row) = &got[0].0;
    assert_eq!(row.get("name"), Some(&Value::Text("alice".into())));
    assert_eq!(row.get("amount"), Some(&Value::Int(99)));

    // Late arrival: bob's matching order shows up in a later tick.
    orders_w.send(Multiset::new(vec![
        ((Value::Int(11), row_lit(&[("user_id", Value::Int(2)), ("amount", Value::Int(42))])), 1),
    ]));
    g.run().unwrap();
    let got2: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).filter(|(_, m)| *m > 0).collect();
    assert_eq!(got2.len(), 1);
    assert_eq!(got2[0].0 .1.get("name"), Some(&Value::Text("bob".into())));
}

fn row_lit(fields: &[(&str, Value)]) -> Row {
    row(fields)
}

#[test]
fn order_by_with_limit_keeps_the_smallest_window() {
    let mut b = GraphBuilder::new();
    let mut w: Writer<(Value, Row)> = b.writer();
    let r = w.new_reader();
    let mut inputs = HashMap::new();
    inputs.insert("t".to_string(), r);

    let mut query = empty_query(1, Source::CollectionRef { alias: "t".into(), id: "t".into() });
    query.order_by.push(Order {
        expression: Expr::Ref { path: vec!["t".into(), "score".into()] },
        direction: Direction::Asc,
        nulls: ivm_engine::qir::NullsOrder::Last,
        string_sort: ivm_engine::qir::StringSort::Lexical,
        locale: None,
    });
    query.limit = Some(2);
    query.offset = Some(0);

    let out = compile(&mut b, inputs, &query).unwrap();
    let mut g = b.finalize();

    w.send(Multiset::new(vec![
        ((Value::Int(1), row(&[("score", Value::Int(30))])), 1),
        ((Value::Int(2), row(&[("score", Value::Int(10))])), 1),
        ((Value::Int(3), row(&[("score", Value::Int(20))])), 1),
    ]));
    g.run().unwrap();

    let got: Vec<_> = out.drain().into_iter().flat_map(Multiset::into_inner).filter(|(_, m)| *m > 0).collect();
    assert_eq!(got.len(), 2);
    let scores: Vec<_> = got.iter().map(|((_, row), _)| row.get("score").cloned().unwrap()).collect();
    assert!(scores.contains(&Value::Int(10)));
    assert!(scores.contains(&Value::Int(20)));
    assert!(!scores.contains(&Value::Int(30)));
    for ((_, row), _) in &got {
        assert!(row.contains_key("__order_index"));
    }
}
