//! Expression evaluator (spec §4.7): compiles a [`crate::qir::Expr`] tree
//! into a closure `Row -> Result<Value, ExecError>` once, ahead of the
//! hot per-row path, rather than interpreting the tree on every row
//! (spec §9's design note).

use crate::error::{CompileError, ExecError};
use crate::qir::Expr;
use crate::value::{Row, Value};
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;

pub type CompiledExpr = Box<dyn Fn(&Row) -> Result<Value, ExecError>>;

/// Compiles `expr` into a reusable closure. `agg(...)` nodes compile to a
/// closure that always raises [`ExecError::AggregateEvaluatedDirectly`] —
/// the group-by compiler routes `agg` nodes to the aggregate machinery
/// before ever calling this on the rest of the tree (spec §4.7).
pub fn compile_expr(expr: &Expr) -> Result<CompiledExpr, CompileError> {
    match expr {
        Expr::Ref { path } => {
            if path.is_empty() {
                return Err(CompileError::EmptyRefPath);
            }
            let path = path.clone();
            Ok(Box::new(move |row: &Row| Ok(walk_path(row, &path))))
        }
        Expr::Val { value } => {
            let value = value.clone();
            Ok(Box::new(move |_row: &Row| Ok(value.clone())))
        }
        Expr::Func { name, args } => compile_func(name, args),
        Expr::Agg { name, .. } => {
            let _ = name;
            Ok(Box::new(|_row: &Row| Err(ExecError::AggregateEvaluatedDirectly)))
        }
    }
}

fn walk_path(row: &Row, path: &[String]) -> Value {
    let mut cur = match row.get(&path[0]) {
        Some(v) => v.clone(),
        None => return Value::Null,
    };
    for seg in &path[1..] {
        cur = match cur {
            Value::Null => Value::Null,
            Value::Record(r) => r.get(seg).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    cur
}

fn compile_func(name: &str, args: &[Expr]) -> Result<CompiledExpr, CompileError> {
    // Short-circuiting boolean operators need the sub-expressions as
    // closures, not pre-evaluated values, so they're special-cased ahead
    // of the generic eager-argument dispatch below.
    match name {
        "and" => {
            let compiled: Vec<CompiledExpr> = args.iter().map(|a| compile_expr(a)).collect::<Result<_, _>>()?;
            return Ok(Box::new(move |row: &Row| {
                for c in &compiled {
                    if !c(row)?.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }));
        }
        "or" => {
            let compiled: Vec<CompiledExpr> = args.iter().map(|a| compile_expr(a)).collect::<Result<_, _>>()?;
            return Ok(Box::new(move |row: &Row| {
                for c in &compiled {
                    if c(row)?.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }));
        }
        "not" => {
            if args.len() != 1 {
                return Err(CompileError::UnknownFunction { name: "not".into() });
            }
            let inner = compile_expr(&args[0])?;
            return Ok(Box::new(move |row: &Row| Ok(Value::Bool(!inner(row)?.is_truthy()))));
        }
        _ => {}
    }

    known_function_name(name)?;
    let compiled_args: Vec<CompiledExpr> = args.iter().map(|a| compile_expr(a)).collect::<Result<_, _>>()?;
    let name = name.to_string();
    Ok(Box::new(move |row: &Row| {
        let values: Vec<Value> = compiled_args.iter().map(|c| c(row)).collect::<Result<_, _>>()?;
        dispatch(&name, &values)
    }))
}

const KNOWN_FUNCTIONS: &[&str] = &[
    "upper", "lower", "length", "concat", "coalesce", "add", "subtract", "multiply", "divide", "in", "like",
    "ilike", "eq", "neq", "lt", "lte", "gt", "gte", "json_extract", "date",
];

fn known_function_name(name: &str) -> Result<(), CompileError> {
    if KNOWN_FUNCTIONS.contains(&name) {
        Ok(())
    } else {
        Err(CompileError::UnknownFunction { name: name.to_string() })
    }
}

fn dispatch(name: &str, args: &[Value]) -> Result<Value, ExecError> {
    match name {
        "upper" => Ok(string_case(&args[0], |s| s.to_uppercase())),
        "lower" => Ok(string_case(&args[0], |s| s.to_lowercase())),
        "length" => length(&args[0]),
        "concat" => Ok(Value::Text(args.iter().map(text_or_empty).collect())),
        "coalesce" => Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)),
        "add" => numeric_binop(args, |a, b| a + b),
        "subtract" => numeric_binop(args, |a, b| a - b),
        "multiply" => numeric_binop(args, |a, b| a * b),
        "divide" => divide(args),
        "in" => Ok(Value::Bool(contains(&args[1], &args[0]))),
        "like" => pattern_match(&args[0], &args[1], false),
        "ilike" => pattern_match(&args[0], &args[1], true),
        "eq" => Ok(Value::Bool(args[0] == args[1])),
        "neq" => Ok(Value::Bool(args[0] != args[1])),
        "lt" => Ok(Value::Bool(args[0] < args[1])),
        "lte" => Ok(Value::Bool(args[0] <= args[1])),
        "gt" => Ok(Value::Bool(args[0] > args[1])),
        "gte" => Ok(Value::Bool(args[0] >= args[1])),
        "json_extract" => json_extract(&args[0], &args[1..]),
        "date" => date(&args[0]),
        other => Err(ExecError::TypeMismatch { message: format!("unreachable: unknown function reached dispatch: {other}") }),
    }
}

fn string_case(v: &Value, f: impl Fn(&str) -> String) -> Value {
    match v.as_str() {
        Some(s) => Value::Text(f(s)),
        None => v.clone(),
    }
}

fn length(v: &Value) -> Result<Value, ExecError> {
    match v {
        Value::Text(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::Array(a) => Ok(Value::Int(a.len() as i64)),
        _ => Err(ExecError::TypeMismatch {
            message: "length() requires a string or array argument".to_string(),
        }),
    }
}

fn text_or_empty(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

fn numeric_binop(args: &[Value], f: impl Fn(f64, f64) -> f64) -> Result<Value, ExecError> {
    let a = args[0].as_f64().unwrap_or(0.0);
    let b = args[1].as_f64().unwrap_or(0.0);
    let both_int = matches!(args[0], Value::Int(_) | Value::Null) && matches!(args[1], Value::Int(_) | Value::Null);
    let result = f(a, b);
    if both_int && result.fract() == 0.0 {
        Ok(Value::Int(result as i64))
    } else {
        Ok(Value::from_f64(result))
    }
}

fn divide(args: &[Value]) -> Result<Value, ExecError> {
    let numerator = args[0].as_f64().unwrap_or(0.0);
    let denominator = args[1].as_f64().unwrap_or(0.0);
    if denominator == 0.0 {
        return Ok(Value::Null);
    }
    Ok(Value::from_f64(numerator / denominator))
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack.as_array() {
        Some(items) => items.contains(needle),
        None => false,
    }
}

fn pattern_match(input: &Value, pattern: &Value, case_insensitive: bool) -> Result<Value, ExecError> {
    let (Some(s), Some(p)) = (input.as_str(), pattern.as_str()) else {
        return Ok(Value::Bool(false));
    };
    let regex_source = like_to_regex(p);
    let re = if case_insensitive {
        Regex::new(&format!("(?i){regex_source}"))
    } else {
        Regex::new(&regex_source)
    }
    .map_err(|e| ExecError::TypeMismatch { message: format!("invalid like pattern: {e}") })?;
    Ok(Value::Bool(re.is_match(s)))
}

/// Translates a SQL-`LIKE` pattern to a regex. Only `\%` and `\_` are
/// escapes (spec §9 Open Questions); every other backslash is literal.
fn like_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some('%') => {
                    out.push_str(&regex::escape("%"));
                    chars.next();
                }
                Some('_') => {
                    out.push_str(&regex::escape("_"));
                    chars.next();
                }
                _ => out.push_str(&regex::escape("\\")),
            },
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

fn json_extract(input: &Value, path: &[Value]) -> Result<Value, ExecError> {
    let text = match input {
        Value::Null => return Ok(Value::Null),
        Value::Text(s) => s,
        other => return Ok(other.clone()),
    };
    let parsed: serde_json::Value = serde_json::from_str(text).map_err(|e| ExecError::InvalidJson { message: e.to_string() })?;
    let mut cur = parsed;
    for seg in path {
        let key = seg.as_str().unwrap_or_default();
        cur = match cur {
            serde_json::Value::Object(mut map) => map.remove(key).unwrap_or(serde_json::Value::Null),
            serde_json::Value::Array(arr) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| arr.into_iter().nth(i))
                .unwrap_or(serde_json::Value::Null),
            _ => serde_json::Value::Null,
        };
    }
    Ok(json_to_value(&cur))
}

fn json_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::from_f64(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(a) => Value::Array(a.iter().map(json_to_value).collect()),
        serde_json::Value::Object(o) => {
            Value::Record(o.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect())
        }
    }
}

fn date(input: &Value) -> Result<Value, ExecError> {
    let dt: DateTime<Utc> = match input {
        Value::Null => return Ok(Value::Null),
        Value::Int(ms) => Utc.timestamp_millis_opt(*ms).single().ok_or_else(|| ExecError::InvalidDate {
            message: format!("timestamp out of range: {ms}"),
        })?,
        Value::Text(s) => DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| ExecError::InvalidDate { message: format!("{s}: {e}") })?,
        other => {
            return Err(ExecError::InvalidDate {
                message: format!("cannot interpret {other} as a date"),
            })
        }
    };
    Ok(Value::Text(dt.to_rfc3339()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qir::Expr;
    use crate::value::namespaced;

    fn val(v: Value) -> Expr {
        Expr::Val { value: v }
    }

    fn refp(path: &[&str]) -> Expr {
        Expr::Ref { path: path.iter().map(|s| s.to_string()).collect() }
    }

    #[test]
    fn propref_walks_namespaced_rows_and_nulls_propagate() {
        let mut inner = Row::new();
        inner.insert("age".into(), Value::Int(25));
        let row = namespaced([("users".to_string(), Value::Record(inner))]);

        let f = compile_expr(&refp(&["users", "age"])).unwrap();
        assert_eq!(f(&row).unwrap(), Value::Int(25));

        let f_missing = compile_expr(&refp(&["users", "missing", "deeper"])).unwrap();
        assert_eq!(f_missing(&row).unwrap(), Value::Null);
    }

    #[test]
    fn empty_ref_path_is_a_compile_error() {
        let err = compile_expr(&Expr::Ref { path: vec![] }).unwrap_err();
        assert_eq!(err, CompileError::EmptyRefPath);
    }

    #[test]
    fn unknown_function_is_a_compile_error() {
        let err = compile_expr(&Expr::Func { name: "bogus".into(), args: vec![] }).unwrap_err();
        assert!(matches!(err, CompileError::UnknownFunction { .. }));
    }

    #[test]
    fn divide_by_zero_is_null_not_an_error() {
        let f = compile_expr(&Expr::Func {
            name: "divide".into(),
            args: vec![val(Value::Int(10)), val(Value::Int(0))],
        })
        .unwrap();
        assert_eq!(f(&Row::new()).unwrap(), Value::Null);
    }

    #[test]
    fn and_short_circuits_without_evaluating_the_aggregate() {
        let f = compile_expr(&Expr::Func {
            name: "and".into(),
            args: vec![val(Value::Bool(false)), Expr::Agg { name: "sum".into(), args: vec![] }],
        })
        .unwrap();
        assert_eq!(f(&Row::new()).unwrap(), Value::Bool(false));
    }

    #[test]
    fn like_escapes_only_percent_and_underscore() {
        let f = compile_expr(&Expr::Func {
            name: "like".into(),
            args: vec![val(Value::Text("50%_off".into())), val(Value::Text("50\\%\\_off".into()))],
        })
        .unwrap();
        assert_eq!(f(&Row::new()).unwrap(), Value::Bool(true));
    }

    #[test]
    fn agg_outside_group_by_raises_at_eval_time() {
        let f = compile_expr(&Expr::Agg { name: "sum".into(), args: vec![] }).unwrap();
        let err = f(&Row::new()).unwrap_err();
        assert_eq!(err, ExecError::AggregateEvaluatedDirectly);
    }
}
