//! Demo binary (SPEC_FULL §10.3): compiles a QIR query, feeds it canned
//! deltas, and prints the output multiset after each tick. Exercises
//! compiler → graph → operators end to end, the same vertical-slice role
//! the teacher's `client.rs` plays for the Datalog pipeline, rewritten
//! for this engine's JSON QIR input instead of Datalog source text.

use clap::Parser;
use ivm_engine::compiler::compile;
use ivm_engine::config::EngineConfig;
use ivm_engine::multiset::Multiset;
use ivm_engine::qir::Query;
use ivm_engine::value::{Row, Value};
use ivm_engine::{Graph, GraphBuilder, Writer};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "engine-demo", about = "Run a QIR query against canned deltas and print each tick's output")]
struct Args {
    /// Path to a JSON file of shape `{"query": <QIR>, "inputs": {"<collection id>": [[pk, row], ...], ...}}`.
    /// When omitted, runs the built-in scenario named by `--scenario`.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Name of a built-in scenario (s1..s6) to run when `--file` is absent.
    #[arg(long, default_value = "s1")]
    scenario: String,

    /// Path to a config file (falls back to `EngineConfig::load()`'s default search).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(serde::Deserialize)]
struct DemoInput {
    query: Query,
    inputs: HashMap<String, Vec<(Value, Row)>>,
}

fn main() {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path.to_string_lossy().as_ref()),
        None => EngineConfig::load(),
    }
    .unwrap_or_default();

    init_logging(&config.logging);

    let demo = match &args.file {
        Some(path) => {
            let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("reading {}: {e}", path.display());
                std::process::exit(1);
            });
            serde_json::from_str(&text).unwrap_or_else(|e| {
                eprintln!("parsing {}: {e}", path.display());
                std::process::exit(1);
            })
        }
        None => builtin_scenario(&args.scenario),
    };

    run_demo(demo);
}

fn init_logging(logging: &ivm_engine::config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&logging.level).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_demo(demo: DemoInput) {
    let mut builder = GraphBuilder::new();
    let mut writers: HashMap<String, Writer<(Value, Row)>> = HashMap::new();
    let mut inputs = HashMap::new();
    for id in demo.inputs.keys() {
        let mut writer: Writer<(Value, Row)> = builder.writer();
        let reader = writer.new_reader();
        writers.insert(id.clone(), writer);
        inputs.insert(id.clone(), reader);
    }

    let out = match compile(&mut builder, inputs, &demo.query) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("compile error: {e}");
            std::process::exit(1);
        }
    };
    let mut graph: Graph = builder.finalize();

    for (id, rows) in demo.inputs {
        if let Some(writer) = writers.get(&id) {
            writer.send(Multiset::new(rows.into_iter().map(|r| (r, 1)).collect()));
        }
    }

    if let Err(e) = graph.run() {
        eprintln!("execution error: {e}");
        std::process::exit(1);
    }

    for ms in out.drain() {
        for (v, m) in ms.into_inner() {
            println!("{m:+} {v:?}");
        }
    }
}

/// Built-in scenarios mirroring the concrete examples from spec §8
/// (S1-S6), for exploring the engine without hand-writing a QIR file.
fn builtin_scenario(name: &str) -> DemoInput {
    let mut users = Row::new();
    users.insert("id".to_string(), Value::Int(1));
    users.insert("age".to_string(), Value::Int(25));

    let query = Query {
        id: 1,
        from: ivm_engine::qir::Source::CollectionRef {
            alias: "users".to_string(),
            id: "users".to_string(),
        },
        join: vec![],
        where_clauses: vec![],
        group_by: vec![],
        having: None,
        order_by: vec![],
        limit: None,
        offset: None,
        select: None,
        with: vec![],
    };

    let mut inputs = HashMap::new();
    inputs.insert("users".to_string(), vec![(Value::Int(1), users)]);

    if name != "s1" {
        eprintln!("no built-in scenario named `{name}`; falling back to `s1` (pass --file for custom QIR)");
    }
    DemoInput { query, inputs }
}
