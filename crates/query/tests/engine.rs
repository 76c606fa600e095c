use codefacts_protocol::{ErrorKind, Response, ResponseStatus, MAX_RESULTS};
use codefacts_query::{Engine, EngineConfig};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_dump(dir: &Path, modules: &[Value]) {
    fs::create_dir_all(dir).unwrap();
    for module in modules {
        let name = module["module"].as_str().unwrap();
        fs::write(dir.join(format!("{name}.json")), module.to_string()).unwrap();
    }
}

fn engine_with(modules: &[Value]) -> (TempDir, Engine) {
    let temp = TempDir::new().unwrap();
    let dump = temp.path().join("dump");
    write_dump(&dump, modules);
    let config = EngineConfig::new(temp.path().join("facts.db")).with_facts_path(&dump);
    let engine = Engine::open(config).unwrap();
    engine.ingest(None).unwrap();
    (temp, engine)
}

fn scenario() -> (TempDir, Engine) {
    engine_with(&[
        json!({
            "module": "A",
            "imports": [{"module": "B"}],
            "functions": [{
                "name": "f",
                "span": {"start_line": 2, "end_line": 4},
                "calls": [{"module": "B", "name": "g", "line": 3, "col": 5}]
            }]
        }),
        json!({"module": "B", "functions": [{"name": "g", "span": {"start_line": 1, "end_line": 1}}]}),
    ])
}

fn run(engine: &Engine, operation: &str, payload: Value) -> Response {
    engine.execute(&json!({"operation": operation, "payload": payload}))
}

fn ok(engine: &Engine, operation: &str, payload: Value) -> Value {
    let response = run(engine, operation, payload);
    assert_eq!(response.status, ResponseStatus::Ok, "{operation}: {:?}", response.error);
    response.data
}

fn error_kind(response: &Response) -> ErrorKind {
    assert_eq!(response.status, ResponseStatus::Error);
    response.error.as_ref().unwrap().kind
}

fn node_keys(graph: &Value) -> Vec<String> {
    graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["key"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn two_module_scenario_through_the_facade() {
    let (_temp, engine) = scenario();

    let closure = ok(&engine, "cross_module_closure", json!({"source": "A", "target": "B"}));
    let edges = closure["edges"]["items"].as_array().unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0]["caller"], json!({"module": "A", "name": "f"}));
    assert_eq!(edges[0]["callee"], json!({"module": "B", "name": "g"}));
    assert_eq!(edges[0]["location"], json!({"line": 3, "col": 5}));

    let calls = ok(&engine, "call_graph", json!({"function": "A.f", "depth": 1}));
    assert_eq!(node_keys(&calls), vec!["A.f", "B.g"]);
    assert_eq!(calls["edges"].as_array().unwrap().len(), 1);

    let imports = ok(&engine, "import_graph", json!({"module": "A", "depth": 1}));
    assert_eq!(node_keys(&imports), vec!["A", "B"]);
    assert_eq!(imports["edges"][0]["kind"], "imports");
}

#[test]
fn depth_zero_returns_only_the_root() {
    let (_temp, engine) = scenario();
    let graph = ok(&engine, "call_graph", json!({"function": {"module": "A", "name": "f"}, "depth": 0}));
    assert_eq!(node_keys(&graph), vec!["A.f"]);
    assert!(graph["edges"].as_array().unwrap().is_empty());
}

#[test]
fn cyclic_call_graphs_terminate_without_duplicates() {
    let (_temp, engine) = engine_with(&[json!({
        "module": "R",
        "functions": [
            {"name": "ping", "calls": [{"name": "pong"}]},
            {"name": "pong", "calls": [{"name": "ping"}]}
        ]
    })]);
    for depth in [1, 5, 10, 10_000] {
        let graph = ok(&engine, "call_graph", json!({"function": "R.ping", "depth": depth, "direction": "both"}));
        assert_eq!(node_keys(&graph), vec!["R.ping", "R.pong"], "depth {depth}");
    }
    let clamped = ok(&engine, "call_graph", json!({"function": "R.ping", "depth": 10_000}));
    assert_eq!(clamped["depth_clamped"], true);
    assert_eq!(clamped["cycles"], json!([["R.ping", "R.pong"]]));
}

#[test]
fn self_referential_type_has_a_self_edge() {
    let (_temp, engine) = engine_with(&[json!({
        "module": "M",
        "types": [{"name": "T", "constructors": [{"name": "T", "fields": [{"name": "next", "type": "T"}]}]}]
    })]);
    let graph = ok(&engine, "type_dependency_graph", json!({"type": "M.T"}));
    assert_eq!(node_keys(&graph), vec!["M.T"]);
    let edges = graph["edges"].as_array().unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0]["source"], "M.T");
    assert_eq!(edges[0]["target"], "M.T");
}

#[test]
fn no_outgoing_calls_pattern() {
    let (_temp, engine) = scenario();
    let hits = ok(&engine, "find_patterns", json!({"pattern": {"no_outgoing_calls": true}}));
    let keys: Vec<&Value> = hits["items"].as_array().unwrap().iter().map(|h| &h["key"]).collect();
    assert_eq!(keys, vec![&json!({"module": "B", "name": "g"})]);
}

#[test]
fn lookups_are_bounded_and_clamped() {
    let (_temp, engine) = scenario();

    let all = ok(&engine, "find_functions", json!({}));
    assert_eq!(all["items"].as_array().unwrap().len(), 2);
    assert_eq!(all["truncated"], false);

    let first = ok(&engine, "find_functions", json!({"limit": 1}));
    assert_eq!(first["items"].as_array().unwrap().len(), 1);
    assert_eq!(first["truncated"], true);

    let huge = ok(&engine, "find_functions", json!({"limit": 50_000}));
    assert_eq!(huge["limit"], MAX_RESULTS);
    assert_eq!(huge["limit_clamped"], true);

    let exact = ok(&engine, "find_modules", json!({"name": "A", "exact": true}));
    assert_eq!(exact["items"][0]["name"], "A");
}

#[test]
fn unknown_entities_are_marked_not_raised() {
    let (_temp, engine) = scenario();
    let graph = ok(&engine, "call_graph", json!({"function": "Nope.f"}));
    assert_eq!(graph["not_found"]["kind"], "NotFoundError");
    assert!(graph["nodes"].as_array().unwrap().is_empty());

    let callers = ok(&engine, "callers", json!({"function": 999}));
    assert_eq!(callers["not_found"]["entity"], "function");
}

#[test]
fn wrong_shape_references_fail_the_request() {
    let (_temp, engine) = scenario();
    for payload in [json!({"function": true}), json!({"function": [1]}), json!({"function": "f"})] {
        let response = run(&engine, "call_graph", payload);
        assert_eq!(error_kind(&response), ErrorKind::InvalidQueryError);
        assert_eq!(response.meta.operation.as_deref(), Some("call_graph"));
    }
    let unknown = engine.execute(&json!({"operation": "drop_everything"}));
    assert_eq!(error_kind(&unknown), ErrorKind::InvalidQueryError);
}

#[test]
fn structured_queries_reject_unknown_operators_and_fields() {
    let (_temp, engine) = scenario();
    let bad_op = run(
        &engine,
        "structured_query",
        json!({"target": "function", "where": [{"field": "name", "op": "regex", "value": ".*"}]}),
    );
    assert_eq!(error_kind(&bad_op), ErrorKind::InvalidQueryError);

    let bad_field = run(
        &engine,
        "structured_query",
        json!({"target": "function", "where": [{"field": "password", "op": "eq", "value": 1}]}),
    );
    assert_eq!(error_kind(&bad_field), ErrorKind::InvalidQueryError);

    let rows = ok(
        &engine,
        "structured_query",
        json!({
            "target": "function",
            "where": [{"field": "calls", "op": "eq", "value": 0}],
        }),
    );
    assert_eq!(rows["target"], "function");
    assert_eq!(rows["items"].as_array().unwrap().len(), 1);
    assert_eq!(rows["items"][0]["name"], "g");
}

#[test]
fn raw_queries_are_read_only() {
    let (_temp, engine) = scenario();
    for sql in [
        "DELETE FROM functions",
        "SELECT 1; DROP TABLE functions",
        "UPDATE functions SET name = 'x'",
    ] {
        let response = run(&engine, "raw_query", json!({"sql": sql}));
        assert_eq!(error_kind(&response), ErrorKind::InvalidQueryError, "{sql}");
    }
    let still_there = ok(&engine, "find_functions", json!({}));
    assert_eq!(still_there["items"].as_array().unwrap().len(), 2);

    let rows = ok(
        &engine,
        "raw_query",
        json!({"sql": "SELECT name FROM functions WHERE module = :module", "params": {"module": "B"}}),
    );
    assert_eq!(rows["columns"], json!(["name"]));
    assert_eq!(rows["items"], json!([{"name": "g"}]));

    let syntax = run(&engine, "raw_query", json!({"sql": "SELECT FROM WHERE"}));
    assert_eq!(error_kind(&syntax), ErrorKind::InvalidQueryError);
}

#[test]
fn failed_ingestion_keeps_the_previous_snapshot() {
    let (temp, engine) = scenario();
    let before = run(&engine, "snapshot_info", json!({}));
    let generation = before.meta.snapshot_generation.unwrap();

    let broken = temp.path().join("broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("X.json"), "{ not json").unwrap();
    let response = run(&engine, "ingest", json!({"path": broken}));
    assert_eq!(error_kind(&response), ErrorKind::IngestionFormatError);

    let after = run(&engine, "find_functions", json!({}));
    assert_eq!(after.meta.snapshot_generation, Some(generation));
    assert_eq!(after.data["items"].as_array().unwrap().len(), 2);
}

#[test]
fn partial_ingestion_reports_warnings() {
    let temp = TempDir::new().unwrap();
    let dump = temp.path().join("dump");
    write_dump(&dump, &[json!({"module": "Ok", "functions": [{"name": "x"}]})]);
    fs::write(dump.join("Bad.json"), "[]").unwrap();

    let engine = Engine::open(EngineConfig::new(temp.path().join("facts.db"))).unwrap();
    let report = ok(&engine, "ingest", json!({"path": dump}));
    assert_eq!(report["modules"], 1);
    assert_eq!(report["warnings"][0]["kind"], "IngestionPartialWarning");

    let info = ok(&engine, "snapshot_info", json!({}));
    assert_eq!(info["warning_count"], 1);
}

#[test]
fn batch_items_share_one_snapshot_and_fail_independently() {
    let (_temp, engine) = scenario();
    let response = run(
        &engine,
        "batch",
        json!({
            "items": [
                {"id": "stats", "operation": "code_statistics"},
                {"id": "bad", "operation": "call_graph", "payload": {"function": false}},
                {"id": "callers", "operation": "callers", "payload": {"function": "B.g"}}
            ]
        }),
    );
    assert_eq!(response.status, ResponseStatus::Ok);
    let items = response.data["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["status"], "ok");
    assert_eq!(items[1]["status"], "error");
    assert_eq!(items[1]["error"]["kind"], "InvalidQueryError");
    assert_eq!(items[2]["data"]["items"][0]["caller"], json!({"module": "A", "name": "f"}));

    let nested = run(&engine, "batch", json!({"items": [{"operation": "ingest"}]}));
    assert_eq!(error_kind(&nested), ErrorKind::InvalidQueryError);
}

#[test]
fn capabilities_list_every_operation() {
    let (_temp, engine) = scenario();
    let caps = ok(&engine, "capabilities", json!({}));
    let operations = caps["operations"].as_array().unwrap();
    assert!(operations.contains(&json!("cross_module_closure")));
    assert!(operations.contains(&json!("raw_query")));
    assert_eq!(caps["raw_query_verbs"], json!(["SELECT", "WITH"]));
    assert!(caps["structured_query"]["targets"]["function"]
        .as_array()
        .unwrap()
        .contains(&json!("calls")));
    assert!(caps["response_schema"]["properties"]["error"].is_object());
}

#[test]
fn analysis_operations_round_out_the_surface() {
    let (_temp, engine) = scenario();

    let complexity = ok(&engine, "complexity", json!({"function": "A.f"}));
    assert!(complexity["complexity"]["score"].as_u64().unwrap() >= 1);

    let element = ok(&engine, "find_element_by_location", json!({"module": "A", "line": 3}));
    assert_eq!(element["elements"][0]["key"], json!({"module": "A", "name": "f"}));

    let unused = ok(&engine, "find_unused_imports", json!({}));
    assert!(unused["items"].as_array().unwrap().is_empty());

    let pattern = ok(&engine, "match_call_pattern", json!({"caller": "A.*", "callee": "*.g"}));
    assert_eq!(pattern["items"].as_array().unwrap().len(), 1);

    let stats = ok(&engine, "code_statistics", json!({}));
    assert_eq!(stats["functions"], 2);
}

fn coupled() -> (TempDir, Engine) {
    engine_with(&[
        json!({
            "module": "A",
            "imports": [{"module": "B"}],
            "functions": [
                {
                    "name": "f",
                    "signature": "T -> Int",
                    "calls": [
                        {"module": "B", "name": "g", "line": 2},
                        {"module": "B", "name": "g", "line": 3},
                        {"module": "A", "name": "helper", "line": 4}
                    ],
                    "type_refs": [{"module": "B", "name": "T", "line": 1}],
                    "where_functions": [
                        {"name": "go", "calls": [{"module": "Data.Map", "name": "!", "line": 6}]}
                    ]
                },
                {"name": "helper"}
            ]
        }),
        json!({
            "module": "B",
            "types": [{"name": "T", "kind": "data", "constructors": [{"name": "T"}]}],
            "functions": [{"name": "g", "signature": "Int -> Int", "calls": [{"module": "C", "name": "k"}]}]
        }),
        json!({"module": "C", "functions": [{"name": "k"}]}),
    ])
}

fn pairs(listing: &Value) -> Vec<(String, String, u64)> {
    listing["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| {
            (
                p["caller_module"].as_str().unwrap().to_string(),
                p["callee_module"].as_str().unwrap().to_string(),
                p["calls"].as_u64().unwrap(),
            )
        })
        .collect()
}

fn coupled_modules(listing: &Value) -> Vec<String> {
    listing["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["module"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn cross_module_dependencies_count_calls_between_modules() {
    let (_temp, engine) = coupled();

    let all = ok(&engine, "cross_module_dependencies", json!({}));
    assert_eq!(all["module_count"], 4);
    assert_eq!(all["total_cross_module_calls"], 4);
    assert_eq!(
        pairs(&all["dependencies"]),
        vec![
            ("A".to_string(), "B".to_string(), 2),
            ("A".to_string(), "Data.Map".to_string(), 1),
            ("B".to_string(), "C".to_string(), 1),
        ]
    );
    assert_eq!(all["dependencies"]["items"][1]["dangling_calls"], 1);
    assert_eq!(coupled_modules(&all["coupling"]), vec!["A", "B", "C", "Data.Map"]);
    assert_eq!(all["coupling"]["items"][1]["incoming"], 2);
    assert_eq!(all["coupling"]["items"][1]["outgoing"], 1);

    let busy = ok(&engine, "cross_module_dependencies", json!({"threshold": 2}));
    assert_eq!(pairs(&busy["dependencies"]), vec![("A".to_string(), "B".to_string(), 2)]);
    assert_eq!(coupled_modules(&busy["coupling"]), vec!["A", "B"]);
    assert_eq!(busy["total_cross_module_calls"], 4);

    let scoped = ok(&engine, "cross_module_dependencies", json!({"module": "C"}));
    assert_eq!(pairs(&scoped["dependencies"]), vec![("B".to_string(), "C".to_string(), 1)]);
    assert_eq!(coupled_modules(&scoped["coupling"]), vec!["C"]);
}

#[test]
fn function_context_splits_local_and_external_references() {
    let (_temp, engine) = coupled();

    let context = ok(&engine, "function_context", json!({"function": "A.f"}));
    assert_eq!(context["definition"]["signature"], "T -> Int");
    assert_eq!(context["local_functions"][0]["key"], json!({"module": "A", "name": "helper"}));
    assert_eq!(context["local_functions"].as_array().unwrap().len(), 1);
    let external = &context["external_functions"][0];
    assert_eq!(external["key"], json!({"module": "B", "name": "g"}));
    assert_eq!(external["sites"], 2);
    assert_eq!(external["signature"], "Int -> Int");
    assert_eq!(context["external_types"][0]["type_kind"], "data");
    assert!(context["local_types"].as_array().unwrap().is_empty());

    let local_only = ok(
        &engine,
        "function_context",
        json!({"function": "A.f", "include_external": false}),
    );
    assert!(local_only["external_functions"].as_array().unwrap().is_empty());
    assert!(local_only["external_types"].as_array().unwrap().is_empty());

    let missing = ok(&engine, "function_context", json!({"function": "A.nope"}));
    assert_eq!(missing["not_found"]["entity"], "function");
}

#[test]
fn function_imports_cover_helpers_and_flag_existing_imports() {
    let (_temp, engine) = coupled();

    let required = ok(&engine, "function_imports", json!({"function": "A.f"}));
    assert_eq!(required["module"], "A");
    let imports = required["imports"].as_array().unwrap();
    assert_eq!(imports.len(), 2);

    assert_eq!(imports[0]["module"], "B");
    assert_eq!(imports[0]["symbols"], json!(["T", "g"]));
    assert_eq!(imports[0]["already_imported"], true);
    assert_eq!(imports[0]["statement"], "import B (T, g)");

    assert_eq!(imports[1]["module"], "Data.Map");
    assert_eq!(imports[1]["in_snapshot"], false);
    assert_eq!(imports[1]["already_imported"], false);
    assert_eq!(imports[1]["statement"], "import Data.Map ((!))");
}
