use codefacts_facts::{EntityRef, FactLoader, NaturalKey, RawModule};
use codefacts_graph::{Direction, EdgeKind, GraphEngine, NodeKind};
use codefacts_protocol::{Limits, NamePattern, Page};
use codefacts_store::{IngestMeta, KnowledgeStore};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn open(modules: Vec<serde_json::Value>) -> (TempDir, KnowledgeStore) {
    let raw: Vec<RawModule> = modules
        .into_iter()
        .map(|m| serde_json::from_value(m).unwrap())
        .collect();
    let snapshot = FactLoader::from_modules(raw).unwrap().snapshot;
    let temp = TempDir::new().unwrap();
    let store = KnowledgeStore::open(temp.path().join("facts.db")).unwrap();
    store.replace_snapshot(&snapshot, &IngestMeta::default()).unwrap();
    (temp, store)
}

fn scenario() -> (TempDir, KnowledgeStore) {
    open(vec![
        serde_json::json!({
            "module": "A",
            "imports": [{"module": "B"}],
            "functions": [{"name": "f", "calls": [{"module": "B", "name": "g", "line": 3, "col": 5}]}]
        }),
        serde_json::json!({"module": "B", "functions": [{"name": "g"}]}),
    ])
}

fn key(module: &str, name: &str) -> EntityRef {
    EntityRef::Key(NaturalKey::new(module, name))
}

fn labels(graph: &codefacts_graph::Subgraph) -> Vec<String> {
    graph.nodes.iter().map(|n| n.key.clone()).collect()
}

#[test]
fn two_module_scenario() {
    let (_temp, store) = scenario();
    let session = store.read().unwrap();
    let engine = GraphEngine::new(&session, Limits::default());

    let closure = engine
        .cross_module_closure(&NamePattern::new("A"), &NamePattern::new("B"), Page::new(100, 0))
        .unwrap();
    assert_eq!(closure.edges.len(), 1);
    assert_eq!(closure.edges.items[0].caller, NaturalKey::new("A", "f"));
    assert_eq!(closure.edges.items[0].callee, NaturalKey::new("B", "g"));

    let calls = engine
        .call_graph(&key("A", "f"), 1, Direction::Callees)
        .unwrap();
    assert_eq!(labels(&calls), vec!["A.f", "B.g"]);
    assert_eq!(calls.edges.len(), 1);
    assert_eq!(calls.edges[0].source, "A.f");
    assert_eq!(calls.edges[0].target, "B.g");

    let imports = engine.import_graph("A", 1, Direction::Callees).unwrap();
    assert_eq!(labels(&imports), vec!["A", "B"]);
    assert_eq!(imports.edges.len(), 1);
    assert_eq!(imports.edges[0].kind, EdgeKind::Imports);
    assert!(imports.nodes.iter().all(|n| n.kind == NodeKind::Module));
}

#[test]
fn depth_zero_is_only_the_root() {
    let (_temp, store) = scenario();
    let session = store.read().unwrap();
    let engine = GraphEngine::new(&session, Limits::default());

    let graph = engine.call_graph(&key("A", "f"), 0, Direction::Both).unwrap();
    assert_eq!(labels(&graph), vec!["A.f"]);
    assert!(graph.edges.is_empty());
}

#[test]
fn callers_direction_walks_backwards() {
    let (_temp, store) = scenario();
    let session = store.read().unwrap();
    let engine = GraphEngine::new(&session, Limits::default());

    let graph = engine.call_graph(&key("B", "g"), 2, Direction::Callers).unwrap();
    assert_eq!(labels(&graph), vec!["B.g", "A.f"]);
    assert_eq!(graph.edges[0].source, "A.f");
}

#[test]
fn recursive_chains_terminate_at_any_depth() {
    let (_temp, store) = open(vec![serde_json::json!({
        "module": "R",
        "functions": [
            {"name": "even", "calls": [{"name": "odd"}]},
            {"name": "odd", "calls": [{"name": "even"}, {"name": "odd"}]}
        ]
    })]);
    let session = store.read().unwrap();
    let engine = GraphEngine::new(&session, Limits::default());

    for depth in [1, 2, 10, 1_000_000] {
        let graph = engine.call_graph(&key("R", "even"), depth, Direction::Both).unwrap();
        let mut keys = labels(&graph);
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), graph.nodes.len(), "duplicate node at depth {depth}");
        assert_eq!(graph.nodes.len(), 2);
    }

    let clamped = engine.call_graph(&key("R", "even"), 99, Direction::Callees).unwrap();
    assert!(clamped.depth_clamped);
    assert_eq!(clamped.depth, 10);
    assert_eq!(clamped.cycles, vec![vec!["R.even".to_string(), "R.odd".to_string()]]);
}

#[test]
fn self_referential_type_scenario() {
    let (_temp, store) = open(vec![serde_json::json!({
        "module": "M",
        "types": [{"name": "T", "constructors": [{"name": "T", "fields": [{"name": "next", "type": "T"}]}]}]
    })]);
    let session = store.read().unwrap();
    let engine = GraphEngine::new(&session, Limits::default());

    let graph = engine.type_dependency_graph(&key("M", "T"), false, None).unwrap();
    assert_eq!(labels(&graph), vec!["M.T"]);
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].source, "M.T");
    assert_eq!(graph.edges[0].target, "M.T");
    assert_eq!(graph.cycles, vec![vec!["M.T".to_string()]]);
}

#[test]
fn mutually_recursive_types_with_dependents() {
    let (_temp, store) = open(vec![serde_json::json!({
        "module": "M",
        "types": [
            {"name": "Tree", "constructors": [{"name": "Node", "fields": [{"type": "Forest"}]}]},
            {"name": "Forest", "constructors": [{"name": "Forest", "fields": [{"name": "trees", "type": "Tree"}]}]}
        ],
        "functions": [{"name": "size", "type_refs": [{"name": "Tree", "relation": "argument"}]}]
    })]);
    let session = store.read().unwrap();
    let engine = GraphEngine::new(&session, Limits::default());

    let graph = engine.type_dependency_graph(&key("M", "Tree"), true, Some(5)).unwrap();
    let mut keys = labels(&graph);
    keys.sort();
    assert_eq!(keys, vec!["M.Forest", "M.Tree", "M.size"]);
    assert_eq!(graph.node("M.size").unwrap().kind, NodeKind::Function);
    assert_eq!(graph.cycles, vec![vec!["M.Forest".to_string(), "M.Tree".to_string()]]);
}

#[test]
fn unknown_roots_are_marked_not_found() {
    let (_temp, store) = scenario();
    let session = store.read().unwrap();
    let engine = GraphEngine::new(&session, Limits::default());

    let graph = engine.call_graph(&EntityRef::Id(4242), 2, Direction::Callees).unwrap();
    assert!(graph.nodes.is_empty());
    assert_eq!(graph.not_found.unwrap().entity, "function");

    let types = engine.type_dependency_graph(&key("A", "Nope"), false, None).unwrap();
    assert!(types.not_found.is_some());

    let closure = engine
        .cross_module_closure(&NamePattern::new("Zed"), &NamePattern::new("B"), Page::new(10, 0))
        .unwrap();
    assert!(closure.edges.not_found.is_some());

    let closure = engine
        .cross_module_closure(&NamePattern::new("A"), &NamePattern::new("Zed"), Page::new(10, 0))
        .unwrap();
    assert_eq!(closure.edges.not_found.unwrap().key, "Zed");
}

#[test]
fn closure_within_one_module_is_empty() {
    let (_temp, store) = open(vec![serde_json::json!({
        "module": "A",
        "functions": [
            {"name": "f", "calls": [{"module": "A", "name": "g"}]},
            {"name": "g"}
        ]
    })]);
    let session = store.read().unwrap();
    let engine = GraphEngine::new(&session, Limits::default());

    let closure = engine
        .cross_module_closure(&NamePattern::new("A"), &NamePattern::new("A"), Page::new(10, 0))
        .unwrap();
    assert!(closure.edges.is_empty());
    assert!(closure.edges.not_found.is_none());

    let callees = engine.callees(&key("A", "f"), Page::new(10, 0)).unwrap();
    assert_eq!(callees.len(), 1);
}

#[test]
fn dangling_callees_are_leaves() {
    let (_temp, store) = open(vec![serde_json::json!({
        "module": "A",
        "functions": [{"name": "main", "calls": [{"module": "System.IO", "name": "putStrLn"}]}]
    })]);
    let session = store.read().unwrap();
    let engine = GraphEngine::new(&session, Limits::default());

    let graph = engine.call_graph(&key("A", "main"), 3, Direction::Callees).unwrap();
    let external = graph.node("System.IO.putStrLn").unwrap();
    assert!(external.dangling);
    assert_eq!(external.id, None);
}

#[test]
fn module_dependencies_list_both_directions() {
    let (_temp, store) = scenario();
    let session = store.read().unwrap();
    let engine = GraphEngine::new(&session, Limits::default());

    let deps = engine.module_dependencies("B").unwrap();
    assert!(deps.imports.is_empty());
    assert_eq!(deps.imported_by.len(), 1);
    assert_eq!(deps.imported_by[0].module, "A");

    let most = engine.most_called(None, Page::new(10, 0)).unwrap();
    assert_eq!(most.items[0].function.key, NaturalKey::new("B", "g"));
}
