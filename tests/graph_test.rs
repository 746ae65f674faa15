use std::sync::Arc;

use ckg::extraction::{ExtractOptions, ExtractorRegistry};
use ckg::grammar::{GrammarRegistry, ParserAdapter};
use ckg::graph::{GraphStore, QueryEngine};
use ckg::types::*;

/// Parses and extracts `source`, then commits it to `store`.
fn commit(store: &GraphStore, path: &str, source: &str) {
    let grammars = Arc::new(GrammarRegistry::new());
    let language = grammars.resolve_language(path).unwrap();
    let tree = ParserAdapter::new(Arc::clone(&grammars))
        .parse(path, language, source)
        .unwrap();
    let extraction = ExtractorRegistry::new()
        .extractor_for(language)
        .unwrap()
        .extract(&grammars, &tree, path, source, ExtractOptions::default());
    let hash = ckg::sync::content_hash(source);
    store.upsert_file(path, language, &hash, 1_700_000_000, extraction);
}

const BASE: &str = r#"
class Base {
public:
    virtual void draw();
    virtual void resize(int factor);
};
"#;

const DERIVED: &str = r#"
class Derived : public Base {
public:
    void draw() override;
    void resize(double factor);
};
"#;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[test]
fn test_upsert_and_remove_leave_no_trace() {
    let store = GraphStore::new();
    commit(&store, "a.c", "int f(void) { return 1; }\n");
    let stats = store.stats();
    assert_eq!(stats.file_count, 1);
    // the file root and f
    assert_eq!(stats.symbol_count, 2);
    assert_eq!(stats.edges_by_kind.get("contains"), Some(&1));

    assert!(store.remove_file("a.c"));
    let stats = store.stats();
    assert_eq!(stats.file_count, 0);
    assert_eq!(stats.symbol_count, 0);
    assert_eq!(stats.edge_count, 0);
    assert!(!store.remove_file("a.c"));
}

#[test]
fn test_reindex_replaces_contribution() {
    let store = GraphStore::new();
    commit(&store, "a.c", "int f(void) { return 1; }\n");
    commit(&store, "a.c", "int g(void) { return 2; }\n");

    let state = store.read();
    assert!(state.lookup_by_qualified_name("f").is_empty());
    assert_eq!(state.lookup_by_qualified_name("g").len(), 1);
    assert_eq!(state.file("a.c").unwrap().seq, 2);
    assert_eq!(state.seq(), 2);
}

#[test]
fn test_file_record_counts_and_top_level() {
    let store = GraphStore::new();
    commit(&store, "p.h", "struct P { int x; };\nint helper(void);\n");
    let state = store.read();
    let record = state.file("p.h").unwrap();
    assert_eq!(record.language, LanguageId::C);
    assert_eq!(record.symbol_count, 3);
    assert_eq!(
        record.top_level,
        vec![symbol_id("P", ""), symbol_id("helper", "()")]
    );
}

#[test]
fn test_symbol_spanning_files_survives_partial_removal() {
    let store = GraphStore::new();
    commit(&store, "math.h", "int add(int a, int b);\n");
    commit(&store, "math.c", "int add(int a, int b) { return a + b; }\n");

    let id = symbol_id("add", "(int, int)");
    {
        let state = store.read();
        let add = state.symbol(&id).unwrap();
        assert!(add.is_definition);
        assert_eq!(add.contributors, vec!["math.c".to_string(), "math.h".to_string()]);
        assert_eq!(state.occurrences_of(&id).len(), 2);
    }

    store.remove_file("math.c");
    let state = store.read();
    let add = state.symbol(&id).unwrap();
    assert!(add.is_declaration_only);
    assert_eq!(add.contributors, vec!["math.h".to_string()]);
}

#[test]
fn test_unresolved_edge_waits_for_target() {
    let store = GraphStore::new();
    commit(&store, "derived.hpp", DERIVED);
    {
        let state = store.read();
        // draw and resize each look for a Base counterpart
        assert_eq!(state.pending_edges().len(), 2);
    }

    commit(&store, "base.hpp", BASE);
    let report = store.sweep(4);
    // resize(double) does not override resize(int)
    assert_eq!(report.resolved, 1);
    assert_eq!(report.remaining, 1);

    let queries = QueryEngine::new(&store);
    let base_draw = symbol_id("Base::draw", "()");
    let overrides = queries.find_overrides_of(&base_draw);
    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides[0].qualified_name, "Derived::draw");
    assert!(queries
        .find_overrides_of(&symbol_id("Base::resize", "(int)"))
        .is_empty());
}

#[test]
fn test_removing_target_reverts_edge_to_pending() {
    let store = GraphStore::new();
    commit(&store, "base.hpp", BASE);
    commit(&store, "derived.hpp", DERIVED);
    let base_draw = symbol_id("Base::draw", "()");
    assert_eq!(QueryEngine::new(&store).find_overrides_of(&base_draw).len(), 1);
    let unresolved_before = store.stats().unresolved_edge_count;

    store.remove_file("base.hpp");
    assert_eq!(store.stats().unresolved_edge_count, unresolved_before + 1);
    assert!(QueryEngine::new(&store).find_overrides_of(&base_draw).is_empty());

    commit(&store, "base.hpp", BASE);
    store.sweep(1);
    assert_eq!(QueryEngine::new(&store).find_overrides_of(&base_draw).len(), 1);
}

#[test]
fn test_snapshot_is_deterministic() {
    let build = || {
        let store = GraphStore::new();
        commit(&store, "base.hpp", BASE);
        commit(&store, "derived.hpp", DERIVED);
        commit(&store, "util.c", "int util(void) { return 0; }\n");
        store.sweep(8);
        store.snapshot()
    };
    let a = build();
    let b = build();
    assert_eq!(a, b);
    assert_eq!(a.files.len(), 3);
    let mut sorted = a.edges.clone();
    sorted.sort();
    assert_eq!(a.edges, sorted);
}

#[test]
fn test_contribution_round_trips_through_restore() {
    let store = GraphStore::new();
    commit(&store, "base.hpp", BASE);
    commit(&store, "derived.hpp", DERIVED);
    store.sweep(1);

    let contributions: Vec<_> = ["derived.hpp", "base.hpp"]
        .iter()
        .map(|p| store.contribution(p).unwrap())
        .collect();
    let restored = GraphStore::new();
    let report = restored.restore(contributions);
    assert_eq!(report.remaining, store.stats().unresolved_edge_count as usize);
    assert_eq!(restored.snapshot(), store.snapshot());
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

const LIBRARY: &str = r#"
namespace lib {

/// A drawable thing.
class Shape {
public:
    virtual double area() const;
    int id;
};

int max(int a, int b);
double max(double a, double b);

typedef struct Node { int value; } Node;

template <typename T>
class Box {
public:
    T get() const;
};

template <>
class Box<int> {
public:
    int get() const;
};

class Account {
    friend void audit(const Account& a);
};

}
"#;

fn library() -> GraphStore {
    let store = GraphStore::new();
    commit(&store, "lib.hpp", LIBRARY);
    commit(
        &store,
        "lib.cpp",
        "namespace lib {\nint max(int a, int b) { return a > b ? a : b; }\n}\n",
    );
    store.sweep(1);
    store
}

#[test]
fn test_find_definition_prefers_definitions() {
    let store = library();
    let queries = QueryEngine::new(&store);
    let max = queries.find_definition("lib::max").unwrap();
    assert_eq!(max.signature, "(int, int)");
    assert!(max.is_definition);
    assert_eq!(max.definition_file.as_deref(), Some("lib.cpp"));
    assert!(queries.find_definition("lib::missing").is_none());
}

#[test]
fn test_find_definition_prefers_record_over_typedef() {
    let store = library();
    let queries = QueryEngine::new(&store);
    let node = queries.find_definition("lib::Node").unwrap();
    assert_eq!(node.kind, SymbolKind::Struct);

    let typedefs = queries.search_by_kind(SymbolKind::Typedef, "Node");
    assert_eq!(typedefs.len(), 1);
    let state = store.read();
    let targets = state.outgoing_edges(&typedefs[0].id, Some(EdgeKind::TypedefsTo));
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].to.as_deref(), Some(node.id.as_str()));
}

#[test]
fn test_find_definition_with_signature() {
    let store = library();
    let queries = QueryEngine::new(&store);
    let max = queries
        .find_definition_with_signature("lib::max", "(double,double)")
        .unwrap();
    assert_eq!(max.signature, "(double, double)");
    assert!(max.is_declaration_only);
    assert!(queries
        .find_definition_with_signature("lib::max", "(char)")
        .is_none());
}

#[test]
fn test_find_declarations_and_definitions() {
    let store = library();
    let queries = QueryEngine::new(&store);
    let locations = queries.find_declarations_and_definitions("lib::max");
    assert_eq!(locations.len(), 3);
    assert_eq!(locations[0].location.file, "lib.cpp");
    assert_eq!(locations[0].role, OccurrenceRole::Definition);
    assert!(locations[1..].iter().all(|l| l.location.file == "lib.hpp"));
    assert!(locations[1].location.span.start_line < locations[2].location.span.start_line);
}

#[test]
fn test_find_children_in_source_order() {
    let store = library();
    let queries = QueryEngine::new(&store);
    let shape = queries.find_definition("lib::Shape").unwrap();
    assert_eq!(shape.docstring.as_deref(), Some("A drawable thing."));
    let names: Vec<String> = queries
        .find_children(&shape.id)
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["area", "id"]);
    assert!(queries.find_children("sym:unknown").is_empty());
}

#[test]
fn test_namespace_children_span_files() {
    let store = library();
    let queries = QueryEngine::new(&store);
    let ns = queries.find_definition("lib").unwrap();
    assert_eq!(ns.contributors, vec!["lib.cpp".to_string(), "lib.hpp".to_string()]);
    let children = queries.find_children(&ns.id);
    assert!(children.iter().any(|c| c.qualified_name == "lib::Shape"));
    assert!(children.iter().any(|c| c.qualified_name == "lib::audit"));
    assert_eq!(
        children
            .iter()
            .filter(|c| c.qualified_name == "lib::max")
            .count(),
        2
    );
}

#[test]
fn test_specializations_and_friends() {
    let store = library();
    let queries = QueryEngine::new(&store);
    let boxes = queries.search_by_kind(SymbolKind::Template, "Box");
    assert_eq!(boxes.len(), 1);
    let specializations = queries.specializations_of(&boxes[0].id);
    assert_eq!(specializations.len(), 1);
    assert_eq!(specializations[0].signature, "<int>");

    let account = queries.find_definition("lib::Account").unwrap();
    let friends = queries.friends_of(&account.id);
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0].qualified_name, "lib::audit");
}

#[test]
fn test_search_by_name_substring() {
    let store = library();
    let queries = QueryEngine::new(&store);
    let found: Vec<String> = queries
        .search_by_name_substring("ax")
        .into_iter()
        .map(|s| s.qualified_name)
        .collect();
    assert_eq!(found, vec!["lib::max", "lib::max"]);
    // case-sensitive
    assert!(queries.search_by_name_substring("MAX").is_empty());
    // file roots are not search results
    assert!(queries.search_by_name_substring("lib.hpp").is_empty());
}

#[test]
fn test_search_by_kind_matches_qualified_suffix() {
    let store = library();
    let queries = QueryEngine::new(&store);
    assert_eq!(queries.search_by_kind(SymbolKind::Class, "Shape").len(), 1);
    assert_eq!(queries.search_by_kind(SymbolKind::Class, "lib::Shape").len(), 1);
    assert_eq!(queries.search_by_kind(SymbolKind::Method, "Shape::area").len(), 1);
    assert!(queries.search_by_kind(SymbolKind::Class, "ape").is_empty());
    assert!(queries.search_by_kind(SymbolKind::Struct, "Shape").is_empty());
}

#[test]
fn test_find_class_methods() {
    let store = library();
    let queries = QueryEngine::new(&store);
    let methods = queries.find_class_methods("Shape", None);
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].name, "area");
    assert_eq!(methods[0].signature, "() const");
    assert!(queries.find_class_methods("Shape", Some("perimeter")).is_empty());
    assert!(queries.find_class_methods("Nope", None).is_empty());
}

#[test]
fn test_calls_are_queryable_but_separate() {
    let store = GraphStore::new();
    commit(
        &store,
        "calls.c",
        "int leaf(void) { return 1; }\nint root(void) { return leaf(); }\n",
    );
    store.sweep(1);
    let queries = QueryEngine::new(&store);
    let leaf = symbol_id("leaf", "()");
    let callers = queries.callers_of(&leaf);
    assert_eq!(callers.len(), 1);
    assert_eq!(callers[0].name, "root");
    // calls never show up as children
    assert!(queries.find_children(&leaf).is_empty());
    assert!(queries.unresolved_edges().is_empty());
}

#[test]
fn test_ambiguous_suffix_match_is_order_independent() {
    const CALLER: &str = "namespace a { void run() { helper(); } }\n";
    const X: &str = "namespace x { void helper() {} }\n";
    const Y: &str = "namespace y { void helper() {} }\n";
    let x_helper = symbol_id("x::helper", "()");
    let y_helper = symbol_id("y::helper", "()");

    let store = GraphStore::new();
    commit(&store, "caller.cpp", CALLER);
    commit(&store, "x.cpp", X);
    store.sweep(1);
    let callers = QueryEngine::new(&store).callers_of(&x_helper);
    assert_eq!(callers.len(), 1);
    assert_eq!(callers[0].qualified_name, "a::run");

    // a second helper makes the unqualified call ambiguous
    commit(&store, "y.cpp", Y);
    store.sweep(1);
    assert!(QueryEngine::new(&store).callers_of(&x_helper).is_empty());
    assert!(QueryEngine::new(&store).callers_of(&y_helper).is_empty());

    let reversed = GraphStore::new();
    commit(&reversed, "y.cpp", Y);
    commit(&reversed, "x.cpp", X);
    commit(&reversed, "caller.cpp", CALLER);
    reversed.sweep(1);
    assert!(QueryEngine::new(&reversed).callers_of(&x_helper).is_empty());
    assert_eq!(store.snapshot().edges, reversed.snapshot().edges);
}
