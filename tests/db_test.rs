use std::sync::Arc;

use ckg::db::Database;
use ckg::extraction::{ExtractOptions, ExtractorRegistry};
use ckg::grammar::{GrammarRegistry, ParserAdapter};
use ckg::graph::{Contribution, GraphStore};
use ckg::types::*;
use ckg::KnowledgeGraph;
use tempfile::TempDir;

/// Helper: create a temp database and return (Database, TempDir).
/// The TempDir is returned so that it stays alive for the duration of the test.
fn setup_db() -> (Database, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let db_path = dir.path().join("test.db");
    let db = Database::initialize(&db_path).expect("failed to initialize database");
    (db, dir)
}

/// Helper: commit `source` to `store` and return the file's contribution.
fn contribution(store: &GraphStore, path: &str, source: &str) -> Contribution {
    let grammars = Arc::new(GrammarRegistry::new());
    let language = grammars.resolve_language(path).unwrap();
    let tree = ParserAdapter::new(Arc::clone(&grammars))
        .parse(path, language, source)
        .unwrap();
    let extraction = ExtractorRegistry::new()
        .extractor_for(language)
        .unwrap()
        .extract(&grammars, &tree, path, source, ExtractOptions::default());
    store.upsert_file(path, language, &ckg::sync::content_hash(source), 1000, extraction);
    store.contribution(path).expect("contribution should exist")
}

#[test]
fn test_initialize_creates_database() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let db_path = dir.path().join("subdir").join("ckg.db");
    let _db = Database::initialize(&db_path).expect("failed to initialize database");
    assert!(db_path.exists(), "database file should exist after initialize");
}

#[test]
fn test_open_missing_database_fails() {
    let dir = TempDir::new().unwrap();
    let result = Database::open(&dir.path().join("missing.db"));
    assert!(result.is_err());
}

#[test]
fn test_save_and_load_contribution() {
    let (db, _dir) = setup_db();
    let store = GraphStore::new();
    let saved = contribution(&store, "math.c", "int add(int a, int b) { return a + b; }\n");

    db.save_contribution(&saved).expect("failed to save contribution");

    let loaded = db.load_contributions().expect("failed to load contributions");
    assert_eq!(loaded, vec![saved.clone()]);

    let record = db
        .get_file("math.c")
        .expect("failed to get file")
        .expect("file should exist");
    assert_eq!(record, saved.record);
    assert_eq!(record.language, LanguageId::C);
    assert_eq!(record.top_level, vec![symbol_id("add", "(int, int)")]);
}

#[test]
fn test_save_replaces_previous_contribution() {
    let (db, _dir) = setup_db();
    let store = GraphStore::new();
    db.save_contribution(&contribution(&store, "a.c", "int f(void);\n"))
        .unwrap();
    let newer = contribution(&store, "a.c", "int g(void);\n");
    db.save_contribution(&newer).unwrap();

    assert_eq!(db.file_count().unwrap(), 1);
    let loaded = db.load_contributions().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].record.seq, 2);
    assert!(loaded[0].occurrences.iter().any(|o| o.name == "g"));
}

#[test]
fn test_contributions_load_in_commit_order() {
    let (db, _dir) = setup_db();
    let store = GraphStore::new();
    let first = contribution(&store, "z.c", "int z;\n");
    let second = contribution(&store, "a.c", "int a;\n");
    db.save_contribution(&second).unwrap();
    db.save_contribution(&first).unwrap();

    let paths: Vec<String> = db
        .load_contributions()
        .unwrap()
        .into_iter()
        .map(|c| c.record.path)
        .collect();
    assert_eq!(paths, vec!["z.c", "a.c"]);

    let by_path: Vec<String> = db
        .get_all_files()
        .unwrap()
        .into_iter()
        .map(|f| f.path)
        .collect();
    assert_eq!(by_path, vec!["a.c", "z.c"]);
}

#[test]
fn test_delete_file() {
    let (db, _dir) = setup_db();
    let store = GraphStore::new();
    db.save_contribution(&contribution(&store, "a.c", "int a;\n"))
        .unwrap();
    db.delete_file("a.c").unwrap();
    assert!(db.get_file("a.c").unwrap().is_none());
    // deleting twice is fine
    db.delete_file("a.c").unwrap();
}

#[test]
fn test_clear() {
    let (db, _dir) = setup_db();
    let store = GraphStore::new();
    db.save_contribution(&contribution(&store, "a.c", "int a;\n"))
        .unwrap();
    db.save_contribution(&contribution(&store, "b.c", "int b;\n"))
        .unwrap();
    db.clear().unwrap();
    assert_eq!(db.file_count().unwrap(), 0);
    assert!(db.load_contributions().unwrap().is_empty());
}

#[test]
fn test_metadata() {
    let (db, _dir) = setup_db();
    assert!(db.get_metadata("config_version").unwrap().is_none());
    db.set_metadata("config_version", "1").unwrap();
    db.set_metadata("config_version", "2").unwrap();
    assert_eq!(db.get_metadata("config_version").unwrap().as_deref(), Some("2"));
}

#[test]
fn test_in_memory_database() {
    let db = Database::in_memory().unwrap();
    assert_eq!(db.file_count().unwrap(), 0);
    assert!(db.size().unwrap() > 0);
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

fn write_project(dir: &TempDir) {
    let src = dir.path().join("src");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(
        src.join("base.hpp"),
        "class Base {\npublic:\n    virtual void draw();\n};\n",
    )
    .unwrap();
    std::fs::write(
        src.join("derived.hpp"),
        "class Derived : public Base {\npublic:\n    void draw() override;\n};\n",
    )
    .unwrap();
    std::fs::write(
        src.join("main.c"),
        "int helper(void);\nint main(void) { return helper(); }\n",
    )
    .unwrap();
}

#[tokio::test]
async fn test_reopened_graph_matches_indexed_graph() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);

    let snapshot = {
        let graph = KnowledgeGraph::init(dir.path()).unwrap();
        let report = graph.index_project().await.unwrap();
        assert_eq!(report.committed, 3);
        graph.snapshot()
    };

    assert!(KnowledgeGraph::is_initialized(dir.path()));
    let reopened = KnowledgeGraph::open(dir.path()).unwrap();
    assert_eq!(reopened.snapshot(), snapshot);

    let base_draw = symbol_id("Base::draw", "()");
    let overrides = reopened.find_overrides_of(&base_draw);
    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides[0].qualified_name, "Derived::draw");
}

#[tokio::test]
async fn test_reopened_graph_skips_unchanged_files() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);
    {
        let graph = KnowledgeGraph::init(dir.path()).unwrap();
        graph.index_project().await.unwrap();
    }

    let reopened = KnowledgeGraph::open(dir.path()).unwrap();
    let report = reopened.index_project().await.unwrap();
    assert_eq!(report.committed, 0);
    assert_eq!(report.skipped, 3);
    assert_eq!(
        report.diagnostic("src/main.c").unwrap().messages,
        vec!["unchanged".to_string()]
    );
}

#[tokio::test]
async fn test_removed_file_is_removed_from_database() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);
    {
        let graph = KnowledgeGraph::init(dir.path()).unwrap();
        graph.index_project().await.unwrap();
        assert!(graph.remove_file("src/main.c").unwrap());
    }

    let reopened = KnowledgeGraph::open(dir.path()).unwrap();
    assert_eq!(reopened.stats().file_count, 2);
    assert!(reopened.find_definition("main").is_none());
}

#[test]
fn test_open_uninitialized_project_fails() {
    let dir = TempDir::new().unwrap();
    assert!(!KnowledgeGraph::is_initialized(dir.path()));
    assert!(KnowledgeGraph::open(dir.path()).is_err());
}

#[test]
fn test_database_size_only_for_persistent_graphs() {
    let dir = TempDir::new().unwrap();
    let graph = KnowledgeGraph::init(dir.path()).unwrap();
    assert!(graph.database_size().unwrap().unwrap() > 0);

    let in_memory = KnowledgeGraph::in_memory(Default::default());
    assert!(in_memory.database_size().unwrap().is_none());
}

#[test]
fn test_unknown_language_in_row_is_an_error() {
    let (db, _dir) = setup_db();
    db.conn()
        .execute(
            "INSERT INTO files (path, language, content_hash, indexed_at, seq, contribution)
             VALUES ('odd.x', 'cobol', 'abc', 0, 1, '{}')",
            [],
        )
        .unwrap();

    let err = db.get_file("odd.x").unwrap_err();
    assert!(matches!(err, ckg::errors::CkgError::Database { .. }));
    assert!(err.to_string().contains("cobol"));
    assert!(db.get_all_files().is_err());
}
