use std::sync::Arc;

use ckg::config::EngineConfig;
use ckg::extraction::{ExtractOptions, ExtractorRegistry};
use ckg::grammar::{GrammarRegistry, ParserAdapter};
use ckg::types::*;
use ckg::KnowledgeGraph;

fn extract(path: &str, source: &str) -> Extraction {
    let grammars = Arc::new(GrammarRegistry::new());
    let tree = ParserAdapter::new(Arc::clone(&grammars))
        .parse(path, LanguageId::Rust, source)
        .unwrap();
    ExtractorRegistry::new()
        .extractor_for(LanguageId::Rust)
        .unwrap()
        .extract(&grammars, &tree, path, source, ExtractOptions::default())
}

fn one<'a>(extraction: &'a Extraction, qualified_name: &str) -> &'a CandidateSymbol {
    let found: Vec<_> = extraction
        .symbols
        .iter()
        .filter(|s| s.qualified_name == qualified_name)
        .collect();
    assert_eq!(found.len(), 1, "expected exactly one '{}'", qualified_name);
    found[0]
}

const SHAPES: &str = r#"//! Shapes.

use std::fmt;

/// Something with an area.
/// Measured in square units.
pub trait Shape: fmt::Debug {
    fn area(&self) -> f64;

    fn name(&self) -> String {
        String::from("shape")
    }
}

/// A circle.
#[derive(Debug)]
pub struct Circle {
    pub radius: f64,
}

pub enum Kind {
    Round,
    Square(u32),
}

impl Circle {
    pub const UNIT: f64 = 1.0;

    pub fn new(radius: f64) -> Self {
        Self::check(radius);
        Circle { radius }
    }

    fn check(r: f64) -> bool {
        helper(r)
    }
}

impl Shape for Circle {
    fn area(&self) -> f64 {
        3.14 * self.radius * self.radius
    }
}

impl fmt::Display for Circle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "circle")
    }
}

pub type Round = Circle;

macro_rules! square {
    ($x:expr) => {
        $x * $x
    };
}

fn helper(r: f64) -> bool {
    r > 0.0
}

mod inner {
    pub fn deep() {}
}

mod tests;
"#;

#[test]
fn test_module_path_comes_from_src_layout() {
    let result = extract("src/geo/shapes.rs", SHAPES);
    assert_eq!(one(&result, "geo").kind, SymbolKind::Namespace);
    assert_eq!(one(&result, "geo::shapes").kind, SymbolKind::Namespace);
    assert_eq!(one(&result, "geo::shapes::inner").kind, SymbolKind::Namespace);
    assert_eq!(
        one(&result, "geo::shapes::inner::deep").kind,
        SymbolKind::Function
    );

    let declared = one(&result, "geo::shapes::tests");
    assert_eq!(declared.kind, SymbolKind::Namespace);
    assert_eq!(declared.role, OccurrenceRole::Declaration);

    // crate roots and mod.rs add no segment
    let root = extract("src/lib.rs", "pub fn run() {}\n");
    assert_eq!(one(&root, "run").kind, SymbolKind::Function);
    let nested = extract("src/geo/mod.rs", "pub fn area() {}\n");
    assert_eq!(one(&nested, "geo::area").kind, SymbolKind::Function);
}

#[test]
fn test_traits_structs_and_enums() {
    let result = extract("src/geo/shapes.rs", SHAPES);
    let shape = one(&result, "geo::shapes::Shape");
    assert_eq!(shape.kind, SymbolKind::Class);
    assert_eq!(
        shape.docstring.as_deref(),
        Some("Something with an area.\nMeasured in square units.")
    );
    let area = one(&result, "geo::shapes::Shape::area");
    assert_eq!(area.kind, SymbolKind::Method);
    assert_eq!(area.role, OccurrenceRole::Declaration);
    assert_eq!(
        one(&result, "geo::shapes::Shape::name").role,
        OccurrenceRole::Definition
    );

    let circle = one(&result, "geo::shapes::Circle");
    assert_eq!(circle.kind, SymbolKind::Struct);
    // the derive attribute sits between the doc comment and the item
    assert_eq!(circle.docstring.as_deref(), Some("A circle."));
    assert_eq!(one(&result, "geo::shapes::Circle::radius").kind, SymbolKind::Field);

    assert_eq!(one(&result, "geo::shapes::Kind").kind, SymbolKind::Enum);
    assert_eq!(one(&result, "geo::shapes::Kind::Round").kind, SymbolKind::Field);
    assert_eq!(one(&result, "geo::shapes::Kind::Square").kind, SymbolKind::Field);
}

#[test]
fn test_impl_members_attach_to_the_type() {
    let result = extract("src/geo/shapes.rs", SHAPES);
    let circle_id = symbol_id("geo::shapes::Circle", "");

    let new = one(&result, "geo::shapes::Circle::new");
    assert_eq!(new.kind, SymbolKind::Method);
    assert_eq!(new.signature, "");
    assert_eq!(new.container.as_deref(), Some(circle_id.as_str()));

    let unit = one(&result, "geo::shapes::Circle::UNIT");
    assert_eq!(unit.kind, SymbolKind::Field);
    assert_eq!(unit.container.as_deref(), Some(circle_id.as_str()));
}

#[test]
fn test_trait_impl_methods_override_the_trait() {
    let result = extract("src/geo/shapes.rs", SHAPES);
    let area = one(&result, "geo::shapes::Circle::area");
    assert_eq!(area.signature, "impl Shape");
    let fmt = one(&result, "geo::shapes::Circle::fmt");
    assert_eq!(fmt.signature, "impl fmt::Display");

    let edge = result
        .edges
        .iter()
        .find(|e| e.kind == EdgeKind::Overrides && e.from == area.id)
        .unwrap();
    let target = edge.target.as_ref().unwrap();
    assert_eq!(target.candidates[0], "geo::shapes::Shape::area");
    assert_eq!(target.signature.as_deref(), Some(""));

    // inherent methods override nothing
    assert!(!result
        .edges
        .iter()
        .any(|e| e.kind == EdgeKind::Overrides
            && e.from == symbol_id("geo::shapes::Circle::new", "")));
}

#[test]
fn test_aliases_and_macros() {
    let result = extract("src/geo/shapes.rs", SHAPES);
    let round = one(&result, "geo::shapes::Round");
    assert_eq!(round.kind, SymbolKind::Typedef);
    assert_eq!(round.signature, "Circle");
    let typedef_edge = result
        .edges
        .iter()
        .find(|e| e.kind == EdgeKind::TypedefsTo && e.from == round.id)
        .unwrap();
    assert_eq!(
        typedef_edge.target.as_ref().unwrap().candidates[0],
        "geo::shapes::Circle"
    );

    assert_eq!(one(&result, "geo::shapes::square").kind, SymbolKind::Macro);
    assert_eq!(one(&result, "geo::shapes::helper").kind, SymbolKind::Function);
}

#[test]
fn test_calls_through_self_paths() {
    let result = extract("src/geo/shapes.rs", SHAPES);
    let calls_from = |qualified_name: &str| -> Vec<Vec<String>> {
        let from = symbol_id(qualified_name, "");
        result
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Calls && e.from == from)
            .map(|e| e.target.as_ref().unwrap().candidates.clone())
            .collect()
    };

    let from_new = calls_from("geo::shapes::Circle::new");
    assert_eq!(from_new, vec![vec!["geo::shapes::Circle::check".to_string()]]);

    let from_check = calls_from("geo::shapes::Circle::check");
    assert_eq!(from_check.len(), 1);
    assert!(from_check[0].contains(&"geo::shapes::helper".to_string()));
}

#[tokio::test]
async fn test_impl_in_another_file_overrides_trait_method() {
    let graph = KnowledgeGraph::in_memory(EngineConfig::default());
    graph
        .index_sources(vec![
            SourceFile::new(
                "src/shape.rs",
                "pub trait Shape {\n    fn area(&self) -> f64;\n}\n",
            ),
            SourceFile::new(
                "src/square.rs",
                "use crate::shape::Shape;\n\npub struct Square;\n\nimpl crate::shape::Shape for Square {\n    fn area(&self) -> f64 { 1.0 }\n}\n",
            ),
        ])
        .await
        .unwrap();

    let base = symbol_id("shape::Shape::area", "");
    let overrides = graph.find_overrides_of(&base);
    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides[0].qualified_name, "square::Square::area");
    assert_eq!(overrides[0].kind, SymbolKind::Method);
}
