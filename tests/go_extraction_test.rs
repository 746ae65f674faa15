use std::sync::Arc;

use ckg::config::EngineConfig;
use ckg::extraction::{ExtractOptions, ExtractorRegistry};
use ckg::grammar::{GrammarRegistry, ParserAdapter};
use ckg::types::*;
use ckg::KnowledgeGraph;

fn extract(path: &str, source: &str) -> Extraction {
    let grammars = Arc::new(GrammarRegistry::new());
    let tree = ParserAdapter::new(Arc::clone(&grammars))
        .parse(path, LanguageId::Go, source)
        .unwrap();
    ExtractorRegistry::new()
        .extractor_for(LanguageId::Go)
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

const CIRCLE: &str = r#"// Package shapes draws shapes.
package shapes

import "math"

// Shape has an area.
type Shape interface {
	Area() float64
}

// Circle is round.
type Circle struct {
	Radius, Scale float64
	Shape
}

type Meters float64

type Alias = Circle

const Pi, E = 3.14, 2.71

var (
	Unit = NewCircle(1)
	_    = 0
)

func NewCircle(r float64) *Circle {
	return &Circle{Radius: r}
}

func (c *Circle) Area() float64 {
	return math.Pi * c.Radius * c.Radius * square(1)
}

func square(x float64) float64 { return x * x }
"#;

#[test]
fn test_package_is_a_namespace() {
    let result = extract("shapes/circle.go", CIRCLE);
    let package = one(&result, "shapes");
    assert_eq!(package.kind, SymbolKind::Namespace);
    assert_eq!(package.docstring.as_deref(), Some("Package shapes draws shapes."));
    assert_eq!(
        one(&result, "shapes.NewCircle").container.as_deref(),
        Some(package.id.as_str())
    );
}

#[test]
fn test_interfaces_and_structs() {
    let result = extract("shapes/circle.go", CIRCLE);
    let shape = one(&result, "shapes.Shape");
    assert_eq!(shape.kind, SymbolKind::Class);
    assert_eq!(shape.docstring.as_deref(), Some("Shape has an area."));
    let abstract_area = one(&result, "shapes.Shape.Area");
    assert_eq!(abstract_area.kind, SymbolKind::Method);
    assert_eq!(abstract_area.role, OccurrenceRole::Declaration);

    let circle = one(&result, "shapes.Circle");
    assert_eq!(circle.kind, SymbolKind::Struct);
    assert_eq!(circle.docstring.as_deref(), Some("Circle is round."));
    assert_eq!(one(&result, "shapes.Circle.Radius").kind, SymbolKind::Field);
    assert_eq!(one(&result, "shapes.Circle.Scale").kind, SymbolKind::Field);
    // the embedded interface is not a field
    assert!(result
        .symbols
        .iter()
        .all(|s| s.qualified_name != "shapes.Circle.Shape"));
}

#[test]
fn test_methods_attach_to_receiver_type() {
    let result = extract("shapes/circle.go", CIRCLE);
    let area = one(&result, "shapes.Circle.Area");
    assert_eq!(area.kind, SymbolKind::Method);
    assert_eq!(area.role, OccurrenceRole::Definition);
    assert_eq!(
        area.container.as_deref(),
        Some(symbol_id("shapes.Circle", "").as_str())
    );
}

#[test]
fn test_named_types_and_values() {
    let result = extract("shapes/circle.go", CIRCLE);
    let meters = one(&result, "shapes.Meters");
    assert_eq!(meters.kind, SymbolKind::Typedef);
    assert_eq!(meters.signature, "float64");

    let alias = one(&result, "shapes.Alias");
    assert_eq!(alias.kind, SymbolKind::Typedef);
    let edge = result
        .edges
        .iter()
        .find(|e| e.kind == EdgeKind::TypedefsTo && e.from == alias.id)
        .unwrap();
    assert_eq!(edge.target.as_ref().unwrap().candidates[0], "shapes.Circle");

    for name in ["Pi", "E", "Unit"] {
        assert_eq!(
            one(&result, &format!("shapes.{name}")).kind,
            SymbolKind::Variable
        );
    }
    assert!(result.symbols.iter().all(|s| s.name != "_"));
}

#[test]
fn test_calls_from_methods() {
    let result = extract("shapes/circle.go", CIRCLE);
    let from = symbol_id("shapes.Circle.Area", "");
    let calls: Vec<_> = result
        .edges
        .iter()
        .filter(|e| e.kind == EdgeKind::Calls && e.from == from)
        .collect();
    assert_eq!(calls.len(), 1);
    let candidates = &calls[0].target.as_ref().unwrap().candidates;
    assert!(candidates.contains(&"shapes.square".to_string()));
}

#[tokio::test]
async fn test_package_spans_files() {
    let graph = KnowledgeGraph::in_memory(EngineConfig::default());
    graph
        .index_sources(vec![
            SourceFile::new("geo/point.go", "package geo\n\ntype Point struct {\n\tX, Y int\n}\n"),
            SourceFile::new(
                "geo/dist.go",
                "package geo\n\nfunc (p Point) Dist() int {\n\treturn p.X + p.Y\n}\n",
            ),
        ])
        .await
        .unwrap();

    let package = graph.find_definition("geo").unwrap();
    assert_eq!(package.kind, SymbolKind::Namespace);
    let point = graph.find_definition("geo.Point").unwrap();
    let children: Vec<String> = graph
        .find_children(&point.id)
        .into_iter()
        .map(|c| c.qualified_name)
        .collect();
    assert!(children.contains(&"geo.Point.Dist".to_string()));
    assert!(children.contains(&"geo.Point.X".to_string()));
    assert_eq!(
        graph.find_definition("geo.Point.Dist").unwrap().kind,
        SymbolKind::Method
    );
}
