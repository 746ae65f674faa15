use ckg::resolution::{FileContext, IdentityResolver, SymbolLookup};
use ckg::types::*;

/// A flat list of symbols standing in for the graph.
struct Symbols(Vec<SymbolNode>);

impl SymbolLookup for Symbols {
    fn symbol(&self, id: &str) -> Option<&SymbolNode> {
        self.0.iter().find(|s| s.id == id)
    }

    fn symbols_with_qualified_name(&self, qualified_name: &str) -> Vec<&SymbolNode> {
        self.0
            .iter()
            .filter(|s| s.qualified_name == qualified_name)
            .collect()
    }

    fn symbols_named(&self, name: &str) -> Vec<&SymbolNode> {
        self.0.iter().filter(|s| s.name == name).collect()
    }
}

fn span(line: u32) -> Span {
    Span {
        start_line: line,
        start_column: 0,
        end_line: line,
        end_column: 20,
    }
}

fn occurrence(
    qualified_name: &str,
    kind: SymbolKind,
    role: OccurrenceRole,
    file: &str,
    seq: u64,
    line: u32,
) -> Occurrence {
    let name = qualified_name.rsplit("::").next().unwrap().to_string();
    Occurrence {
        symbol: symbol_id(qualified_name, ""),
        kind,
        name,
        qualified_name: qualified_name.to_string(),
        signature: String::new(),
        container: Some(file_id(file)),
        role,
        span: span(line),
        header: format!("header of {qualified_name} in {file}"),
        docstring: None,
        file: file.to_string(),
        language: LanguageId::Cpp,
        seq,
    }
}

fn symbol(qualified_name: &str, signature: &str, kind: SymbolKind) -> SymbolNode {
    let name = qualified_name.rsplit("::").next().unwrap().to_string();
    SymbolNode {
        id: symbol_id(qualified_name, signature),
        kind,
        name,
        qualified_name: qualified_name.to_string(),
        signature: signature.to_string(),
        header: String::new(),
        docstring: None,
        language: LanguageId::Cpp,
        container: None,
        declaring_file: None,
        definition_file: Some("x.cpp".to_string()),
        definition: None,
        declarations: Vec::new(),
        alternate_definitions: Vec::new(),
        is_definition: true,
        is_declaration_only: false,
        contributors: vec!["x.cpp".to_string()],
    }
}

fn named_edge(from: &str, candidates: &[&str], signature: Option<&str>, expect: Option<KindFamily>) -> EdgeRecord {
    EdgeRecord {
        from: from.to_string(),
        to: None,
        kind: EdgeKind::TypedefsTo,
        target: Some(TargetRef {
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
            signature: signature.map(str::to_string),
            expect,
        }),
        confirmed: true,
        file: "x.cpp".to_string(),
        line: 1,
    }
}

// ---------------------------------------------------------------------------
// resolve
// ---------------------------------------------------------------------------

#[test]
fn test_resolve_stamps_origin_and_collects_top_level() {
    let root = file_id("a.c");
    let f = symbol_id("f", "");
    let candidate = |role, line| CandidateSymbol {
        id: f.clone(),
        kind: SymbolKind::Function,
        name: "f".to_string(),
        qualified_name: "f".to_string(),
        signature: String::new(),
        container: Some(root.clone()),
        role,
        span: span(line),
        header: "int f(void)".to_string(),
        docstring: None,
    };
    let contains = EdgeRecord {
        from: root.clone(),
        to: Some(f.clone()),
        kind: EdgeKind::Contains,
        target: None,
        confirmed: true,
        file: "a.c".to_string(),
        line: 1,
    };
    let extraction = Extraction {
        symbols: vec![
            candidate(OccurrenceRole::Declaration, 1),
            candidate(OccurrenceRole::Definition, 3),
            // the same site reached twice
            candidate(OccurrenceRole::Definition, 3),
        ],
        edges: vec![contains.clone(), contains.clone()],
        warnings: vec!["a.c:9: skipped anonymous record".to_string()],
    };
    let context = FileContext {
        path: "a.c".to_string(),
        language: LanguageId::C,
        seq: 7,
    };

    let resolution = IdentityResolver::new().resolve(&context, extraction);
    assert_eq!(resolution.occurrences.len(), 2);
    assert!(resolution.occurrences.iter().all(|o| o.seq == 7 && o.file == "a.c"));
    assert_eq!(resolution.top_level, vec![f]);
    assert_eq!(resolution.edges.len(), 1);
    assert_eq!(resolution.warnings.len(), 1);
}

// ---------------------------------------------------------------------------
// derive_view
// ---------------------------------------------------------------------------

#[test]
fn test_declaration_and_definition_fold_into_one_view() {
    let decl = occurrence("add", SymbolKind::Function, OccurrenceRole::Declaration, "math.h", 1, 2);
    let mut def = occurrence("add", SymbolKind::Function, OccurrenceRole::Definition, "math.c", 2, 4);
    def.docstring = None;
    let mut decl_with_doc = decl.clone();
    decl_with_doc.docstring = Some("Adds two numbers.".to_string());

    let (node, conflict) = IdentityResolver::new()
        .derive_view(&[&decl_with_doc, &def], |_| false)
        .unwrap();
    assert!(conflict.is_none());
    assert_eq!(node.kind, SymbolKind::Function);
    assert!(node.is_definition);
    assert!(!node.is_declaration_only);
    assert_eq!(node.definition_file.as_deref(), Some("math.c"));
    assert_eq!(node.declaring_file.as_deref(), Some("math.h"));
    assert_eq!(node.declarations.len(), 1);
    assert_eq!(node.declarations[0].file, "math.h");
    assert_eq!(node.contributors, vec!["math.c".to_string(), "math.h".to_string()]);
    // the definition wins the header, the declaration supplies the docstring
    assert_eq!(node.header, def.header);
    assert_eq!(node.docstring.as_deref(), Some("Adds two numbers."));
}

#[test]
fn test_declaration_only_symbol() {
    let decl = occurrence("ext", SymbolKind::Variable, OccurrenceRole::Declaration, "a.h", 1, 1);
    let (node, _) = IdentityResolver::new().derive_view(&[&decl], |_| false).unwrap();
    assert!(!node.is_definition);
    assert!(node.is_declaration_only);
    assert!(node.definition.is_none());
    assert_eq!(node.primary_location().map(|l| l.file.as_str()), Some("a.h"));
}

#[test]
fn test_latest_definition_is_primary() {
    let first = occurrence("g", SymbolKind::Function, OccurrenceRole::Definition, "b.c", 1, 1);
    let second = occurrence("g", SymbolKind::Function, OccurrenceRole::Definition, "a.c", 2, 1);
    let (node, _) = IdentityResolver::new()
        .derive_view(&[&first, &second], |_| false)
        .unwrap();
    assert_eq!(node.definition_file.as_deref(), Some("a.c"));
    assert_eq!(node.alternate_definitions.len(), 1);
    assert_eq!(node.alternate_definitions[0].file, "b.c");
}

#[test]
fn test_kind_conflict_prefers_non_macro_definition() {
    let mac = occurrence("LIMIT", SymbolKind::Macro, OccurrenceRole::Definition, "a.h", 2, 1);
    let var = occurrence("LIMIT", SymbolKind::Variable, OccurrenceRole::Definition, "b.c", 1, 1);
    let (node, conflict) = IdentityResolver::new()
        .derive_view(&[&mac, &var], |_| false)
        .unwrap();
    assert_eq!(node.kind, SymbolKind::Variable);

    let conflict = conflict.unwrap();
    assert_eq!(conflict.qualified_name, "LIMIT");
    assert_eq!(conflict.kinds, vec![SymbolKind::Variable, SymbolKind::Macro]);
    assert_eq!(conflict.chosen, SymbolKind::Variable);
}

#[test]
fn test_definition_beats_declaration_for_kind() {
    let decl = occurrence("Thing", SymbolKind::Class, OccurrenceRole::Declaration, "a.h", 5, 1);
    let def = occurrence("Thing", SymbolKind::Struct, OccurrenceRole::Definition, "b.h", 1, 1);
    let (node, conflict) = IdentityResolver::new()
        .derive_view(&[&decl, &def], |_| false)
        .unwrap();
    // class and struct are one family: no conflict, the definition decides
    assert!(conflict.is_none());
    assert_eq!(node.kind, SymbolKind::Struct);
}

#[test]
fn test_callable_in_class_is_a_method() {
    let mut def = occurrence("Widget::draw", SymbolKind::Function, OccurrenceRole::Definition, "w.cpp", 1, 10);
    let class_id = symbol_id("Widget", "");
    def.container = Some(class_id.clone());
    let (node, _) = IdentityResolver::new()
        .derive_view(&[&def], |container| container == class_id)
        .unwrap();
    assert_eq!(node.kind, SymbolKind::Method);
}

#[test]
fn test_any_method_occurrence_makes_a_method() {
    let decl = occurrence("Widget::draw", SymbolKind::Method, OccurrenceRole::Declaration, "w.h", 1, 3);
    let def = occurrence("Widget::draw", SymbolKind::Function, OccurrenceRole::Definition, "w.cpp", 2, 10);
    let (node, conflict) = IdentityResolver::new()
        .derive_view(&[&decl, &def], |_| false)
        .unwrap();
    assert!(conflict.is_none());
    assert_eq!(node.kind, SymbolKind::Method);
}

#[test]
fn test_no_occurrences_no_view() {
    assert!(IdentityResolver::new().derive_view(&[], |_| false).is_none());
}

// ---------------------------------------------------------------------------
// resolve_target
// ---------------------------------------------------------------------------

#[test]
fn test_signature_match_is_exact() {
    let lookup = Symbols(vec![
        symbol("Base::draw", "()", SymbolKind::Method),
        symbol("Base::draw", "(int)", SymbolKind::Method),
    ]);
    let edge = named_edge("sym:derived", &["Base::draw"], Some("(int)"), None);
    let resolved = IdentityResolver::new().resolve_target(&edge, &lookup);
    assert_eq!(resolved, Some(symbol_id("Base::draw", "(int)")));

    let missing = named_edge("sym:derived", &["Base::draw"], Some("(double)"), None);
    assert_eq!(IdentityResolver::new().resolve_target(&missing, &lookup), None);
}

#[test]
fn test_innermost_candidate_wins() {
    let lookup = Symbols(vec![
        symbol("Shape", "", SymbolKind::Class),
        symbol("Graphics::Shape", "", SymbolKind::Class),
    ]);
    let edge = named_edge("sym:x", &["Graphics::Shape", "Shape"], None, None);
    assert_eq!(
        IdentityResolver::new().resolve_target(&edge, &lookup),
        Some(symbol_id("Graphics::Shape", ""))
    );
}

#[test]
fn test_expected_family_is_preferred() {
    let record = symbol("Node", "", SymbolKind::Struct);
    let alias = symbol("Node", "struct Node", SymbolKind::Typedef);
    let lookup = Symbols(vec![alias.clone(), record.clone()]);

    let edge = named_edge("sym:other", &["Node"], None, Some(KindFamily::Type));
    assert_eq!(
        IdentityResolver::new().resolve_target(&edge, &lookup),
        Some(record.id.clone())
    );

    // an edge never points at its own source
    let from_record = named_edge(&record.id, &["Node"], None, None);
    assert_eq!(
        IdentityResolver::new().resolve_target(&from_record, &lookup),
        Some(alias.id)
    );
}

#[test]
fn test_suffix_fallback_requires_a_unique_match() {
    let lookup = Symbols(vec![symbol("util::helper", "", SymbolKind::Function)]);
    let edge = named_edge("sym:main", &["main::helper", "helper"], None, None);
    assert_eq!(
        IdentityResolver::new().resolve_target(&edge, &lookup),
        Some(symbol_id("util::helper", ""))
    );

    let ambiguous = Symbols(vec![
        symbol("util::helper", "", SymbolKind::Function),
        symbol("io::helper", "", SymbolKind::Function),
    ]);
    assert_eq!(IdentityResolver::new().resolve_target(&edge, &ambiguous), None);
}

#[test]
fn test_suffix_fallback_respects_segment_boundaries() {
    let lookup = Symbols(vec![symbol("ns::prehelper", "", SymbolKind::Function)]);
    let edge = named_edge("sym:main", &["helper"], None, None);
    assert_eq!(IdentityResolver::new().resolve_target(&edge, &lookup), None);
}

#[test]
fn test_edge_without_named_target_does_not_resolve() {
    let lookup = Symbols(vec![symbol("f", "", SymbolKind::Function)]);
    let edge = EdgeRecord {
        from: "sym:a".to_string(),
        to: None,
        kind: EdgeKind::Contains,
        target: None,
        confirmed: true,
        file: "a.c".to_string(),
        line: 1,
    };
    assert_eq!(IdentityResolver::new().resolve_target(&edge, &lookup), None);
}
