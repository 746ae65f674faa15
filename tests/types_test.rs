use ckg::types::*;

#[test]
fn symbol_kind_as_str_roundtrip() {
    let kinds = vec![
        SymbolKind::File,
        SymbolKind::Namespace,
        SymbolKind::Class,
        SymbolKind::Struct,
        SymbolKind::Union,
        SymbolKind::Enum,
        SymbolKind::Function,
        SymbolKind::Method,
        SymbolKind::Field,
        SymbolKind::Variable,
        SymbolKind::Macro,
        SymbolKind::Typedef,
        SymbolKind::Template,
        SymbolKind::TemplateSpecialization,
    ];

    for kind in kinds {
        let s = kind.as_str();
        let parsed = SymbolKind::from_str(s)
            .unwrap_or_else(|| panic!("failed to parse SymbolKind from '{}'", s));
        assert_eq!(kind, parsed, "roundtrip failed for SymbolKind::{}", s);
    }
}

#[test]
fn symbol_kind_from_str_unknown_returns_none() {
    assert!(SymbolKind::from_str("trait").is_none());
    assert!(SymbolKind::from_str("").is_none());
}

#[test]
fn edge_kind_as_str_roundtrip() {
    let kinds = vec![
        EdgeKind::Contains,
        EdgeKind::Overrides,
        EdgeKind::Specializes,
        EdgeKind::FriendOf,
        EdgeKind::TypedefsTo,
        EdgeKind::Calls,
    ];

    for kind in kinds {
        let s = kind.as_str();
        let parsed =
            EdgeKind::from_str(s).unwrap_or_else(|| panic!("failed to parse EdgeKind from '{}'", s));
        assert_eq!(kind, parsed, "roundtrip failed for EdgeKind::{}", s);
    }
}

#[test]
fn language_from_str_accepts_cxx_alias() {
    assert_eq!(LanguageId::from_str("c++"), Some(LanguageId::Cpp));
    assert_eq!(LanguageId::from_str("cpp"), Some(LanguageId::Cpp));
    assert_eq!(LanguageId::from_str("rust"), None);
}

#[test]
fn kind_families_group_mergeable_kinds() {
    assert_eq!(SymbolKind::Function.family(), SymbolKind::Method.family());
    assert_eq!(SymbolKind::Field.family(), SymbolKind::Variable.family());
    assert_eq!(SymbolKind::Class.family(), SymbolKind::Struct.family());
    assert_eq!(
        SymbolKind::Template.family(),
        SymbolKind::TemplateSpecialization.family()
    );
    assert_ne!(SymbolKind::Function.family(), SymbolKind::Macro.family());
    assert_ne!(SymbolKind::Struct.family(), SymbolKind::Typedef.family());
}

#[test]
fn symbol_id_is_deterministic_and_prefixed() {
    let a = symbol_id("Graphics::Shape::area", "() const");
    let b = symbol_id("Graphics::Shape::area", "() const");
    assert_eq!(a, b);
    assert!(a.starts_with("sym:"));
    assert_eq!(a.len(), "sym:".len() + 32);
}

#[test]
fn symbol_id_depends_on_signature() {
    assert_ne!(symbol_id("max", "(int, int)"), symbol_id("max", "(double, double)"));
    assert_ne!(symbol_id("max", ""), symbol_id("max", "(int, int)"));
}

#[test]
fn symbol_id_separates_name_and_signature() {
    // the two inputs are joined with a separator, not concatenated
    assert_ne!(symbol_id("ab", "c"), symbol_id("a", "bc"));
}

#[test]
fn file_id_differs_from_symbol_id() {
    let f = file_id("src/main.c");
    assert!(f.starts_with("file:"));
    assert_ne!(f, symbol_id("src/main.c", ""));
}

#[test]
fn normalize_path_unifies_separators() {
    assert_eq!(normalize_path("./src/a.c"), "src/a.c");
    assert_eq!(normalize_path("src\\lib\\b.cpp"), "src/lib/b.cpp");
    assert_eq!(normalize_path("././x.py"), "x.py");
}

#[test]
fn source_file_hashes_content() {
    let a = SourceFile::new("a.c", "int x;");
    let b = SourceFile::new("./a.c", "int x;");
    assert_eq!(a.path, "a.c");
    assert_eq!(a.path, b.path);
    assert_eq!(a.content_hash, b.content_hash);
    assert!(a.language.is_none());

    let forced = SourceFile::new("script", "x = 1").with_language(LanguageId::Python);
    assert_eq!(forced.language, Some(LanguageId::Python));
}

#[test]
fn primary_location_prefers_definition() {
    let decl = SourceLocation {
        file: "a.h".to_string(),
        span: Span {
            start_line: 1,
            start_column: 0,
            end_line: 1,
            end_column: 10,
        },
    };
    let def = SourceLocation {
        file: "a.c".to_string(),
        span: Span {
            start_line: 3,
            start_column: 0,
            end_line: 5,
            end_column: 1,
        },
    };
    let mut node = SymbolNode {
        id: symbol_id("f", ""),
        kind: SymbolKind::Function,
        name: "f".to_string(),
        qualified_name: "f".to_string(),
        signature: String::new(),
        header: "int f(void)".to_string(),
        docstring: None,
        language: LanguageId::C,
        container: None,
        declaring_file: Some("a.h".to_string()),
        definition_file: None,
        definition: None,
        declarations: vec![decl.clone()],
        alternate_definitions: Vec::new(),
        is_definition: false,
        is_declaration_only: true,
        contributors: vec!["a.h".to_string()],
    };
    assert_eq!(node.primary_location(), Some(&decl));

    node.definition = Some(def.clone());
    assert_eq!(node.primary_location(), Some(&def));
}
