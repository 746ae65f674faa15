/// Tree-sitter based Rust symbol extractor.
///
/// A file's module path comes from where it sits under `src/`, so
/// `src/geo/shapes.rs` defines `geo::shapes::Circle`. Traits are class-like
/// types. An `impl` block opens the scope of the type it implements, the
/// same way an out-of-line C++ definition does, and methods of a trait impl
/// carry an `overrides` edge to the trait's method.
use tree_sitter::Node as TsNode;

use super::state::{
    canonical_type, collapse_whitespace, span_of, strip_template_args, Emit, ExtractionState,
    Scope,
};
use super::{ExtractOptions, LanguageExtractor};
use crate::grammar::{classify, GrammarRegistry, SymbolKindHint, SyntaxTree};
use crate::types::{
    symbol_id, EdgeKind, Extraction, KindFamily, LanguageId, OccurrenceRole, SymbolKind,
};

const COMMENTS: &[&str] = &["line_comment", "block_comment"];
const ATTRIBUTES: &[&str] = &["attribute_item"];

/// Extracts symbols from Rust source files.
pub struct RustExtractor;

impl LanguageExtractor for RustExtractor {
    fn languages(&self) -> &[LanguageId] {
        &[LanguageId::Rust]
    }

    fn extract(
        &self,
        grammars: &GrammarRegistry,
        tree: &SyntaxTree,
        path: &str,
        source: &str,
        options: ExtractOptions,
    ) -> Extraction {
        let language = tree.language();
        let root = tree.root();
        let mut state = ExtractionState::new(
            path,
            language,
            grammars.scope_separator(language),
            grammars.supports_overloading(language),
            options.track_calls,
            source,
            root,
        );

        let segments = module_path(path);
        let depth = segments.len();
        for segment in segments {
            let qualified_name = state.qualify(&segment);
            let container = state.current().id.clone();
            let id = state.emit(Emit {
                kind: SymbolKind::Namespace,
                name: segment.clone(),
                qualified_name: qualified_name.clone(),
                signature: String::new(),
                container,
                role: OccurrenceRole::Definition,
                node: root,
                header: format!("mod {segment}"),
                docstring: None,
            });
            state.push_scope(Scope {
                name: segment,
                qualified_name,
                id,
                kind: SymbolKind::Namespace,
                bases: Vec::new(),
                callable: false,
            });
        }

        Self::visit_children(&mut state, root);

        for _ in 0..depth {
            state.pop_scope();
        }
        state.finish()
    }
}

/// Module path segments for a file, relative to the nearest `src/`:
/// `src/geo/shapes.rs` gives `["geo", "shapes"]`, `src/geo/mod.rs` gives
/// `["geo"]` and `src/lib.rs` gives nothing. Files outside any `src/` use
/// their whole path.
fn module_path(path: &str) -> Vec<String> {
    let stem = path.strip_suffix(".rs").unwrap_or(path);
    let parts: Vec<&str> = stem
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();
    let start = parts
        .iter()
        .rposition(|p| *p == "src")
        .map(|i| i + 1)
        .unwrap_or(0);
    let mut segments: Vec<String> = parts[start..].iter().map(|s| s.to_string()).collect();
    let is_root = |s: &str| matches!(s, "mod" | "lib" | "main");
    if segments.last().map(|s| is_root(s)).unwrap_or(false) {
        let last_is_mod = segments.last().map(|s| s == "mod").unwrap_or(false);
        // `lib` and `main` are only crate roots directly under `src/`
        if last_is_mod || segments.len() == 1 {
            segments.pop();
        }
    }
    segments
}

impl RustExtractor {
    fn visit_children(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let mut cursor = node.walk();
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                if child.is_named() {
                    Self::visit_node(state, child);
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }
    }

    fn visit_node(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        if node.is_error() {
            state.warn(node, "skipped unparseable region");
            return;
        }
        match classify(state.language, node.kind()) {
            Some(SymbolKindHint::Namespace) => Self::visit_module(state, node),
            Some(SymbolKindHint::Record(kind)) => Self::visit_type(state, node, kind),
            Some(SymbolKindHint::Enum) => Self::visit_type(state, node, SymbolKind::Enum),
            Some(SymbolKindHint::Implementation) => Self::visit_impl(state, node),
            Some(SymbolKindHint::FunctionDefinition) => Self::visit_function(state, node),
            Some(SymbolKindHint::Declaration) => Self::visit_item_constant(state, node),
            Some(SymbolKindHint::Alias) => Self::visit_type_alias(state, node),
            Some(SymbolKindHint::Macro) => Self::visit_macro(state, node),
            Some(SymbolKindHint::CallSite) => Self::visit_call(state, node),
            _ => Self::visit_children(state, node),
        }
    }

    fn doc(state: &ExtractionState<'_>, node: TsNode<'_>) -> Option<String> {
        state.comments_above(node, COMMENTS, ATTRIBUTES)
    }

    /// `mod name { ... }` defines a namespace; `mod name;` declares one
    /// whose body is another file.
    fn visit_module(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = state.text(name_node).to_string();
        let body = node.child_by_field_name("body");
        let qualified_name = state.qualify(&name);
        let container = state.current().id.clone();
        let header = state.header(node, body);
        let docstring = Self::doc(state, node);
        let id = state.emit(Emit {
            kind: SymbolKind::Namespace,
            name: name.clone(),
            qualified_name: qualified_name.clone(),
            signature: String::new(),
            container,
            role: if body.is_some() {
                OccurrenceRole::Definition
            } else {
                OccurrenceRole::Declaration
            },
            node,
            header,
            docstring,
        });
        if let Some(body) = body {
            state.push_scope(Scope {
                name,
                qualified_name,
                id,
                kind: SymbolKind::Namespace,
                bases: Vec::new(),
                callable: false,
            });
            Self::visit_children(state, body);
            state.pop_scope();
        }
    }

    /// Structs, unions, enums and traits.
    fn visit_type(state: &mut ExtractionState<'_>, node: TsNode<'_>, kind: SymbolKind) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = state.text(name_node).to_string();
        let body = node.child_by_field_name("body");

        // supertraits
        let mut bases = Vec::new();
        if let Some(bounds) = node.child_by_field_name("bounds") {
            let mut cursor = bounds.walk();
            for bound in bounds.named_children(&mut cursor) {
                if let Some(written) = Self::type_path(state, bound) {
                    bases.push(Self::path_candidates(state, &written));
                }
            }
        }

        let qualified_name = state.qualify(&name);
        let container = state.current().id.clone();
        let header = state.header(node, body);
        let docstring = Self::doc(state, node);
        let id = state.emit(Emit {
            kind,
            name: name.clone(),
            qualified_name: qualified_name.clone(),
            signature: String::new(),
            container,
            role: OccurrenceRole::Definition,
            node,
            header,
            docstring,
        });

        let Some(body) = body else {
            return;
        };
        state.push_scope(Scope {
            name,
            qualified_name,
            id,
            kind,
            bases,
            callable: false,
        });
        match body.kind() {
            "field_declaration_list" => Self::visit_fields(state, body),
            "enum_variant_list" => Self::visit_variants(state, body),
            // tuple struct fields have no names
            "ordered_field_declaration_list" => {}
            _ => Self::visit_children(state, body),
        }
        state.pop_scope();
    }

    fn visit_fields(state: &mut ExtractionState<'_>, body: TsNode<'_>) {
        let mut cursor = body.walk();
        let fields: Vec<TsNode<'_>> = body
            .named_children(&mut cursor)
            .filter(|c| classify(state.language, c.kind()) == Some(SymbolKindHint::FieldDeclaration))
            .collect();
        for field in fields {
            let Some(name_node) = field.child_by_field_name("name") else {
                continue;
            };
            let name = state.text(name_node).to_string();
            let qualified_name = state.qualify(&name);
            let container = state.current().id.clone();
            let header = collapse_whitespace(state.text(field));
            let docstring = Self::doc(state, field);
            state.emit(Emit {
                kind: SymbolKind::Field,
                name,
                qualified_name,
                signature: String::new(),
                container,
                role: OccurrenceRole::Definition,
                node: field,
                header,
                docstring,
            });
        }
    }

    fn visit_variants(state: &mut ExtractionState<'_>, body: TsNode<'_>) {
        let mut cursor = body.walk();
        let variants: Vec<TsNode<'_>> = body
            .named_children(&mut cursor)
            .filter(|c| classify(state.language, c.kind()) == Some(SymbolKindHint::Enumerator))
            .collect();
        for variant in variants {
            let Some(name_node) = variant.child_by_field_name("name") else {
                continue;
            };
            let name = state.text(name_node).to_string();
            let qualified_name = state.qualify(&name);
            let container = state.current().id.clone();
            let header = collapse_whitespace(state.text(variant));
            let docstring = Self::doc(state, variant);
            state.emit(Emit {
                kind: SymbolKind::Field,
                name,
                qualified_name,
                signature: String::new(),
                container,
                role: OccurrenceRole::Definition,
                node: variant,
                header,
                docstring,
            });
        }
    }

    /// Opens the scope of the implemented type. Nothing is emitted for the
    /// block itself; the type may live in another file.
    fn visit_impl(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let Some(written) = node
            .child_by_field_name("type")
            .and_then(|ty| Self::type_path(state, ty))
        else {
            state.warn(node, "skipped impl of an unnamed type");
            return;
        };
        let qualified_name = Self::resolve_path(state, &written);
        let name = qualified_name
            .rsplit("::")
            .next()
            .unwrap_or(&qualified_name)
            .to_string();

        let trait_path = node
            .child_by_field_name("trait")
            .and_then(|t| Self::type_path(state, t));
        let bases = trait_path
            .as_deref()
            .map(|t| vec![Self::path_candidates(state, t)])
            .unwrap_or_default();

        state.push_scope(Scope {
            name,
            id: symbol_id(&qualified_name, ""),
            qualified_name,
            kind: SymbolKind::Struct,
            bases,
            callable: false,
        });
        Self::visit_children(state, body);
        state.pop_scope();
    }

    /// Free functions, methods and trait method signatures.
    fn visit_function(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = state.text(name_node).to_string();
        let body = node.child_by_field_name("body");
        let in_type = state.current().kind.is_class_like();
        let kind = if in_type {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        // two trait impls may both define `fmt` on one type
        let implemented = Self::implemented_trait(state);
        let signature = implemented
            .as_deref()
            .map(|t| format!("impl {t}"))
            .unwrap_or_default();

        let qualified_name = state.qualify(&name);
        let container = state.current().id.clone();
        let header = state.header(node, body);
        let docstring = Self::doc(state, node);
        let line = span_of(node).start_line;
        let id = state.emit(Emit {
            kind,
            name: name.clone(),
            qualified_name: qualified_name.clone(),
            signature,
            container,
            role: if body.is_some() {
                OccurrenceRole::Definition
            } else {
                OccurrenceRole::Declaration
            },
            node,
            header,
            docstring,
        });

        if implemented.is_some() {
            let bases = state.current().bases.clone();
            for base in bases {
                let candidates: Vec<String> =
                    base.iter().map(|b| state.qualify_in(b, &name)).collect();
                state.edge_named(
                    &id,
                    EdgeKind::Overrides,
                    candidates,
                    Some(String::new()),
                    Some(KindFamily::Callable),
                    line,
                );
            }
        }

        if let Some(body) = body {
            state.push_scope(Scope {
                name,
                qualified_name,
                id,
                kind,
                bases: Vec::new(),
                callable: true,
            });
            Self::visit_children(state, body);
            state.pop_scope();
        }
    }

    /// The trait of the enclosing `impl Trait for Type` block, as written.
    fn implemented_trait(state: &ExtractionState<'_>) -> Option<String> {
        let scope = state.current();
        if scope.callable || scope.kind != SymbolKind::Struct || scope.bases.is_empty() {
            return None;
        }
        // an impl scope's only base is its trait; a struct scope has none
        scope
            .bases
            .first()
            .and_then(|candidates| candidates.last())
            .cloned()
    }

    /// `const` and `static` items: variables at module level, fields of the
    /// type inside an impl or trait.
    fn visit_item_constant(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let value = node.child_by_field_name("value");
        if !state.in_function() {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = state.text(name_node).to_string();
                let kind = if state.current().kind.is_class_like() {
                    SymbolKind::Field
                } else {
                    SymbolKind::Variable
                };
                let qualified_name = state.qualify(&name);
                let container = state.current().id.clone();
                let header = state.header(node, value);
                let docstring = Self::doc(state, node);
                state.emit(Emit {
                    kind,
                    name,
                    qualified_name,
                    signature: String::new(),
                    container,
                    role: if value.is_some() {
                        OccurrenceRole::Definition
                    } else {
                        OccurrenceRole::Declaration
                    },
                    node,
                    header,
                    docstring,
                });
            }
        }
        if let Some(value) = value {
            Self::visit_node(state, value);
        }
    }

    /// `type Name = Target;` and trait associated types.
    fn visit_type_alias(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = state.text(name_node).to_string();
        let target = node.child_by_field_name("type");
        let signature = target
            .map(|t| canonical_type(state.text(t)))
            .unwrap_or_default();

        let qualified_name = state.qualify(&name);
        let container = state.current().id.clone();
        let header = state.header(node, None);
        let docstring = Self::doc(state, node);
        let line = span_of(node).start_line;
        let id = state.emit(Emit {
            kind: SymbolKind::Typedef,
            name,
            qualified_name,
            signature,
            container,
            role: if target.is_some() {
                OccurrenceRole::Definition
            } else {
                OccurrenceRole::Declaration
            },
            node,
            header,
            docstring,
        });
        if let Some(written) = target.and_then(|t| Self::type_path(state, t)) {
            let candidates = Self::path_candidates(state, &written);
            state.edge_named(&id, EdgeKind::TypedefsTo, candidates, None, None, line);
        }
    }

    fn visit_macro(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = state.text(name_node).to_string();
        let qualified_name = state.qualify(&name);
        let container = state.current().id.clone();
        let header = format!("macro_rules! {name}");
        let docstring = Self::doc(state, node);
        state.emit(Emit {
            kind: SymbolKind::Macro,
            name,
            qualified_name,
            signature: String::new(),
            container,
            role: OccurrenceRole::Definition,
            node,
            header,
            docstring,
        });
    }

    fn visit_call(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        if state.in_function() {
            if let Some(function) = node.child_by_field_name("function") {
                let line = span_of(node).start_line;
                Self::record_call(state, function, line);
            }
        }
        Self::visit_children(state, node);
    }

    fn record_call(state: &mut ExtractionState<'_>, function: TsNode<'_>, line: u32) {
        match function.kind() {
            "identifier" => {
                let callee = state.text(function).to_string();
                let candidates = state.scope_candidates(&callee);
                state.call(&callee, candidates, line);
            }
            "scoped_identifier" => {
                let written: String = strip_template_args(state.text(function))
                    .split_whitespace()
                    .collect();
                // a turbofish leaves `Vec::::new` behind
                let written = written.replace("::::", "::");
                let callee = written.rsplit("::").next().unwrap_or(&written).to_string();
                let candidates = Self::path_candidates(state, &written);
                state.call(&callee, candidates, line);
            }
            "field_expression" => {
                if let Some(field) = function.child_by_field_name("field") {
                    let callee = state.text(field).to_string();
                    state.call(&callee, vec![callee.clone()], line);
                }
            }
            "generic_function" => {
                if let Some(inner) = function.child_by_field_name("function") {
                    Self::record_call(state, inner, line);
                }
            }
            _ => {}
        }
    }

    /// The path of a type with generics, references and lifetimes removed,
    /// or `None` for types without a name (tuples, slices, closures).
    fn type_path(state: &ExtractionState<'_>, ty: TsNode<'_>) -> Option<String> {
        match ty.kind() {
            "type_identifier" | "scoped_type_identifier" | "identifier" | "scoped_identifier" => {
                Some(state.text(ty).split_whitespace().collect())
            }
            "generic_type" => ty
                .child_by_field_name("type")
                .and_then(|inner| Self::type_path(state, inner))
                .map(|path| strip_template_args(&path)),
            "reference_type" | "pointer_type" => ty
                .child_by_field_name("type")
                .and_then(|inner| Self::type_path(state, inner)),
            _ => None,
        }
    }

    /// Absolute qualified name for a path written in the current module.
    fn resolve_path(state: &ExtractionState<'_>, written: &str) -> String {
        if let Some(rest) = written.strip_prefix("crate::") {
            return rest.to_string();
        }
        if let Some(rest) = written.strip_prefix("self::") {
            return state.qualify_in(&Self::module_of(state), rest);
        }
        state.qualify_in(&Self::module_of(state), written)
    }

    /// Candidates for a path used in the current scope, innermost first.
    fn path_candidates(state: &ExtractionState<'_>, written: &str) -> Vec<String> {
        if let Some(rest) = written.strip_prefix("Self::") {
            if let Some(owner) = Self::innermost(state, |s| s.kind.is_class_like()) {
                return vec![state.qualify_in(&owner, rest)];
            }
        }
        if written.starts_with("crate::") || written.starts_with("self::") {
            return vec![Self::resolve_path(state, written)];
        }
        state.scope_candidates(written)
    }

    /// Qualified name of the innermost enclosing module.
    fn module_of(state: &ExtractionState<'_>) -> String {
        Self::innermost(state, |s| s.kind == SymbolKind::Namespace).unwrap_or_default()
    }

    fn innermost(state: &ExtractionState<'_>, wanted: impl Fn(&Scope) -> bool) -> Option<String> {
        state
            .scopes()
            .iter()
            .rev()
            .find(|s| wanted(s))
            .map(|s| s.qualified_name.clone())
    }
}
