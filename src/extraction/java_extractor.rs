/// Tree-sitter based Java symbol extractor.
///
/// The package clause opens a chain of namespaces that spans the whole file,
/// so `package com.shop;` puts `Cart` at `com.shop.Cart`. Interfaces and
/// records are class-like types; methods keep their parameter types in the
/// identity because Java overloads.
use tree_sitter::Node as TsNode;

use super::state::{
    canonical_type, collapse_whitespace, span_of, strip_template_args, Emit, ExtractionState,
    Scope,
};
use super::{ExtractOptions, LanguageExtractor};
use crate::grammar::{classify, GrammarRegistry, SymbolKindHint, SyntaxTree};
use crate::types::{Extraction, LanguageId, OccurrenceRole, SymbolKind};

const COMMENTS: &[&str] = &["line_comment", "block_comment"];

/// Extracts symbols from Java compilation units.
pub struct JavaExtractor;

impl LanguageExtractor for JavaExtractor {
    fn languages(&self) -> &[LanguageId] {
        &[LanguageId::Java]
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

        let mut opened = 0;
        let mut cursor = root.walk();
        let children: Vec<TsNode<'_>> = root.named_children(&mut cursor).collect();
        for child in children {
            if classify(state.language, child.kind()) == Some(SymbolKindHint::Namespace) {
                // a second package clause is a syntax error; keep the first
                if opened == 0 {
                    opened = Self::open_package(&mut state, child);
                }
                continue;
            }
            Self::visit_node(&mut state, child);
        }

        for _ in 0..opened {
            state.pop_scope();
        }
        state.finish()
    }
}

impl JavaExtractor {
    /// Pushes one namespace per package segment and returns how many.
    fn open_package(state: &mut ExtractionState<'_>, node: TsNode<'_>) -> usize {
        let mut cursor = node.walk();
        let Some(name) = node
            .named_children(&mut cursor)
            .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
        else {
            return 0;
        };
        let written: String = state.text(name).split_whitespace().collect();
        let docstring = state.comments_above(node, COMMENTS, &[]);
        let segments: Vec<String> = written.split('.').map(str::to_string).collect();
        let depth = segments.len();
        for (i, segment) in segments.into_iter().enumerate() {
            let qualified_name = state.qualify(&segment);
            let container = state.current().id.clone();
            let id = state.emit(Emit {
                kind: SymbolKind::Namespace,
                name: segment.clone(),
                qualified_name: qualified_name.clone(),
                signature: String::new(),
                container,
                role: OccurrenceRole::Definition,
                node,
                header: format!("package {written}"),
                docstring: if i + 1 == depth { docstring.clone() } else { None },
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
        depth
    }

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
            Some(SymbolKindHint::Record(kind)) => Self::visit_type(state, node, kind),
            Some(SymbolKindHint::Enum) => Self::visit_type(state, node, SymbolKind::Enum),
            Some(SymbolKindHint::FunctionDefinition) => Self::visit_method(state, node),
            Some(SymbolKindHint::FieldDeclaration) => Self::visit_field(state, node),
            Some(SymbolKindHint::CallSite) => Self::visit_call(state, node),
            _ => Self::visit_children(state, node),
        }
    }

    /// Classes, interfaces, records, annotation types and enums.
    fn visit_type(state: &mut ExtractionState<'_>, node: TsNode<'_>, kind: SymbolKind) {
        let Some(name_node) = node.child_by_field_name("name") else {
            state.warn(node, "skipped type without a name");
            return;
        };
        let name = state.text(name_node).to_string();
        let body = node.child_by_field_name("body");
        let bases = Self::bases(state, node);

        let qualified_name = state.qualify(&name);
        let container = state.current().id.clone();
        let header = state.header(node, body);
        let docstring = state.comments_above(node, COMMENTS, &[]);
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

        state.push_scope(Scope {
            name,
            qualified_name,
            id,
            kind,
            bases,
            callable: false,
        });
        // record components are fields of the record
        if let Some(parameters) = node.child_by_field_name("parameters") {
            Self::visit_record_components(state, parameters);
        }
        if let Some(body) = body {
            if kind == SymbolKind::Enum {
                Self::visit_enum_body(state, body);
            } else {
                Self::visit_children(state, body);
            }
        }
        state.pop_scope();
    }

    /// Candidate names for the superclass and every implemented or extended
    /// interface.
    fn bases(state: &ExtractionState<'_>, node: TsNode<'_>) -> Vec<Vec<String>> {
        let mut written = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "superclass" => {
                    let mut inner = child.walk();
                    written.extend(child.named_children(&mut inner));
                }
                "super_interfaces" | "extends_interfaces" => {
                    let mut inner = child.walk();
                    for list in child.named_children(&mut inner) {
                        if list.kind() == "type_list" {
                            let mut types = list.walk();
                            written.extend(list.named_children(&mut types));
                        }
                    }
                }
                _ => {}
            }
        }
        written
            .into_iter()
            .map(|ty| {
                let name: String = strip_template_args(state.text(ty))
                    .split_whitespace()
                    .collect();
                state.scope_candidates(&name)
            })
            .collect()
    }

    fn visit_enum_body(state: &mut ExtractionState<'_>, body: TsNode<'_>) {
        let mut cursor = body.walk();
        let children: Vec<TsNode<'_>> = body.named_children(&mut cursor).collect();
        for child in children {
            if classify(state.language, child.kind()) == Some(SymbolKindHint::Enumerator) {
                let Some(name_node) = child.child_by_field_name("name") else {
                    continue;
                };
                let name = state.text(name_node).to_string();
                let qualified_name = state.qualify(&name);
                let container = state.current().id.clone();
                let header = state.header(child, child.child_by_field_name("body"));
                let docstring = state.comments_above(child, COMMENTS, &[]);
                state.emit(Emit {
                    kind: SymbolKind::Field,
                    name,
                    qualified_name,
                    signature: String::new(),
                    container,
                    role: OccurrenceRole::Definition,
                    node: child,
                    header,
                    docstring,
                });
            } else {
                // enum_body_declarations holds methods and fields
                Self::visit_children(state, child);
            }
        }
    }

    fn visit_record_components(state: &mut ExtractionState<'_>, parameters: TsNode<'_>) {
        let mut cursor = parameters.walk();
        let components: Vec<TsNode<'_>> = parameters
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "formal_parameter")
            .collect();
        for component in components {
            let Some(name_node) = component.child_by_field_name("name") else {
                continue;
            };
            let name = state.text(name_node).to_string();
            let qualified_name = state.qualify(&name);
            let container = state.current().id.clone();
            let header = collapse_whitespace(state.text(component));
            state.emit(Emit {
                kind: SymbolKind::Field,
                name,
                qualified_name,
                signature: String::new(),
                container,
                role: OccurrenceRole::Definition,
                node: component,
                header,
                docstring: None,
            });
        }
    }

    /// Methods and constructors. An abstract or interface method without a
    /// body is a declaration.
    fn visit_method(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            state.warn(node, "skipped method without a name");
            return;
        };
        let name = state.text(name_node).to_string();
        let body = node.child_by_field_name("body");
        let signature = if state.overloading {
            Self::parameter_signature(state, node.child_by_field_name("parameters"))
        } else {
            String::new()
        };

        let qualified_name = state.qualify(&name);
        let container = state.current().id.clone();
        let header = state.header(node, body);
        let docstring = state.comments_above(node, COMMENTS, &[]);
        let line = span_of(node).start_line;
        let id = state.emit(Emit {
            kind: SymbolKind::Method,
            name: name.clone(),
            qualified_name: qualified_name.clone(),
            signature: signature.clone(),
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

        let constructor = node.kind() == "constructor_declaration";
        if !constructor && !Self::has_modifier(state, node, "static") {
            state.overrides(&id, &name, &signature, line);
        }

        if let Some(body) = body {
            state.push_scope(Scope {
                name,
                qualified_name,
                id,
                kind: SymbolKind::Method,
                bases: Vec::new(),
                callable: true,
            });
            Self::visit_children(state, body);
            state.pop_scope();
        }
    }

    /// `(int, List, String...)`: parameter types with generics dropped.
    fn parameter_signature(state: &ExtractionState<'_>, parameters: Option<TsNode<'_>>) -> String {
        let Some(parameters) = parameters else {
            return "()".to_string();
        };
        let mut types = Vec::new();
        let mut cursor = parameters.walk();
        for parameter in parameters.named_children(&mut cursor) {
            match parameter.kind() {
                "formal_parameter" => {
                    if let Some(ty) = parameter.child_by_field_name("type") {
                        let mut spelled = strip_template_args(state.text(ty));
                        if let Some(dimensions) = parameter.child_by_field_name("dimensions") {
                            spelled.push_str(state.text(dimensions));
                        }
                        types.push(canonical_type(&spelled));
                    }
                }
                "spread_parameter" => {
                    let mut inner = parameter.walk();
                    let ty = parameter
                        .named_children(&mut inner)
                        .find(|c| !matches!(c.kind(), "modifiers" | "variable_declarator"));
                    if let Some(ty) = ty {
                        let spelled = strip_template_args(state.text(ty));
                        types.push(format!("{}...", canonical_type(&spelled)));
                    }
                }
                _ => {}
            }
        }
        format!("({})", types.join(", "))
    }

    fn has_modifier(state: &ExtractionState<'_>, node: TsNode<'_>, modifier: &str) -> bool {
        let mut cursor = node.walk();
        let found = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "modifiers")
            .any(|m| state.text(m).split_whitespace().any(|w| w == modifier));
        found
    }

    /// Fields and interface constants; one symbol per declarator. Locals are
    /// `local_variable_declaration` and never reach here.
    fn visit_field(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let mut cursor = node.walk();
        let declarators: Vec<TsNode<'_>> = node
            .children_by_field_name("declarator", &mut cursor)
            .collect();
        let header = state.header(node, None);
        let docstring = state.comments_above(node, COMMENTS, &[]);
        for declarator in declarators {
            if let Some(name_node) = declarator.child_by_field_name("name") {
                let name = state.text(name_node).to_string();
                let qualified_name = state.qualify(&name);
                let container = state.current().id.clone();
                state.emit(Emit {
                    kind: SymbolKind::Field,
                    name,
                    qualified_name,
                    signature: String::new(),
                    container,
                    role: OccurrenceRole::Definition,
                    node,
                    header: header.clone(),
                    docstring: docstring.clone(),
                });
            }
            if let Some(value) = declarator.child_by_field_name("value") {
                Self::visit_node(state, value);
            }
        }
    }

    fn visit_call(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        if state.in_function() {
            if let Some(name_node) = node.child_by_field_name("name") {
                let callee = state.text(name_node).to_string();
                let line = span_of(node).start_line;
                let receiver = node.child_by_field_name("object").map(|o| o.kind());
                let candidates = match receiver {
                    None | Some("this") => state.scope_candidates(&callee),
                    Some(_) => vec![callee.clone()],
                };
                state.call(&callee, candidates, line);
            }
        }
        Self::visit_children(state, node);
    }
}
