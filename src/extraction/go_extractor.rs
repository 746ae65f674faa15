/// Tree-sitter based Go symbol extractor.
///
/// Every file of a package contributes to one namespace named after the
/// package clause. Methods attach to their receiver type wherever it is
/// declared, and interfaces are class-like types.
use tree_sitter::Node as TsNode;

use super::state::{canonical_type, collapse_whitespace, span_of, Emit, ExtractionState, Scope};
use super::{ExtractOptions, LanguageExtractor};
use crate::grammar::{classify, GrammarRegistry, SymbolKindHint, SyntaxTree};
use crate::types::{symbol_id, EdgeKind, Extraction, LanguageId, OccurrenceRole, SymbolKind};

const COMMENTS: &[&str] = &["comment"];

/// Extracts symbols from Go source files.
pub struct GoExtractor;

impl LanguageExtractor for GoExtractor {
    fn languages(&self) -> &[LanguageId] {
        &[LanguageId::Go]
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

        let mut in_package = false;
        let mut cursor = root.walk();
        let children: Vec<TsNode<'_>> = root.named_children(&mut cursor).collect();
        for child in children {
            if classify(state.language, child.kind()) == Some(SymbolKindHint::Namespace) {
                if !in_package {
                    in_package = Self::open_package(&mut state, child);
                }
                continue;
            }
            Self::visit_node(&mut state, child);
        }

        if in_package {
            state.pop_scope();
        }
        state.finish()
    }
}

impl GoExtractor {
    fn open_package(state: &mut ExtractionState<'_>, node: TsNode<'_>) -> bool {
        let mut cursor = node.walk();
        let Some(name_node) = node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "package_identifier")
        else {
            return false;
        };
        let name = state.text(name_node).to_string();
        let container = state.current().id.clone();
        let docstring = state.comments_above(node, COMMENTS, &[]);
        let id = state.emit(Emit {
            kind: SymbolKind::Namespace,
            name: name.clone(),
            qualified_name: name.clone(),
            signature: String::new(),
            container,
            role: OccurrenceRole::Definition,
            node,
            header: format!("package {name}"),
            docstring,
        });
        state.push_scope(Scope {
            name: name.clone(),
            qualified_name: name,
            id,
            kind: SymbolKind::Namespace,
            bases: Vec::new(),
            callable: false,
        });
        true
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
            Some(SymbolKindHint::FunctionDefinition) if node.kind() == "method_declaration" => {
                Self::visit_method(state, node)
            }
            Some(SymbolKindHint::FunctionDefinition) => Self::visit_function(state, node),
            Some(SymbolKindHint::Typedef) | Some(SymbolKindHint::Alias) => {
                Self::visit_type_spec(state, node)
            }
            Some(SymbolKindHint::Declaration) => Self::visit_value_declaration(state, node),
            Some(SymbolKindHint::CallSite) => Self::visit_call(state, node),
            _ => Self::visit_children(state, node),
        }
    }

    /// The comment block above a `type_spec` or value spec, or above its
    /// enclosing declaration when it is the only one there.
    fn doc(state: &ExtractionState<'_>, node: TsNode<'_>) -> Option<String> {
        state.comments_above(node, COMMENTS, &[]).or_else(|| {
            let parent = node.parent()?;
            let mut cursor = parent.walk();
            let specs = parent
                .named_children(&mut cursor)
                .filter(|c| c.kind() != "comment")
                .count();
            if specs == 1 {
                state.comments_above(parent, COMMENTS, &[])
            } else {
                None
            }
        })
    }

    fn visit_function(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = state.text(name_node).to_string();
        let qualified_name = state.qualify(&name);
        let container = state.current().id.clone();
        Self::emit_callable(state, node, name, qualified_name, container, SymbolKind::Function);
    }

    /// `func (s *Shape) Area() float64` is `pkg.Shape.Area`, contained by
    /// `pkg.Shape` even when the type is declared in another file.
    fn visit_method(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = state.text(name_node).to_string();
        let receiver = node
            .child_by_field_name("receiver")
            .and_then(|r| Self::receiver_type(state, r));
        let Some(receiver) = receiver else {
            state.warn(node, "skipped method without a receiver type");
            return;
        };
        let owner = state.qualify(&receiver);
        let qualified_name = state.qualify_in(&owner, &name);
        let container = symbol_id(&owner, "");
        Self::emit_callable(state, node, name, qualified_name, container, SymbolKind::Method);
    }

    fn emit_callable(
        state: &mut ExtractionState<'_>,
        node: TsNode<'_>,
        name: String,
        qualified_name: String,
        container: String,
        kind: SymbolKind,
    ) {
        let body = node.child_by_field_name("body");
        let header = state.header(node, body);
        let docstring = state.comments_above(node, COMMENTS, &[]);
        let id = state.emit(Emit {
            kind,
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
                kind,
                bases: Vec::new(),
                callable: true,
            });
            Self::visit_children(state, body);
            state.pop_scope();
        }
    }

    /// The named type of the first receiver parameter, through `*T` and
    /// `T[K]`.
    fn receiver_type(state: &ExtractionState<'_>, receiver: TsNode<'_>) -> Option<String> {
        let mut cursor = receiver.walk();
        let parameter = receiver
            .named_children(&mut cursor)
            .find(|c| c.kind() == "parameter_declaration")?;
        let mut ty = parameter.child_by_field_name("type")?;
        loop {
            match ty.kind() {
                "pointer_type" => ty = ty.named_child(0)?,
                "generic_type" => ty = ty.child_by_field_name("type")?,
                "type_identifier" => return Some(state.text(ty).to_string()),
                _ => return None,
            }
        }
    }

    /// The name a type expression refers to, if it names one.
    fn named_type(state: &ExtractionState<'_>, ty: TsNode<'_>) -> Option<String> {
        match ty.kind() {
            "type_identifier" => Some(state.text(ty).to_string()),
            "qualified_type" => Some(state.text(ty).split_whitespace().collect()),
            "pointer_type" => Self::named_type(state, ty.named_child(0)?),
            "generic_type" => Self::named_type(state, ty.child_by_field_name("type")?),
            _ => None,
        }
    }

    /// `type X struct {...}`, `type X interface {...}`, `type X Y` and
    /// `type X = Y`.
    fn visit_type_spec(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let Some(ty) = node.child_by_field_name("type") else {
            return;
        };
        let name = state.text(name_node).to_string();
        let kind = match (node.kind(), ty.kind()) {
            ("type_spec", "struct_type") => SymbolKind::Struct,
            ("type_spec", "interface_type") => SymbolKind::Class,
            _ => SymbolKind::Typedef,
        };
        let signature = if kind == SymbolKind::Typedef {
            canonical_type(state.text(ty))
        } else {
            String::new()
        };

        let qualified_name = state.qualify(&name);
        let container = state.current().id.clone();
        let header = if kind == SymbolKind::Typedef {
            collapse_whitespace(state.text(node))
        } else {
            format!("type {name} {}", ty.kind().trim_end_matches("_type"))
        };
        let docstring = Self::doc(state, node);
        let line = span_of(node).start_line;
        let id = state.emit(Emit {
            kind,
            name: name.clone(),
            qualified_name: qualified_name.clone(),
            signature,
            container,
            role: OccurrenceRole::Definition,
            node,
            header,
            docstring,
        });

        if kind == SymbolKind::Typedef {
            if let Some(target) = Self::named_type(state, ty) {
                let candidates = state.scope_candidates(&target);
                state.edge_named(&id, EdgeKind::TypedefsTo, candidates, None, None, line);
            }
            return;
        }

        state.push_scope(Scope {
            name,
            qualified_name,
            id,
            kind,
            bases: Vec::new(),
            callable: false,
        });
        if kind == SymbolKind::Struct {
            Self::visit_struct_fields(state, ty);
        } else {
            Self::visit_interface_elements(state, ty);
        }
        state.pop_scope();
    }

    fn visit_struct_fields(state: &mut ExtractionState<'_>, struct_type: TsNode<'_>) {
        let mut cursor = struct_type.walk();
        let Some(list) = struct_type
            .named_children(&mut cursor)
            .find(|c| c.kind() == "field_declaration_list")
        else {
            return;
        };
        let mut cursor = list.walk();
        let fields: Vec<TsNode<'_>> = list
            .named_children(&mut cursor)
            .filter(|c| classify(state.language, c.kind()) == Some(SymbolKindHint::FieldDeclaration))
            .collect();
        for field in fields {
            let mut names_cursor = field.walk();
            let names: Vec<TsNode<'_>> = field
                .children_by_field_name("name", &mut names_cursor)
                .collect();
            // embedded fields have no name of their own
            if names.is_empty() {
                continue;
            }
            let header = collapse_whitespace(state.text(field));
            let docstring = state.comments_above(field, COMMENTS, &[]);
            for name_node in names {
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
                    node: field,
                    header: header.clone(),
                    docstring: docstring.clone(),
                });
            }
        }
    }

    /// Method elements; embedded interfaces and type unions name no member.
    fn visit_interface_elements(state: &mut ExtractionState<'_>, interface: TsNode<'_>) {
        let mut cursor = interface.walk();
        let methods: Vec<TsNode<'_>> = interface
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "method_elem")
            .collect();
        for method in methods {
            let Some(name_node) = method.child_by_field_name("name") else {
                continue;
            };
            let name = state.text(name_node).to_string();
            let qualified_name = state.qualify(&name);
            let container = state.current().id.clone();
            let header = collapse_whitespace(state.text(method));
            let docstring = state.comments_above(method, COMMENTS, &[]);
            state.emit(Emit {
                kind: SymbolKind::Method,
                name,
                qualified_name,
                signature: String::new(),
                container,
                role: OccurrenceRole::Declaration,
                node: method,
                header,
                docstring,
            });
        }
    }

    /// Package-level `const` and `var` declarations. Inside function bodies
    /// they are locals and only scanned for calls.
    fn visit_value_declaration(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let mut specs = Vec::new();
        Self::value_specs(node, &mut specs);
        for spec in specs {
            if !state.in_function() {
                let header = collapse_whitespace(state.text(spec));
                let docstring = Self::doc(state, spec);
                let mut cursor = spec.walk();
                let names: Vec<TsNode<'_>> = spec
                    .children_by_field_name("name", &mut cursor)
                    .filter(|n| n.kind() == "identifier")
                    .collect();
                for name_node in names {
                    let name = state.text(name_node).to_string();
                    if name == "_" {
                        continue;
                    }
                    let qualified_name = state.qualify(&name);
                    let container = state.current().id.clone();
                    state.emit(Emit {
                        kind: SymbolKind::Variable,
                        name,
                        qualified_name,
                        signature: String::new(),
                        container,
                        role: OccurrenceRole::Definition,
                        node: spec,
                        header: header.clone(),
                        docstring: docstring.clone(),
                    });
                }
            }
            if let Some(value) = spec.child_by_field_name("value") {
                Self::visit_children(state, value);
            }
        }
    }

    fn value_specs<'t>(node: TsNode<'t>, out: &mut Vec<TsNode<'t>>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "const_spec" | "var_spec" => out.push(child),
                "var_spec_list" => Self::value_specs(child, out),
                _ => {}
            }
        }
    }

    fn visit_call(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        if state.in_function() {
            if let Some(function) = node.child_by_field_name("function") {
                let line = span_of(node).start_line;
                match function.kind() {
                    "identifier" => {
                        let callee = state.text(function).to_string();
                        let candidates = state.scope_candidates(&callee);
                        state.call(&callee, candidates, line);
                    }
                    "selector_expression" => {
                        if let Some(field) = function.child_by_field_name("field") {
                            let callee = state.text(field).to_string();
                            let mut candidates = Vec::new();
                            // `pkg.Func` names a function of another package
                            if let Some(operand) = function
                                .child_by_field_name("operand")
                                .filter(|o| o.kind() == "identifier")
                            {
                                candidates.push(format!("{}.{callee}", state.text(operand)));
                            }
                            candidates.push(callee.clone());
                            state.call(&callee, candidates, line);
                        }
                    }
                    _ => {}
                }
            }
        }
        Self::visit_children(state, node);
    }
}
