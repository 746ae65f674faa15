/// Tree-sitter based Python symbol extractor.
///
/// Every module contributes a chain of namespaces derived from its path, so
/// `pkg/shapes.py` defines `pkg.shapes.Circle` and packages merge across
/// files the same way C++ namespaces do.
use tree_sitter::Node as TsNode;

use super::state::{collapse_whitespace, span_of, Emit, ExtractionState, Scope};
use super::{ExtractOptions, LanguageExtractor};
use crate::grammar::{classify, GrammarRegistry, SymbolKindHint, SyntaxTree};
use crate::types::{Extraction, LanguageId, OccurrenceRole, SymbolKind};

/// Extracts symbols from Python modules.
pub struct PythonExtractor;

impl LanguageExtractor for PythonExtractor {
    fn languages(&self) -> &[LanguageId] {
        &[LanguageId::Python]
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

        let module_doc = Self::docstring(&state, root);
        let segments = module_path(path);
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
                node: root,
                header: qualified_name.clone(),
                docstring: if i + 1 == depth {
                    module_doc.clone()
                } else {
                    None
                },
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

/// Module path segments for a file: `pkg/sub/mod.py` gives
/// `["pkg", "sub", "mod"]`, and `pkg/__init__.py` gives `["pkg"]`.
pub(crate) fn module_path(path: &str) -> Vec<String> {
    let stem = path
        .strip_suffix(".pyw")
        .or_else(|| path.strip_suffix(".py"))
        .unwrap_or(path);
    let mut segments: Vec<String> = stem
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map(str::to_string)
        .collect();
    if segments.last().map(|s| s == "__init__").unwrap_or(false) {
        segments.pop();
    }
    segments
}

impl PythonExtractor {
    /// Visit all named children of a node.
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

    /// Visit a single AST node, dispatching on its classification.
    fn visit_node(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        if node.is_error() {
            state.warn(node, "skipped unparseable region");
            return;
        }
        match classify(state.language, node.kind()) {
            Some(SymbolKindHint::Record(_)) => Self::visit_class(state, node, node),
            Some(SymbolKindHint::FunctionDefinition) => Self::visit_function(state, node, node),
            Some(SymbolKindHint::Decorated) => Self::visit_decorated(state, node),
            Some(SymbolKindHint::Assignment) => Self::visit_assignment(state, node),
            Some(SymbolKindHint::CallSite) => Self::visit_call(state, node),
            _ => Self::visit_children(state, node),
        }
    }

    fn visit_decorated(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let Some(definition) = node.child_by_field_name("definition") else {
            Self::visit_children(state, node);
            return;
        };
        // decorator expressions may call functions
        let mut cursor = node.walk();
        let decorators: Vec<TsNode<'_>> = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "decorator")
            .collect();
        for decorator in decorators {
            Self::visit_children(state, decorator);
        }
        match classify(state.language, definition.kind()) {
            Some(SymbolKindHint::Record(_)) => Self::visit_class(state, definition, node),
            Some(SymbolKindHint::FunctionDefinition) => {
                Self::visit_function(state, definition, node)
            }
            _ => Self::visit_node(state, definition),
        }
    }

    /// `outer` is the decorated wrapper when present; its span covers the
    /// decorators.
    fn visit_class(state: &mut ExtractionState<'_>, node: TsNode<'_>, outer: TsNode<'_>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            state.warn(node, "skipped class without a name");
            return;
        };
        let name = state.text(name_node).to_string();
        let body = node.child_by_field_name("body");

        let mut bases = Vec::new();
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for base in superclasses.named_children(&mut cursor) {
                if matches!(base.kind(), "identifier" | "attribute") {
                    let written = collapse_whitespace(state.text(base));
                    bases.push(state.scope_candidates(&written));
                }
            }
        }

        let qualified_name = state.qualify(&name);
        let container = state.current().id.clone();
        let header = state.header(node, body);
        let docstring = body.and_then(|b| Self::docstring(state, b));
        let id = state.emit(Emit {
            kind: SymbolKind::Class,
            name: name.clone(),
            qualified_name: qualified_name.clone(),
            signature: String::new(),
            container,
            role: OccurrenceRole::Definition,
            node: outer,
            header,
            docstring,
        });

        if let Some(body) = body {
            state.push_scope(Scope {
                name,
                qualified_name,
                id,
                kind: SymbolKind::Class,
                bases,
                callable: false,
            });
            Self::visit_children(state, body);
            state.pop_scope();
        }
    }

    fn visit_function(state: &mut ExtractionState<'_>, node: TsNode<'_>, outer: TsNode<'_>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            state.warn(node, "skipped function without a name");
            return;
        };
        let name = state.text(name_node).to_string();
        let body = node.child_by_field_name("body");
        let in_class = state.current().kind.is_class_like();
        let kind = if in_class {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };

        let qualified_name = state.qualify(&name);
        let container = state.current().id.clone();
        let header = state.header(node, body);
        let docstring = body.and_then(|b| Self::docstring(state, b));
        let line = span_of(outer).start_line;
        let id = state.emit(Emit {
            kind,
            name: name.clone(),
            qualified_name: qualified_name.clone(),
            signature: String::new(),
            container,
            role: OccurrenceRole::Definition,
            node: outer,
            header,
            docstring,
        });

        if in_class {
            state.overrides(&id, &name, "", line);
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

    /// Module variables and class attributes. Assignments inside function
    /// bodies are locals and only scanned for calls.
    fn visit_assignment(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        if !state.in_function() {
            if let Some(left) = node.child_by_field_name("left") {
                let role = if node.child_by_field_name("right").is_some() {
                    OccurrenceRole::Definition
                } else {
                    // annotation only: `x: int`
                    OccurrenceRole::Declaration
                };
                let kind = if state.current().kind.is_class_like() {
                    SymbolKind::Field
                } else {
                    SymbolKind::Variable
                };
                let mut targets = Vec::new();
                Self::assignment_targets(left, &mut targets);
                let header = collapse_whitespace(
                    state
                        .text(node)
                        .lines()
                        .next()
                        .unwrap_or_default(),
                );
                for target in targets {
                    let name = state.text(target).to_string();
                    let qualified_name = state.qualify(&name);
                    let container = state.current().id.clone();
                    state.emit(Emit {
                        kind,
                        name,
                        qualified_name,
                        signature: String::new(),
                        container,
                        role,
                        node,
                        header: header.clone(),
                        docstring: None,
                    });
                }
            }
        }
        if let Some(right) = node.child_by_field_name("right") {
            Self::visit_node(state, right);
        }
    }

    /// Plain names bound by an assignment target, including tuple unpacking.
    fn assignment_targets<'t>(node: TsNode<'t>, out: &mut Vec<TsNode<'t>>) {
        match node.kind() {
            "identifier" => out.push(node),
            "pattern_list" | "tuple_pattern" | "list_pattern" => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    Self::assignment_targets(child, out);
                }
            }
            _ => {}
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
                    "attribute" => {
                        if let Some(attr) = function.child_by_field_name("attribute") {
                            let callee = state.text(attr).to_string();
                            state.call(&callee, vec![callee.clone()], line);
                        }
                    }
                    _ => {}
                }
            }
        }
        Self::visit_children(state, node);
    }

    /// The string literal opening a module, class or function body.
    fn docstring(state: &ExtractionState<'_>, body: TsNode<'_>) -> Option<String> {
        let mut cursor = body.walk();
        let first = body
            .named_children(&mut cursor)
            .find(|c| c.kind() != "comment")?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let literal = first.named_child(0)?;
        if literal.kind() != "string" {
            return None;
        }
        let text = state.text(literal);
        let trimmed = text
            .trim_start_matches(['r', 'R', 'u', 'U', 'b', 'B'])
            .trim_start_matches("\"\"\"")
            .trim_start_matches("'''")
            .trim_end_matches("\"\"\"")
            .trim_end_matches("'''")
            .trim_matches(['"', '\''])
            .trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}
