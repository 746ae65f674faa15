/// Tree-sitter based C and C++ symbol extractor.
///
/// One walker serves both grammars: C++ only adds node kinds (namespaces,
/// classes, templates, friends) that never appear in a C tree.
use tree_sitter::Node as TsNode;

use super::state::{
    canonical_type, collapse_whitespace, split_scoped, strip_template_args, Emit,
    ExtractionState, Scope,
};
use super::{ExtractOptions, LanguageExtractor};
use crate::grammar::{classify, GrammarRegistry, SymbolKindHint, SyntaxTree};
use crate::types::{
    symbol_id, EdgeKind, Extraction, KindFamily, LanguageId, OccurrenceRole, SymbolKind,
};

/// Extracts symbols from C and C++ translation units.
pub struct CFamilyExtractor;

/// Template header of the declaration being visited.
#[derive(Debug, Clone, Copy)]
struct TemplateContext {
    /// `template<>`: an explicit specialization.
    explicit: bool,
}

/// A possibly qualified name as written in source, e.g. `ns::Shape::area`.
#[derive(Debug, Clone)]
struct ScopedName {
    scope: Vec<String>,
    absolute: bool,
    name: String,
    /// Template arguments on the last segment, without the angle brackets.
    args: Option<String>,
    /// Whether any scope segment carried template arguments (`Box<T>::get`).
    templated_scope: bool,
}

impl ScopedName {
    fn parse(text: &str) -> Self {
        let text = text.trim();
        let absolute = text.starts_with("::");
        let body = text.trim_start_matches("::");
        let mut parts = split_scoped(body, "::");
        let last = parts.pop().unwrap_or("").trim();
        let templated_scope = parts.iter().any(|p| p.contains('<'));
        let scope = parts
            .iter()
            .map(|p| strip_template_args(p).trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let (name, args) = if last.starts_with("operator") {
            (canonical_type(last), None)
        } else if let (Some(open), Some(close)) = (last.find('<'), last.rfind('>')) {
            let args = if close > open {
                canonical_type(&last[open + 1..close])
            } else {
                String::new()
            };
            (last[..open].trim().to_string(), Some(args))
        } else {
            (last.to_string(), None)
        };

        Self {
            scope,
            absolute,
            name,
            args,
            templated_scope,
        }
    }

    fn is_qualified(&self) -> bool {
        self.absolute || !self.scope.is_empty()
    }
}

/// The parts of a function declarator the extractor cares about.
struct FunctionParts<'t> {
    name: String,
    params: Option<TsNode<'t>>,
    /// Node whose direct children carry `const` and friends.
    qualifiers: TsNode<'t>,
}

impl LanguageExtractor for CFamilyExtractor {
    fn languages(&self) -> &[LanguageId] {
        &[LanguageId::C, LanguageId::Cpp]
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
        Self::visit_children(&mut state, root);
        state.finish()
    }
}

impl CFamilyExtractor {
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
            Some(SymbolKindHint::Namespace) => Self::visit_namespace(state, node),
            Some(SymbolKindHint::Record(kind)) => Self::visit_record(state, node, kind, None, None),
            Some(SymbolKindHint::Enum) => Self::visit_enum(state, node, None),
            Some(SymbolKindHint::FunctionDefinition) => {
                Self::visit_function_definition(state, node, None, None)
            }
            Some(SymbolKindHint::Declaration) => Self::visit_declaration(state, node, None),
            Some(SymbolKindHint::FieldDeclaration) => {
                Self::visit_field_declaration(state, node, None)
            }
            Some(SymbolKindHint::Template) => Self::visit_template(state, node),
            Some(SymbolKindHint::Typedef) => Self::visit_typedef(state, node),
            Some(SymbolKindHint::Alias) => Self::visit_alias(state, node),
            Some(SymbolKindHint::Macro) => Self::visit_macro(state, node),
            Some(SymbolKindHint::Friend) => Self::visit_friend(state, node),
            Some(SymbolKindHint::CallSite) => Self::visit_call(state, node),
            _ => Self::visit_children(state, node),
        }
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    fn visit_namespace(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let body = node.child_by_field_name("body");
        let Some(name_node) = node.child_by_field_name("name") else {
            // anonymous namespace: members land in the enclosing scope
            if let Some(body) = body {
                Self::visit_children(state, body);
            }
            return;
        };

        let segments: Vec<String> = split_scoped(state.text(name_node), "::")
            .iter()
            .map(|s| s.trim().trim_start_matches("inline").trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let header = state.header(node, body);
        let docstring = Self::leading_comment(state, node);

        for (i, segment) in segments.iter().enumerate() {
            let qualified_name = state.qualify(segment);
            let container = state.current().id.clone();
            let id = state.emit(Emit {
                kind: SymbolKind::Namespace,
                name: segment.clone(),
                qualified_name: qualified_name.clone(),
                signature: String::new(),
                container,
                role: OccurrenceRole::Definition,
                node,
                header: header.clone(),
                docstring: if i + 1 == segments.len() {
                    docstring.clone()
                } else {
                    None
                },
            });
            state.push_scope(Scope {
                name: segment.clone(),
                qualified_name,
                id,
                kind: SymbolKind::Namespace,
                bases: Vec::new(),
                callable: false,
            });
        }

        if let Some(body) = body {
            Self::visit_children(state, body);
        }
        for _ in &segments {
            state.pop_scope();
        }
    }

    fn visit_record(
        state: &mut ExtractionState<'_>,
        node: TsNode<'_>,
        kind: SymbolKind,
        template: Option<TemplateContext>,
        typedef_name: Option<&str>,
    ) {
        let body = node.child_by_field_name("body");
        let written = match (node.child_by_field_name("name"), typedef_name) {
            (Some(name_node), _) => ScopedName::parse(state.text(name_node)),
            (None, Some(alias)) => ScopedName::parse(alias),
            (None, None) => {
                if let Some(body) = body {
                    let declares_member = node
                        .parent()
                        .and_then(|p| p.child_by_field_name("declarator"))
                        .is_some();
                    if state.current().kind.is_class_like() && !declares_member {
                        // anonymous member union/struct: fields belong to the enclosing record
                        Self::visit_children(state, body);
                    } else {
                        state.warn(node, "skipped anonymous record");
                    }
                }
                return;
            }
        };
        if body.is_none() && !Self::is_forward_declaration(node) {
            return;
        }
        if written.name.is_empty() {
            state.warn(node, "skipped record without a usable name");
            return;
        }

        let kind = match (template, &written.args) {
            (_, Some(_)) => SymbolKind::TemplateSpecialization,
            (Some(t), None) if t.explicit => SymbolKind::TemplateSpecialization,
            (Some(_), None) => SymbolKind::Template,
            (None, None) => kind,
        };
        let signature = written
            .args
            .as_ref()
            .map(|a| format!("<{a}>"))
            .unwrap_or_default();

        let bases = Self::base_classes(state, node);
        let (container, qualified_name) = Self::place(state, &written);
        let header = state.header(node, body);
        let docstring = Self::leading_comment(state, node);
        let line = node.start_position().row as u32 + 1;

        let id = state.emit(Emit {
            kind,
            name: written.name.clone(),
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

        if kind == SymbolKind::TemplateSpecialization {
            let candidates = state.scope_candidates(&written.name);
            state.edge_named(
                &id,
                EdgeKind::Specializes,
                candidates,
                None,
                Some(KindFamily::Template),
                line,
            );
        }

        if let Some(body) = body {
            state.push_scope(Scope {
                name: written.name,
                qualified_name,
                id,
                kind,
                bases,
                callable: false,
            });
            Self::visit_children(state, body);
            state.pop_scope();
        }
    }

    /// Candidate qualified names of every base in a `base_class_clause`.
    fn base_classes(state: &ExtractionState<'_>, node: TsNode<'_>) -> Vec<Vec<String>> {
        let mut bases = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "base_class_clause" {
                continue;
            }
            let mut inner = child.walk();
            for base in child.named_children(&mut inner) {
                if matches!(
                    base.kind(),
                    "type_identifier" | "qualified_identifier" | "template_type"
                ) {
                    let name = strip_template_args(state.text(base));
                    let name = name.trim().trim_start_matches("::");
                    if !name.is_empty() {
                        bases.push(state.scope_candidates(name));
                    }
                }
            }
        }
        bases
    }

    /// A specifier without a body declares a type only when it stands alone,
    /// as in `struct Point;`.
    fn is_forward_declaration(node: TsNode<'_>) -> bool {
        match node.parent() {
            None => true,
            Some(parent) => match parent.kind() {
                "declaration" | "field_declaration" => {
                    parent.child_by_field_name("declarator").is_none()
                }
                "translation_unit" | "declaration_list" | "field_declaration_list"
                | "template_declaration" | "linkage_specification" | "preproc_if"
                | "preproc_ifdef" | "preproc_else" | "preproc_elif" => true,
                _ => false,
            },
        }
    }

    fn visit_enum(state: &mut ExtractionState<'_>, node: TsNode<'_>, typedef_name: Option<&str>) {
        let body = node.child_by_field_name("body");
        let name = node
            .child_by_field_name("name")
            .map(|n| state.text(n).to_string())
            .or_else(|| typedef_name.map(str::to_string));

        let Some(name) = name else {
            // anonymous enum: enumerators are constants of the enclosing scope
            if let Some(body) = body {
                let kind = if state.current().kind.is_class_like() {
                    SymbolKind::Field
                } else {
                    SymbolKind::Variable
                };
                Self::visit_enumerators(state, body, kind);
            }
            return;
        };
        if body.is_none() && !Self::is_forward_declaration(node) {
            return;
        }

        let written = ScopedName::parse(&name);
        let (container, qualified_name) = Self::place(state, &written);
        let header = state.header(node, body);
        let docstring = Self::leading_comment(state, node);
        let id = state.emit(Emit {
            kind: SymbolKind::Enum,
            name: written.name.clone(),
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
                name: written.name,
                qualified_name,
                id,
                kind: SymbolKind::Enum,
                bases: Vec::new(),
                callable: false,
            });
            Self::visit_enumerators(state, body, SymbolKind::Field);
            state.pop_scope();
        }
    }

    fn visit_enumerators(state: &mut ExtractionState<'_>, body: TsNode<'_>, kind: SymbolKind) {
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            if classify(state.language, child.kind()) != Some(SymbolKindHint::Enumerator) {
                continue;
            }
            let Some(name_node) = child.child_by_field_name("name") else {
                continue;
            };
            let name = state.text(name_node).to_string();
            let qualified_name = state.qualify(&name);
            let container = state.current().id.clone();
            let header = collapse_whitespace(state.text(child));
            state.emit(Emit {
                kind,
                name,
                qualified_name,
                signature: String::new(),
                container,
                role: OccurrenceRole::Definition,
                node: child,
                header,
                docstring: None,
            });
        }
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn visit_function_definition(
        state: &mut ExtractionState<'_>,
        node: TsNode<'_>,
        template: Option<TemplateContext>,
        friend_of: Option<String>,
    ) {
        let Some(declarator) = node.child_by_field_name("declarator") else {
            state.warn(node, "skipped function definition without declarator");
            return;
        };
        let body = node.child_by_field_name("body");
        if Self::emit_function(
            state,
            node,
            declarator,
            OccurrenceRole::Definition,
            body,
            template,
            friend_of,
        )
        .is_none()
        {
            state.warn(node, "skipped function definition with unrecognized name");
        }
    }

    /// Emits a function, method, template or specialization and walks its
    /// body. Returns the symbol id, or `None` if `declarator` does not
    /// declare a callable.
    #[allow(clippy::too_many_arguments)]
    fn emit_function(
        state: &mut ExtractionState<'_>,
        outer: TsNode<'_>,
        declarator: TsNode<'_>,
        role: OccurrenceRole,
        body: Option<TsNode<'_>>,
        template: Option<TemplateContext>,
        friend_of: Option<String>,
    ) -> Option<String> {
        let parts = Self::function_parts(state, declarator)?;
        let written = ScopedName::parse(&parts.name);
        if written.name.is_empty() {
            return None;
        }

        // C included, so a prototype keeps its identity whichever grammar
        // parsed the header
        let mut signature = Self::parameter_signature(state, parts.params);
        if Self::has_const_qualifier(state, parts.qualifiers) {
            signature.push_str(" const");
        }

        let specialization =
            written.args.is_some() || template.map(|t| t.explicit).unwrap_or(false);
        let member_of_template = template.is_some() && !specialization && written.templated_scope;
        let in_class =
            !written.is_qualified() && friend_of.is_none() && state.current().kind.is_class_like();

        let kind = if specialization {
            signature = format!("<{}>{}", written.args.clone().unwrap_or_default(), signature);
            SymbolKind::TemplateSpecialization
        } else if template.is_some() && !member_of_template {
            SymbolKind::Template
        } else if in_class || member_of_template {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };

        let (container, qualified_name) = if friend_of.is_some() {
            let scope = state.enclosing_non_class().clone();
            Self::place_in(state, &scope.qualified_name, &scope.id, &written)
        } else {
            Self::place(state, &written)
        };

        let header = state.header(outer, body);
        let docstring = Self::leading_comment(state, outer);
        let line = outer.start_position().row as u32 + 1;
        let identity_signature = signature.clone();

        let id = state.emit(Emit {
            kind,
            name: written.name.clone(),
            qualified_name: qualified_name.clone(),
            signature,
            container,
            role,
            node: outer,
            header,
            docstring,
        });

        if kind == SymbolKind::TemplateSpecialization {
            let candidates = if written.is_qualified() {
                let scope = written.scope.join("::");
                state.scope_candidates(&format!("{}::{}", scope, written.name))
            } else {
                state.scope_candidates(&written.name)
            };
            state.edge_named(
                &id,
                EdgeKind::Specializes,
                candidates,
                None,
                Some(KindFamily::Template),
                line,
            );
        }

        if let Some(class_id) = &friend_of {
            state.edge_to(&id, class_id, EdgeKind::FriendOf, line);
        } else if in_class {
            let class_name = state.current().name.clone();
            let special = written.name == class_name || written.name.starts_with('~');
            if !special {
                state.overrides(&id, &written.name, &identity_signature, line);
            }
        }

        if let Some(body) = body {
            state.push_scope(Scope {
                name: written.name,
                qualified_name,
                id: id.clone(),
                kind,
                bases: Vec::new(),
                callable: true,
            });
            Self::visit_children(state, body);
            state.pop_scope();
        }

        Some(id)
    }

    /// Finds the function declarator under pointer and reference wrappers.
    fn function_parts<'t>(
        state: &ExtractionState<'_>,
        declarator: TsNode<'t>,
    ) -> Option<FunctionParts<'t>> {
        match declarator.kind() {
            "function_declarator" => {
                let name_node = declarator.child_by_field_name("declarator")?;
                // `int (*fp)(int)` declares a pointer, not a function
                if name_node.kind() == "parenthesized_declarator" {
                    return None;
                }
                Some(FunctionParts {
                    name: state.text(name_node).to_string(),
                    params: declarator.child_by_field_name("parameters"),
                    qualifiers: declarator,
                })
            }
            "operator_cast" => {
                let target = declarator
                    .child_by_field_name("type")
                    .map(|t| canonical_type(state.text(t)))
                    .unwrap_or_default();
                let inner = declarator.child_by_field_name("declarator")?;
                Some(FunctionParts {
                    name: format!("operator {target}"),
                    params: inner.child_by_field_name("parameters"),
                    qualifiers: inner,
                })
            }
            "pointer_declarator" | "reference_declarator" | "attributed_declarator" => {
                let inner = match declarator.child_by_field_name("declarator") {
                    Some(inner) => inner,
                    None => {
                        let mut cursor = declarator.walk();
                        let last = declarator.named_children(&mut cursor).last()?;
                        last
                    }
                };
                Self::function_parts(state, inner)
            }
            _ => None,
        }
    }

    /// Parameter type spellings joined into `"(T1, T2)"`; names and default
    /// values are dropped and `(void)` becomes `()`.
    fn parameter_signature(state: &ExtractionState<'_>, params: Option<TsNode<'_>>) -> String {
        let Some(params) = params else {
            return "()".to_string();
        };
        let mut parts = Vec::new();
        let mut cursor = params.walk();
        for child in params.named_children(&mut cursor) {
            match child.kind() {
                "comment" => {}
                "parameter_declaration"
                | "optional_parameter_declaration"
                | "variadic_parameter_declaration" => {
                    parts.push(Self::parameter_type(state, child));
                }
                _ => parts.push(canonical_type(state.text(child))),
            }
        }
        if parts.len() == 1 && parts[0] == "void" {
            parts.clear();
        }
        format!("({})", parts.join(", "))
    }

    fn parameter_type(state: &ExtractionState<'_>, param: TsNode<'_>) -> String {
        let start = param.start_byte();
        let end = param
            .child_by_field_name("default_value")
            .map(|d| d.start_byte())
            .unwrap_or(param.end_byte());
        let mut text = state
            .slice(start, end)
            .trim_end()
            .trim_end_matches('=')
            .to_string();
        if let Some(name) = param
            .child_by_field_name("declarator")
            .and_then(Self::innermost_name)
        {
            if name.start_byte() >= start {
                let (a, b) = (name.start_byte() - start, name.end_byte() - start);
                if b <= text.len() && text.is_char_boundary(a) && text.is_char_boundary(b) {
                    text.replace_range(a..b, "");
                }
            }
        }
        canonical_type(&text)
    }

    fn has_const_qualifier(state: &ExtractionState<'_>, node: TsNode<'_>) -> bool {
        let mut cursor = node.walk();
        let found = node
            .children(&mut cursor)
            .any(|c| c.kind() == "type_qualifier" && state.text(c) == "const");
        found
    }

    /// The identifier a declarator ultimately names.
    fn innermost_name(node: TsNode<'_>) -> Option<TsNode<'_>> {
        match node.kind() {
            "identifier" | "field_identifier" | "type_identifier" | "qualified_identifier"
            | "destructor_name" | "operator_name" | "template_function" => Some(node),
            _ => {
                if let Some(inner) = node.child_by_field_name("declarator") {
                    return Self::innermost_name(inner);
                }
                let mut cursor = node.walk();
                let found = node
                    .named_children(&mut cursor)
                    .find_map(Self::innermost_name);
                found
            }
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn visit_declaration(
        state: &mut ExtractionState<'_>,
        node: TsNode<'_>,
        template: Option<TemplateContext>,
    ) {
        if state.current().callable {
            // locals are not symbols, but local types and calls still are
            Self::visit_children(state, node);
            return;
        }
        let storage = Self::storage_classes(state, node);
        let is_extern = storage.contains(&"extern");

        if let Some(ty) = node.child_by_field_name("type") {
            Self::visit_type(state, ty, template);
        }

        let mut cursor = node.walk();
        let declarators: Vec<TsNode<'_>> =
            node.children_by_field_name("declarator", &mut cursor).collect();
        for declarator in declarators {
            let (inner, initialized) = if declarator.kind() == "init_declarator" {
                match declarator.child_by_field_name("declarator") {
                    Some(inner) => (inner, true),
                    None => continue,
                }
            } else {
                (declarator, false)
            };

            if Self::function_parts(state, inner).is_some() {
                Self::emit_function(
                    state,
                    node,
                    inner,
                    OccurrenceRole::Declaration,
                    None,
                    template,
                    None,
                );
                continue;
            }

            let role = if is_extern && !initialized {
                OccurrenceRole::Declaration
            } else {
                OccurrenceRole::Definition
            };
            Self::emit_variable(state, node, inner, role);
            if initialized {
                if let Some(value) = declarator.child_by_field_name("value") {
                    Self::visit_node(state, value);
                }
            }
        }
    }

    fn visit_field_declaration(
        state: &mut ExtractionState<'_>,
        node: TsNode<'_>,
        template: Option<TemplateContext>,
    ) {
        let storage = Self::storage_classes(state, node);
        let is_static = storage.contains(&"static");

        if let Some(ty) = node.child_by_field_name("type") {
            Self::visit_type(state, ty, None);
        }

        let mut cursor = node.walk();
        let declarators: Vec<TsNode<'_>> =
            node.children_by_field_name("declarator", &mut cursor).collect();
        for declarator in declarators {
            if Self::function_parts(state, declarator).is_some() {
                Self::emit_function(
                    state,
                    node,
                    declarator,
                    OccurrenceRole::Declaration,
                    None,
                    template,
                    None,
                );
                continue;
            }
            // in-class static data members are defined out of line
            let role = if is_static {
                OccurrenceRole::Declaration
            } else {
                OccurrenceRole::Definition
            };
            Self::emit_variable(state, node, declarator, role);
        }
    }

    /// Visits a declaration's type when it introduces a record or enum.
    fn visit_type(
        state: &mut ExtractionState<'_>,
        ty: TsNode<'_>,
        template: Option<TemplateContext>,
    ) {
        match classify(state.language, ty.kind()) {
            Some(SymbolKindHint::Record(kind)) => Self::visit_record(state, ty, kind, template, None),
            Some(SymbolKindHint::Enum) => Self::visit_enum(state, ty, None),
            _ => {}
        }
    }

    fn emit_variable(
        state: &mut ExtractionState<'_>,
        outer: TsNode<'_>,
        declarator: TsNode<'_>,
        role: OccurrenceRole,
    ) {
        let Some(name_node) = Self::innermost_name(declarator) else {
            return;
        };
        let written = ScopedName::parse(state.text(name_node));
        if written.name.is_empty() {
            return;
        }
        let kind = if !written.is_qualified() && state.current().kind.is_class_like() {
            SymbolKind::Field
        } else {
            SymbolKind::Variable
        };
        let (container, qualified_name) = Self::place(state, &written);
        let header = state.header(outer, None);
        let docstring = Self::leading_comment(state, outer);
        state.emit(Emit {
            kind,
            name: written.name,
            qualified_name,
            signature: String::new(),
            container,
            role,
            node: outer,
            header,
            docstring,
        });
    }

    fn storage_classes<'s>(state: &ExtractionState<'s>, node: TsNode<'_>) -> Vec<&'s str> {
        let mut cursor = node.walk();
        let found = node
            .children(&mut cursor)
            .filter(|c| c.kind() == "storage_class_specifier")
            .map(|c| state.text(c))
            .collect();
        found
    }

    fn visit_template(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let params = node.child_by_field_name("parameters");
        let explicit = params.map(|p| p.named_child_count() == 0).unwrap_or(false);
        let context = Some(TemplateContext { explicit });

        let mut cursor = node.walk();
        let children: Vec<TsNode<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            if params.map(|p| p.id() == child.id()).unwrap_or(false) {
                continue;
            }
            match classify(state.language, child.kind()) {
                Some(SymbolKindHint::FunctionDefinition) => {
                    Self::visit_function_definition(state, child, context, None)
                }
                Some(SymbolKindHint::Declaration) => Self::visit_declaration(state, child, context),
                Some(SymbolKindHint::FieldDeclaration) => {
                    Self::visit_field_declaration(state, child, context)
                }
                Some(SymbolKindHint::Record(kind)) => {
                    Self::visit_record(state, child, kind, context, None)
                }
                _ => Self::visit_node(state, child),
            }
        }
    }

    // ------------------------------------------------------------------
    // Type aliases and macros
    // ------------------------------------------------------------------

    fn visit_typedef(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        if state.current().callable {
            return;
        }
        let Some(ty) = node.child_by_field_name("type") else {
            return;
        };
        let mut cursor = node.walk();
        let declarators: Vec<TsNode<'_>> =
            node.children_by_field_name("declarator", &mut cursor).collect();
        let named: Vec<(TsNode<'_>, TsNode<'_>)> = declarators
            .iter()
            .filter_map(|d| Self::innermost_name(*d).map(|n| (*d, n)))
            .collect();
        if named.is_empty() {
            state.warn(node, "skipped typedef without a name");
            return;
        }

        let hint = classify(state.language, ty.kind());
        let is_record = matches!(
            hint,
            Some(SymbolKindHint::Record(_)) | Some(SymbolKindHint::Enum)
        );
        let mut skip_first = false;
        let (base, spelling) = if is_record {
            let keyword = ty.child(0).map(|k| state.text(k)).unwrap_or("struct");
            let has_body = ty.child_by_field_name("body").is_some();
            let tag = ty.child_by_field_name("name").map(|n| state.text(n).to_string());
            let base = match tag {
                Some(tag) => {
                    if has_body {
                        Self::visit_tagged(state, ty, hint, None);
                    }
                    tag
                }
                None => {
                    // `typedef struct { ... } Name;` names the record itself
                    let alias = state.text(named[0].1).to_string();
                    Self::visit_tagged(state, ty, hint, Some(&alias));
                    skip_first = true;
                    alias
                }
            };
            let spelling = format!("{keyword} {base}");
            (Some(base), spelling)
        } else {
            let base = match ty.kind() {
                "type_identifier" | "qualified_identifier" | "template_type" => {
                    Some(strip_template_args(state.text(ty)).trim().to_string())
                }
                _ => None,
            };
            (base, state.text(ty).to_string())
        };

        let header = state.header(node, None);
        let docstring = Self::leading_comment(state, node);
        let line = node.start_position().row as u32 + 1;
        for (declarator, name_node) in named.into_iter().skip(usize::from(skip_first)) {
            let name = state.text(name_node).to_string();
            let abstract_declarator = format!(
                "{}{}",
                state.slice(declarator.start_byte(), name_node.start_byte()),
                state.slice(name_node.end_byte(), declarator.end_byte())
            );
            let aliased = canonical_type(&format!("{spelling} {abstract_declarator}"));
            let qualified_name = state.qualify(&name);
            let container = state.current().id.clone();
            let id = state.emit(Emit {
                kind: SymbolKind::Typedef,
                name,
                qualified_name,
                signature: aliased,
                container,
                role: OccurrenceRole::Definition,
                node,
                header: header.clone(),
                docstring: docstring.clone(),
            });
            if let Some(base) = &base {
                let candidates = state.scope_candidates(base);
                let expect = if is_record { Some(KindFamily::Type) } else { None };
                state.edge_named(&id, EdgeKind::TypedefsTo, candidates, None, expect, line);
            }
        }
    }

    fn visit_tagged(
        state: &mut ExtractionState<'_>,
        ty: TsNode<'_>,
        hint: Option<SymbolKindHint>,
        alias: Option<&str>,
    ) {
        match hint {
            Some(SymbolKindHint::Record(kind)) => Self::visit_record(state, ty, kind, None, alias),
            Some(SymbolKindHint::Enum) => Self::visit_enum(state, ty, alias),
            _ => {}
        }
    }

    /// `using Name = Type;`
    fn visit_alias(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        if state.current().callable {
            return;
        }
        let (Some(name_node), Some(ty)) = (
            node.child_by_field_name("name"),
            node.child_by_field_name("type"),
        ) else {
            return;
        };
        let name = state.text(name_node).to_string();
        let aliased = canonical_type(state.text(ty));
        let base = ty
            .child_by_field_name("type")
            .filter(|t| {
                matches!(
                    t.kind(),
                    "type_identifier" | "qualified_identifier" | "template_type"
                )
            })
            .map(|t| strip_template_args(state.text(t)).trim().to_string());

        let qualified_name = state.qualify(&name);
        let container = state.current().id.clone();
        let header = state.header(node, None);
        let docstring = Self::leading_comment(state, node);
        let line = node.start_position().row as u32 + 1;
        let id = state.emit(Emit {
            kind: SymbolKind::Typedef,
            name,
            qualified_name,
            signature: aliased,
            container,
            role: OccurrenceRole::Definition,
            node,
            header,
            docstring,
        });
        if let Some(base) = base {
            let candidates = state.scope_candidates(&base);
            state.edge_named(&id, EdgeKind::TypedefsTo, candidates, None, None, line);
        }
    }

    /// `#define NAME value` and `#define NAME(args) value`.
    fn visit_macro(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = state.text(name_node).to_string();
        let qualified_name = state.qualify(&name);
        let container = state.current().id.clone();
        let header = state.header(node, node.child_by_field_name("value"));
        let docstring = Self::leading_comment(state, node);
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

    // ------------------------------------------------------------------
    // Friends and calls
    // ------------------------------------------------------------------

    fn visit_friend(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        if !state.current().kind.is_class_like() {
            Self::visit_children(state, node);
            return;
        }
        let class_id = state.current().id.clone();
        let mut cursor = node.walk();
        let children: Vec<TsNode<'_>> = node.named_children(&mut cursor).collect();
        let mut declared = false;
        for child in children {
            match child.kind() {
                "declaration" => {
                    let mut inner = child.walk();
                    let declarators: Vec<TsNode<'_>> =
                        child.children_by_field_name("declarator", &mut inner).collect();
                    for declarator in declarators {
                        declared |= Self::emit_function(
                            state,
                            child,
                            declarator,
                            OccurrenceRole::Declaration,
                            None,
                            None,
                            Some(class_id.clone()),
                        )
                        .is_some();
                    }
                }
                "function_definition" => {
                    Self::visit_function_definition(state, child, None, Some(class_id.clone()));
                    declared = true;
                }
                _ => {}
            }
        }
        if !declared {
            state.warn(node, "skipped friend class declaration");
        }
    }

    fn visit_call(state: &mut ExtractionState<'_>, node: TsNode<'_>) {
        if state.in_function() {
            if let Some(function) = node.child_by_field_name("function") {
                let (callee, member) = match function.kind() {
                    "identifier" | "qualified_identifier" => {
                        (Some(state.text(function).to_string()), false)
                    }
                    "template_function" => (
                        function
                            .child_by_field_name("name")
                            .map(|n| state.text(n).to_string()),
                        false,
                    ),
                    "field_expression" => (
                        function
                            .child_by_field_name("field")
                            .map(|n| state.text(n).to_string()),
                        true,
                    ),
                    _ => (None, false),
                };
                if let Some(callee) = callee {
                    let callee = strip_template_args(&callee);
                    let callee = callee.trim().trim_start_matches("::").to_string();
                    let candidates = if member {
                        vec![callee.clone()]
                    } else {
                        state.scope_candidates(&callee)
                    };
                    let line = node.start_position().row as u32 + 1;
                    state.call(&callee, candidates, line);
                }
            }
        }
        Self::visit_children(state, node);
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Container id and qualified name for `written`, relative to the
    /// current scope.
    fn place(state: &ExtractionState<'_>, written: &ScopedName) -> (String, String) {
        let scope = state.current();
        Self::place_in(state, &scope.qualified_name, &scope.id, written)
    }

    fn place_in(
        state: &ExtractionState<'_>,
        base_qualified: &str,
        base_id: &str,
        written: &ScopedName,
    ) -> (String, String) {
        if !written.is_qualified() {
            return (
                base_id.to_string(),
                state.qualify_in(base_qualified, &written.name),
            );
        }
        let scope = written.scope.join(state.separator);
        let container_qualified = if written.absolute {
            scope
        } else {
            state.qualify_in(base_qualified, &scope)
        };
        if container_qualified.is_empty() {
            return (state.root_id().to_string(), written.name.clone());
        }
        (
            symbol_id(&container_qualified, ""),
            state.qualify_in(&container_qualified, &written.name),
        )
    }

    /// Comment lines directly above a declaration (or its template header).
    fn leading_comment(state: &ExtractionState<'_>, node: TsNode<'_>) -> Option<String> {
        let mut anchor = node;
        while let Some(parent) = anchor.parent() {
            if matches!(
                parent.kind(),
                "template_declaration" | "declaration" | "field_declaration" | "type_definition"
            ) && parent.start_byte() <= anchor.start_byte()
            {
                anchor = parent;
            } else {
                break;
            }
        }

        state.comments_above(anchor, &["comment"], &[])
    }
}
