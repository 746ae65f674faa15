use std::collections::HashSet;

use tree_sitter::Node as TsNode;

use crate::types::{
    file_id, symbol_id, CandidateSymbol, EdgeKind, EdgeRecord, Extraction, KindFamily,
    LanguageId, OccurrenceRole, Span, SymbolKind, TargetRef,
};

/// A named scope on the container stack.
#[derive(Debug, Clone)]
pub(crate) struct Scope {
    pub name: String,
    /// Empty for the file root, which is transparent to qualified names.
    pub qualified_name: String,
    pub id: String,
    pub kind: SymbolKind,
    /// Candidate qualified names for each base class, most specific first.
    pub bases: Vec<Vec<String>>,
    /// Function bodies: nested definitions and call sites attach here.
    pub callable: bool,
}

/// A symbol about to be emitted.
pub(crate) struct Emit<'t> {
    pub kind: SymbolKind,
    pub name: String,
    pub qualified_name: String,
    pub signature: String,
    pub container: String,
    pub role: OccurrenceRole,
    pub node: TsNode<'t>,
    pub header: String,
    pub docstring: Option<String>,
}

/// Internal state used during AST traversal.
pub(crate) struct ExtractionState<'s> {
    pub file_path: String,
    pub language: LanguageId,
    pub separator: &'static str,
    pub overloading: bool,
    pub track_calls: bool,
    source: &'s [u8],
    symbols: Vec<CandidateSymbol>,
    edges: Vec<EdgeRecord>,
    warnings: Vec<String>,
    /// Stack of enclosing scopes; index 0 is the file root.
    scopes: Vec<Scope>,
    seen_calls: HashSet<(String, String)>,
}

impl<'s> ExtractionState<'s> {
    pub fn new(
        file_path: &str,
        language: LanguageId,
        separator: &'static str,
        overloading: bool,
        track_calls: bool,
        source: &'s str,
        root: TsNode<'_>,
    ) -> Self {
        let root_id = file_id(file_path);
        let mut state = Self {
            file_path: file_path.to_string(),
            language,
            separator,
            overloading,
            track_calls,
            source: source.as_bytes(),
            symbols: Vec::new(),
            edges: Vec::new(),
            warnings: Vec::new(),
            scopes: Vec::new(),
            seen_calls: HashSet::new(),
        };
        state.symbols.push(CandidateSymbol {
            id: root_id.clone(),
            kind: SymbolKind::File,
            name: file_path.to_string(),
            qualified_name: file_path.to_string(),
            signature: String::new(),
            container: None,
            role: OccurrenceRole::Definition,
            span: span_of(root),
            header: file_path.to_string(),
            docstring: None,
        });
        state.scopes.push(Scope {
            name: file_path.to_string(),
            qualified_name: String::new(),
            id: root_id,
            kind: SymbolKind::File,
            bases: Vec::new(),
            callable: false,
        });
        state
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    pub fn current(&self) -> &Scope {
        // the file root is pushed in `new` and never popped
        &self.scopes[self.scopes.len() - 1]
    }

    /// Every open scope, outermost first.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn root_id(&self) -> &str {
        &self.scopes[0].id
    }

    pub fn push_scope(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Returns `true` when the traversal is inside a function body.
    pub fn in_function(&self) -> bool {
        self.current_function().is_some()
    }

    /// The innermost enclosing callable scope, if any.
    pub fn current_function(&self) -> Option<&Scope> {
        self.scopes.iter().rev().find(|s| s.callable)
    }

    /// The innermost scope that is not a class, used for friend functions.
    pub fn enclosing_non_class(&self) -> &Scope {
        self.scopes
            .iter()
            .rev()
            .find(|s| !s.kind.is_class_like())
            .unwrap_or(&self.scopes[0])
    }

    /// Joins `name` onto `prefix` with the language separator.
    pub fn qualify_in(&self, prefix: &str, name: &str) -> String {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}{}{}", prefix, self.separator, name)
        }
    }

    /// Qualifies `name` in the current scope.
    pub fn qualify(&self, name: &str) -> String {
        self.qualify_in(&self.current().qualified_name, name)
    }

    /// Candidate qualified names for `name` looked up from the current scope
    /// outward, innermost first.
    pub fn scope_candidates(&self, name: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for scope in self.scopes.iter().rev() {
            let candidate = self.qualify_in(&scope.qualified_name, name);
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        if out.is_empty() {
            out.push(name.to_string());
        }
        out
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    /// Records a candidate symbol and its containment edge. Returns the id.
    pub fn emit(&mut self, emit: Emit<'_>) -> String {
        let id = symbol_id(&emit.qualified_name, &emit.signature);
        let span = span_of(emit.node);
        self.edges.push(EdgeRecord {
            from: emit.container.clone(),
            to: Some(id.clone()),
            kind: EdgeKind::Contains,
            target: None,
            confirmed: true,
            file: self.file_path.clone(),
            line: span.start_line,
        });
        self.symbols.push(CandidateSymbol {
            id: id.clone(),
            kind: emit.kind,
            name: emit.name,
            qualified_name: emit.qualified_name,
            signature: emit.signature,
            container: Some(emit.container),
            role: emit.role,
            span,
            header: emit.header,
            docstring: emit.docstring,
        });
        id
    }

    /// Records an edge whose target is known by id.
    pub fn edge_to(&mut self, from: &str, to: &str, kind: EdgeKind, line: u32) {
        self.edges.push(EdgeRecord {
            from: from.to_string(),
            to: Some(to.to_string()),
            kind,
            target: None,
            confirmed: true,
            file: self.file_path.clone(),
            line,
        });
    }

    /// Records an edge whose target must be resolved by name later.
    pub fn edge_named(
        &mut self,
        from: &str,
        kind: EdgeKind,
        candidates: Vec<String>,
        signature: Option<String>,
        expect: Option<KindFamily>,
        line: u32,
    ) {
        if candidates.is_empty() {
            return;
        }
        self.edges.push(EdgeRecord {
            from: from.to_string(),
            to: None,
            kind,
            target: Some(TargetRef {
                candidates,
                signature,
                expect,
            }),
            confirmed: kind != EdgeKind::Calls,
            file: self.file_path.clone(),
            line,
        });
    }

    /// Records a best-effort call edge from the innermost function, once per
    /// callee name.
    pub fn call(&mut self, callee: &str, candidates: Vec<String>, line: u32) {
        if !self.track_calls {
            return;
        }
        let Some(from) = self.current_function().map(|s| s.id.clone()) else {
            return;
        };
        if !self.seen_calls.insert((from.clone(), callee.to_string())) {
            return;
        }
        self.edge_named(
            &from,
            EdgeKind::Calls,
            candidates,
            None,
            Some(KindFamily::Callable),
            line,
        );
    }

    /// Emits override candidates for a method of the current class against
    /// each of its bases.
    pub fn overrides(&mut self, method_id: &str, name: &str, signature: &str, line: u32) {
        let bases = self.current().bases.clone();
        for base in bases {
            let candidates: Vec<String> = base
                .iter()
                .map(|b| self.qualify_in(b, name))
                .collect();
            self.edge_named(
                method_id,
                EdgeKind::Overrides,
                candidates,
                Some(signature.to_string()),
                Some(KindFamily::Callable),
                line,
            );
        }
    }

    pub fn warn(&mut self, node: TsNode<'_>, message: &str) {
        self.warnings.push(format!(
            "{}:{}: {}",
            self.file_path,
            node.start_position().row + 1,
            message
        ));
    }

    pub fn finish(self) -> Extraction {
        Extraction {
            symbols: self.symbols,
            edges: self.edges,
            warnings: self.warnings,
        }
    }

    // ------------------------------------------------------------------
    // Text helpers
    // ------------------------------------------------------------------

    /// Gets the text of a tree-sitter node from the source.
    pub fn text(&self, node: TsNode<'_>) -> &'s str {
        node.utf8_text(self.source).unwrap_or("")
    }

    /// Source text between two byte offsets.
    pub fn slice(&self, start: usize, end: usize) -> &'s str {
        let end = end.min(self.source.len());
        if start >= end {
            return "";
        }
        std::str::from_utf8(&self.source[start..end]).unwrap_or("")
    }

    /// Comment lines directly above `anchor`, nearest last. Siblings whose
    /// kind is in `skip` (attributes, annotations) may sit between the
    /// comments and the item. A comment trailing code on its own line, or
    /// separated by a blank line, ends the block.
    pub fn comments_above(
        &self,
        anchor: TsNode<'_>,
        comment_kinds: &[&str],
        skip: &[&str],
    ) -> Option<String> {
        let mut lines = Vec::new();
        let mut next_row = anchor.start_position().row;
        let mut prev = anchor.prev_sibling();
        while let Some(sibling) = prev {
            if skip.contains(&sibling.kind()) {
                next_row = sibling.start_position().row;
                prev = sibling.prev_sibling();
                continue;
            }
            if !comment_kinds.contains(&sibling.kind()) || last_row(sibling) + 1 < next_row {
                break;
            }
            let trailing = sibling
                .prev_sibling()
                .filter(|p| !comment_kinds.contains(&p.kind()))
                .map(|p| last_row(p) == sibling.start_position().row)
                .unwrap_or(false);
            if trailing {
                break;
            }
            let cleaned = clean_comment(self.text(sibling));
            if !cleaned.is_empty() {
                lines.push(cleaned);
            }
            next_row = sibling.start_position().row;
            prev = sibling.prev_sibling();
        }
        if lines.is_empty() {
            return None;
        }
        lines.reverse();
        Some(lines.join("\n"))
    }

    /// Declaration text of `node` up to (not including) `body`, with
    /// whitespace collapsed and trailing punctuation dropped.
    pub fn header(&self, node: TsNode<'_>, body: Option<TsNode<'_>>) -> String {
        let end = body.map(|b| b.start_byte()).unwrap_or(node.end_byte());
        let raw = self.slice(node.start_byte(), end);
        collapse_whitespace(raw)
            .trim_end_matches(['{', ';', ':', ' '])
            .to_string()
    }
}

/// Returns the span of a node with 1-based lines.
pub(crate) fn span_of(node: TsNode<'_>) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span {
        start_line: start.row as u32 + 1,
        start_column: start.column as u32,
        end_line: end.row as u32 + 1,
        end_column: end.column as u32,
    }
}

/// Last row holding text of `node`; a line comment that swallows its
/// newline ends at column 0 of the next row.
fn last_row(node: TsNode<'_>) -> usize {
    let end = node.end_position();
    if end.column == 0 && end.row > node.start_position().row {
        end.row - 1
    } else {
        end.row
    }
}

/// Strips comment markers from a `//`, `///`, `//!` or `/* */` comment.
pub(crate) fn clean_comment(text: &str) -> String {
    let body = text
        .trim()
        .trim_start_matches("///")
        .trim_start_matches("//!")
        .trim_start_matches("//")
        .trim_start_matches("/**")
        .trim_start_matches("/*!")
        .trim_start_matches("/*")
        .trim_end_matches("*/");
    body.lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical spelling of a type: whitespace is kept only where it separates
/// two identifier characters.
///
/// `"const char *"`, `"const char*"` and `"const  char  *"` all become
/// `"const char*"`.
pub fn canonical_type(s: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            if let Some(prev) = out.chars().last() {
                if is_word(prev) && is_word(c) {
                    out.push(' ');
                }
            }
            pending_space = false;
        }
        out.push(c);
    }
    out
}

/// Removes template argument lists: `"std::vector<int>::iterator"` becomes
/// `"std::vector::iterator"`.
pub fn strip_template_args(s: &str) -> String {
    let mut depth = 0usize;
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Splits `text` on `separator`, ignoring separators nested inside template
/// argument lists. An operator name stays whole in the last segment.
pub fn split_scoped<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let head_end = operator_start(text).unwrap_or(text.len());
    let bytes = text.as_bytes();
    let sep = separator.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    let mut i = 0usize;
    while i < head_end {
        match bytes[i] {
            b'<' | b'(' => depth += 1,
            b'>' | b')' => depth -= 1,
            _ => {}
        }
        if depth <= 0 && bytes[i..head_end].starts_with(sep) {
            parts.push(&text[start..i]);
            i += sep.len();
            start = i;
            continue;
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}

/// Byte offset of an `operator` keyword that begins an operator name.
fn operator_start(text: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = text[from..].find("operator") {
        let idx = from + rel;
        let before = text[..idx].chars().last();
        let after = text[idx + "operator".len()..].chars().next();
        let word = |c: char| c.is_alphanumeric() || c == '_';
        if !before.is_some_and(word) && !after.is_some_and(word) {
            return Some(idx);
        }
        from = idx + "operator".len();
    }
    None
}
