use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use tree_sitter::{Node as TsNode, ParseOptions, ParseState, Parser, Point, Tree};

use super::GrammarRegistry;
use crate::errors::{CkgError, Result};
use crate::types::LanguageId;

/// A parsed file. May be partial: syntax errors are kept as `ERROR` and
/// `MISSING` nodes rather than failing the parse.
#[derive(Debug)]
pub struct SyntaxTree {
    tree: Tree,
    language: LanguageId,
}

impl SyntaxTree {
    pub fn language(&self) -> LanguageId {
        self.language
    }

    pub fn root(&self) -> TsNode<'_> {
        self.tree.root_node()
    }

    /// Returns `true` if the parser had to recover from syntax errors.
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Returns the 1-based lines of up to `limit` error or missing nodes.
    pub fn error_lines(&self, limit: usize) -> Vec<u32> {
        let mut lines = Vec::new();
        collect_error_lines(self.tree.root_node(), limit, &mut lines);
        lines
    }
}

fn collect_error_lines(node: TsNode<'_>, limit: usize, out: &mut Vec<u32>) {
    if out.len() >= limit || !node.has_error() {
        return;
    }
    if node.is_error() || node.is_missing() {
        out.push(node.start_position().row as u32 + 1);
        return;
    }
    let mut cursor = node.walk();
    if cursor.goto_first_child() {
        loop {
            collect_error_lines(cursor.node(), limit, out);
            if out.len() >= limit || !cursor.goto_next_sibling() {
                break;
            }
        }
    }
}

/// Runs tree-sitter for a language from the registry.
///
/// A fresh `Parser` is created per call, so one adapter can be shared across
/// worker threads.
#[derive(Clone)]
pub struct ParserAdapter {
    grammars: Arc<GrammarRegistry>,
}

impl ParserAdapter {
    pub fn new(grammars: Arc<GrammarRegistry>) -> Self {
        Self { grammars }
    }

    /// Parses `content` as `language`.
    ///
    /// Fails only when no tree at all can be produced; a tree with errors is
    /// returned as-is for partial extraction.
    pub fn parse(&self, path: &str, language: LanguageId, content: &str) -> Result<SyntaxTree> {
        self.parse_until(path, language, content, None)
    }

    /// Like [`parse`](Self::parse), but tree-sitter abandons the parse once
    /// `deadline` passes and the call fails with [`CkgError::Timeout`].
    pub fn parse_with_deadline(
        &self,
        path: &str,
        language: LanguageId,
        content: &str,
        deadline: Instant,
    ) -> Result<SyntaxTree> {
        self.parse_until(path, language, content, Some(deadline))
    }

    fn parse_until(
        &self,
        path: &str,
        language: LanguageId,
        content: &str,
        deadline: Option<Instant>,
    ) -> Result<SyntaxTree> {
        let grammar = self
            .grammars
            .grammar(language)
            .ok_or_else(|| CkgError::UnsupportedLanguage {
                path: path.to_string(),
                language: language.as_str().to_string(),
            })?;

        let mut parser = Parser::new();
        parser
            .set_language(&grammar.language)
            .map_err(|e| CkgError::Parse {
                message: format!("failed to load {} grammar: {e}", grammar.name),
                path: path.to_string(),
            })?;

        let started = Instant::now();
        let tree = match deadline {
            Some(deadline) => {
                let bytes = content.as_bytes();
                let mut input =
                    |offset: usize, _: Point| bytes.get(offset..).unwrap_or_default();
                let mut progress = |_: &ParseState| {
                    if Instant::now() >= deadline {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                };
                let options = ParseOptions::new().progress_callback(&mut progress);
                parser.parse_with_options(&mut input, None, Some(options))
            }
            None => parser.parse(content, None),
        };

        match tree {
            Some(tree) => Ok(SyntaxTree { tree, language }),
            None if deadline.is_some_and(|d| Instant::now() >= d) => Err(CkgError::Timeout {
                path: path.to_string(),
                after_ms: started.elapsed().as_millis() as u64,
            }),
            None => Err(CkgError::Parse {
                message: "tree-sitter parse returned None".to_string(),
                path: path.to_string(),
            }),
        }
    }
}
