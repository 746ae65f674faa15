/// Tree-sitter based symbol extraction.
///
/// Extractors walk a parsed syntax tree with a stack of enclosing scopes and
/// emit candidate symbols and candidate edges. They never see the graph;
/// identity merging happens later in the resolver.
mod c_family_extractor;
mod go_extractor;
mod java_extractor;
mod python_extractor;
mod rust_extractor;
mod state;

pub use c_family_extractor::CFamilyExtractor;
pub use go_extractor::GoExtractor;
pub use java_extractor::JavaExtractor;
pub use python_extractor::PythonExtractor;
pub use rust_extractor::RustExtractor;
pub use state::{canonical_type, split_scoped, strip_template_args};

use crate::grammar::{GrammarRegistry, SyntaxTree};
use crate::types::{Extraction, LanguageId};

/// Knobs that change what an extractor emits.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Emit best-effort `calls` edges.
    pub track_calls: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { track_calls: true }
    }
}

/// Trait for language-specific symbol extractors.
pub trait LanguageExtractor: Send + Sync {
    /// Languages this extractor handles.
    fn languages(&self) -> &[LanguageId];

    /// Extract candidate symbols and edges from a parsed file.
    ///
    /// `path` is the normalized file path used for the file root and for
    /// module names; `source` is the text `tree` was parsed from.
    fn extract(
        &self,
        grammars: &GrammarRegistry,
        tree: &SyntaxTree,
        path: &str,
        source: &str,
        options: ExtractOptions,
    ) -> Extraction;
}

/// Registry of all available extractors, dispatched by language.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn LanguageExtractor>>,
}

impl ExtractorRegistry {
    /// Creates a registry with the built-in extractors.
    pub fn new() -> Self {
        Self {
            extractors: vec![
                Box::new(CFamilyExtractor),
                Box::new(PythonExtractor),
                Box::new(JavaExtractor),
                Box::new(RustExtractor),
                Box::new(GoExtractor),
            ],
        }
    }

    /// Returns the extractor for `language`.
    pub fn extractor_for(&self, language: LanguageId) -> Option<&dyn LanguageExtractor> {
        self.extractors
            .iter()
            .find(|e| e.languages().contains(&language))
            .map(|e| e.as_ref())
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
