/// Language registry: maps file extensions and shebangs to languages and
/// classifies grammar node kinds into symbol hints.
mod adapter;

pub use adapter::{ParserAdapter, SyntaxTree};

use std::collections::HashMap;

use tree_sitter::Language;

use crate::errors::{CkgError, Result};
use crate::types::{LanguageId, SymbolKind};

/// What a syntax node means to the extractor, independent of grammar naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKindHint {
    Namespace,
    /// A class, struct or union specifier; carries the concrete kind.
    Record(SymbolKind),
    Enum,
    Enumerator,
    FunctionDefinition,
    /// A declaration that may introduce prototypes or variables.
    Declaration,
    /// A member declaration inside a record body.
    FieldDeclaration,
    Template,
    Typedef,
    Alias,
    /// A Rust `impl` block: members attach to the implemented type.
    Implementation,
    Macro,
    Friend,
    Decorated,
    Assignment,
    CallSite,
}

/// Static description of one supported grammar.
pub struct Grammar {
    pub id: LanguageId,
    pub name: &'static str,
    pub language: Language,
    pub extensions: &'static [&'static str],
    pub scope_separator: &'static str,
    pub overloading: bool,
}

/// Registry of every grammar compiled into the engine.
///
/// Built once and shared read-only between parser workers.
pub struct GrammarRegistry {
    grammars: Vec<Grammar>,
    by_extension: HashMap<&'static str, LanguageId>,
}

impl GrammarRegistry {
    /// Creates a registry with all built-in grammars.
    pub fn new() -> Self {
        let grammars = vec![
            Grammar {
                id: LanguageId::C,
                name: "C",
                language: tree_sitter_c::LANGUAGE.into(),
                extensions: &["c", "h"],
                scope_separator: "::",
                overloading: false,
            },
            Grammar {
                id: LanguageId::Cpp,
                name: "C++",
                language: tree_sitter_cpp::LANGUAGE.into(),
                extensions: &["cc", "cpp", "cxx", "c++", "hh", "hpp", "hxx", "C"],
                scope_separator: "::",
                overloading: true,
            },
            Grammar {
                id: LanguageId::Python,
                name: "Python",
                language: tree_sitter_python::LANGUAGE.into(),
                extensions: &["py", "pyw"],
                scope_separator: ".",
                overloading: false,
            },
            Grammar {
                id: LanguageId::Java,
                name: "Java",
                language: tree_sitter_java::LANGUAGE.into(),
                extensions: &["java"],
                scope_separator: ".",
                overloading: true,
            },
            Grammar {
                id: LanguageId::Rust,
                name: "Rust",
                language: tree_sitter_rust::LANGUAGE.into(),
                extensions: &["rs"],
                scope_separator: "::",
                overloading: false,
            },
            Grammar {
                id: LanguageId::Go,
                name: "Go",
                language: tree_sitter_go::LANGUAGE.into(),
                extensions: &["go"],
                scope_separator: ".",
                overloading: false,
            },
        ];

        let mut by_extension = HashMap::new();
        for grammar in &grammars {
            for ext in grammar.extensions {
                by_extension.insert(*ext, grammar.id);
            }
        }

        Self {
            grammars,
            by_extension,
        }
    }

    /// Returns the grammar for `language`.
    pub fn grammar(&self, language: LanguageId) -> Option<&Grammar> {
        self.grammars.iter().find(|g| g.id == language)
    }

    /// Resolves a language from an extension (`"cpp"`, `".cpp"`), a path
    /// (`"src/main.cpp"`) or a shebang line (`"#!/usr/bin/env python3"`).
    pub fn resolve_language(&self, extension_or_shebang: &str) -> Result<LanguageId> {
        let input = extension_or_shebang.trim();
        if let Some(shebang) = input.strip_prefix("#!") {
            return Self::resolve_shebang(shebang).ok_or_else(|| CkgError::UnsupportedLanguage {
                path: input.to_string(),
                language: shebang.trim().to_string(),
            });
        }

        let file_name = input.rsplit('/').next().unwrap_or(input);
        let ext = match file_name.rfind('.') {
            Some(idx) => &file_name[idx + 1..],
            None => file_name,
        };

        self.by_extension
            .get(ext)
            .or_else(|| self.by_extension.get(ext.to_ascii_lowercase().as_str()))
            .copied()
            .ok_or_else(|| CkgError::UnsupportedLanguage {
                path: input.to_string(),
                language: ext.to_string(),
            })
    }

    /// Resolves the language of a file from its path, falling back to the
    /// shebang on its first line for extensionless scripts.
    ///
    /// A `.h` header is C unless its content uses C++-only syntax, in which
    /// case it is parsed with the C++ grammar.
    pub fn resolve_for_file(&self, path: &str, content: &str) -> Result<LanguageId> {
        match self.resolve_language(path) {
            Ok(LanguageId::C) if path.ends_with(".h") && looks_like_cpp(content) => {
                Ok(LanguageId::Cpp)
            }
            Ok(language) => Ok(language),
            Err(err) => match content.lines().next() {
                Some(first) if first.starts_with("#!") => self
                    .resolve_language(first)
                    .map_err(|_| CkgError::UnsupportedLanguage {
                        path: path.to_string(),
                        language: first.to_string(),
                    }),
                _ => Err(err),
            },
        }
    }

    fn resolve_shebang(line: &str) -> Option<LanguageId> {
        let mut words = line.split_whitespace();
        let mut program = words.next()?.rsplit('/').next()?;
        if program == "env" {
            program = words.find(|w| !w.starts_with('-'))?;
        }
        if program.starts_with("python") {
            Some(LanguageId::Python)
        } else {
            None
        }
    }

    /// Classifies a grammar node kind for `language`.
    pub fn classify(&self, language: LanguageId, syntax_node_kind: &str) -> Option<SymbolKindHint> {
        classify(language, syntax_node_kind)
    }

    /// Whether `language` allows several callables with one qualified name.
    pub fn supports_overloading(&self, language: LanguageId) -> bool {
        self.grammar(language).map(|g| g.overloading).unwrap_or(false)
    }

    /// Separator used between qualified name segments.
    pub fn scope_separator(&self, language: LanguageId) -> &'static str {
        self.grammar(language)
            .map(|g| g.scope_separator)
            .unwrap_or("::")
    }

    /// Returns all supported file extensions.
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        self.grammars
            .iter()
            .flat_map(|g| g.extensions.iter().copied())
            .collect()
    }
}

impl Default for GrammarRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether header text uses syntax the C grammar cannot parse.
///
/// Only the start of each line is inspected, after stripping indentation, so
/// the words inside comments and strings rarely count.
pub fn looks_like_cpp(content: &str) -> bool {
    const MARKERS: &[&str] = &[
        "namespace ",
        "class ",
        "template<",
        "template <",
        "public:",
        "private:",
        "protected:",
        "using ",
        "virtual ",
        "extern \"C++\"",
    ];
    content.lines().map(str::trim_start).any(|line| {
        !line.starts_with("//")
            && !line.starts_with('*')
            && MARKERS.iter().any(|marker| line.starts_with(marker))
    })
}

/// Node-kind classification table.
pub fn classify(language: LanguageId, kind: &str) -> Option<SymbolKindHint> {
    use SymbolKindHint as H;
    match language {
        LanguageId::C | LanguageId::Cpp => {
            let shared = match kind {
                "function_definition" => Some(H::FunctionDefinition),
                "declaration" => Some(H::Declaration),
                "field_declaration" => Some(H::FieldDeclaration),
                "struct_specifier" => Some(H::Record(SymbolKind::Struct)),
                "union_specifier" => Some(H::Record(SymbolKind::Union)),
                "enum_specifier" => Some(H::Enum),
                "enumerator" => Some(H::Enumerator),
                "type_definition" => Some(H::Typedef),
                "preproc_def" | "preproc_function_def" => Some(H::Macro),
                "call_expression" => Some(H::CallSite),
                _ => None,
            };
            if shared.is_some() || language == LanguageId::C {
                return shared;
            }
            match kind {
                "class_specifier" => Some(H::Record(SymbolKind::Class)),
                "namespace_definition" => Some(H::Namespace),
                "template_declaration" => Some(H::Template),
                "alias_declaration" => Some(H::Alias),
                "friend_declaration" => Some(H::Friend),
                _ => None,
            }
        }
        LanguageId::Python => match kind {
            "class_definition" => Some(H::Record(SymbolKind::Class)),
            "function_definition" => Some(H::FunctionDefinition),
            "decorated_definition" => Some(H::Decorated),
            "assignment" => Some(H::Assignment),
            "call" => Some(H::CallSite),
            _ => None,
        },
        // interfaces and traits are class-like types
        LanguageId::Java => match kind {
            "package_declaration" => Some(H::Namespace),
            "class_declaration"
            | "interface_declaration"
            | "record_declaration"
            | "annotation_type_declaration" => Some(H::Record(SymbolKind::Class)),
            "enum_declaration" => Some(H::Enum),
            "enum_constant" => Some(H::Enumerator),
            "method_declaration" | "constructor_declaration" => Some(H::FunctionDefinition),
            "field_declaration" | "constant_declaration" => Some(H::FieldDeclaration),
            "method_invocation" => Some(H::CallSite),
            _ => None,
        },
        LanguageId::Rust => match kind {
            "mod_item" => Some(H::Namespace),
            "struct_item" => Some(H::Record(SymbolKind::Struct)),
            "union_item" => Some(H::Record(SymbolKind::Union)),
            "trait_item" => Some(H::Record(SymbolKind::Class)),
            "enum_item" => Some(H::Enum),
            "enum_variant" => Some(H::Enumerator),
            "impl_item" => Some(H::Implementation),
            "function_item" | "function_signature_item" => Some(H::FunctionDefinition),
            "const_item" | "static_item" => Some(H::Declaration),
            "field_declaration" => Some(H::FieldDeclaration),
            "type_item" | "associated_type" => Some(H::Alias),
            "macro_definition" => Some(H::Macro),
            "call_expression" => Some(H::CallSite),
            _ => None,
        },
        LanguageId::Go => match kind {
            "package_clause" => Some(H::Namespace),
            "function_declaration" | "method_declaration" | "method_elem" => {
                Some(H::FunctionDefinition)
            }
            "type_spec" => Some(H::Typedef),
            "type_alias" => Some(H::Alias),
            "const_declaration" | "var_declaration" => Some(H::Declaration),
            "field_declaration" => Some(H::FieldDeclaration),
            "call_expression" => Some(H::CallSite),
            _ => None,
        },
    }
}
