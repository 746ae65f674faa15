use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Source languages the engine can index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageId {
    C,
    Cpp,
    Python,
    Java,
    Rust,
    Go,
}

#[allow(clippy::should_implement_trait)]
impl LanguageId {
    /// Returns the string representation of this language.
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageId::C => "c",
            LanguageId::Cpp => "cpp",
            LanguageId::Python => "python",
            LanguageId::Java => "java",
            LanguageId::Rust => "rust",
            LanguageId::Go => "go",
        }
    }

    /// Parses a string into a `LanguageId`, returning `None` for unrecognized values.
    pub fn from_str(s: &str) -> Option<LanguageId> {
        match s {
            "c" => Some(LanguageId::C),
            "cpp" | "c++" => Some(LanguageId::Cpp),
            "python" => Some(LanguageId::Python),
            "java" => Some(LanguageId::Java),
            "rust" => Some(LanguageId::Rust),
            "go" => Some(LanguageId::Go),
            _ => None,
        }
    }
}

/// Kinds of symbols in the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    File,
    Namespace,
    Class,
    Struct,
    Union,
    Enum,
    Function,
    Method,
    Field,
    Variable,
    Macro,
    Typedef,
    Template,
    TemplateSpecialization,
}

/// Groups of symbol kinds that may legitimately share one identity.
///
/// Two occurrences of one symbol whose kinds fall in different families are
/// reported as an identity conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindFamily {
    File,
    Scope,
    Type,
    Callable,
    Data,
    Macro,
    Typedef,
    Template,
}

#[allow(clippy::should_implement_trait)]
impl SymbolKind {
    /// Returns the string representation of this symbol kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::File => "file",
            SymbolKind::Namespace => "namespace",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Union => "union",
            SymbolKind::Enum => "enum",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Field => "field",
            SymbolKind::Variable => "variable",
            SymbolKind::Macro => "macro",
            SymbolKind::Typedef => "typedef",
            SymbolKind::Template => "template",
            SymbolKind::TemplateSpecialization => "template_specialization",
        }
    }

    /// Parses a string into a `SymbolKind`, returning `None` for unrecognized values.
    pub fn from_str(s: &str) -> Option<SymbolKind> {
        match s {
            "file" => Some(SymbolKind::File),
            "namespace" => Some(SymbolKind::Namespace),
            "class" => Some(SymbolKind::Class),
            "struct" => Some(SymbolKind::Struct),
            "union" => Some(SymbolKind::Union),
            "enum" => Some(SymbolKind::Enum),
            "function" => Some(SymbolKind::Function),
            "method" => Some(SymbolKind::Method),
            "field" => Some(SymbolKind::Field),
            "variable" => Some(SymbolKind::Variable),
            "macro" => Some(SymbolKind::Macro),
            "typedef" => Some(SymbolKind::Typedef),
            "template" => Some(SymbolKind::Template),
            "template_specialization" => Some(SymbolKind::TemplateSpecialization),
            _ => None,
        }
    }

    /// Returns the family this kind belongs to.
    pub fn family(&self) -> KindFamily {
        match self {
            SymbolKind::File => KindFamily::File,
            SymbolKind::Namespace => KindFamily::Scope,
            SymbolKind::Class | SymbolKind::Struct | SymbolKind::Union | SymbolKind::Enum => {
                KindFamily::Type
            }
            SymbolKind::Function | SymbolKind::Method => KindFamily::Callable,
            SymbolKind::Field | SymbolKind::Variable => KindFamily::Data,
            SymbolKind::Macro => KindFamily::Macro,
            SymbolKind::Typedef => KindFamily::Typedef,
            SymbolKind::Template | SymbolKind::TemplateSpecialization => KindFamily::Template,
        }
    }

    /// Returns `true` for kinds whose members are methods and fields.
    ///
    /// Templates count because class templates own members; a function
    /// template never becomes a container of methods in practice.
    pub fn is_class_like(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Struct
                | SymbolKind::Union
                | SymbolKind::Template
                | SymbolKind::TemplateSpecialization
        )
    }
}

/// Kinds of edges in the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Contains,
    Overrides,
    Specializes,
    FriendOf,
    TypedefsTo,
    Calls,
}

#[allow(clippy::should_implement_trait)]
impl EdgeKind {
    /// Returns the string representation of this edge kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Contains => "contains",
            EdgeKind::Overrides => "overrides",
            EdgeKind::Specializes => "specializes",
            EdgeKind::FriendOf => "friend_of",
            EdgeKind::TypedefsTo => "typedefs_to",
            EdgeKind::Calls => "calls",
        }
    }

    /// Parses a string into an `EdgeKind`, returning `None` for unrecognized values.
    pub fn from_str(s: &str) -> Option<EdgeKind> {
        match s {
            "contains" => Some(EdgeKind::Contains),
            "overrides" => Some(EdgeKind::Overrides),
            "specializes" => Some(EdgeKind::Specializes),
            "friend_of" => Some(EdgeKind::FriendOf),
            "typedefs_to" => Some(EdgeKind::TypedefsTo),
            "calls" => Some(EdgeKind::Calls),
            _ => None,
        }
    }
}

/// A range in a source file. Lines are 1-based, columns 0-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// A span within a specific file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub span: Span,
}

/// Whether an occurrence declares a symbol or defines it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceRole {
    Declaration,
    Definition,
}

/// A symbol as emitted by an extractor for one site in one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSymbol {
    pub id: String,
    pub kind: SymbolKind,
    pub name: String,
    pub qualified_name: String,
    pub signature: String,
    /// Id of the enclosing container; `None` only for the file root.
    pub container: Option<String>,
    pub role: OccurrenceRole,
    pub span: Span,
    pub header: String,
    pub docstring: Option<String>,
}

/// A named reference to an edge target, resolved after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetRef {
    /// Qualified names to try, most specific scope first.
    pub candidates: Vec<String>,
    /// Required signature, when the target is an overloadable callable.
    pub signature: Option<String>,
    /// Preferred kind family when several symbols share a qualified name.
    pub expect: Option<KindFamily>,
}

/// An edge as stored in the graph.
///
/// `to` is `None` while a named target has not been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: String,
    pub to: Option<String>,
    pub kind: EdgeKind,
    pub target: Option<TargetRef>,
    /// Best-effort edges (calls) are never confirmed.
    pub confirmed: bool,
    pub file: String,
    pub line: u32,
}

/// One declaration or definition site of a symbol, owned by a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub symbol: String,
    pub kind: SymbolKind,
    pub name: String,
    pub qualified_name: String,
    pub signature: String,
    pub container: Option<String>,
    pub role: OccurrenceRole,
    pub span: Span,
    pub header: String,
    pub docstring: Option<String>,
    pub file: String,
    pub language: LanguageId,
    /// Commit sequence of the file contribution this occurrence belongs to.
    pub seq: u64,
}

impl Occurrence {
    /// Returns the location of this occurrence.
    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            file: self.file.clone(),
            span: self.span,
        }
    }
}

/// The resolved view of a symbol, derived from all of its occurrences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolNode {
    pub id: String,
    pub kind: SymbolKind,
    pub name: String,
    pub qualified_name: String,
    pub signature: String,
    pub header: String,
    pub docstring: Option<String>,
    pub language: LanguageId,
    pub container: Option<String>,
    pub declaring_file: Option<String>,
    pub definition_file: Option<String>,
    /// Primary definition location.
    pub definition: Option<SourceLocation>,
    pub declarations: Vec<SourceLocation>,
    pub alternate_definitions: Vec<SourceLocation>,
    pub is_definition: bool,
    pub is_declaration_only: bool,
    /// Files that contribute at least one occurrence, sorted.
    pub contributors: Vec<String>,
}

impl SymbolNode {
    /// Returns the primary location: the definition if any, otherwise the
    /// first declaration.
    pub fn primary_location(&self) -> Option<&SourceLocation> {
        self.definition.as_ref().or_else(|| self.declarations.first())
    }
}

/// A declaration or definition site returned by location queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolLocation {
    pub symbol: String,
    pub role: OccurrenceRole,
    pub location: SourceLocation,
}

/// Record tracking an indexed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub language: LanguageId,
    pub content_hash: String,
    pub indexed_at: i64,
    pub seq: u64,
    /// Ids of the symbols the file root directly contains, in source order.
    pub top_level: Vec<String>,
    pub symbol_count: u32,
}

/// A source file handed to the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    /// Explicit language; resolved from the path when `None`.
    pub language: Option<LanguageId>,
    pub content: String,
    pub content_hash: String,
}

impl SourceFile {
    /// Creates a source file, hashing its content.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let content_hash = crate::sync::content_hash(&content);
        Self {
            path: normalize_path(&path.into()),
            language: None,
            content,
            content_hash,
        }
    }

    /// Sets an explicit language, bypassing extension lookup.
    pub fn with_language(mut self, language: LanguageId) -> Self {
        self.language = Some(language);
        self
    }
}

/// Output of the symbol extractor for one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub symbols: Vec<CandidateSymbol>,
    pub edges: Vec<EdgeRecord>,
    pub warnings: Vec<String>,
}

/// Outcome category of processing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStatus {
    Ok,
    Skipped,
    ParseError,
    Conflict,
    Cancelled,
}

impl DiagnosticStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticStatus::Ok => "ok",
            DiagnosticStatus::Skipped => "skipped",
            DiagnosticStatus::ParseError => "parse_error",
            DiagnosticStatus::Conflict => "conflict",
            DiagnosticStatus::Cancelled => "cancelled",
        }
    }
}

/// Per-file diagnostic produced by an indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiagnostic {
    pub path: String,
    pub status: DiagnosticStatus,
    pub messages: Vec<String>,
}

/// Two or more occurrences of one identity whose kinds disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConflict {
    pub symbol: String,
    pub qualified_name: String,
    pub kinds: Vec<SymbolKind>,
    pub chosen: SymbolKind,
}

/// Statistics about the knowledge graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub file_count: u64,
    pub symbol_count: u64,
    pub edge_count: u64,
    pub unresolved_edge_count: u64,
    pub symbols_by_kind: BTreeMap<String, u64>,
    pub edges_by_kind: BTreeMap<String, u64>,
}

/// A deterministic, fully sorted dump of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub files: Vec<FileRecord>,
    pub symbols: Vec<SymbolNode>,
    pub edges: Vec<EdgeRecord>,
}

/// Hashes the given parts into a 32-character hex digest.
fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    let hex_str = hex::encode(hasher.finalize());
    hex_str[..32].to_string()
}

/// Generates the deterministic id of a symbol from its qualified name and
/// signature.
///
/// The format is `"sym:32hexchars"`. Kind is not an input: occurrences that
/// disagree on kind share one identity.
pub fn symbol_id(qualified_name: &str, signature: &str) -> String {
    format!("sym:{}", digest(&[qualified_name, signature]))
}

/// Generates the id of a file's pseudo-root symbol.
pub fn file_id(path: &str) -> String {
    format!("file:{}", digest(&[path]))
}

/// Normalizes a path to forward slashes without a leading `./`.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut trimmed = unified.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}
