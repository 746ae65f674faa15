use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{
    get_ckg_dir, get_database_path, load_config, save_config, should_include_file, EngineConfig,
};
use crate::db::Database;
use crate::errors::{CkgError, Result};
use crate::extraction::ExtractorRegistry;
use crate::grammar::GrammarRegistry;
use crate::graph::{GraphStore, QueryEngine};
use crate::indexer::{BatchReport, CancelToken, IncrementalIndexer, IndexerOptions};
use crate::sync::{self, FileState};
use crate::types::*;

/// The engine: configuration, graph store, indexer and optional database
/// behind one API.
pub struct KnowledgeGraph {
    config: EngineConfig,
    project_root: Option<PathBuf>,
    grammars: Arc<GrammarRegistry>,
    store: Arc<GraphStore>,
    indexer: IncrementalIndexer,
    database: Option<Arc<Mutex<Database>>>,
    cancel: CancelToken,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

impl KnowledgeGraph {
    /// Creates an engine that keeps the graph in memory only.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::assemble(config, None, None)
    }

    /// Initializes a project at `project_root`.
    ///
    /// Creates the `.ckg` directory, writes the configuration (keeping an
    /// existing one) and creates a fresh database.
    pub fn init(project_root: &Path) -> Result<Self> {
        let mut config = load_config(project_root)?;
        config.root_dir = project_root.to_string_lossy().to_string();
        save_config(project_root, &config)?;

        let db_path = get_database_path(project_root, &config);
        let database = Database::initialize(&db_path)?;
        database.clear()?;
        database.set_metadata("config_version", &config.version.to_string())?;
        info!(root = %project_root.display(), "initialized knowledge graph");

        Ok(Self::assemble(
            config,
            Some(project_root.to_path_buf()),
            Some(Arc::new(Mutex::new(database))),
        ))
    }

    /// Opens an initialized project and replays its stored contributions.
    pub fn open(project_root: &Path) -> Result<Self> {
        let config = load_config(project_root)?;
        let db_path = get_database_path(project_root, &config);
        if !db_path.exists() {
            return Err(CkgError::Config {
                message: format!(
                    "no knowledge graph database found at '{}'; run 'ckg init' first",
                    db_path.display()
                ),
            });
        }

        let database = Database::open(&db_path)?;
        let contributions = database.load_contributions()?;
        let paths: Vec<String> = contributions
            .iter()
            .map(|c| c.record.path.clone())
            .collect();

        let graph = Self::assemble(
            config,
            Some(project_root.to_path_buf()),
            Some(Arc::new(Mutex::new(database))),
        );
        let sweep = graph.store.restore(contributions);
        graph.indexer.adopt_indexed(&paths);
        debug!(
            files = paths.len(),
            unresolved = sweep.remaining,
            "replayed stored contributions"
        );
        Ok(graph)
    }

    /// Returns `true` if a project has been initialized at the given root.
    pub fn is_initialized(project_root: &Path) -> bool {
        load_config(project_root)
            .map(|config| get_database_path(project_root, &config).exists())
            .unwrap_or(false)
    }

    fn assemble(
        config: EngineConfig,
        project_root: Option<PathBuf>,
        database: Option<Arc<Mutex<Database>>>,
    ) -> Self {
        let grammars = Arc::new(GrammarRegistry::new());
        let store = Arc::new(GraphStore::new());
        let mut indexer = IncrementalIndexer::new(
            Arc::clone(&grammars),
            Arc::new(ExtractorRegistry::new()),
            Arc::clone(&store),
            IndexerOptions::from_config(&config),
        );
        if let Some(database) = &database {
            indexer = indexer.with_database(Arc::clone(database));
        }
        Self {
            config,
            project_root,
            grammars,
            store,
            indexer,
            database,
            cancel: CancelToken::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Indexing
// ---------------------------------------------------------------------------

impl KnowledgeGraph {
    /// Indexes in-memory sources as one batch.
    pub async fn index_sources(&self, files: Vec<SourceFile>) -> Result<BatchReport> {
        self.cancel.reset();
        self.indexer.index_batch(files, &self.cancel).await
    }

    /// Indexes a single source file.
    pub async fn index_file(&self, file: SourceFile) -> Result<FileDiagnostic> {
        self.indexer.index_file(file).await
    }

    /// Removes a file's contribution. Returns `false` if it was not indexed.
    pub fn remove_file(&self, path: &str) -> Result<bool> {
        self.indexer.remove_file(path)
    }

    /// Marks a file as changed on disk so the next run re-reads it.
    pub fn mark_stale(&self, path: &str) -> bool {
        self.indexer.mark_stale(path)
    }

    pub fn file_state(&self, path: &str) -> FileState {
        self.indexer.file_state(path)
    }

    /// Brings the graph in step with the project directory.
    pub async fn index_project(&self) -> Result<BatchReport> {
        let root = self.project_root.clone().ok_or_else(|| CkgError::Config {
            message: "in-memory knowledge graph has no project root".to_string(),
        })?;
        self.index_directory(&root).await
    }

    /// Brings the graph in step with the files under `root`.
    ///
    /// Discovered files are indexed as one batch (unchanged files are
    /// skipped); files the graph knows that no longer exist are removed.
    /// Paths are stored relative to `root`.
    pub async fn index_directory(&self, root: &Path) -> Result<BatchReport> {
        let paths = self.scan_files(root);
        let mut sources = Vec::with_capacity(paths.len());
        let mut unreadable = Vec::new();
        for path in &paths {
            match std::fs::read_to_string(root.join(path)) {
                Ok(content) => sources.push(SourceFile::new(path.as_str(), content)),
                Err(e) => unreadable.push(FileDiagnostic {
                    path: path.clone(),
                    status: DiagnosticStatus::Skipped,
                    messages: vec![format!("failed to read file: {e}")],
                }),
            }
        }

        let records: Vec<FileRecord> = self.store.read().files().into_iter().cloned().collect();
        let removed = sync::find_removed_files(&records, &paths);
        for path in &removed {
            self.remove_file(path)?;
        }

        let mut report = self.index_sources(sources).await?;
        report.skipped += unreadable.len();
        report.diagnostics.extend(unreadable);
        report.diagnostics.sort_by(|a, b| a.path.cmp(&b.path));
        report.removed = removed;
        info!(
            root = %root.display(),
            files = paths.len(),
            removed = report.removed.len(),
            "indexed directory"
        );
        Ok(report)
    }

    /// Source files under `root` matching the configured patterns and size
    /// limit, relative to `root` and sorted.
    fn scan_files(&self, root: &Path) -> Vec<String> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        {
            let Ok(entry) = entry else {
                continue;
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let rel_str = normalize_path(&relative.to_string_lossy());
            if !should_include_file(&rel_str, &self.config) {
                continue;
            }
            let small_enough = entry
                .metadata()
                .map(|m| m.len() <= self.config.max_file_size)
                .unwrap_or(false);
            if small_enough {
                files.push(rel_str);
            }
        }
        files.sort();
        files
    }

    /// Token that cancels the batch currently running through this engine.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

// ---------------------------------------------------------------------------
// Query delegation
// ---------------------------------------------------------------------------

impl KnowledgeGraph {
    pub fn queries(&self) -> QueryEngine<'_> {
        QueryEngine::new(&self.store)
    }

    pub fn find_definition(&self, qualified_name: &str) -> Option<SymbolNode> {
        self.queries().find_definition(qualified_name)
    }

    pub fn find_definition_with_signature(
        &self,
        qualified_name: &str,
        signature: &str,
    ) -> Option<SymbolNode> {
        self.queries()
            .find_definition_with_signature(qualified_name, signature)
    }

    pub fn find_declarations_and_definitions(&self, qualified_name: &str) -> Vec<SymbolLocation> {
        self.queries()
            .find_declarations_and_definitions(qualified_name)
    }

    pub fn find_children(&self, id: &str) -> Vec<SymbolNode> {
        self.queries().find_children(id)
    }

    pub fn find_overrides_of(&self, id: &str) -> Vec<SymbolNode> {
        self.queries().find_overrides_of(id)
    }

    pub fn find_overridden_by(&self, id: &str) -> Vec<SymbolNode> {
        self.queries().find_overridden_by(id)
    }

    pub fn search_by_name_substring(&self, text: &str) -> Vec<SymbolNode> {
        self.queries().search_by_name_substring(text)
    }

    pub fn search_by_kind(&self, kind: SymbolKind, name: &str) -> Vec<SymbolNode> {
        self.queries().search_by_kind(kind, name)
    }

    pub fn find_class_methods(&self, class_name: &str, method_name: Option<&str>) -> Vec<SymbolNode> {
        self.queries().find_class_methods(class_name, method_name)
    }

    pub fn get_symbol(&self, id: &str) -> Option<SymbolNode> {
        self.queries().get_symbol(id)
    }

    /// Returns aggregate statistics about the graph.
    pub fn stats(&self) -> GraphStats {
        self.store.stats()
    }

    /// Size of the backing database in bytes; `None` for in-memory graphs.
    pub fn database_size(&self) -> Result<Option<u64>> {
        match &self.database {
            Some(database) => {
                let database = database.lock().unwrap_or_else(PoisonError::into_inner);
                Ok(Some(database.size()?))
            }
            None => Ok(None),
        }
    }

    /// Returns a deterministic dump of the whole graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.store.snapshot()
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn grammars(&self) -> &GrammarRegistry {
        &self.grammars
    }

    /// Returns a reference to the current configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the project root, `None` for in-memory engines.
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Returns the `.ckg` directory of the project, if any.
    pub fn ckg_dir(&self) -> Option<PathBuf> {
        self.project_root.as_deref().map(get_ckg_dir)
    }
}
