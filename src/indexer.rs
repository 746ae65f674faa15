use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::db::Database;
use crate::errors::{CkgError, Result};
use crate::extraction::{ExtractOptions, ExtractorRegistry};
use crate::grammar::{GrammarRegistry, ParserAdapter};
use crate::graph::GraphStore;
use crate::sync::{FileState, FileStateTable};
use crate::types::*;

/// Returns the current UNIX timestamp in seconds.
fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Cooperative cancellation flag shared between a caller and a batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Files already committed stay committed.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears a previous request so the token can be reused.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Tuning for the indexer, usually derived from [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub parse_timeout: Duration,
    pub max_parallel: usize,
    pub sweep_buckets: usize,
    pub extract: ExtractOptions,
}

impl IndexerOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            parse_timeout: Duration::from_millis(config.parse_timeout_ms),
            max_parallel: config.parallelism(),
            sweep_buckets: config.buckets(),
            extract: ExtractOptions {
                track_calls: config.track_calls,
            },
        }
    }
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Result of one indexing batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// One entry per distinct input path, ordered by path.
    pub diagnostics: Vec<FileDiagnostic>,
    pub committed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub conflicts: Vec<IdentityConflict>,
    /// Edges resolved by the sweep that closed the batch.
    pub resolved_edges: usize,
    /// Files dropped because they no longer exist on disk.
    pub removed: Vec<String>,
    pub duration_ms: u64,
}

impl BatchReport {
    /// The diagnostic for `path`, if the batch saw it.
    pub fn diagnostic(&self, path: &str) -> Option<&FileDiagnostic> {
        self.diagnostics.iter().find(|d| d.path == path)
    }
}

/// Parse and extraction output waiting for its commit.
struct Prepared {
    path: String,
    language: LanguageId,
    content_hash: String,
    extraction: Extraction,
    /// The tree had to recover from syntax errors.
    partial: bool,
    error_lines: Vec<u32>,
}

enum Phase1 {
    Prepared(Prepared),
    Failed { path: String, message: String },
    Cancelled { path: String },
}

/// Keeps the graph in step with a set of source files.
///
/// A batch runs in two phases. Parsing and extraction run in parallel on
/// blocking workers, bounded by a semaphore; each parse is abandoned once
/// its per-file deadline passes. After
/// every worker has finished, files are committed one by one in path order,
/// each as a single atomic replace in the store. A final sweep retries the
/// edges whose targets were not known when their file was committed.
pub struct IncrementalIndexer {
    grammars: Arc<GrammarRegistry>,
    parser: ParserAdapter,
    extractors: Arc<ExtractorRegistry>,
    store: Arc<GraphStore>,
    states: Mutex<FileStateTable>,
    options: IndexerOptions,
    database: Option<Arc<Mutex<Database>>>,
}

impl IncrementalIndexer {
    pub fn new(
        grammars: Arc<GrammarRegistry>,
        extractors: Arc<ExtractorRegistry>,
        store: Arc<GraphStore>,
        options: IndexerOptions,
    ) -> Self {
        Self {
            parser: ParserAdapter::new(Arc::clone(&grammars)),
            grammars,
            extractors,
            store,
            states: Mutex::new(FileStateTable::new()),
            options,
            database: None,
        }
    }

    /// Persists every commit to `database` from now on.
    pub fn with_database(mut self, database: Arc<Mutex<Database>>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn options(&self) -> &IndexerOptions {
        &self.options
    }

    fn states(&self) -> MutexGuard<'_, FileStateTable> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state of `path`.
    pub fn file_state(&self, path: &str) -> FileState {
        self.states().get(&normalize_path(path))
    }

    /// Marks files already in the graph as indexed, e.g. after replaying a
    /// database, so unchanged content is recognized.
    pub fn adopt_indexed(&self, paths: &[String]) {
        let mut states = self.states();
        for path in paths {
            states.transition(path, FileState::Indexing);
            states.transition(path, FileState::Indexed);
        }
    }

    /// Marks an indexed file as stale. Returns `false` if it was not indexed.
    pub fn mark_stale(&self, path: &str) -> bool {
        self.states().mark_stale(&normalize_path(path))
    }

    /// Indexes one file without waiting on any other work.
    pub async fn index_file(&self, file: SourceFile) -> Result<FileDiagnostic> {
        let path = normalize_path(&file.path);
        let report = self.index_batch(vec![file], &CancelToken::new()).await?;
        report
            .diagnostics
            .into_iter()
            .find(|d| d.path == path)
            .ok_or_else(|| CkgError::Cancelled {
                operation: format!("index {path}"),
            })
    }

    /// Removes a file's contribution from the graph and the database.
    pub fn remove_file(&self, path: &str) -> Result<bool> {
        let path = normalize_path(path);
        let removed = self.store.remove_file(&path);
        if let Some(database) = &self.database {
            lock_database(database).delete_file(&path)?;
        }
        self.states().forget(&path);
        if removed {
            debug!(path = %path, "removed file");
        }
        Ok(removed)
    }

    /// Indexes a batch of files.
    ///
    /// Unchanged files are reported as skipped. Per-file failures (unknown
    /// language, parse failure, timeout) become diagnostics and leave the
    /// file's previous contribution in place. Only database errors fail the
    /// whole call. When `cancel` fires, files not yet committed are reported
    /// as cancelled and the report has `cancelled` set.
    pub async fn index_batch(&self, files: Vec<SourceFile>, cancel: &CancelToken) -> Result<BatchReport> {
        let start = Instant::now();
        let mut report = BatchReport::default();
        let mut diagnostics: BTreeMap<String, FileDiagnostic> = BTreeMap::new();

        // later duplicates of a path win
        let mut inputs: BTreeMap<String, SourceFile> = BTreeMap::new();
        for mut file in files {
            file.path = normalize_path(&file.path);
            inputs.insert(file.path.clone(), file);
        }

        let semaphore = Arc::new(Semaphore::new(self.options.max_parallel.max(1)));
        let mut workers: JoinSet<Phase1> = JoinSet::new();

        for (path, file) in inputs {
            let language = match file.language {
                Some(language) => language,
                None => match self.grammars.resolve_for_file(&path, &file.content) {
                    Ok(language) => language,
                    Err(e) => {
                        {
                            let mut states = self.states();
                            states.transition(&path, FileState::Indexing);
                            states.transition(&path, FileState::Failed);
                        }
                        debug!(path = %path, "skipping file in unsupported language");
                        report.skipped += 1;
                        diagnostics.insert(
                            path.clone(),
                            diagnostic(&path, DiagnosticStatus::Skipped, vec![e.to_string()]),
                        );
                        continue;
                    }
                },
            };

            if self.is_unchanged(&path, &file.content_hash) {
                report.skipped += 1;
                diagnostics.insert(
                    path.clone(),
                    diagnostic(&path, DiagnosticStatus::Skipped, vec!["unchanged".to_string()]),
                );
                continue;
            }

            {
                let mut states = self.states();
                if states.get(&path) == FileState::Indexed {
                    states.transition(&path, FileState::Stale);
                }
                states.transition(&path, FileState::Indexing);
            }

            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let parser = self.parser.clone();
            let grammars = Arc::clone(&self.grammars);
            let extractors = Arc::clone(&self.extractors);
            let timeout = self.options.parse_timeout;
            let extract_options = self.options.extract;

            workers.spawn(async move {
                let Ok(permit) = semaphore.acquire_owned().await else {
                    return Phase1::Cancelled { path };
                };
                if cancel.is_cancelled() {
                    return Phase1::Cancelled { path };
                }

                // released when the blocking job ends, not when this task does
                let job_path = path.clone();
                let job = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    let deadline = Instant::now() + timeout;
                    prepare(
                        &parser,
                        &grammars,
                        &extractors,
                        job_path,
                        language,
                        file,
                        deadline,
                        extract_options,
                    )
                });
                match job.await {
                    Ok(Ok(prepared)) => Phase1::Prepared(prepared),
                    Ok(Err(e)) => Phase1::Failed {
                        path,
                        message: e.to_string(),
                    },
                    Err(join_error) => Phase1::Failed {
                        path,
                        message: format!("parser worker failed: {join_error}"),
                    },
                }
            });
        }

        // Phase 1 barrier
        let mut prepared: Vec<Prepared> = Vec::new();
        while let Some(joined) = workers.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "indexing task failed to join");
                    continue;
                }
            };
            match outcome {
                Phase1::Prepared(p) => prepared.push(p),
                Phase1::Failed { path, message } => {
                    warn!(path = %path, error = %message, "failed to parse file");
                    self.states().transition(&path, FileState::Failed);
                    report.failed += 1;
                    diagnostics.insert(
                        path.clone(),
                        diagnostic(&path, DiagnosticStatus::ParseError, vec![message]),
                    );
                }
                Phase1::Cancelled { path } => {
                    self.revert_cancelled(&path);
                    diagnostics.insert(path.clone(), cancelled(&path));
                }
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
            }
        }

        // Phase 2: serialized commits
        prepared.sort_by(|a, b| a.path.cmp(&b.path));
        let mut remaining = prepared.into_iter();
        for file in remaining.by_ref() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                self.revert_cancelled(&file.path);
                diagnostics.insert(file.path.clone(), cancelled(&file.path));
                break;
            }
            let path = file.path.clone();
            let (entry, conflicts) = self.commit(file)?;
            if !conflicts.is_empty() {
                warn!(path = %path, conflicts = conflicts.len(), "identity conflicts");
            }
            report.conflicts.extend(conflicts);
            report.committed += 1;
            diagnostics.insert(path, entry);
        }
        for file in remaining {
            self.revert_cancelled(&file.path);
            diagnostics.insert(file.path.clone(), cancelled(&file.path));
        }

        if report.committed > 0 {
            report.resolved_edges = self.store.sweep(self.options.sweep_buckets).resolved;
        }

        report.diagnostics = diagnostics.into_values().collect();
        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            committed = report.committed,
            skipped = report.skipped,
            failed = report.failed,
            cancelled = report.cancelled,
            resolved_edges = report.resolved_edges,
            duration_ms = report.duration_ms,
            "indexing batch finished"
        );
        Ok(report)
    }

    /// Commits one prepared file to the store and, if configured, the database.
    fn commit(&self, file: Prepared) -> Result<(FileDiagnostic, Vec<IdentityConflict>)> {
        let Prepared {
            path,
            language,
            content_hash,
            extraction,
            partial,
            error_lines,
        } = file;

        let commit = self.store.upsert_file(
            &path,
            language,
            &content_hash,
            current_timestamp(),
            extraction,
        );

        if let Some(database) = &self.database {
            if let Some(contribution) = self.store.contribution(&path) {
                lock_database(database).save_contribution(&contribution)?;
            }
        }
        self.states().transition(&path, FileState::Indexed);

        let mut messages = Vec::new();
        let status = if partial {
            let lines: Vec<String> = error_lines.iter().map(u32::to_string).collect();
            messages.push(format!("syntax errors at lines {}", lines.join(", ")));
            DiagnosticStatus::ParseError
        } else if !commit.conflicts.is_empty() {
            DiagnosticStatus::Conflict
        } else {
            DiagnosticStatus::Ok
        };
        for conflict in &commit.conflicts {
            let kinds: Vec<&str> = conflict.kinds.iter().map(SymbolKind::as_str).collect();
            messages.push(format!(
                "conflicting kinds for {} ({}); using {}",
                conflict.qualified_name,
                kinds.join(", "),
                conflict.chosen.as_str()
            ));
        }
        messages.extend(commit.warnings);

        debug!(path = %path, seq = commit.seq, status = status.as_str(), "indexed file");
        Ok((diagnostic(&path, status, messages), commit.conflicts))
    }

    fn is_unchanged(&self, path: &str, content_hash: &str) -> bool {
        if self.states().get(path) != FileState::Indexed {
            return false;
        }
        self.store
            .read()
            .file(path)
            .map(|record| record.content_hash == content_hash)
            .unwrap_or(false)
    }

    fn revert_cancelled(&self, path: &str) {
        let back = if self.store.read().file(path).is_some() {
            FileState::Stale
        } else {
            FileState::Unindexed
        };
        self.states().transition(path, back);
    }
}

fn lock_database(database: &Mutex<Database>) -> MutexGuard<'_, Database> {
    database.lock().unwrap_or_else(PoisonError::into_inner)
}

fn diagnostic(path: &str, status: DiagnosticStatus, messages: Vec<String>) -> FileDiagnostic {
    FileDiagnostic {
        path: path.to_string(),
        status,
        messages,
    }
}

fn cancelled(path: &str) -> FileDiagnostic {
    diagnostic(
        path,
        DiagnosticStatus::Cancelled,
        vec!["indexing cancelled".to_string()],
    )
}

/// Phase 1 for one file: parse and extract. Runs on a blocking worker.
#[allow(clippy::too_many_arguments)]
fn prepare(
    parser: &ParserAdapter,
    grammars: &GrammarRegistry,
    extractors: &ExtractorRegistry,
    path: String,
    language: LanguageId,
    file: SourceFile,
    deadline: Instant,
    options: ExtractOptions,
) -> Result<Prepared> {
    let tree = parser.parse_with_deadline(&path, language, &file.content, deadline)?;
    let extractor = extractors
        .extractor_for(language)
        .ok_or_else(|| CkgError::UnsupportedLanguage {
            path: path.clone(),
            language: language.as_str().to_string(),
        })?;
    let extraction = extractor.extract(grammars, &tree, &path, &file.content, options);
    let partial = tree.has_errors();
    let error_lines = if partial { tree.error_lines(10) } else { Vec::new() };
    Ok(Prepared {
        path,
        language,
        content_hash: file.content_hash,
        extraction,
        partial,
        error_lines,
    })
}
