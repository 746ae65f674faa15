use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::errors::{CkgError, Result};

/// Name of the configuration file stored inside the `.ckg` directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Name of the hidden directory used to store engine metadata.
pub const CKG_DIR: &str = ".ckg";

/// Per-project engine settings, stored as `.ckg/config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Config format version.
    pub version: u32,
    /// Project root the relative file paths are resolved against.
    pub root_dir: String,
    /// Globs selecting the source files to index.
    pub include: Vec<String>,
    /// Globs removing files from the selection.
    pub exclude: Vec<String>,
    /// Files above this many bytes are not indexed.
    pub max_file_size: u64,
    /// Per-file parse timeout in milliseconds.
    pub parse_timeout_ms: u64,
    /// Upper bound on concurrently running parses.
    pub max_parallel_parses: usize,
    /// Number of buckets the unresolved-edge sweep is partitioned into.
    pub sweep_buckets: usize,
    /// Whether to emit best-effort call edges.
    pub track_calls: bool,
    /// Database file name inside the `.ckg` directory.
    pub database: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            root_dir: String::new(),
            include: vec![
                "**/*.c".to_string(),
                "**/*.h".to_string(),
                "**/*.cc".to_string(),
                "**/*.cpp".to_string(),
                "**/*.cxx".to_string(),
                "**/*.c++".to_string(),
                "**/*.hh".to_string(),
                "**/*.hpp".to_string(),
                "**/*.hxx".to_string(),
                "**/*.py".to_string(),
                "**/*.pyw".to_string(),
                "**/*.java".to_string(),
                "**/*.rs".to_string(),
                "**/*.go".to_string(),
            ],
            exclude: vec![
                ".git/**".to_string(),
                ".ckg/**".to_string(),
                "build/**".to_string(),
                "out/**".to_string(),
                "target/**".to_string(),
                "vendor/**".to_string(),
                "node_modules/**".to_string(),
                "**/__pycache__/**".to_string(),
                "**/.venv/**".to_string(),
                "**/venv/**".to_string(),
            ],
            max_file_size: 1_048_576,
            parse_timeout_ms: 5_000,
            max_parallel_parses: default_parallelism(),
            sweep_buckets: 16,
            track_calls: true,
            database: "ckg.db".to_string(),
        }
    }
}

/// Number of parses to run at once when the config does not say.
fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl EngineConfig {
    /// Returns the configured parallelism, never less than one.
    pub fn parallelism(&self) -> usize {
        self.max_parallel_parses.max(1)
    }

    /// Returns the configured sweep bucket count, never less than one.
    pub fn buckets(&self) -> usize {
        self.sweep_buckets.max(1)
    }
}

/// Returns the path to the `.ckg` directory within the given project root.
pub fn get_ckg_dir(project_root: &Path) -> PathBuf {
    project_root.join(CKG_DIR)
}

/// Returns the path to the configuration file (`config.json`) within the `.ckg` directory.
pub fn get_config_path(project_root: &Path) -> PathBuf {
    get_ckg_dir(project_root).join(CONFIG_FILENAME)
}

/// Returns the path of the database file configured for the project.
pub fn get_database_path(project_root: &Path, config: &EngineConfig) -> PathBuf {
    get_ckg_dir(project_root).join(&config.database)
}

fn config_error(action: &str, path: &Path, e: impl std::fmt::Display) -> CkgError {
    CkgError::Config {
        message: format!("failed to {action} '{}': {e}", path.display()),
    }
}

/// Reads `.ckg/config.json`.
///
/// A project without a config file gets the defaults, rooted at
/// `project_root`. Missing fields in an existing file take their defaults.
pub fn load_config(project_root: &Path) -> Result<EngineConfig> {
    let path = get_config_path(project_root);
    if !path.exists() {
        let mut config = EngineConfig::default();
        config.root_dir = project_root.to_string_lossy().to_string();
        return Ok(config);
    }

    let text = fs::read_to_string(&path).map_err(|e| config_error("read config file", &path, e))?;
    serde_json::from_str(&text).map_err(|e| config_error("parse config file", &path, e))
}

/// Writes `.ckg/config.json`, replacing it atomically through a sibling
/// temporary file.
pub fn save_config(project_root: &Path, config: &EngineConfig) -> Result<()> {
    let dir = get_ckg_dir(project_root);
    fs::create_dir_all(&dir).map_err(|e| config_error("create directory", &dir, e))?;

    let path = get_config_path(project_root);
    let staged = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(config)?;
    fs::write(&staged, json).map_err(|e| config_error("write", &staged, e))?;
    fs::rename(&staged, &path).map_err(|e| config_error("replace config file", &path, e))
}

/// Whether `file_path` (relative, forward slashes) takes part in indexing.
///
/// Exclude patterns win over include patterns. Invalid patterns never match.
pub fn should_include_file(file_path: &str, config: &EngineConfig) -> bool {
    !matches_any(&config.exclude, file_path) && matches_any(&config.include, file_path)
}

fn matches_any(patterns: &[String], file_path: &str) -> bool {
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    patterns
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .any(|p| p.matches_with(file_path, options))
}
