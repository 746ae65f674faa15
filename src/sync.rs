use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::FileRecord;

/// Compute SHA-256 content hash of file content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
}

/// Lifecycle of a file in the indexer.
///
/// `Unindexed -> Indexing -> Indexed -> Stale -> Indexing -> ...`, with
/// `Failed` reachable from `Indexing` when a file cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Unindexed,
    Indexing,
    Indexed,
    Stale,
    Failed,
}

impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Unindexed => "unindexed",
            FileState::Indexing => "indexing",
            FileState::Indexed => "indexed",
            FileState::Stale => "stale",
            FileState::Failed => "failed",
        }
    }

    /// Returns `true` if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: FileState) -> bool {
        use FileState::*;
        matches!(
            (self, next),
            (Unindexed, Indexing)
                | (Stale, Indexing)
                | (Failed, Indexing)
                | (Indexing, Indexed)
                | (Indexing, Failed)
                | (Indexed, Stale)
                | (Failed, Stale)
                // cancellation returns an in-flight file to where it started
                | (Indexing, Unindexed)
                | (Indexing, Stale)
        )
    }
}

/// Tracks the state of every file the indexer has seen.
#[derive(Debug, Default)]
pub struct FileStateTable {
    states: HashMap<String, FileState>,
}

impl FileStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state of `path`, `Unindexed` if never seen.
    pub fn get(&self, path: &str) -> FileState {
        self.states
            .get(path)
            .copied()
            .unwrap_or(FileState::Unindexed)
    }

    /// Moves `path` to `next`, returning `false` (and leaving the state
    /// untouched) when the transition is not allowed.
    pub fn transition(&mut self, path: &str, next: FileState) -> bool {
        let current = self.get(path);
        if current == next {
            return true;
        }
        if !current.can_transition_to(next) {
            tracing::debug!(
                path,
                from = current.as_str(),
                to = next.as_str(),
                "rejected file state transition"
            );
            return false;
        }
        self.states.insert(path.to_string(), next);
        true
    }

    /// Forgets a file entirely, as if it had never been indexed.
    pub fn forget(&mut self, path: &str) {
        self.states.remove(path);
    }

    /// Marks an indexed file as stale. Returns `false` if it was not indexed.
    pub fn mark_stale(&mut self, path: &str) -> bool {
        matches!(self.get(path), FileState::Indexed | FileState::Failed)
            && self.transition(path, FileState::Stale)
    }

    /// Returns all paths currently in `state`, sorted.
    pub fn paths_in(&self, state: FileState) -> Vec<String> {
        let mut paths: Vec<String> = self
            .states
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        paths
    }
}

/// Find files whose stored content hash differs from the current hash.
pub fn find_stale_files(records: &[FileRecord], current_hashes: &[(String, String)]) -> Vec<String> {
    let known: HashMap<&str, &str> = records
        .iter()
        .map(|r| (r.path.as_str(), r.content_hash.as_str()))
        .collect();
    let mut stale = Vec::new();
    for (path, current_hash) in current_hashes {
        if let Some(stored) = known.get(path.as_str()) {
            if *stored != current_hash.as_str() {
                stale.push(path.clone());
            }
        }
    }
    stale
}

/// Find files that exist on disk but not in the graph.
pub fn find_new_files(records: &[FileRecord], current_files: &[String]) -> Vec<String> {
    let known: HashSet<&str> = records.iter().map(|r| r.path.as_str()).collect();
    current_files
        .iter()
        .filter(|p| !known.contains(p.as_str()))
        .cloned()
        .collect()
}

/// Find files that are in the graph but no longer exist on disk.
pub fn find_removed_files(records: &[FileRecord], current_files: &[String]) -> Vec<String> {
    let current_set: HashSet<&str> = current_files.iter().map(|s| s.as_str()).collect();
    records
        .iter()
        .filter(|r| !current_set.contains(r.path.as_str()))
        .map(|r| r.path.clone())
        .collect()
}
