use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::resolution::{target_names, FileContext, IdentityResolver, SymbolLookup};
use crate::types::*;

/// Everything one file adds to the graph. Replaced wholesale on re-index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub record: FileRecord,
    pub occurrences: Vec<Occurrence>,
    pub edges: Vec<EdgeRecord>,
}

/// Stable handle to one edge of one contribution.
///
/// The commit sequence makes handles taken before a re-index of the same
/// file invalid rather than pointing at an unrelated edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeRef {
    pub file: String,
    pub seq: u64,
    pub index: usize,
}

/// Outcome of committing one file.
#[derive(Debug, Clone, Default)]
pub struct CommitReport {
    pub seq: u64,
    pub conflicts: Vec<IdentityConflict>,
    /// Named edges of this file still waiting for a target.
    pub unresolved: usize,
    pub warnings: Vec<String>,
}

/// Outcome of an unresolved-edge sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub resolved: usize,
    pub remaining: usize,
}

/// In-memory knowledge graph guarded by a single reader/writer lock.
///
/// Writers replace one file's contribution at a time; readers never observe
/// a half-applied file.
pub struct GraphStore {
    state: RwLock<GraphState>,
    resolver: IdentityResolver,
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            resolver: IdentityResolver::new(),
        }
    }

    /// Takes the read lock. A panic in another thread does not make the
    /// graph unreadable: every mutation finishes before the lock is released.
    pub fn read(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically replaces the contribution of `path` with `extraction`.
    pub fn upsert_file(
        &self,
        path: &str,
        language: LanguageId,
        content_hash: &str,
        indexed_at: i64,
        extraction: Extraction,
    ) -> CommitReport {
        let mut state = self.write();
        let seq = state.seq + 1;
        let context = FileContext {
            path: path.to_string(),
            language,
            seq,
        };
        let resolution = self.resolver.resolve(&context, extraction);
        let symbol_count = resolution
            .occurrences
            .iter()
            .filter(|o| o.kind != SymbolKind::File)
            .map(|o| o.symbol.as_str())
            .collect::<BTreeSet<_>>()
            .len() as u32;

        let contribution = Contribution {
            record: FileRecord {
                path: path.to_string(),
                language,
                content_hash: content_hash.to_string(),
                indexed_at,
                seq,
                top_level: resolution.top_level,
                symbol_count,
            },
            occurrences: resolution.occurrences,
            edges: resolution.edges,
        };

        let conflicts = state.apply(contribution, &self.resolver);
        let unresolved = state.pending.iter().filter(|r| r.file == path).count();
        debug!(
            path,
            seq,
            symbols = symbol_count,
            unresolved,
            "committed file contribution"
        );
        CommitReport {
            seq,
            conflicts,
            unresolved,
            warnings: resolution.warnings,
        }
    }

    /// Replays persisted contributions in commit order.
    ///
    /// Named edge targets are resolved again against the rebuilt graph.
    pub fn restore(&self, mut contributions: Vec<Contribution>) -> SweepReport {
        contributions.sort_by_key(|c| c.record.seq);
        {
            let mut state = self.write();
            for mut contribution in contributions {
                for edge in &mut contribution.edges {
                    if edge.target.is_some() {
                        edge.to = None;
                    }
                }
                state.apply(contribution, &self.resolver);
            }
        }
        self.sweep(1)
    }

    /// Removes every occurrence and edge `path` contributed.
    ///
    /// Returns `false` when the file was not in the graph.
    pub fn remove_file(&self, path: &str) -> bool {
        let mut state = self.write();
        if !state.files.contains_key(path) {
            return false;
        }
        let affected = state.detach(path);
        state.refresh(&affected, &self.resolver);
        state.recheck(&self.resolver);
        debug!(path, symbols = affected.len(), "removed file contribution");
        true
    }

    /// A copy of the current contribution of `path`.
    pub fn contribution(&self, path: &str) -> Option<Contribution> {
        self.read().files.get(path).cloned()
    }

    /// Retries every unresolved edge.
    ///
    /// Pending edges are partitioned by a hash of their first candidate name
    /// and the partitions are resolved in parallel under the read lock. The
    /// proposals are then applied under the write lock, skipping any edge
    /// whose file was re-indexed, or whose resolution changed, in between.
    pub fn sweep(&self, buckets: usize) -> SweepReport {
        let buckets = buckets.max(1);
        let proposals: Vec<(EdgeRef, String)> = {
            let guard = self.read();
            let state: &GraphState = &guard;
            let mut partitions: Vec<Vec<(&EdgeRef, &EdgeRecord)>> = vec![Vec::new(); buckets];
            for edge_ref in &state.pending {
                if let Some(edge) = state.edge(edge_ref) {
                    partitions[bucket_of(edge, buckets)].push((edge_ref, edge));
                }
            }
            let resolver = &self.resolver;
            partitions
                .par_iter()
                .flat_map_iter(|partition| {
                    partition.iter().filter_map(move |(edge_ref, edge)| {
                        resolver
                            .resolve_target(edge, state)
                            .map(|to| ((*edge_ref).clone(), to))
                    })
                })
                .collect()
        };

        let mut state = self.write();
        let mut resolved = 0;
        for (edge_ref, to) in proposals {
            let still_valid = state.pending.contains(&edge_ref)
                && state
                    .edge(&edge_ref)
                    .and_then(|edge| self.resolver.resolve_target(edge, &*state))
                    .is_some_and(|current| current == to);
            if still_valid {
                state.set_target(&edge_ref, to);
                resolved += 1;
            }
        }
        let remaining = state.pending.len();
        debug!(resolved, remaining, "swept unresolved edges");
        SweepReport {
            resolved,
            remaining,
        }
    }

    pub fn stats(&self) -> GraphStats {
        self.read().stats()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.read().snapshot()
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_of(edge: &EdgeRecord, buckets: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    edge.target
        .as_ref()
        .and_then(|t| t.candidates.first())
        .hash(&mut hasher);
    (hasher.finish() % buckets as u64) as usize
}

/// The graph itself: per-file contributions plus the indexes derived from
/// them.
#[derive(Debug, Default)]
pub struct GraphState {
    seq: u64,
    files: BTreeMap<String, Contribution>,
    symbols: BTreeMap<String, SymbolNode>,
    /// symbol id -> file -> occurrences contributed by that file
    occurrences: HashMap<String, BTreeMap<String, Vec<Occurrence>>>,
    by_qualified_name: HashMap<String, BTreeSet<String>>,
    by_name: HashMap<String, BTreeSet<String>>,
    outgoing: HashMap<String, BTreeSet<EdgeRef>>,
    incoming: HashMap<String, BTreeSet<EdgeRef>>,
    pending: BTreeSet<EdgeRef>,
    /// unqualified target name -> named edges that may resolve to it
    watchers: HashMap<String, BTreeSet<EdgeRef>>,
    /// Names of symbols added, or whose kind changed, since the last recheck.
    dirty: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

impl GraphState {
    fn apply(
        &mut self,
        contribution: Contribution,
        resolver: &IdentityResolver,
    ) -> Vec<IdentityConflict> {
        let path = contribution.record.path.clone();
        let seq = contribution.record.seq;
        self.seq = self.seq.max(seq);

        let mut affected = self.detach(&path);
        for occurrence in &contribution.occurrences {
            affected.insert(occurrence.symbol.clone());
            self.occurrences
                .entry(occurrence.symbol.clone())
                .or_default()
                .entry(path.clone())
                .or_default()
                .push(occurrence.clone());
        }

        let mut named = Vec::new();
        for (index, edge) in contribution.edges.iter().enumerate() {
            let edge_ref = EdgeRef {
                file: path.clone(),
                seq,
                index,
            };
            if let Some(target) = &edge.target {
                for name in target_names(target) {
                    self.watchers
                        .entry(name)
                        .or_default()
                        .insert(edge_ref.clone());
                }
            }
            if let Some(to) = &edge.to {
                self.index_edge(&edge_ref, &edge.from, to);
            } else if edge.target.is_some() {
                named.push(edge_ref);
            }
        }
        self.files.insert(path, contribution);

        let conflicts = self.refresh(&affected, resolver);
        for edge_ref in named {
            self.resolve_edge(&edge_ref, resolver);
        }
        self.recheck(resolver);
        conflicts
    }

    /// Re-resolves every bound named edge that may resolve to a dirty name,
    /// rebinding it when a better candidate now exists. An edge whose match
    /// became ambiguous goes back to pending.
    fn recheck(&mut self, resolver: &IdentityResolver) {
        let names = std::mem::take(&mut self.dirty);
        let watched: BTreeSet<EdgeRef> = names
            .iter()
            .filter_map(|name| self.watchers.get(name))
            .flatten()
            .cloned()
            .collect();
        let mut rebound = 0usize;
        for edge_ref in watched {
            let Some(edge) = self.edge(&edge_ref) else {
                continue;
            };
            let Some(current) = edge.to.clone() else {
                continue;
            };
            let from = edge.from.clone();
            let resolved = resolver.resolve_target(edge, self);
            if resolved.as_deref() == Some(current.as_str()) {
                continue;
            }
            self.unindex_edge(&edge_ref, &from, Some(&current));
            match resolved {
                Some(to) => self.set_target(&edge_ref, to),
                None => {
                    if let Some(edge) = self.edge_mut(&edge_ref) {
                        edge.to = None;
                    }
                    self.pending.insert(edge_ref);
                }
            }
            rebound += 1;
        }
        if rebound > 0 {
            debug!(rebound, "rebound named edges");
        }
    }

    /// Drops the contribution of `path` and returns the ids it touched.
    fn detach(&mut self, path: &str) -> BTreeSet<String> {
        let mut affected = BTreeSet::new();
        let Some(old) = self.files.remove(path) else {
            return affected;
        };
        for (index, edge) in old.edges.iter().enumerate() {
            let edge_ref = EdgeRef {
                file: path.to_string(),
                seq: old.record.seq,
                index,
            };
            self.pending.remove(&edge_ref);
            self.unindex_edge(&edge_ref, &edge.from, edge.to.as_deref());
            if let Some(target) = &edge.target {
                for name in target_names(target) {
                    remove_edge_from_index(&mut self.watchers, &name, &edge_ref);
                }
            }
        }
        for occurrence in old.occurrences {
            if let Some(per_file) = self.occurrences.get_mut(&occurrence.symbol) {
                per_file.remove(path);
                if per_file.is_empty() {
                    self.occurrences.remove(&occurrence.symbol);
                }
            }
            affected.insert(occurrence.symbol);
        }
        affected
    }

    /// Re-derives the views of `affected` and of their members.
    ///
    /// Containers go first so that a member's kind (function or method,
    /// variable or field) sees the current kind of its container. Returns
    /// the conflicts among `affected`.
    fn refresh(
        &mut self,
        affected: &BTreeSet<String>,
        resolver: &IdentityResolver,
    ) -> Vec<IdentityConflict> {
        let mut conflicts: BTreeMap<String, IdentityConflict> = BTreeMap::new();
        for id in affected {
            if let Some(conflict) = self.rederive(id, resolver) {
                conflicts.insert(id.clone(), conflict);
            }
        }

        let mut members: BTreeSet<String> = BTreeSet::new();
        for id in affected {
            members.extend(self.contained_ids(id));
            members.insert(id.clone());
        }
        for id in &members {
            let is_member_kind = self
                .symbols
                .get(id)
                .map(|s| matches!(s.kind.family(), KindFamily::Callable | KindFamily::Data))
                .unwrap_or(false);
            if !is_member_kind {
                continue;
            }
            let conflict = self.rederive(id, resolver);
            if let (Some(conflict), true) = (conflict, affected.contains(id)) {
                conflicts.insert(id.clone(), conflict);
            }
        }
        conflicts.into_values().collect()
    }

    /// Rebuilds one view from its occurrences, deleting it when none remain.
    fn rederive(&mut self, id: &str, resolver: &IdentityResolver) -> Option<IdentityConflict> {
        let derived = {
            let occurrences: Vec<&Occurrence> = self
                .occurrences
                .get(id)
                .map(|per_file| per_file.values().flatten().collect())
                .unwrap_or_default();
            let symbols = &self.symbols;
            resolver.derive_view(&occurrences, |container| {
                symbols
                    .get(container)
                    .map(|s| s.kind.is_class_like())
                    .unwrap_or(false)
            })
        };
        match derived {
            Some((node, conflict)) => {
                self.insert_symbol(node);
                conflict
            }
            None => {
                self.remove_symbol(id);
                None
            }
        }
    }

    fn insert_symbol(&mut self, node: SymbolNode) {
        let changed = self
            .symbols
            .get(&node.id)
            .map(|old| old.kind != node.kind)
            .unwrap_or(true);
        if changed {
            self.dirty.insert(node.name.clone());
        }
        self.by_qualified_name
            .entry(node.qualified_name.clone())
            .or_default()
            .insert(node.id.clone());
        self.by_name
            .entry(node.name.clone())
            .or_default()
            .insert(node.id.clone());
        self.symbols.insert(node.id.clone(), node);
    }

    /// Deletes a view. Named edges that pointed at it become unresolved.
    fn remove_symbol(&mut self, id: &str) {
        let Some(node) = self.symbols.remove(id) else {
            return;
        };
        remove_from_index(&mut self.by_qualified_name, &node.qualified_name, id);
        remove_from_index(&mut self.by_name, &node.name, id);

        let incoming = self.incoming.remove(id).unwrap_or_default();
        for edge_ref in incoming {
            let Some(edge) = self.edge_mut(&edge_ref) else {
                continue;
            };
            if edge.target.is_none() {
                continue;
            }
            edge.to = None;
            let from = edge.from.clone();
            remove_edge_from_index(&mut self.outgoing, &from, &edge_ref);
            self.pending.insert(edge_ref);
        }
    }

    fn resolve_edge(&mut self, edge_ref: &EdgeRef, resolver: &IdentityResolver) {
        let Some(edge) = self.edge(edge_ref) else {
            return;
        };
        match resolver.resolve_target(edge, self) {
            Some(to) => self.set_target(edge_ref, to),
            None => {
                self.pending.insert(edge_ref.clone());
            }
        }
    }

    fn set_target(&mut self, edge_ref: &EdgeRef, to: String) {
        self.pending.remove(edge_ref);
        let Some(edge) = self.edge_mut(edge_ref) else {
            return;
        };
        edge.to = Some(to.clone());
        let from = edge.from.clone();
        self.index_edge(edge_ref, &from, &to);
    }

    fn index_edge(&mut self, edge_ref: &EdgeRef, from: &str, to: &str) {
        self.outgoing
            .entry(from.to_string())
            .or_default()
            .insert(edge_ref.clone());
        self.incoming
            .entry(to.to_string())
            .or_default()
            .insert(edge_ref.clone());
    }

    fn unindex_edge(&mut self, edge_ref: &EdgeRef, from: &str, to: Option<&str>) {
        remove_edge_from_index(&mut self.outgoing, from, edge_ref);
        if let Some(to) = to {
            remove_edge_from_index(&mut self.incoming, to, edge_ref);
        }
    }

    fn edge_mut(&mut self, edge_ref: &EdgeRef) -> Option<&mut EdgeRecord> {
        self.files
            .get_mut(&edge_ref.file)
            .filter(|c| c.record.seq == edge_ref.seq)
            .and_then(|c| c.edges.get_mut(edge_ref.index))
    }
}

fn remove_edge_from_index(index: &mut HashMap<String, BTreeSet<EdgeRef>>, key: &str, edge_ref: &EdgeRef) {
    if let Some(refs) = index.get_mut(key) {
        refs.remove(edge_ref);
        if refs.is_empty() {
            index.remove(key);
        }
    }
}

fn remove_from_index(index: &mut HashMap<String, BTreeSet<String>>, key: &str, id: &str) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

impl GraphState {
    /// Highest commit sequence applied so far.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    fn edge(&self, edge_ref: &EdgeRef) -> Option<&EdgeRecord> {
        self.files
            .get(&edge_ref.file)
            .filter(|c| c.record.seq == edge_ref.seq)
            .and_then(|c| c.edges.get(edge_ref.index))
    }

    fn edges_for<'a>(
        &'a self,
        refs: impl Iterator<Item = &'a EdgeRef>,
        kind: Option<EdgeKind>,
    ) -> Vec<&'a EdgeRecord> {
        refs.filter_map(|r| self.edge(r))
            .filter(|e| kind.map(|k| e.kind == k).unwrap_or(true))
            .collect()
    }

    pub fn symbol(&self, id: &str) -> Option<&SymbolNode> {
        self.symbols.get(id)
    }

    /// All symbols, ordered by id.
    pub fn symbols(&self) -> impl Iterator<Item = &SymbolNode> {
        self.symbols.values()
    }

    pub fn lookup_by_qualified_name(&self, qualified_name: &str) -> Vec<&SymbolNode> {
        self.lookup_in(&self.by_qualified_name, qualified_name)
    }

    pub fn lookup_by_name(&self, name: &str) -> Vec<&SymbolNode> {
        self.lookup_in(&self.by_name, name)
    }

    fn lookup_in(&self, index: &HashMap<String, BTreeSet<String>>, key: &str) -> Vec<&SymbolNode> {
        index
            .get(key)
            .map(|ids| ids.iter().filter_map(|id| self.symbols.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn lookup_by_kind(&self, kind: SymbolKind) -> Vec<&SymbolNode> {
        self.symbols.values().filter(|s| s.kind == kind).collect()
    }

    fn contained_ids(&self, id: &str) -> Vec<String> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|r| self.edge(r))
            .filter(|e| e.kind == EdgeKind::Contains)
            .filter_map(|e| e.to.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Direct members of `id`, in source order.
    pub fn children_of(&self, id: &str) -> Vec<&SymbolNode> {
        if !self.symbols.contains_key(id) {
            return Vec::new();
        }
        let mut children: Vec<&SymbolNode> = self
            .contained_ids(id)
            .iter()
            .filter_map(|child| self.symbols.get(child))
            .collect();
        children.sort_by(|a, b| {
            (a.primary_location(), &a.id).cmp(&(b.primary_location(), &b.id))
        });
        children
    }

    /// Edges leaving `id`, optionally restricted to one kind.
    pub fn outgoing_edges(&self, id: &str, kind: Option<EdgeKind>) -> Vec<&EdgeRecord> {
        self.edges_for(self.outgoing.get(id).into_iter().flatten(), kind)
    }

    /// Resolved edges arriving at `id`, optionally restricted to one kind.
    pub fn incoming_edges(&self, id: &str, kind: Option<EdgeKind>) -> Vec<&EdgeRecord> {
        self.edges_for(self.incoming.get(id).into_iter().flatten(), kind)
    }

    /// Edges touching `id` in either direction.
    pub fn edges_of(&self, id: &str, kind: Option<EdgeKind>) -> Vec<&EdgeRecord> {
        let refs: BTreeSet<&EdgeRef> = self
            .outgoing
            .get(id)
            .into_iter()
            .flatten()
            .chain(self.incoming.get(id).into_iter().flatten())
            .collect();
        self.edges_for(refs.into_iter(), kind)
    }

    /// Every occurrence of `id`, ordered by file and position.
    pub fn occurrences_of(&self, id: &str) -> Vec<&Occurrence> {
        let mut occurrences: Vec<&Occurrence> = self
            .occurrences
            .get(id)
            .map(|per_file| per_file.values().flatten().collect())
            .unwrap_or_default();
        occurrences.sort_by(|a, b| (&a.file, a.span, a.role).cmp(&(&b.file, b.span, b.role)));
        occurrences
    }

    pub fn file(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path).map(|c| &c.record)
    }

    /// All file records, ordered by path.
    pub fn files(&self) -> Vec<&FileRecord> {
        self.files.values().map(|c| &c.record).collect()
    }

    pub fn contribution(&self, path: &str) -> Option<&Contribution> {
        self.files.get(path)
    }

    /// Named edges that have no target yet.
    pub fn pending_edges(&self) -> Vec<&EdgeRecord> {
        self.pending.iter().filter_map(|r| self.edge(r)).collect()
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            file_count: self.files.len() as u64,
            symbol_count: self.symbols.len() as u64,
            unresolved_edge_count: self.pending.len() as u64,
            ..GraphStats::default()
        };
        for symbol in self.symbols.values() {
            *stats
                .symbols_by_kind
                .entry(symbol.kind.as_str().to_string())
                .or_insert(0) += 1;
        }
        for edge in self.files.values().flat_map(|c| c.edges.iter()) {
            if edge.to.is_some() {
                stats.edge_count += 1;
                *stats
                    .edges_by_kind
                    .entry(edge.kind.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }
        stats
    }

    /// A fully sorted copy of the graph; two graphs built from the same
    /// inputs produce equal snapshots.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut edges: Vec<EdgeRecord> = self
            .files
            .values()
            .flat_map(|c| c.edges.iter().cloned())
            .collect();
        edges.sort();
        GraphSnapshot {
            files: self.files.values().map(|c| c.record.clone()).collect(),
            symbols: self.symbols.values().cloned().collect(),
            edges,
        }
    }
}

impl SymbolLookup for GraphState {
    fn symbol(&self, id: &str) -> Option<&SymbolNode> {
        self.symbols.get(id)
    }

    fn symbols_with_qualified_name(&self, qualified_name: &str) -> Vec<&SymbolNode> {
        self.lookup_by_qualified_name(qualified_name)
    }

    fn symbols_named(&self, name: &str) -> Vec<&SymbolNode> {
        self.lookup_by_name(name)
    }
}
