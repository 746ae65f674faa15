use std::cmp::Reverse;

use crate::graph::store::{GraphState, GraphStore};
use crate::types::*;

/// Structural queries over the knowledge graph.
///
/// Every query takes the read lock for its own duration and returns owned
/// values, so results stay valid while indexing continues. Best-effort
/// `calls` edges never feed definition, children or override answers.
pub struct QueryEngine<'a> {
    store: &'a GraphStore,
}

impl<'a> QueryEngine<'a> {
    /// Creates a new `QueryEngine` over the given store.
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// Finds the symbol a qualified name most likely refers to.
    ///
    /// When several symbols share the name (overloads, a struct and its
    /// typedef) the ranking prefers definitions over declarations, concrete
    /// entities over typedefs and macros, then the empty signature.
    pub fn find_definition(&self, qualified_name: &str) -> Option<SymbolNode> {
        let state = self.store.read();
        let mut matches = state.lookup_by_qualified_name(qualified_name);
        matches.sort_by_key(|s| {
            (
                Reverse(s.is_definition),
                matches!(s.kind, SymbolKind::Typedef | SymbolKind::Macro),
                !s.signature.is_empty(),
                s.id.clone(),
            )
        });
        matches.first().map(|s| (*s).clone())
    }

    /// Finds the symbol with exactly this qualified name and signature.
    ///
    /// Signatures are compared ignoring whitespace, so `"(int, int)"` finds
    /// `"(int,int)"`.
    pub fn find_definition_with_signature(
        &self,
        qualified_name: &str,
        signature: &str,
    ) -> Option<SymbolNode> {
        let state = self.store.read();
        if let Some(symbol) = state.symbol(&symbol_id(qualified_name, signature)) {
            return Some(symbol.clone());
        }
        let wanted = strip_whitespace(signature);
        state
            .lookup_by_qualified_name(qualified_name)
            .into_iter()
            .find(|s| strip_whitespace(&s.signature) == wanted)
            .cloned()
    }

    /// Every declaration and definition site of every symbol with this
    /// qualified name, ordered by file and position.
    pub fn find_declarations_and_definitions(&self, qualified_name: &str) -> Vec<SymbolLocation> {
        let state = self.store.read();
        let mut locations: Vec<SymbolLocation> = state
            .lookup_by_qualified_name(qualified_name)
            .into_iter()
            .flat_map(|s| state.occurrences_of(&s.id))
            .map(|o| SymbolLocation {
                symbol: o.symbol.clone(),
                role: o.role,
                location: o.location(),
            })
            .collect();
        locations.sort_by(|a, b| {
            (&a.location, a.role, &a.symbol).cmp(&(&b.location, b.role, &b.symbol))
        });
        locations.dedup();
        locations
    }

    /// Direct members of a symbol. Unknown ids yield an empty list.
    pub fn find_children(&self, id: &str) -> Vec<SymbolNode> {
        let state = self.store.read();
        owned(state.children_of(id))
    }

    /// Methods that override `id`.
    pub fn find_overrides_of(&self, id: &str) -> Vec<SymbolNode> {
        let state = self.store.read();
        sources(&state, id, EdgeKind::Overrides)
    }

    /// Methods that `id` overrides.
    pub fn find_overridden_by(&self, id: &str) -> Vec<SymbolNode> {
        let state = self.store.read();
        targets(&state, id, EdgeKind::Overrides)
    }

    /// Specializations of the template `id`.
    pub fn specializations_of(&self, id: &str) -> Vec<SymbolNode> {
        let state = self.store.read();
        sources(&state, id, EdgeKind::Specializes)
    }

    /// Functions declared as friends of the class `id`.
    pub fn friends_of(&self, id: &str) -> Vec<SymbolNode> {
        let state = self.store.read();
        sources(&state, id, EdgeKind::FriendOf)
    }

    /// Best-effort list of functions that call `id`.
    pub fn callers_of(&self, id: &str) -> Vec<SymbolNode> {
        let state = self.store.read();
        sources(&state, id, EdgeKind::Calls)
    }

    /// Symbols whose unqualified name contains `text` (case-sensitive).
    pub fn search_by_name_substring(&self, text: &str) -> Vec<SymbolNode> {
        let state = self.store.read();
        let mut found: Vec<&SymbolNode> = state
            .symbols()
            .filter(|s| s.kind != SymbolKind::File && s.name.contains(text))
            .collect();
        found.sort_by(|a, b| (&a.qualified_name, &a.id).cmp(&(&b.qualified_name, &b.id)));
        owned(found)
    }

    /// Symbols of one kind named `name`.
    ///
    /// `name` matches the unqualified name, the full qualified name, or any
    /// qualified suffix (`Shape::area` finds `Graphics::Shape::area`).
    pub fn search_by_kind(&self, kind: SymbolKind, name: &str) -> Vec<SymbolNode> {
        let state = self.store.read();
        let mut found: Vec<&SymbolNode> = state
            .lookup_by_kind(kind)
            .into_iter()
            .filter(|s| names_match(s, name))
            .collect();
        found.sort_by(|a, b| (&a.qualified_name, &a.id).cmp(&(&b.qualified_name, &b.id)));
        owned(found)
    }

    /// Methods of the classes named `class_name`, optionally only those
    /// named `method_name`.
    pub fn find_class_methods(
        &self,
        class_name: &str,
        method_name: Option<&str>,
    ) -> Vec<SymbolNode> {
        let state = self.store.read();
        let classes: Vec<&SymbolNode> = state
            .symbols()
            .filter(|s| s.kind.is_class_like() && names_match(s, class_name))
            .collect();
        let mut methods = Vec::new();
        for class in classes {
            for child in state.children_of(&class.id) {
                if child.kind != SymbolKind::Method {
                    continue;
                }
                if method_name.map(|m| child.name == m).unwrap_or(true) {
                    methods.push(child);
                }
            }
        }
        owned(methods)
    }

    pub fn get_symbol(&self, id: &str) -> Option<SymbolNode> {
        self.store.read().symbol(id).cloned()
    }

    /// Named edges still waiting for their target.
    pub fn unresolved_edges(&self) -> Vec<EdgeRecord> {
        let state = self.store.read();
        let mut edges: Vec<EdgeRecord> = state.pending_edges().into_iter().cloned().collect();
        edges.sort();
        edges
    }
}

fn owned(symbols: Vec<&SymbolNode>) -> Vec<SymbolNode> {
    symbols.into_iter().cloned().collect()
}

/// Symbols at the `from` end of `kind` edges arriving at `id`.
fn sources(state: &GraphState, id: &str, kind: EdgeKind) -> Vec<SymbolNode> {
    let mut ids: Vec<&str> = state
        .incoming_edges(id, Some(kind))
        .into_iter()
        .map(|e| e.from.as_str())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids.into_iter()
        .filter_map(|id| state.symbol(id).cloned())
        .collect()
}

/// Symbols at the `to` end of `kind` edges leaving `id`.
fn targets(state: &GraphState, id: &str, kind: EdgeKind) -> Vec<SymbolNode> {
    let mut ids: Vec<&str> = state
        .outgoing_edges(id, Some(kind))
        .into_iter()
        .filter_map(|e| e.to.as_deref())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids.into_iter()
        .filter_map(|id| state.symbol(id).cloned())
        .collect()
}

fn names_match(symbol: &SymbolNode, name: &str) -> bool {
    if symbol.name == name || symbol.qualified_name == name {
        return true;
    }
    symbol
        .qualified_name
        .strip_suffix(name)
        .map(|head| head.ends_with("::") || head.ends_with('.'))
        .unwrap_or(false)
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}
