use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::types::*;

/// Read access to the resolved symbols the resolver matches targets against.
pub trait SymbolLookup {
    /// The symbol with the given id, if it exists.
    fn symbol(&self, id: &str) -> Option<&SymbolNode>;

    /// All symbols with exactly this qualified name (one per signature).
    fn symbols_with_qualified_name(&self, qualified_name: &str) -> Vec<&SymbolNode>;

    /// All symbols with this unqualified name.
    fn symbols_named(&self, name: &str) -> Vec<&SymbolNode>;
}

/// Where a batch of candidates comes from.
#[derive(Debug, Clone)]
pub struct FileContext {
    pub path: String,
    pub language: LanguageId,
    pub seq: u64,
}

/// A file's candidates turned into graph contributions.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub occurrences: Vec<Occurrence>,
    pub edges: Vec<EdgeRecord>,
    /// Ids of the symbols the file root directly contains, in source order.
    pub top_level: Vec<String>,
    pub warnings: Vec<String>,
}

/// Merges candidates into stable identities and resolves named edge targets.
///
/// Identity itself is structural (`symbol_id` of qualified name and
/// signature), so merging a declaration with its definition, or a namespace
/// reopened in several files, needs no lookups. What the resolver decides is
/// how the occurrences of one identity fold into a single view, and which
/// symbol a named reference points at.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver;

impl IdentityResolver {
    pub fn new() -> Self {
        Self
    }

    /// Stamps a file's candidates with their origin and drops duplicates.
    ///
    /// Repeated candidates at the same span (the same declaration reached
    /// twice) collapse; containment edges are kept once per pair.
    pub fn resolve(&self, context: &FileContext, extraction: Extraction) -> Resolution {
        let root = file_id(&context.path);
        let mut seen: HashSet<(String, Span, OccurrenceRole)> = HashSet::new();
        let mut occurrences = Vec::with_capacity(extraction.symbols.len());
        let mut top_level = Vec::new();

        for candidate in extraction.symbols {
            if !seen.insert((candidate.id.clone(), candidate.span, candidate.role)) {
                continue;
            }
            if candidate.container.as_deref() == Some(root.as_str())
                && !top_level.contains(&candidate.id)
            {
                top_level.push(candidate.id.clone());
            }
            occurrences.push(Occurrence {
                symbol: candidate.id,
                kind: candidate.kind,
                name: candidate.name,
                qualified_name: candidate.qualified_name,
                signature: candidate.signature,
                container: candidate.container,
                role: candidate.role,
                span: candidate.span,
                header: candidate.header,
                docstring: candidate.docstring,
                file: context.path.clone(),
                language: context.language,
                seq: context.seq,
            });
        }

        let mut contained: HashSet<(String, String)> = HashSet::new();
        let edges = extraction
            .edges
            .into_iter()
            .filter(|edge| match (&edge.kind, &edge.to) {
                (EdgeKind::Contains, Some(to)) => contained.insert((edge.from.clone(), to.clone())),
                _ => true,
            })
            .collect();

        Resolution {
            occurrences,
            edges,
            top_level,
            warnings: extraction.warnings,
        }
    }

    /// Folds every occurrence of one identity into its resolved view.
    ///
    /// Returns `None` when no occurrences remain. The second element reports
    /// occurrences whose kinds fall into different families.
    pub fn derive_view(
        &self,
        occurrences: &[&Occurrence],
        is_class_like: impl Fn(&str) -> bool,
    ) -> Option<(SymbolNode, Option<IdentityConflict>)> {
        let winner = occurrences.iter().copied().max_by(|a, b| rank(a, b))?;

        let families: BTreeSet<KindFamily> = occurrences.iter().map(|o| o.kind.family()).collect();
        let container_is_class = winner
            .container
            .as_deref()
            .map(&is_class_like)
            .unwrap_or(false);

        let kind = match winner.kind.family() {
            KindFamily::Callable
                if container_is_class
                    || occurrences.iter().any(|o| o.kind == SymbolKind::Method) =>
            {
                SymbolKind::Method
            }
            KindFamily::Data
                if container_is_class || occurrences.iter().any(|o| o.kind == SymbolKind::Field) =>
            {
                SymbolKind::Field
            }
            _ => winner.kind,
        };

        let conflict = if families.len() > 1 {
            let mut kinds: Vec<SymbolKind> = occurrences.iter().map(|o| o.kind).collect();
            kinds.sort();
            kinds.dedup();
            Some(IdentityConflict {
                symbol: winner.symbol.clone(),
                qualified_name: winner.qualified_name.clone(),
                kinds,
                chosen: kind,
            })
        } else {
            None
        };

        let mut definitions: Vec<&Occurrence> = occurrences
            .iter()
            .copied()
            .filter(|o| o.role == OccurrenceRole::Definition)
            .collect();
        definitions.sort_by(|a, b| by_recency(a, b));
        let primary = definitions.pop();

        let mut declarations: Vec<&Occurrence> = occurrences
            .iter()
            .copied()
            .filter(|o| o.role == OccurrenceRole::Declaration)
            .collect();
        declarations.sort_by(|a, b| by_recency(a, b));

        let contributors: Vec<String> = occurrences
            .iter()
            .map(|o| o.file.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let docstring = std::iter::once(winner)
            .chain(primary)
            .chain(declarations.iter().copied())
            .find_map(|o| o.docstring.clone());

        let declaring_file = declarations
            .first()
            .or(primary.as_ref())
            .map(|o| o.file.clone());

        let node = SymbolNode {
            id: winner.symbol.clone(),
            kind,
            name: winner.name.clone(),
            qualified_name: winner.qualified_name.clone(),
            signature: winner.signature.clone(),
            header: winner.header.clone(),
            docstring,
            language: winner.language,
            container: winner.container.clone(),
            declaring_file,
            definition_file: primary.map(|o| o.file.clone()),
            definition: primary.map(Occurrence::location),
            declarations: declarations.iter().map(|o| o.location()).collect(),
            alternate_definitions: definitions.iter().map(|o| o.location()).collect(),
            is_definition: primary.is_some(),
            is_declaration_only: primary.is_none(),
            contributors,
        };
        Some((node, conflict))
    }

    /// Resolves the named target of `edge`, or `None` if nothing matches yet.
    ///
    /// The result depends only on the symbols `lookup` holds, never on the
    /// order they arrived in.
    ///
    /// Strategies, in order:
    /// 1. candidate qualified names, innermost scope first; with a signature
    ///    this is an exact identity check,
    /// 2. a unique symbol whose qualified name ends with the least qualified
    ///    candidate.
    pub fn resolve_target(&self, edge: &EdgeRecord, lookup: &dyn SymbolLookup) -> Option<String> {
        let target = edge.target.as_ref()?;

        for qualified_name in &target.candidates {
            let found = match &target.signature {
                Some(signature) => {
                    let id = symbol_id(qualified_name, signature);
                    lookup
                        .symbol(&id)
                        .filter(|s| s.id != edge.from)
                        .map(|s| s.id.clone())
                }
                None => {
                    let matches: Vec<&SymbolNode> = lookup
                        .symbols_with_qualified_name(qualified_name)
                        .into_iter()
                        .filter(|s| s.id != edge.from)
                        .collect();
                    pick(matches, target.expect, false)
                }
            };
            if found.is_some() {
                return found;
            }
        }

        let suffix = target.candidates.last()?;
        let name = last_segment(suffix);
        let matches: Vec<&SymbolNode> = lookup
            .symbols_named(name)
            .into_iter()
            .filter(|s| s.id != edge.from)
            .filter(|s| qualified_name_ends_with(&s.qualified_name, suffix))
            .filter(|s| {
                target
                    .signature
                    .as_ref()
                    .map(|sig| &s.signature == sig)
                    .unwrap_or(true)
            })
            .collect();
        pick(matches, target.expect, true)
    }
}

/// Unqualified names a target can resolve to. A new symbol with one of
/// these names may change what the target resolves to.
pub fn target_names(target: &TargetRef) -> BTreeSet<String> {
    target
        .candidates
        .iter()
        .map(|c| last_segment(c).to_string())
        .collect()
}

/// Priority of an occurrence when choosing the kind of a symbol:
/// definition-bearing first, then anything but a macro, then most recent.
fn rank(a: &Occurrence, b: &Occurrence) -> Ordering {
    let key = |o: &Occurrence| {
        (
            o.role == OccurrenceRole::Definition,
            o.kind != SymbolKind::Macro,
            o.seq,
        )
    };
    key(a)
        .cmp(&key(b))
        .then_with(|| by_recency(a, b))
}

/// Oldest first: commit sequence, then file, then position.
fn by_recency(a: &Occurrence, b: &Occurrence) -> Ordering {
    (a.seq, &a.file, a.span).cmp(&(b.seq, &b.file, b.span))
}

/// Chooses among symbols sharing a qualified name.
///
/// Prefers the expected family when any match it. With `unique`, more than
/// one remaining match is ambiguous and yields `None`; otherwise the lowest
/// id wins so the choice is stable.
fn pick(matches: Vec<&SymbolNode>, expect: Option<KindFamily>, unique: bool) -> Option<String> {
    if matches.is_empty() {
        return None;
    }
    let preferred: Vec<&SymbolNode> = match expect {
        Some(family) => {
            let filtered: Vec<&SymbolNode> = matches
                .iter()
                .copied()
                .filter(|s| s.kind.family() == family)
                .collect();
            if filtered.is_empty() {
                matches
            } else {
                filtered
            }
        }
        None => matches,
    };
    if unique && preferred.len() > 1 {
        return None;
    }
    let ids: BTreeMap<&str, ()> = preferred.iter().map(|s| (s.id.as_str(), ())).collect();
    ids.keys().next().map(|id| id.to_string())
}

fn last_segment(qualified_name: &str) -> &str {
    let after_colons = qualified_name.rsplit("::").next().unwrap_or(qualified_name);
    if after_colons.starts_with("operator") {
        return after_colons;
    }
    after_colons.rsplit('.').next().unwrap_or(after_colons)
}

fn qualified_name_ends_with(qualified_name: &str, suffix: &str) -> bool {
    if qualified_name == suffix {
        return true;
    }
    qualified_name
        .strip_suffix(suffix)
        .map(|head| head.ends_with("::") || head.ends_with('.'))
        .unwrap_or(false)
}
