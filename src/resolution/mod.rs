/// Identity resolution.
///
/// Turns the candidates of one file into occurrences, folds the occurrences
/// of each identity into a resolved view, and matches named edge targets
/// against the symbols already in the graph.
mod resolver;

pub use resolver::{target_names, FileContext, IdentityResolver, Resolution, SymbolLookup};
