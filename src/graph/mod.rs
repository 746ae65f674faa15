/// In-memory graph storage with per-file atomic replace.
pub mod store;

/// Structural queries over the stored graph.
pub mod queries;

pub use queries::QueryEngine;
pub use store::{CommitReport, Contribution, EdgeRef, GraphState, GraphStore, SweepReport};
