pub mod config;
pub mod db;
pub mod errors;
pub mod extraction;
pub mod grammar;
pub mod graph;
pub mod indexer;
pub mod knowledge_graph;
pub mod resolution;
pub mod sync;
pub mod types;

pub use knowledge_graph::KnowledgeGraph;
