/// SQLite persistence for per-file graph contributions.
mod connection;
mod queries;

pub use connection::Database;
