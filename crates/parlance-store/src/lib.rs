//! Parlance Store — append-only SQLite transcript of conversation turns.

pub mod schema;
pub mod sqlite;

pub use sqlite::TranscriptStore;
