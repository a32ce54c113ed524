//! AskDesk Store — one row per logical document, FTS5 keyword index, cosine vector search.

pub mod embedding;
pub mod lexical;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::SqliteStore;
pub use types::*;
