//! AskDesk Resolve — hybrid search over stored documents.
//!
//! Every stored record gets a vector score (query embedding cosine, clamped
//! to `[0, 1]`) and a text score (share of query tokens found in the record's
//! `search_text`); the weighted sum ranks the results.

pub mod hybrid;
pub mod types;

pub use hybrid::HybridSearch;
pub use types::*;
