//! Embedding trait.
//!
//! An `Embedder` maps text to a fixed-length vector. Implementations must be
//! deterministic for identical input; network, timeout, and quota failures
//! surface as `Error::Provider`.

use askdesk_core::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;

    /// Model identifier, for logs and stats.
    fn model_name(&self) -> &str;
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
