//! AskDesk Infer — embedding providers and query cache.
//!
//! Provides the `Embedder` trait for turning text into fixed-length vectors.
//! `OpenAiEmbedder` calls any OpenAI-compatible `/embeddings` endpoint;
//! `HashEmbedder` is a deterministic local fallback that needs no network.

pub mod cache;
pub mod embedder;
pub mod hash;
pub mod openai;

pub use cache::{CachedEmbedder, QueryCache};
pub use embedder::{truncate_chars, Embedder};
pub use hash::HashEmbedder;
pub use openai::OpenAiEmbedder;

use std::sync::Arc;

use askdesk_core::{EmbeddingConfig, Error, Result};

/// Create the embedder selected by `config.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => {
            let embedder = OpenAiEmbedder::new(config)?;
            tracing::info!(
                "Using OpenAI-compatible embedder (model={}, dim={})",
                config.model,
                config.dimension
            );
            Ok(Arc::new(embedder))
        }
        "hash" => {
            tracing::info!("Using local hash embedder (dim={})", config.dimension);
            Ok(Arc::new(HashEmbedder::new(config.dimension)))
        }
        other => Err(Error::Config(format!(
            "unknown embedding provider '{}' (expected 'openai' or 'hash')",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_embedder_selection() {
        let config = EmbeddingConfig::default();
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.model_name(), "hash");
        assert_eq!(embedder.dimension(), 384);

        let missing_key = EmbeddingConfig {
            provider: "openai".into(),
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(create_embedder(&missing_key), Err(Error::Config(_))));

        let unknown = EmbeddingConfig {
            provider: "onnx".into(),
            ..Default::default()
        };
        assert!(create_embedder(&unknown).is_err());
    }
}
