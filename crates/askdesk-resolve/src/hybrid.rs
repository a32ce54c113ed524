//! Hybrid search: weighted vector + lexical scoring over every stored record.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use askdesk_core::{Error, Result};
use askdesk_infer::Embedder;
use askdesk_store::lexical::{token_coverage, tokenize};
use askdesk_store::SqliteStore;
use tracing::debug;

use crate::types::{SearchHit, SearchOptions};

pub struct HybridSearch {
    store: Arc<SqliteStore>,
    embedder: Arc<dyn Embedder>,
    embed_timeout: Duration,
}

#[derive(Default)]
struct Scores {
    vector: f64,
    text: f64,
}

impl HybridSearch {
    pub fn new(
        store: Arc<SqliteStore>,
        embedder: Arc<dyn Embedder>,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            store,
            embedder,
            embed_timeout,
        }
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    /// Rank stored records against `query`.
    ///
    /// Results are sorted by `combined_score` desc, then `updated_at` desc,
    /// then `id` asc, with hits below `threshold` dropped and the rest cut to
    /// `top_k`. An empty result is not an error.
    pub async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation("query must not be empty".into()));
        }
        opts.validate()?;

        let query_vec = tokio::time::timeout(self.embed_timeout, self.embedder.embed(query))
            .await
            .map_err(|_| {
                Error::Provider(format!("query embedding timed out after {:?}", self.embed_timeout))
            })??;

        // BTreeMap keeps iteration order independent of hashing.
        let mut scores: BTreeMap<String, Scores> = BTreeMap::new();

        for candidate in self.store.vector_candidates(&query_vec, opts.doc_type)? {
            if !opts.admits(candidate.doc_type) {
                continue;
            }
            scores.entry(candidate.id).or_default().vector = candidate.similarity.clamp(0.0, 1.0);
        }

        let query_tokens = tokenize(query);
        for candidate in self.store.keyword_candidates(&query_tokens, opts.doc_type)? {
            let coverage = token_coverage(&query_tokens, &candidate.search_text);
            scores.entry(candidate.id).or_default().text = coverage;
        }

        let mut hits = Vec::new();
        for (id, s) in scores {
            let combined = opts.vector_weight * s.vector + opts.text_weight * s.text;
            if combined < opts.threshold {
                continue;
            }
            // Rows deleted since candidate selection are skipped.
            let record = match self.store.get(&id)? {
                Some(r) if opts.admits(r.doc_type) => r,
                _ => continue,
            };
            hits.push(SearchHit::from_record(record, s.vector, s.text, combined));
        }

        hits.sort_by(|a, b| {
            b.combined_score
                .total_cmp(&a.combined_score)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(opts.top_k);

        debug!(
            "Search {:?}: {} hits (top={:?})",
            query,
            hits.len(),
            hits.first().map(|h| (&h.id, h.combined_score))
        );
        Ok(hits)
    }
}
