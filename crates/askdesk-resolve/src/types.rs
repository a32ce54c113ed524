//! Search options and hits.

use askdesk_core::{Error, Result, SearchDefaults};
use askdesk_store::{DocType, EmbeddingRecord, RecordMetadata};
use serde::{Deserialize, Serialize};

/// Per-request search parameters. Defaults come from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    pub top_k: usize,
    /// Hits with `combined_score` below this are dropped.
    pub threshold: f64,
    /// Restrict candidates to one type.
    pub doc_type: Option<DocType>,
    /// Types a caller is willing to see at all; `None` allows every type.
    pub allowed_types: Option<Vec<DocType>>,
    pub vector_weight: f64,
    pub text_weight: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchDefaults::default().into()
    }
}

impl From<SearchDefaults> for SearchOptions {
    fn from(d: SearchDefaults) -> Self {
        Self {
            top_k: d.top_k,
            threshold: d.threshold,
            doc_type: None,
            allowed_types: None,
            vector_weight: d.vector_weight,
            text_weight: d.text_weight,
        }
    }
}

impl SearchOptions {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::Validation("topK must be at least 1".into()));
        }
        if !self.threshold.is_finite() {
            return Err(Error::Validation("threshold must be a finite number".into()));
        }
        for (name, w) in [("vectorWeight", self.vector_weight), ("textWeight", self.text_weight)] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::Validation(format!("{} must be a non-negative number", name)));
            }
        }
        Ok(())
    }

    pub(crate) fn admits(&self, doc_type: DocType) -> bool {
        self.doc_type.map_or(true, |t| t == doc_type)
            && self
                .allowed_types
                .as_ref()
                .map_or(true, |allowed| allowed.contains(&doc_type))
    }
}

/// A ranked record with its score breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub doc_type: DocType,
    pub title: String,
    pub content: String,
    pub url: String,
    pub metadata: RecordMetadata,
    pub updated_at: i64,
    pub vector_score: f64,
    pub text_score: f64,
    pub combined_score: f64,
}

impl SearchHit {
    pub(crate) fn from_record(
        record: EmbeddingRecord,
        vector_score: f64,
        text_score: f64,
        combined_score: f64,
    ) -> Self {
        Self {
            id: record.id,
            doc_type: record.doc_type,
            title: record.title,
            content: record.content,
            url: record.url,
            metadata: record.metadata,
            updated_at: record.updated_at,
            vector_score,
            text_score,
            combined_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_config() {
        let opts = SearchOptions::default();
        assert_eq!(opts.top_k, 30);
        assert!((opts.threshold - 0.03).abs() < 1e-12);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let zero = SearchOptions {
            top_k: 0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(Error::Validation(_))));
        let negative = SearchOptions {
            text_weight: -0.1,
            ..Default::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_admits() {
        let opts = SearchOptions {
            allowed_types: Some(vec![DocType::Faq, DocType::Event]),
            ..Default::default()
        };
        assert!(opts.admits(DocType::Faq));
        assert!(!opts.admits(DocType::Blog));

        let one = SearchOptions {
            doc_type: Some(DocType::Event),
            ..opts
        };
        assert!(one.admits(DocType::Event));
        assert!(!one.admits(DocType::Faq));
    }
}
