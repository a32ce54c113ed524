//! Data types for embedding records, filters, candidates, and stats.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use askdesk_core::Error;
use serde::{Deserialize, Serialize};

/// Kind of source document a record was built from. Used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Blog,
    Event,
    Faq,
    Instructor,
    Knowledge,
}

impl DocType {
    pub fn all() -> &'static [DocType] {
        &[
            Self::Blog,
            Self::Event,
            Self::Faq,
            Self::Instructor,
            Self::Knowledge,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blog => "blog",
            Self::Event => "event",
            Self::Faq => "faq",
            Self::Instructor => "instructor",
            Self::Knowledge => "knowledge",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = Error;

    /// Accepts the canonical tags plus the CMS schema names they come from.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "blog" | "post" | "blogPost" => Ok(Self::Blog),
            "event" => Ok(Self::Event),
            "faq" => Ok(Self::Faq),
            "instructor" => Ok(Self::Instructor),
            "knowledge" | "aiKnowledge" | "knowledge-base" => Ok(Self::Knowledge),
            other => Err(Error::NotFound(format!("unknown document type: {}", other))),
        }
    }
}

/// Metadata carried from the source document. Known keys are typed; anything
/// else the CMS sends lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The unit of retrieval: one row per logical source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub doc_type: DocType,
    pub title: String,
    pub content: String,
    pub url: String,
    #[serde(skip_serializing, default)]
    pub embedding: Vec<f32>,
    pub search_text: String,
    pub metadata: RecordMetadata,
    pub content_hash: String,
    /// Last sync time, unix milliseconds.
    pub updated_at: i64,
}

/// Selection used by the synchronizer when diffing against the store.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub doc_type: Option<DocType>,
    pub id: Option<String>,
}

impl RecordFilter {
    pub fn by_type(doc_type: DocType) -> Self {
        Self {
            doc_type: Some(doc_type),
            id: None,
        }
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            doc_type: None,
            id: Some(id.into()),
        }
    }
}

/// A row matched by the FTS index, with enough data to score lexical overlap.
#[derive(Debug, Clone)]
pub struct LexicalCandidate {
    pub id: String,
    pub search_text: String,
}

/// Cosine similarity of one stored embedding against a query vector.
#[derive(Debug, Clone)]
pub struct VectorCandidate {
    pub id: String,
    pub doc_type: DocType,
    pub similarity: f64,
}

/// Store-level statistics used for sync health checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_documents: i64,
    pub by_type: BTreeMap<String, i64>,
    /// Most recent `updated_at` across all records (unix ms).
    pub last_update: Option<i64>,
    pub embedding_dimension: usize,
    pub db_path: String,
    pub db_size_mb: f64,
    pub matrix_rows: usize,
}
