//! The content source contract consumed by the synchronizer.

use askdesk_core::Result;
use askdesk_store::DocType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Document body as delivered by the source: plain text or rich-text blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Body {
    Text(String),
    Blocks(Vec<serde_json::Value>),
}

impl Default for Body {
    fn default() -> Self {
        Body::Text(String::new())
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

/// One document as projected from the source, with only the fields needed to
/// build a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "extractedText")]
    pub body: Body,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub status: Option<String>,
    /// Explicit opt-out from the AI index when `Some(false)`.
    #[serde(default)]
    pub include_in_ai: Option<bool>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_active() -> bool {
    true
}

/// `status` values that mark a document as not live on the site.
pub const NON_LIVE_STATUSES: &[&str] = &["draft", "archived", "unpublished", "hidden", "deleted"];

impl SourceDocument {
    /// Minimal active document; remaining fields take their defaults.
    pub fn new(
        id: impl Into<String>,
        doc_type: DocType,
        title: impl Into<String>,
        body: Body,
    ) -> Self {
        Self {
            id: id.into(),
            doc_type,
            title: title.into(),
            body,
            tags: Vec::new(),
            category: None,
            is_active: true,
            status: None,
            include_in_ai: None,
            priority: None,
            url: String::new(),
            updated_at: None,
            published_at: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Why this document must not be indexed, if it must not.
    /// Workflow statuses such as an event's `open` or `full` stay indexed.
    /// Empty text is checked separately once the body is flattened.
    pub fn exclusion_reason(&self) -> Option<&'static str> {
        if !self.is_active {
            return Some("inactive");
        }
        if let Some(status) = &self.status {
            if NON_LIVE_STATUSES.contains(&status.trim().to_ascii_lowercase().as_str()) {
                return Some("unpublished");
            }
        }
        if self.include_in_ai == Some(false) {
            return Some("opted out");
        }
        None
    }
}

/// Read-only pull interface over a content store.
#[async_trait]
pub trait ContentSource: Send + Sync {
    fn source_name(&self) -> &str;

    /// All documents of one type, including inactive ones.
    async fn fetch_by_type(&self, doc_type: DocType) -> Result<Vec<SourceDocument>>;

    /// A single document, or `None` if the source no longer has it.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<SourceDocument>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_export_row() {
        let doc: SourceDocument = serde_json::from_value(serde_json::json!({
            "_id": "evt-1",
            "type": "event",
            "title": "Workshop A",
            "extractedText": "Hands-on pottery",
            "venue": "Studio B"
        }))
        .unwrap();
        assert_eq!(doc.id, "evt-1");
        assert_eq!(doc.doc_type, DocType::Event);
        assert_eq!(doc.body, Body::Text("Hands-on pottery".into()));
        assert!(doc.is_active);
        assert_eq!(doc.extra["venue"], "Studio B");
    }

    #[test]
    fn test_blocks_body() {
        let doc: SourceDocument = serde_json::from_value(serde_json::json!({
            "id": "blog-1",
            "type": "blog",
            "body": [{ "_type": "block", "children": [{ "text": "Hello" }] }]
        }))
        .unwrap();
        assert!(matches!(doc.body, Body::Blocks(ref b) if b.len() == 1));
    }

    #[test]
    fn test_exclusion_reasons() {
        let mut doc = SourceDocument::new("faq-1", DocType::Faq, "Q", "A".into());
        assert_eq!(doc.exclusion_reason(), None);

        doc.status = Some("published".into());
        assert_eq!(doc.exclusion_reason(), None);
        doc.status = Some("draft".into());
        assert_eq!(doc.exclusion_reason(), Some("unpublished"));
        doc.status = Some("Archived".into());
        assert_eq!(doc.exclusion_reason(), Some("unpublished"));

        // Event workflow statuses are still live
        for status in ["open", "full", "scheduled"] {
            doc.status = Some(status.into());
            assert_eq!(doc.exclusion_reason(), None, "{}", status);
        }

        doc.status = None;
        doc.include_in_ai = Some(false);
        assert_eq!(doc.exclusion_reason(), Some("opted out"));

        doc.include_in_ai = None;
        doc.is_active = false;
        assert_eq!(doc.exclusion_reason(), Some("inactive"));
    }
}
