//! In-process content source.

use std::collections::BTreeMap;

use askdesk_core::Result;
use askdesk_store::DocType;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::source::{ContentSource, SourceDocument};

/// Documents held in memory, keyed by id. Fetches return them in id order.
#[derive(Default)]
pub struct MemorySource {
    docs: RwLock<BTreeMap<String, SourceDocument>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(docs: impl IntoIterator<Item = SourceDocument>) -> Self {
        let source = Self::new();
        for doc in docs {
            source.upsert(doc);
        }
        source
    }

    pub fn upsert(&self, doc: SourceDocument) {
        self.docs.write().insert(doc.id.clone(), doc);
    }

    pub fn remove(&self, id: &str) -> Option<SourceDocument> {
        self.docs.write().remove(id)
    }

    /// Apply `f` to the stored document, if present.
    pub fn update<F: FnOnce(&mut SourceDocument)>(&self, id: &str, f: F) -> bool {
        match self.docs.write().get_mut(id) {
            Some(doc) => {
                f(doc);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    fn source_name(&self) -> &str {
        "memory"
    }

    async fn fetch_by_type(&self, doc_type: DocType) -> Result<Vec<SourceDocument>> {
        Ok(self
            .docs
            .read()
            .values()
            .filter(|d| d.doc_type == doc_type)
            .cloned()
            .collect())
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<SourceDocument>> {
        Ok(self.docs.read().get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_by_type_and_id() {
        let source = MemorySource::with_documents(vec![
            SourceDocument::new("faq-2", DocType::Faq, "B", "b".into()),
            SourceDocument::new("faq-1", DocType::Faq, "A", "a".into()),
            SourceDocument::new("evt-1", DocType::Event, "E", "e".into()),
        ]);

        let faqs = source.fetch_by_type(DocType::Faq).await.unwrap();
        assert_eq!(faqs.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["faq-1", "faq-2"]);
        assert!(source.fetch_by_id("evt-1").await.unwrap().is_some());

        assert!(source.update("evt-1", |d| d.is_active = false));
        assert!(!source.fetch_by_id("evt-1").await.unwrap().unwrap().is_active);
        source.remove("evt-1");
        assert!(source.fetch_by_id("evt-1").await.unwrap().is_none());
        assert_eq!(source.len(), 2);
    }
}
