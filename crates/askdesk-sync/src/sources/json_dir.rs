//! Content source over a directory of CMS JSON exports.
//!
//! Layout: one `<type>.json` file per document type (`faq.json`,
//! `event.json`, ...), each holding a JSON array of documents. A document
//! without a `type` field takes the type of its file.

use std::path::{Path, PathBuf};

use askdesk_core::{Error, Result};
use askdesk_store::DocType;
use async_trait::async_trait;
use tracing::debug;

use crate::source::{ContentSource, SourceDocument};

pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn export_path(&self, doc_type: DocType) -> PathBuf {
        self.dir.join(format!("{}.json", doc_type))
    }
}

#[async_trait]
impl ContentSource for JsonDirSource {
    fn source_name(&self) -> &str {
        "json-dir"
    }

    /// A missing export file is an error, not an empty set: treating it as
    /// empty would delete every stored record of that type.
    async fn fetch_by_type(&self, doc_type: DocType) -> Result<Vec<SourceDocument>> {
        let path = self.export_path(doc_type);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("no export at {}", path.display())));
            }
            Err(e) => return Err(e.into()),
        };

        let rows: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
        let mut docs = Vec::with_capacity(rows.len());
        for mut row in rows {
            if let Some(obj) = row.as_object_mut() {
                obj.entry("type")
                    .or_insert_with(|| serde_json::Value::String(doc_type.to_string()));
            }
            let doc: SourceDocument = serde_json::from_value(row)?;
            if doc.doc_type == doc_type {
                docs.push(doc);
            }
        }
        debug!("Read {} {} documents from {}", docs.len(), doc_type, path.display());
        Ok(docs)
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<SourceDocument>> {
        for &doc_type in DocType::all() {
            let docs = match self.fetch_by_type(doc_type).await {
                Ok(docs) => docs,
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if let Some(doc) = docs.into_iter().find(|d| d.id == id) {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_typed_exports() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("faq.json"),
            r#"[
                {"id": "faq-1", "title": "Price", "body": "料金は5000円です"},
                {"_id": "faq-2", "title": "Trial", "extractedText": "無料体験あります", "isActive": false}
            ]"#,
        )
        .unwrap();

        let source = JsonDirSource::new(dir.path());
        let faqs = source.fetch_by_type(DocType::Faq).await.unwrap();
        assert_eq!(faqs.len(), 2);
        assert_eq!(faqs[0].doc_type, DocType::Faq);
        assert!(!faqs[1].is_active);

        let found = source.fetch_by_id("faq-2").await.unwrap().unwrap();
        assert_eq!(found.title, "Trial");
        assert!(source.fetch_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_export_is_not_found() {
        let dir = TempDir::new().unwrap();
        let source = JsonDirSource::new(dir.path());
        assert!(matches!(
            source.fetch_by_type(DocType::Event).await,
            Err(Error::NotFound(_))
        ));
    }
}
