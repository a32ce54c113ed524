//! Canonical text construction and content hashing.

use sha2::{Digest, Sha256};

use crate::source::{Body, SourceDocument};
use askdesk_store::RecordMetadata;

/// Flatten portable-text style blocks into plain text, one line per block.
///
/// Text blocks contribute the concatenation of their `children[].text` spans;
/// bare strings and objects with a `text` field are taken as-is; anything else
/// (images, embeds) is dropped.
pub fn flatten_blocks(blocks: &[serde_json::Value]) -> String {
    let mut lines = Vec::new();
    for block in blocks {
        let line = match block {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(obj) => {
                if let Some(children) = obj.get("children").and_then(|c| c.as_array()) {
                    children
                        .iter()
                        .filter_map(|span| span.get("text").and_then(|t| t.as_str()))
                        .collect::<String>()
                } else if let Some(text) = obj.get("text").and_then(|t| t.as_str()) {
                    text.to_string()
                } else {
                    continue;
                }
            }
            _ => continue,
        };
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines.join("\n")
}

/// Plain text of a body, trimmed.
pub fn body_text(body: &Body) -> String {
    match body {
        Body::Text(text) => text.trim().to_string(),
        Body::Blocks(blocks) => flatten_blocks(blocks),
    }
}

/// Canonical record content: title, category, tags, then the body text.
/// Returns `None` when the body has no extractable text.
pub fn build_content(doc: &SourceDocument) -> Option<String> {
    let body = body_text(&doc.body);
    if body.is_empty() {
        return None;
    }

    let mut parts = Vec::new();
    let title = doc.title.trim();
    if !title.is_empty() {
        parts.push(title.to_string());
    }
    if let Some(category) = doc.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        parts.push(format!("Category: {}", category));
    }
    if !doc.tags.is_empty() {
        parts.push(format!("Tags: {}", doc.tags.join(", ")));
    }
    parts.push(body);
    Some(parts.join("\n"))
}

/// SHA-256 hex digest of the canonical content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Record metadata carried over from the source document.
pub fn build_metadata(doc: &SourceDocument) -> RecordMetadata {
    RecordMetadata {
        category: doc.category.clone(),
        tags: doc.tags.clone(),
        priority: doc.priority,
        status: doc.status.clone(),
        source_updated_at: doc.updated_at.clone(),
        published_at: doc.published_at.clone(),
        extra: doc.extra.clone(),
    }
}
