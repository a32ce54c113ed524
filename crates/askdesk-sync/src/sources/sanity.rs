//! Sanity CMS content source over the GROQ HTTP query API.
//!
//! Each document type maps to a Sanity schema name; the GROQ projection
//! renames fields to the `SourceDocument` shape so rows deserialize directly.

use std::time::Duration;

use askdesk_core::{Error, Result, SyncSettings};
use askdesk_store::DocType;
use async_trait::async_trait;
use tracing::debug;

use crate::source::{ContentSource, SourceDocument};

const API_VERSION: &str = "v2021-10-21";

const PROJECTION: &str = r#"{
  "id": _id,
  "schema": _type,
  "title": coalesce(title, question, name, ""),
  "body": coalesce(extractedText, body, answer, content, bio, description, ""),
  "tags": coalesce(tags, []),
  category,
  "isActive": coalesce(isActive, true),
  status,
  includeInAi,
  priority,
  "slug": slug.current,
  "updatedAt": _updatedAt,
  publishedAt
}"#;

pub struct SanitySource {
    client: reqwest::Client,
    project_id: String,
    dataset: String,
    token: Option<String>,
}

impl SanitySource {
    pub fn new(
        project_id: impl Into<String>,
        dataset: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            client,
            project_id: project_id.into(),
            dataset: dataset.into(),
            token,
        })
    }

    /// Build from sync settings; `None` when no project is configured.
    pub fn from_settings(settings: &SyncSettings) -> Result<Option<Self>> {
        match &settings.sanity_project_id {
            Some(project) if !project.is_empty() => Ok(Some(Self::new(
                project.clone(),
                settings.sanity_dataset.clone(),
                settings.sanity_token.clone(),
                Duration::from_secs(settings.fetch_timeout_secs),
            )?)),
            _ => Ok(None),
        }
    }

    /// Sanity schema name for a document type.
    pub fn schema_name(doc_type: DocType) -> &'static str {
        match doc_type {
            DocType::Blog => "post",
            DocType::Event => "event",
            DocType::Faq => "faq",
            DocType::Instructor => "instructor",
            DocType::Knowledge => "aiKnowledge",
        }
    }

    /// Front-end path for a document, derived from its slug.
    pub fn url_for(doc_type: DocType, id: &str, slug: Option<&str>) -> String {
        match (doc_type, slug) {
            (DocType::Blog, Some(s)) => format!("/blog/{}", s),
            (DocType::Event, Some(s)) => format!("/events/{}", s),
            (DocType::Instructor, Some(s)) => format!("/instructors/{}", s),
            (DocType::Faq, _) => format!("/faq#{}", id),
            _ => String::new(),
        }
    }

    fn query_url(&self) -> String {
        format!(
            "https://{}.api.sanity.io/{}/data/query/{}",
            self.project_id, API_VERSION, self.dataset
        )
    }

    async fn run_query(&self, groq: &str, params: &[(&str, String)]) -> Result<serde_json::Value> {
        let mut query: Vec<(String, String)> = vec![("query".into(), groq.to_string())];
        for (name, value) in params {
            // GROQ parameters are JSON-encoded and prefixed with `$`.
            query.push((format!("${}", name), serde_json::to_string(value)?));
        }

        let mut request = self.client.get(self.query_url()).query(&query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Provider(format!("sanity request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!("sanity query error {}: {}", status, text)));
        }

        let mut json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("invalid sanity response: {}", e)))?;
        Ok(json
            .get_mut("result")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }
}

/// Convert one projected row into a `SourceDocument`.
fn row_to_document(
    mut row: serde_json::Value,
    fallback_type: Option<DocType>,
) -> Result<SourceDocument> {
    let obj = row
        .as_object_mut()
        .ok_or_else(|| Error::Provider("sanity row is not an object".into()))?;

    let schema = obj
        .remove("schema")
        .and_then(|s| s.as_str().map(str::to_string));
    let doc_type = match (schema.as_deref().map(str::parse::<DocType>), fallback_type) {
        (Some(Ok(t)), _) => t,
        (_, Some(t)) => t,
        (Some(Err(e)), None) => return Err(e),
        (None, None) => return Err(Error::Provider("sanity row has no _type".into())),
    };

    let slug = obj
        .remove("slug")
        .and_then(|s| s.as_str().map(str::to_string));
    let id = obj
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    // Drop nulls so serde defaults apply.
    obj.retain(|_, v| !v.is_null());
    obj.insert("type".into(), serde_json::Value::String(doc_type.to_string()));
    obj.insert(
        "url".into(),
        serde_json::Value::String(SanitySource::url_for(doc_type, &id, slug.as_deref())),
    );

    Ok(serde_json::from_value(row)?)
}

#[async_trait]
impl ContentSource for SanitySource {
    fn source_name(&self) -> &str {
        "sanity"
    }

    async fn fetch_by_type(&self, doc_type: DocType) -> Result<Vec<SourceDocument>> {
        let groq = format!(
            "*[_type == $schema && !(_id in path(\"drafts.**\"))] | order(_id asc) {}",
            PROJECTION
        );
        let result = self
            .run_query(&groq, &[("schema", Self::schema_name(doc_type).to_string())])
            .await?;

        let rows = match result {
            serde_json::Value::Array(rows) => rows,
            serde_json::Value::Null => Vec::new(),
            _ => return Err(Error::Provider("sanity result is not an array".into())),
        };
        let docs = rows
            .into_iter()
            .map(|row| row_to_document(row, Some(doc_type)))
            .collect::<Result<Vec<_>>>()?;
        debug!("Fetched {} {} documents from sanity", docs.len(), doc_type);
        Ok(docs)
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<SourceDocument>> {
        let groq = format!("*[_id == $id][0] {}", PROJECTION);
        match self.run_query(&groq, &[("id", id.to_string())]).await? {
            serde_json::Value::Null => Ok(None),
            row => row_to_document(row, None).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_to_document() {
        let row = json!({
            "id": "post-abc",
            "schema": "post",
            "title": "Spring classes",
            "body": [{ "_type": "block", "children": [{ "text": "New schedule" }] }],
            "tags": ["news"],
            "category": null,
            "isActive": true,
            "slug": "spring-classes",
            "updatedAt": "2024-03-01T00:00:00Z"
        });
        let doc = row_to_document(row, None).unwrap();
        assert_eq!(doc.doc_type, DocType::Blog);
        assert_eq!(doc.url, "/blog/spring-classes");
        assert_eq!(doc.category, None);
        assert_eq!(doc.updated_at.as_deref(), Some("2024-03-01T00:00:00Z"));
        assert!(!doc.extra.contains_key("slug"));
    }

    #[test]
    fn test_row_type_fallback_and_unknown_schema() {
        let doc = row_to_document(
            json!({ "id": "faq-9", "title": "Q", "body": "A" }),
            Some(DocType::Faq),
        )
        .unwrap();
        assert_eq!(doc.url, "/faq#faq-9");

        let err = row_to_document(json!({ "id": "x", "schema": "page" }), None);
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_from_settings_requires_project() {
        let settings = SyncSettings::default();
        assert!(SanitySource::from_settings(&settings).unwrap().is_none());

        let configured = SyncSettings {
            sanity_project_id: Some("abc123".into()),
            ..Default::default()
        };
        let source = SanitySource::from_settings(&configured).unwrap().unwrap();
        assert_eq!(
            source.query_url(),
            "https://abc123.api.sanity.io/v2021-10-21/data/query/production"
        );
    }
}
