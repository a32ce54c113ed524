//! Store synchronizer: source → content → hash diff → embed → upsert/delete.
//!
//! Runs are not transactional across documents. A failing document is
//! recorded and the run continues; only a provider that fails every one of
//! the first `outage_threshold` embedding attempts aborts the run.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use askdesk_core::{now_millis, AskDeskConfig, Error, Result};
use askdesk_infer::Embedder;
use askdesk_store::lexical::build_search_text;
use askdesk_store::{DocType, EmbeddingRecord, RecordFilter, SqliteStore};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::content::{build_content, build_metadata, content_hash};
use crate::source::{ContentSource, SourceDocument};

/// Which document types a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScope {
    All,
    Type(DocType),
}

impl SyncScope {
    pub fn types(&self) -> Vec<DocType> {
        match self {
            SyncScope::All => DocType::all().to_vec(),
            SyncScope::Type(t) => vec![*t],
        }
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncScope::All => f.write_str("all"),
            SyncScope::Type(t) => write!(f, "{}", t),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub embed_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Consecutive provider failures, with no success yet in the run, that abort it.
    pub outage_threshold: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            embed_timeout: Duration::from_secs(20),
            fetch_timeout: Duration::from_secs(30),
            outage_threshold: 3,
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &AskDeskConfig) -> Self {
        Self {
            embed_timeout: config.embedding.timeout(),
            fetch_timeout: Duration::from_secs(config.sync.fetch_timeout_secs),
            outage_threshold: config.sync.outage_threshold.max(1),
        }
    }
}

/// A document (or a whole type fetch, when `id` is `None`) that failed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub id: Option<String>,
    pub doc_type: DocType,
    pub error: String,
}

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub source: String,
    pub scope: String,
    pub fetched: usize,
    /// New or changed documents embedded and upserted.
    pub embedded: usize,
    pub unchanged: usize,
    pub metadata_updated: usize,
    /// Excluded documents whose stored record was removed.
    pub deleted: usize,
    /// Stored records whose id no longer exists in the source.
    pub orphans_deleted: usize,
    /// Excluded documents that had no stored record.
    pub skipped: usize,
    pub failures: Vec<SyncFailure>,
    pub duration_ms: u64,
}

impl SyncReport {
    fn new(source: &str, scope: impl fmt::Display) -> Self {
        Self {
            source: source.to_string(),
            scope: scope.to_string(),
            ..Default::default()
        }
    }

    /// Some documents failed but the run completed.
    pub fn is_partial_failure(&self) -> bool {
        !self.failures.is_empty()
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Embedded => self.embedded += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::MetadataUpdated => self.metadata_updated += 1,
            Outcome::Deleted => self.deleted += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }

    fn fail(&mut self, id: Option<&str>, doc_type: DocType, error: &Error) {
        self.failures.push(SyncFailure {
            id: id.map(str::to_string),
            doc_type,
            error: error.to_string(),
        });
    }
}

/// Tracks whether the embedding provider looks entirely unreachable.
struct OutageGuard {
    threshold: usize,
    consecutive: usize,
    any_success: bool,
}

impl OutageGuard {
    fn new(threshold: usize) -> Self {
        Self {
            threshold,
            consecutive: 0,
            any_success: false,
        }
    }

    fn success(&mut self) {
        self.any_success = true;
        self.consecutive = 0;
    }

    /// Record a provider failure; returns true when the run should abort.
    fn failure(&mut self) -> bool {
        self.consecutive += 1;
        !self.any_success && self.consecutive >= self.threshold
    }
}

enum Outcome {
    Embedded,
    Unchanged,
    MetadataUpdated,
    Deleted,
    Skipped,
}

pub struct Synchronizer {
    store: Arc<SqliteStore>,
    embedder: Arc<dyn Embedder>,
    source: Arc<dyn ContentSource>,
    options: SyncOptions,
}

impl Synchronizer {
    pub fn new(
        store: Arc<SqliteStore>,
        embedder: Arc<dyn Embedder>,
        source: Arc<dyn ContentSource>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            source,
            options,
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.source_name()
    }

    /// Reconcile the store with the source for every type in `scope`.
    pub async fn sync(&self, scope: SyncScope) -> Result<SyncReport> {
        let start = Instant::now();
        let mut report = SyncReport::new(self.source.source_name(), scope);
        let mut guard = OutageGuard::new(self.options.outage_threshold);

        for doc_type in scope.types() {
            self.sync_type(doc_type, &mut report, &mut guard).await?;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Sync [{}] {}: fetched={} embedded={} unchanged={} metadata={} deleted={} orphans={} failures={} ({}ms)",
            report.source,
            report.scope,
            report.fetched,
            report.embedded,
            report.unchanged,
            report.metadata_updated,
            report.deleted,
            report.orphans_deleted,
            report.failures.len(),
            report.duration_ms
        );
        Ok(report)
    }

    /// Refresh a single document by id; a document the source no longer has is deleted.
    pub async fn sync_document(&self, id: &str) -> Result<SyncReport> {
        let start = Instant::now();
        let mut report = SyncReport::new(self.source.source_name(), id);
        let mut guard = OutageGuard::new(self.options.outage_threshold);

        let fetched = tokio::time::timeout(self.options.fetch_timeout, self.source.fetch_by_id(id))
            .await
            .map_err(|_| Error::Provider(format!("fetch of {} timed out", id)))??;

        let existing = self.store.get(id)?;
        match fetched {
            None => {
                if self.store.delete(id)? {
                    report.deleted += 1;
                    info!("Deleted {} (gone from source)", id);
                }
            }
            Some(doc) => {
                report.fetched = 1;
                let doc_type = doc.doc_type;
                match self.process_document(&doc, existing.as_ref(), &mut guard).await {
                    Ok(outcome) => report.record(outcome),
                    Err(e @ Error::ProviderUnavailable(_)) => return Err(e),
                    Err(e) => {
                        warn!("Sync of {} failed: {}", id, e);
                        report.fail(Some(id), doc_type, &e);
                    }
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    async fn sync_type(
        &self,
        doc_type: DocType,
        report: &mut SyncReport,
        guard: &mut OutageGuard,
    ) -> Result<()> {
        let fetch = self.source.fetch_by_type(doc_type);
        let fetched = match tokio::time::timeout(self.options.fetch_timeout, fetch).await {
            Ok(Ok(docs)) => docs,
            Ok(Err(e)) => {
                warn!("Fetch of {} failed, skipping type: {}", doc_type, e);
                report.fail(None, doc_type, &e);
                return Ok(());
            }
            Err(_) => {
                let e = Error::Provider(format!("fetch of {} timed out", doc_type));
                warn!("{}", e);
                report.fail(None, doc_type, &e);
                return Ok(());
            }
        };
        report.fetched += fetched.len();

        let existing: HashMap<String, EmbeddingRecord> = self
            .store
            .query(&RecordFilter::by_type(doc_type))?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        let mut seen = HashSet::new();
        for doc in &fetched {
            if !seen.insert(doc.id.clone()) {
                warn!("Duplicate id {} in {} fetch, ignoring repeat", doc.id, doc_type);
                continue;
            }
            match self.process_document(doc, existing.get(&doc.id), guard).await {
                Ok(outcome) => report.record(outcome),
                Err(e @ Error::ProviderUnavailable(_)) => return Err(e),
                Err(e) => {
                    warn!("Sync of {} failed: {}", doc.id, e);
                    report.fail(Some(doc.id.as_str()), doc_type, &e);
                }
            }
        }

        for id in existing.keys().filter(|id| !seen.contains(*id)) {
            match self.store.delete(id) {
                Ok(true) => {
                    report.orphans_deleted += 1;
                    debug!("Deleted orphan {}", id);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Orphan delete of {} failed: {}", id, e);
                    report.fail(Some(id.as_str()), doc_type, &e);
                }
            }
        }
        Ok(())
    }

    async fn process_document(
        &self,
        doc: &SourceDocument,
        existing: Option<&EmbeddingRecord>,
        guard: &mut OutageGuard,
    ) -> Result<Outcome> {
        let content = match doc.exclusion_reason() {
            Some(reason) => {
                debug!("{} excluded: {}", doc.id, reason);
                None
            }
            None => {
                let content = build_content(doc);
                if content.is_none() {
                    debug!("{} excluded: empty text", doc.id);
                }
                content
            }
        };

        let content = match content {
            Some(c) => c,
            None => {
                return if existing.is_some() && self.store.delete(&doc.id)? {
                    Ok(Outcome::Deleted)
                } else {
                    Ok(Outcome::Skipped)
                };
            }
        };

        let hash = content_hash(&content);
        let metadata = build_metadata(doc);

        if let Some(current) = existing {
            if current.content_hash == hash && current.doc_type == doc.doc_type {
                if current.metadata == metadata && current.url == doc.url {
                    return Ok(Outcome::Unchanged);
                }
                self.store
                    .touch_metadata(&doc.id, &doc.url, &metadata, now_millis())?;
                debug!("{} metadata refreshed", doc.id);
                return Ok(Outcome::MetadataUpdated);
            }
        }

        let embedding = match self.embed(&content).await {
            Ok(v) => {
                guard.success();
                v
            }
            Err(e) if e.is_retryable() => {
                if guard.failure() {
                    return Err(Error::ProviderUnavailable(format!(
                        "{} consecutive embedding failures with no success, last: {}",
                        guard.consecutive, e
                    )));
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let record = EmbeddingRecord {
            id: doc.id.clone(),
            doc_type: doc.doc_type,
            title: doc.title.trim().to_string(),
            search_text: build_search_text(&content),
            content,
            url: doc.url.clone(),
            embedding,
            metadata,
            content_hash: hash,
            updated_at: now_millis(),
        };
        self.store.upsert(&record)?;
        debug!("{} embedded", doc.id);
        Ok(Outcome::Embedded)
    }

    async fn embed(&self, content: &str) -> Result<Vec<f32>> {
        tokio::time::timeout(self.options.embed_timeout, self.embedder.embed(content))
            .await
            .map_err(|_| {
                Error::Provider(format!(
                    "embedding timed out after {:?}",
                    self.options.embed_timeout
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MemorySource;
    use askdesk_infer::HashEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const DIM: usize = 64;

    /// Hash embedder that counts calls and fails on texts containing "boom".
    struct TestEmbedder {
        inner: HashEmbedder,
        calls: AtomicUsize,
        always_fail: bool,
    }

    impl TestEmbedder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: HashEmbedder::new(DIM),
                calls: AtomicUsize::new(0),
                always_fail: false,
            })
        }

        fn down() -> Arc<Self> {
            Arc::new(Self {
                inner: HashEmbedder::new(DIM),
                calls: AtomicUsize::new(0),
                always_fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for TestEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.always_fail || text.contains("boom") {
                return Err(Error::Provider("503 from embeddings API".into()));
            }
            Ok(self.inner.embed_sync(text))
        }
        fn dimension(&self) -> usize {
            DIM
        }
        fn model_name(&self) -> &str {
            "test"
        }
    }

    struct Fixture {
        store: Arc<SqliteStore>,
        source: Arc<MemorySource>,
        embedder: Arc<TestEmbedder>,
        sync: Synchronizer,
        _dir: TempDir,
    }

    fn fixture_with(embedder: Arc<TestEmbedder>, docs: Vec<SourceDocument>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path(), DIM).unwrap());
        let source = Arc::new(MemorySource::with_documents(docs));
        let sync = Synchronizer::new(
            store.clone(),
            embedder.clone(),
            source.clone(),
            SyncOptions::default(),
        );
        Fixture {
            store,
            source,
            embedder,
            sync,
            _dir: dir,
        }
    }

    fn fixture(docs: Vec<SourceDocument>) -> Fixture {
        fixture_with(TestEmbedder::new(), docs)
    }

    fn faq(id: &str, body: &str) -> SourceDocument {
        SourceDocument::new(id, DocType::Faq, format!("FAQ {}", id), body.into())
    }

    #[tokio::test]
    async fn test_event_lifecycle() {
        let mut evt = SourceDocument::new(
            "evt-1",
            DocType::Event,
            "Workshop A",
            "Hands-on pottery".into(),
        );
        evt.url = "/events/workshop-a".into();
        let f = fixture(vec![evt]);

        let report = f.sync.sync(SyncScope::All).await.unwrap();
        assert_eq!(report.embedded, 1);
        let rec = f.store.get("evt-1").unwrap().unwrap();
        assert_eq!(rec.embedding.len(), DIM);
        assert_eq!(rec.doc_type, DocType::Event);

        f.source.update("evt-1", |d| d.is_active = false);
        let report = f.sync.sync(SyncScope::All).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(f.store.get("evt-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_sync_is_idempotent() {
        let f = fixture(vec![
            faq("faq-1", "料金は5000円です"),
            faq("faq-2", "無料体験あります"),
            SourceDocument::new("blog-1", DocType::Blog, "News", "Spring schedule".into()),
        ]);

        f.sync.sync(SyncScope::All).await.unwrap();
        assert_eq!(f.embedder.calls(), 3);
        let before = f.store.query(&RecordFilter::default()).unwrap();

        let report = f.sync.sync(SyncScope::All).await.unwrap();
        assert_eq!(f.embedder.calls(), 3);
        assert_eq!(report.unchanged, 3);
        assert_eq!(report.embedded, 0);
        assert_eq!(f.store.query(&RecordFilter::default()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_metadata_change_skips_embedding() {
        let f = fixture(vec![faq("faq-1", "Parking is free")]);
        f.sync.sync(SyncScope::Type(DocType::Faq)).await.unwrap();

        f.source.update("faq-1", |d| {
            d.priority = Some(5);
            d.url = "/faq#parking".into();
        });
        let report = f.sync.sync(SyncScope::Type(DocType::Faq)).await.unwrap();
        assert_eq!(report.metadata_updated, 1);
        assert_eq!(f.embedder.calls(), 1);
        let rec = f.store.get("faq-1").unwrap().unwrap();
        assert_eq!(rec.metadata.priority, Some(5));
        assert_eq!(rec.url, "/faq#parking");
    }

    #[tokio::test]
    async fn test_content_change_reembeds() {
        let f = fixture(vec![faq("faq-1", "Parking is free")]);
        f.sync.sync(SyncScope::All).await.unwrap();
        let old_hash = f.store.get("faq-1").unwrap().unwrap().content_hash;

        f.source.update("faq-1", |d| d.body = "Parking costs 500 yen".into());
        let report = f.sync.sync(SyncScope::All).await.unwrap();
        assert_eq!(report.embedded, 1);
        assert_eq!(f.embedder.calls(), 2);
        let rec = f.store.get("faq-1").unwrap().unwrap();
        assert_ne!(rec.content_hash, old_hash);
        assert!(rec.search_text.contains("500"));
    }

    #[tokio::test]
    async fn test_exclusions_delete_existing_records() {
        let f = fixture(vec![
            faq("faq-1", "a"),
            faq("faq-2", "b"),
            faq("faq-3", "c"),
            faq("faq-4", "d"),
        ]);
        f.sync.sync(SyncScope::All).await.unwrap();
        assert_eq!(f.store.count().unwrap(), 4);

        f.source.update("faq-1", |d| d.status = Some("draft".into()));
        f.source.update("faq-2", |d| d.include_in_ai = Some(false));
        f.source.update("faq-3", |d| d.body = "   ".into());
        f.source.remove("faq-4");

        let report = f.sync.sync(SyncScope::All).await.unwrap();
        assert_eq!(report.deleted, 3);
        assert_eq!(report.orphans_deleted, 1);
        for id in ["faq-1", "faq-2", "faq-3", "faq-4"] {
            assert!(f.store.query(&RecordFilter::by_id(id)).unwrap().is_empty());
        }

        // Excluded documents with no stored record are plain skips
        let report = f.sync.sync(SyncScope::All).await.unwrap();
        assert_eq!(report.skipped, 3);
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn test_partial_failure_continues() {
        let f = fixture(vec![
            faq("faq-1", "fine"),
            faq("faq-2", "boom"),
            faq("faq-3", "also fine"),
        ]);
        let report = f.sync.sync(SyncScope::All).await.unwrap();
        assert!(report.is_partial_failure());
        assert_eq!(report.embedded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id.as_deref(), Some("faq-2"));
        assert!(f.store.get("faq-3").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_outage_aborts_early() {
        let docs = (1..=6).map(|i| faq(&format!("faq-{}", i), "text")).collect();
        let f = fixture_with(TestEmbedder::down(), docs);

        let err = f.sync.sync(SyncScope::All).await.unwrap_err();
        assert!(matches!(err, Error::ProviderUnavailable(_)));
        assert_eq!(f.embedder.calls(), 3);
    }

    #[tokio::test]
    async fn test_failures_after_a_success_do_not_abort() {
        let f = fixture(vec![
            faq("faq-1", "ok"),
            faq("faq-2", "boom"),
            faq("faq-3", "boom"),
            faq("faq-4", "boom"),
            faq("faq-5", "boom"),
        ]);
        let report = f.sync.sync(SyncScope::All).await.unwrap();
        assert_eq!(report.embedded, 1);
        assert_eq!(report.failures.len(), 4);
    }

    struct FailingEventsSource {
        inner: MemorySource,
    }

    #[async_trait]
    impl ContentSource for FailingEventsSource {
        fn source_name(&self) -> &str {
            "flaky"
        }
        async fn fetch_by_type(&self, doc_type: DocType) -> Result<Vec<SourceDocument>> {
            if doc_type == DocType::Event {
                return Err(Error::Provider("CMS timed out".into()));
            }
            self.inner.fetch_by_type(doc_type).await
        }
        async fn fetch_by_id(&self, id: &str) -> Result<Option<SourceDocument>> {
            self.inner.fetch_by_id(id).await
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_skips_reconciliation() {
        let f = fixture(vec![
            SourceDocument::new("evt-1", DocType::Event, "Workshop", "pottery".into()),
            faq("faq-1", "answer"),
        ]);
        f.sync.sync(SyncScope::All).await.unwrap();

        let flaky = Synchronizer::new(
            f.store.clone(),
            f.embedder.clone(),
            Arc::new(FailingEventsSource {
                inner: MemorySource::with_documents(vec![faq("faq-1", "answer")]),
            }),
            SyncOptions::default(),
        );
        let report = flaky.sync(SyncScope::All).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].id.is_none());
        assert_eq!(report.failures[0].doc_type, DocType::Event);
        assert!(f.store.get("evt-1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sync_document() {
        let f = fixture(vec![faq("faq-1", "answer")]);
        let report = f.sync.sync_document("faq-1").await.unwrap();
        assert_eq!(report.embedded, 1);
        assert!(f.store.get("faq-1").unwrap().is_some());

        f.source.remove("faq-1");
        let report = f.sync.sync_document("faq-1").await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(f.store.get("faq-1").unwrap().is_none());
    }

    struct SlowEmbedder;

    #[async_trait]
    impl Embedder for SlowEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![0.0; DIM])
        }
        fn dimension(&self) -> usize {
            DIM
        }
        fn model_name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_embedding_timeout_is_a_document_failure() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path(), DIM).unwrap());
        let sync = Synchronizer::new(
            store.clone(),
            Arc::new(SlowEmbedder),
            Arc::new(MemorySource::with_documents(vec![faq("faq-1", "answer")])),
            SyncOptions {
                embed_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );
        let report = sync.sync(SyncScope::Type(DocType::Faq)).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].error.contains("timed out"));
        assert_eq!(store.count().unwrap(), 0);
    }
}
