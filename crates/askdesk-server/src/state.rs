//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use askdesk_chat::{ChatOrchestrator, ChatSettings, CompletionProvider, LLMConfig};
use askdesk_core::{AskDeskConfig, Result};
use askdesk_infer::{create_embedder, CachedEmbedder, Embedder, QueryCache};
use askdesk_resolve::HybridSearch;
use askdesk_session::{RateLimiter, SessionManager};
use askdesk_store::SqliteStore;
use askdesk_sync::{ContentSource, JsonDirSource, SanitySource, SyncOptions, Synchronizer};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// How often idle sessions are looked for.
const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: AskDeskConfig,
    pub store: Arc<SqliteStore>,
    pub search: Arc<HybridSearch>,
    pub chat: ChatOrchestrator,
    pub synchronizer: Synchronizer,
    /// Sync runs are serialized; a second trigger waits for the first.
    pub sync_lock: Mutex<()>,
    /// Embedding backend name reported by the stats endpoint.
    pub embedder_model: String,
}

impl AppState {
    /// Wire every component from explicit parts.
    pub fn new(
        config: AskDeskConfig,
        store: Arc<SqliteStore>,
        embedder: Arc<dyn Embedder>,
        source: Arc<dyn ContentSource>,
        llm: Option<Arc<dyn CompletionProvider>>,
    ) -> Self {
        let embedder_model = embedder.model_name().to_string();
        let embed_timeout = config.embedding.timeout();

        let query_embedder: Arc<dyn Embedder> =
            Arc::new(CachedEmbedder::new(embedder.clone(), QueryCache::default_cache()));
        let search = Arc::new(HybridSearch::new(store.clone(), query_embedder, embed_timeout));

        let chat = ChatOrchestrator::new(
            Arc::new(SessionManager::new()),
            Arc::new(RateLimiter::new()),
            search.clone(),
            llm,
            ChatSettings::from_config(&config.chat, config.search),
        );

        let synchronizer = Synchronizer::new(
            store.clone(),
            embedder,
            source,
            SyncOptions::from_config(&config),
        );

        Self {
            config,
            store,
            search,
            chat,
            synchronizer,
            sync_lock: Mutex::new(()),
            embedder_model,
        }
    }

    /// Build the production state: SQLite store, configured embedder, Sanity
    /// when a project is set (JSON exports otherwise), and the LLM from env.
    pub fn from_config(config: AskDeskConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(
            &config.data_paths.vectordb,
            config.embedding.dimension,
        )?);
        let embedder = create_embedder(&config.embedding)?;

        let source: Arc<dyn ContentSource> = match SanitySource::from_settings(&config.sync)? {
            Some(sanity) => Arc::new(sanity),
            None => {
                info!(
                    "No Sanity project configured; reading exports from {}",
                    config.data_paths.content.display()
                );
                Arc::new(JsonDirSource::new(&config.data_paths.content))
            }
        };

        let llm = LLMConfig::from_env().create_provider(config.chat.llm_timeout());
        if llm.is_none() {
            warn!("No LLM API key configured; chat requests will fail until one is set");
        }

        Ok(Self::new(config, store, embedder, source, llm))
    }

    /// Remove idle sessions and their rate-limit windows; returns how many were removed.
    pub fn reap_sessions(&self) -> usize {
        let reaped = self.chat.sessions().reap_idle(self.config.chat.session_ttl());
        for id in &reaped {
            self.chat.limiter().clear(id);
        }
        reaped.len()
    }
}

/// Start the background task that expires idle sessions.
pub fn spawn_session_reaper(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REAP_INTERVAL);
        loop {
            interval.tick().await;
            let reaped = state.reap_sessions();
            if reaped > 0 {
                info!("Expired {} idle sessions", reaped);
            }
        }
    })
}
