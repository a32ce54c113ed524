//! Configuration and data directory management.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Paths to all AskDesk data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Vector database directory (`data/vectordb/`).
    pub vectordb: PathBuf,
    /// Default location of CMS JSON exports (`data/content/`).
    pub content: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            vectordb: root.join("vectordb"),
            content: root.join("content"),
            root,
        };
        std::fs::create_dir_all(&paths.vectordb)?;
        Ok(paths)
    }
}

/// Which embedding backend to construct and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// `"hash"` (local, deterministic) or `"openai"` (any OpenAI-compatible API).
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    /// Per-call timeout applied to every embedding request.
    pub timeout_secs: u64,
    pub max_retries: usize,
    /// Inputs longer than this are cut before embedding (content itself is kept whole).
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hash".into(),
            model: "text-embedding-3-small".into(),
            dimension: 384,
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            timeout_secs: 20,
            max_retries: 3,
            max_input_chars: 8000,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Shipped hybrid search defaults. Tuned empirically; every field is overridable per request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchDefaults {
    pub top_k: usize,
    pub threshold: f64,
    pub vector_weight: f64,
    pub text_weight: f64,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            top_k: 30,
            threshold: 0.03,
            vector_weight: 0.7,
            text_weight: 0.3,
        }
    }
}

/// Limits applied by the session layer and chat orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatLimits {
    /// Requests allowed per session per 60-second window.
    pub rate_limit: usize,
    pub session_ttl_secs: u64,
    /// Number of most recent messages replayed into each prompt.
    pub history_window: usize,
    /// Number of retrieved records placed into the prompt.
    pub context_records: usize,
    pub max_message_chars: usize,
    pub llm_timeout_secs: u64,
}

impl Default for ChatLimits {
    fn default() -> Self {
        Self {
            rate_limit: 30,
            session_ttl_secs: 1800,
            history_window: 10,
            context_records: 5,
            max_message_chars: 2000,
            llm_timeout_secs: 60,
        }
    }
}

impl ChatLimits {
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

/// Settings for the content synchronizer and its trigger endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Shared secret expected in the `x-sync-secret` header. `None` disables the endpoint.
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    /// Consecutive provider failures (with no success yet) that abort a run.
    pub outage_threshold: usize,
    pub fetch_timeout_secs: u64,
    pub sanity_project_id: Option<String>,
    pub sanity_dataset: String,
    #[serde(skip_serializing)]
    pub sanity_token: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            secret: None,
            outage_threshold: 3,
            fetch_timeout_secs: 30,
            sanity_project_id: None,
            sanity_dataset: "production".into(),
            sanity_token: None,
        }
    }
}

/// Top-level AskDesk configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskDeskConfig {
    /// HTTP server port.
    pub port: u16,
    pub data_paths: DataPaths,
    pub embedding: EmbeddingConfig,
    pub search: SearchDefaults,
    pub chat: ChatLimits,
    pub sync: SyncSettings,
}

impl AskDeskConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::from_lookup(data_dir, |key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(data_dir: impl AsRef<Path>, lookup: F) -> std::io::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut data_paths = DataPaths::new(data_dir)?;
        if let Some(dir) = lookup("ASKDESK_CONTENT_DIR") {
            data_paths.content = PathBuf::from(dir);
        }

        let emb_defaults = EmbeddingConfig::default();
        let embedding = EmbeddingConfig {
            provider: lookup("ASKDESK_EMBEDDING_PROVIDER").unwrap_or(emb_defaults.provider),
            model: lookup("ASKDESK_EMBEDDING_MODEL").unwrap_or(emb_defaults.model),
            dimension: parse_or(&lookup, "ASKDESK_EMBEDDING_DIM", emb_defaults.dimension),
            api_key: lookup("OPENAI_API_KEY"),
            base_url: lookup("OPENAI_BASE_URL").unwrap_or(emb_defaults.base_url),
            timeout_secs: parse_or(
                &lookup,
                "ASKDESK_PROVIDER_TIMEOUT_SECS",
                emb_defaults.timeout_secs,
            ),
            max_retries: parse_or(&lookup, "ASKDESK_EMBEDDING_RETRIES", emb_defaults.max_retries),
            max_input_chars: parse_or(
                &lookup,
                "ASKDESK_EMBEDDING_MAX_CHARS",
                emb_defaults.max_input_chars,
            ),
        };

        let search_defaults = SearchDefaults::default();
        let vector_weight = parse_or(
            &lookup,
            "ASKDESK_VECTOR_WEIGHT",
            search_defaults.vector_weight,
        )
        .clamp(0.0, 1.0);
        let search = SearchDefaults {
            top_k: parse_or(&lookup, "ASKDESK_SEARCH_TOP_K", search_defaults.top_k),
            threshold: parse_or(&lookup, "ASKDESK_SEARCH_THRESHOLD", search_defaults.threshold),
            vector_weight,
            text_weight: 1.0 - vector_weight,
        };

        let chat_defaults = ChatLimits::default();
        let chat = ChatLimits {
            rate_limit: parse_or(&lookup, "ASKDESK_RATE_LIMIT", chat_defaults.rate_limit),
            session_ttl_secs: parse_or(
                &lookup,
                "ASKDESK_SESSION_TTL_SECS",
                chat_defaults.session_ttl_secs,
            ),
            history_window: parse_or(
                &lookup,
                "ASKDESK_HISTORY_WINDOW",
                chat_defaults.history_window,
            ),
            context_records: parse_or(
                &lookup,
                "ASKDESK_CONTEXT_RECORDS",
                chat_defaults.context_records,
            ),
            max_message_chars: chat_defaults.max_message_chars,
            llm_timeout_secs: parse_or(
                &lookup,
                "ASKDESK_LLM_TIMEOUT_SECS",
                chat_defaults.llm_timeout_secs,
            ),
        };

        let sync_defaults = SyncSettings::default();
        let sync = SyncSettings {
            secret: lookup("ASKDESK_SYNC_SECRET").filter(|s| !s.is_empty()),
            outage_threshold: sync_defaults.outage_threshold,
            fetch_timeout_secs: sync_defaults.fetch_timeout_secs,
            sanity_project_id: lookup("SANITY_PROJECT_ID"),
            sanity_dataset: lookup("SANITY_DATASET").unwrap_or(sync_defaults.sanity_dataset),
            sanity_token: lookup("SANITY_TOKEN"),
        };

        Ok(Self {
            port: parse_or(&lookup, "PORT", 3003),
            data_paths,
            embedding,
            search,
            chat,
            sync,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!("Ignoring unparsable {}={:?}", key, raw);
                default
            }
        },
        None => default,
    }
}
