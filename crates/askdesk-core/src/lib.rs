//! AskDesk Core — error type, configuration, and clock helpers shared by every crate.

pub mod config;
pub mod error;

pub use config::{
    AskDeskConfig, ChatLimits, DataPaths, EmbeddingConfig, SearchDefaults, SyncSettings,
};
pub use error::{Error, Result};

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
