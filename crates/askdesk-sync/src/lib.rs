//! AskDesk Sync — content sources and the synchronizer that keeps the store
//! consistent with them.

pub mod content;
pub mod source;
pub mod sources;
pub mod synchronizer;

pub use source::{Body, ContentSource, SourceDocument};
pub use sources::{JsonDirSource, MemorySource, SanitySource};
pub use synchronizer::{SyncFailure, SyncOptions, SyncReport, SyncScope, Synchronizer};
