//! Shipped `ContentSource` implementations.

pub mod json_dir;
pub mod memory;
pub mod sanity;

pub use json_dir::JsonDirSource;
pub use memory::MemorySource;
pub use sanity::SanitySource;
