//! Artifact caches for pipeline stages
//!
//! Stage outputs are cached through the `ArtifactCache` trait, keyed by
//! stage name and a fingerprint of the configuration that produced them.
//! Backends: a directory of JSON files, SQLite, and an in-memory map.

mod cache;
mod files;
mod memory;
mod sqlite;
mod traits;

pub use cache::{fingerprint, get_or_compute, get_or_compute_checked, lookup, save, CacheOutcome};
pub use files::FileCache;
pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
pub use traits::{ArtifactCache, NoCache, OpenCache, StorageError, StorageResult};
