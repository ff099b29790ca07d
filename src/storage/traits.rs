//! Cache trait definitions

use std::path::Path;
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Result type for cache operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A store of encoded stage artifacts keyed by `(stage, fingerprint)`.
///
/// The fingerprint is derived from the configuration that produced the
/// artifact, so a configuration change never serves a stale entry.
/// Implementations must be thread-safe (Send + Sync).
pub trait ArtifactCache: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Load the payload for a key, if present.
    fn load(&self, stage: &str, fingerprint: &str) -> StorageResult<Option<String>>;

    /// Store (or replace) the payload for a key.
    fn store(&self, stage: &str, fingerprint: &str, payload: &str) -> StorageResult<()>;

    /// Remove the entry for a key; returns whether one existed.
    fn invalidate(&self, stage: &str, fingerprint: &str) -> StorageResult<bool>;
}

/// Extension trait for opening caches from paths
pub trait OpenCache: ArtifactCache + Sized {
    /// Open or create a cache at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;
}

/// A cache that never holds anything. Every lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl ArtifactCache for NoCache {
    fn name(&self) -> &'static str {
        "none"
    }

    fn load(&self, _stage: &str, _fingerprint: &str) -> StorageResult<Option<String>> {
        Ok(None)
    }

    fn store(&self, _stage: &str, _fingerprint: &str, _payload: &str) -> StorageResult<()> {
        Ok(())
    }

    fn invalidate(&self, _stage: &str, _fingerprint: &str) -> StorageResult<bool> {
        Ok(false)
    }
}
