//! In-process cache backend

use super::traits::{ArtifactCache, StorageResult};
use dashmap::DashMap;

/// Cache held in a concurrent map; gone when the process exits.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<(String, String), String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ArtifactCache for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self, stage: &str, fingerprint: &str) -> StorageResult<Option<String>> {
        Ok(self
            .entries
            .get(&(stage.to_string(), fingerprint.to_string()))
            .map(|entry| entry.value().clone()))
    }

    fn store(&self, stage: &str, fingerprint: &str, payload: &str) -> StorageResult<()> {
        self.entries
            .insert((stage.to_string(), fingerprint.to_string()), payload.to_string());
        Ok(())
    }

    fn invalidate(&self, stage: &str, fingerprint: &str) -> StorageResult<bool> {
        Ok(self
            .entries
            .remove(&(stage.to_string(), fingerprint.to_string()))
            .is_some())
    }
}
