//! Config-keyed memoization of pipeline stages

use super::traits::{ArtifactCache, StorageResult};
use crate::artifact::{Artifact, ArtifactResult};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

/// How a stage result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    /// Served from the cache
    Hit,
    /// Nothing cached; computed
    Miss,
    /// A cached entry was malformed or stale; recomputed
    Recomputed,
}

/// Fingerprint a stage: UUIDv5 over its settings as JSON, chained with
/// the upstream stage's fingerprint.
///
/// Changing any upstream setting changes every downstream fingerprint.
pub fn fingerprint<T: Serialize>(settings: &T, upstream: Option<&str>) -> StorageResult<String> {
    let mut material = upstream.unwrap_or("").as_bytes().to_vec();
    material.push(b'\n');
    material.extend(serde_json::to_vec(settings)?);
    Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, &material).to_string())
}

/// Return the cached artifact for `(stage, fingerprint)` or compute and store it.
pub fn get_or_compute<A, E, F>(
    cache: &dyn ArtifactCache,
    stage: &str,
    fingerprint: &str,
    compute: F,
) -> Result<(A, CacheOutcome), E>
where
    A: Artifact,
    F: FnOnce() -> Result<A, E>,
{
    get_or_compute_checked(cache, stage, fingerprint, |_| Ok(()), compute)
}

/// Like [`get_or_compute`], with an extra acceptance check on cached values.
///
/// A cached payload that fails to decode, fails [`Artifact::validate`],
/// or fails `check` is logged as malformed, dropped, and recomputed.
/// Cache I/O failures are logged and never fail the stage.
pub fn get_or_compute_checked<A, E, C, F>(
    cache: &dyn ArtifactCache,
    stage: &str,
    fingerprint: &str,
    check: C,
    compute: F,
) -> Result<(A, CacheOutcome), E>
where
    A: Artifact,
    C: Fn(&A) -> ArtifactResult<()>,
    F: FnOnce() -> Result<A, E>,
{
    let outcome = match lookup(cache, stage, fingerprint, check) {
        Ok(artifact) => return Ok((artifact, CacheOutcome::Hit)),
        Err(outcome) => outcome,
    };
    let artifact = compute()?;
    save(cache, stage, fingerprint, &artifact);
    Ok((artifact, outcome))
}

/// Fetch and validate a cached artifact.
///
/// On failure returns how the caller should record the recompute:
/// `Miss` when nothing usable was cached, `Recomputed` when a malformed
/// entry was found (and dropped).
pub fn lookup<A, C>(
    cache: &dyn ArtifactCache,
    stage: &str,
    fingerprint: &str,
    check: C,
) -> Result<A, CacheOutcome>
where
    A: Artifact,
    C: Fn(&A) -> ArtifactResult<()>,
{
    match cache.load(stage, fingerprint) {
        Ok(Some(payload)) => match A::decode(&payload).and_then(|a| check(&a).map(|_| a)) {
            Ok(artifact) => {
                debug!(stage, fingerprint, backend = cache.name(), "cache hit");
                Ok(artifact)
            }
            Err(e) => {
                warn!(stage, fingerprint, error = %e, "malformed cached artifact, recomputing");
                if let Err(e) = cache.invalidate(stage, fingerprint) {
                    warn!(stage, error = %e, "failed to drop malformed cache entry");
                }
                Err(CacheOutcome::Recomputed)
            }
        },
        Ok(None) => {
            debug!(stage, fingerprint, "cache miss");
            Err(CacheOutcome::Miss)
        }
        Err(e) => {
            warn!(stage, error = %e, backend = cache.name(), "cache read failed, recomputing");
            Err(CacheOutcome::Miss)
        }
    }
}

/// Encode and store an artifact. Failures are logged, not returned.
pub fn save<A: Artifact>(cache: &dyn ArtifactCache, stage: &str, fingerprint: &str, artifact: &A) {
    match artifact.encode() {
        Ok(payload) => {
            if let Err(e) = cache.store(stage, fingerprint, &payload) {
                warn!(stage, error = %e, backend = cache.name(), "cache write failed");
            }
        }
        Err(e) => warn!(stage, error = %e, "could not encode artifact for cache"),
    }
}
