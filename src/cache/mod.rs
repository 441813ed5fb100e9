//! Persistent artifact cache for generated text and diagrams
//!
//! Keyed by (category, fingerprint), namespaced by a cache format version.
//! The cache is an optimization, never a correctness dependency: on the
//! resolution path every storage failure degrades to a miss or a no-op.

pub mod storage;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::diag::{DiagCategory, DiagOutcome, DiagSink};
use crate::error::CacheError;

pub use storage::{ArtifactStore, CacheStats, ClearStats};

/// Bump to invalidate all existing entries. Old entries become permanently
/// unreachable; they are not actively deleted.
pub const CACHE_FORMAT_VERSION: &str = "v1";

/// Payloads shorter than this (after trimming) are never cached. Guards
/// against caching failure placeholders.
pub const MIN_PAYLOAD_CHARS: usize = 5;

/// Artifact categories stored in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactCategory {
    Text,
    Image,
}

impl ArtifactCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactCategory::Text => "text",
            ArtifactCategory::Image => "image",
        }
    }
}

/// Versioned composite key: `<version>_<category>_<fingerprint>`
pub fn composite_key(category: ArtifactCategory, fingerprint: &str) -> String {
    format!("{}_{}_{}", CACHE_FORMAT_VERSION, category.as_str(), fingerprint)
}

enum StoreState {
    Unopened,
    Open(ArtifactStore),
    Unavailable,
}

/// Best-effort cache facade over [`ArtifactStore`].
///
/// The store is opened lazily and the single handle is reused for the
/// process lifetime. Concurrent use is serialized here; the underlying
/// store's own transaction semantics handle the rest.
pub struct ArtifactCache {
    state: Mutex<StoreState>,
    dir: Option<PathBuf>,
    diag: Arc<dyn DiagSink>,
}

impl ArtifactCache {
    /// Cache at the default location
    pub fn new(diag: Arc<dyn DiagSink>) -> Self {
        Self {
            state: Mutex::new(StoreState::Unopened),
            dir: None,
            diag,
        }
    }

    /// Cache at a specific directory (for testing)
    pub fn at(dir: PathBuf, diag: Arc<dyn DiagSink>) -> Self {
        Self {
            state: Mutex::new(StoreState::Unopened),
            dir: Some(dir),
            diag,
        }
    }

    fn with_store<T>(
        &self,
        f: impl FnOnce(&ArtifactStore) -> std::result::Result<T, CacheError>,
    ) -> Option<T> {
        let mut state = self.state.lock().ok()?;

        if matches!(*state, StoreState::Unopened) {
            let opened = match &self.dir {
                Some(dir) => ArtifactStore::open_at(dir),
                None => ArtifactStore::open(),
            };
            *state = match opened {
                Ok(store) => StoreState::Open(store),
                Err(err) => {
                    log::warn!("artifact cache unavailable: {}", err);
                    StoreState::Unavailable
                }
            };
        }

        match &*state {
            StoreState::Open(store) => match f(store) {
                Ok(value) => Some(value),
                Err(err) => {
                    log::warn!("artifact cache operation failed: {}", err);
                    None
                }
            },
            _ => None,
        }
    }

    /// Look up a payload. Hits are logged for observability; any storage
    /// failure reads as a miss.
    pub fn get(&self, category: ArtifactCategory, fingerprint: &str) -> Option<String> {
        let start = Instant::now();
        let key = composite_key(category, fingerprint);
        let payload = self.with_store(|store| store.get(&key))??;

        self.diag.append(
            DiagCategory::CacheDb,
            "cache lookup",
            start.elapsed(),
            DiagOutcome::CacheHit,
            format!("cached {} artifact, {} chars", category.as_str(), payload.len()),
            Some(key),
        );
        Some(payload)
    }

    /// Store a payload. No-ops on trivially short payloads and on any
    /// storage failure.
    pub fn put(&self, category: ArtifactCategory, fingerprint: &str, payload: &str) {
        if payload.trim().len() < MIN_PAYLOAD_CHARS {
            return;
        }
        let key = composite_key(category, fingerprint);
        let _ = self.with_store(|store| store.put(&key, category.as_str(), payload));
    }

    /// Remove every entry. Returns the number removed (0 when the store is
    /// unavailable).
    pub fn clear(&self) -> usize {
        self.with_store(|store| store.clear_all())
            .map(|stats| stats.entries_removed)
            .unwrap_or(0)
    }

    /// Current statistics, if the store can be opened
    pub fn status(&self) -> Option<CacheStats> {
        self.with_store(|store| store.stats())
    }
}
