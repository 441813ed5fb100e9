//! Diagnostic log for the resolution pipeline
//!
//! Every resolution step that completes (success or failure) appends one
//! entry. The log is an in-memory ring buffer bounded to the most recent
//! 100 entries, process-wide, not persisted. The sink is an explicit trait
//! so tests can substitute an observer without touching global state.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Maximum number of entries retained in the ring buffer
pub const LOG_CAPACITY: usize = 100;

/// What part of the pipeline produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagCategory {
    TextGeneration,
    ImageGeneration,
    AudioGeneration,
    CacheDb,
    Error,
    System,
}

impl DiagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagCategory::TextGeneration => "text-generation",
            DiagCategory::ImageGeneration => "image-generation",
            DiagCategory::AudioGeneration => "audio-generation",
            DiagCategory::CacheDb => "cache-db",
            DiagCategory::Error => "error",
            DiagCategory::System => "system",
        }
    }
}

/// How the step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagOutcome {
    Success,
    Error,
    CacheHit,
}

impl DiagOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagOutcome::Success => "success",
            DiagOutcome::Error => "error",
            DiagOutcome::CacheHit => "cache-hit",
        }
    }
}

/// One completed resolution step
#[derive(Debug, Clone, Serialize)]
pub struct DiagEntry {
    pub id: u64,
    pub category: DiagCategory,
    pub label: String,
    pub elapsed_ms: u64,
    pub outcome: DiagOutcome,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Injectable log sink. The pipeline components hold `Arc<dyn DiagSink>`.
pub trait DiagSink: Send + Sync {
    fn append(
        &self,
        category: DiagCategory,
        label: &str,
        elapsed: Duration,
        outcome: DiagOutcome,
        message: String,
        origin: Option<String>,
    );

    fn snapshot(&self) -> Vec<DiagEntry>;

    fn clear(&self);
}

/// Default sink: bounded ring buffer with a broadcast channel for reactive
/// observers.
pub struct DiagnosticLog {
    entries: Mutex<VecDeque<DiagEntry>>,
    next_id: AtomicU64,
    notify: broadcast::Sender<DiagEntry>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(LOG_CAPACITY);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(LOG_CAPACITY)),
            next_id: AtomicU64::new(0),
            notify,
        }
    }

    /// Subscribe to append notifications
    pub fn subscribe(&self) -> broadcast::Receiver<DiagEntry> {
        self.notify.subscribe()
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagSink for DiagnosticLog {
    fn append(
        &self,
        category: DiagCategory,
        label: &str,
        elapsed: Duration,
        outcome: DiagOutcome,
        message: String,
        origin: Option<String>,
    ) {
        let entry = DiagEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            category,
            label: label.to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
            outcome,
            message,
            timestamp: Utc::now(),
            origin,
        };

        log::debug!(
            "[{}] {} ({}ms, {}): {}",
            entry.category.as_str(),
            entry.label,
            entry.elapsed_ms,
            entry.outcome.as_str(),
            entry.message
        );

        if let Ok(mut entries) = self.entries.lock() {
            entries.push_back(entry.clone());
            while entries.len() > LOG_CAPACITY {
                entries.pop_front();
            }
        }

        // No subscribers is fine
        let _ = self.notify.send(entry);
    }

    fn snapshot(&self) -> Vec<DiagEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
