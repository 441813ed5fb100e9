//! SQLite-backed artifact storage
//!
//! One logical table mapping a versioned composite key to a raw payload.
//! Entries never expire; invalidation happens by bumping the cache format
//! version in the key namespace, which makes old entries unreachable.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

use crate::error::CacheError;

type Result<T> = std::result::Result<T, CacheError>;

/// SQLite-backed artifact store
pub struct ArtifactStore {
    conn: Connection,
}

impl ArtifactStore {
    /// Open or create the store at the default cache location
    pub fn open() -> Result<Self> {
        Self::open_at(&Self::cache_dir()?)
    }

    /// Get the cache directory path (~/.cache/chalktalk on Linux/macOS).
    /// `CHALKTALK_CACHE_DIR` overrides it, which the test suite relies on.
    pub fn cache_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("CHALKTALK_CACHE_DIR") {
            return Ok(PathBuf::from(dir));
        }
        let cache_base = dirs::cache_dir().ok_or(CacheError::NoCacheDir)?;
        Ok(cache_base.join("chalktalk"))
    }

    /// Open the store at a specific directory. Creation is idempotent:
    /// opening an already-initialized store is not an error.
    pub fn open_at(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create cache dir: {}", e)))?;

        let conn = Connection::open(cache_dir.join("artifacts.db"))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                cache_key TEXT PRIMARY KEY NOT NULL,
                category TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_category ON artifacts(category);
            "#,
        )?;

        Ok(Self { conn })
    }

    /// Fetch a payload by composite key
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM artifacts WHERE cache_key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    /// Store a payload. Overwrite is permitted; generation is
    /// deterministic-enough per input that it rarely matters.
    pub fn put(&self, key: &str, category: &str, payload: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        self.conn.execute(
            "INSERT OR REPLACE INTO artifacts
             (cache_key, category, payload, created_at, size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key, category, payload, now, payload.len()],
        )?;
        Ok(())
    }

    /// Delete every entry
    pub fn clear_all(&self) -> Result<ClearStats> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM artifacts", [], |r| r.get(0))?;
        self.conn.execute("DELETE FROM artifacts", [])?;
        Ok(ClearStats {
            entries_removed: count as usize,
        })
    }

    /// Get cache statistics
    pub fn stats(&self) -> Result<CacheStats> {
        let total_entries: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM artifacts", [], |r| r.get(0))?;

        let text_entries: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM artifacts WHERE category = 'text'",
            [],
            |r| r.get(0),
        )?;

        let image_entries: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM artifacts WHERE category = 'image'",
            [],
            |r| r.get(0),
        )?;

        let total_size: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM artifacts",
            [],
            |r| r.get(0),
        )?;

        Ok(CacheStats {
            total_entries: total_entries as usize,
            text_entries: text_entries as usize,
            image_entries: image_entries as usize,
            total_size_bytes: total_size as usize,
        })
    }
}

/// Statistics about a clear operation
#[derive(Debug, serde::Serialize)]
pub struct ClearStats {
    pub entries_removed: usize,
}

/// Statistics about cache state
#[derive(Debug, serde::Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub text_entries: usize,
    pub image_entries: usize,
    pub total_size_bytes: usize,
}
