//! Guided discussion chapters
//!
//! Chapters are static configuration: a unique identifier, a display title,
//! and the canned prompt that opens the discussion. Loaded once at startup
//! from the embedded YAML; never mutated.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// One pre-configured discussion topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterDescriptor {
    /// Unique, human-readable identifier (may contain spaces)
    pub id: String,

    /// Display title
    pub title: String,

    /// Canned prompt that opens the chapter
    pub prompt: String,
}

const CHAPTERS_YAML: &str = include_str!("chapters.yaml");

/// Load the chapter list from the embedded configuration
pub fn load() -> Result<Vec<ChapterDescriptor>> {
    let chapters: Vec<ChapterDescriptor> =
        serde_yaml::from_str(CHAPTERS_YAML).map_err(ConfigError::from)?;
    Ok(chapters)
}

/// Find a chapter by identifier (case-insensitive)
pub fn find<'a>(chapters: &'a [ChapterDescriptor], id: &str) -> Option<&'a ChapterDescriptor> {
    chapters.iter().find(|c| c.id.eq_ignore_ascii_case(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_embedded_chapters() {
        let chapters = load().unwrap();
        assert!(chapters.len() >= 6);
        for chapter in &chapters {
            assert!(!chapter.id.trim().is_empty());
            assert!(!chapter.title.trim().is_empty());
            assert!(!chapter.prompt.trim().is_empty());
        }
    }

    #[test]
    fn test_foundations_chapter_exists() {
        let chapters = load().unwrap();
        let found = find(&chapters, "Foundations").unwrap();
        assert_eq!(found.title, "Foundations");
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let chapters = load().unwrap();
        assert!(find(&chapters, "foundations").is_some());
        assert!(find(&chapters, "no such chapter").is_none());
    }

    #[test]
    fn test_chapter_ids_are_unique() {
        let chapters = load().unwrap();
        for (i, a) in chapters.iter().enumerate() {
            for b in chapters.iter().skip(i + 1) {
                assert_ne!(a.id, b.id);
            }
        }
    }
}
