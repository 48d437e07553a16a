//! Letter Store
//!
//! Provides:
//! - The vocabulary entity (`LetterEntry`) shared by the seed loader and the session
//! - SQLite-backed persistence queryable by level and by text
//! - Fixed seed vocabulary for the three levels

pub mod sqlite;
pub mod seed;

use serde::{Deserialize, Serialize};

use crate::types::Level;

pub use sqlite::{SqliteLetterStore, LetterStats};
pub use seed::{seed_vocabulary, SeedReport};

/// Number of dots in one braille cell
pub const CELL_DOTS: usize = 6;

/// Pattern sent when a text has no stored entry
pub const FALLBACK_PATTERN: &str = "000000";

/// A stored vocabulary entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterEntry {
    /// Generated row id (`None` until inserted)
    pub id: Option<i64>,
    /// Difficulty tier
    pub level: Level,
    /// Displayed and spoken string
    pub text: String,
    /// Raised-dot positions, one '0'/'1' digit per dot
    pub braille_pattern: String,
}

impl LetterEntry {
    /// Create an entry whose id is generated on insert
    pub fn new(level: Level, text: impl Into<String>, braille_pattern: impl Into<String>) -> Self {
        Self {
            id: None,
            level,
            text: text.into(),
            braille_pattern: braille_pattern.into(),
        }
    }

    /// Same entry with an explicit primary key
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Split the pattern into 6-dot cells (the last one may be short)
    pub fn cells(&self) -> Vec<&str> {
        self.braille_pattern
            .as_bytes()
            .chunks(CELL_DOTS)
            .filter_map(|c| std::str::from_utf8(c).ok())
            .collect()
    }
}

/// A pattern is a non-empty run of '0'/'1' digits
pub fn is_valid_pattern(pattern: &str) -> bool {
    !pattern.is_empty() && pattern.chars().all(|c| c == '0' || c == '1')
}
