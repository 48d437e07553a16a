//! Shared types used across modules
//!
//! This module contains types that are used by multiple modules
//! to avoid circular dependencies.

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Difficulty tier of the vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Level {
    /// Individual consonant and vowel symbols
    Symbols = 1,
    /// Full syllable blocks
    Syllables = 2,
    /// Words and connective phrases
    Words = 3,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Symbols, Level::Syllables, Level::Words];

    /// Numeric tier as stored in the database
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    /// Short description shown in the CLI
    pub fn description(&self) -> &'static str {
        match self {
            Level::Symbols => "consonants and vowels",
            Level::Syllables => "syllable blocks",
            Level::Words => "words and connectives",
        }
    }
}

impl TryFrom<i64> for Level {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> anyhow::Result<Self> {
        match value {
            1 => Ok(Level::Symbols),
            2 => Ok(Level::Syllables),
            3 => Ok(Level::Words),
            other => bail!("Unknown level {} (expected 1, 2 or 3)", other),
        }
    }
}

impl From<Level> for i64 {
    fn from(level: Level) -> Self {
        level.as_i64()
    }
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Level must be a number, got '{}'", s))?;
        Level::try_from(value)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// A user-visible notification produced by background work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    /// POST is about to be issued
    Sending { text: String },
    /// Device accepted the letter
    Sent { text: String },
    /// Device answered with a non-2xx status
    Rejected { text: String, status: u16 },
    /// The request never produced a response
    TransportFailed { text: String, message: String },
    /// Nothing stored for the requested level
    NoData { level: Level },
    /// No destination endpoint configured
    EndpointRequired,
    /// The letter store could not be read
    StoreFailed { message: String },
    /// A new destination endpoint was stored
    EndpointSaved { url: String },
    /// Deferred speech played
    Spoken { text: String },
    /// Deferred speech could not be played
    SpeechFailed { message: String },
}

impl std::fmt::Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feedback::Sending { text } => write!(f, "Sending {}...", text),
            Feedback::Sent { text } => write!(f, "{} sent ✅", text),
            Feedback::Rejected { status, .. } => write!(f, "Send failed ❌: {}", status),
            Feedback::TransportFailed { message, .. } => write!(f, "HTTP error: {}", message),
            Feedback::NoData { level } => write!(f, "No letters stored for level {}", level),
            Feedback::EndpointRequired => write!(f, "Device URL is not configured"),
            Feedback::StoreFailed { message } => write!(f, "Letter store error: {}", message),
            Feedback::EndpointSaved { url } => write!(f, "Device URL saved: {}", url),
            Feedback::Spoken { text } => write!(f, "🔊 {}", text),
            Feedback::SpeechFailed { message } => write!(f, "Speech failed: {}", message),
        }
    }
}
