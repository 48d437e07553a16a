//! Braille Tutor - Korean Braille Practice Library
//!
//! A small practice loop for learning Korean braille:
//! - SQLite letter store with a built-in three-level vocabulary
//! - Random letter selection per difficulty level
//! - JSON delivery to a braille display device over HTTP
//! - Delayed spoken feedback through a TTS program
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use braille_tutor::{Config, HttpDeviceClient, Level, SessionController, SessionSettings, SqliteLetterStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let store = SqliteLetterStore::open(config.storage.resolve_database_path()?).await?;
//!     braille_tutor::seed_vocabulary(&store).await?;
//!
//!     let (session, _feedback) = SessionController::new(
//!         store,
//!         Arc::new(HttpDeviceClient::new()),
//!         config.speech.build_speaker(),
//!         SessionSettings::from_config(&config),
//!     );
//!     session.send_random_letter(Level::Symbols).await?;
//!     session.wait_for_speech().await;
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod types;
pub mod letters;
pub mod device;
pub mod voice;
pub mod config;
pub mod session;
pub mod cli;

// Re-export commonly used types for convenience
pub use types::{Feedback, Level};

pub use letters::{
    LetterEntry,
    SqliteLetterStore,
    LetterStats,
    SeedReport,
    seed_vocabulary,
    is_valid_pattern,
};

pub use device::{
    BraillePayload,
    DeviceClient,
    DeviceResponse,
    HttpDeviceClient,
    PayloadMode,
};

pub use voice::{
    Speaker,
    CommandSpeaker,
    SilentSpeaker,
    TtsConfig,
    DeferredSpeech,
};

pub use config::Config;

pub use session::{
    SessionController,
    SessionSettings,
    SessionError,
    Endpoint,
    Delivery,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Korean Braille Tutor Library", NAME, VERSION)
}
