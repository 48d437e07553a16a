//! Voice Module
//!
//! Spoken feedback for the tutor:
//! - TTS speakers (external synthesizer or silent)
//! - Single-slot delayed speech triggered after a successful send

pub mod tts;
pub mod deferred;

pub use tts::{Speaker, CommandSpeaker, SilentSpeaker, TtsConfig};
pub use deferred::DeferredSpeech;
