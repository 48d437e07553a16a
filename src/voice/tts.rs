//! Text-to-Speech (TTS) Module
//!
//! Speaks vocabulary entries aloud through an external synthesizer
//! (`espeak-ng` with the Korean voice by default).
//!
//! # Architecture
//!
//! ```text
//! Text Input → Speaker → TTS program → Audio Output
//! ```
//!
//! Starting a new utterance stops one that is still playing, so only the
//! most recent text is heard.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, info, warn};

/// Default synthesizer program
pub const DEFAULT_TTS_PROGRAM: &str = "espeak-ng";

/// Seconds between a successful send and the spoken feedback
pub const DEFAULT_SPEECH_DELAY_SECS: u64 = 10;

/// TTS configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Speak after a successful send
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Synthesizer executable
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before the text
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Delay before speaking, in seconds
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_program() -> String {
    DEFAULT_TTS_PROGRAM.to_string()
}

fn default_args() -> Vec<String> {
    vec!["-v".to_string(), "ko".to_string()]
}

fn default_delay_secs() -> u64 {
    DEFAULT_SPEECH_DELAY_SECS
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: default_program(),
            args: default_args(),
            delay_secs: default_delay_secs(),
        }
    }
}

impl TtsConfig {
    /// Use a different synthesizer program
    pub fn with_program(mut self, program: &str, args: &[&str]) -> Self {
        self.program = program.to_string();
        self.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Set the speech delay
    pub fn with_delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Apply environment overrides on top of this config
    pub fn apply_env(mut self) -> Self {
        if let Ok(program) = std::env::var("BRAILLE_TTS_PROGRAM") {
            if !program.trim().is_empty() {
                self.program = program;
            }
        }

        if let Ok(enabled) = std::env::var("BRAILLE_TTS_ENABLED") {
            self.enabled = enabled.parse().unwrap_or(self.enabled);
        }

        if let Ok(delay) = std::env::var("BRAILLE_TTS_DELAY_SECS") {
            self.delay_secs = delay.parse().unwrap_or(self.delay_secs);
        }

        self
    }

    /// Build the speaker this config describes
    pub fn build_speaker(&self) -> Arc<dyn Speaker> {
        if self.enabled {
            Arc::new(CommandSpeaker::new(&self.program, self.args.clone()))
        } else {
            Arc::new(SilentSpeaker)
        }
    }
}

/// Something that can say a text aloud
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Start speaking `text`, replacing any utterance still in progress
    async fn speak(&self, text: &str) -> Result<()>;

    /// Wait until the current utterance (if any) has finished
    async fn wait_idle(&self) -> Result<()> {
        Ok(())
    }
}

/// Speaks by running an external synthesizer process
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
    current: Mutex<Option<Utterance>>,
}

/// A synthesizer process owned by its own task
struct Utterance {
    /// Dropping or firing this stops the process
    stop: oneshot::Sender<()>,
    /// Flips to `true` once the process is gone
    done: watch::Receiver<bool>,
}

impl Utterance {
    fn start(mut child: Child) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = watch::channel(false);

        tokio::spawn(async move {
            let finished = tokio::select! {
                status = child.wait() => Some(status),
                _ = stop_rx => None,
            };

            match finished {
                Some(Ok(status)) if !status.success() => {
                    warn!("TTS program exited with {}", status);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!("TTS program did not finish: {}", e),
                None => {
                    debug!("Flushing utterance still in progress");
                    if let Err(e) = child.kill().await {
                        warn!("Failed to stop previous utterance: {}", e);
                    }
                }
            }

            let _ = done_tx.send(true);
        });

        Self {
            stop: stop_tx,
            done: done_rx,
        }
    }

    fn is_finished(&self) -> bool {
        *self.done.borrow()
    }
}

impl CommandSpeaker {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        info!("Using TTS program: {} {}", program, args.join(" "));
        Self {
            program: program.to_string(),
            args,
            current: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Speaker for CommandSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        let mut current = self.current.lock().await;

        if let Some(previous) = current.take() {
            if !previous.is_finished() {
                let _ = previous.stop.send(());
            }
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start TTS program '{}'", self.program))?;

        debug!("Speaking: {}", text);
        *current = Some(Utterance::start(child));
        Ok(())
    }

    async fn wait_idle(&self) -> Result<()> {
        // Lock released before waiting so a new utterance can still flush this one
        let mut done = match self.current.lock().await.as_ref() {
            Some(utterance) => utterance.done.clone(),
            None => return Ok(()),
        };

        if done.wait_for(|finished| *finished).await.is_err() {
            debug!("TTS task ended without reporting");
        }
        Ok(())
    }
}

/// Speaker used when speech is disabled
pub struct SilentSpeaker;

#[async_trait]
impl Speaker for SilentSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        debug!("Speech disabled, not speaking: {}", text);
        Ok(())
    }
}
