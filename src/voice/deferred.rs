//! Delayed speech feedback
//!
//! Holds at most one pending utterance. Scheduling a new one cancels a
//! predecessor whose timer has not fired yet; an utterance that is already
//! playing is left to the speaker's own flush behaviour.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::tts::Speaker;
use crate::types::Feedback;

struct PendingSpeech {
    text: String,
    fired: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Single-slot, replaceable deferred speech action
pub struct DeferredSpeech {
    speaker: Arc<dyn Speaker>,
    delay: Duration,
    feedback: Option<mpsc::UnboundedSender<Feedback>>,
    pending: Mutex<Option<PendingSpeech>>,
}

impl DeferredSpeech {
    pub fn new(speaker: Arc<dyn Speaker>, delay: Duration) -> Self {
        Self {
            speaker,
            delay,
            feedback: None,
            pending: Mutex::new(None),
        }
    }

    /// Report spoken / failed utterances on this channel
    pub fn with_feedback(mut self, feedback: mpsc::UnboundedSender<Feedback>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Speak `text` after the configured delay, replacing an unfired request
    pub async fn schedule(&self, text: &str) {
        let mut pending = self.pending.lock().await;

        if let Some(previous) = pending.take() {
            if !previous.fired.load(Ordering::SeqCst) {
                debug!("Replacing pending speech '{}' with '{}'", previous.text, text);
                previous.handle.abort();
            }
        }

        let fired = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(Self::run(
            self.speaker.clone(),
            self.delay,
            text.to_string(),
            fired.clone(),
            self.feedback.clone(),
        ));

        *pending = Some(PendingSpeech {
            text: text.to_string(),
            fired,
            handle,
        });
    }

    async fn run(
        speaker: Arc<dyn Speaker>,
        delay: Duration,
        text: String,
        fired: Arc<AtomicBool>,
        feedback: Option<mpsc::UnboundedSender<Feedback>>,
    ) {
        tokio::time::sleep(delay).await;
        fired.store(true, Ordering::SeqCst);

        let event = match speaker.speak(&text).await {
            Ok(()) => Feedback::Spoken { text },
            Err(e) => {
                warn!("Speech failed: {:#}", e);
                Feedback::SpeechFailed { message: e.to_string() }
            }
        };

        if let Some(tx) = feedback {
            let _ = tx.send(event);
        }
    }

    /// Drop the pending utterance if its timer has not fired
    pub async fn cancel(&self) -> bool {
        let mut pending = self.pending.lock().await;
        match pending.take() {
            Some(previous) if !previous.fired.load(Ordering::SeqCst) => {
                previous.handle.abort();
                true
            }
            Some(previous) => {
                *pending = Some(previous);
                false
            }
            None => false,
        }
    }

    /// Whether an utterance is waiting for its timer
    pub async fn is_pending(&self) -> bool {
        let pending = self.pending.lock().await;
        pending
            .as_ref()
            .map(|p| !p.fired.load(Ordering::SeqCst) && !p.handle.is_finished())
            .unwrap_or(false)
    }

    /// Wait for the pending utterance to be spoken, then for the speaker to go idle
    pub async fn wait(&self) {
        let previous = self.pending.lock().await.take();
        if let Some(previous) = previous {
            if let Err(e) = previous.handle.await {
                if !e.is_cancelled() {
                    warn!("Deferred speech task failed: {}", e);
                }
            }
        }

        if let Err(e) = self.speaker.wait_idle().await {
            warn!("Speaker did not finish cleanly: {:#}", e);
        }
    }
}

impl Drop for DeferredSpeech {
    fn drop(&mut self) {
        if let Some(previous) = self.pending.get_mut().take() {
            previous.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingSpeaker {
        spoken: std::sync::Mutex<Vec<String>>,
    }

    impl RecordingSpeaker {
        fn spoken(&self) -> Vec<String> {
            self.spoken.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Speaker for RecordingSpeaker {
        async fn speak(&self, text: &str) -> Result<()> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct FailingSpeaker;

    #[async_trait]
    impl Speaker for FailingSpeaker {
        async fn speak(&self, _text: &str) -> Result<()> {
            anyhow::bail!("no audio device")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_speaks_after_delay() {
        let speaker = Arc::new(RecordingSpeaker::default());
        let deferred = DeferredSpeech::new(speaker.clone(), Duration::from_secs(10));

        deferred.schedule("ㄱ").await;
        assert!(deferred.is_pending().await);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(speaker.spoken().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(speaker.spoken(), vec!["ㄱ"]);
        assert!(!deferred.is_pending().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_request_replaces_unfired() {
        let speaker = Arc::new(RecordingSpeaker::default());
        let deferred = DeferredSpeech::new(speaker.clone(), Duration::from_secs(10));

        deferred.schedule("가").await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        deferred.schedule("나").await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(speaker.spoken(), vec!["나"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fired_request_is_not_replaced() {
        let speaker = Arc::new(RecordingSpeaker::default());
        let deferred = DeferredSpeech::new(speaker.clone(), Duration::from_secs(1));

        deferred.schedule("가").await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        deferred.schedule("나").await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(speaker.spoken(), vec!["가", "나"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let speaker = Arc::new(RecordingSpeaker::default());
        let deferred = DeferredSpeech::new(speaker.clone(), Duration::from_secs(10));

        deferred.schedule("다").await;
        assert!(deferred.cancel().await);
        assert!(!deferred.cancel().await);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(speaker.spoken().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_feedback() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let deferred = DeferredSpeech::new(Arc::new(FailingSpeaker), Duration::from_secs(1))
            .with_feedback(tx);

        deferred.schedule("라").await;
        deferred.wait().await;

        match rx.recv().await {
            Some(Feedback::SpeechFailed { message }) => assert!(message.contains("no audio")),
            other => panic!("unexpected feedback: {:?}", other),
        }
    }
}
