//! Session Controller
//!
//! Drives one practice round per button press:
//!
//! ```text
//! level → random entry → endpoint → payload → POST → feedback
//!                                               ↓ (2xx)
//!                                     speak text after the delay
//! ```
//!
//! Every failure becomes a [`Feedback`] notification and an error value for
//! the caller; nothing is retried and nothing escalates.

use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::device::{validate_endpoint, BraillePayload, DeviceClient, PayloadMode};
use crate::letters::{LetterEntry, SqliteLetterStore, FALLBACK_PATTERN};
use crate::types::{Feedback, Level};
use crate::voice::{DeferredSpeech, Speaker};

/// Why a practice round did not reach the device
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no letters stored for level {0}")]
    NoData(Level),
    #[error("device URL is not configured")]
    EndpointMissing,
    #[error("device rejected the letter with status {status}")]
    Rejected { status: u16 },
    #[error("could not reach the device: {0}")]
    Transport(String),
    #[error("letter store error: {0}")]
    Store(String),
    #[error("the device URL is fixed and cannot be changed")]
    FixedEndpoint,
    #[error("invalid device URL: {0}")]
    InvalidEndpoint(String),
}

/// Where payloads are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// User-provided URL, possibly not set yet
    Configurable(Option<String>),
    /// Static URL that cannot be changed at runtime
    Fixed(String),
}

impl Endpoint {
    pub fn url(&self) -> Option<&str> {
        match self {
            Endpoint::Configurable(url) => url.as_deref(),
            Endpoint::Fixed(url) => Some(url.as_str()),
        }
    }
}

/// Behaviour knobs of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub endpoint: Endpoint,
    pub payload_mode: PayloadMode,
    pub speech_delay: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        let endpoint = match &config.device.fixed_url {
            Some(url) => Endpoint::Fixed(url.clone()),
            None => Endpoint::Configurable(config.device.url.clone()),
        };

        Self {
            endpoint,
            payload_mode: config.device.payload,
            speech_delay: Duration::from_secs(config.speech.delay_secs),
        }
    }
}

/// A letter the device accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub entry: LetterEntry,
    pub url: String,
    pub payload: BraillePayload,
    pub status: u16,
}

/// Uniformly random entry, `None` for an empty slice
pub fn pick_random(entries: &[LetterEntry]) -> Option<&LetterEntry> {
    entries.choose(&mut rand::rng())
}

struct SessionInner {
    store: SqliteLetterStore,
    device: Arc<dyn DeviceClient>,
    speech: DeferredSpeech,
    endpoint: RwLock<Endpoint>,
    payload_mode: PayloadMode,
    feedback: mpsc::UnboundedSender<Feedback>,
}

/// Orchestrates "pick, send, speak" rounds
///
/// Cloning is cheap; all clones share the same store, device client and
/// speech slot.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<SessionInner>,
}

impl SessionController {
    /// Build a controller and the receiving end of its feedback queue
    pub fn new(
        store: SqliteLetterStore,
        device: Arc<dyn DeviceClient>,
        speaker: Arc<dyn Speaker>,
        settings: SessionSettings,
    ) -> (Self, mpsc::UnboundedReceiver<Feedback>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let speech = DeferredSpeech::new(speaker, settings.speech_delay).with_feedback(tx.clone());

        let controller = Self {
            inner: Arc::new(SessionInner {
                store,
                device,
                speech,
                endpoint: RwLock::new(settings.endpoint),
                payload_mode: settings.payload_mode,
                feedback: tx,
            }),
        };

        (controller, rx)
    }

    fn notify(&self, event: Feedback) {
        debug!("Feedback: {}", event);
        // The receiver going away only means nobody is watching any more
        let _ = self.inner.feedback.send(event);
    }

    pub fn store(&self) -> &SqliteLetterStore {
        &self.inner.store
    }

    pub fn speech(&self) -> &DeferredSpeech {
        &self.inner.speech
    }

    /// Currently resolved destination URL
    pub async fn endpoint(&self) -> Option<String> {
        self.inner.endpoint.read().await.url().map(str::to_string)
    }

    pub async fn is_endpoint_fixed(&self) -> bool {
        matches!(*self.inner.endpoint.read().await, Endpoint::Fixed(_))
    }

    /// Store a new user-provided URL
    pub async fn set_endpoint(&self, raw: &str) -> Result<String, SessionError> {
        let url = validate_endpoint(raw)
            .map_err(|e| SessionError::InvalidEndpoint(format!("{:#}", e)))?;

        let mut endpoint = self.inner.endpoint.write().await;
        if let Endpoint::Fixed(_) = *endpoint {
            return Err(SessionError::FixedEndpoint);
        }

        *endpoint = Endpoint::Configurable(Some(url.clone()));
        drop(endpoint);

        info!("Device URL set to {}", url);
        self.notify(Feedback::EndpointSaved { url: url.clone() });
        Ok(url)
    }

    /// Forget the user-provided URL
    pub async fn clear_endpoint(&self) -> Result<(), SessionError> {
        let mut endpoint = self.inner.endpoint.write().await;
        if let Endpoint::Fixed(_) = *endpoint {
            return Err(SessionError::FixedEndpoint);
        }

        *endpoint = Endpoint::Configurable(None);
        info!("Device URL cleared");
        Ok(())
    }

    /// Pattern forwarded for `text`: first stored match, else all dots down
    pub async fn resolve_pattern(&self, text: &str) -> Result<String, SessionError> {
        let entry = self
            .inner
            .store
            .get_by_text(text)
            .await
            .map_err(|e| SessionError::Store(format!("{:#}", e)))?;

        Ok(entry
            .map(|e| e.braille_pattern)
            .unwrap_or_else(|| FALLBACK_PATTERN.to_string()))
    }

    async fn build_payload(&self, entry: &LetterEntry) -> Result<BraillePayload, SessionError> {
        match self.inner.payload_mode {
            PayloadMode::TextOnly => Ok(BraillePayload::text_only(&entry.text)),
            PayloadMode::TextAndPattern => {
                let pattern = self.resolve_pattern(&entry.text).await?;
                Ok(BraillePayload::with_pattern(&entry.text, pattern))
            }
        }
    }

    fn store_failed(&self, error: SessionError) -> SessionError {
        warn!("{}", error);
        self.notify(Feedback::StoreFailed { message: error.to_string() });
        error
    }

    /// Send a random letter of `level` to the device
    pub async fn send_random_letter(&self, level: Level) -> Result<Delivery, SessionError> {
        let entries = self
            .inner
            .store
            .get_by_level(level)
            .await
            .map_err(|e| self.store_failed(SessionError::Store(format!("{:#}", e))))?;

        let Some(entry) = pick_random(&entries).cloned() else {
            info!("No letters stored for level {}", level);
            self.notify(Feedback::NoData { level });
            return Err(SessionError::NoData(level));
        };

        let Some(url) = self.endpoint().await else {
            info!("Device URL not configured, not sending '{}'", entry.text);
            self.notify(Feedback::EndpointRequired);
            return Err(SessionError::EndpointMissing);
        };

        let payload = self
            .build_payload(&entry)
            .await
            .map_err(|e| self.store_failed(e))?;

        self.notify(Feedback::Sending { text: entry.text.clone() });

        match self.inner.device.post(&url, &payload).await {
            Ok(response) if response.is_success() => {
                info!("'{}' delivered to {} ({})", entry.text, url, response.status);
                self.notify(Feedback::Sent { text: entry.text.clone() });
                self.inner.speech.schedule(&entry.text).await;

                Ok(Delivery {
                    entry,
                    url,
                    payload,
                    status: response.status,
                })
            }
            Ok(response) => {
                warn!("Device at {} rejected '{}' with {}", url, entry.text, response.status);
                self.notify(Feedback::Rejected {
                    text: entry.text.clone(),
                    status: response.status,
                });
                Err(SessionError::Rejected { status: response.status })
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!("Sending '{}' failed: {}", entry.text, message);
                self.notify(Feedback::TransportFailed {
                    text: entry.text.clone(),
                    message: message.clone(),
                });
                Err(SessionError::Transport(message))
            }
        }
    }

    /// Fire-and-forget variant of [`send_random_letter`](Self::send_random_letter)
    pub fn spawn_send(&self, level: Level) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            if let Err(e) = session.send_random_letter(level).await {
                debug!("Round for level {} ended without delivery: {}", level, e);
            }
        })
    }

    /// Block until pending speech has played
    pub async fn wait_for_speech(&self) {
        self.inner.speech.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceResponse, MockDeviceClient};
    use anyhow::Result;
    use async_trait::async_trait;

    const URL: &str = "http://192.168.4.1/braille";

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

    fn settings(endpoint: Endpoint, payload_mode: PayloadMode) -> SessionSettings {
        SessionSettings {
            endpoint,
            payload_mode,
            speech_delay: Duration::from_secs(10),
        }
    }

    async fn store_with(entries: &[LetterEntry]) -> SqliteLetterStore {
        let store = SqliteLetterStore::open_in_memory().unwrap();
        store.insert_all(entries).await.unwrap();
        store
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Feedback>) -> Vec<Feedback> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_pick_random_single_entry() {
        let entries = vec![LetterEntry::new(Level::Symbols, "ㄱ", "111011").with_id(1)];
        for _ in 0..50 {
            assert_eq!(pick_random(&entries), Some(&entries[0]));
        }
        assert!(pick_random(&[]).is_none());
    }

    #[test]
    fn test_pick_random_stays_in_slice() {
        let entries: Vec<_> = ["ㄱ", "ㄴ", "ㄷ"]
            .iter()
            .map(|t| LetterEntry::new(Level::Symbols, *t, "000000"))
            .collect();
        for _ in 0..50 {
            let picked = pick_random(&entries).unwrap();
            assert!(entries.contains(picked));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_level_sends_nothing() {
        let mut device = MockDeviceClient::new();
        device.expect_post().never();
        let speaker = Arc::new(RecordingSpeaker::default());

        let store = store_with(&[LetterEntry::new(Level::Symbols, "ㄱ", "111011")]).await;
        let (session, mut rx) = SessionController::new(
            store,
            Arc::new(device),
            speaker.clone(),
            settings(Endpoint::Configurable(Some(URL.to_string())), PayloadMode::TextAndPattern),
        );

        let result = session.send_random_letter(Level::Syllables).await;
        assert_eq!(result, Err(SessionError::NoData(Level::Syllables)));
        assert_eq!(drain(&mut rx), vec![Feedback::NoData { level: Level::Syllables }]);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(speaker.spoken().is_empty());
    }

    #[tokio::test]
    async fn test_missing_endpoint_sends_nothing() {
        let mut device = MockDeviceClient::new();
        device.expect_post().never();

        let store = store_with(&[LetterEntry::new(Level::Symbols, "ㄱ", "111011")]).await;
        let (session, mut rx) = SessionController::new(
            store,
            Arc::new(device),
            Arc::new(RecordingSpeaker::default()),
            settings(Endpoint::Configurable(None), PayloadMode::TextAndPattern),
        );

        let result = session.send_random_letter(Level::Symbols).await;
        assert_eq!(result, Err(SessionError::EndpointMissing));
        assert_eq!(drain(&mut rx), vec![Feedback::EndpointRequired]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_sends_once_and_speaks_after_delay() {
        let mut device = MockDeviceClient::new();
        device
            .expect_post()
            .withf(|url, payload| {
                url == URL && payload.text == "ㄱ" && payload.pattern.as_deref() == Some("111011")
            })
            .times(1)
            .returning(|_, _| Ok(DeviceResponse { status: 200 }));
        let speaker = Arc::new(RecordingSpeaker::default());

        let store = store_with(&[LetterEntry::new(Level::Symbols, "ㄱ", "111011")]).await;
        let (session, mut rx) = SessionController::new(
            store,
            Arc::new(device),
            speaker.clone(),
            settings(Endpoint::Configurable(Some(URL.to_string())), PayloadMode::TextAndPattern),
        );

        let delivery = session.send_random_letter(Level::Symbols).await.unwrap();
        assert_eq!(delivery.status, 200);
        assert_eq!(delivery.payload.to_json().unwrap(), r#"{"text":"ㄱ","pattern":"111011"}"#);

        assert_eq!(
            drain(&mut rx),
            vec![
                Feedback::Sending { text: "ㄱ".to_string() },
                Feedback::Sent { text: "ㄱ".to_string() },
            ]
        );

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(speaker.spoken().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(speaker.spoken(), vec!["ㄱ"]);
        assert_eq!(drain(&mut rx), vec![Feedback::Spoken { text: "ㄱ".to_string() }]);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(speaker.spoken().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_never_speaks() {
        let mut device = MockDeviceClient::new();
        device
            .expect_post()
            .times(1)
            .returning(|_, _| Ok(DeviceResponse { status: 500 }));
        let speaker = Arc::new(RecordingSpeaker::default());

        let store = store_with(&[LetterEntry::new(Level::Symbols, "ㄱ", "111011")]).await;
        let (session, mut rx) = SessionController::new(
            store,
            Arc::new(device),
            speaker.clone(),
            settings(Endpoint::Configurable(Some(URL.to_string())), PayloadMode::TextAndPattern),
        );

        let result = session.send_random_letter(Level::Symbols).await;
        assert_eq!(result, Err(SessionError::Rejected { status: 500 }));

        let events = drain(&mut rx);
        assert!(events.contains(&Feedback::Rejected { text: "ㄱ".to_string(), status: 500 }));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(speaker.spoken().is_empty());
        assert!(!session.speech().is_pending().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_reported() {
        let mut device = MockDeviceClient::new();
        device
            .expect_post()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("connection refused")));
        let speaker = Arc::new(RecordingSpeaker::default());

        let store = store_with(&[LetterEntry::new(Level::Words, "그리고", "011111010110")]).await;
        let (session, mut rx) = SessionController::new(
            store,
            Arc::new(device),
            speaker.clone(),
            settings(Endpoint::Configurable(Some(URL.to_string())), PayloadMode::TextAndPattern),
        );

        let result = session.send_random_letter(Level::Words).await;
        assert!(matches!(result, Err(SessionError::Transport(ref m)) if m.contains("connection refused")));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, Feedback::TransportFailed { message, .. } if message.contains("connection refused"))));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(speaker.spoken().is_empty());
    }

    #[tokio::test]
    async fn test_text_only_with_fixed_endpoint() {
        let mut device = MockDeviceClient::new();
        device
            .expect_post()
            .withf(|url, payload| url == "http://10.0.0.2/" && payload.pattern.is_none())
            .times(1)
            .returning(|_, _| Ok(DeviceResponse { status: 204 }));

        let store = store_with(&[LetterEntry::new(Level::Syllables, "나", "011011001110")]).await;
        let (session, _rx) = SessionController::new(
            store,
            Arc::new(device),
            Arc::new(RecordingSpeaker::default()),
            settings(Endpoint::Fixed("http://10.0.0.2/".to_string()), PayloadMode::TextOnly),
        );

        let delivery = session.send_random_letter(Level::Syllables).await.unwrap();
        assert_eq!(delivery.payload.to_json().unwrap(), r#"{"text":"나"}"#);

        assert!(session.is_endpoint_fixed().await);
        assert_eq!(session.set_endpoint("http://other/").await, Err(SessionError::FixedEndpoint));
        assert_eq!(session.clear_endpoint().await, Err(SessionError::FixedEndpoint));
    }

    #[tokio::test]
    async fn test_pattern_uses_first_stored_match() {
        let mut device = MockDeviceClient::new();
        device
            .expect_post()
            .withf(|_, payload| payload.pattern.as_deref() == Some("111011001110"))
            .times(1)
            .returning(|_, _| Ok(DeviceResponse { status: 200 }));

        // Level 3 "가" shares its text with an earlier level 2 row
        let store = store_with(&[
            LetterEntry::new(Level::Syllables, "가", "111011001110"),
            LetterEntry::new(Level::Words, "가", "001010"),
        ])
        .await;
        let (session, _rx) = SessionController::new(
            store,
            Arc::new(device),
            Arc::new(RecordingSpeaker::default()),
            settings(Endpoint::Configurable(Some(URL.to_string())), PayloadMode::TextAndPattern),
        );

        session.send_random_letter(Level::Words).await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_pattern_fallback() {
        let store = SqliteLetterStore::open_in_memory().unwrap();
        let (session, _rx) = SessionController::new(
            store,
            Arc::new(MockDeviceClient::new()),
            Arc::new(RecordingSpeaker::default()),
            settings(Endpoint::Configurable(None), PayloadMode::TextAndPattern),
        );

        assert_eq!(session.resolve_pattern("없음").await.unwrap(), FALLBACK_PATTERN);
    }

    #[tokio::test]
    async fn test_set_and_clear_endpoint() {
        let store = SqliteLetterStore::open_in_memory().unwrap();
        let (session, mut rx) = SessionController::new(
            store,
            Arc::new(MockDeviceClient::new()),
            Arc::new(RecordingSpeaker::default()),
            settings(Endpoint::Configurable(None), PayloadMode::TextAndPattern),
        );

        assert!(matches!(
            session.set_endpoint("not a url").await,
            Err(SessionError::InvalidEndpoint(_))
        ));
        assert_eq!(session.endpoint().await, None);

        let url = session.set_endpoint(" http://192.168.4.1/braille ").await.unwrap();
        assert_eq!(url, URL);
        assert_eq!(session.endpoint().await.as_deref(), Some(URL));
        assert_eq!(drain(&mut rx), vec![Feedback::EndpointSaved { url: URL.to_string() }]);

        session.clear_endpoint().await.unwrap();
        assert_eq!(session.endpoint().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_send_reports_through_queue() {
        let mut device = MockDeviceClient::new();
        device
            .expect_post()
            .times(1)
            .returning(|_, _| Ok(DeviceResponse { status: 200 }));

        let store = store_with(&[LetterEntry::new(Level::Symbols, "ㅎ", "101001")]).await;
        let (session, mut rx) = SessionController::new(
            store,
            Arc::new(device),
            Arc::new(RecordingSpeaker::default()),
            settings(Endpoint::Configurable(Some(URL.to_string())), PayloadMode::TextAndPattern),
        );

        session.spawn_send(Level::Symbols).await.unwrap();
        assert_eq!(rx.recv().await, Some(Feedback::Sending { text: "ㅎ".to_string() }));
        assert_eq!(rx.recv().await, Some(Feedback::Sent { text: "ㅎ".to_string() }));

        session.wait_for_speech().await;
        assert_eq!(rx.recv().await, Some(Feedback::Spoken { text: "ㅎ".to_string() }));
    }
}
