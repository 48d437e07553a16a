//! Braille display device client
//!
//! The device is a best-effort peer on the local network (typically a
//! NodeMCU board) that accepts a JSON POST and raises the pins for the
//! received pattern. Only the HTTP status of its answer is inspected.
//!
//! ```text
//! Session → DeviceClient::post(url, payload) → device
//!                  ↓
//!           DeviceResponse { status }
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Content type of every outbound request
pub const JSON_UTF8: &str = "application/json; charset=utf-8";

/// JSON body sent to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BraillePayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl BraillePayload {
    /// `{"text": ...}`
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pattern: None,
        }
    }

    /// `{"text": ..., "pattern": ...}`
    pub fn with_pattern(text: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pattern: Some(pattern.into()),
        }
    }

    /// Serialized request body
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize payload")
    }
}

/// Which fields the device expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadMode {
    /// Text only; the device derives the dots itself
    TextOnly,
    /// Text plus the stored braille pattern
    #[default]
    TextAndPattern,
}

/// Status returned by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceResponse {
    pub status: u16,
}

impl DeviceResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends payloads to a device endpoint
///
/// A non-2xx answer is a normal `Ok` response; `Err` means no response
/// was obtained at all.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn post(&self, url: &str, payload: &BraillePayload) -> Result<DeviceResponse>;
}

/// HTTP implementation of [`DeviceClient`]
///
/// No request timeout is set: a call resolves only when the transport does.
pub struct HttpDeviceClient {
    client: Client,
}

impl HttpDeviceClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpDeviceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceClient for HttpDeviceClient {
    async fn post(&self, url: &str, payload: &BraillePayload) -> Result<DeviceResponse> {
        let body = payload.to_json()?;
        debug!("POST {} {}", url, body);

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, JSON_UTF8)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach device at {}", url))?;

        let status = response.status().as_u16();
        info!("Device at {} answered {}", url, status);

        Ok(DeviceResponse { status })
    }
}

/// Check that a user-supplied endpoint is an absolute http(s) URL
pub fn validate_endpoint(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("Device URL is empty");
    }

    let parsed = url::Url::parse(trimmed)
        .with_context(|| format!("Invalid device URL '{}'", trimmed))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => bail!("Unsupported URL scheme '{}': use http or https", other),
    }

    if parsed.host_str().is_none() {
        bail!("Device URL '{}' has no host", trimmed);
    }

    Ok(trimmed.to_string())
}
