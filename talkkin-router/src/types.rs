//! Core types and backend contracts for the routing core
//!
//! Recognition plugins implement [`Recognizer`], translation providers
//! implement [`Translator`]. Both report failures as [`InvocationError`],
//! which the routing layer always recovers from locally.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Confidence score (0.0-1.0)
pub type Confidence = f64;

/// Clamp a backend-reported confidence into 0.0-1.0 (NaN counts as 0.0)
pub fn clamp_confidence(confidence: Confidence) -> Confidence {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

// ============================================================================
// Recognition
// ============================================================================

/// Per-request options forwarded to plugins
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecognitionOptions {
    /// Request locale (orchestrator default when absent)
    pub locale: Option<String>,
    /// Requesting user, copied into audit events
    pub user_id: Option<String>,
    /// Free-form plugin options
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Multimodal recognition request
///
/// Every modality is optional; a plugin uses whichever payloads it handles.
#[derive(Debug, Clone, Default)]
pub struct RecognitionInput {
    pub audio_input: Option<Vec<u8>>,
    pub video_input: Option<Vec<u8>>,
    pub image_input: Option<Vec<u8>>,
    pub options: RecognitionOptions,
}

impl RecognitionInput {
    pub fn audio(bytes: Vec<u8>) -> Self {
        Self {
            audio_input: Some(bytes),
            ..Default::default()
        }
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        Self {
            image_input: Some(bytes),
            ..Default::default()
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.options.locale = Some(locale.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.options.user_id = Some(user_id.into());
        self
    }
}

/// What a plugin returns: `{ text, confidence }` plus its untouched payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecognition {
    pub text: String,
    pub confidence: Confidence,
    /// Backend-specific payload, passed through opaquely
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl RawRecognition {
    pub fn new(text: impl Into<String>, confidence: Confidence) -> Self {
        Self {
            text: text.into(),
            confidence,
            raw: serde_json::Value::Null,
        }
    }
}

/// Recognition result attributed to the plugin that produced it
///
/// Immutable once returned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub text: String,
    /// Clamped to 0.0-1.0
    pub confidence: Confidence,
    pub source_plugin: String,
    pub raw: serde_json::Value,
}

/// Recognition backend contract (audio ASR, OCR, lip reading, ...)
#[async_trait::async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize the request
    ///
    /// # Errors
    /// Any failure is isolated to this plugin; the orchestrator logs it and
    /// moves on to the next plugin.
    async fn recognize(&self, input: &RecognitionInput) -> Result<RawRecognition, InvocationError>;
}

// ============================================================================
// Translation
// ============================================================================

/// Provider billing tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    Free,
    Paid,
}

impl ProviderTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTier::Free => "free",
            ProviderTier::Paid => "paid",
        }
    }
}

impl std::fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a provider returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub translated_text: String,
    /// Monetary cost of the call, if the provider reports one
    pub cost: Option<f64>,
}

impl Translation {
    pub fn new(translated_text: impl Into<String>) -> Self {
        Self {
            translated_text: translated_text.into(),
            cost: None,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}

/// Translation backend contract (Apertium, Tatoeba, DeepL, ...)
#[async_trait::async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        from_lang: &str,
        to_lang: &str,
    ) -> Result<Translation, ProviderError>;
}

// ============================================================================
// Errors
// ============================================================================

/// A single plugin or provider invocation failed
///
/// Always recovered locally by the routing layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvocationError {
    /// Backend reported a failure
    #[error("Invocation failed: {0}")]
    Failed(String),

    /// Backend cannot serve this request (missing model, unsupported pair)
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// No answer within the configured per-invocation timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Provider failures share the invocation taxonomy
pub type ProviderError = InvocationError;
