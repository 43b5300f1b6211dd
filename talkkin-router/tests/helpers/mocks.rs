//! Mock recognizers, mock translators and audit sinks

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use talkkin_common::audit::{AuditError, AuditEvent, AuditSink};
use talkkin_router::{
    InvocationError, PluginDescriptor, RawRecognition, RecognitionInput, Recognizer, Translation,
    Translator,
};

/// Shared invocation counter
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Recognizers
// ============================================================================

enum RecognizerBehavior {
    Answer { text: String, confidence: f64 },
    Fail(String),
    Slow { delay: Duration, text: String, confidence: f64 },
}

pub struct MockRecognizer {
    behavior: RecognizerBehavior,
    pub calls: CallCounter,
}

impl MockRecognizer {
    pub fn answering(text: &str, confidence: f64) -> Self {
        Self::with(RecognizerBehavior::Answer {
            text: text.to_string(),
            confidence,
        })
    }

    pub fn failing(message: &str) -> Self {
        Self::with(RecognizerBehavior::Fail(message.to_string()))
    }

    pub fn slow(delay: Duration, text: &str, confidence: f64) -> Self {
        Self::with(RecognizerBehavior::Slow {
            delay,
            text: text.to_string(),
            confidence,
        })
    }

    fn with(behavior: RecognizerBehavior) -> Self {
        Self {
            behavior,
            calls: CallCounter::default(),
        }
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn recognize(&self, _input: &RecognitionInput) -> Result<RawRecognition, InvocationError> {
        self.calls.hit();
        match &self.behavior {
            RecognizerBehavior::Answer { text, confidence } => {
                Ok(RawRecognition::new(text.as_str(), *confidence))
            }
            RecognizerBehavior::Fail(message) => Err(InvocationError::Failed(message.clone())),
            RecognizerBehavior::Slow {
                delay,
                text,
                confidence,
            } => {
                tokio::time::sleep(*delay).await;
                Ok(RawRecognition::new(text.as_str(), *confidence))
            }
        }
    }
}

/// Descriptor around a mock, returning the mock's call counter too
pub fn mock_plugin(name: &str, recognizer: MockRecognizer) -> (PluginDescriptor, CallCounter) {
    let calls = recognizer.calls.clone();
    (PluginDescriptor::new(name, Arc::new(recognizer)), calls)
}

// ============================================================================
// Translators
// ============================================================================

enum TranslatorBehavior {
    Prefix(String),
    Fail(String),
    Slow(Duration),
}

pub struct MockTranslator {
    behavior: TranslatorBehavior,
    pub calls: CallCounter,
}

impl MockTranslator {
    /// Answers `"<prefix>:<text>"`
    pub fn answering(prefix: &str) -> Self {
        Self::with(TranslatorBehavior::Prefix(prefix.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with(TranslatorBehavior::Fail(message.to_string()))
    }

    pub fn slow(delay: Duration) -> Self {
        Self::with(TranslatorBehavior::Slow(delay))
    }

    fn with(behavior: TranslatorBehavior) -> Self {
        Self {
            behavior,
            calls: CallCounter::default(),
        }
    }

    /// Wrap in an `Arc`, returning the call counter alongside
    pub fn shared(self) -> (Arc<dyn Translator>, CallCounter) {
        let calls = self.calls.clone();
        (Arc::new(self), calls)
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(
        &self,
        text: &str,
        _from_lang: &str,
        _to_lang: &str,
    ) -> Result<Translation, InvocationError> {
        self.calls.hit();
        match &self.behavior {
            TranslatorBehavior::Prefix(prefix) => Ok(Translation::new(format!("{}:{}", prefix, text))),
            TranslatorBehavior::Fail(message) => Err(InvocationError::Network(message.clone())),
            TranslatorBehavior::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Translation::new(text))
            }
        }
    }
}

// ============================================================================
// Audit
// ============================================================================

/// Sink that rejects every event
#[derive(Debug, Default)]
pub struct FailingAuditSink {
    pub attempts: CallCounter,
}

impl AuditSink for FailingAuditSink {
    fn record(&self, _event: &AuditEvent) -> Result<(), AuditError> {
        self.attempts.hit();
        Err(AuditError::Unavailable("audit backend offline".to_string()))
    }
}
