//! Audit event model and sinks
//!
//! Every significant routing step (plugin result, plugin failure, fusion
//! decision, paid provider call) produces one [`AuditEvent`]. Events are
//! immutable once built and are handed to an injected [`AuditSink`].
//!
//! Sinks provided here:
//! - [`TracingAuditSink`] - renders events through `tracing` (default)
//! - [`MemoryAuditSink`] - append-only in-memory log
//! - [`AuditBus`] - broadcast fan-out to live subscribers
//! - [`JsonlAuditSink`] - append-only line-delimited JSON file
//! - [`FanoutAuditSink`] - forwards to several sinks
//!
//! Audit failures never abort a routing operation: callers report them via
//! `tracing::error!` and carry on.

mod bus;
mod paid_usage;
mod sinks;

pub use bus::AuditBus;
pub use paid_usage::{
    truncate_chars, PaidUsageLog, PaidUsageRecord, DEFAULT_PAID_USAGE_LOG, PAID_TEXT_MAX_CHARS,
};
pub use sinks::{FanoutAuditSink, JsonlAuditSink, MemoryAuditSink, TracingAuditSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Locale attached to events when the request does not carry one
pub const DEFAULT_LOCALE: &str = "fr";

/// Audit event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditKind {
    /// Informational (e.g. raw plugin result)
    Info,
    /// A plugin or provider invocation failed
    Error,
    /// A routing decision (fusion winner, provider selection)
    Decision,
    /// A billable provider call
    PaidUsage,
    /// User feedback on a result
    Feedback,
}

impl AuditKind {
    /// Wire name, as used in the `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Info => "info",
            AuditKind::Error => "error",
            AuditKind::Decision => "decision",
            AuditKind::PaidUsage => "paid-usage",
            AuditKind::Feedback => "feedback",
        }
    }
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured audit record
///
/// Serializes to the flat external record consumed by log shippers:
/// `{ timestamp, type, source, message, data, userId, locale }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// When the event was created (RFC 3339 on the wire)
    pub timestamp: DateTime<Utc>,
    /// Event category
    #[serde(rename = "type")]
    pub kind: AuditKind,
    /// Emitting component or plugin name
    pub source: String,
    /// Human-readable message
    pub message: String,
    /// Structured payload
    pub data: serde_json::Value,
    /// Requesting user, if known
    pub user_id: Option<String>,
    /// Request locale
    pub locale: String,
}

impl AuditEvent {
    /// Create an event stamped with the current time and the default locale
    pub fn new(kind: AuditKind, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            source: source.into(),
            message: message.into(),
            data: serde_json::Value::Object(Default::default()),
            user_id: None,
            locale: DEFAULT_LOCALE.to_string(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }
}

/// Audit sink failure
#[derive(Debug, Error)]
pub enum AuditError {
    /// Underlying writer failed
    #[error("Audit IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Event could not be encoded
    #[error("Audit encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Sink is unusable (poisoned lock, closed channel, ...)
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for audit events
///
/// Implementations must be cheap to call from inside a request; they are
/// shared as `Arc<dyn AuditSink>` across concurrent requests.
pub trait AuditSink: Send + Sync {
    /// Accept one event
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Record `event`, reporting a sink failure on the error log instead of
/// propagating it
///
/// Returns whether the sink accepted the event.
pub fn record_or_report(sink: &dyn AuditSink, event: &AuditEvent) -> bool {
    match sink.record(event) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(
                kind = %event.kind,
                source = %event.source,
                error = %e,
                "Audit sink failed to record event"
            );
            false
        }
    }
}
