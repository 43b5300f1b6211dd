//! Caller-facing routing errors
//!
//! Individual backend failures never reach callers as-is: they are folded
//! into the trace/attempt lists carried by these variants.

use crate::orchestrator::TraceEntry;
use serde::Serialize;
use thiserror::Error;

/// One failed provider attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: String,
}

/// Routing error type
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Every attempted provider failed (paid ones only if authorized)
    #[error("No translation provider available ({} attempted)", attempted.len())]
    NoProviderAvailable { attempted: Vec<ProviderFailure> },

    /// No plugin produced a result passing its confidence gate
    #[error("No exploitable recognition result")]
    NoViableResult { trace: Vec<TraceEntry> },

    /// A plugin with this name is already registered
    #[error("Plugin already registered: {0}")]
    DuplicatePlugin(String),

    /// A provider with this name is already registered
    #[error("Provider already registered: {0}")]
    DuplicateProvider(String),

    /// No plugin with this name
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// talkkin-common error
    #[error("Common error: {0}")]
    Common(#[from] talkkin_common::Error),
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
