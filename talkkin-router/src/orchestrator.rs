//! Multimodal recognition orchestrator
//!
//! For one request:
//! 1. Snapshot the invocation order from the plugin registry (enabled only,
//!    priority descending, registration order on ties)
//! 2. Invoke each plugin in turn, under the per-invocation timeout
//! 3. Gate each result: it becomes a candidate only if its confidence is
//!    strictly greater than the plugin's `min_confidence`
//! 4. Optionally stop after the first passing candidate
//!    (`stop_on_first_success`, checked between invocations)
//! 5. Fuse the candidates: highest confidence wins, exact ties go to the
//!    earliest-registered plugin
//!
//! Plugin failures and timeouts are isolated: they are traced and audited,
//! and the pipeline continues. No plugins are invoked in parallel.

use crate::error::{RoutingError, RoutingResult};
use crate::plugins::{PluginDescriptor, PluginRegistry};
use crate::types::{
    clamp_confidence, InvocationError, RawRecognition, RecognitionInput, RecognitionResult,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use talkkin_common::audit::{record_or_report, AuditEvent, AuditKind, AuditSink, DEFAULT_LOCALE};
use talkkin_common::config::TomlConfig;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Audit source name for orchestrator-level events
pub const ORCHESTRATOR_SOURCE: &str = "orchestrator";

/// Reason attached to an outcome with no winner
pub const NO_RESULT_REASON: &str = "No exploitable result";

/// Rule applied when candidates have exactly equal confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Lowest registration index wins
    #[default]
    FirstRegistered,
    /// Highest registration index wins
    LastRegistered,
}

impl TieBreak {
    fn prefers(&self, challenger: usize, incumbent: usize) -> bool {
        match self {
            TieBreak::FirstRegistered => challenger < incumbent,
            TieBreak::LastRegistered => challenger > incumbent,
        }
    }
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub stop_on_first_success: bool,
    /// Expiry is handled exactly like a plugin error
    pub invocation_timeout: Duration,
    pub tie_break: TieBreak,
    /// Locale for audit events when the request carries none
    pub default_locale: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stop_on_first_success: false,
            invocation_timeout: Duration::from_millis(
                talkkin_common::config::DEFAULT_INVOCATION_TIMEOUT_MS,
            ),
            tie_break: TieBreak::default(),
            default_locale: DEFAULT_LOCALE.to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_toml(config: &TomlConfig) -> Self {
        Self {
            stop_on_first_success: config.routing.stop_on_first_success,
            invocation_timeout: config.routing.invocation_timeout(),
            tie_break: TieBreak::default(),
            default_locale: config.default_locale.clone(),
        }
    }
}

/// Per-plugin outcome, in invocation order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TraceEntry {
    /// Plugin answered (whether or not it passed the confidence gate)
    Result {
        plugin: String,
        result: RecognitionResult,
        passed_gate: bool,
    },
    /// Plugin failed or timed out
    Error { plugin: String, error: String },
}

impl TraceEntry {
    pub fn plugin(&self) -> &str {
        match self {
            TraceEntry::Result { plugin, .. } | TraceEntry::Error { plugin, .. } => plugin,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TraceEntry::Error { .. })
    }
}

/// Fusion winner, or the explicit none-marker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Winner {
    Selected(RecognitionResult),
    NoResult { reason: String },
}

/// A gated candidate with its tie-break key
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub registration_index: usize,
    pub result: RecognitionResult,
}

/// Outcome of one recognition request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionOutcome {
    pub request_id: Uuid,
    pub winner: Winner,
    /// Results that passed their confidence gate, in invocation order
    pub candidates: Vec<RecognitionResult>,
    pub trace: Vec<TraceEntry>,
}

impl FusionOutcome {
    pub fn winner(&self) -> Option<&RecognitionResult> {
        match &self.winner {
            Winner::Selected(result) => Some(result),
            Winner::NoResult { .. } => None,
        }
    }

    /// Convert to the error form for callers that want one
    ///
    /// # Errors
    /// `NoViableResult` carrying the trace when there is no winner
    pub fn into_result(self) -> RoutingResult<RecognitionResult> {
        match self.winner {
            Winner::Selected(result) => Ok(result),
            Winner::NoResult { .. } => Err(RoutingError::NoViableResult { trace: self.trace }),
        }
    }
}

/// Select the winning candidate
///
/// Maximum confidence wins; exact ties are resolved by `tie_break` on
/// registration index. Returns `None` for an empty slice.
pub fn fuse_candidates(candidates: &[Candidate], tie_break: TieBreak) -> Option<&Candidate> {
    candidates.iter().fold(None, |best: Option<&Candidate>, candidate| match best {
        None => Some(candidate),
        Some(incumbent) => {
            let challenger_conf = candidate.result.confidence;
            let incumbent_conf = incumbent.result.confidence;
            if challenger_conf > incumbent_conf
                || (challenger_conf == incumbent_conf
                    && tie_break.prefers(candidate.registration_index, incumbent.registration_index))
            {
                Some(candidate)
            } else {
                Some(incumbent)
            }
        }
    })
}

/// Recognition orchestrator
///
/// Owns its plugin registry. Registry mutations take effect for requests
/// started afterwards; in-flight requests keep the order they snapshotted.
pub struct RecognitionOrchestrator {
    registry: RwLock<PluginRegistry>,
    config: OrchestratorConfig,
    audit: Arc<dyn AuditSink>,
}

impl RecognitionOrchestrator {
    pub fn new(registry: PluginRegistry, config: OrchestratorConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            registry: RwLock::new(registry),
            config,
            audit,
        }
    }

    /// Build from loaded configuration, applying per-plugin overrides
    pub fn from_config(
        mut registry: PluginRegistry,
        config: &TomlConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        registry.apply_overrides(&config.routing.plugins);
        Self::new(registry, OrchestratorConfig::from_toml(config), audit)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub async fn add_plugin(&self, descriptor: PluginDescriptor) -> RoutingResult<usize> {
        self.registry.write().await.register(descriptor)
    }

    pub async fn remove_plugin(&self, name: &str) -> RoutingResult<PluginDescriptor> {
        self.registry.write().await.remove(name)
    }

    pub async fn set_plugin_enabled(&self, name: &str, enabled: bool) -> RoutingResult<()> {
        self.registry.write().await.set_enabled(name, enabled)?;
        info!(plugin = name, enabled, "Plugin enabled state changed");
        Ok(())
    }

    pub async fn set_plugin_priority(&self, name: &str, priority: i32) -> RoutingResult<()> {
        self.registry.write().await.set_priority(name, priority)
    }

    /// Names in the order the next request would invoke them
    pub async fn ordered_plugin_names(&self) -> Vec<String> {
        self.registry
            .read()
            .await
            .ordered()
            .into_iter()
            .map(|p| p.descriptor.name)
            .collect()
    }

    /// Run one recognition request through the plugin pipeline
    ///
    /// Never fails: no winner is reported as [`Winner::NoResult`].
    pub async fn recognize(&self, input: &RecognitionInput) -> FusionOutcome {
        let request_id = Uuid::new_v4();
        let locale = input
            .options
            .locale
            .clone()
            .unwrap_or_else(|| self.config.default_locale.clone());
        let user_id = input.options.user_id.clone();

        // Snapshot so registry writers are never blocked by slow plugins
        let plugins = self.registry.read().await.ordered();
        debug!(%request_id, plugin_count = plugins.len(), "Starting recognition pipeline");

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut trace = Vec::with_capacity(plugins.len());

        for plugin in plugins {
            let descriptor = &plugin.descriptor;
            match self.invoke(descriptor, input).await {
                Ok(raw) => {
                    let result = RecognitionResult {
                        text: raw.text,
                        confidence: clamp_confidence(raw.confidence),
                        source_plugin: descriptor.name.clone(),
                        raw: raw.raw,
                    };
                    let passed_gate = result.confidence > descriptor.min_confidence;
                    debug!(
                        %request_id,
                        plugin = %descriptor.name,
                        confidence = result.confidence,
                        min_confidence = descriptor.min_confidence,
                        passed_gate,
                        "Plugin answered"
                    );

                    trace.push(TraceEntry::Result {
                        plugin: descriptor.name.clone(),
                        result: result.clone(),
                        passed_gate,
                    });
                    let event = AuditEvent::new(AuditKind::Info, &descriptor.name, "Recognition result")
                        .with_data(json!({
                            "requestId": request_id,
                            "text": result.text,
                            "confidence": result.confidence,
                            "minConfidence": descriptor.min_confidence,
                            "passedGate": passed_gate,
                            "raw": result.raw,
                        }))
                        .with_user(user_id.clone())
                        .with_locale(locale.clone());
                    record_or_report(self.audit.as_ref(), &event);

                    if passed_gate {
                        candidates.push(Candidate {
                            registration_index: plugin.registration_index,
                            result,
                        });
                        if self.config.stop_on_first_success {
                            debug!(%request_id, plugin = %descriptor.name, "Stopping on first success");
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        %request_id,
                        plugin = %descriptor.name,
                        error = %e,
                        "Plugin invocation failed, continuing with next plugin"
                    );
                    trace.push(TraceEntry::Error {
                        plugin: descriptor.name.clone(),
                        error: e.to_string(),
                    });
                    let event = AuditEvent::new(AuditKind::Error, &descriptor.name, e.to_string())
                        .with_data(json!({ "requestId": request_id }))
                        .with_user(user_id.clone())
                        .with_locale(locale.clone());
                    record_or_report(self.audit.as_ref(), &event);
                }
            }
        }

        let winner = match fuse_candidates(&candidates, self.config.tie_break) {
            Some(best) => Winner::Selected(best.result.clone()),
            None => Winner::NoResult {
                reason: NO_RESULT_REASON.to_string(),
            },
        };
        let candidates: Vec<RecognitionResult> =
            candidates.into_iter().map(|c| c.result).collect();

        let event = AuditEvent::new(AuditKind::Decision, ORCHESTRATOR_SOURCE, "Fusion of results")
            .with_data(json!({
                "requestId": request_id,
                "winner": winner,
                "candidates": candidates,
            }))
            .with_user(user_id)
            .with_locale(locale);
        record_or_report(self.audit.as_ref(), &event);

        match &winner {
            Winner::Selected(result) => info!(
                %request_id,
                plugin = %result.source_plugin,
                confidence = result.confidence,
                candidate_count = candidates.len(),
                "Recognition fused"
            ),
            Winner::NoResult { .. } => info!(
                %request_id,
                attempted = trace.len(),
                "Recognition produced no exploitable result"
            ),
        }

        FusionOutcome {
            request_id,
            winner,
            candidates,
            trace,
        }
    }

    async fn invoke(
        &self,
        descriptor: &PluginDescriptor,
        input: &RecognitionInput,
    ) -> Result<RawRecognition, InvocationError> {
        let timeout = self.config.invocation_timeout;
        match tokio::time::timeout(timeout, descriptor.recognizer.recognize(input)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(InvocationError::Timeout(timeout)),
        }
    }
}
