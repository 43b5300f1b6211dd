//! # Talk Kin Router
//!
//! Routing core of the Talk Kin translation service:
//! - Fallback cascade combinator
//! - Recognition orchestrator over a plugin registry (confidence gating, fusion)
//! - Cost-aware translation provider chain with paid-usage auditing
//! - Regional variant resolution

pub mod cascade;
pub mod error;
pub mod orchestrator;
pub mod plugins;
pub mod providers;
pub mod types;
pub mod variants;

pub use cascade::{cascade, cascade_async, cascade_first};
pub use error::{ProviderFailure, RoutingError, RoutingResult};
pub use orchestrator::{
    FusionOutcome, OrchestratorConfig, RecognitionOrchestrator, TieBreak, TraceEntry, Winner,
};
pub use plugins::{PluginDescriptor, PluginRegistry};
pub use providers::{ProviderChain, ProviderDescriptor, TranslationResult};
pub use types::{
    InvocationError, ProviderError, ProviderTier, RawRecognition, RecognitionInput,
    RecognitionResult, Recognizer, Translation, Translator,
};
pub use variants::{DetectionMethod, VariantContext, VariantDetectionResult, VariantResolver};
