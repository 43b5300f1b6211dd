//! Cost-aware translation provider chain
//!
//! Free providers are always tried first, in registration order. Paid
//! providers are appended to the attempt list only when the request's
//! [`CostPolicy`] permits them (`mode == allow_paid` **and** `allow_paid`).
//! Without that authorization the paid branch is never constructed, so no
//! amount of free-provider failure can reach a paid backend.
//!
//! Every successful paid call is audited (`paid-usage` event, plus the
//! optional JSONL ledger) before its result is handed back to the caller.

use crate::cascade::cascade_async;
use crate::error::{ProviderFailure, RoutingError, RoutingResult};
use crate::types::{InvocationError, ProviderTier, Translation, Translator};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use talkkin_common::audit::{
    record_or_report, AuditEvent, AuditKind, AuditSink, PaidUsageLog, PaidUsageRecord,
};
use talkkin_common::config::{CostPolicy, TomlConfig, DEFAULT_INVOCATION_TIMEOUT_MS};
use tracing::{debug, error, info, warn};

/// Audit source name for chain-level events
pub const PROVIDER_CHAIN_SOURCE: &str = "provider-chain";

/// Translation provider descriptor
#[derive(Clone)]
pub struct ProviderDescriptor {
    pub name: String,
    pub tier: ProviderTier,
    pub translator: Arc<dyn Translator>,
}

impl ProviderDescriptor {
    pub fn free(name: impl Into<String>, translator: Arc<dyn Translator>) -> Self {
        Self {
            name: name.into(),
            tier: ProviderTier::Free,
            translator,
        }
    }

    pub fn paid(name: impl Into<String>, translator: Arc<dyn Translator>) -> Self {
        Self {
            name: name.into(),
            tier: ProviderTier::Paid,
            translator,
        }
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}

/// Successful translation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    pub text: String,
    pub provider_name: String,
    pub tier: ProviderTier,
    /// Monetary cost reported by the provider, if any
    pub cost: Option<f64>,
}

/// Provider chain
///
/// Owns its provider list; registration order is the attempt order within
/// each tier.
pub struct ProviderChain {
    providers: Vec<ProviderDescriptor>,
    audit: Arc<dyn AuditSink>,
    paid_log: Option<Arc<PaidUsageLog>>,
    invocation_timeout: Duration,
}

impl ProviderChain {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            providers: Vec::new(),
            audit,
            paid_log: None,
            invocation_timeout: Duration::from_millis(DEFAULT_INVOCATION_TIMEOUT_MS),
        }
    }

    /// Build from loaded configuration (timeout and paid-usage ledger)
    ///
    /// # Errors
    /// Configuration error if the ledger file cannot be opened
    pub fn from_config(config: &TomlConfig, audit: Arc<dyn AuditSink>) -> RoutingResult<Self> {
        let mut chain = Self::new(audit).with_invocation_timeout(config.routing.invocation_timeout());
        if let Some(path) = &config.routing.paid_usage_log {
            let log = PaidUsageLog::open(path).map_err(|e| {
                talkkin_common::Error::Config(format!(
                    "Cannot open paid usage log {}: {}",
                    path.display(),
                    e
                ))
            })?;
            chain = chain.with_paid_usage_log(Arc::new(log));
        }
        Ok(chain)
    }

    pub fn with_paid_usage_log(mut self, log: Arc<PaidUsageLog>) -> Self {
        self.paid_log = Some(log);
        self
    }

    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    /// Register a provider
    ///
    /// # Errors
    /// `DuplicateProvider` if the name is already taken
    pub fn register(&mut self, provider: ProviderDescriptor) -> RoutingResult<()> {
        if self.providers.iter().any(|p| p.name == provider.name) {
            return Err(RoutingError::DuplicateProvider(provider.name));
        }
        debug!(provider = %provider.name, tier = %provider.tier, "Provider registered");
        self.providers.push(provider);
        Ok(())
    }

    /// Registered provider names, in registration order
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name.clone()).collect()
    }

    /// Attempt order under `policy`
    ///
    /// Free providers in registration order, then paid providers only if
    /// the policy permits them.
    pub fn plan(&self, policy: &CostPolicy) -> Vec<&ProviderDescriptor> {
        let free = self.providers.iter().filter(|p| p.tier == ProviderTier::Free);
        if policy.permits_paid() {
            let paid = self.providers.iter().filter(|p| p.tier == ProviderTier::Paid);
            free.chain(paid).collect()
        } else {
            free.collect()
        }
    }

    /// Translate `text`, falling back through the planned providers
    ///
    /// # Errors
    /// `NoProviderAvailable` if every attempted provider failed
    pub async fn translate(
        &self,
        text: &str,
        from_lang: &str,
        to_lang: &str,
        policy: CostPolicy,
    ) -> RoutingResult<TranslationResult> {
        let plan = self.plan(&policy);
        debug!(
            mode = ?policy.mode,
            allow_paid = policy.allow_paid,
            paid_permitted = policy.permits_paid(),
            attempts = plan.len(),
            from_lang,
            to_lang,
            "Translation routing planned"
        );

        let failures: Mutex<Vec<ProviderFailure>> = Mutex::new(Vec::new());
        let outcome = cascade_async(
            plan.into_iter().map(|provider| {
                let failures = &failures;
                move || self.attempt(provider, text, from_lang, to_lang, failures)
            }),
            |_| true,
        )
        .await;

        match outcome {
            Some(result) => {
                info!(
                    provider = %result.provider_name,
                    tier = %result.tier,
                    from_lang,
                    to_lang,
                    "Translation provided"
                );
                Ok(result)
            }
            None => {
                let attempted = failures.into_inner().unwrap_or_else(|e| e.into_inner());
                warn!(
                    attempted = attempted.len(),
                    from_lang,
                    to_lang,
                    "No translation provider available"
                );
                let event = AuditEvent::new(
                    AuditKind::Error,
                    PROVIDER_CHAIN_SOURCE,
                    "No translation provider available",
                )
                .with_data(json!({
                    "fromLang": from_lang,
                    "toLang": to_lang,
                    "paidPermitted": policy.permits_paid(),
                    "attempted": attempted,
                }));
                record_or_report(self.audit.as_ref(), &event);
                Err(RoutingError::NoProviderAvailable { attempted })
            }
        }
    }

    async fn attempt(
        &self,
        provider: &ProviderDescriptor,
        text: &str,
        from_lang: &str,
        to_lang: &str,
        failures: &Mutex<Vec<ProviderFailure>>,
    ) -> Result<Option<TranslationResult>, InvocationError> {
        match self.invoke(provider, text, from_lang, to_lang).await {
            Ok(translation) => {
                if provider.tier == ProviderTier::Paid {
                    self.record_paid_usage(provider, text, from_lang, to_lang);
                }
                Ok(Some(TranslationResult {
                    text: translation.translated_text,
                    provider_name: provider.name.clone(),
                    tier: provider.tier,
                    cost: translation.cost,
                }))
            }
            Err(e) => {
                warn!(
                    provider = %provider.name,
                    tier = %provider.tier,
                    error = %e,
                    "Translation provider failed, falling back"
                );
                if let Ok(mut failures) = failures.lock() {
                    failures.push(ProviderFailure {
                        provider: provider.name.clone(),
                        error: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    async fn invoke(
        &self,
        provider: &ProviderDescriptor,
        text: &str,
        from_lang: &str,
        to_lang: &str,
    ) -> Result<Translation, InvocationError> {
        let timeout = self.invocation_timeout;
        match tokio::time::timeout(timeout, provider.translator.translate(text, from_lang, to_lang))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(InvocationError::Timeout(timeout)),
        }
    }

    /// Audit one paid call; failures are reported, never propagated
    fn record_paid_usage(&self, provider: &ProviderDescriptor, text: &str, from_lang: &str, to_lang: &str) {
        let record = PaidUsageRecord::new(&provider.name, text, from_lang, to_lang);
        let data = serde_json::to_value(&record).unwrap_or_else(|_| {
            json!({ "adapter": record.adapter, "fromLang": from_lang, "toLang": to_lang })
        });
        let event = AuditEvent::new(AuditKind::PaidUsage, &provider.name, "Paid translation provider used")
            .with_data(data);
        record_or_report(self.audit.as_ref(), &event);

        if let Some(log) = &self.paid_log {
            if let Err(e) = log.append(&record) {
                error!(
                    provider = %provider.name,
                    path = %log.path().display(),
                    error = %e,
                    "Failed to append paid usage record"
                );
            }
        }
    }
}
