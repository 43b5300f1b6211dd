//! Regional variant resolution
//!
//! Picks the best regional variant for a base language, normalizes variant
//! aliases and builds the degradation chain used when a variant is not
//! served.
//!
//! Detection order (first hit wins):
//! 1. Explicit region/country in the request context, via the per-language
//!    region table
//! 2. Accept-Language preferences, ranked by q-weight, first supported
//!    `language-*` entry
//! 3. Per-language default variant
//!
//! Detections are memoized per `(language, context)` for the lifetime of
//! the resolver. The cache lookup, detection and insert run as one critical
//! section, so a shared resolver never computes the same key twice.

use crate::cascade::cascade_first;
use crate::types::Confidence;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::convert::Infallible;
use std::sync::Mutex;
use tracing::debug;

/// Confidence for a region or Accept-Language match
pub const MATCH_CONFIDENCE: Confidence = 0.8;

/// Confidence for a default-variant fallback
pub const DEFAULT_CONFIDENCE: Confidence = 0.5;

/// How a variant was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    Region,
    AcceptLanguage,
    Default,
}

/// Request context used for detection
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantContext {
    /// User region code (e.g. "BR")
    pub region: Option<String>,
    /// User country code, used when `region` is absent
    pub country: Option<String>,
    /// Raw Accept-Language header value
    pub accept_language: Option<String>,
}

impl VariantContext {
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_accept_language(mut self, header: impl Into<String>) -> Self {
        self.accept_language = Some(header.into());
        self
    }
}

/// Detection outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantDetectionResult {
    pub requested_language: String,
    pub resolved_variant: String,
    pub confidence: Confidence,
    pub method: DetectionMethod,
}

/// Resolver usage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantStats {
    pub cached_detections: usize,
    pub supported_variants: usize,
}

/// Lookup tables driving detection, normalization and fallback
#[derive(Debug, Clone, PartialEq)]
pub struct VariantTables {
    /// base language -> REGION -> variant
    pub region_variants: BTreeMap<String, BTreeMap<String, String>>,
    /// base language -> default variant
    pub defaults: BTreeMap<String, String>,
    /// variant -> ordered fallback chain (most specific first)
    pub fallback_chains: BTreeMap<String, Vec<String>>,
    /// lower-cased alias -> canonical variant
    pub aliases: BTreeMap<String, String>,
    /// Variants the translation stack can serve
    pub supported: BTreeSet<String>,
}

fn owned_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for VariantTables {
    fn default() -> Self {
        let region_variants = [
            ("pt", &[("BR", "pt-BR"), ("PT", "pt-PT"), ("AO", "pt-AO"), ("MZ", "pt-MZ")]),
            ("fr", &[("CA", "fr-CA"), ("FR", "fr-FR"), ("BE", "fr-BE"), ("CH", "fr-CH")]),
            ("es", &[("MX", "es-MX"), ("ES", "es-ES"), ("AR", "es-AR"), ("CO", "es-CO")]),
            ("en", &[("US", "en-US"), ("GB", "en-GB"), ("CA", "en-CA"), ("AU", "en-AU")]),
            ("ar", &[("SA", "ar-SA"), ("EG", "ar-EG"), ("MA", "ar-MA"), ("LV", "ar-LV")]),
            ("zh", &[("CN", "zh-CN"), ("TW", "zh-TW"), ("HK", "zh-HK"), ("SG", "zh-SG")]),
        ]
        .into_iter()
        .map(|(base, regions)| (base.to_string(), owned_map(regions)))
        .collect();

        let defaults = owned_map(&[
            ("en", "en-US"),
            ("fr", "fr-FR"),
            ("es", "es-ES"),
            ("pt", "pt-PT"),
            ("ar", "ar-SA"),
            ("de", "de-DE"),
        ]);

        let fallback_chains = [
            ("pt-BR", ["pt-BR", "pt-PT", "pt"]),
            ("pt-PT", ["pt-PT", "pt-BR", "pt"]),
            ("fr-CA", ["fr-CA", "fr-FR", "fr"]),
            ("fr-FR", ["fr-FR", "fr-CA", "fr"]),
            ("es-MX", ["es-MX", "es-ES", "es"]),
            ("es-ES", ["es-ES", "es-MX", "es"]),
            ("en-US", ["en-US", "en-GB", "en"]),
            ("en-GB", ["en-GB", "en-US", "en"]),
            ("ar-SA", ["ar-SA", "ar-EG", "ar"]),
            ("ar-EG", ["ar-EG", "ar-SA", "ar"]),
        ]
        .into_iter()
        .map(|(variant, chain)| {
            (
                variant.to_string(),
                chain.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect();

        let aliases = owned_map(&[
            ("pt-br", "pt-BR"),
            ("pt-pt", "pt-PT"),
            ("fr-ca", "fr-CA"),
            ("fr-fr", "fr-FR"),
            ("es-mx", "es-MX"),
            ("es-es", "es-ES"),
            ("en-us", "en-US"),
            ("en-gb", "en-GB"),
            ("zh-cn", "zh-CN"),
            ("zh-tw", "zh-TW"),
        ]);

        let supported = [
            "pt-BR", "pt-PT", "fr-CA", "fr-FR", "fr-BE", "fr-CH", "es-MX", "es-ES", "es-AR",
            "es-CO", "en-US", "en-GB", "en-CA", "ar-SA", "ar-EG", "ar-MA", "zh-CN", "zh-TW",
            "zh-HK",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            region_variants,
            defaults,
            fallback_chains,
            aliases,
            supported,
        }
    }
}

/// Parse an Accept-Language header into `(tag, weight)` pairs
///
/// Ranked by weight descending; equal weights keep header order. A missing
/// weight is 1.0, an unparsable one counts as 0. Entries with weight 0 are
/// "not acceptable" and dropped, as are empty entries.
pub fn parse_accept_language(header: &str) -> Vec<(String, f64)> {
    let mut entries: Vec<(String, f64)> = header
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';');
            let tag = pieces.next()?.trim();
            if tag.is_empty() {
                return None;
            }
            let mut weight = 1.0;
            for param in pieces {
                if let Some(q) = param.trim().strip_prefix("q=") {
                    weight = q.trim().parse::<f64>().ok().filter(|w| w.is_finite()).unwrap_or(0.0);
                }
            }
            (weight > 0.0).then(|| (tag.to_string(), weight))
        })
        .collect();
    // sort_by is stable: equal weights keep header order
    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    entries
}

/// `pt-br` / `PT_br` -> `pt-BR`; tags without a 2-letter region are only lower-cased
fn canonical_tag(tag: &str) -> String {
    let tag = tag.trim().replace('_', "-");
    let mut parts = tag.splitn(2, '-');
    let base = parts.next().unwrap_or_default().to_lowercase();
    match parts.next() {
        Some(region) if region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic()) => {
            format!("{}-{}", base, region.to_uppercase())
        }
        Some(rest) => format!("{}-{}", base, rest),
        None => base,
    }
}

/// Base language of a variant (`fr-CA` -> `fr`)
pub fn base_language(variant: &str) -> &str {
    variant.split('-').next().unwrap_or(variant)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    language: String,
    context: VariantContext,
}

/// Regional variant resolver
///
/// Safe to share across concurrent requests (`Arc<VariantResolver>`).
#[derive(Debug, Default)]
pub struct VariantResolver {
    tables: VariantTables,
    cache: Mutex<HashMap<CacheKey, VariantDetectionResult>>,
}

impl VariantResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables(tables: VariantTables) -> Self {
        Self {
            tables,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn tables(&self) -> &VariantTables {
        &self.tables
    }

    /// Detect the variant to use for `language` in `context`
    ///
    /// `language` may be a base code (`pt`) or a variant (`pt-BR`, `pt_br`).
    /// Variants are canonicalized first; tables are keyed by their base.
    pub fn detect_variant(&self, language: &str, context: &VariantContext) -> VariantDetectionResult {
        let language = canonical_tag(&self.normalize_variant(language.trim()));
        let key = CacheKey {
            language,
            context: context.clone(),
        };

        // Lookup, detect and insert under one lock
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(hit) = cache.get(&key) {
            debug!(language = %key.language, variant = %hit.resolved_variant, "Variant cache hit");
            return hit.clone();
        }

        let result = self.resolve(&key.language, context);
        debug!(
            language = %key.language,
            variant = %result.resolved_variant,
            method = ?result.method,
            "Variant detected"
        );
        cache.insert(key, result.clone());
        result
    }

    fn resolve(&self, language: &str, context: &VariantContext) -> VariantDetectionResult {
        type Strategy<'a> =
            Box<dyn FnOnce() -> Result<Option<(String, DetectionMethod)>, Infallible> + 'a>;

        let base = base_language(language);
        let strategies: Vec<Strategy> = vec![
            Box::new(|| {
                Ok(self
                    .detect_by_region(base, context)
                    .map(|v| (v, DetectionMethod::Region)))
            }),
            Box::new(|| {
                Ok(self
                    .detect_by_accept_language(base, context)
                    .map(|v| (v, DetectionMethod::AcceptLanguage)))
            }),
            // A supported variant asked for explicitly is kept as-is
            Box::new(|| {
                Ok((language != base && self.is_supported(language))
                    .then(|| (language.to_string(), DetectionMethod::Default)))
            }),
            Box::new(|| Ok(Some((self.default_variant(base), DetectionMethod::Default)))),
        ];

        let (resolved_variant, method) = cascade_first(strategies)
            .unwrap_or_else(|| (base.to_string(), DetectionMethod::Default));
        let confidence = match method {
            DetectionMethod::Default => DEFAULT_CONFIDENCE,
            DetectionMethod::Region | DetectionMethod::AcceptLanguage => MATCH_CONFIDENCE,
        };

        VariantDetectionResult {
            requested_language: language.to_string(),
            resolved_variant,
            confidence,
            method,
        }
    }

    /// Region/country table lookup; only supported variants count
    fn detect_by_region(&self, language: &str, context: &VariantContext) -> Option<String> {
        let region = context
            .region
            .as_deref()
            .or(context.country.as_deref())?
            .trim()
            .to_uppercase();
        let variant = self.tables.region_variants.get(language)?.get(&region)?;
        self.is_supported(variant).then(|| variant.clone())
    }

    /// First supported `language-*` tag in weight order
    fn detect_by_accept_language(&self, language: &str, context: &VariantContext) -> Option<String> {
        let header = context.accept_language.as_deref()?;
        let prefix = format!("{}-", language);
        parse_accept_language(header)
            .into_iter()
            .map(|(tag, _)| canonical_tag(&tag))
            .find(|tag| tag.starts_with(&prefix) && self.is_supported(tag))
    }

    /// Default variant for a base language (the language itself if none)
    pub fn default_variant(&self, language: &str) -> String {
        self.tables
            .defaults
            .get(language)
            .cloned()
            .unwrap_or_else(|| language.to_string())
    }

    pub fn is_supported(&self, variant: &str) -> bool {
        self.tables.supported.contains(variant)
    }

    /// Canonical form of a known alias; unknown input passes through unchanged
    pub fn normalize_variant(&self, input: &str) -> String {
        self.tables
            .aliases
            .get(&input.to_lowercase())
            .cloned()
            .unwrap_or_else(|| input.to_string())
    }

    /// Degradation chain for `variant`, most specific first, ending in the
    /// bare base language
    ///
    /// Variants without a configured chain degrade to `[variant, base]`.
    pub fn get_fallback_chain(&self, variant: &str) -> Vec<String> {
        let variant = self.normalize_variant(variant.trim());
        let base = base_language(&variant).to_string();

        let mut chain = match self.tables.fallback_chains.get(&variant) {
            Some(chain) => chain.clone(),
            None if variant == base => Vec::new(),
            None => vec![variant.clone()],
        };
        if chain.last() != Some(&base) {
            chain.push(base);
        }
        chain
    }

    /// Supported variants of a base language
    pub fn variants_for(&self, base: &str) -> Vec<String> {
        let prefix = format!("{}-", base);
        self.tables
            .supported
            .iter()
            .filter(|v| v.starts_with(&prefix) || v.as_str() == base)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> VariantStats {
        let cached_detections = self
            .cache
            .lock()
            .map(|cache| cache.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len());
        VariantStats {
            cached_detections,
            supported_variants: self.tables.supported.len(),
        }
    }

    /// Drop all memoized detections
    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}
