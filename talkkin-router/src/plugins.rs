//! Recognition plugin registry
//!
//! Holds plugin descriptors in registration order and exposes the
//! deterministic invocation order: enabled plugins only, priority
//! descending, ties broken by registration order.

use crate::error::{RoutingError, RoutingResult};
use crate::types::{clamp_confidence, Confidence, Recognizer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use talkkin_common::config::PluginOverride;
use tracing::{debug, warn};

/// Minimum confidence applied when a plugin does not configure one
pub const DEFAULT_MIN_CONFIDENCE: Confidence = 0.5;

/// Recognition plugin descriptor
///
/// Metadata plus the invocation capability. A result only counts as a
/// candidate if its confidence is strictly greater than `min_confidence`.
#[derive(Clone)]
pub struct PluginDescriptor {
    /// Unique plugin name
    pub name: String,
    /// Higher runs first
    pub priority: i32,
    pub enabled: bool,
    /// Confidence gate (0.0-1.0)
    pub min_confidence: Confidence,
    pub recognizer: Arc<dyn Recognizer>,
}

impl PluginDescriptor {
    /// Enabled plugin with priority 0 and the default confidence gate
    pub fn new(name: impl Into<String>, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            enabled: true,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            recognizer,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: Confidence) -> Self {
        self.min_confidence = clamp_confidence(min_confidence);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("min_confidence", &self.min_confidence)
            .finish_non_exhaustive()
    }
}

/// Descriptor plus its registration index (tie-break key)
#[derive(Debug, Clone)]
pub struct RegisteredPlugin {
    pub descriptor: PluginDescriptor,
    /// Monotonic; a plugin removed and re-added gets a new, later index
    pub registration_index: usize,
}

/// Plugin registry
#[derive(Debug, Default, Clone)]
pub struct PluginRegistry {
    plugins: Vec<RegisteredPlugin>,
    next_index: usize,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from descriptors, in the given registration order
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = PluginDescriptor>,
    ) -> RoutingResult<Self> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Register a plugin, returning its registration index
    ///
    /// # Errors
    /// `DuplicatePlugin` if the name is already taken
    pub fn register(&mut self, mut descriptor: PluginDescriptor) -> RoutingResult<usize> {
        if self.position(&descriptor.name).is_some() {
            return Err(RoutingError::DuplicatePlugin(descriptor.name));
        }
        descriptor.min_confidence = clamp_confidence(descriptor.min_confidence);

        let registration_index = self.next_index;
        self.next_index += 1;
        debug!(
            plugin = %descriptor.name,
            priority = descriptor.priority,
            registration_index,
            "Plugin registered"
        );
        self.plugins.push(RegisteredPlugin {
            descriptor,
            registration_index,
        });
        Ok(registration_index)
    }

    /// Remove a plugin by name
    pub fn remove(&mut self, name: &str) -> RoutingResult<PluginDescriptor> {
        let pos = self
            .position(name)
            .ok_or_else(|| RoutingError::PluginNotFound(name.to_string()))?;
        Ok(self.plugins.remove(pos).descriptor)
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> RoutingResult<()> {
        self.get_mut(name)?.descriptor.enabled = enabled;
        Ok(())
    }

    pub fn set_priority(&mut self, name: &str, priority: i32) -> RoutingResult<()> {
        self.get_mut(name)?.descriptor.priority = priority;
        Ok(())
    }

    pub fn set_min_confidence(&mut self, name: &str, min_confidence: Confidence) -> RoutingResult<()> {
        self.get_mut(name)?.descriptor.min_confidence = clamp_confidence(min_confidence);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredPlugin> {
        self.plugins.iter().find(|p| p.descriptor.name == name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugin names in registration order
    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.descriptor.name.clone()).collect()
    }

    /// Invocation order: enabled only, priority descending, then registration order
    pub fn ordered(&self) -> Vec<RegisteredPlugin> {
        let mut ordered: Vec<RegisteredPlugin> = self
            .plugins
            .iter()
            .filter(|p| p.descriptor.enabled)
            .cloned()
            .collect();
        ordered.sort_by(|a, b| {
            b.descriptor
                .priority
                .cmp(&a.descriptor.priority)
                .then(a.registration_index.cmp(&b.registration_index))
        });
        ordered
    }

    /// Apply `[routing.plugins.<name>]` overrides
    ///
    /// Overrides naming unknown plugins are logged and skipped.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, PluginOverride>) {
        for (name, over) in overrides {
            let Some(pos) = self.position(name) else {
                warn!(plugin = %name, "Override for unknown plugin ignored");
                continue;
            };
            let descriptor = &mut self.plugins[pos].descriptor;
            if let Some(priority) = over.priority {
                descriptor.priority = priority;
            }
            if let Some(enabled) = over.enabled {
                descriptor.enabled = enabled;
            }
            if let Some(min) = over.min_confidence {
                descriptor.min_confidence = clamp_confidence(min);
            }
            debug!(plugin = %name, ?descriptor, "Plugin override applied");
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.plugins.iter().position(|p| p.descriptor.name == name)
    }

    fn get_mut(&mut self, name: &str) -> RoutingResult<&mut RegisteredPlugin> {
        self.plugins
            .iter_mut()
            .find(|p| p.descriptor.name == name)
            .ok_or_else(|| RoutingError::PluginNotFound(name.to_string()))
    }
}
