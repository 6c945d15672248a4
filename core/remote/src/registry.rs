//! Source registry for dynamic event source resolution.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use pinsync_common::{Error, Result};

use crate::source::EventSource;

/// Factory function type for creating sources.
pub type SourceFactory = Box<dyn Fn(Value) -> Result<Arc<dyn EventSource>> + Send + Sync>;

/// Registry for event source factories.
///
/// Allows a source to be picked by name from configuration.
pub struct SourceRegistry {
    factories: HashMap<String, SourceFactory>,
}

impl SourceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a source factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: SourceFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::InvalidInput(format!(
                "Source '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a source by name and configuration.
    ///
    /// # Errors
    /// - Source not registered
    /// - Configuration invalid for the source
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn EventSource>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::Config(format!("Source '{}' is not registered", name)))?;
        factory(config)
    }

    /// Get list of registered source names.
    pub fn sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in sources.
///
/// - `http`: the remote API, configured by `HttpSourceConfig`
/// - `memory`: in-memory source, optionally loaded from `{"fixture": "<path>"}`
pub fn create_default_registry() -> Result<SourceRegistry> {
    let mut registry = SourceRegistry::new();

    registry.register("http", Box::new(crate::http::create_http_source))?;

    registry.register(
        "memory",
        Box::new(|config| {
            let source = match config.get("fixture").and_then(|v| v.as_str()) {
                Some(path) => crate::memory::MemoryEventSource::from_json_file(path)?,
                None => crate::memory::MemoryEventSource::new(),
            };
            Ok(Arc::new(source))
        }),
    )?;

    Ok(registry)
}
