//! Source and sink capabilities, and the registry that resolves provider
//! names from the rotations file into operators.
//!
//! A *provider* is a named factory: it parses the opaque `spec` block of a
//! rotation entry into an *operator*. Operators do the actual work and are
//! owned by the loaded [`crate::schema::Rotation`] for its whole lifetime.

pub mod aws_shared_credentials;
pub mod stdin;
pub mod stdout;

use crate::error::{Result, RevolverError};
use crate::secrets::SecretSet;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Produces a new credential at the authoritative system.
pub trait SourceOperator: Send + Sync {
    /// One line describing what this operator targets.
    fn summary(&self) -> String;

    /// Rotate the credential. In a dry run, perform reads and validation only.
    ///
    /// `Ok(None)` (or an empty set) means nothing is due for rotation.
    fn rotate(&self, dry_run: bool) -> Result<Option<SecretSet>>;
}

/// Persists the values of a [`SecretSet`] into a destination system.
pub trait SinkOperator: Send + Sync {
    fn summary(&self) -> String;

    /// Write `secrets` to the destination. `secrets` is `None` during the
    /// advance dry run, before the source has produced anything.
    fn apply(&self, secrets: Option<&SecretSet>, dry_run: bool) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

pub trait SourceProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse_spec(&self, spec: serde_yaml::Value) -> Result<Arc<dyn SourceOperator>>;

    /// Whether the provider draws on a process-wide input, so that at most
    /// one rotation in a file may use it as its source.
    fn exclusive(&self) -> bool {
        false
    }
}

pub trait SinkProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse_spec(&self, spec: serde_yaml::Value) -> Result<Arc<dyn SinkOperator>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Source,
    Sink,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Source => "source",
            ProviderKind::Sink => "sink",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deserialize a provider's `spec` block. A missing block is an empty mapping.
pub fn decode_spec<T: DeserializeOwned>(provider: &str, spec: serde_yaml::Value) -> Result<T> {
    let spec = if spec.is_null() {
        serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
    } else {
        spec
    };
    serde_yaml::from_value(spec).map_err(|e| RevolverError::InvalidSpec {
        provider: provider.to_string(),
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// ProviderRegistry
// ---------------------------------------------------------------------------

/// Name-keyed provider lookup, built once at startup and passed by reference
/// to the loader.
#[derive(Default)]
pub struct ProviderRegistry {
    sources: BTreeMap<String, Box<dyn SourceProvider>>,
    sinks: BTreeMap<String, Box<dyn SinkProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every provider shipped with this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_source(stdin::Stdin);
        registry.register_sink(stdout::Stdout);
        registry.register_sink(aws_shared_credentials::AwsSharedCredentials);
        registry
    }

    /// Register a source provider under its own name, replacing any previous
    /// provider with that name.
    pub fn register_source(&mut self, provider: impl SourceProvider + 'static) {
        self.sources
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn register_sink(&mut self, provider: impl SinkProvider + 'static) {
        self.sinks.insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn source(&self, name: &str) -> Result<&dyn SourceProvider> {
        self.sources
            .get(name)
            .map(|p| p.as_ref())
            .ok_or_else(|| RevolverError::UnknownProvider {
                kind: ProviderKind::Source,
                name: name.to_string(),
            })
    }

    pub fn sink(&self, name: &str) -> Result<&dyn SinkProvider> {
        self.sinks
            .get(name)
            .map(|p| p.as_ref())
            .ok_or_else(|| RevolverError::UnknownProvider {
                kind: ProviderKind::Sink,
                name: name.to_string(),
            })
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn sink_names(&self) -> impl Iterator<Item = &str> {
        self.sinks.keys().map(String::as_str)
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("sinks", &self.sinks.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_providers_resolve() {
        let registry = ProviderRegistry::with_builtin();
        assert_eq!(registry.source("Stdin").unwrap().name(), "Stdin");
        assert_eq!(registry.sink("Stdout").unwrap().name(), "Stdout");
        assert_eq!(
            registry.sink("AWSSharedCredentials").unwrap().name(),
            "AWSSharedCredentials"
        );
    }

    #[test]
    fn kinds_use_separate_namespaces() {
        let registry = ProviderRegistry::with_builtin();
        let err = registry.sink("Stdin").err().unwrap();
        assert!(matches!(
            err,
            RevolverError::UnknownProvider {
                kind: ProviderKind::Sink,
                ..
            }
        ));
        assert_eq!(err.to_string(), "unknown sink provider passed: Stdin");
    }

    #[test]
    fn empty_registry_resolves_nothing() {
        let registry = ProviderRegistry::new();
        assert!(registry.source("Stdin").is_err());
        assert_eq!(registry.sink_names().count(), 0);
    }

    #[test]
    fn names_are_sorted() {
        let registry = ProviderRegistry::with_builtin();
        let sinks: Vec<_> = registry.sink_names().collect();
        assert_eq!(sinks, ["AWSSharedCredentials", "Stdout"]);
    }

    #[test]
    fn decode_spec_accepts_missing_block() {
        #[derive(serde::Deserialize)]
        struct Empty {}
        let _: Empty = decode_spec("Test", serde_yaml::Value::Null).unwrap();
    }
}
