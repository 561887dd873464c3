//! Rotations file: YAML decoding and provider resolution.

use crate::error::{Result, RevolverError};
use crate::provider::{ProviderRegistry, SinkOperator, SourceOperator};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Raw file shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRotation {
    name: String,
    from: RawProviderRef,
    #[serde(default)]
    to: Vec<RawProviderRef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProviderRef {
    provider: String,
    #[serde(default)]
    spec: serde_yaml::Value,
}

// ---------------------------------------------------------------------------
// Resolved rotations
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SourceSpec {
    pub provider: String,
    pub operator: Arc<dyn SourceOperator>,
}

#[derive(Clone)]
pub struct SinkSpec {
    pub provider: String,
    pub operator: Arc<dyn SinkOperator>,
}

/// One source and the ordered sinks it feeds. Immutable once loaded.
#[derive(Clone)]
pub struct Rotation {
    pub name: String,
    pub source: SourceSpec,
    pub sinks: Vec<SinkSpec>,
}

impl fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSpec")
            .field("provider", &self.provider)
            .field("summary", &self.operator.summary())
            .finish()
    }
}

impl fmt::Debug for SinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkSpec")
            .field("provider", &self.provider)
            .field("summary", &self.operator.summary())
            .finish()
    }
}

impl fmt::Debug for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rotation")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("sinks", &self.sinks)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

pub fn load_rotations_file(path: &Path, registry: &ProviderRegistry) -> Result<Vec<Rotation>> {
    let content = std::fs::read_to_string(path)?;
    load_rotations(&content, registry)
}

/// Decode a YAML list of rotations and resolve every provider. Any unknown
/// provider or malformed spec aborts the whole batch.
pub fn load_rotations(content: &str, registry: &ProviderRegistry) -> Result<Vec<Rotation>> {
    let raw: Vec<RawRotation> = serde_yaml::from_str(content)?;

    let mut seen = HashSet::new();
    let mut exclusive: HashMap<&str, String> = HashMap::new();
    let mut rotations = Vec::with_capacity(raw.len());
    for r in raw {
        if r.name.trim().is_empty() {
            return Err(RevolverError::InvalidRotation(
                "rotation name must not be empty".to_string(),
            ));
        }
        if !seen.insert(r.name.clone()) {
            return Err(RevolverError::InvalidRotation(format!(
                "duplicate rotation name: {}",
                r.name
            )));
        }

        let provider = registry.source(&r.from.provider)?;
        if provider.exclusive() {
            if let Some(first) = exclusive.insert(provider.name(), r.name.clone()) {
                return Err(RevolverError::InvalidRotation(format!(
                    "source provider {} is already used by rotation '{first}'; \
                     it can back only one rotation",
                    provider.name()
                )));
            }
        }
        let source = SourceSpec {
            operator: provider.parse_spec(r.from.spec)?,
            provider: r.from.provider,
        };
        let sinks = r
            .to
            .into_iter()
            .map(|t| {
                Ok(SinkSpec {
                    operator: registry.sink(&t.provider)?.parse_spec(t.spec)?,
                    provider: t.provider,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(rotation = %r.name, sinks = sinks.len(), "loaded rotation");
        rotations.push(Rotation {
            name: r.name,
            source,
            sinks,
        });
    }
    Ok(rotations)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderKind, SourceProvider};
    use crate::secrets::SecretSet;
    use tempfile::TempDir;

    /// Source with no shared input; any number of rotations may use it.
    struct Fixed;

    impl SourceProvider for Fixed {
        fn name(&self) -> &'static str {
            "Fixed"
        }

        fn parse_spec(&self, _: serde_yaml::Value) -> Result<Arc<dyn SourceOperator>> {
            Ok(Arc::new(Fixed))
        }
    }

    impl SourceOperator for Fixed {
        fn summary(&self) -> String {
            "fixed".to_string()
        }

        fn rotate(&self, _: bool) -> Result<Option<SecretSet>> {
            Ok(None)
        }
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::with_builtin();
        registry.register_source(Fixed);
        registry
    }

    const VALID: &str = r#"
- name: ci-deploy-key
  from:
    provider: Stdin
    spec: {}
  to:
    - provider: Stdout
      spec:
        output: "{{ .Input }}"
    - provider: AWSSharedCredentials
      spec:
        path: /tmp/credentials
        profile: ci
- name: bare
  from:
    provider: Fixed
"#;

    #[test]
    fn loads_valid_file() {
        let rotations = load_rotations(VALID, &registry()).unwrap();
        assert_eq!(rotations.len(), 2);

        let r = &rotations[0];
        assert_eq!(r.name, "ci-deploy-key");
        assert_eq!(r.source.provider, "Stdin");
        let sinks: Vec<_> = r.sinks.iter().map(|s| s.provider.as_str()).collect();
        assert_eq!(sinks, ["Stdout", "AWSSharedCredentials"]);
        assert_eq!(
            r.sinks[1].operator.summary(),
            "path: /tmp/credentials, profile: ci"
        );

        assert_eq!(rotations[1].source.provider, "Fixed");
        assert!(rotations[1].sinks.is_empty());
    }

    #[test]
    fn non_exclusive_source_may_back_many_rotations() {
        let yaml = "- name: a\n  from:\n    provider: Fixed\n- name: b\n  from:\n    provider: Fixed\n";
        assert_eq!(load_rotations(yaml, &registry()).unwrap().len(), 2);
    }

    #[test]
    fn loads_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rotations.yaml");
        std::fs::write(&path, VALID).unwrap();
        let rotations = load_rotations_file(&path, &registry()).unwrap();
        assert_eq!(rotations.len(), 2);
    }

    #[test]
    fn unknown_source_provider_is_rejected() {
        let yaml = "- name: x\n  from:\n    provider: Nope\n";
        let err = load_rotations(yaml, &ProviderRegistry::with_builtin()).unwrap_err();
        assert!(matches!(
            err,
            RevolverError::UnknownProvider {
                kind: ProviderKind::Source,
                ..
            }
        ));
    }

    #[test]
    fn unknown_sink_provider_is_rejected() {
        let yaml = "- name: x\n  from:\n    provider: Stdin\n  to:\n    - provider: Nope\n";
        let err = load_rotations(yaml, &ProviderRegistry::with_builtin()).unwrap_err();
        assert_eq!(err.to_string(), "unknown sink provider passed: Nope");
    }

    #[test]
    fn malformed_spec_is_rejected() {
        let yaml = "- name: x\n  from:\n    provider: Stdin\n  to:\n    - provider: Stdout\n      spec:\n        outptu: typo\n";
        let err = load_rotations(yaml, &ProviderRegistry::with_builtin()).unwrap_err();
        assert!(matches!(err, RevolverError::InvalidSpec { .. }));
    }

    #[test]
    fn unknown_top_level_field_is_rejected() {
        let yaml = "- name: x\n  form:\n    provider: Stdin\n";
        let err = load_rotations(yaml, &ProviderRegistry::with_builtin()).unwrap_err();
        assert!(matches!(err, RevolverError::Yaml(_)));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let yaml = "- name: x\n  from:\n    provider: Stdin\n- name: x\n  from:\n    provider: Stdin\n";
        let err = load_rotations(yaml, &ProviderRegistry::with_builtin()).unwrap_err();
        assert!(err.to_string().contains("duplicate rotation name: x"));
    }

    #[test]
    fn empty_name_is_rejected() {
        let yaml = "- name: ''\n  from:\n    provider: Stdin\n";
        assert!(load_rotations(yaml, &ProviderRegistry::with_builtin()).is_err());
    }

    #[test]
    fn stdin_backs_at_most_one_rotation() {
        let yaml = "- name: first\n  from:\n    provider: Stdin\n- name: second\n  from:\n    provider: Stdin\n";
        let err = load_rotations(yaml, &ProviderRegistry::with_builtin()).unwrap_err();
        assert!(matches!(err, RevolverError::InvalidRotation(_)));
        assert!(err.to_string().contains("already used by rotation 'first'"));
    }

    #[test]
    fn empty_list_loads_nothing() {
        let rotations = load_rotations("[]", &ProviderRegistry::with_builtin()).unwrap();
        assert!(rotations.is_empty());
    }
}
