//! The immutable set of values produced by one committed source rotation.
//!
//! A [`SecretSet`] is built once by a source operator and then shared
//! read-only with every sink of the same rotation. Sinks pull values out of
//! it through small `{{ .Key }}` templates declared in their specs.

use crate::error::{Result, RevolverError};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// SecretSet
// ---------------------------------------------------------------------------

#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretSet {
    values: BTreeMap<String, String>,
}

impl SecretSet {
    pub fn new<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Expand every `{{ .Key }}` placeholder in `template` with the matching
    /// value. Text outside placeholders is copied verbatim, with no escaping.
    pub fn render(&self, template: &str) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        for segment in parse(template)? {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Key(key) => {
                    let value = self.get(key).ok_or_else(|| {
                        RevolverError::Template(format!("no secret named '{key}'"))
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    /// Check template syntax without resolving any keys.
    pub fn validate_template(template: &str) -> Result<()> {
        parse(template).map(|_| ())
    }
}

// Values never appear in logs or panic messages.
impl fmt::Debug for SecretSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretSet")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Template parsing
// ---------------------------------------------------------------------------

enum Segment<'a> {
    Text(&'a str),
    Key(&'a str),
}

static FIELD_RE: OnceLock<Regex> = OnceLock::new();

fn field_re() -> &'static Regex {
    FIELD_RE.get_or_init(|| Regex::new(r"^\.([A-Za-z_][A-Za-z0-9_]*)$").unwrap())
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            return Err(RevolverError::Template(format!(
                "unclosed action in template: {template}"
            )));
        };
        let action = after_open[..end].trim();
        let caps = field_re().captures(action).ok_or_else(|| {
            RevolverError::Template(format!("unsupported action '{{{{ {action} }}}}'"))
        })?;
        let key = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        segments.push(Segment::Key(key));
        rest = &after_open[end + 2..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    Ok(segments)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn aws_keys() -> SecretSet {
        SecretSet::new([
            ("AWSAccessKeyID", "SAMPLE_ID"),
            ("AWSSecretAccessKey", "SAMPLE_SECRET"),
        ])
    }

    #[test]
    fn renders_single_placeholder() {
        assert_eq!(aws_keys().render("{{ .AWSAccessKeyID }}").unwrap(), "SAMPLE_ID");
    }

    #[test]
    fn symbols_are_not_escaped() {
        let set = SecretSet::new([("AWSSecretAccessKey", "!@#$%^&*()_+-\\SECRET<>")]);
        assert_eq!(
            set.render("{{ .AWSSecretAccessKey }}").unwrap(),
            "!@#$%^&*()_+-\\SECRET<>"
        );
    }

    #[test]
    fn pure_string_passes_through() {
        assert_eq!(aws_keys().render("PURE_STRING").unwrap(), "PURE_STRING");
    }

    #[test]
    fn mixes_text_and_placeholders() {
        let got = aws_keys()
            .render("id={{.AWSAccessKeyID}} secret={{ .AWSSecretAccessKey }}\n")
            .unwrap();
        assert_eq!(got, "id=SAMPLE_ID secret=SAMPLE_SECRET\n");
    }

    #[test]
    fn function_calls_are_rejected() {
        let err = aws_keys()
            .render("{{ undefinedFunc .AWSAccessKeyID }}")
            .unwrap_err();
        assert!(matches!(err, RevolverError::Template(_)));
    }

    #[test]
    fn missing_key_is_an_error() {
        assert!(aws_keys().render("{{ .Nope }}").is_err());
    }

    #[test]
    fn unclosed_action_is_an_error() {
        assert!(SecretSet::validate_template("{{ .AWSAccessKeyID ").is_err());
    }

    #[test]
    fn validate_ignores_missing_keys() {
        SecretSet::validate_template("{{ .NotYetKnown }}").unwrap();
    }

    #[test]
    fn debug_hides_values() {
        let dbg = format!("{:?}", aws_keys());
        assert!(dbg.contains("AWSAccessKeyID"));
        assert!(!dbg.contains("SAMPLE_SECRET"));
    }
}
