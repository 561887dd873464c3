//! `AWSSharedCredentials` sink: writes an access key pair into one profile of
//! an AWS shared credentials file (`~/.aws/credentials` style INI).
//!
//! Only the two key lines of the target profile are touched. Every other
//! section, key, comment and blank line is written back unchanged.

use super::{decode_spec, SinkOperator, SinkProvider};
use crate::error::{Result, RevolverError};
use crate::io;
use crate::secrets::SecretSet;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const NAME: &str = "AWSSharedCredentials";

/// INI key → template over the source's secret set.
const REFS: [(&str, &str); 2] = [
    ("aws_access_key_id", "{{ .AWSAccessKeyID }}"),
    ("aws_secret_access_key", "{{ .AWSSecretAccessKey }}"),
];

pub struct AwsSharedCredentials;

impl SinkProvider for AwsSharedCredentials {
    fn name(&self) -> &'static str {
        NAME
    }

    fn parse_spec(&self, spec: serde_yaml::Value) -> Result<Arc<dyn SinkOperator>> {
        let spec: AwsSharedCredentialsSpec = decode_spec(NAME, spec)?;
        if spec.profile.trim().is_empty() {
            return Err(RevolverError::InvalidSpec {
                provider: NAME.to_string(),
                message: "profile must not be empty".to_string(),
            });
        }
        Ok(Arc::new(spec))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsSharedCredentialsSpec {
    pub path: PathBuf,
    pub profile: String,
}

impl SinkOperator for AwsSharedCredentialsSpec {
    fn summary(&self) -> String {
        format!("path: {}, profile: {}", self.path.display(), self.profile)
    }

    fn apply(&self, secrets: Option<&SecretSet>, dry_run: bool) -> Result<()> {
        for (_, template) in REFS {
            SecretSet::validate_template(template)?;
        }
        if dry_run {
            CredentialsFile::load(&self.path)?;
            return Ok(());
        }

        let secrets = secrets.ok_or_else(|| {
            RevolverError::Provider("no secrets to write to the credentials file".to_string())
        })?;
        let values = REFS
            .iter()
            .map(|(key, template)| Ok((*key, secrets.render(template)?)))
            .collect::<Result<Vec<_>>>()?;

        // Other sinks may be editing other profiles of the same file.
        let _lock = io::lock_file(&self.path);
        let mut file = CredentialsFile::load(&self.path)?;
        for (key, value) in &values {
            file.set(&self.profile, key, value);
        }
        io::atomic_write(&self.path, file.to_string().as_bytes())
    }
}

// ---------------------------------------------------------------------------
// CredentialsFile
// ---------------------------------------------------------------------------

/// Line-preserving view of an INI file.
#[derive(Debug, Default)]
struct CredentialsFile {
    lines: Vec<String>,
}

impl CredentialsFile {
    /// Load and check `path`. A missing file is an empty document.
    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::parse(&std::fs::read_to_string(path)?)
    }

    fn parse(content: &str) -> Result<Self> {
        for (i, line) in content.lines().enumerate() {
            let t = line.trim();
            let ok = t.is_empty()
                || t.starts_with('#')
                || t.starts_with(';')
                || (t.starts_with('[') && t.ends_with(']') && t.len() > 2)
                || t.split_once('=').is_some_and(|(k, _)| !k.trim().is_empty());
            if !ok {
                return Err(RevolverError::Provider(format!(
                    "malformed credentials file at line {}: {t}",
                    i + 1
                )));
            }
        }
        Ok(Self {
            lines: content.lines().map(str::to_string).collect(),
        })
    }

    fn section_name(line: &str) -> Option<&str> {
        let t = line.trim();
        t.strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .map(str::trim)
    }

    /// Set `key = value` inside `[section]`, creating either as needed.
    fn set(&mut self, section: &str, key: &str, value: &str) {
        let entry = format!("{key} = {value}");

        let Some(start) = self
            .lines
            .iter()
            .position(|l| Self::section_name(l) == Some(section))
        else {
            if self.lines.last().is_some_and(|l| !l.trim().is_empty()) {
                self.lines.push(String::new());
            }
            self.lines.push(format!("[{section}]"));
            self.lines.push(entry);
            return;
        };

        let end = self.lines[start + 1..]
            .iter()
            .position(|l| Self::section_name(l).is_some())
            .map(|offset| start + 1 + offset)
            .unwrap_or(self.lines.len());

        for line in &mut self.lines[start + 1..end] {
            if line
                .split_once('=')
                .is_some_and(|(k, _)| k.trim() == key)
            {
                *line = entry;
                return;
            }
        }

        // Insert after the section's last non-blank line.
        let mut insert_at = end;
        while insert_at > start + 1 && self.lines[insert_at - 1].trim().is_empty() {
            insert_at -= 1;
        }
        self.lines.insert(insert_at, entry);
    }
}

impl std::fmt::Display for CredentialsFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_keys() -> SecretSet {
        SecretSet::new([
            ("AWSAccessKeyID", "AKIANEW"),
            ("AWSSecretAccessKey", "secret/new+key"),
        ])
    }

    fn spec(path: &Path, profile: &str) -> AwsSharedCredentialsSpec {
        AwsSharedCredentialsSpec {
            path: path.to_path_buf(),
            profile: profile.to_string(),
        }
    }

    #[test]
    fn replaces_keys_and_keeps_other_profiles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(
            &path,
            "[default]\naws_access_key_id = AKIAOLD\naws_secret_access_key = old\n\n# work account\n[work]\naws_access_key_id = AKIAWORK\nregion = eu-west-1\n",
        )
        .unwrap();

        spec(&path, "default").apply(Some(&new_keys()), false).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "[default]\naws_access_key_id = AKIANEW\naws_secret_access_key = secret/new+key\n\n# work account\n[work]\naws_access_key_id = AKIAWORK\nregion = eu-west-1\n"
        );
    }

    #[test]
    fn adds_missing_keys_to_existing_profile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(&path, "[work]\nregion = eu-west-1\n\n[other]\nx = y\n").unwrap();

        spec(&path, "work").apply(Some(&new_keys()), false).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "[work]\nregion = eu-west-1\naws_access_key_id = AKIANEW\naws_secret_access_key = secret/new+key\n\n[other]\nx = y\n"
        );
    }

    #[test]
    fn creates_file_and_profile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".aws/credentials");

        spec(&path, "ci").apply(Some(&new_keys()), false).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "[ci]\naws_access_key_id = AKIANEW\naws_secret_access_key = secret/new+key\n"
        );
    }

    #[test]
    fn dry_run_does_not_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(&path, "[default]\naws_access_key_id = AKIAOLD\n").unwrap();

        spec(&path, "default").apply(None, true).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[default]\naws_access_key_id = AKIAOLD\n"
        );
    }

    #[test]
    fn dry_run_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(&path, "[default]\nthis is not ini\n").unwrap();

        let err = spec(&path, "default").apply(None, true).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn missing_secret_keys_fail_commit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        let partial = SecretSet::new([("AWSAccessKeyID", "AKIANEW")]);
        assert!(spec(&path, "default").apply(Some(&partial), false).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn concurrent_profiles_in_one_file_all_land() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(&path, "[default]\nregion = us-east-1\n").unwrap();

        let profiles: Vec<String> = (0..8).map(|i| format!("p{i}")).collect();
        std::thread::scope(|s| {
            for profile in &profiles {
                let sink = spec(&path, profile);
                s.spawn(move || sink.apply(Some(&new_keys()), false).unwrap());
            }
        });

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("[default]\nregion = us-east-1\n"));
        for profile in &profiles {
            assert!(content.contains(&format!("[{profile}]")), "{profile} lost");
        }
        assert_eq!(content.matches("aws_access_key_id = AKIANEW").count(), 8);
    }

    #[test]
    fn empty_profile_is_invalid_spec() {
        let value: serde_yaml::Value =
            serde_yaml::from_str("path: /tmp/credentials\nprofile: ''").unwrap();
        assert!(AwsSharedCredentials.parse_spec(value).is_err());
    }

    #[test]
    fn summary_names_path_and_profile() {
        let s = spec(Path::new("/home/ci/.aws/credentials"), "default");
        assert_eq!(
            s.summary(),
            "path: /home/ci/.aws/credentials, profile: default"
        );
    }
}
