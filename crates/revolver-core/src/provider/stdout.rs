//! `Stdout` sink: prints a template rendered against the new secrets.

use super::{decode_spec, SinkOperator, SinkProvider};
use crate::error::{Result, RevolverError};
use crate::secrets::SecretSet;
use serde::Deserialize;
use std::io::Write;
use std::sync::Arc;

pub const NAME: &str = "Stdout";

pub struct Stdout;

impl SinkProvider for Stdout {
    fn name(&self) -> &'static str {
        NAME
    }

    fn parse_spec(&self, spec: serde_yaml::Value) -> Result<Arc<dyn SinkOperator>> {
        let spec: StdoutSpec = decode_spec(NAME, spec)?;
        Ok(Arc::new(spec))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdoutSpec {
    pub output: String,
}

impl StdoutSpec {
    fn write_to(&self, out: &mut impl Write, secrets: Option<&SecretSet>, dry_run: bool) -> Result<()> {
        if dry_run {
            return SecretSet::validate_template(&self.output);
        }
        let secrets = secrets.ok_or_else(|| {
            RevolverError::Provider("no secrets to write to stdout".to_string())
        })?;
        let rendered = secrets.render(&self.output)?;
        out.write_all(rendered.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

impl SinkOperator for StdoutSpec {
    fn summary(&self) -> String {
        "output to stdout".to_string()
    }

    fn apply(&self, secrets: Option<&SecretSet>, dry_run: bool) -> Result<()> {
        self.write_to(&mut std::io::stdout().lock(), secrets, dry_run)
    }
}
