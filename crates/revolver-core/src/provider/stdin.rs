//! `Stdin` source: the new credential is whatever is piped into the process.

use super::{decode_spec, SourceOperator, SourceProvider};
use crate::error::{Result, RevolverError};
use crate::secrets::SecretSet;
use serde::Deserialize;
use std::io::{IsTerminal, Read};
use std::sync::Arc;

pub const NAME: &str = "Stdin";
pub const KEY_INPUT: &str = "Input";

pub struct Stdin;

impl SourceProvider for Stdin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn parse_spec(&self, spec: serde_yaml::Value) -> Result<Arc<dyn SourceOperator>> {
        let spec: StdinSpec = decode_spec(NAME, spec)?;
        Ok(Arc::new(spec))
    }

    // Rotations commit in parallel and the first read drains stdin.
    fn exclusive(&self) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdinSpec {}

impl SourceOperator for StdinSpec {
    fn summary(&self) -> String {
        "receive the input from stdin".to_string()
    }

    fn rotate(&self, dry_run: bool) -> Result<Option<SecretSet>> {
        if std::io::stdin().is_terminal() {
            return Err(RevolverError::Provider(
                "Stdin provider does not support input from a terminal".to_string(),
            ));
        }
        // The advance dry run must leave stdin unread for the commit.
        if dry_run {
            return Ok(None);
        }
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        Ok(Some(SecretSet::new([(KEY_INPUT, input)])))
    }
}
