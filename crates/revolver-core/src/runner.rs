//! Drives every loaded rotation through rotate-and-propagate.
//!
//! Per rotation:
//!
//! 1. Advance dry run. The source and then every sink (in parallel) run with
//!    `dry_run = true`. A failing source aborts the rotation here, before any
//!    credential is touched. Sink failures are recorded and logged but do not
//!    block phase 2; they will surface again there.
//! 2. Commit (skipped for a top-level dry run). The phase-1 nodes are
//!    discarded and the source rotates for real. An empty result skips every
//!    sink; a non-empty [`SecretSet`] is handed to all sinks in parallel, each
//!    succeeding or failing on its own.
//!
//! Transitions: `Init → Validating → {Aborted | Committing}` and
//! `Committing → {Failed | Skipped | Committed | PartiallyFailed}`; a top-level
//! dry run ends in `Validated`.

use crate::config::RunConfig;
use crate::error::Result;
use crate::provider::ProviderRegistry;
use crate::rate_limit::{GovernorRateLimit, RateLimit};
use crate::report::{Report, Reporter, Scheduler, Status};
use crate::schema::{self, Rotation, SinkSpec, SourceSpec};
use crate::secrets::SecretSet;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// RotationState
// ---------------------------------------------------------------------------

/// Terminal state of one rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationState {
    /// The source failed its advance dry run.
    Aborted,
    /// Top-level dry run: phase 1 ran, nothing was committed.
    Validated,
    /// The source failed while committing; no sink was called.
    Failed,
    /// The source had nothing due for rotation.
    Skipped,
    Committed,
    /// The source rotated but at least one sink failed.
    PartiallyFailed,
}

impl RotationState {
    pub fn as_str(self) -> &'static str {
        match self {
            RotationState::Aborted => "aborted",
            RotationState::Validated => "validated",
            RotationState::Failed => "failed",
            RotationState::Skipped => "skipped",
            RotationState::Committed => "committed",
            RotationState::PartiallyFailed => "partially failed",
        }
    }

    /// Status recorded on the rotation's own report node.
    pub fn status(self) -> Status {
        match self {
            RotationState::Validated | RotationState::Committed => Status::Success,
            RotationState::Skipped => Status::Skip,
            RotationState::Aborted | RotationState::Failed | RotationState::PartiallyFailed => {
                Status::Error
            }
        }
    }
}

impl fmt::Display for RotationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct Runner {
    rotations: Vec<Arc<Rotation>>,
    config: RunConfig,
    rate_limit: Arc<dyn RateLimit>,
}

impl Runner {
    pub fn new(rotations: Vec<Rotation>, config: RunConfig) -> Self {
        Self {
            rotations: rotations.into_iter().map(Arc::new).collect(),
            rate_limit: Arc::new(GovernorRateLimit::per_second(config.rate_limit)),
            config,
        }
    }

    /// Load the rotations file at `path`, resolving providers via `registry`.
    pub fn load(path: &Path, registry: &ProviderRegistry, config: RunConfig) -> Result<Self> {
        let rotations = schema::load_rotations_file(path, registry)?;
        Ok(Self::new(rotations, config))
    }

    pub fn with_rate_limit(mut self, rate_limit: impl RateLimit + 'static) -> Self {
        self.rate_limit = Arc::new(rate_limit);
        self
    }

    pub fn rotations(&self) -> &[Arc<Rotation>] {
        &self.rotations
    }

    pub fn config(&self) -> RunConfig {
        self.config
    }

    /// Run every rotation under a fresh scheduler and return the final tree.
    pub fn execute(&self) -> Report {
        let scheduler = match self.config.max_parallel {
            Some(max) => Scheduler::with_max_parallel(max),
            None => Scheduler::new(),
        };
        info!(
            rotations = self.rotations.len(),
            dry_run = self.config.dry_run,
            max_parallel = scheduler.max_parallel().get(),
            "starting rotations"
        );
        scheduler.run(|root| self.run(root))
    }

    /// Start one parallel node per rotation under `reporter`.
    pub fn run(&self, reporter: &mut Reporter) {
        for rotation in &self.rotations {
            self.rate_limit.take();
            let rotation = Arc::clone(rotation);
            let dry_run = self.config.dry_run;
            reporter.run(rotation.name.clone(), move |r| {
                r.parallel();
                let state = rotate(r, &rotation, dry_run);
                record(r, state);
                info!(rotation = %rotation.name, outcome = %state, "rotation finished");
            });
        }
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("rotations", &self.rotations)
            .field("config", &self.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

enum SourceOutcome {
    Failed,
    Nothing,
    Rotated(Arc<SecretSet>),
}

fn rotate(r: &mut Reporter, rotation: &Rotation, dry_run: bool) -> RotationState {
    // Phase 1: advance dry run.
    let validated = run_source(r, rotation, true);
    run_sinks(r, rotation, None, true);
    r.join_parallel();

    if matches!(validated, SourceOutcome::Failed) {
        // Keep only the source node.
        r.truncate_children(1);
        return RotationState::Aborted;
    }
    if dry_run {
        return RotationState::Validated;
    }

    // Phase 2: commit.
    r.reset_children();
    let secrets = match run_source(r, rotation, false) {
        SourceOutcome::Failed => return RotationState::Failed,
        SourceOutcome::Nothing => None,
        SourceOutcome::Rotated(secrets) => Some(secrets),
    };
    let rotated = secrets.is_some();
    run_sinks(r, rotation, secrets, false);
    r.join_parallel();

    if !rotated {
        return RotationState::Skipped;
    }
    let failed = r
        .child_statuses()
        .iter()
        .skip(1)
        .filter(|s| **s == Status::Error)
        .count();
    if failed == 0 {
        RotationState::Committed
    } else {
        RotationState::PartiallyFailed
    }
}

fn record(r: &Reporter, state: RotationState) {
    r.summary(state.as_str());
    match state {
        RotationState::Validated | RotationState::Committed => r.success(),
        RotationState::Skipped => r.skip(),
        RotationState::Aborted => r.fail("source failed the advance dry run"),
        RotationState::Failed => r.fail("source failed to rotate"),
        RotationState::PartiallyFailed => {
            let sinks = r.child_statuses().split_off(1);
            let failed = sinks.iter().filter(|s| **s == Status::Error).count();
            r.fail(format!("{failed} of {} sinks failed", sinks.len()));
        }
    }
}

fn run_source(r: &Reporter, rotation: &Rotation, dry_run: bool) -> SourceOutcome {
    let SourceSpec { provider, operator } = rotation.source.clone();
    let name = rotation.name.clone();
    let outcome = r.run(format!("From/{provider}"), move |r| {
        r.summary(operator.summary());
        match operator.rotate(dry_run) {
            Err(e) => {
                warn!(rotation = %name, %provider, dry_run, error = %e, "source failed");
                r.fail(e);
                SourceOutcome::Failed
            }
            Ok(Some(secrets)) if !secrets.is_empty() => {
                info!(rotation = %name, %provider, dry_run, keys = secrets.len(), "source produced secrets");
                r.success();
                SourceOutcome::Rotated(Arc::new(secrets))
            }
            Ok(_) if dry_run => {
                r.success();
                SourceOutcome::Nothing
            }
            Ok(_) => {
                info!(rotation = %name, %provider, "not yet due for rotation");
                r.skip();
                SourceOutcome::Nothing
            }
        }
    });
    // `None` means the node never returned normally; it is already an error.
    outcome.unwrap_or(SourceOutcome::Failed)
}

fn run_sinks(r: &Reporter, rotation: &Rotation, secrets: Option<Arc<SecretSet>>, dry_run: bool) {
    for SinkSpec { provider, operator } in rotation.sinks.iter().cloned() {
        let secrets = secrets.clone();
        let name = rotation.name.clone();
        r.run(format!("To/{provider}"), move |r| {
            r.parallel();
            r.summary(operator.summary());
            if !dry_run && secrets.is_none() {
                r.skip();
                return;
            }
            match operator.apply(secrets.as_deref(), dry_run) {
                Ok(()) => r.success(),
                Err(e) => {
                    warn!(rotation = %name, %provider, dry_run, error = %e, "sink failed");
                    r.fail(e);
                }
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
