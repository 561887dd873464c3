use crate::output::print_json;
use anyhow::Context;
use revolver_core::config::RunConfig;
use revolver_core::provider::ProviderRegistry;
use revolver_core::runner::Runner;
use std::io::IsTerminal;
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::Path;

pub struct Options {
    pub dry_run: bool,
    pub rate_limit: Option<NonZeroU32>,
    pub max_parallel: Option<NonZeroUsize>,
}

impl Options {
    fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::default()
            .dry_run(self.dry_run)
            .max_parallel(self.max_parallel);
        if let Some(rate) = self.rate_limit {
            config = config.rate_limit(rate);
        }
        config
    }
}

/// Load, run and report every rotation in `config`.
///
/// The report is written to stdout once all rotations are done. Sinks that
/// themselves print to stdout (`Stdout`) do so while running, so with `json`
/// their output comes first and the JSON document is the last thing written.
pub fn run(config: &Path, options: Options, json: bool) -> anyhow::Result<()> {
    let registry = ProviderRegistry::with_builtin();
    let runner = Runner::load(config, &registry, options.run_config())
        .with_context(|| format!("failed to load rotations from {}", config.display()))?;

    let report = runner.execute();

    if json {
        print_json(&report)?;
    } else {
        let stdout = std::io::stdout();
        let color = stdout.is_terminal();
        report
            .render(&mut stdout.lock(), color)
            .context("failed to write report")?;
    }

    if !report.succeeded() {
        anyhow::bail!("failed to execute rotations");
    }
    Ok(())
}
