use std::num::{NonZeroU32, NonZeroUsize};

/// Rotations allowed to start per second when nothing else is configured.
pub const DEFAULT_RATE_LIMIT: NonZeroU32 = match NonZeroU32::new(5) {
    Some(n) => n,
    None => unreachable!(),
};

pub const RATE_LIMIT_ENV: &str = "REVOLVER_RATE_LIMIT";
pub const MAX_PARALLEL_ENV: &str = "REVOLVER_MAX_PARALLEL";

/// Knobs for one invocation of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Stop after the advance dry run; never call a provider with
    /// `dry_run = false`.
    pub dry_run: bool,
    pub rate_limit: NonZeroU32,
    /// `None` uses the host's available parallelism.
    pub max_parallel: Option<NonZeroUsize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            rate_limit: DEFAULT_RATE_LIMIT,
            max_parallel: None,
        }
    }
}

impl RunConfig {
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn rate_limit(mut self, per_second: NonZeroU32) -> Self {
        self.rate_limit = per_second;
        self
    }

    pub fn max_parallel(mut self, max: Option<NonZeroUsize>) -> Self {
        self.max_parallel = max;
        self
    }
}
