mod cmd;
mod output;

use clap::{Parser, Subcommand};
use revolver_core::config::{MAX_PARALLEL_ENV, RATE_LIMIT_ENV};
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "revolver",
    about = "Rotate a credential at its source and propagate it to every sink",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON (printed after anything a Stdout sink writes)
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log progress at info level (RUST_LOG overrides)
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rotate every credential listed in the rotations file
    Rotate {
        /// Path to the rotations file
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Validate sources and sinks without committing anything
        #[arg(long, short = 'd')]
        dry_run: bool,

        /// Rotations allowed to start per second
        #[arg(long, env = RATE_LIMIT_ENV)]
        rate_limit: Option<NonZeroU32>,

        /// Upper bound on concurrently running work (default: available CPUs)
        #[arg(long, env = MAX_PARALLEL_ENV)]
        max_parallel: Option<NonZeroUsize>,
    },

    /// Load the rotations file and list what it would rotate
    Validate {
        /// Path to the rotations file
        #[arg(long, short = 'c')]
        config: PathBuf,
    },

    /// List registered source and sink providers
    Providers,

    /// Print the version
    Version,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Rotate {
            config,
            dry_run,
            rate_limit,
            max_parallel,
        } => cmd::rotate::run(
            &config,
            cmd::rotate::Options {
                dry_run,
                rate_limit,
                max_parallel,
            },
            cli.json,
        ),
        Commands::Validate { config } => cmd::validate::run(&config, cli.json),
        Commands::Providers => cmd::providers::run(cli.json),
        Commands::Version => cmd::version::run(cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
