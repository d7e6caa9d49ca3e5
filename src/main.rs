use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod anthropic;
mod config;
mod error;
mod evaluation;
mod judge;
mod loader;
mod models;
mod openai;
mod output;
mod retry;
mod runner;

use crate::config::Config;
use crate::output::OutputFormat;
use crate::runner::Runner;

/// Judge Evaluation CLI - Score support bot responses with a cross-provider LLM judge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON array of examples to evaluate
    input: PathBuf,

    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "judge.toml")]
    config: PathBuf,

    /// Where to write the JSON report
    #[arg(short, long, default_value = "results/output.json")]
    output: PathBuf,

    /// Output format: plain or json
    #[arg(short, long, default_value = "plain")]
    format: OutputFormat,

    /// Maximum number of examples scored at once (overrides the config)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Verbose output - log each judge request
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = Config::from_file(&args.config)?;
    if let Some(concurrency) = args.concurrency {
        anyhow::ensure!(concurrency >= 1, "--concurrency must be at least 1");
        config.concurrency = concurrency;
    }

    let loaded = loader::load_examples(&args.input)?;
    let input_len = loaded.input_len();
    tracing::info!(
        valid = loaded.examples.len(),
        skipped = loaded.skipped.len(),
        "examples loaded"
    );

    let runner = Runner::from_config(&config);
    let report = runner.run(loaded.examples).await.into_report(loaded.skipped);

    output::write_report(&report, &args.output)?;
    output::print_report(&report, args.format);

    if input_len > 0 && report.results.is_empty() {
        tracing::error!(input_len, "no example could be evaluated");
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
