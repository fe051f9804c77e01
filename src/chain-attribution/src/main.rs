//! Chain Attribution — batch builder of customer conversion chains and
//! per-channel attribution report.
//!
//! Reads the materialized event table, runs the pipeline, and writes the
//! chain set, report sheets and run summary to the output directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use attribution_core::config::AppConfig;
use attribution_reporting::solver_for;
use chain_attribution::{io, Pipeline};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use tracing::{error, info};

const DEFAULT_FILTER: &str =
    "chain_attribution=info,attribution_chains=info,attribution_reporting=info";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "chain-attribution")]
#[command(about = "Build conversion chains and attribute conversions to marketing channels")]
#[command(version)]
struct Cli {
    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Event table, JSON array or JSON lines (overrides config)
    #[arg(long, env = "CHAIN_ATTRIBUTION__INPUT_PATH")]
    input: Option<String>,

    /// Output directory (overrides config)
    #[arg(long, env = "CHAIN_ATTRIBUTION__OUTPUT_DIR")]
    output_dir: Option<String>,

    /// Skip the concatenation step
    #[arg(long, default_value_t = false)]
    no_concat_chains: bool,

    /// Process customers on the calling thread only
    #[arg(long, default_value_t = false)]
    force_sequential: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| DEFAULT_FILTER.into()),
    );
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    // Apply CLI overrides
    if let Some(input) = cli.input {
        config.input_path = input;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if cli.no_concat_chains {
        config.chains.concat_chains = false;
    }
    if cli.force_sequential {
        config.chains.parallel = false;
    }

    info!(
        input = %config.input_path,
        output_dir = %config.output_dir,
        merge_threshold_days = config.chains.merge_threshold_days,
        concat_threshold_days = config.chains.concat_threshold_days,
        concat_chains = config.chains.concat_chains,
        parallel = config.chains.parallel,
        solver = ?config.report.solver,
        "Configuration loaded"
    );

    let rows = io::read_events(Path::new(&config.input_path))?;
    let solver = solver_for(&config.report);
    let output_dir = PathBuf::from(&config.output_dir);

    let pipeline = Pipeline::new(config);
    let output = pipeline.run(rows, solver.as_ref(), Utc::now().date_naive())?;
    let written = io::write_outputs(&output, &output_dir)?;

    info!(
        run_id = %output.summary.run_id,
        chains = output.summary.final_chains,
        files = written.len(),
        "Chain attribution complete"
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Chain attribution run failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
