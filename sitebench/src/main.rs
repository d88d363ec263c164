use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use sitebench::{
    Config, Runner, VuExecutor,
    suites::{self, SuiteKind},
};
use tracing_subscriber::EnvFilter;

/// Exit code when the run finished but crossed a threshold.
const THRESHOLDS_CROSSED: u8 = 99;

#[derive(Debug, Parser)]
#[command(version, about = "Load test a static website page by page")]
struct Args {
    /// Suite to run
    #[arg(value_enum)]
    suite: SuiteKind,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target site, overrides the configuration
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// Directory for summary files, overrides the configuration
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(THRESHOLDS_CROSSED),
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> sitebench::Result<bool> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    }
    .with_base_url(args.base_url);

    let out_dir = match args.out_dir {
        Some(dir) => dir,
        None => PathBuf::from(&config.out_dir),
    };
    let runner = Runner::new(VuExecutor::default())?.with_out_dir(out_dir);

    let outcome = suites::run(args.suite, &config, &runner).await?;
    if !outcome.passed() {
        tracing::error!("{} thresholds crossed", outcome.violations().count());
    }
    Ok(outcome.passed())
}
