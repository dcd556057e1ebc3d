use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use schemelet::evaluator::EvalConfig;
use schemelet::harness::{self, SessionConfig, Strategy};
use tracing_subscriber::EnvFilter;

/// Evaluate a program file line by line and print the final value
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Program file, one top-level form per line
    file: PathBuf,

    #[arg(long, value_enum, default_value_t = Strategy::Environment)]
    strategy: Strategy,

    /// Maximum evaluation depth
    #[arg(long)]
    max_depth: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = SessionConfig {
        strategy: cli.strategy,
        ..SessionConfig::default()
    };
    if let Some(max_depth) = cli.max_depth {
        config.eval = EvalConfig { max_depth };
    }

    let source = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("reading {}", cli.file.display()))?;
    let mut session = harness::session_for(&config);
    let result = harness::run_program(session.as_mut(), &source)
        .with_context(|| format!("evaluating {}", cli.file.display()))?;
    if let Some(value) = result {
        println!("{value}");
    }
    Ok(())
}
