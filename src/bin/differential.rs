use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use schemelet::evaluator::EvalConfig;
use schemelet::harness::{self, SessionConfig, Strategy};
use tracing_subscriber::EnvFilter;

/// Compare final values against a reference Scheme
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Program files to check
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Evaluator(s) to check; both when omitted
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Reference interpreter, invoked as `<reference> <file>`
    #[arg(long, default_value = "racket")]
    reference: String,

    /// Maximum evaluation depth
    #[arg(long)]
    max_depth: Option<usize>,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let strategies = match cli.strategy {
        Some(strategy) => vec![strategy],
        None => vec![Strategy::Environment, Strategy::Substitution],
    };
    let eval = cli
        .max_depth
        .map(|max_depth| EvalConfig { max_depth })
        .unwrap_or_default();

    println!("=== Differential check against {} ===\n", cli.reference);

    let mut total = 0;
    let mut failed = 0;

    for strategy in strategies {
        println!("--- {strategy} ---");
        let config = SessionConfig {
            strategy,
            eval: eval.clone(),
            ..SessionConfig::default()
        };
        for file in &cli.files {
            total += 1;
            match harness::compare_file(file, &config, &cli.reference) {
                Ok(comparison) if comparison.is_match() => {
                    println!("✓ {}: {}", file.display(), comparison.actual);
                }
                Ok(comparison) => {
                    println!(
                        "✗ {}: got {}, reference printed {}",
                        file.display(),
                        comparison.actual,
                        comparison.expected
                    );
                    failed += 1;
                }
                Err(e) => {
                    println!("✗ {}: {e}", file.display());
                    failed += 1;
                }
            }
        }
        println!();
    }

    println!("=== Summary ===");
    println!("Total checks: {total}");
    println!("Passed: {}", total - failed);
    println!("Failed: {failed}");

    if failed > 0 {
        println!("\nMismatches detected! See failed checks above.");
        Ok(ExitCode::FAILURE)
    } else {
        println!("\nAll files agree with the reference.");
        Ok(ExitCode::SUCCESS)
    }
}
