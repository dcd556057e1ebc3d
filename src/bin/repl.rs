use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use schemelet::evaluator::EvalConfig;
use schemelet::harness::{self, Session, SessionConfig, Strategy};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Interactive schemelet interpreter", long_about = None)]
struct Cli {
    /// Evaluator to start with
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

    println!("schemelet {}", env!("CARGO_PKG_VERSION"));
    println!("Type expressions to evaluate them, :help for commands, Ctrl+D to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;
    let mut session = harness::session_for(&config);

    loop {
        match rl.readline(&format!("scheme[{}]> ", session.strategy())) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(command) = line.strip_prefix(':') {
                    match command.split_whitespace().collect::<Vec<_>>()[..] {
                        ["help"] => print_help(),
                        ["env"] => print_environment(session.as_ref()),
                        ["reset"] => {
                            session.reset();
                            println!("Definitions cleared.");
                        }
                        ["strategy"] => println!("{}", session.strategy()),
                        ["strategy", name] => match name {
                            "env" | "subst" => {
                                config.strategy = if name == "env" {
                                    Strategy::Environment
                                } else {
                                    Strategy::Substitution
                                };
                                session = harness::session_for(&config);
                                println!("Switched to {name} (definitions cleared).");
                            }
                            _ => println!("Unknown strategy: {name} (expected env or subst)"),
                        },
                        ["quit"] | ["exit"] => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => println!("Unknown command :{command}; try :help"),
                    }
                    continue;
                }

                match session.eval_line(line) {
                    Ok(schemelet::Value::Unspecified) => {}
                    Ok(result) => println!("{result}"),
                    Err(e) => println!("Error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted. Use Ctrl+D or :quit to exit.");
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  :help            - Show this help message");
    println!("  :env             - Show user definitions");
    println!("  :strategy        - Show the active evaluator");
    println!("  :strategy env    - Switch to environment-chain evaluation");
    println!("  :strategy subst  - Switch to substitution evaluation");
    println!("  :reset           - Forget all definitions");
    println!("  :quit, :exit     - Exit the interpreter");
    println!();
    println!("Supported Scheme features:");
    println!("  Numbers: 42, 2.5, -5    Booleans: #t, #f");
    println!("  Special forms: quote, define, set!, if, cond, begin, let, lambda");
    println!("  Arithmetic: + - * / abs round max min");
    println!("  Comparison: = < > <= >=");
    println!("  Lists: car cdr cons append list length map");
    println!("  Predicates: list? null? number? symbol? procedure? not eq? equal?");
    println!();
    println!("Examples:");
    println!("  (define square (lambda (x) (* x x)))");
    println!("  (square 5)");
    println!("  (let ((x 5)) (* x x))");
    println!("  (cond ((> 1 2) 1) (else 2))");
}

fn print_environment(session: &dyn Session) {
    let bindings = session.bindings();
    if bindings.is_empty() {
        println!("No definitions.");
        return;
    }
    for (name, value) in bindings {
        println!("  {name} = {value}");
    }
}
