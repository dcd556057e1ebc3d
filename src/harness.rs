//! Program driving and differential comparison.
//!
//! A program is a text file with one top-level form per line. Either evaluator can run
//! it through a [`Session`], and [`compare_file`] checks the final value against a
//! reference Scheme run as a subprocess on the same file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, instrument};

use crate::evaluator::{self, EvalConfig, Environment};
use crate::parser::{self, ParseConfig};
use crate::substitution::{self, GlobalStore};
use crate::{Error, Value};

/// Lines the reader never sees: comments, `#lang` lines and `(require ...)`
pub fn is_directive(line: &str) -> bool {
    line.starts_with('#') || line.starts_with(';') || line.starts_with("(require")
}

/// The lines of a program that get evaluated, in order
pub fn program_lines(source: &str) -> impl Iterator<Item = &str> {
    source
        .lines()
        .filter(|line| !is_directive(line) && !line.trim().is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("reference `{command}` failed: {message}")]
    Reference { command: String, message: String },
    #[error("cannot decode {0:?} as a boolean or integer")]
    Decode(String),
    #[error("program has no expressions")]
    EmptyProgram,
    #[error(transparent)]
    Scheme(#[from] Error),
}

/// A final result as the comparator sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    Bool(bool),
    Integer(i64),
}

impl Observed {
    /// Decode printed reference output: `#t`, `#f`, otherwise an integer
    pub fn decode(output: &str) -> Result<Observed, HarnessError> {
        match output.trim() {
            "#t" => Ok(Observed::Bool(true)),
            "#f" => Ok(Observed::Bool(false)),
            text => text
                .parse()
                .map(Observed::Integer)
                .map_err(|_| HarnessError::Decode(text.to_owned())),
        }
    }

    /// Decode an interpreter value the same way; floats with no fractional part count as
    /// integers
    pub fn from_value(value: &Value) -> Result<Observed, HarnessError> {
        match value {
            Value::Bool(b) => Ok(Observed::Bool(*b)),
            Value::Integer(n) => Ok(Observed::Integer(*n)),
            Value::Float(x) if x.fract() == 0.0 && x.abs() < i64::MAX as f64 => {
                Ok(Observed::Integer(*x as i64))
            }
            other => Err(HarnessError::Decode(other.to_string())),
        }
    }
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Observed::Integer(n) => write!(f, "{n}"),
        }
    }
}

/// Which evaluator runs a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Strategy {
    /// Lexical environment chains and closures
    #[default]
    #[value(name = "env")]
    Environment,
    /// Body rewriting with a single global store
    #[value(name = "subst")]
    Substitution,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Environment => write!(f, "env"),
            Strategy::Substitution => write!(f, "subst"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub strategy: Strategy,
    pub parse: ParseConfig,
    pub eval: EvalConfig,
}

/// Evaluation state that persists across lines
pub trait Session {
    /// Read the first form of `line` and evaluate it
    fn eval_line(&mut self, line: &str) -> Result<Value, Error>;

    /// Drop every user definition
    fn reset(&mut self);

    fn strategy(&self) -> Strategy;

    /// User definitions, sorted by name
    fn bindings(&self) -> Vec<(String, Value)>;
}

pub struct EnvironmentSession {
    env: Environment,
    parse: ParseConfig,
    eval: EvalConfig,
}

impl EnvironmentSession {
    pub fn new(parse: ParseConfig, eval: EvalConfig) -> Self {
        EnvironmentSession {
            env: evaluator::create_global_env(),
            parse,
            eval,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }
}

impl Session for EnvironmentSession {
    fn eval_line(&mut self, line: &str) -> Result<Value, Error> {
        let expr = parser::parse_with_config(line, &self.parse)?;
        evaluator::eval_with_config(&expr, &self.env, &self.eval)
    }

    fn reset(&mut self) {
        debug!("reset environment session");
        self.env = evaluator::create_global_env();
    }

    fn strategy(&self) -> Strategy {
        Strategy::Environment
    }

    fn bindings(&self) -> Vec<(String, Value)> {
        self.env.local_bindings()
    }
}

pub struct SubstitutionSession {
    store: GlobalStore,
    parse: ParseConfig,
    eval: EvalConfig,
}

impl SubstitutionSession {
    pub fn new(parse: ParseConfig, eval: EvalConfig) -> Self {
        SubstitutionSession {
            store: GlobalStore::new(),
            parse,
            eval,
        }
    }

    pub fn store(&self) -> &GlobalStore {
        &self.store
    }
}

impl Session for SubstitutionSession {
    fn eval_line(&mut self, line: &str) -> Result<Value, Error> {
        let expr = parser::parse_with_config(line, &self.parse)?;
        substitution::eval_with_config(&expr, &mut self.store, &self.eval)
    }

    fn reset(&mut self) {
        debug!(definitions = self.store.len(), "reset substitution session");
        self.store.clear();
    }

    fn strategy(&self) -> Strategy {
        Strategy::Substitution
    }

    fn bindings(&self) -> Vec<(String, Value)> {
        self.store.bindings()
    }
}

pub fn session_for(config: &SessionConfig) -> Box<dyn Session> {
    debug!(strategy = %config.strategy, "new session");
    match config.strategy {
        Strategy::Environment => Box::new(EnvironmentSession::new(
            config.parse.clone(),
            config.eval.clone(),
        )),
        Strategy::Substitution => Box::new(SubstitutionSession::new(
            config.parse.clone(),
            config.eval.clone(),
        )),
    }
}

/// Evaluate every program line; the value of the last one, if there was any
pub fn run_program(session: &mut dyn Session, source: &str) -> Result<Option<Value>, Error> {
    let mut last = None;
    for line in program_lines(source) {
        last = Some(session.eval_line(line)?);
    }
    Ok(last)
}

/// Run `command <path>` and decode what it prints
#[instrument(level = "debug", skip_all, fields(command = command, path = %path.display()))]
pub fn run_reference(command: &str, path: &Path) -> Result<Observed, HarnessError> {
    let output = Command::new(command).arg(path).output()?;
    if !output.status.success() {
        return Err(HarnessError::Reference {
            command: command.to_owned(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Observed::decode(&String::from_utf8_lossy(&output.stdout))
}

/// Outcome of running one file both ways
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub path: PathBuf,
    pub strategy: Strategy,
    pub actual: Observed,
    pub expected: Observed,
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        self.actual == self.expected
    }
}

/// Evaluate a file in a fresh session and compare with the reference
pub fn compare_file(
    path: &Path,
    config: &SessionConfig,
    reference: &str,
) -> Result<Comparison, HarnessError> {
    let source = std::fs::read_to_string(path)?;
    let mut session = session_for(config);
    let value = run_program(session.as_mut(), &source)?.ok_or(HarnessError::EmptyProgram)?;
    let actual = Observed::from_value(&value)?;
    let expected = run_reference(reference, path)?;
    debug!(%actual, %expected, "compared");
    Ok(Comparison {
        path: path.to_path_buf(),
        strategy: config.strategy,
        actual,
        expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::val;

    #[test]
    fn test_program_lines() {
        let source = "#lang racket\n(require rackunit)\n; comment\n\n(define x 1)\n  \nx\n";
        assert_eq!(program_lines(source).collect::<Vec<_>>(), vec!["(define x 1)", "x"]);
        assert!(is_directive("#t"));
        assert!(!is_directive(" ; indented"));
    }

    #[test]
    fn test_decode() {
        assert_eq!(Observed::decode("#t\n").unwrap(), Observed::Bool(true));
        assert_eq!(Observed::decode("#f").unwrap(), Observed::Bool(false));
        assert_eq!(Observed::decode("-42\n").unwrap(), Observed::Integer(-42));
        assert!(matches!(Observed::decode("2.5"), Err(HarnessError::Decode(_))));
        assert!(matches!(Observed::decode("(1 2)"), Err(HarnessError::Decode(_))));
    }

    #[test]
    fn test_from_value() {
        assert_eq!(Observed::from_value(&val(7)).unwrap(), Observed::Integer(7));
        assert_eq!(Observed::from_value(&val(6.0)).unwrap(), Observed::Integer(6));
        assert_eq!(Observed::from_value(&val(false)).unwrap(), Observed::Bool(false));
        assert!(Observed::from_value(&val(0.5)).is_err());
        assert!(Observed::from_value(&val([1])).is_err());
        assert!(Observed::from_value(&Value::Unspecified).is_err());
    }

    #[test]
    fn test_sessions_agree_on_simple_programs() {
        let source = "(define square (lambda (x) (* x x)))\n(square (let ((y 3)) (+ y 1)))\n";
        for strategy in [Strategy::Environment, Strategy::Substitution] {
            let config = SessionConfig {
                strategy,
                ..SessionConfig::default()
            };
            let mut session = session_for(&config);
            assert_eq!(session.strategy(), strategy);
            assert_eq!(run_program(session.as_mut(), source).unwrap(), Some(val(16)));
            assert_eq!(session.bindings().len(), 1);
            session.reset();
            assert!(session.bindings().is_empty());
            assert!(matches!(session.eval_line("square"), Err(Error::UnboundVariable(_))));
        }
    }

    #[test]
    fn test_empty_program() {
        let mut session = EnvironmentSession::new(ParseConfig::default(), EvalConfig::default());
        assert_eq!(run_program(&mut session, "; nothing\n").unwrap(), None);
    }
}
