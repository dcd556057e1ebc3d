//! schemelet - a small Scheme interpreter with two interchangeable evaluators
//!
//! Source text goes through a lexer and a recursive-descent reader into a [`ast::Value`]
//! tree, which is then evaluated by one of two engines:
//!
//! - [`evaluator`]: lexical environment chains with closures that capture their
//!   defining environment by reference.
//! - [`substitution`]: a single global store, with procedure calls implemented by
//!   rewriting argument values into the procedure body (capture is possible).
//!
//! ```scheme
//! (define square (lambda (x) (* x x)))
//! (square 5)                 ; 25
//! (let ((x 5)) (* x x))      ; 25
//! (cond ((> 1 2) 1) (else 2)) ; 2
//! ```
//!
//! ## Modules
//!
//! - `parser`: tokenizer and reader
//! - `ast`: the value/expression type shared by both evaluators
//! - `builtinops`: the builtin procedure table and special-form names
//! - `evaluator`: environment-chain evaluation
//! - `substitution`: substitution evaluation and the global store
//! - `harness`: line filtering, sessions and differential comparison

/// Maximum nesting depth accepted by the reader
pub const MAX_PARSE_DEPTH: usize = 256;

/// Maximum evaluation depth before evaluation is aborted
/// Set well above parse depth since every procedure call nests several evaluations
pub const MAX_EVAL_DEPTH: usize = 1000;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input ended before the expression was complete (or contained no tokens at all)
    Incomplete,
    /// A `)` appeared where an expression was expected
    UnexpectedClose,
    /// Expression nesting exceeded the configured parse depth
    TooDeeplyNested,
}

/// A reader failure with its category and a human readable message
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
        }
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("ParseError: {0}")]
    ParseError(#[from] ParseError),
    #[error("EvaluationError: {0}")]
    EvalError(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Unbound variable: {0}")]
    UnboundVariable(String),
    #[error("ArityError: expected {expected} arguments, got {got}")]
    ArityError { expected: usize, got: usize },
}

impl Error {
    /// Create an ArityError
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError { expected, got }
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
mod forms;
pub mod harness;
pub mod parser;
pub mod substitution;

pub use ast::Value;
pub use evaluator::{EvalConfig, Environment};
pub use substitution::GlobalStore;
