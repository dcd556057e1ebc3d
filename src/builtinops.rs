//! Built-in operations registry.
//!
//! This module holds the fixed table of native procedures every evaluator starts from,
//! the literal constants `#t`/`#f`, and the names of the special forms.
//!
//! ```scheme
//! (+ 1 2 3)                  ; variadic left fold
//! (- 5 2)                    ; binary arithmetic with int/float promotion
//! (car (list 1 2 3))         ; list primitives
//! (equal? (list 1) (list 1)) ; structural equality, unlike eq?
//! ```
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: receive evaluated arguments (e.g. `+`, `car`, `not`)
//! - **Higher-order functions**: additionally receive an [`Apply`] handle so they can call
//!   back into whichever evaluator invoked them (e.g. `map`)
//! - **Special forms**: see [`SpecialForm`]; they are recognised by the evaluators before
//!   any symbol lookup and never appear in the table
//!
//! ## Adding New Operations
//!
//! 1. Implement the function with signature `fn(&[Value]) -> Result<Value, Error>`
//! 2. Add it to `BUILTIN_OPS` with its Scheme identifier and arity
//! 3. Add tests covering the error cases

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{IntegerType, Value};

/// Literal constants resolved through the builtin table
const BUILTIN_CONSTANTS: &[(&str, bool)] = &[("#t", true), ("#f", false)];

/// Forms whose arguments are handed to the evaluator unevaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    Quote,
    Define,
    Set,
    If,
    Cond,
    Begin,
    Let,
    Lambda,
}

impl SpecialForm {
    pub fn from_symbol(name: &str) -> Option<SpecialForm> {
        match name {
            "quote" => Some(SpecialForm::Quote),
            "define" => Some(SpecialForm::Define),
            "set!" => Some(SpecialForm::Set),
            "if" => Some(SpecialForm::If),
            "cond" => Some(SpecialForm::Cond),
            "begin" => Some(SpecialForm::Begin),
            "let" => Some(SpecialForm::Let),
            "lambda" => Some(SpecialForm::Lambda),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            SpecialForm::Quote => "quote",
            SpecialForm::Define => "define",
            SpecialForm::Set => "set!",
            SpecialForm::If => "if",
            SpecialForm::Cond => "cond",
            SpecialForm::Begin => "begin",
            SpecialForm::Let => "let",
            SpecialForm::Lambda => "lambda",
        }
    }
}

/// Represents the expected number of arguments for an operation
#[derive(Debug, Clone, PartialEq)]
pub enum Arity {
    /// Exactly n arguments required
    Exact(usize),
    /// At least n arguments required
    AtLeast(usize),
    /// Any number of arguments (0 or more)
    Any,
}

impl Arity {
    /// Check if the given number of arguments is valid for this arity constraint
    pub fn validate(&self, arg_count: usize) -> Result<(), Error> {
        match self {
            Arity::Exact(n) if arg_count != *n => Err(Error::arity_error(*n, arg_count)),
            Arity::AtLeast(n) if arg_count < *n => Err(Error::arity_error(*n, arg_count)),
            _ => Ok(()),
        }
    }
}

/// Calls a procedure value on behalf of a higher-order builtin
///
/// Each evaluator implements this so that `map` applies closures with the caller's
/// semantics (environment chain or substitution).
pub trait Apply {
    fn apply(&mut self, procedure: &Value, args: &[Value]) -> Result<Value, Error>;
}

/// Represents the implementation of a builtin procedure
#[derive(Clone)]
pub enum OpKind {
    /// Regular function over evaluated arguments
    Function(fn(&[Value]) -> Result<Value, Error>),
    /// Function that needs to call back into the evaluator
    HigherOrder(fn(&[Value], &mut dyn Apply) -> Result<Value, Error>),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::HigherOrder(_) => write!(f, "HigherOrder(<fn>)"),
        }
    }
}

/// Definition of a builtin procedure
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The Scheme identifier for this operation
    pub id: &'static str,
    pub op_kind: OpKind,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    /// Validate arity and run the operation
    pub fn call(&self, args: &[Value], applier: &mut dyn Apply) -> Result<Value, Error> {
        self.arity.validate(args.len())?;
        match &self.op_kind {
            OpKind::Function(func) => func(args),
            OpKind::HigherOrder(func) => func(args, applier),
        }
    }

    pub fn is_higher_order(&self) -> bool {
        matches!(self.op_kind, OpKind::HigherOrder(_))
    }
}

//
// Numeric helpers
//

/// Two numeric operands after promotion
enum Operands {
    Integers(IntegerType, IntegerType),
    Floats(f64, f64),
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn promote(a: &Value, b: &Value, op: &str) -> Result<Operands, Error> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(Operands::Integers(*x, *y)),
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => Ok(Operands::Floats(x, y)),
            _ => Err(Error::TypeError(format!("{op} requires numbers"))),
        },
    }
}

fn overflow(op: &str) -> Error {
    Error::EvalError(format!("Integer overflow in {op}"))
}

fn add_pair(a: &Value, b: &Value) -> Result<Value, Error> {
    match promote(a, b, "+")? {
        Operands::Integers(x, y) => x
            .checked_add(y)
            .map(Value::Integer)
            .ok_or_else(|| overflow("addition")),
        Operands::Floats(x, y) => Ok(Value::Float(x + y)),
    }
}

//
// Builtin Function Implementations
//

// Macro to generate binary arithmetic with integer overflow detection
macro_rules! binary_arithmetic {
    ($name:ident, $checked:ident, $op:tt, $op_str:expr, $what:expr) => {
        pub fn $name(args: &[Value]) -> Result<Value, Error> {
            match args {
                [a, b] => match promote(a, b, $op_str)? {
                    Operands::Integers(x, y) => {
                        x.$checked(y).map(Value::Integer).ok_or_else(|| overflow($what))
                    }
                    Operands::Floats(x, y) => Ok(Value::Float(x $op y)),
                },
                _ => Err(Error::arity_error(2, args.len())),
            }
        }
    };
}

binary_arithmetic!(builtin_sub, checked_sub, -, "-", "subtraction");
binary_arithmetic!(builtin_mul, checked_mul, *, "*", "multiplication");

// Macro to generate binary numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        pub fn $name(args: &[Value]) -> Result<Value, Error> {
            match args {
                [a, b] => match promote(a, b, $op_str)? {
                    Operands::Integers(x, y) => Ok(Value::Bool(x $op y)),
                    Operands::Floats(x, y) => Ok(Value::Bool(x $op y)),
                },
                _ => Err(Error::arity_error(2, args.len())),
            }
        }
    };
}

numeric_comparison!(builtin_num_eq, ==, "=");
numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_le, <=, "<=");
numeric_comparison!(builtin_ge, >=, ">=");

/// Variadic addition as a left fold; at least one operand
pub fn builtin_add(args: &[Value]) -> Result<Value, Error> {
    match args {
        [] => Err(Error::arity_error(1, 0)),
        [first, rest @ ..] => {
            if !first.is_number() {
                return Err(Error::TypeError("+ requires numbers".to_owned()));
            }
            rest.iter().try_fold(first.clone(), |acc, arg| add_pair(&acc, arg))
        }
    }
}

/// Exact when an integer division leaves no remainder, float otherwise
pub fn builtin_div(args: &[Value]) -> Result<Value, Error> {
    match args {
        [a, b] => match promote(a, b, "/")? {
            Operands::Integers(_, 0) => Err(Error::EvalError("Division by zero".to_owned())),
            Operands::Integers(x, y) if x.checked_rem(y) == Some(0) => {
                x.checked_div(y).map(Value::Integer).ok_or_else(|| overflow("division"))
            }
            Operands::Integers(x, y) => Ok(Value::Float(x as f64 / y as f64)),
            Operands::Floats(x, y) => Ok(Value::Float(x / y)),
        },
        _ => Err(Error::arity_error(2, args.len())),
    }
}

pub fn builtin_abs(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::Integer(n)] => n.checked_abs().map(Value::Integer).ok_or_else(|| overflow("abs")),
        [Value::Float(x)] => Ok(Value::Float(x.abs())),
        [_] => Err(Error::TypeError("abs requires a number".to_owned())),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

pub fn builtin_round(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::Integer(n)] => Ok(Value::Integer(*n)),
        [Value::Float(x)] => Ok(Value::Float(x.round_ties_even())),
        [_] => Err(Error::TypeError("round requires a number".to_owned())),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn numeric_extreme(
    args: &[Value],
    op: &str,
    pick_first: fn(f64, f64) -> bool,
) -> Result<Value, Error> {
    let mut best: Option<&Value> = None;
    let mut any_float = false;
    for arg in args {
        let x = as_f64(arg).ok_or_else(|| Error::TypeError(format!("{op} requires numbers")))?;
        any_float |= matches!(arg, Value::Float(_));
        best = match best {
            Some(current) if !pick_first(x, as_f64(current).unwrap_or(x)) => Some(current),
            _ => Some(arg),
        };
    }
    match best {
        Some(Value::Integer(n)) if any_float => Ok(Value::Float(*n as f64)),
        Some(value) => Ok(value.clone()),
        None => Err(Error::arity_error(1, 0)),
    }
}

pub fn builtin_max(args: &[Value]) -> Result<Value, Error> {
    numeric_extreme(args, "max", |candidate, current| candidate > current)
}

pub fn builtin_min(args: &[Value]) -> Result<Value, Error> {
    numeric_extreme(args, "min", |candidate, current| candidate < current)
}

pub fn builtin_car(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::List(list)] => match &list[..] {
            [] => Err(Error::EvalError("car of empty list".to_owned())),
            [first, ..] => Ok(first.clone()),
        },
        [_] => Err(Error::TypeError("car requires a list".to_owned())),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

pub fn builtin_cdr(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::List(list)] => match &list[..] {
            [] => Err(Error::EvalError("cdr of empty list".to_owned())),
            [_, rest @ ..] => Ok(Value::list(rest.iter().cloned())),
        },
        [_] => Err(Error::TypeError("cdr requires a list".to_owned())),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

pub fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    match args {
        [first, Value::List(rest)] => {
            Ok(Value::list(std::iter::once(first.clone()).chain(rest.iter().cloned())))
        }
        // Improper lists are not representable
        [_, _] => Err(Error::TypeError(
            "cons requires a list as second argument".to_owned(),
        )),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

pub fn builtin_append(args: &[Value]) -> Result<Value, Error> {
    let mut joined = Vec::new();
    for arg in args {
        match arg {
            Value::List(items) => joined.extend(items.iter().cloned()),
            _ => return Err(Error::TypeError("append requires lists".to_owned())),
        }
    }
    Ok(Value::list(joined))
}

pub fn builtin_list(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::list(args.iter().cloned()))
}

pub fn builtin_length(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::List(items)] => Ok(Value::Integer(items.len() as IntegerType)),
        [_] => Err(Error::TypeError("length requires a list".to_owned())),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

// Macro to generate single-argument type predicates
macro_rules! predicate {
    ($name:ident, $value:ident => $test:expr) => {
        pub fn $name(args: &[Value]) -> Result<Value, Error> {
            match args {
                [$value] => Ok(Value::Bool($test)),
                _ => Err(Error::arity_error(1, args.len())),
            }
        }
    };
}

predicate!(builtin_is_list, value => matches!(value, Value::List(_)));
predicate!(builtin_null, value => value.is_nil());
predicate!(builtin_is_number, value => value.is_number());
predicate!(builtin_is_symbol, value => matches!(value, Value::Symbol(_)));
predicate!(builtin_is_procedure, value => value.is_procedure());
predicate!(builtin_not, value => !value.is_truthy());

pub fn builtin_eq(args: &[Value]) -> Result<Value, Error> {
    match args {
        [first, second] => Ok(Value::Bool(first.is_identical(second))),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

pub fn builtin_equal(args: &[Value]) -> Result<Value, Error> {
    match args {
        // Scheme's equal? is structural equality for all types
        [first, second] => Ok(Value::Bool(first == second)),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// `(map proc list ...)`, stopping at the shortest list
pub fn builtin_map(args: &[Value], applier: &mut dyn Apply) -> Result<Value, Error> {
    let [procedure, lists @ ..] = args else {
        return Err(Error::arity_error(2, args.len()));
    };
    if !procedure.is_procedure() {
        return Err(Error::TypeError(format!(
            "map requires a procedure, got {procedure}"
        )));
    }
    let lists = lists
        .iter()
        .map(|list| match list {
            Value::List(items) => Ok(items.clone()),
            _ => Err(Error::TypeError("map requires lists".to_owned())),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let shortest = lists.iter().map(|items| items.len()).min().unwrap_or(0);

    let mut results = Vec::with_capacity(shortest);
    for index in 0..shortest {
        let call_args: Vec<Value> = lists.iter().map(|items| items[index].clone()).collect();
        results.push(applier.apply(procedure, &call_args)?);
    }
    Ok(Value::list(results))
}

/// Global registry of all builtin procedures
static BUILTIN_OPS: &[BuiltinOp] = &[
    // Arithmetic
    BuiltinOp {
        id: "+",
        op_kind: OpKind::Function(builtin_add),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        id: "-",
        op_kind: OpKind::Function(builtin_sub),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "*",
        op_kind: OpKind::Function(builtin_mul),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "/",
        op_kind: OpKind::Function(builtin_div),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "abs",
        op_kind: OpKind::Function(builtin_abs),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "round",
        op_kind: OpKind::Function(builtin_round),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "max",
        op_kind: OpKind::Function(builtin_max),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        id: "min",
        op_kind: OpKind::Function(builtin_min),
        arity: Arity::AtLeast(1),
    },
    // Comparison
    BuiltinOp {
        id: ">",
        op_kind: OpKind::Function(builtin_gt),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "<",
        op_kind: OpKind::Function(builtin_lt),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: ">=",
        op_kind: OpKind::Function(builtin_ge),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "<=",
        op_kind: OpKind::Function(builtin_le),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "=",
        op_kind: OpKind::Function(builtin_num_eq),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "eq?",
        op_kind: OpKind::Function(builtin_eq),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "equal?",
        op_kind: OpKind::Function(builtin_equal),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "not",
        op_kind: OpKind::Function(builtin_not),
        arity: Arity::Exact(1),
    },
    // Lists
    BuiltinOp {
        id: "car",
        op_kind: OpKind::Function(builtin_car),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "cdr",
        op_kind: OpKind::Function(builtin_cdr),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "cons",
        op_kind: OpKind::Function(builtin_cons),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "append",
        op_kind: OpKind::Function(builtin_append),
        arity: Arity::Any,
    },
    BuiltinOp {
        id: "list",
        op_kind: OpKind::Function(builtin_list),
        arity: Arity::Any,
    },
    BuiltinOp {
        id: "length",
        op_kind: OpKind::Function(builtin_length),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "map",
        op_kind: OpKind::HigherOrder(builtin_map),
        arity: Arity::AtLeast(2),
    },
    // Predicates
    BuiltinOp {
        id: "list?",
        op_kind: OpKind::Function(builtin_is_list),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "null?",
        op_kind: OpKind::Function(builtin_null),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "number?",
        op_kind: OpKind::Function(builtin_is_number),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "symbol?",
        op_kind: OpKind::Function(builtin_is_symbol),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "procedure?",
        op_kind: OpKind::Function(builtin_is_procedure),
        arity: Arity::Exact(1),
    },
];

/// Lazy static map from id to BuiltinOp (private - use find_builtin_op)
static BUILTIN_TABLE: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| BUILTIN_OPS.iter().map(|op| (op.id, op)).collect());

/// Find a builtin procedure by its Scheme id
pub fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_TABLE.get(id).copied()
}

/// Resolve a name against the builtin table: constants first, then procedures
pub fn lookup_builtin(name: &str) -> Option<Value> {
    BUILTIN_CONSTANTS
        .iter()
        .find(|(id, _)| *id == name)
        .map(|(_, b)| Value::Bool(*b))
        .or_else(|| find_builtin_op(name).map(Value::BuiltinFunction))
}

/// Every name in the builtin table paired with its value
pub fn builtin_bindings() -> impl Iterator<Item = (&'static str, Value)> {
    BUILTIN_CONSTANTS
        .iter()
        .map(|(id, b)| (*id, Value::Bool(*b)))
        .chain(BUILTIN_OPS.iter().map(|op| (op.id, Value::BuiltinFunction(op))))
}
