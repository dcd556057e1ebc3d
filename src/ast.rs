//! This module defines the [`Value`] type that both evaluators work on. A single enum
//! represents the expression tree produced by the reader (numbers, symbols and lists)
//! as well as the runtime values evaluation produces (booleans, procedures and the
//! unspecified value). The substitution evaluator relies on this: it rewrites runtime
//! values straight into expression trees.
//!
//! Lists are immutable, reference-counted slices. Structural equality ([`PartialEq`])
//! compares contents, while [`Value::is_identical`] compares allocations, which is what
//! `eq?` and `equal?` are built on.

use std::fmt;
use std::rc::Rc;

use crate::builtinops::BuiltinOp;
use crate::evaluator::Environment;

/// Type alias for integer values in the interpreter
pub(crate) type IntegerType = i64;

/// Procedure created by `lambda` in the environment-chain evaluator
pub struct Closure {
    pub params: Vec<String>,
    pub body: Value,
    /// Environment chain captured at creation, shared rather than copied
    pub env: Environment,
}

/// Procedure created by `lambda` in the substitution evaluator
///
/// There is no captured environment: calls rewrite `body` with the argument values.
/// Binders are usually symbols, but an earlier rewrite may have turned one into a
/// literal; it is then matched by equality like any other binder.
pub struct Lambda {
    pub params: Vec<Value>,
    pub body: Value,
}

/// Core value and expression type
///
/// To build trees in code and tests use the helpers [`sym`], [`val`] and [`nil`].
#[derive(Clone)]
pub enum Value {
    Integer(IntegerType),
    Float(f64),
    /// Symbols (identifiers), case sensitive
    Symbol(String),
    /// Booleans only arise from evaluation (`#t`/`#f` are read as symbols)
    Bool(bool),
    /// Forms and list data share this representation
    List(Rc<[Value]>),
    /// Native procedure from the builtin table
    BuiltinFunction(&'static BuiltinOp),
    Closure(Rc<Closure>),
    Lambda(Rc<Lambda>),
    /// Result of `define`, `set!` and a `cond` without a matching clause
    /// Never equal to anything, including itself
    Unspecified,
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Float(x) => write!(f, "Float({x:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::BuiltinFunction(op) => write!(f, "BuiltinFunction({})", op.id),
            Value::Closure(closure) => {
                write!(f, "Closure(params={:?}, body={:?})", closure.params, closure.body)
            }
            Value::Lambda(lambda) => {
                write!(f, "Lambda(params={:?}, body={:?})", lambda.params, lambda.body)
            }
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(n as IntegerType)
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(IntegerType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into))
    }
}

/// Helper for creating symbols, handy in mixed lists
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper for creating values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper for creating the empty list
pub fn nil() -> Value {
    Value::List(Rc::from(Vec::new()))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            // Debug formatting keeps the fractional part ("2.0"), so floats re-read as floats
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::BuiltinFunction(op) => write!(f, "#<procedure:{}>", op.id),
            Value::Closure(_) => write!(f, "#<procedure>"),
            Value::Lambda(_) => write!(f, "#<lambda>"),
            Value::Unspecified => write!(f, "#<unspecified>"),
        }
    }
}

impl Value {
    /// Build a list value from an iterator of elements
    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::List(items.into_iter().collect())
    }

    /// Check if a value represents nil (empty list)
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::List(list) if list.is_empty())
    }

    /// Only `#f` counts as false
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    pub fn is_procedure(&self) -> bool {
        matches!(
            self,
            Value::BuiltinFunction(_) | Value::Closure(_) | Value::Lambda(_)
        )
    }

    /// Values that evaluate to themselves in both evaluators
    pub(crate) fn is_self_evaluating(&self) -> bool {
        matches!(
            self,
            Value::Integer(_)
                | Value::Float(_)
                | Value::Bool(_)
                | Value::BuiltinFunction(_)
                | Value::Closure(_)
                | Value::Lambda(_)
                | Value::Unspecified
        )
    }

    /// Identity comparison used by `eq?`
    ///
    /// Atoms compare by value, non-empty lists by allocation and procedures by identity.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                (a.is_empty() && b.is_empty()) || Rc::ptr_eq(a, b)
            }
            (Value::BuiltinFunction(a), Value::BuiltinFunction(b)) => a.id == b.id,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Compare BuiltinFunctions by id, not function pointer
            (Value::BuiltinFunction(a), Value::BuiltinFunction(b)) => a.id == b.id,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::Unspecified, _) | (_, Value::Unspecified) => false,
            _ => false,
        }
    }
}
