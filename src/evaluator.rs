use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, instrument, trace};

use crate::ast::{Closure, Value, sym};
use crate::builtinops::{Apply, SpecialForm, builtin_bindings};
use crate::{Error, MAX_EVAL_DEPTH, forms};

/// Remaining native stack below which evaluation moves to a fresh segment
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each fresh stack segment
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Evaluation settings shared by both evaluators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalConfig {
    /// Deepest nesting of evaluations before failing with an `EvalError`
    pub max_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// Current evaluation nesting, threaded through every recursive call
#[derive(Debug, Clone, Copy)]
pub(crate) struct Depth {
    current: usize,
    limit: usize,
}

impl Depth {
    pub(crate) fn new(config: &EvalConfig) -> Self {
        Depth {
            current: 0,
            limit: config.max_depth,
        }
    }

    /// Run `eval` one level deeper, on a grown native stack if the current one runs low
    pub(crate) fn descend<T>(self, eval: impl FnOnce(Depth) -> Result<T, Error>) -> Result<T, Error> {
        let depth = self.deeper()?;
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || eval(depth))
    }

    fn deeper(self) -> Result<Depth, Error> {
        if self.current >= self.limit {
            return Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {})",
                self.limit
            )));
        }
        Ok(Depth {
            current: self.current + 1,
            ..self
        })
    }
}

struct Frame {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Environment>,
}

/// Chain of binding frames, innermost first
///
/// Cloning an `Environment` clones the handle, not the frames: closures that capture an
/// environment observe later `define`s and `set!`s made through any other handle to the
/// same frames.
#[derive(Clone)]
pub struct Environment {
    frame: Rc<Frame>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// A chain with a single empty frame
    pub fn new() -> Self {
        Environment {
            frame: Rc::new(Frame {
                bindings: RefCell::new(HashMap::new()),
                parent: None,
            }),
        }
    }

    /// A new chain with one fresh frame in front of this one
    pub fn extend(&self) -> Environment {
        Environment {
            frame: Rc::new(Frame {
                bindings: RefCell::new(HashMap::new()),
                parent: Some(self.clone()),
            }),
        }
    }

    fn frames(&self) -> impl Iterator<Item = &Frame> {
        std::iter::successors(Some(&*self.frame), |frame| {
            frame.parent.as_ref().map(|env| &*env.frame)
        })
    }

    /// Bind in the innermost frame, replacing any binding of the same name there
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.frame.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Innermost binding of `name`
    pub fn get(&self, name: &str) -> Option<Value> {
        self.frames()
            .find_map(|frame| frame.bindings.borrow().get(name).cloned())
    }

    /// Overwrite the innermost existing binding of `name`
    pub fn set(&self, name: &str, value: Value) -> Result<(), Error> {
        for frame in self.frames() {
            if let Some(slot) = frame.bindings.borrow_mut().get_mut(name) {
                *slot = value;
                return Ok(());
            }
        }
        Err(Error::UnboundVariable(name.to_owned()))
    }

    /// Number of frames in the chain
    pub fn depth(&self) -> usize {
        self.frames().count()
    }

    /// Bindings of the innermost frame, sorted by name
    pub fn local_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings: Vec<_> = self
            .frame
            .bindings
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        bindings
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.frame, &other.frame)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Frames can hold closures that point back at them; print the shape only
        write!(
            f,
            "Environment(frames={}, local={})",
            self.depth(),
            self.frame.bindings.borrow().len()
        )
    }
}

/// Create the top-level environment: a builtins frame with an empty user frame on top
pub fn create_global_env() -> Environment {
    let builtins = Environment::new();
    for (name, value) in builtin_bindings() {
        builtins.define(name, value);
    }
    builtins.extend()
}

/// Evaluate an expression in the given environment
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    eval_with_config(expr, env, &EvalConfig::default())
}

#[instrument(level = "debug", skip_all, fields(expr = %expr))]
pub fn eval_with_config(
    expr: &Value,
    env: &Environment,
    config: &EvalConfig,
) -> Result<Value, Error> {
    eval_at(expr, env, Depth::new(config))
}

/// Call a procedure value with already evaluated arguments
pub fn apply(procedure: &Value, args: &[Value]) -> Result<Value, Error> {
    apply_procedure(procedure, args, Depth::new(&EvalConfig::default()))
}

fn eval_at(expr: &Value, env: &Environment, depth: Depth) -> Result<Value, Error> {
    if expr.is_self_evaluating() {
        return Ok(expr.clone());
    }
    depth.descend(|depth| match expr {
        Value::Symbol(name) => env
            .get(name)
            .ok_or_else(|| Error::UnboundVariable(name.clone())),
        Value::List(elements) => eval_list(elements, env, depth),
        _ => Err(Error::EvalError(format!("Cannot evaluate {expr}"))),
    })
}

/// Attach the innermost failing expression to evaluation and type errors
fn add_context(error: Error, expr: &Value) -> Error {
    match error {
        Error::EvalError(msg) if !msg.contains("\n  Context:") => {
            Error::EvalError(format!("{msg}\n  Context: while evaluating {expr}"))
        }
        Error::TypeError(msg) if !msg.contains("\n  Context:") => {
            Error::TypeError(format!("{msg}\n  Context: while evaluating {expr}"))
        }
        _ => error,
    }
}

fn eval_list(elements: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    match elements {
        [] => Err(Error::EvalError(
            "Cannot evaluate empty list".to_owned(),
        )),
        [Value::Symbol(name), args @ ..] => match SpecialForm::from_symbol(name) {
            Some(form) => eval_special_form(form, args, env, depth),
            None => eval_application(elements, env, depth),
        },
        _ => eval_application(elements, env, depth),
    }
}

fn eval_special_form(
    form: SpecialForm,
    args: &[Value],
    env: &Environment,
    depth: Depth,
) -> Result<Value, Error> {
    match form {
        SpecialForm::Quote => eval_quote(args),
        SpecialForm::Define => eval_define(args, env, depth),
        SpecialForm::Set => eval_set(args, env, depth),
        SpecialForm::If => eval_if(args, env, depth),
        SpecialForm::Cond => eval_cond(args, env, depth),
        SpecialForm::Begin => eval_sequence(args, env, depth),
        SpecialForm::Let => eval_let(args, env, depth),
        SpecialForm::Lambda => eval_lambda(args, env),
    }
}

fn eval_quote(args: &[Value]) -> Result<Value, Error> {
    match args {
        [datum] => Ok(datum.clone()),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn eval_define(args: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval_at(expr, env, depth)?;
            debug!(name = %name, frames = env.depth(), "define");
            env.define(name.clone(), value);
            Ok(Value::Unspecified)
        }
        [Value::List(signature), body @ ..] if !body.is_empty() => {
            let (name, params) = forms::split_signature(signature)?;
            let closure = make_closure(params, forms::sequence_body(body), env);
            debug!(name = %name, frames = env.depth(), "define procedure");
            env.define(name, closure);
            Ok(Value::Unspecified)
        }
        [_, _] => Err(Error::TypeError(
            "define requires a symbol".to_owned(),
        )),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

fn eval_set(args: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval_at(expr, env, depth)?;
            env.set(name, value)?;
            debug!(name = %name, "set!");
            Ok(Value::Unspecified)
        }
        [_, _] => Err(Error::TypeError("set! requires a symbol".to_owned())),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// `(if test consequent [alternative])`; only the selected branch is evaluated
fn eval_if(args: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    match args {
        [test, consequent, rest @ ..] if rest.len() <= 1 => {
            if eval_at(test, env, depth)?.is_truthy() {
                eval_at(consequent, env, depth)
            } else {
                match rest {
                    [alternative] => eval_at(alternative, env, depth),
                    _ => Ok(Value::Unspecified),
                }
            }
        }
        _ => Err(Error::arity_error(3, args.len())),
    }
}

fn eval_cond(clauses: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    for clause in clauses {
        let (test, body) = forms::cond_clause(clause)?;
        let outcome = if forms::is_else(test) {
            Value::Bool(true)
        } else {
            eval_at(test, env, depth)?
        };
        if outcome.is_truthy() {
            return if body.is_empty() {
                Ok(outcome)
            } else {
                eval_sequence(body, env, depth)
            };
        }
    }
    Ok(Value::Unspecified)
}

/// `begin`: evaluate in order, value of the last expression
fn eval_sequence(body: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    let Some((last, init)) = body.split_last() else {
        return Err(Error::EvalError(
            "begin requires at least one expression".to_owned(),
        ));
    };
    for expr in init {
        eval_at(expr, env, depth)?;
    }
    eval_at(last, env, depth)
}

/// `(let ((name expr) ...) body ...)` as `((lambda (name ...) (begin body ...)) expr ...)`
fn eval_let(args: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    let [bindings, body @ ..] = args else {
        return Err(Error::arity_error(2, args.len()));
    };
    if body.is_empty() {
        return Err(Error::EvalError("let requires a body".to_owned()));
    }
    let bindings = forms::let_bindings(bindings)?;
    let lambda = Value::list([
        sym(SpecialForm::Lambda.keyword()),
        Value::list(bindings.iter().map(|(name, _)| sym(name))),
        forms::begin_form(body),
    ]);
    let application =
        Value::list(std::iter::once(lambda).chain(bindings.into_iter().map(|(_, expr)| expr)));
    eval_at(&application, env, depth)
}

fn eval_lambda(args: &[Value], env: &Environment) -> Result<Value, Error> {
    match args {
        [params, body] => Ok(make_closure(forms::parse_params(params)?, body.clone(), env)),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

fn make_closure(params: Vec<String>, body: Value, env: &Environment) -> Value {
    Value::Closure(Rc::new(Closure {
        params,
        body,
        env: env.clone(),
    }))
}

/// Applicative order: operator first, then every operand left to right
fn eval_application(elements: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    let [func_expr, arg_exprs @ ..] = elements else {
        return Err(Error::EvalError("Cannot apply empty list".to_owned()));
    };
    let func = eval_at(func_expr, env, depth)?;
    let args = arg_exprs
        .iter()
        .map(|arg| eval_at(arg, env, depth))
        .collect::<Result<Vec<_>, _>>()?;
    apply_procedure(&func, &args, depth)
}

fn apply_procedure(func: &Value, args: &[Value], depth: Depth) -> Result<Value, Error> {
    match func {
        Value::BuiltinFunction(op) => {
            trace!(procedure = op.id, argc = args.len(), "apply builtin");
            op.call(args, &mut ChainApplier { depth })
        }
        Value::Closure(closure) => {
            if closure.params.len() != args.len() {
                return Err(Error::arity_error(closure.params.len(), args.len()));
            }
            let call_env = closure.env.extend();
            for (param, arg) in closure.params.iter().zip(args) {
                call_env.define(param.clone(), arg.clone());
            }
            trace!(params = ?closure.params, frames = call_env.depth(), "apply closure");
            eval_at(&closure.body, &call_env, depth).map_err(|err| add_context(err, &closure.body))
        }
        _ => Err(Error::TypeError(format!(
            "Cannot apply non-function: {func}"
        ))),
    }
}

/// Lets higher-order builtins call closures with environment-chain semantics
struct ChainApplier {
    depth: Depth,
}

impl Apply for ChainApplier {
    fn apply(&mut self, procedure: &Value, args: &[Value]) -> Result<Value, Error> {
        apply_procedure(procedure, args, self.depth)
    }
}
