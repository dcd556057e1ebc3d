//! Substitution evaluator.
//!
//! There are no environment frames here. Top-level definitions live in a single
//! [`GlobalStore`], and calling a lambda rewrites its body with the argument values
//! (see [`rewrite`]) before evaluating it. The rewrite is purely syntactic, so an inner
//! binder that reuses a parameter name is rewritten as well. The rewritten binder is a
//! literal, and a later call replaces whatever in its body equals that literal:
//!
//! ```scheme
//! ((lambda (x) ((lambda (x) x) 3)) 2)         ; ((lambda (2) 2) 3) => 3
//! ((lambda (x) ((lambda (x) (+ x 2)) 5)) 2)   ; ((lambda (2) (+ 2 2)) 5) => 10
//! ```

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, instrument, trace};

use crate::ast::{Lambda, Value, sym};
use crate::builtinops::{Apply, SpecialForm, lookup_builtin};
use crate::evaluator::{Depth, EvalConfig};
use crate::{Error, forms};

/// The one mutable definition table of the substitution evaluator
///
/// Owned by the caller; nothing is ever removed except through [`GlobalStore::clear`].
#[derive(Debug, Default, Clone)]
pub struct GlobalStore {
    bindings: HashMap<String, Value>,
}

impl GlobalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every definition
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Overwrite an existing definition
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), Error> {
        match self.bindings.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::UnboundVariable(name.to_owned())),
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// All definitions sorted by name
    pub fn bindings(&self) -> Vec<(String, Value)> {
        let mut bindings: Vec<_> = self
            .bindings
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        bindings
    }
}

fn is_quote_form(items: &[Value]) -> bool {
    matches!(items.first(), Some(Value::Symbol(head)) if head == SpecialForm::Quote.keyword())
}

/// Replace every subtree of `tree` equal to `name` with `replacement`
///
/// `name` is normally a symbol, or a literal left behind by an earlier rewrite of a
/// binder. Returns a new tree; `tree` is left as it was. Other `(quote ...)` forms are
/// copied without looking inside them.
pub fn rewrite(tree: &Value, name: &Value, replacement: &Value) -> Value {
    if tree == name {
        return replacement.clone();
    }
    match tree {
        Value::List(items) if is_quote_form(items) => tree.clone(),
        Value::List(items) => Value::list(items.iter().map(|item| rewrite(item, name, replacement))),
        _ => tree.clone(),
    }
}

/// Syntax that evaluates back to `value`
///
/// Lists and symbols are wrapped in `quote`; everything else evaluates to itself.
pub fn as_literal(value: &Value) -> Value {
    match value {
        Value::List(_) | Value::Symbol(_) => {
            Value::list([sym(SpecialForm::Quote.keyword()), value.clone()])
        }
        _ => value.clone(),
    }
}

/// Evaluate an expression against the global store
pub fn eval(expr: &Value, store: &mut GlobalStore) -> Result<Value, Error> {
    eval_with_config(expr, store, &EvalConfig::default())
}

#[instrument(level = "debug", skip_all, fields(expr = %expr))]
pub fn eval_with_config(
    expr: &Value,
    store: &mut GlobalStore,
    config: &EvalConfig,
) -> Result<Value, Error> {
    eval_at(expr, store, Depth::new(config))
}

fn eval_at(expr: &Value, store: &mut GlobalStore, depth: Depth) -> Result<Value, Error> {
    if expr.is_self_evaluating() {
        return Ok(expr.clone());
    }
    depth.descend(|depth| match expr {
        Value::Symbol(name) => resolve(name, store),
        Value::List(items) => match &items[..] {
            [] => Err(Error::EvalError("Cannot evaluate empty list".to_owned())),
            [Value::Symbol(head), args @ ..] => match SpecialForm::from_symbol(head) {
                Some(form) => eval_special_form(form, args, store, depth),
                None => eval_application(items, store, depth),
            },
            _ => eval_application(items, store, depth),
        },
        _ => Err(Error::EvalError(format!("Cannot evaluate {expr}"))),
    })
}

/// Store first, then the builtin table
fn resolve(name: &str, store: &GlobalStore) -> Result<Value, Error> {
    store
        .get(name)
        .cloned()
        .or_else(|| lookup_builtin(name))
        .ok_or_else(|| Error::UnboundVariable(name.to_owned()))
}

fn eval_special_form(
    form: SpecialForm,
    args: &[Value],
    store: &mut GlobalStore,
    depth: Depth,
) -> Result<Value, Error> {
    match form {
        SpecialForm::Quote => match args {
            [datum] => Ok(datum.clone()),
            _ => Err(Error::arity_error(1, args.len())),
        },
        SpecialForm::Define => eval_define(args, store, depth),
        SpecialForm::Set => eval_set(args, store, depth),
        SpecialForm::If => eval_if(args, store, depth),
        SpecialForm::Cond => eval_cond(args, store, depth),
        SpecialForm::Begin => eval_sequence(args, store, depth),
        SpecialForm::Let => eval_let(args, store, depth),
        SpecialForm::Lambda => match args {
            [params, body] => Ok(make_lambda(forms::binders(params)?, body.clone())),
            _ => Err(Error::arity_error(2, args.len())),
        },
    }
}

fn make_lambda(params: Vec<Value>, body: Value) -> Value {
    Value::Lambda(Rc::new(Lambda { params, body }))
}

fn eval_define(args: &[Value], store: &mut GlobalStore, depth: Depth) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval_at(expr, store, depth)?;
            debug!(name = %name, "define global");
            store.define(name.clone(), value);
            Ok(Value::Unspecified)
        }
        [Value::List(signature), body @ ..] if !body.is_empty() => {
            let (name, params) = forms::split_signature(signature)?;
            debug!(name = %name, "define global procedure");
            let params = params.into_iter().map(Value::Symbol).collect();
            store.define(name, make_lambda(params, forms::sequence_body(body)));
            Ok(Value::Unspecified)
        }
        [_, _] => Err(Error::TypeError("define requires a symbol".to_owned())),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

fn eval_set(args: &[Value], store: &mut GlobalStore, depth: Depth) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval_at(expr, store, depth)?;
            if store.get(name).is_none() && lookup_builtin(name).is_some() {
                // A builtin name becomes a global the first time it is assigned
                store.define(name.clone(), value);
            } else {
                store.set(name, value)?;
            }
            debug!(name = %name, "set! global");
            Ok(Value::Unspecified)
        }
        [_, _] => Err(Error::TypeError("set! requires a symbol".to_owned())),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

fn eval_if(args: &[Value], store: &mut GlobalStore, depth: Depth) -> Result<Value, Error> {
    match args {
        [test, consequent, rest @ ..] if rest.len() <= 1 => {
            if eval_at(test, store, depth)?.is_truthy() {
                eval_at(consequent, store, depth)
            } else {
                match rest {
                    [alternative] => eval_at(alternative, store, depth),
                    _ => Ok(Value::Unspecified),
                }
            }
        }
        _ => Err(Error::arity_error(3, args.len())),
    }
}

fn eval_cond(clauses: &[Value], store: &mut GlobalStore, depth: Depth) -> Result<Value, Error> {
    for clause in clauses {
        let (test, body) = forms::cond_clause(clause)?;
        let outcome = if forms::is_else(test) {
            Value::Bool(true)
        } else {
            eval_at(test, store, depth)?
        };
        if outcome.is_truthy() {
            return if body.is_empty() {
                Ok(outcome)
            } else {
                eval_sequence(body, store, depth)
            };
        }
    }
    Ok(Value::Unspecified)
}

fn eval_sequence(body: &[Value], store: &mut GlobalStore, depth: Depth) -> Result<Value, Error> {
    let Some((last, init)) = body.split_last() else {
        return Err(Error::EvalError(
            "begin requires at least one expression".to_owned(),
        ));
    };
    for expr in init {
        eval_at(expr, store, depth)?;
    }
    eval_at(last, store, depth)
}

/// Bindings are substituted unevaluated, one after another, into each body expression
fn eval_let(args: &[Value], store: &mut GlobalStore, depth: Depth) -> Result<Value, Error> {
    let [bindings, body @ ..] = args else {
        return Err(Error::arity_error(2, args.len()));
    };
    if body.is_empty() {
        return Err(Error::EvalError("let requires a body".to_owned()));
    }
    let bindings = forms::binding_pairs(bindings)?;
    let body: Vec<Value> = body
        .iter()
        .map(|expr| {
            bindings
                .iter()
                .fold(expr.clone(), |tree, (name, value)| rewrite(&tree, name, value))
        })
        .collect();
    eval_sequence(&body, store, depth)
}

fn eval_application(items: &[Value], store: &mut GlobalStore, depth: Depth) -> Result<Value, Error> {
    let [func_expr, arg_exprs @ ..] = items else {
        return Err(Error::EvalError("Cannot apply empty list".to_owned()));
    };
    let func = eval_at(func_expr, store, depth)?;
    let args = arg_exprs
        .iter()
        .map(|arg| eval_at(arg, store, depth))
        .collect::<Result<Vec<_>, _>>()?;
    apply_procedure(&func, &args, store, depth)
}

fn apply_procedure(
    func: &Value,
    args: &[Value],
    store: &mut GlobalStore,
    depth: Depth,
) -> Result<Value, Error> {
    match func {
        Value::BuiltinFunction(op) => {
            trace!(procedure = op.id, argc = args.len(), "apply builtin");
            op.call(args, &mut SubstApplier { store, depth })
        }
        Value::Lambda(lambda) => {
            if lambda.params.len() != args.len() {
                return Err(Error::arity_error(lambda.params.len(), args.len()));
            }
            let body = lambda
                .params
                .iter()
                .zip(args)
                .fold(lambda.body.clone(), |tree, (param, arg)| {
                    rewrite(&tree, param, &as_literal(arg))
                });
            trace!(params = ?lambda.params, body = %body, "apply lambda");
            eval_at(&body, store, depth)
        }
        _ => Err(Error::TypeError(format!(
            "Cannot apply non-function: {func}"
        ))),
    }
}

/// Lets higher-order builtins call lambdas by substitution
struct SubstApplier<'s> {
    store: &'s mut GlobalStore,
    depth: Depth,
}

impl Apply for SubstApplier<'_> {
    fn apply(&mut self, procedure: &Value, args: &[Value]) -> Result<Value, Error> {
        apply_procedure(procedure, args, self.store, self.depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{nil, val};
    use crate::parser::parse;

    fn eval_str(input: &str, store: &mut GlobalStore) -> Result<Value, Error> {
        eval(&parse(input)?, store)
    }

    fn eval_fresh(input: &str) -> Result<Value, Error> {
        eval_str(input, &mut GlobalStore::new())
    }

    #[test]
    fn test_store_operations() {
        let mut store = GlobalStore::new();
        assert!(store.is_empty());
        store.define("b", val(2));
        store.define("a", val(1));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a"), Some(&val(1)));
        store.set("a", val(10)).unwrap();
        assert_eq!(store.get("a"), Some(&val(10)));
        assert_eq!(
            store.set("missing", val(0)),
            Err(Error::UnboundVariable("missing".to_owned()))
        );
        assert_eq!(
            store.bindings().into_iter().map(|(name, _)| name).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_rewrite() {
        let tree = parse("(+ x (* x y))").unwrap();
        assert_eq!(rewrite(&tree, &sym("x"), &val(3)), parse("(+ 3 (* 3 y))").unwrap());
        // The input tree is untouched
        assert_eq!(tree, parse("(+ x (* x y))").unwrap());
        assert_eq!(rewrite(&sym("x"), &sym("x"), &val(1)), val(1));
        assert_eq!(rewrite(&sym("y"), &sym("x"), &val(1)), sym("y"));
        assert_eq!(rewrite(&val(5), &sym("x"), &val(1)), val(5));
    }

    #[test]
    fn test_rewrite_skips_quoted_data() {
        let tree = parse("(list x (quote x) (quote (x y)))").unwrap();
        assert_eq!(
            rewrite(&tree, &sym("x"), &val(1)),
            parse("(list 1 (quote x) (quote (x y)))").unwrap()
        );
    }

    #[test]
    fn test_rewrite_reaches_binders() {
        let tree = parse("(lambda (x) x)").unwrap();
        assert_eq!(rewrite(&tree, &sym("x"), &val(2)), parse("(lambda (2) 2)").unwrap());
    }

    #[test]
    fn test_rewrite_matches_literal_binders() {
        let tree = parse("(+ 2 (quote (1 2)) (quote a))").unwrap();
        assert_eq!(rewrite(&tree, &val(2), &val(5)), parse("(+ 5 (quote (1 2)) (quote a))").unwrap());
        let quoted = parse("(quote a)").unwrap();
        assert_eq!(rewrite(&tree, &quoted, &val(0)), parse("(+ 2 (quote (1 2)) 0)").unwrap());
    }

    #[test]
    fn test_as_literal() {
        assert_eq!(as_literal(&val(3)), val(3));
        assert_eq!(as_literal(&val(true)), val(true));
        assert_eq!(as_literal(&val([1, 2])), parse("(quote (1 2))").unwrap());
        assert_eq!(as_literal(&sym("a")), parse("(quote a)").unwrap());
    }

    #[test]
    fn test_basics() {
        assert_eq!(eval_fresh("42").unwrap(), val(42));
        assert_eq!(eval_fresh("#f").unwrap(), val(false));
        assert_eq!(eval_fresh("(+ 1 2 3)").unwrap(), val(6));
        assert_eq!(eval_fresh("(car (list 1 2 3))").unwrap(), val(1));
        assert_eq!(eval_fresh("(let ((x 5)) (* x x))").unwrap(), val(25));
        assert_eq!(eval_fresh("(if #f 1 2)").unwrap(), val(2));
        assert_eq!(eval_fresh("(cond ((> 1 2) 1) (else 3))").unwrap(), val(3));
        assert!(matches!(eval_fresh("(cond (#f 1))").unwrap(), Value::Unspecified));
        assert!(matches!(eval_fresh("()"), Err(Error::EvalError(_))));
        assert_eq!(eval_fresh("nope"), Err(Error::UnboundVariable("nope".to_owned())));
    }

    #[test]
    fn test_define_and_set() {
        let mut store = GlobalStore::new();
        assert!(matches!(eval_str("(define x 1)", &mut store).unwrap(), Value::Unspecified));
        assert_eq!(store.get("x"), Some(&val(1)));
        eval_str("(set! x (+ x 1))", &mut store).unwrap();
        assert_eq!(eval_str("x", &mut store).unwrap(), val(2));
        assert_eq!(
            eval_str("(set! y 1)", &mut store),
            Err(Error::UnboundVariable("y".to_owned()))
        );
        assert_eq!(store.get("y"), None);
    }

    #[test]
    fn test_store_shadows_builtins() {
        let mut store = GlobalStore::new();
        eval_str("(define car 7)", &mut store).unwrap();
        assert_eq!(eval_str("car", &mut store).unwrap(), val(7));
        store.clear();
        assert!(matches!(eval_str("car", &mut store).unwrap(), Value::BuiltinFunction(_)));
    }

    #[test]
    fn test_lambda_application() {
        let mut store = GlobalStore::new();
        eval_str("(define square (lambda (x) (* x x)))", &mut store).unwrap();
        assert_eq!(eval_str("(square 5)", &mut store).unwrap(), val(25));
        eval_str("(define (fact n) (if (= n 1) 1 (* n (fact (- n 1)))))", &mut store).unwrap();
        assert_eq!(eval_str("(fact 6)", &mut store).unwrap(), val(720));
        eval_str("(define make-adder (lambda (n) (lambda (x) (+ x n))))", &mut store).unwrap();
        assert_eq!(eval_str("((make-adder 5) 3)", &mut store).unwrap(), val(8));
        assert_eq!(
            eval_str("((lambda (a b) a) 1)", &mut store),
            Err(Error::arity_error(2, 1))
        );
    }

    #[test]
    fn test_list_arguments_stay_literal() {
        assert_eq!(eval_fresh("((lambda (l) (car l)) (list 1 2))").unwrap(), val(1));
        assert_eq!(eval_fresh("((lambda (s) s) (quote abc))").unwrap(), sym("abc"));
        assert_eq!(eval_fresh("((lambda (l) (null? l)) (list))").unwrap(), val(true));
        assert_eq!(eval_fresh("((lambda (l) l) (list))").unwrap(), nil());
    }

    #[test]
    fn test_let_is_sequential_substitution() {
        let mut store = GlobalStore::new();
        eval_str("(define x 10)", &mut store).unwrap();
        // y is replaced by the text `x` after x was already substituted
        assert_eq!(eval_str("(let ((x 1) (y x)) y)", &mut store).unwrap(), val(10));
        // Binding expressions are copied, not evaluated once
        assert_eq!(eval_str("(let ((a (+ 1 2))) (* a a))", &mut store).unwrap(), val(9));
        assert_eq!(eval_str("(let () 4)", &mut store).unwrap(), val(4));
    }

    #[test]
    fn test_nested_shadowing_is_captured() {
        // The inner binder becomes the literal 2 and is then matched by equality
        assert_eq!(eval_fresh("((lambda (x) ((lambda (x) x) 3)) 2)").unwrap(), val(3));
        assert_eq!(eval_fresh("(let ((x 1)) (let ((x 2)) x))").unwrap(), val(2));
        // Every 2 in the inner body is captured, including the one that was a constant
        assert_eq!(
            eval_fresh("((lambda (x) ((lambda (x) (+ x 2)) 5)) 2)").unwrap(),
            val(10)
        );
        assert!(matches!(
            eval_fresh("((lambda (x) (lambda (x) x)) 2)").unwrap(),
            Value::Lambda(_)
        ));
        assert!(matches!(eval_fresh("(lambda (x x) x)"), Err(Error::EvalError(_))));
    }

    #[test]
    fn test_set_builtin_name() {
        let mut store = GlobalStore::new();
        assert!(matches!(eval_str("(set! car 1)", &mut store).unwrap(), Value::Unspecified));
        assert_eq!(eval_str("car", &mut store).unwrap(), val(1));
        eval_str("(set! car 2)", &mut store).unwrap();
        assert_eq!(store.get("car"), Some(&val(2)));
    }

    #[test]
    fn test_let_without_arguments() {
        assert_eq!(eval_fresh("(let)"), Err(Error::arity_error(2, 0)));
    }

    #[test]
    fn test_map_applies_lambdas() {
        assert_eq!(
            eval_fresh("(map (lambda (x) (* x 10)) (list 1 2 3))").unwrap(),
            val([10, 20, 30])
        );
    }

    #[test]
    fn test_depth_limit() {
        let mut store = GlobalStore::new();
        eval_str("(define (loop n) (+ 1 (loop n)))", &mut store).unwrap();
        let config = EvalConfig { max_depth: 100 };
        assert!(matches!(
            eval_with_config(&parse("(loop 1)").unwrap(), &mut store, &config),
            Err(Error::EvalError(_))
        ));
    }

    #[test]
    fn test_default_depth_limit_on_test_thread() {
        let mut store = GlobalStore::new();
        eval_str("(define (loop n) (+ 1 (loop n)))", &mut store).unwrap();
        match eval_str("(loop 0)", &mut store) {
            Err(Error::EvalError(msg)) => {
                assert!(msg.contains(&format!("(max: {})", crate::MAX_EVAL_DEPTH)))
            }
            other => panic!("expected depth error, got {other:?}"),
        }
    }
}
