//! Shape checks for special forms, shared by both evaluators.
//!
//! These only destructure unevaluated syntax; what the pieces mean is up to each
//! evaluator.

use crate::Error;
use crate::ast::{Value, sym};
use crate::builtinops::SpecialForm;

/// Binders of a `lambda`, in order
///
/// Symbols must be distinct. Any other value is kept as a literal binder; those only
/// show up once a substitution has rewritten a parameter name.
pub(crate) fn binders(params: &Value) -> Result<Vec<Value>, Error> {
    let Value::List(items) = params else {
        return Err(Error::TypeError(
            "Lambda parameters must be a list".to_owned(),
        ));
    };
    let mut seen: Vec<&str> = Vec::with_capacity(items.len());
    for item in items.iter() {
        if let Value::Symbol(name) = item {
            if seen.contains(&name.as_str()) {
                return Err(Error::EvalError(format!("Duplicate parameter name: {name}")));
            }
            seen.push(name);
        }
    }
    Ok(items.to_vec())
}

/// Parameter names of a `lambda`; must be a list of distinct symbols
pub(crate) fn parse_params(params: &Value) -> Result<Vec<String>, Error> {
    binders(params)?
        .into_iter()
        .map(|binder| match binder {
            Value::Symbol(name) => Ok(name),
            other => Err(Error::TypeError(format!(
                "Lambda parameters must be symbols, got {other}"
            ))),
        })
        .collect()
}

/// `(name param ...)` from `(define (name param ...) body ...)`
pub(crate) fn split_signature(signature: &[Value]) -> Result<(String, Vec<String>), Error> {
    match signature {
        [Value::Symbol(name), params @ ..] => {
            let params = parse_params(&Value::list(params.iter().cloned()))?;
            Ok((name.clone(), params))
        }
        _ => Err(Error::TypeError(
            "define requires a symbol or a (name params...) signature".to_owned(),
        )),
    }
}

/// A body of one or more expressions as a single expression
pub(crate) fn sequence_body(body: &[Value]) -> Value {
    match body {
        [single] => single.clone(),
        _ => begin_form(body),
    }
}

/// `(begin expr ...)`
pub(crate) fn begin_form(body: &[Value]) -> Value {
    Value::list(std::iter::once(sym(SpecialForm::Begin.keyword())).chain(body.iter().cloned()))
}

/// Binders and value expressions of `((binder expr) ...)`, binders unchecked
pub(crate) fn binding_pairs(bindings: &Value) -> Result<Vec<(Value, Value)>, Error> {
    let Value::List(items) = bindings else {
        return Err(Error::TypeError("let bindings must be a list".to_owned()));
    };
    items
        .iter()
        .map(|binding| match binding {
            Value::List(pair) => match &pair[..] {
                [binder, expr] => Ok((binder.clone(), expr.clone())),
                _ => Err(Error::TypeError(format!(
                    "let binding must be (name expr), got {binding}"
                ))),
            },
            _ => Err(Error::TypeError(format!(
                "let binding must be (name expr), got {binding}"
            ))),
        })
        .collect()
}

/// Names and value expressions of `((name expr) ...)`
pub(crate) fn let_bindings(bindings: &Value) -> Result<Vec<(String, Value)>, Error> {
    binding_pairs(bindings)?
        .into_iter()
        .map(|(binder, expr)| match binder {
            Value::Symbol(name) => Ok((name, expr)),
            other => Err(Error::TypeError(format!(
                "let binding name must be a symbol, got {other}"
            ))),
        })
        .collect()
}

/// Test and body of a `cond` clause
pub(crate) fn cond_clause(clause: &Value) -> Result<(&Value, &[Value]), Error> {
    match clause {
        Value::List(parts) => match &parts[..] {
            [test, body @ ..] => Ok((test, body)),
            [] => Err(Error::TypeError("cond clause cannot be empty".to_owned())),
        },
        _ => Err(Error::TypeError(format!(
            "cond clause must be a list, got {clause}"
        ))),
    }
}

/// The literal `else` in test position of a `cond` clause
pub(crate) fn is_else(test: &Value) -> bool {
    matches!(test, Value::Symbol(name) if name == "else")
}
