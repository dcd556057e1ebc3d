use schemelet::ast::{nil, sym, val};
use schemelet::{Environment, Error, Value, evaluator, parser};

/// Helper function to parse and evaluate a string expression
fn eval_string(input: &str, env: &Environment) -> Result<Value, Error> {
    let expr = parser::parse(input)?;
    evaluator::eval(&expr, env)
}

/// Helper function to parse and evaluate with fresh environment
fn eval_fresh(input: &str) -> Result<Value, Error> {
    let env = evaluator::create_global_env();
    eval_string(input, &env)
}

/// Evaluate several lines in one environment and return the last value
fn eval_program(lines: &[&str]) -> Result<Value, Error> {
    let env = evaluator::create_global_env();
    let mut last = Value::Unspecified;
    for line in lines {
        last = eval_string(line, &env)?;
    }
    Ok(last)
}

#[test]
fn test_basic_arithmetic() {
    assert_eq!(eval_fresh("(+ 1 2 3)").unwrap(), val(6));
    assert_eq!(eval_fresh("(- 5 2)").unwrap(), val(3));
    assert_eq!(eval_fresh("(* 2 3)").unwrap(), val(6));
    assert_eq!(eval_fresh("(/ 10 4)").unwrap(), val(2.5));
    assert_eq!(eval_fresh("(/ 10 5)").unwrap(), val(2));

    // Binary operators reject other counts
    assert_eq!(eval_fresh("(- 10 3 2)"), Err(Error::arity_error(2, 3)));
    assert_eq!(eval_fresh("(- 5)"), Err(Error::arity_error(2, 1)));
}

#[test]
fn test_nested_arithmetic() {
    assert_eq!(eval_fresh("(+ (* 2 3) (- 8 2))").unwrap(), val(12));
    assert_eq!(eval_fresh("(* (+ 1 2) (- 5 2))").unwrap(), val(9));
    assert_eq!(eval_fresh("(max (abs -3) (min 7 2) 1)").unwrap(), val(3));
}

#[test]
fn test_comparisons() {
    assert_eq!(eval_fresh("(= 5 5)").unwrap(), val(true));
    assert_eq!(eval_fresh("(= 5 6)").unwrap(), val(false));
    assert_eq!(eval_fresh("(< 3 5)").unwrap(), val(true));
    assert_eq!(eval_fresh("(> 3 5)").unwrap(), val(false));
    assert_eq!(eval_fresh("(<= 5 5)").unwrap(), val(true));
    assert_eq!(eval_fresh("(>= 3 5)").unwrap(), val(false));
    assert_eq!(eval_fresh("(< 1 1.5)").unwrap(), val(true));
}

#[test]
fn test_list_operations() {
    assert_eq!(eval_fresh("(list 1 2 3)").unwrap(), val([1, 2, 3]));
    assert_eq!(eval_fresh("(car (list 1 2 3))").unwrap(), val(1));
    assert_eq!(eval_fresh("(cdr (list 1 2 3))").unwrap(), val([2, 3]));
    assert_eq!(eval_fresh("(cons 0 (list 1 2))").unwrap(), val([0, 1, 2]));
    assert_eq!(eval_fresh("(append (list 1) (list 2 3))").unwrap(), val([1, 2, 3]));
    assert_eq!(eval_fresh("(length (list 1 2 3))").unwrap(), val(3));
    assert_eq!(eval_fresh("(null? (quote ()))").unwrap(), val(true));
    assert_eq!(eval_fresh("(null? (list 1))").unwrap(), val(false));
    assert_eq!(eval_fresh("(list? (list))").unwrap(), val(true));
}

#[test]
fn test_equality() {
    assert_eq!(eval_fresh("(equal? (list 1 2) (list 1 2))").unwrap(), val(true));
    assert_eq!(eval_fresh("(eq? (list 1 2) (list 1 2))").unwrap(), val(false));
    assert_eq!(eval_fresh("(eq? (quote a) (quote a))").unwrap(), val(true));
    assert_eq!(eval_fresh("(eq? car car)").unwrap(), val(true));
    assert_eq!(
        eval_program(&["(define l (list 1 2))", "(eq? l l)"]).unwrap(),
        val(true)
    );
}

#[test]
fn test_quote() {
    assert_eq!(eval_fresh("(quote hello)").unwrap(), sym("hello"));
    assert_eq!(eval_fresh("(quote (1 2 3))").unwrap(), val([1, 2, 3]));
    assert_eq!(
        eval_fresh("(quote (+ 1 2))").unwrap(),
        val(vec![sym("+"), val(1), val(2)])
    );
    assert_eq!(eval_fresh("(quote ())").unwrap(), nil());

    // Empty list is not self-evaluating
    assert!(matches!(eval_fresh("()"), Err(Error::EvalError(_))));
}

#[test]
fn test_define_and_variables() {
    let env = evaluator::create_global_env();

    eval_string("(define x 42)", &env).unwrap();
    assert_eq!(eval_string("x", &env).unwrap(), val(42));
    assert_eq!(eval_string("(+ x 8)", &env).unwrap(), val(50));

    // Redefine variable
    eval_string("(define x 100)", &env).unwrap();
    assert_eq!(eval_string("x", &env).unwrap(), val(100));
}

#[test]
fn test_if_expressions() {
    assert_eq!(eval_fresh("(if #t 1 2)").unwrap(), val(1));
    assert_eq!(eval_fresh("(if #f 1 2)").unwrap(), val(2));
    assert_eq!(eval_fresh("(if (> 5 3) (+ 1 1) undefined)").unwrap(), val(2));
    // Only #f is false
    assert_eq!(eval_fresh("(if 0 1 2)").unwrap(), val(1));
    assert!(matches!(eval_fresh("(if #f 1)").unwrap(), Value::Unspecified));
}

#[test]
fn test_cond_expressions() {
    assert_eq!(eval_fresh("(cond ((> 1 2) 1) ((< 1 2) 2))").unwrap(), val(2));
    assert_eq!(eval_fresh("(cond (#f 1) (else 3))").unwrap(), val(3));
    assert!(matches!(eval_fresh("(cond (#f 1))").unwrap(), Value::Unspecified));
}

#[test]
fn test_let_squares() {
    assert_eq!(eval_fresh("(let ((x 5)) (* x x))").unwrap(), val(25));
}

#[test]
fn test_lambda_and_application() {
    assert_eq!(eval_fresh("((lambda (x) (* x x)) 5)").unwrap(), val(25));
    assert_eq!(
        eval_program(&[
            "(define square (lambda (x) (* x x)))",
            "(square 5)",
        ])
        .unwrap(),
        val(25)
    );
    assert_eq!(eval_fresh("((lambda (a b) a) 1)"), Err(Error::arity_error(2, 1)));
    assert!(matches!(eval_fresh("(5 1)"), Err(Error::TypeError(_))));
}

#[test]
fn test_recursion() {
    let program = [
        "(define fact (lambda (n) (if (= n 1) 1 (* n (fact (- n 1))))))",
        "(fact 10)",
    ];
    assert_eq!(eval_program(&program).unwrap(), val(3628800));

    let fib = [
        "(define (fib n) (cond ((< n 2) n) (else (+ (fib (- n 1)) (fib (- n 2))))))",
        "(fib 15)",
    ];
    assert_eq!(eval_program(&fib).unwrap(), val(610));
}

#[test]
fn test_shadowing_leaves_outer_binding() {
    let env = evaluator::create_global_env();
    eval_string("(define x 1)", &env).unwrap();
    assert_eq!(eval_string("((lambda (x) x) 2)", &env).unwrap(), val(2));
    assert_eq!(eval_string("x", &env).unwrap(), val(1));
    assert_eq!(
        eval_string("((lambda (x) ((lambda (x) x) 3)) 2)", &env).unwrap(),
        val(3)
    );
}

#[test]
fn test_set_visible_through_closures() {
    let env = evaluator::create_global_env();
    assert_eq!(
        eval_string("(set! total 1)", &env),
        Err(Error::UnboundVariable("total".to_owned()))
    );

    eval_string("(define total 1)", &env).unwrap();
    eval_string("(define get-total (lambda () total))", &env).unwrap();
    eval_string("(define bump! (lambda () (set! total (+ total 1))))", &env).unwrap();
    eval_string("(bump!)", &env).unwrap();
    eval_string("(bump!)", &env).unwrap();
    assert_eq!(eval_string("(get-total)", &env).unwrap(), val(3));
    assert_eq!(eval_string("total", &env).unwrap(), val(3));
}

#[test]
fn test_higher_order_functions() {
    assert_eq!(
        eval_program(&[
            "(define compose (lambda (f g) (lambda (x) (f (g x)))))",
            "(define inc (lambda (x) (+ x 1)))",
            "((compose inc inc) 5)",
        ])
        .unwrap(),
        val(7)
    );
    assert_eq!(
        eval_fresh("(map (lambda (x) (* x 2)) (list 1 2 3))").unwrap(),
        val([2, 4, 6])
    );
    assert_eq!(eval_fresh("(procedure? (lambda (x) x))").unwrap(), val(true));
}

#[test]
fn test_error_conditions() {
    assert!(matches!(eval_fresh("undefined-var"), Err(Error::UnboundVariable(_))));
    assert!(matches!(eval_fresh("(car 5)"), Err(Error::TypeError(_))));
    assert!(matches!(eval_fresh("(car (list))"), Err(Error::EvalError(_))));
    assert!(matches!(eval_fresh("(/ 1 0)"), Err(Error::EvalError(_))));
    assert!(matches!(eval_fresh("(+ 1 (quote a))"), Err(Error::TypeError(_))));
    assert!(matches!(eval_fresh("(begin)"), Err(Error::EvalError(_))));
    assert!(matches!(eval_fresh("(+ 1 2"), Err(Error::ParseError(_))));
}

#[test]
fn test_printed_results_read_back() {
    for input in ["(quote (1 (2.5 x) ()))", "(list 1 2 3)", "-7", "(quote set!)"] {
        let value = eval_fresh(input).unwrap();
        assert_eq!(parser::parse(&value.to_string()).unwrap(), value, "{input}");
    }
}
