//! A sandboxed, AST-walking interpreter for a Python-like scripting subset.
//!
//! [`evaluate`] is the entry point: it parses a source string with
//! `ruff_python_parser`, dispatches the resulting module body against an
//! [`EvalOptions`]-supplied environment, and returns either the last
//! top-level expression's value or a classified [`EvalError`].

mod builtins;
mod class;
mod dispatch;
mod environment;
mod error;
mod expressions;
mod function;
mod io;
mod methods;
mod sandbox;
mod session;
mod signal;
mod statements;
mod value;

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use ruff_python_ast::Stmt;

pub use crate::{
    class::{Instance, UserClass},
    error::{CaptiveError, ErrorKind},
    function::UserFunction,
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    sandbox::ModuleObject,
    session::Session,
    signal::Flow,
    value::{Dict, GeneratorState, HostFn, Key, Value},
};

use crate::{dispatch::exec_block, environment::Env};

/// Per-call configuration (`spec.md` §6): the Rust shape of the host
/// language's keyword-argument `evaluate(...)` signature.
pub struct EvalOptions<'a> {
    /// Host-language callables made available as bound names, alongside the
    /// default builtins (`spec.md` §3 "host-language callable").
    pub callables: HashMap<String, Value>,
    /// The module-level variable namespace, shared by identity with the
    /// caller across calls (`spec.md` §5).
    pub variables: Rc<RefCell<HashMap<String, Value>>>,
    /// Dotted import paths the sandbox should allow (`spec.md` §4.6).
    pub authorized_imports: Vec<String>,
    /// Pre-built `Value::Module` objects, keyed by the dotted path a script
    /// would `import` (`spec.md` §1 "runtime library... out of scope").
    pub modules: HashMap<String, Value>,
    /// Sink for `print()` output (`spec.md` §6).
    pub stdout: &'a mut dyn PrintWriter,
    /// Upper bound on `while`/`for` loop iterations before
    /// `ErrorKind::IterationLimitExceeded` (`spec.md` §5).
    pub max_while_iterations: u64,
}

pub const DEFAULT_MAX_WHILE_ITERATIONS: u64 = 1_000_000;

impl<'a> EvalOptions<'a> {
    pub fn new(stdout: &'a mut dyn PrintWriter) -> Self {
        Self {
            callables: HashMap::new(),
            variables: Rc::new(RefCell::new(HashMap::new())),
            authorized_imports: Vec::new(),
            modules: HashMap::new(),
            stdout,
            max_while_iterations: DEFAULT_MAX_WHILE_ITERATIONS,
        }
    }
}

/// The outcome of a failed [`evaluate`] call.
///
/// `Interpreter` is every failure the dispatcher itself classifies;
/// `Client` is a caller-supplied callable's own error, escaping unwrapped
/// rather than being coerced into an interpreter error kind (`spec.md` §7).
#[derive(Debug)]
pub enum EvalError {
    Interpreter(CaptiveError),
    Client(Value),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Interpreter(err) => write!(f, "{err}"),
            EvalError::Client(value) => write!(f, "client error: {}", crate::expressions::repr_of(value)),
        }
    }
}

impl std::error::Error for EvalError {}

/// Renders a [`Value`] the way `repr()` would inside a script — the display
/// form a driver binary wants for a script's final result, since `Value`
/// itself carries no `Display` impl (its textual form depends on dunder
/// dispatch the dispatcher resolves, not a static `fmt::Display`).
#[must_use]
pub fn repr(value: &Value) -> String {
    crate::expressions::repr_of(value)
}

/// Parses `source` and runs it to completion against `options`.
///
/// Returns the value of the last top-level expression statement, or
/// `Value::None` if the script ends on a non-expression statement —
/// matching the host language's REPL-style "last expression is the result"
/// convention (`spec.md` §4.1).
pub fn evaluate(source: &str, options: EvalOptions<'_>) -> Result<Value, EvalError> {
    let module = ruff_python_parser::parse_module(source).map_err(|err| {
        EvalError::Interpreter(CaptiveError::new(ErrorKind::SyntaxError, err.to_string()))
    })?;
    let body = module.into_syntax().body;

    // `print()` collects into an owned, 'static buffer rather than writing
    // straight through `options.stdout`: that reference only lives for this
    // call, while the builtin closure is bound into `Env::statics`. Drained
    // into the real sink below, in every exit path.
    let print_buffer = Rc::new(RefCell::new(Vec::new()));
    let mut statics = builtins::install(print_buffer.clone());
    statics.extend(options.callables);

    let env = Env {
        statics: Rc::new(statics),
        globals: options.variables,
        frame: None,
        modules: Rc::new(options.modules),
        authorized_imports: Rc::new(options.authorized_imports),
        max_while_iterations: options.max_while_iterations,
        yield_sink: None,
        current_exception: None,
    };

    let result = run_module(&body, &env);

    for line in print_buffer.borrow().iter() {
        options.stdout.write(std::borrow::Cow::Borrowed(line));
    }

    result
}

fn run_module(body: &[Stmt], env: &Env) -> Result<Value, EvalError> {
    let (leading, last_expr) = match body.split_last() {
        Some((Stmt::Expr(last), leading)) => (leading, Some(last.value.as_ref())),
        _ => (body, None),
    };

    exec_block(leading, env).map_err(flow_to_eval_error)?;
    match last_expr {
        Some(expr) => crate::expressions::eval_expr(expr, env).map_err(flow_to_eval_error),
        None => Ok(Value::None),
    }
}

fn flow_to_eval_error(flow: Flow) -> EvalError {
    match flow {
        Flow::Fatal(err) => EvalError::Interpreter(err),
        Flow::Raise(value, span) => {
            let message = format!("UnhandledException: {}", crate::expressions::str_of(&value));
            let mut err = CaptiveError::new(ErrorKind::UnhandledException, message);
            if let Some(span) = span {
                err = err.with_span_if_missing(span);
            }
            EvalError::Interpreter(err)
        }
        Flow::Client(value) => EvalError::Client(value),
        Flow::Break | Flow::Continue | Flow::Return(_) => EvalError::Interpreter(CaptiveError::new(
            ErrorKind::Internal,
            "break/continue/return escaped module scope",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_last_expression_as_result() {
        let mut stdout = NoPrint;
        let options = EvalOptions::new(&mut stdout);
        let result = evaluate("x = 1\nx + 2", options).unwrap();
        assert!(matches!(result, Value::Int(i) if i == num_bigint::BigInt::from(3)));
    }

    #[test]
    fn unhandled_raise_becomes_interpreter_error() {
        let mut stdout = NoPrint;
        let options = EvalOptions::new(&mut stdout);
        let err = evaluate("raise ValueError('boom')", options).unwrap_err();
        assert!(matches!(err, EvalError::Interpreter(e) if e.kind == ErrorKind::UnhandledException));
    }

    #[test]
    fn print_is_routed_through_stdout_sink() {
        let mut stdout = CollectStringPrint::new();
        {
            let options = EvalOptions::new(&mut stdout);
            evaluate("print('hi')", options).unwrap();
        }
        assert_eq!(stdout.output(), "hi\n");
    }
}
