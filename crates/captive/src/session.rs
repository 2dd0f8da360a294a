//! The long-lived interpreter handle (`spec.md` §6 "Session object").
//!
//! A [`Session`] is `evaluate` with its caller-supplied parts pinned across
//! calls: the variable map, the authorized imports, and the registered
//! modules all persist from one `run` to the next, exactly as if the caller
//! kept re-supplying the same [`EvalOptions`] fields. Unlike `ouros`'s
//! `SessionManager`, there is no undo history, no multi-session registry,
//! and no paused/resumable execution — one `run` call always goes to
//! completion or fails outright (`spec.md` §6 "no persisted state").

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::{io::PrintWriter, value::Value, EvalError, EvalOptions, DEFAULT_MAX_WHILE_ITERATIONS};

/// A reusable interpreter bound to one variable map, one set of authorized
/// imports, and one stdout sink.
///
/// `Session` owns its sink so repeated `run` calls don't need the caller to
/// thread a fresh `&mut dyn PrintWriter` through each time; swap it with
/// [`Session::set_stdout`] if the destination changes mid-session.
pub struct Session {
    callables: HashMap<String, Value>,
    variables: Rc<RefCell<HashMap<String, Value>>>,
    authorized_imports: Vec<String>,
    modules: HashMap<String, Value>,
    stdout: Box<dyn PrintWriter>,
    max_while_iterations: u64,
}

impl Session {
    #[must_use]
    pub fn new(stdout: Box<dyn PrintWriter>) -> Self {
        Self {
            callables: HashMap::new(),
            variables: Rc::new(RefCell::new(HashMap::new())),
            authorized_imports: Vec::new(),
            modules: HashMap::new(),
            stdout,
            max_while_iterations: DEFAULT_MAX_WHILE_ITERATIONS,
        }
    }

    /// Registers a host-language callable, visible to every subsequent `run`.
    pub fn register_callable(&mut self, name: impl Into<String>, value: Value) {
        self.callables.insert(name.into(), value);
    }

    /// Binds a pre-built `Value::Module` under the dotted path a script would
    /// `import` it by.
    pub fn register_module(&mut self, path: impl Into<String>, module: Value) {
        self.modules.insert(path.into(), module);
    }

    /// Extends the set of dotted import prefixes the sandbox allows. Pass
    /// `"*"` to authorize every import.
    pub fn authorize_import(&mut self, path: impl Into<String>) {
        self.authorized_imports.push(path.into());
    }

    pub fn set_max_while_iterations(&mut self, limit: u64) {
        self.max_while_iterations = limit;
    }

    pub fn set_stdout(&mut self, stdout: Box<dyn PrintWriter>) {
        self.stdout = stdout;
    }

    /// Exposes the shared variable map by reference, so a caller can read or
    /// seed bindings between `run` calls without going through a script.
    #[must_use]
    pub fn variables(&self) -> &Rc<RefCell<HashMap<String, Value>>> {
        &self.variables
    }

    /// Runs `source` against this session's shared environment, returning the
    /// value of its final top-level expression. Bindings made by `source`
    /// persist into the next `run` call, since `variables` is the same
    /// `Rc<RefCell<_>>` every time (`spec.md` §6 "the variable map remains
    /// aliased to the caller's").
    pub fn run(&mut self, source: &str) -> Result<Value, EvalError> {
        let options = EvalOptions {
            callables: self.callables.clone(),
            variables: self.variables.clone(),
            authorized_imports: self.authorized_imports.clone(),
            modules: self.modules.clone(),
            stdout: self.stdout.as_mut(),
            max_while_iterations: self.max_while_iterations,
        };
        crate::evaluate(source, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CollectStringPrint;

    #[test]
    fn bindings_persist_across_runs() {
        let mut session = Session::new(Box::new(CollectStringPrint::new()));
        session.run("x = 10").unwrap();
        let result = session.run("x + 5").unwrap();
        assert!(matches!(result, Value::Int(i) if i == num_bigint::BigInt::from(15)));
    }

    #[test]
    fn authorized_imports_carry_between_runs() {
        let mut session = Session::new(Box::new(CollectStringPrint::new()));
        session.authorize_import("math");
        session.register_module("math", Value::None);
        // `authorize_import` mutates state consulted on the next `run`, not
        // retroactively on code already executed.
        assert_eq!(session.authorized_imports, vec!["math".to_string()]);
    }
}
