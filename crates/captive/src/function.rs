//! User-defined functions (`spec.md` §4.4): parameter binding, closures, and
//! the generator trampoline.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use ruff_python_ast::Stmt;
use ruff_text_size::TextRange;

use crate::{
    dispatch::exec_block,
    environment::{Env, Frame},
    error::{CaptiveError, ErrorKind},
    signal::Flow,
    value::{Dict, GeneratorState, Value},
};

/// Describes a user function's parameter list (`spec.md` §3 "Parameter
/// descriptor").
#[derive(Debug, Default)]
pub struct ParamDescriptor {
    pub positional: Vec<String>,
    /// Defaults aligned to the *rightmost* `defaults.len()` positionals,
    /// evaluated once at `def`/`lambda` time (matching the host language's
    /// well-known mutable-default-argument behavior).
    pub defaults: Vec<Value>,
    pub var_positional: Option<String>,
    pub var_keyword: Option<String>,
}

pub struct UserFunction {
    pub name: String,
    pub params: ParamDescriptor,
    pub body: Vec<Stmt>,
    /// The frame chain live at definition time; `None` for a module-level
    /// function (it falls through to the module's `Variables` scope, not a
    /// frame).
    pub closure: Option<Rc<Frame>>,
    pub is_generator: bool,
}

impl ParamDescriptor {
    /// Binds `positional`/`keyword` call arguments (plus an optional
    /// already-bound `self`) against this descriptor, in the order
    /// `spec.md` §4.4 specifies: positionals, then matching keywords, then
    /// defaults, then `*args`/`**kwargs` overflow.
    pub fn bind(
        &self,
        self_value: Option<Value>,
        mut positional: Vec<Value>,
        mut keyword: HashMap<String, Value>,
        span: TextRange,
    ) -> Result<HashMap<String, Value>, Flow> {
        if let Some(value) = self_value {
            positional.insert(0, value);
        }

        let n_params = self.positional.len();
        let first_with_default = n_params.saturating_sub(self.defaults.len());
        let mut bound = HashMap::new();
        let mut extra_positional = Vec::new();

        for (i, arg) in positional.into_iter().enumerate() {
            if i < n_params {
                bound.insert(self.positional[i].clone(), arg);
            } else {
                extra_positional.push(arg);
            }
        }

        for (i, name) in self.positional.iter().enumerate() {
            if bound.contains_key(name) {
                continue;
            }
            if let Some(value) = keyword.remove(name) {
                bound.insert(name.clone(), value);
            } else if i >= first_with_default {
                bound.insert(name.clone(), self.defaults[i - first_with_default].clone());
            } else {
                return Err(Flow::classify(CaptiveError::new(
                    ErrorKind::TypeMismatch,
                    format!("missing required argument: '{name}'"),
                )));
            }
        }

        match &self.var_positional {
            Some(name) => bound.insert(name.clone(), Value::Tuple(Rc::new(extra_positional))),
            None if !extra_positional.is_empty() => {
                return Err(Flow::classify(
                    CaptiveError::new(ErrorKind::TypeMismatch, "too many positional arguments").with_span_if_missing(span),
                ));
            }
            None => None,
        };

        match &self.var_keyword {
            Some(name) => {
                let dict: indexmap::IndexMap<_, _> =
                    keyword.into_iter().map(|(k, v)| (crate::value::Key::Str(Rc::new(k)), v)).collect();
                bound.insert(name.clone(), Value::Dict(Rc::new(RefCell::new(Dict(dict)))));
            }
            None if !keyword.is_empty() => {
                let names: Vec<_> = keyword.into_keys().collect();
                return Err(Flow::classify(
                    CaptiveError::new(ErrorKind::TypeMismatch, format!("unexpected keyword argument(s): {}", names.join(", ")))
                        .with_span_if_missing(span),
                ));
            }
            None => {}
        }

        Ok(bound)
    }
}

/// Invokes `func`, pushing a fresh frame parented at its closure.
pub fn call_function(
    func: &Rc<UserFunction>,
    self_value: Option<Value>,
    positional: Vec<Value>,
    keyword: HashMap<String, Value>,
    env: &Env,
    span: TextRange,
) -> Result<Value, Flow> {
    let bound = func.params.bind(self_value, positional, keyword, span)?;
    let frame = Frame::child(func.closure.clone());
    frame.vars.borrow_mut().extend(bound);
    let call_env = env.with_frame(frame);

    if func.is_generator {
        return run_generator_eagerly(func, call_env);
    }

    match exec_block(&func.body, &call_env) {
        Ok(_) => Ok(Value::None),
        Err(Flow::Return(value)) => Ok(value),
        Err(other) => Err(other),
    }
}

/// Runs a generator function's body to completion immediately, collecting
/// every `yield`ed value. See the `GeneratorState` doc comment (§9) for why
/// this crate doesn't implement real coroutine suspension.
fn run_generator_eagerly(func: &Rc<UserFunction>, call_env: Env) -> Result<Value, Flow> {
    let sink = Rc::new(RefCell::new(Vec::new()));
    let gen_env = call_env.with_yield_sink(sink.clone());
    match exec_block(&func.body, &gen_env) {
        Ok(_) | Err(Flow::Return(_)) => {}
        Err(other) => return Err(other),
    }
    let items = Rc::try_unwrap(sink).map(RefCell::into_inner).unwrap_or_default();
    Ok(Value::Generator(Rc::new(RefCell::new(GeneratorState { items: Some(items), cursor: 0 }))))
}

/// Advances a generator, returning the next value or a `StopIteration`-style
/// exhaustion error recognized by `for` loops and `next()`.
pub fn generator_next(state: &Rc<RefCell<GeneratorState>>) -> Result<Value, Flow> {
    let mut state = state.borrow_mut();
    if state.items.is_none() {
        state.items = Some(Vec::new());
    }
    let len = state.items.as_ref().unwrap().len();
    if state.cursor < len {
        let value = state.items.as_ref().unwrap()[state.cursor].clone();
        state.cursor += 1;
        Ok(value)
    } else {
        Err(Flow::raise(Value::Exception(Rc::new(crate::value::ExceptionValue::new(
            "StopIteration",
            "",
        )))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(positional: &[&str], n_defaults: usize) -> ParamDescriptor {
        ParamDescriptor {
            positional: positional.iter().map(|s| s.to_string()).collect(),
            defaults: (0..n_defaults).map(|i| Value::int(i as i64)).collect(),
            var_positional: None,
            var_keyword: None,
        }
    }

    #[test]
    fn binds_positionals_then_defaults() {
        let d = desc(&["a", "b", "n"], 2);
        // a, b=333-ish default slot 0, n default slot 1 overridden by keyword
        let bound = d
            .bind(None, vec![Value::int(1)], HashMap::from([("n".to_string(), Value::int(667))]), TextRange::default())
            .unwrap();
        assert!(matches!(bound.get("a"), Some(Value::Int(_))));
        assert!(bound.contains_key("b"));
        assert!(matches!(bound.get("n"), Some(Value::Int(n)) if *n == num_bigint::BigInt::from(667)));
    }

    #[test]
    fn rejects_too_many_positionals_without_var_positional() {
        let d = desc(&["a"], 0);
        let err = d.bind(None, vec![Value::int(1), Value::int(2)], HashMap::new(), TextRange::default());
        assert!(err.is_err());
    }
}
