//! The three-scope environment (`spec.md` §3 "Environment").
//!
//! 1. **Statics** — the caller-supplied `callables` table. Read-only from
//!    the interpreter's perspective; assigning to a name that exists here
//!    is rejected.
//! 2. **Variables** — the mutable per-invocation namespace the caller sees
//!    and owns (`spec.md` §5 "the caller's variable map is shared by
//!    identity"). Holds the reserved `_operations_count` key.
//! 3. **Frames** — pushed on function/comprehension entry, popped on exit.
//!    Frames form a chain via `parent` so that closures capture the frame
//!    chain live at definition time, and nested lookups fall through to
//!    enclosing frames.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::{
    error::{closest_match, CaptiveError, ErrorKind},
    value::Value,
};

pub const OPERATIONS_COUNT_KEY: &str = "_operations_count";

/// One level of the local-variable scope stack (GLOSSARY "Frame").
#[derive(Debug, Default)]
pub struct Frame {
    pub vars: RefCell<HashMap<String, Value>>,
    pub parent: Option<Rc<Frame>>,
}

impl Frame {
    pub fn child(parent: Option<Rc<Frame>>) -> Rc<Frame> {
        Rc::new(Frame { vars: RefCell::new(HashMap::new()), parent })
    }

    fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.get(name))
    }

    fn set_if_present(&self, name: &str, value: Value) -> bool {
        if self.vars.borrow().contains_key(name) {
            self.vars.borrow_mut().insert(name.to_string(), value);
            return true;
        }
        match &self.parent {
            Some(parent) => parent.set_if_present(name, value),
            None => false,
        }
    }

    fn collect_names(&self, out: &mut Vec<String>) {
        out.extend(self.vars.borrow().keys().cloned());
        if let Some(parent) = &self.parent {
            parent.collect_names(out);
        }
    }
}

/// Top-level execution context threaded through the dispatcher.
///
/// Cheaply `clone`-able: every field is `Rc`-backed, so pushing a frame or
/// entering a function call is `env.with_frame(new_frame)`, never a deep
/// copy of the scope stack.
#[derive(Clone)]
pub struct Env {
    pub statics: Rc<HashMap<String, Value>>,
    pub globals: Rc<RefCell<HashMap<String, Value>>>,
    pub frame: Option<Rc<Frame>>,
    pub modules: Rc<HashMap<String, Value>>,
    pub authorized_imports: Rc<Vec<String>>,
    pub max_while_iterations: u64,
    /// Set while evaluating the eagerly-run body of a generator (§9); every
    /// `yield` pushes here instead of suspending the dispatcher.
    pub yield_sink: Option<Rc<RefCell<Vec<Value>>>>,
    /// The exception currently being handled, set while running an `except`
    /// body so a bare `raise` can re-raise it (`spec.md` §4.3).
    pub current_exception: Option<Value>,
}

impl Env {
    #[must_use]
    pub fn with_frame(&self, frame: Rc<Frame>) -> Env {
        Env { frame: Some(frame), ..self.clone() }
    }

    #[must_use]
    pub fn with_yield_sink(&self, sink: Rc<RefCell<Vec<Value>>>) -> Env {
        Env { yield_sink: Some(sink), ..self.clone() }
    }

    #[must_use]
    pub fn with_current_exception(&self, value: Value) -> Env {
        Env { current_exception: Some(value), ..self.clone() }
    }

    pub fn resolve(&self, name: &str) -> Result<Value, CaptiveError> {
        if let Some(frame) = &self.frame {
            if let Some(value) = frame.get(name) {
                return Ok(value);
            }
        }
        if let Some(value) = self.globals.borrow().get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.statics.get(name) {
            return Ok(value.clone());
        }
        Err(CaptiveError::name_not_defined(name, self.suggest(name).as_deref()))
    }

    fn suggest(&self, name: &str) -> Option<String> {
        let mut names = Vec::new();
        if let Some(frame) = &self.frame {
            frame.collect_names(&mut names);
        }
        names.extend(self.globals.borrow().keys().cloned());
        names.extend(self.statics.keys().cloned());
        closest_match(name, names.iter().map(String::as_str)).map(str::to_string)
    }

    /// Binds `name` in the innermost scope that should own it: the current
    /// frame if one is open, otherwise the module-level variables map.
    /// Rejects shadowing a static (`spec.md` §3 invariant).
    pub fn assign(&self, name: &str, value: Value) -> Result<(), CaptiveError> {
        if self.statics.contains_key(name) {
            return Err(CaptiveError::new(
                ErrorKind::NameNotDefined,
                format!("Cannot assign to name '{name}': doing this would erase the existing function!"),
            ));
        }
        match &self.frame {
            Some(frame) => {
                if !frame.set_if_present(name, value.clone()) {
                    frame.vars.borrow_mut().insert(name.to_string(), value);
                }
            }
            None => {
                self.globals.borrow_mut().insert(name.to_string(), value);
            }
        }
        Ok(())
    }

    /// Forces a binding into the *innermost* frame regardless of whether an
    /// outer frame already owns `name` — used for comprehension/loop targets
    /// and function parameters, which always shadow rather than rebind an
    /// enclosing closure variable.
    pub fn declare_local(&self, name: &str, value: Value) {
        match &self.frame {
            Some(frame) => {
                frame.vars.borrow_mut().insert(name.to_string(), value);
            }
            None => {
                self.globals.borrow_mut().insert(name.to_string(), value);
            }
        }
    }

    pub fn delete(&self, name: &str) -> Result<(), CaptiveError> {
        let removed = match &self.frame {
            Some(frame) => frame.vars.borrow_mut().remove(name).is_some(),
            None => false,
        };
        if removed {
            return Ok(());
        }
        if self.globals.borrow_mut().remove(name).is_some() {
            return Ok(());
        }
        Err(CaptiveError::new(
            ErrorKind::NameNotDefined,
            format!("Cannot delete name '{name}': name is not defined"),
        ))
    }

    pub fn operations_count(&self) -> i64 {
        match self.globals.borrow().get(OPERATIONS_COUNT_KEY) {
            Some(Value::Int(i)) => num_traits::ToPrimitive::to_i64(i).unwrap_or(0),
            _ => 0,
        }
    }

    /// Increments `_operations_count` by one (`spec.md` §4.1, §6, §8).
    pub fn bump_operations(&self) {
        let next = self.operations_count() + 1;
        self.globals.borrow_mut().insert(OPERATIONS_COUNT_KEY.to_string(), Value::int(next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Env {
        Env {
            statics: Rc::new(HashMap::new()),
            globals: Rc::new(RefCell::new(HashMap::new())),
            frame: None,
            modules: Rc::new(HashMap::new()),
            authorized_imports: Rc::new(Vec::new()),
            max_while_iterations: 1_000_000,
            yield_sink: None,
            current_exception: None,
        }
    }

    #[test]
    fn assign_rejects_static_shadowing() {
        let mut env = env();
        env.statics = Rc::new(HashMap::from([("print".to_string(), Value::None)]));
        let err = env.assign("print", Value::int(1)).unwrap_err();
        assert!(err.message.contains("doing this would erase the existing function"));
    }

    #[test]
    fn nested_frame_falls_through_to_globals() {
        let env = env();
        env.globals.borrow_mut().insert("x".to_string(), Value::int(3));
        let frame = Frame::child(None);
        let inner = env.with_frame(frame);
        assert!(matches!(inner.resolve("x"), Ok(Value::Int(_))));
    }

    #[test]
    fn operations_count_is_monotonic() {
        let env = env();
        env.bump_operations();
        env.bump_operations();
        assert_eq!(env.operations_count(), 2);
    }
}
