//! User-defined classes and instances (`spec.md` §4.4, §4.5).
//!
//! Single inheritance only, matching the specification's class model: every
//! `UserClass` has at most one `base`, and attribute resolution walks
//! instance dict → class → base chain, stopping at the first hit.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::{
    environment::Env,
    function::{call_function, UserFunction},
    signal::Flow,
    value::Value,
};

pub struct UserClass {
    pub name: String,
    pub base: Option<Rc<UserClass>>,
    pub methods: HashMap<String, Rc<UserFunction>>,
    /// Class-level (not instance) attributes assigned in the class body that
    /// aren't `def`s — e.g. `class C: x = 1`.
    pub class_vars: RefCell<HashMap<String, Value>>,
}

impl UserClass {
    /// Looks up a method by name, walking the base chain. Does not consult
    /// `class_vars` (callers that want "any attribute" should check both).
    pub fn find_method(&self, name: &str) -> Option<Rc<UserFunction>> {
        if let Some(method) = self.methods.get(name) {
            return Some(method.clone());
        }
        self.base.as_ref().and_then(|base| base.find_method(name))
    }

    pub fn find_class_var(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.class_vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.base.as_ref().and_then(|base| base.find_class_var(name))
    }

    pub fn is_subclass_of(self: &Rc<Self>, other: &Rc<UserClass>) -> bool {
        if Rc::ptr_eq(self, other) {
            return true;
        }
        match &self.base {
            Some(base) => base.is_subclass_of(other),
            None => false,
        }
    }
}

pub struct Instance {
    pub class: Rc<UserClass>,
    pub attrs: HashMap<String, Value>,
}

impl Instance {
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.attrs.get(name) {
            return Some(value.clone());
        }
        self.class.find_class_var(name)
    }
}

/// Looks up `name` on `instance` as an attribute access would: own dict,
/// then a bound method off the class chain, then a class variable.
/// `self_value` is the already-wrapped `Value::Instance` to bind methods to.
pub fn resolve_attribute(self_value: &Value, class: &Rc<UserClass>, attrs: &HashMap<String, Value>, name: &str) -> Option<Value> {
    if let Some(value) = attrs.get(name) {
        return Some(value.clone());
    }
    if let Some(method) = class.find_method(name) {
        return Some(Value::BoundMethod(Box::new(self_value.clone()), method));
    }
    class.find_class_var(name)
}

/// Constructs a new instance of `class`, running `__init__` if present
/// (`spec.md` §4.4 "instantiation calls `__init__`").
pub fn instantiate(
    class: &Rc<UserClass>,
    positional: Vec<Value>,
    keyword: HashMap<String, Value>,
    env: &Env,
    span: ruff_text_size::TextRange,
) -> Result<Value, Flow> {
    let instance = Rc::new(RefCell::new(Instance { class: class.clone(), attrs: HashMap::new() }));
    let self_value = Value::Instance(instance.clone());

    match class.find_method("__init__") {
        Some(init) => {
            call_function(&init, Some(self_value.clone()), positional, keyword, env, span)?;
        }
        // A class with no `__init__` (builtin exception marker classes, or a
        // plain `class C: pass`) still needs to remember its construction
        // arguments under `.args`, matching `except ... as e: e.args` on a
        // user-raised exception with no custom constructor.
        None if !positional.is_empty() => {
            instance.borrow_mut().attrs.insert("args".to_string(), Value::Tuple(Rc::new(positional)));
        }
        None => {}
    }

    Ok(self_value)
}

/// Invokes a named dunder method on `value` if its class (or a base class)
/// defines one, returning `None` when it doesn't — callers fall back to the
/// intrinsic behavior in that case (`spec.md` §4.2 "dunder fallback").
pub fn call_dunder(
    value: &Value,
    name: &str,
    args: Vec<Value>,
    env: &Env,
    span: ruff_text_size::TextRange,
) -> Option<Result<Value, Flow>> {
    match value {
        Value::Instance(instance) => {
            let class = instance.borrow().class.clone();
            let method = class.find_method(name)?;
            Some(call_function(&method, Some(value.clone()), args, HashMap::new(), env, span))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, base: Option<Rc<UserClass>>) -> Rc<UserClass> {
        Rc::new(UserClass { name: name.to_string(), base, methods: HashMap::new(), class_vars: RefCell::new(HashMap::new()) })
    }

    #[test]
    fn subclass_check_walks_base_chain() {
        let animal = class("Animal", None);
        let dog = class("Dog", Some(animal.clone()));
        assert!(dog.is_subclass_of(&animal));
        assert!(!animal.is_subclass_of(&dog));
    }

    #[test]
    fn class_var_falls_through_to_base() {
        let base = class("Base", None);
        base.class_vars.borrow_mut().insert("kind".to_string(), Value::str("base"));
        let derived = class("Derived", Some(base));
        assert!(matches!(derived.find_class_var("kind"), Some(Value::Str(_))));
    }
}
