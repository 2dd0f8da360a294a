//! Built-in methods on intrinsic `str`/`list`/`dict`/`set` values
//! (`spec.md` §3's "sequences, mappings, sets" — the method surface the
//! distilled specification omits but the original test suite exercises
//! throughout, e.g. `'-'.join(...)`, `dict.items()`, `list.append(...)`).
//!
//! Dispatched from [`crate::expressions::eval_call`]'s method-call branch,
//! ahead of the user-instance/dunder path: a builtin receiver never has a
//! class to consult, so this is a flat name match rather than a lookup
//! chain.

use std::{cell::RefCell, rc::Rc};

use ruff_text_size::TextRange;

use crate::{
    environment::Env,
    error::{CaptiveError, ErrorKind},
    expressions::{hashable_key, index_out_of_range, key_missing, repr_of},
    signal::Flow,
    value::{value_eq, Dict, Key, Value},
};

fn type_error(message: impl Into<String>) -> Flow {
    Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, message.into()))
}

fn arg(args: &[Value], i: usize, method: &str) -> Result<Value, Flow> {
    args.get(i).cloned().ok_or_else(|| type_error(format!("{method}() missing argument {i}")))
}

/// Returns `None` when `receiver`/`name` isn't a recognized builtin method,
/// so the caller falls through to ordinary attribute resolution (instance
/// methods, module attributes, and so on).
pub fn call_builtin_method(receiver: &Value, name: &str, args: Vec<Value>, env: &Env, span: TextRange) -> Option<Result<Value, Flow>> {
    match receiver {
        Value::List(items) => list_method(items, name, args, env, span),
        Value::Dict(dict) => dict_method(dict, name, args),
        Value::Set(items) => set_method(items, name, args),
        Value::Str(s) => str_method(s, name, args, env, span),
        _ => None,
    }
}

fn list_method(items: &Rc<RefCell<Vec<Value>>>, name: &str, mut args: Vec<Value>, env: &Env, span: TextRange) -> Option<Result<Value, Flow>> {
    Some(match name {
        "append" => {
            let value = match arg(&args, 0, "append") {
                Ok(v) => v,
                Err(e) => return Some(Err(e)),
            };
            items.borrow_mut().push(value);
            Ok(Value::None)
        }
        "extend" => {
            let value = match arg(&args, 0, "extend") {
                Ok(v) => v,
                Err(e) => return Some(Err(e)),
            };
            let extra = match crate::expressions::iterate_value(&value, env, span) {
                Ok(v) => v,
                Err(e) => return Some(Err(e)),
            };
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "pop" => {
            let mut list = items.borrow_mut();
            if list.is_empty() {
                return Some(Err(type_error("pop from empty list")));
            }
            let index = match args.pop() {
                Some(v) => match v.as_index() {
                    Some(i) => normalize_pop_index(i, list.len()),
                    None => return Some(Err(type_error("pop() index must be an integer"))),
                },
                None => list.len() - 1,
            };
            if index >= list.len() {
                return Some(Err(index_out_of_range(span)));
            }
            Ok(list.remove(index))
        }
        "insert" => {
            if args.len() != 2 {
                return Some(Err(type_error("insert() requires (index, value)")));
            }
            let Some(i) = args[0].as_index() else { return Some(Err(type_error("insert() index must be an integer"))) };
            let mut list = items.borrow_mut();
            let i = i.clamp(0, list.len() as i64) as usize;
            list.insert(i, args[1].clone());
            Ok(Value::None)
        }
        "remove" => {
            let value = match arg(&args, 0, "remove") {
                Ok(v) => v,
                Err(e) => return Some(Err(e)),
            };
            let mut list = items.borrow_mut();
            match list.iter().position(|item| value_eq(item, &value)) {
                Some(i) => {
                    list.remove(i);
                    Ok(Value::None)
                }
                None => Err(Flow::raise(Value::Exception(Rc::new(crate::value::ExceptionValue::new(
                    "ValueError",
                    "list.remove(x): x not in list",
                ))))),
            }
        }
        "index" => {
            let value = match arg(&args, 0, "index") {
                Ok(v) => v,
                Err(e) => return Some(Err(e)),
            };
            match items.borrow().iter().position(|item| value_eq(item, &value)) {
                Some(i) => Ok(Value::int(i as i64)),
                None => Err(Flow::raise(Value::Exception(Rc::new(crate::value::ExceptionValue::new(
                    "ValueError",
                    format!("{} is not in list", repr_of(&value)),
                ))))),
            }
        }
        "count" => {
            let value = match arg(&args, 0, "count") {
                Ok(v) => v,
                Err(e) => return Some(Err(e)),
            };
            Ok(Value::int(items.borrow().iter().filter(|item| value_eq(item, &value)).count() as i64))
        }
        "clear" => {
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        "reverse" => {
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "sort" => {
            items.borrow_mut().sort_by(|a, b| crate::value::value_cmp(a, b).unwrap_or(std::cmp::Ordering::Equal));
            Ok(Value::None)
        }
        "copy" => Ok(Value::list(items.borrow().clone())),
        _ => return None,
    })
}

fn normalize_pop_index(i: i64, len: usize) -> usize {
    if i < 0 { (len as i64 + i).max(0) as usize } else { i as usize }
}

fn dict_method(dict: &Rc<RefCell<Dict>>, name: &str, args: Vec<Value>) -> Option<Result<Value, Flow>> {
    Some(match name {
        "get" => {
            let key = match args.first() {
                Some(k) => k,
                None => return Some(Err(type_error("get() requires a key"))),
            };
            let key = match hashable_key(key) {
                Ok(k) => k,
                Err(e) => return Some(Err(e)),
            };
            Ok(dict.borrow().0.get(&key).cloned().unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "pop" => {
            let key = match args.first() {
                Some(k) => k,
                None => return Some(Err(type_error("pop() requires a key"))),
            };
            let key = match hashable_key(key) {
                Ok(k) => k,
                Err(e) => return Some(Err(e)),
            };
            match dict.borrow_mut().0.shift_remove(&key) {
                Some(value) => Ok(value),
                None => match args.get(1) {
                    Some(default) => Ok(default.clone()),
                    None => Err(key_missing(&key.into_value())),
                },
            }
        }
        "keys" => Ok(Value::list(dict.borrow().0.keys().cloned().map(Key::into_value).collect())),
        "values" => Ok(Value::list(dict.borrow().0.values().cloned().collect())),
        "items" => Ok(Value::list(
            dict.borrow().0.iter().map(|(k, v)| Value::Tuple(Rc::new(vec![k.clone().into_value(), v.clone()]))).collect(),
        )),
        "clear" => {
            dict.borrow_mut().0.clear();
            Ok(Value::None)
        }
        "copy" => Ok(Value::Dict(Rc::new(RefCell::new(Dict(dict.borrow().0.clone()))))),
        "update" => {
            let Some(Value::Dict(other)) = args.first() else { return Some(Err(type_error("update() requires a dict"))) };
            let entries: Vec<_> = other.borrow().0.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            dict.borrow_mut().0.extend(entries);
            Ok(Value::None)
        }
        _ => return None,
    })
}

fn set_method(items: &Rc<RefCell<Vec<Key>>>, name: &str, args: Vec<Value>) -> Option<Result<Value, Flow>> {
    Some(match name {
        "add" => {
            let value = match args.first() {
                Some(v) => v,
                None => return Some(Err(type_error("add() requires a value"))),
            };
            let key = match hashable_key(value) {
                Ok(k) => k,
                Err(e) => return Some(Err(e)),
            };
            let mut set = items.borrow_mut();
            if !set.iter().any(|existing| keys_equal(existing, &key)) {
                set.push(key);
            }
            Ok(Value::None)
        }
        "remove" => {
            let value = match args.first() {
                Some(v) => v,
                None => return Some(Err(type_error("remove() requires a value"))),
            };
            let key = match hashable_key(value) {
                Ok(k) => k,
                Err(e) => return Some(Err(e)),
            };
            let mut set = items.borrow_mut();
            match set.iter().position(|existing| keys_equal(existing, &key)) {
                Some(i) => {
                    set.remove(i);
                    Ok(Value::None)
                }
                None => Err(Flow::raise(Value::Exception(Rc::new(crate::value::ExceptionValue::new("KeyError", repr_of(value)))))),
            }
        }
        "discard" => {
            let value = match args.first() {
                Some(v) => v,
                None => return Some(Err(type_error("discard() requires a value"))),
            };
            if let Ok(key) = hashable_key(value) {
                items.borrow_mut().retain(|existing| !keys_equal(existing, &key));
            }
            Ok(Value::None)
        }
        _ => return None,
    })
}

fn keys_equal(a: &Key, b: &Key) -> bool {
    value_eq(&a.clone().into_value(), &b.clone().into_value())
}

fn str_method(s: &Rc<String>, name: &str, args: Vec<Value>, env: &Env, span: TextRange) -> Option<Result<Value, Flow>> {
    Some(match name {
        "upper" => Ok(Value::str(s.to_uppercase())),
        "lower" => Ok(Value::str(s.to_lowercase())),
        "strip" => Ok(Value::str(s.trim().to_string())),
        "lstrip" => Ok(Value::str(s.trim_start().to_string())),
        "rstrip" => Ok(Value::str(s.trim_end().to_string())),
        "title" => Ok(Value::str(title_case(s))),
        "capitalize" => Ok(Value::str(capitalize(s))),
        "isalpha" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic))),
        "isdigit" => Ok(Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))),
        "isspace" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_whitespace))),
        "isupper" => Ok(Value::Bool(s.chars().any(char::is_alphabetic) && s.chars().all(|c| !c.is_alphabetic() || c.is_uppercase()))),
        "islower" => Ok(Value::Bool(s.chars().any(char::is_alphabetic) && s.chars().all(|c| !c.is_alphabetic() || c.is_lowercase()))),
        "startswith" => {
            let prefix = match args.first() {
                Some(Value::Str(p)) => p,
                _ => return Some(Err(type_error("startswith() requires a string"))),
            };
            Ok(Value::Bool(s.starts_with(prefix.as_str())))
        }
        "endswith" => {
            let suffix = match args.first() {
                Some(Value::Str(p)) => p,
                _ => return Some(Err(type_error("endswith() requires a string"))),
            };
            Ok(Value::Bool(s.ends_with(suffix.as_str())))
        }
        "split" => {
            let parts: Vec<Value> = match args.first() {
                Some(Value::Str(sep)) if !sep.is_empty() => s.split(sep.as_str()).map(Value::str).collect(),
                _ => s.split_whitespace().map(Value::str).collect(),
            };
            Ok(Value::list(parts))
        }
        "join" => {
            let value = match arg(&args, 0, "join") {
                Ok(v) => v,
                Err(e) => return Some(Err(e)),
            };
            let pieces = match crate::expressions::iterate_value(&value, env, span) {
                Ok(v) => v,
                Err(e) => return Some(Err(e)),
            };
            let joined: Result<Vec<String>, Flow> = pieces
                .into_iter()
                .map(|v| match v {
                    Value::Str(part) => Ok((*part).clone()),
                    other => Err(type_error(format!("sequence item: expected str, got '{}'", other.type_name()))),
                })
                .collect();
            match joined {
                Ok(parts) => Ok(Value::str(parts.join(s.as_str()))),
                Err(e) => return Some(Err(e)),
            }
        }
        "replace" => {
            if args.len() < 2 {
                return Some(Err(type_error("replace() requires (old, new)")));
            }
            let (Value::Str(from), Value::Str(to)) = (&args[0], &args[1]) else {
                return Some(Err(type_error("replace() requires string arguments")));
            };
            Ok(Value::str(s.replace(from.as_str(), to.as_str())))
        }
        "find" => {
            let needle = match args.first() {
                Some(Value::Str(n)) => n,
                _ => return Some(Err(type_error("find() requires a string"))),
            };
            Ok(Value::int(s.find(needle.as_str()).map(|i| i as i64).unwrap_or(-1)))
        }
        "count" => {
            let needle = match args.first() {
                Some(Value::Str(n)) => n,
                _ => return Some(Err(type_error("count() requires a string"))),
            };
            if needle.is_empty() {
                Ok(Value::int(0))
            } else {
                Ok(Value::int(s.matches(needle.as_str()).count() as i64))
            }
        }
        _ => return None,
    })
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start_of_word = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            out.extend(if start_of_word { c.to_uppercase().collect::<Vec<_>>() } else { c.to_lowercase().collect::<Vec<_>>() });
            start_of_word = false;
        } else {
            out.push(c);
            start_of_word = true;
        }
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_env() -> Env {
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
    fn list_append_mutates_in_place() {
        let list = Rc::new(RefCell::new(vec![Value::int(1)]));
        call_builtin_method(&Value::List(list.clone()), "append", vec![Value::int(2)], &test_env(), TextRange::default())
            .unwrap()
            .unwrap();
        assert_eq!(list.borrow().len(), 2);
    }

    #[test]
    fn str_join_concatenates_with_separator() {
        let receiver = Value::str("-");
        let items = Value::list(vec![Value::str("a"), Value::str("b")]);
        let Value::Str(s) = &receiver else { unreachable!() };
        let result = str_method(s, "join", vec![items], &test_env(), TextRange::default()).unwrap().unwrap();
        assert!(matches!(result, Value::Str(s) if &*s == "a-b"));
    }

    #[test]
    fn dict_items_round_trips_pairs() {
        let mut map = indexmap::IndexMap::new();
        map.insert(Key::Str(Rc::new("a".to_string())), Value::int(1));
        let dict = Rc::new(RefCell::new(Dict(map)));
        let result = dict_method(&dict, "items", Vec::new()).unwrap().unwrap();
        let Value::List(pairs) = result else { panic!() };
        assert_eq!(pairs.borrow().len(), 1);
    }
}
