//! The closed set of builtin callables and exception classes (`spec.md` §6).
//!
//! Every entry here is registered into `Env::statics` once, at
//! [`crate::Session`] construction, and never mutates afterward — callers
//! cannot shadow, delete, or monkey-patch a builtin (`spec.md` §3 "statics
//! are read-only").

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use num_traits::Signed;
use ruff_text_size::TextRange;

use crate::{
    class::UserClass,
    error::{CaptiveError, ErrorKind},
    expressions::{iterate_value, repr_of, str_of},
    signal::Flow,
    value::{HostFn, Value},
};

/// The exception-class ancestry `try`/`except` matching consults for
/// intrinsic errors the dispatcher raises as `Value::Exception` rather than
/// a user-instantiated `Value::Instance` (division by zero, a missing dict
/// key, a call against an exhausted generator, and so on).
///
/// Mirrors the host language's standard exception hierarchy at the small
/// subset depth this interpreter actually raises; anything not listed here
/// only matches itself.
pub fn builtin_exception_is_a(actual: &str, target: &str) -> bool {
    if actual == target || target == "BaseException" {
        return true;
    }
    if target == "Exception" {
        return actual != "BaseException";
    }
    match target {
        "LookupError" => matches!(actual, "KeyError" | "IndexError"),
        "ArithmeticError" => actual == "ZeroDivisionError",
        _ => false,
    }
}

/// Builds the builtin exception marker classes (`spec.md` §4.3's class-based
/// `except` matching has to have *something* bound to `KeyError` etc., even
/// though §6's callables list never names them) and returns them alongside
/// the ordinary builtin functions, all ready to fold into `Env::statics`.
pub fn install(print_buffer: Rc<RefCell<Vec<String>>>) -> HashMap<String, Value> {
    let mut statics = HashMap::new();

    for (name, class) in exception_classes() {
        statics.insert(name.to_string(), Value::Class(class));
    }

    for (id, name, func) in functions(print_buffer) {
        statics.insert(name.to_string(), Value::HostFn(Rc::new(HostFn { name: name.to_string(), id, func })));
    }

    statics
}

/// Builds every builtin exception marker class, each a direct child of
/// `Exception` (which itself derives `BaseException`) — flat rather than
/// the host language's deeper hierarchy, since nothing in this interpreter's
/// scope needs e.g. `LookupError` to be a real bound name, only something
/// [`builtin_exception_is_a`] can reason about for the errors raised
/// intrinsically by the dispatcher.
fn exception_classes() -> Vec<(&'static str, Rc<UserClass>)> {
    fn class(name: &str, base: Option<Rc<UserClass>>) -> Rc<UserClass> {
        Rc::new(UserClass { name: name.to_string(), base, methods: HashMap::new(), class_vars: RefCell::new(HashMap::new()) })
    }

    let base_exception = class("BaseException", None);
    let exception = class("Exception", Some(base_exception.clone()));

    let mut classes = vec![("BaseException", base_exception), ("Exception", exception.clone())];
    for name in [
        "TypeError",
        "ValueError",
        "KeyError",
        "IndexError",
        "AttributeError",
        "NameError",
        "ZeroDivisionError",
        "StopIteration",
        "AssertionError",
        "ImportError",
        "RuntimeError",
        "NotImplementedError",
    ] {
        classes.push((name, class(name, Some(exception.clone()))));
    }
    classes
}

type BuiltinFn = Box<dyn Fn(Vec<Value>, HashMap<String, Value>) -> Result<Value, Flow>>;

fn functions(print_buffer: Rc<RefCell<Vec<String>>>) -> Vec<(u64, &'static str, BuiltinFn)> {
    let mut id = 0u64;
    let mut next_id = || {
        id += 1;
        id
    };

    vec![
        (next_id(), "abs", builtin_abs()),
        (next_id(), "round", builtin_round()),
        (next_id(), "min", builtin_min_max(true)),
        (next_id(), "max", builtin_min_max(false)),
        (next_id(), "sum", builtin_sum()),
        (next_id(), "len", builtin_len()),
        (next_id(), "str", builtin_str()),
        (next_id(), "repr", builtin_repr()),
        (next_id(), "bool", builtin_bool()),
        (next_id(), "int", builtin_int()),
        (next_id(), "float", builtin_float()),
        (next_id(), "list", builtin_list()),
        (next_id(), "tuple", builtin_tuple()),
        (next_id(), "type", builtin_type()),
        (next_id(), "isinstance", builtin_isinstance()),
        (next_id(), "hasattr", builtin_hasattr()),
        (next_id(), "sorted", builtin_sorted()),
        (next_id(), "reversed", builtin_reversed()),
        (next_id(), "any", builtin_any()),
        (next_id(), "all", builtin_all()),
        (next_id(), "enumerate", builtin_enumerate()),
        (next_id(), "range", builtin_range()),
        (next_id(), "print", builtin_print(print_buffer)),
    ]
}

fn type_error(message: impl Into<String>) -> Flow {
    Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, message.into()))
}

fn builtin_abs() -> BuiltinFn {
    Box::new(|args, _kwargs| match args.into_iter().next() {
        Some(Value::Int(i)) => Ok(Value::Int(i.abs())),
        Some(Value::Float(f)) => Ok(Value::Float(f.abs())),
        Some(Value::Bool(b)) => Ok(Value::int(i64::from(b))),
        _ => Err(type_error("abs() requires a number")),
    })
}

fn builtin_round() -> BuiltinFn {
    Box::new(|args, _kwargs| {
        let value = args.first().and_then(Value::as_f64).ok_or_else(|| type_error("round() requires a number"))?;
        match args.get(1) {
            Some(ndigits) => {
                let digits = ndigits.as_index().ok_or_else(|| type_error("round() ndigits must be an int"))?;
                let factor = 10f64.powi(digits as i32);
                Ok(Value::Float((value * factor).round() / factor))
            }
            None => Ok(Value::int(value.round() as i64)),
        }
    })
}

fn builtin_min_max(is_min: bool) -> BuiltinFn {
    Box::new(move |args, _kwargs| {
        if args.is_empty() {
            return Err(type_error(if is_min { "min() arg is an empty sequence" } else { "max() arg is an empty sequence" }));
        }
        let candidates: Vec<Value> = if args.len() == 1 {
            iterate_value(&args[0], &dummy_env(), TextRange::default())?
        } else {
            args
        };
        let mut best = candidates.into_iter();
        let mut result = best.next().ok_or_else(|| type_error("min()/max() arg is an empty sequence"))?;
        for candidate in best {
            let cmp = crate::value::value_cmp(&candidate, &result);
            if let Some(ordering) = cmp {
                let replace = if is_min { ordering.is_lt() } else { ordering.is_gt() };
                if replace {
                    result = candidate;
                }
            }
        }
        Ok(result)
    })
}

fn builtin_sum() -> BuiltinFn {
    Box::new(|args, _kwargs| {
        let items = iterate_value(args.first().ok_or_else(|| type_error("sum() requires an iterable"))?, &dummy_env(), TextRange::default())?;
        let mut total = args.get(1).cloned().unwrap_or(Value::int(0));
        for item in items {
            total = crate::expressions::apply_binop(ruff_python_ast::Operator::Add, total, item, &dummy_env(), TextRange::default())?;
        }
        Ok(total)
    })
}

fn builtin_len() -> BuiltinFn {
    Box::new(|args, _kwargs| {
        let value = args.first().ok_or_else(|| type_error("len() requires an argument"))?;
        let n = match value {
            Value::Str(s) => s.chars().count(),
            Value::Bytes(b) => b.len(),
            Value::List(items) => items.borrow().len(),
            Value::Tuple(items) => items.len(),
            Value::Dict(dict) => dict.borrow().0.len(),
            Value::Set(items) => items.borrow().len(),
            other => return Err(type_error(format!("object of type '{}' has no len()", other.type_name()))),
        };
        Ok(Value::int(n as i64))
    })
}

fn builtin_str() -> BuiltinFn {
    Box::new(|args, _kwargs| Ok(Value::str(args.first().map(str_of).unwrap_or_default())))
}

fn builtin_repr() -> BuiltinFn {
    Box::new(|args, _kwargs| Ok(Value::str(args.first().map(repr_of).unwrap_or_default())))
}

fn builtin_bool() -> BuiltinFn {
    Box::new(|args, _kwargs| Ok(Value::Bool(args.first().is_some_and(Value::truthy))))
}

fn builtin_int() -> BuiltinFn {
    Box::new(|args, _kwargs| match args.first() {
        None => Ok(Value::int(0)),
        Some(Value::Int(i)) => Ok(Value::Int(i.clone())),
        Some(Value::Float(f)) => Ok(Value::int(f.trunc() as i64)),
        Some(Value::Bool(b)) => Ok(Value::int(i64::from(*b))),
        Some(Value::Str(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::int)
            .map_err(|_| Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, format!("invalid literal for int(): '{s}'")))),
        Some(other) => Err(type_error(format!("int() argument must be a string or a number, not '{}'", other.type_name()))),
    })
}

fn builtin_float() -> BuiltinFn {
    Box::new(|args, _kwargs| match args.first() {
        None => Ok(Value::Float(0.0)),
        Some(value) => value.as_f64().map(Value::Float).ok_or_else(|| type_error("float() requires a number")),
    })
}

fn builtin_list() -> BuiltinFn {
    Box::new(|args, _kwargs| match args.first() {
        None => Ok(Value::list(Vec::new())),
        Some(value) => Ok(Value::list(iterate_value(value, &dummy_env(), TextRange::default())?)),
    })
}

fn builtin_tuple() -> BuiltinFn {
    Box::new(|args, _kwargs| match args.first() {
        None => Ok(Value::Tuple(Rc::new(Vec::new()))),
        Some(value) => Ok(Value::Tuple(Rc::new(iterate_value(value, &dummy_env(), TextRange::default())?))),
    })
}

fn builtin_type() -> BuiltinFn {
    Box::new(|args, _kwargs| {
        let value = args.first().ok_or_else(|| type_error("type() requires an argument"))?;
        Ok(Value::str(value.type_name()))
    })
}

fn builtin_isinstance() -> BuiltinFn {
    Box::new(|args, _kwargs| {
        let (value, class) = (args.first(), args.get(1));
        match (value, class) {
            (Some(Value::Instance(instance)), Some(Value::Class(target))) => {
                Ok(Value::Bool(instance.borrow().class.is_subclass_of(target)))
            }
            (Some(value), Some(Value::Str(type_name))) => Ok(Value::Bool(value.type_name() == **type_name)),
            _ => Ok(Value::Bool(false)),
        }
    })
}

fn builtin_hasattr() -> BuiltinFn {
    Box::new(|args, _kwargs| {
        let (value, name) = (args.first(), args.get(1));
        let (Some(value), Some(Value::Str(name))) = (value, name) else {
            return Err(type_error("hasattr() requires (object, name)"));
        };
        Ok(Value::Bool(crate::expressions::get_attribute(value, name, &dummy_env(), TextRange::default()).is_ok()))
    })
}

fn builtin_sorted() -> BuiltinFn {
    Box::new(|args, _kwargs| {
        let mut items = iterate_value(args.first().ok_or_else(|| type_error("sorted() requires an iterable"))?, &dummy_env(), TextRange::default())?;
        items.sort_by(|a, b| crate::value::value_cmp(a, b).unwrap_or(std::cmp::Ordering::Equal));
        Ok(Value::list(items))
    })
}

fn builtin_reversed() -> BuiltinFn {
    Box::new(|args, _kwargs| {
        let mut items = iterate_value(args.first().ok_or_else(|| type_error("reversed() requires an iterable"))?, &dummy_env(), TextRange::default())?;
        items.reverse();
        Ok(Value::list(items))
    })
}

fn builtin_any() -> BuiltinFn {
    Box::new(|args, _kwargs| {
        let items = iterate_value(args.first().ok_or_else(|| type_error("any() requires an iterable"))?, &dummy_env(), TextRange::default())?;
        Ok(Value::Bool(items.iter().any(Value::truthy)))
    })
}

fn builtin_all() -> BuiltinFn {
    Box::new(|args, _kwargs| {
        let items = iterate_value(args.first().ok_or_else(|| type_error("all() requires an iterable"))?, &dummy_env(), TextRange::default())?;
        Ok(Value::Bool(items.iter().all(Value::truthy)))
    })
}

fn builtin_enumerate() -> BuiltinFn {
    Box::new(|args, kwargs| {
        let start = kwargs.get("start").and_then(Value::as_index).unwrap_or(0);
        let items = iterate_value(args.first().ok_or_else(|| type_error("enumerate() requires an iterable"))?, &dummy_env(), TextRange::default())?;
        let pairs = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| Value::Tuple(Rc::new(vec![Value::int(start + i as i64), item])))
            .collect();
        Ok(Value::list(pairs))
    })
}

fn builtin_range() -> BuiltinFn {
    Box::new(|args, _kwargs| {
        let nums: Vec<i64> = args.iter().map(|v| v.as_index().ok_or_else(|| type_error("range() requires int arguments"))).collect::<Result<_, _>>()?;
        let (start, stop, step) = match nums.as_slice() {
            [stop] => (0, *stop, 1),
            [start, stop] => (*start, *stop, 1),
            [start, stop, step] => (*start, *stop, *step),
            _ => return Err(type_error("range() expected 1 to 3 arguments")),
        };
        if step == 0 {
            return Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "range() arg 3 must not be zero")));
        }
        let mut items = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            items.push(Value::int(i));
            i += step;
        }
        Ok(Value::list(items))
    })
}

/// Collects into an owned buffer rather than writing straight through a
/// caller-supplied [`crate::io::PrintWriter`]: that trait object is borrowed
/// only for the duration of [`crate::evaluate`]'s call, while this closure is
/// bound into `Env::statics` and has to outlive it. [`crate::evaluate`]
/// drains the buffer into the real sink, in order, once the script finishes.
fn builtin_print(print_buffer: Rc<RefCell<Vec<String>>>) -> BuiltinFn {
    Box::new(move |args, kwargs| {
        let sep = kwargs.get("sep").map(str_of).unwrap_or_else(|| " ".to_string());
        let line = args.iter().map(str_of).collect::<Vec<_>>().join(&sep);
        print_buffer.borrow_mut().push(line);
        Ok(Value::None)
    })
}

/// A frame-less, global-less environment for builtins that only need
/// `iterate_value`/`apply_binop`'s dunder fallback against instances that
/// happen to carry a method — none of the default builtins actually resolve
/// a name, so this never touches a real caller scope.
fn dummy_env() -> crate::environment::Env {
    crate::environment::Env {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_hierarchy_matches_lookup_error_children() {
        assert!(builtin_exception_is_a("KeyError", "LookupError"));
        assert!(builtin_exception_is_a("KeyError", "Exception"));
        assert!(!builtin_exception_is_a("ValueError", "LookupError"));
    }

    #[test]
    fn abs_handles_int_and_float() {
        let f = builtin_abs();
        assert!(matches!(f(vec![Value::int(-3)], HashMap::new()).unwrap(), Value::Int(i) if i == num_bigint::BigInt::from(3)));
        assert!(matches!(f(vec![Value::Float(-2.5)], HashMap::new()).unwrap(), Value::Float(f) if f == 2.5));
    }

    #[test]
    fn range_builds_expected_sequence() {
        let f = builtin_range();
        let Value::List(items) = f(vec![Value::int(0), Value::int(5), Value::int(2)], HashMap::new()).unwrap() else { panic!() };
        let values: Vec<i64> = items.borrow().iter().map(|v| v.as_index().unwrap()).collect();
        assert_eq!(values, vec![0, 2, 4]);
    }
}
