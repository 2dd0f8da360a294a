//! The runtime value model (`spec.md` §3).
//!
//! `Value` is the tagged variant every piece of data flowing through the
//! evaluator is stored as. Heap-shaped values (lists, dicts, sets, strings,
//! instances) are `Rc`-wrapped so that assignment, aliasing, and closure
//! capture all share the host language's reference semantics instead of
//! Rust's move/copy semantics.

use std::{cell::RefCell, cmp::Ordering, collections::HashMap, fmt, rc::Rc};

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::{
    class::{Instance, UserClass},
    function::UserFunction,
    sandbox::ModuleObject,
    signal::Flow,
};

/// A host-provided callable: the "capability" a caller hands the
/// interpreter through `callables` (`spec.md` §3, "host-language callable").
///
/// Each one carries a stable `id` so that `f is f` and `callable.__self__`
/// style identity checks (`test_types_as_objects` in the original test
/// suite) hold without relying on `Rc` pointer equality leaking through
/// clones taken for default arguments.
pub struct HostFn {
    pub name: String,
    pub id: u64,
    pub func: Box<dyn Fn(Vec<Value>, HashMap<String, Value>) -> Result<Value, Flow>>,
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFn({})", self.name)
    }
}

/// Ordered mapping value (`spec.md` §3, "mapping (insertion-ordered)").
///
/// Keys are restricted to the hashable subset of `Value` (§3 implies this by
/// only allowing intrinsic scalar/sequence dunder dispatch on comparisons;
/// `captive` makes it explicit via [`Key`]). Inserting an unhashable value as
/// a key is a `TypeMismatch` error raised at the call site.
#[derive(Debug, Default)]
pub struct Dict(pub IndexMap<Key, Value>);

/// A hashable projection of `Value`, used as `Dict`/`Set` storage keys.
///
/// Only the variants the specification explicitly treats as dict/set members
/// participate: numbers, strings, bytes, bools, `None`, and tuples of
/// hashable values. Everything else is rejected at insertion time rather
/// than silently hashing by identity.
#[derive(Debug, Clone)]
pub enum Key {
    None,
    Bool(bool),
    Int(BigInt),
    Float(u64), // bit pattern, so NaN/+-0 hash consistently with equality below
    Str(Rc<String>),
    Bytes(Rc<Vec<u8>>),
    Tuple(Rc<Vec<Key>>),
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        use Key::{Bool, Bytes, Float, Int, None as KNone, Str, Tuple};
        match (self, other) {
            (KNone, KNone) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Tuple(a), Tuple(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for Key {}

impl std::hash::Hash for Key {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Key::None => 0u8.hash(state),
            Key::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Key::Int(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            Key::Float(bits) => {
                3u8.hash(state);
                bits.hash(state);
            }
            Key::Str(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            Key::Bytes(b) => {
                5u8.hash(state);
                b.hash(state);
            }
            Key::Tuple(items) => {
                6u8.hash(state);
                items.hash(state);
            }
        }
    }
}

impl Key {
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::None => Some(Key::None),
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Int(i) => Some(Key::Int(i.clone())),
            Value::Float(f) => Some(Key::Float(f.to_bits())),
            Value::Str(s) => Some(Key::Str(s.clone())),
            Value::Bytes(b) => Some(Key::Bytes(b.clone())),
            Value::Tuple(items) => {
                let keys: Option<Vec<Key>> = items.iter().map(Key::from_value).collect();
                keys.map(|keys| Key::Tuple(Rc::new(keys)))
            }
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Key::None => Value::None,
            Key::Bool(b) => Value::Bool(b),
            Key::Int(i) => Value::Int(i),
            Key::Float(bits) => Value::Float(f64::from_bits(bits)),
            Key::Str(s) => Value::Str(s),
            Key::Bytes(b) => Value::Bytes(b),
            Key::Tuple(items) => Value::Tuple(Rc::new(items.iter().cloned().map(Key::into_value).collect())),
        }
    }
}

/// A suspended comprehension/generator body (§4.2, §4.4, §9).
///
/// `captive` implements generators by eagerly running the body to
/// completion the first time the generator is advanced, collecting every
/// yielded value into `items`. This keeps the single-use exhaustion
/// semantics the specification requires (§9 Open Questions) without needing
/// real stackful coroutines, at the cost of not supporting infinite
/// generators (the shared loop-iteration ceiling still bounds the eager
/// run, so a runaway generator body fails the same way a runaway `while`
/// loop does rather than hanging).
#[derive(Debug, Default)]
pub struct GeneratorState {
    pub items: Option<Vec<Value>>,
    pub cursor: usize,
}

/// Tagged variant spanning every runtime value (`spec.md` §3).
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    Str(Rc<String>),
    Bytes(Rc<Vec<u8>>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Dict>>),
    Set(Rc<RefCell<Vec<Key>>>),
    HostFn(Rc<HostFn>),
    Function(Rc<UserFunction>),
    /// A user function bound to an instance (or `super` proxy) as `self`.
    BoundMethod(Box<Value>, Rc<UserFunction>),
    Class(Rc<UserClass>),
    Instance(Rc<RefCell<Instance>>),
    /// `super()` proxy: attribute lookups start at the base class, skipping
    /// the instance's own class (`spec.md` §4.4).
    SuperProxy(Box<Value>, Rc<UserClass>),
    Module(Rc<ModuleObject>),
    Generator(Rc<RefCell<GeneratorState>>),
    /// A Python-style exception value: a class name plus constructor args,
    /// sufficient for `except ValueError as e: str(e)` style usage without
    /// modelling the full exception class hierarchy.
    Exception(Rc<ExceptionValue>),
}

#[derive(Debug, Clone)]
pub struct ExceptionValue {
    pub class_name: String,
    pub args: Vec<Value>,
}

impl ExceptionValue {
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { class_name: class_name.into(), args: vec![Value::Str(Rc::new(message.into()))] }
    }

    pub fn message(&self) -> String {
        match self.args.first() {
            Some(value) => crate::expressions::str_of(value),
            None => String::new(),
        }
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(Rc::new(s.into()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn int(i: i64) -> Self {
        Value::Int(BigInt::from(i))
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::Bytes(_) => "bytes".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Tuple(_) => "tuple".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::Set(_) => "set".to_string(),
            Value::HostFn(_) => "builtin_function_or_method".to_string(),
            Value::Function(_) | Value::BoundMethod(..) => "function".to_string(),
            Value::Class(_) => "type".to_string(),
            Value::Instance(instance) => instance.borrow().class.name.clone(),
            Value::SuperProxy(..) => "super".to_string(),
            Value::Module(_) => "module".to_string(),
            Value::Generator(_) => "generator".to_string(),
            Value::Exception(exc) => exc.class_name.clone(),
        }
    }

    /// Python-style truthiness: `0`, `0.0`, `""`, empty containers, and
    /// `None`/`False` are falsy; everything else is truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => !i.is_zero(),
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(dict) => !dict.borrow().0.is_empty(),
            Value::Set(items) => !items.borrow().is_empty(),
            _ => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => i.to_f64(),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<i64> {
        match self {
            Value::Int(i) => i.to_i64(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Value::Exception(_))
    }
}

/// Identity comparison for `is`/`is not` (`spec.md` §4.2).
///
/// Small immutable immediates (`None`, `bool`, small ints, short strings)
/// compare equal under `is` whenever they compare equal under `==`,
/// matching CPython's interning behavior closely enough for the
/// specification's scope (which never requires `is` to distinguish two
/// `int`s of equal value).
pub fn value_is(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y) || x == y,
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::Tuple(x), Value::Tuple(y)) => {
            Rc::ptr_eq(x, y)
                || (x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| value_eq(a, b)))
        }
        (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
        (Value::Set(x), Value::Set(y)) => Rc::ptr_eq(x, y),
        (Value::Instance(x), Value::Instance(y)) => Rc::ptr_eq(x, y),
        (Value::Class(x), Value::Class(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::HostFn(x), Value::HostFn(y)) => x.id == y.id,
        (Value::Module(x), Value::Module(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// Structural equality for `==`/`!=` on intrinsic values.
///
/// Dunder dispatch (`__eq__`) on user instances is handled one layer up in
/// `expressions.rs`, since it may legitimately return a non-bool `Value`
/// (`spec.md` §4.2's "non-standard comparisons").
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| value_eq(a, b))
        }
        (Value::Tuple(x), Value::Tuple(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| value_eq(a, b))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.0.len() == y.0.len() && x.0.iter().all(|(k, v)| y.0.get(k).is_some_and(|other| value_eq(v, other)))
        }
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().all(|item| y.contains(item))
        }
        (Value::Instance(x), Value::Instance(y)) => Rc::ptr_eq(x, y),
        (Value::Class(x), Value::Class(y)) => Rc::ptr_eq(x, y),
        (Value::Exception(x), Value::Exception(y)) => x.class_name == y.class_name,
        _ => {
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                matches!((a, b), (Value::Int(_) | Value::Float(_) | Value::Bool(_), Value::Int(_) | Value::Float(_) | Value::Bool(_))) && x == y
            } else {
                false
            }
        }
    }
}

/// Numeric ordering; returns `None` for types `spec.md`'s intrinsic
/// comparison rule doesn't define an order over (dunder dispatch handles
/// user instances separately).
pub fn value_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::List(x), Value::List(y)) => lexicographic_cmp(&x.borrow(), &y.borrow()),
        (Value::Tuple(x), Value::Tuple(y)) => lexicographic_cmp(x, y),
        _ => {
            let (x, y) = (a.as_f64()?, b.as_f64()?);
            x.partial_cmp(&y)
        }
    }
}

fn lexicographic_cmp(a: &[Value], b: &[Value]) -> Option<Ordering> {
    for (x, y) in a.iter().zip(b.iter()) {
        match value_cmp(x, y)? {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(a.len().cmp(&b.len()))
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::expressions::repr_of(self))
    }
}
