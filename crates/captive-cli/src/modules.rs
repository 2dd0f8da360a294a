//! Toy `math`/`random` host modules, standing in for the "external
//! collaborator" libraries `captive` itself never implements (SPEC_FULL.md
//! §6 "the core never implements `math.sqrt`").

use std::{cell::Cell, collections::HashMap, rc::Rc};

use captive::{HostFn, ModuleObject, Value};

fn host_fn(id: u64, name: &str, func: impl Fn(Vec<Value>, HashMap<String, Value>) -> Result<Value, captive::Flow> + 'static) -> Value {
    Value::HostFn(Rc::new(HostFn { name: name.to_string(), id, func: Box::new(func) }))
}

/// `math.sqrt`, `math.floor`, `math.ceil`, `math.pi`.
pub fn math_module() -> Value {
    let mut attrs = HashMap::new();
    attrs.insert("pi".to_string(), Value::Float(std::f64::consts::PI));
    attrs.insert(
        "sqrt".to_string(),
        host_fn(9001, "sqrt", |args, _| {
            let x = args.first().and_then(Value::as_f64).ok_or_else(type_error)?;
            Ok(Value::Float(x.sqrt()))
        }),
    );
    attrs.insert(
        "floor".to_string(),
        host_fn(9002, "floor", |args, _| {
            let x = args.first().and_then(Value::as_f64).ok_or_else(type_error)?;
            Ok(Value::int(x.floor() as i64))
        }),
    );
    attrs.insert(
        "ceil".to_string(),
        host_fn(9003, "ceil", |args, _| {
            let x = args.first().and_then(Value::as_f64).ok_or_else(type_error)?;
            Ok(Value::int(x.ceil() as i64))
        }),
    );
    Value::Module(Rc::new(ModuleObject::new("math", attrs)))
}

/// `random.random`, `random.randint` — a deterministic linear congruential
/// generator rather than a real entropy source, since a demonstration
/// module has no business pulling in a CSPRNG dependency for the driver
/// binary alone.
pub fn random_module() -> Value {
    let state = Rc::new(Cell::new(0x2545F4914F6CDD1Du64));
    let next = move || {
        let mut x = state.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        state.set(x);
        x
    };

    let mut attrs = HashMap::new();
    let gen = next.clone();
    attrs.insert(
        "random".to_string(),
        host_fn(9101, "random", move |_args, _| Ok(Value::Float((gen() >> 11) as f64 / (1u64 << 53) as f64))),
    );
    let gen = next;
    attrs.insert(
        "randint".to_string(),
        host_fn(9102, "randint", move |args, _| {
            let lo = args.first().and_then(Value::as_index).ok_or_else(type_error)?;
            let hi = args.get(1).and_then(Value::as_index).ok_or_else(type_error)?;
            if hi < lo {
                return Err(type_error());
            }
            let span = (hi - lo + 1) as u64;
            Ok(Value::int(lo + (gen() % span) as i64))
        }),
    );
    Value::Module(Rc::new(ModuleObject::new("random", attrs)))
}

fn type_error() -> captive::Flow {
    captive::Flow::Fatal(captive::CaptiveError::new(captive::ErrorKind::TypeMismatch, "expected a number"))
}
