//! Expression evaluation (`spec.md` §4.2).
//!
//! Every intrinsic operator tries its built-in meaning first and falls back
//! to the matching dunder method on a `Value::Instance` operand only when
//! the intrinsic meaning doesn't apply — `spec.md`'s "dunder fallback" rule.

use std::{cell::RefCell, cmp::Ordering, collections::HashMap, rc::Rc};

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use ruff_python_ast::{self as ast, BoolOp, CmpOp, Expr, Operator, UnaryOp};
use ruff_text_size::{Ranged, TextRange};

use crate::{
    class::{call_dunder, instantiate, resolve_attribute},
    environment::Env,
    error::{CaptiveError, ErrorKind},
    function::call_function,
    signal::Flow,
    statements,
    value::{value_cmp, value_eq, value_is, Dict, Key, Value},
};

pub fn eval_exprs(exprs: &[Expr], env: &Env) -> Result<Vec<Value>, Flow> {
    exprs.iter().map(|e| eval_expr(e, env)).collect()
}

pub fn eval_expr(expr: &Expr, env: &Env) -> Result<Value, Flow> {
    env.bump_operations();
    let span = expr.range();
    eval_expr_impl(expr, env).map_err(|flow| flow.with_span_if_missing(span))
}

fn eval_expr_impl(expr: &Expr, env: &Env) -> Result<Value, Flow> {
    match expr {
        Expr::NoneLiteral(_) => Ok(Value::None),
        Expr::BooleanLiteral(lit) => Ok(Value::Bool(lit.value)),
        Expr::EllipsisLiteral(_) => Ok(Value::None),
        Expr::NumberLiteral(lit) => match &lit.value {
            ast::Number::Int(i) => match i.as_i64() {
                Some(i) => Ok(Value::Int(BigInt::from(i))),
                None => Ok(Value::Int(i.to_string().parse::<BigInt>().unwrap_or_default())),
            },
            ast::Number::Float(f) => Ok(Value::Float(*f)),
            ast::Number::Complex { .. } => Err(Flow::classify(CaptiveError::new(
                ErrorKind::TypeMismatch,
                "complex numbers are not supported",
            ))),
        },
        Expr::StringLiteral(lit) => Ok(Value::str(lit.value.to_str().to_string())),
        Expr::BytesLiteral(lit) => Ok(Value::Bytes(Rc::new(lit.value.bytes().collect()))),
        Expr::FString(fstring) => Ok(Value::str(eval_fstring(fstring, env)?)),

        Expr::Name(name) => env.resolve(name.id.as_str()).map_err(Flow::classify),

        Expr::Tuple(tuple) => {
            let items = eval_star_aware(&tuple.elts, env)?;
            Ok(Value::Tuple(Rc::new(items)))
        }
        Expr::List(list) => {
            let items = eval_star_aware(&list.elts, env)?;
            Ok(Value::list(items))
        }
        Expr::Set(set) => {
            let items = eval_star_aware(&set.elts, env)?;
            let mut keys = Vec::with_capacity(items.len());
            for item in items {
                keys.push(hashable_key(&item)?);
            }
            Ok(Value::Set(Rc::new(RefCell::new(keys))))
        }
        Expr::Dict(dict) => {
            let mut map = Dict::default();
            for item in &dict.items {
                match &item.key {
                    Some(key_expr) => {
                        let key = eval_expr(key_expr, env)?;
                        let value = eval_expr(&item.value, env)?;
                        map.0.insert(hashable_key(&key)?, value);
                    }
                    None => {
                        // `**other` unpacking inside a dict display.
                        let unpacked = eval_expr(&item.value, env)?;
                        if let Value::Dict(other) = unpacked {
                            for (k, v) in other.borrow().0.iter() {
                                map.0.insert(k.clone(), v.clone());
                            }
                        } else {
                            return Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "dict unpacking requires a mapping")));
                        }
                    }
                }
            }
            Ok(Value::Dict(Rc::new(RefCell::new(map))))
        }

        Expr::BoolOp(boolop) => eval_bool_op(boolop, env),
        Expr::UnaryOp(unary) => eval_unary_op(unary, env),
        Expr::BinOp(binop) => {
            let left = eval_expr(&binop.left, env)?;
            let right = eval_expr(&binop.right, env)?;
            apply_binop(binop.op, left, right, env, binop.range())
        }
        Expr::Compare(cmp) => eval_compare(cmp, env),
        Expr::If(ifexp) => {
            if eval_expr(&ifexp.test, env)?.truthy() {
                eval_expr(&ifexp.body, env)
            } else {
                eval_expr(&ifexp.orelse, env)
            }
        }
        Expr::Named(named) => {
            let value = eval_expr(&named.value, env)?;
            if let Expr::Name(name) = named.target.as_ref() {
                env.assign(name.id.as_str(), value.clone()).map_err(Flow::classify)?;
            }
            Ok(value)
        }

        Expr::Lambda(lambda) => statements::make_lambda(lambda, env),

        Expr::Call(call) => eval_call(call, env),
        Expr::Attribute(attr) => eval_attribute_get(attr, env),
        Expr::Subscript(sub) => eval_subscript(sub, env),
        Expr::Slice(_) => Err(Flow::classify(CaptiveError::new(
            ErrorKind::TypeMismatch,
            "slice used outside of a subscript",
        ))),
        Expr::Starred(starred) => eval_expr(&starred.value, env),

        Expr::ListComp(comp) => {
            let items = eval_comprehension(&comp.elt, None, &comp.generators, env)?;
            Ok(Value::list(items))
        }
        Expr::SetComp(comp) => {
            let items = eval_comprehension(&comp.elt, None, &comp.generators, env)?;
            let mut keys = Vec::with_capacity(items.len());
            for item in items {
                keys.push(hashable_key(&item)?);
            }
            Ok(Value::Set(Rc::new(RefCell::new(keys))))
        }
        Expr::DictComp(comp) => {
            let key = comp.key.as_deref().expect("dict comprehension key");
            let pairs = eval_dict_comprehension(key, &comp.value, &comp.generators, env)?;
            let mut map = Dict::default();
            for (k, v) in pairs {
                map.0.insert(hashable_key(&k)?, v);
            }
            Ok(Value::Dict(Rc::new(RefCell::new(map))))
        }
        Expr::Generator(genexp) => {
            let items = eval_comprehension(&genexp.elt, None, &genexp.generators, env)?;
            Ok(Value::Generator(Rc::new(RefCell::new(crate::value::GeneratorState { items: Some(items), cursor: 0 }))))
        }

        Expr::Yield(y) => {
            let value = match &y.value {
                Some(expr) => eval_expr(expr, env)?,
                None => Value::None,
            };
            match &env.yield_sink {
                Some(sink) => {
                    sink.borrow_mut().push(value);
                    Ok(Value::None)
                }
                None => Err(Flow::classify(CaptiveError::new(ErrorKind::Internal, "yield outside of a generator function"))),
            }
        }
        Expr::YieldFrom(y) => {
            let source = eval_expr(&y.value, env)?;
            let items = iterate_value(&source, env, y.range())?;
            match &env.yield_sink {
                Some(sink) => {
                    sink.borrow_mut().extend(items);
                    Ok(Value::None)
                }
                None => Err(Flow::classify(CaptiveError::new(ErrorKind::Internal, "yield outside of a generator function"))),
            }
        }
        Expr::Await(a) => eval_expr(&a.value, env),

        other => Err(Flow::classify(CaptiveError::new(
            ErrorKind::TypeMismatch,
            format!("unsupported expression: {other:?}"),
        ))),
    }
}

fn eval_star_aware(elts: &[Expr], env: &Env) -> Result<Vec<Value>, Flow> {
    let mut out = Vec::with_capacity(elts.len());
    for elt in elts {
        if let Expr::Starred(starred) = elt {
            let value = eval_expr(&starred.value, env)?;
            out.extend(iterate_value(&value, env, starred.range())?);
        } else {
            out.push(eval_expr(elt, env)?);
        }
    }
    Ok(out)
}

fn eval_bool_op(boolop: &ast::ExprBoolOp, env: &Env) -> Result<Value, Flow> {
    let mut last = Value::None;
    for (i, value_expr) in boolop.values.iter().enumerate() {
        last = eval_expr(value_expr, env)?;
        let is_last = i + 1 == boolop.values.len();
        let short_circuits = match boolop.op {
            BoolOp::And => !last.truthy(),
            BoolOp::Or => last.truthy(),
        };
        if short_circuits && !is_last {
            return Ok(last);
        }
    }
    Ok(last)
}

fn eval_unary_op(unary: &ast::ExprUnaryOp, env: &Env) -> Result<Value, Flow> {
    let operand = eval_expr(&unary.operand, env)?;
    match unary.op {
        UnaryOp::Not => Ok(Value::Bool(!operand.truthy())),
        UnaryOp::USub => match &operand {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Bool(b) => Ok(Value::int(-i64::from(*b))),
            _ => dunder_or_type_error(&operand, "__neg__", Vec::new(), env, unary.range()),
        },
        UnaryOp::UAdd => match &operand {
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => Ok(operand),
            _ => dunder_or_type_error(&operand, "__pos__", Vec::new(), env, unary.range()),
        },
        UnaryOp::Invert => match &operand {
            Value::Int(i) => Ok(Value::Int(!i)),
            Value::Bool(b) => Ok(Value::int(!i64::from(*b))),
            _ => dunder_or_type_error(&operand, "__invert__", Vec::new(), env, unary.range()),
        },
    }
}

fn dunder_or_type_error(value: &Value, name: &str, args: Vec<Value>, env: &Env, span: TextRange) -> Result<Value, Flow> {
    match call_dunder(value, name, args, env, span) {
        Some(result) => result,
        None => Err(Flow::classify(CaptiveError::new(
            ErrorKind::TypeMismatch,
            format!("unsupported operand type for this operation: '{}'", value.type_name()),
        ))),
    }
}

fn eval_compare(cmp: &ast::ExprCompare, env: &Env) -> Result<Value, Flow> {
    let mut left = eval_expr(&cmp.left, env)?;
    let mut result = Value::Bool(true);
    for (op, comparator) in cmp.ops.iter().zip(cmp.comparators.iter()) {
        let right = eval_expr(comparator, env)?;
        result = apply_cmpop(*op, &left, &right, env, cmp.range())?;
        if !result.truthy() {
            return Ok(result);
        }
        left = right;
    }
    Ok(result)
}

/// Implements a single comparison operator, consulting `__eq__`/dunder
/// comparisons on instances before falling back to `value_eq`/`value_cmp`.
/// `spec.md` §9's "non-standard comparisons" lets `__eq__` return any value,
/// not just `bool` — so this (and therefore chained comparisons) propagates
/// whatever it returns rather than coercing to `bool`.
pub fn apply_cmpop(op: CmpOp, left: &Value, right: &Value, env: &Env, span: TextRange) -> Result<Value, Flow> {
    match op {
        CmpOp::Is => Ok(Value::Bool(value_is(left, right))),
        CmpOp::IsNot => Ok(Value::Bool(!value_is(left, right))),
        CmpOp::In | CmpOp::NotIn => {
            let found = membership(left, right, env, span)?;
            Ok(Value::Bool(if op == CmpOp::In { found } else { !found }))
        }
        CmpOp::Eq => {
            if let Some(result) = call_dunder(left, "__eq__", vec![right.clone()], env, span) {
                return result;
            }
            Ok(Value::Bool(value_eq(left, right)))
        }
        CmpOp::NotEq => {
            if let Some(result) = call_dunder(left, "__ne__", vec![right.clone()], env, span) {
                return result;
            }
            Ok(Value::Bool(!value_eq(left, right)))
        }
        CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
            let dunder = match op {
                CmpOp::Lt => "__lt__",
                CmpOp::LtE => "__le__",
                CmpOp::Gt => "__gt__",
                _ => "__ge__",
            };
            if let Some(result) = call_dunder(left, dunder, vec![right.clone()], env, span) {
                return result;
            }
            let ordering = value_cmp(left, right).ok_or_else(|| {
                Flow::classify(CaptiveError::new(
                    ErrorKind::TypeMismatch,
                    format!("'<' not supported between instances of '{}' and '{}'", left.type_name(), right.type_name()),
                ))
            })?;
            let truth = match op {
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::LtE => ordering != Ordering::Greater,
                CmpOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(truth))
        }
    }
}

fn membership(item: &Value, container: &Value, env: &Env, span: TextRange) -> Result<bool, Flow> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_str())),
            _ => Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "'in <string>' requires a string operand"))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| value_eq(v, item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| value_eq(v, item))),
        Value::Dict(dict) => Ok(hashable_key(item).is_ok_and(|k| dict.borrow().0.contains_key(&k))),
        Value::Set(items) => Ok(hashable_key(item).is_ok_and(|k| items.borrow().contains(&k))),
        Value::Instance(_) => {
            if let Some(result) = call_dunder(container, "__contains__", vec![item.clone()], env, span) {
                return Ok(result?.truthy());
            }
            Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "argument is not iterable")))
        }
        _ => Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, format!("argument of type '{}' is not iterable", container.type_name())))),
    }
}

/// Applies a binary operator, with the usual arithmetic meaning for numbers,
/// the collection-specific meanings `spec.md` §4.2 calls out (string/list/
/// tuple concatenation and repetition, dict/set union), and dunder fallback
/// for instances otherwise.
pub fn apply_binop(op: Operator, left: Value, right: Value, env: &Env, span: TextRange) -> Result<Value, Flow> {
    use Operator::{Add, BitAnd, BitOr, BitXor, Div, FloorDiv, LShift, Mod, Mult, Pow, RShift, Sub};

    match (op, &left, &right) {
        (Add, Value::Str(a), Value::Str(b)) => return Ok(Value::str(format!("{a}{b}"))),
        (Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            return Ok(Value::list(items));
        }
        (Add, Value::Tuple(a), Value::Tuple(b)) => {
            let mut items = (**a).clone();
            items.extend(b.iter().cloned());
            return Ok(Value::Tuple(Rc::new(items)));
        }
        (Mult, Value::Str(s), n) | (Mult, n, Value::Str(s)) => {
            if let Some(n) = n.as_index() {
                return Ok(Value::str(s.repeat(n.max(0) as usize)));
            }
        }
        (Mult, Value::List(items), n) | (Mult, n, Value::List(items)) => {
            if let Some(n) = n.as_index() {
                let source = items.borrow();
                let mut out = Vec::with_capacity(source.len() * n.max(0) as usize);
                for _ in 0..n.max(0) {
                    out.extend(source.iter().cloned());
                }
                return Ok(Value::list(out));
            }
        }
        (BitOr, Value::Dict(a), Value::Dict(b)) => {
            let mut merged = a.borrow().0.clone();
            for (k, v) in b.borrow().0.iter() {
                merged.insert(k.clone(), v.clone());
            }
            return Ok(Value::Dict(Rc::new(RefCell::new(Dict(merged)))));
        }
        (BitOr, Value::Set(a), Value::Set(b)) => {
            let mut out = a.borrow().clone();
            for key in b.borrow().iter() {
                if !out.contains(key) {
                    out.push(key.clone());
                }
            }
            return Ok(Value::Set(Rc::new(RefCell::new(out))));
        }
        (BitAnd, Value::Set(a), Value::Set(b)) => {
            let b = b.borrow();
            let out = a.borrow().iter().filter(|k| b.contains(k)).cloned().collect();
            return Ok(Value::Set(Rc::new(RefCell::new(out))));
        }
        _ => {}
    }

    if let (Some(a), Some(b)) = (left.as_f64_strict(), right.as_f64_strict()) {
        let _ = (a, b);
    }

    if is_numeric(&left) && is_numeric(&right) {
        return apply_numeric_binop(op, &left, &right);
    }

    let dunder = match op {
        Add => "__add__",
        Sub => "__sub__",
        Mult => "__mul__",
        Div => "__truediv__",
        FloorDiv => "__floordiv__",
        Mod => "__mod__",
        Pow => "__pow__",
        LShift => "__lshift__",
        RShift => "__rshift__",
        BitOr => "__or__",
        BitXor => "__xor__",
        BitAnd => "__and__",
        Operator::MatMult => "__matmul__",
    };
    dunder_or_type_error(&left, dunder, vec![right], env, span)
}

fn is_numeric(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Float(_) | Value::Bool(_))
}

trait AsF64Strict {
    fn as_f64_strict(&self) -> Option<f64>;
}
impl AsF64Strict for Value {
    fn as_f64_strict(&self) -> Option<f64> {
        self.as_f64()
    }
}

fn apply_numeric_binop(op: Operator, left: &Value, right: &Value) -> Result<Value, Flow> {
    use Operator::{Add, BitAnd, BitOr, BitXor, Div, FloorDiv, LShift, Mod, Mult, Pow, RShift, Sub};

    if let (Value::Int(a), Value::Int(_)) | (Value::Int(a), Value::Bool(_)) = (left, right) {
        if let Value::Bool(b) = right {
            let b = BigInt::from(i64::from(*b));
            return int_binop(op, a, &b);
        }
        if let Value::Int(b) = right {
            return int_binop(op, a, b);
        }
    }
    if let (Value::Bool(a), Value::Int(b)) = (left, right) {
        let a = BigInt::from(i64::from(*a));
        return int_binop(op, &a, b);
    }
    if let (Value::Bool(a), Value::Bool(b)) = (left, right) {
        let a = BigInt::from(i64::from(*a));
        let b = BigInt::from(i64::from(*b));
        return int_binop(op, &a, &b);
    }

    let a = left.as_f64().expect("numeric");
    let b = right.as_f64().expect("numeric");
    let result = match op {
        Add => a + b,
        Sub => a - b,
        Mult => a * b,
        Div => {
            if b == 0.0 {
                return Err(Flow::raise(Value::Exception(Rc::new(crate::value::ExceptionValue::new(
                    "ZeroDivisionError",
                    "division by zero",
                )))));
            }
            a / b
        }
        FloorDiv => (a / b).floor(),
        Mod => a.rem_euclid(b),
        Pow => a.powf(b),
        BitOr | BitXor | BitAnd | LShift | RShift => {
            return Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "bitwise operators require integer operands")));
        }
        Operator::MatMult => {
            return Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "@ is not supported between float operands")));
        }
    };
    Ok(Value::Float(result))
}

fn int_binop(op: Operator, a: &BigInt, b: &BigInt) -> Result<Value, Flow> {
    use Operator::{Add, BitAnd, BitOr, BitXor, Div, FloorDiv, LShift, Mod, Mult, Pow, RShift, Sub};
    match op {
        Add => Ok(Value::Int(a + b)),
        Sub => Ok(Value::Int(a - b)),
        Mult => Ok(Value::Int(a * b)),
        Div => {
            if b.is_zero() {
                return Err(Flow::raise(Value::Exception(Rc::new(crate::value::ExceptionValue::new(
                    "ZeroDivisionError",
                    "division by zero",
                )))));
            }
            Ok(Value::Float(a.to_f64().unwrap_or(0.0) / b.to_f64().unwrap_or(1.0)))
        }
        FloorDiv => {
            if b.is_zero() {
                return Err(Flow::raise(Value::Exception(Rc::new(crate::value::ExceptionValue::new(
                    "ZeroDivisionError",
                    "integer division or modulo by zero",
                )))));
            }
            Ok(Value::Int(a.div_euclid(b)))
        }
        Mod => {
            if b.is_zero() {
                return Err(Flow::raise(Value::Exception(Rc::new(crate::value::ExceptionValue::new(
                    "ZeroDivisionError",
                    "integer division or modulo by zero",
                )))));
            }
            Ok(Value::Int(a.mod_euclid(b)))
        }
        Pow => match b.to_u32() {
            Some(exp) if !b.is_negative() => Ok(Value::Int(a.pow(exp))),
            _ => Ok(Value::Float(a.to_f64().unwrap_or(0.0).powf(b.to_f64().unwrap_or(0.0)))),
        },
        LShift => Ok(Value::Int(a << b.to_u32().unwrap_or(0))),
        RShift => Ok(Value::Int(a >> b.to_u32().unwrap_or(0))),
        BitOr => Ok(Value::Int(a | b)),
        BitXor => Ok(Value::Int(a ^ b)),
        BitAnd => Ok(Value::Int(a & b)),
        Operator::MatMult => Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "@ is not supported between int operands"))),
    }
}

trait BigIntEuclid {
    fn div_euclid(&self, rhs: &BigInt) -> BigInt;
    fn mod_euclid(&self, rhs: &BigInt) -> BigInt;
}
impl BigIntEuclid for BigInt {
    fn div_euclid(&self, rhs: &BigInt) -> BigInt {
        let (q, r) = num_integer::Integer::div_mod_floor(self, rhs);
        let _ = r;
        q
    }
    fn mod_euclid(&self, rhs: &BigInt) -> BigInt {
        num_integer::Integer::mod_floor(self, rhs)
    }
}

pub(crate) fn hashable_key(value: &Value) -> Result<Key, Flow> {
    Key::from_value(value).ok_or_else(|| {
        Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, format!("unhashable type: '{}'", value.type_name())))
    })
}

/// Materializes any iterable into a `Vec<Value>` eagerly — the same
/// simplification generators use (see `GeneratorState`'s doc comment).
pub fn iterate_value(value: &Value, env: &Env, span: TextRange) -> Result<Vec<Value>, Flow> {
    match value {
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Tuple(items) => Ok((**items).clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
        Value::Bytes(b) => Ok(b.iter().map(|byte| Value::int(i64::from(*byte))).collect()),
        Value::Set(items) => Ok(items.borrow().iter().cloned().map(Key::into_value).collect()),
        Value::Dict(dict) => Ok(dict.borrow().0.keys().cloned().map(Key::into_value).collect()),
        Value::Generator(state) => {
            let mut state = state.borrow_mut();
            let items = state.items.get_or_insert_with(Vec::new).clone();
            state.cursor = items.len();
            Ok(items)
        }
        Value::Instance(_) => {
            if let Some(result) = call_dunder(value, "__iter__", Vec::new(), env, span) {
                return iterate_value(&result?, env, span);
            }
            Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, format!("'{}' object is not iterable", value.type_name()))))
        }
        other => Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, format!("'{}' object is not iterable", other.type_name())))),
    }
}

fn eval_comprehension(elt: &Expr, key_for_dict: Option<&Expr>, generators: &[ast::Comprehension], env: &Env) -> Result<Vec<Value>, Flow> {
    let _ = key_for_dict;
    let mut results = Vec::new();
    comprehension_recurse(elt, generators, 0, env, &mut results)?;
    Ok(results)
}

fn comprehension_recurse(elt: &Expr, generators: &[ast::Comprehension], index: usize, env: &Env, out: &mut Vec<Value>) -> Result<(), Flow> {
    let Some(gen) = generators.get(index) else {
        out.push(eval_expr(elt, env)?);
        return Ok(());
    };
    let iterable = eval_expr(&gen.iter, env)?;
    let items = iterate_value(&iterable, env, gen.range())?;
    for item in items {
        statements::bind_target(&gen.target, item, env)?;
        let mut passes = true;
        for cond in &gen.ifs {
            if !eval_expr(cond, env)?.truthy() {
                passes = false;
                break;
            }
        }
        if passes {
            comprehension_recurse(elt, generators, index + 1, env, out)?;
        }
    }
    Ok(())
}

fn eval_dict_comprehension(key: &Expr, value: &Expr, generators: &[ast::Comprehension], env: &Env) -> Result<Vec<(Value, Value)>, Flow> {
    let mut results = Vec::new();
    dict_comprehension_recurse(key, value, generators, 0, env, &mut results)?;
    Ok(results)
}

fn dict_comprehension_recurse(
    key: &Expr,
    value: &Expr,
    generators: &[ast::Comprehension],
    index: usize,
    env: &Env,
    out: &mut Vec<(Value, Value)>,
) -> Result<(), Flow> {
    let Some(gen) = generators.get(index) else {
        out.push((eval_expr(key, env)?, eval_expr(value, env)?));
        return Ok(());
    };
    let iterable = eval_expr(&gen.iter, env)?;
    let items = iterate_value(&iterable, env, gen.range())?;
    for item in items {
        statements::bind_target(&gen.target, item, env)?;
        let mut passes = true;
        for cond in &gen.ifs {
            if !eval_expr(cond, env)?.truthy() {
                passes = false;
                break;
            }
        }
        if passes {
            dict_comprehension_recurse(key, value, generators, index + 1, env, out)?;
        }
    }
    Ok(())
}

fn eval_fstring(fstring: &ast::ExprFString, env: &Env) -> Result<String, Flow> {
    let mut out = String::new();
    for part in fstring.value.iter() {
        match part {
            ast::FStringPart::Literal(lit) => out.push_str(&lit),
            ast::FStringPart::FString(f) => {
                for element in f.elements.iter() {
                    match element {
                        ast::InterpolatedStringElement::Literal(lit) => out.push_str(&lit.value),
                        ast::InterpolatedStringElement::Interpolation(expr_elem) => {
                            let value = eval_expr(&expr_elem.expression, env)?;
                            let rendered = match expr_elem.conversion {
                                ast::ConversionFlag::Repr => repr_of(&value),
                                ast::ConversionFlag::Ascii => repr_of(&value),
                                _ => str_of(&value),
                            };
                            out.push_str(&rendered);
                        }
                    }
                }
            }
        }
    }
    Ok(out)
}

fn eval_call(call: &ast::ExprCall, env: &Env) -> Result<Value, Flow> {
    let mut positional = Vec::new();
    let mut keyword = HashMap::new();
    for arg in call.arguments.args.iter() {
        if let Expr::Starred(starred) = arg {
            let value = eval_expr(&starred.value, env)?;
            positional.extend(iterate_value(&value, env, starred.range())?);
        } else {
            positional.push(eval_expr(arg, env)?);
        }
    }
    for kw in call.arguments.keywords.iter() {
        let value = eval_expr(&kw.value, env)?;
        match &kw.arg {
            Some(name) => {
                keyword.insert(name.as_str().to_string(), value);
            }
            None => {
                if let Value::Dict(dict) = value {
                    for (k, v) in dict.borrow().0.iter() {
                        if let Key::Str(name) = k {
                            keyword.insert((**name).clone(), v.clone());
                        }
                    }
                }
            }
        }
    }

    // Method-style call: `obj.method(...)` binds `obj` as the receiver
    // without a separate attribute-then-call dispatch, matching how bound
    // methods resolve on instances (`spec.md` §4.4).
    if let Expr::Attribute(attr) = call.func.as_ref() {
        let receiver = eval_expr(&attr.value, env)?;
        let method_name = attr.attr.as_str();
        if let Value::Module(module) = &receiver {
            let callee = module.get_attr(method_name, &env.authorized_imports).map_err(Flow::classify)?;
            return call_value(callee, positional, keyword, env, call.range());
        }
        if let Value::SuperProxy(self_value, class) = &receiver {
            let method = class.find_method(method_name).ok_or_else(|| {
                Flow::classify(CaptiveError::new(ErrorKind::AttributeMissing, format!("'super' object has no attribute '{method_name}'")))
            })?;
            return call_function(&method, Some((**self_value).clone()), positional, keyword, env, call.range());
        }
        if let Some(result) = crate::methods::call_builtin_method(&receiver, method_name, positional.clone(), env, call.range()) {
            return result;
        }
        let callee = get_attribute(&receiver, method_name, env, attr.range())?;
        return call_value(callee, positional, keyword, env, call.range());
    }

    // `super()` with no arguments: `spec.md` §4.4 only supports the
    // zero-argument form, resolved from the enclosing method's class and
    // bound `self`.
    if let Expr::Name(name) = call.func.as_ref() {
        if name.id.as_str() == "super" && positional.is_empty() && keyword.is_empty() {
            return resolve_super(env, call.range());
        }
    }

    let callee = eval_expr(&call.func, env)?;
    call_value(callee, positional, keyword, env, call.range())
}

fn resolve_super(env: &Env, span: TextRange) -> Result<Value, Flow> {
    let self_value = env.resolve("self").map_err(Flow::classify)?;
    let class = match &self_value {
        Value::Instance(instance) => instance.borrow().class.clone(),
        _ => return Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "super() used outside of an instance method"))),
    };
    let base = class.base.clone().ok_or_else(|| {
        Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "super() called on a class with no base class").with_span_if_missing(span))
    })?;
    Ok(Value::SuperProxy(Box::new(self_value), base))
}

/// Invokes any callable `Value`: a host capability, a user function or
/// bound method, or a class (construction).
pub fn call_value(callee: Value, positional: Vec<Value>, keyword: HashMap<String, Value>, env: &Env, span: TextRange) -> Result<Value, Flow> {
    match callee {
        Value::HostFn(host) => (host.func)(positional, keyword),
        Value::Function(func) => call_function(&func, None, positional, keyword, env, span),
        Value::BoundMethod(self_value, func) => call_function(&func, Some(*self_value), positional, keyword, env, span),
        Value::Class(class) => instantiate(&class, positional, keyword, env, span),
        other => {
            if let Some(result) = call_dunder(&other, "__call__", positional, env, span) {
                result
            } else {
                Err(Flow::classify(CaptiveError::new(ErrorKind::NotCallable, format!("'{}' object is not callable", other.type_name())).with_span_if_missing(span)))
            }
        }
    }
}

fn eval_attribute_get(attr: &ast::ExprAttribute, env: &Env) -> Result<Value, Flow> {
    let receiver = eval_expr(&attr.value, env)?;
    get_attribute(&receiver, attr.attr.as_str(), env, attr.range())
}

pub fn get_attribute(receiver: &Value, name: &str, env: &Env, span: TextRange) -> Result<Value, Flow> {
    match receiver {
        Value::Module(module) => module.get_attr(name, &env.authorized_imports).map_err(Flow::classify),
        Value::Instance(instance) => {
            let borrow = instance.borrow();
            resolve_attribute(receiver, &borrow.class, &borrow.attrs, name).ok_or_else(|| {
                Flow::classify(
                    CaptiveError::new(ErrorKind::AttributeMissing, format!("'{}' object has no attribute '{name}'", borrow.class.name))
                        .with_span_if_missing(span),
                )
            })
        }
        Value::SuperProxy(self_value, class) => {
            let method = class.find_method(name).ok_or_else(|| {
                Flow::classify(CaptiveError::new(ErrorKind::AttributeMissing, format!("'super' object has no attribute '{name}'")))
            })?;
            Ok(Value::BoundMethod(self_value.clone(), method))
        }
        Value::Class(class) => {
            if name == "__name__" {
                return Ok(Value::str(class.name.clone()));
            }
            class.find_class_var(name).or_else(|| class.find_method(name).map(Value::Function)).ok_or_else(|| {
                Flow::classify(CaptiveError::new(ErrorKind::AttributeMissing, format!("type object '{}' has no attribute '{name}'", class.name)))
            })
        }
        Value::Function(func) if name == "__name__" => Ok(Value::str(func.name.clone())),
        Value::Exception(exc) => match name {
            "args" => Ok(Value::Tuple(Rc::new(exc.args.clone()))),
            _ => Err(Flow::classify(CaptiveError::new(ErrorKind::AttributeMissing, format!("'{}' object has no attribute '{name}'", exc.class_name)))),
        },
        _ => Err(Flow::classify(CaptiveError::new(ErrorKind::AttributeMissing, format!("'{}' object has no attribute '{name}'", receiver.type_name())))),
    }
}

fn eval_subscript(sub: &ast::ExprSubscript, env: &Env) -> Result<Value, Flow> {
    let receiver = eval_expr(&sub.value, env)?;
    if let Expr::Slice(slice) = sub.slice.as_ref() {
        return get_slice(&receiver, slice, env);
    }
    let index = eval_expr(&sub.slice, env)?;
    get_item(&receiver, &index, env, sub.range())
}

pub fn get_item(receiver: &Value, index: &Value, env: &Env, span: TextRange) -> Result<Value, Flow> {
    match receiver {
        Value::List(items) => {
            let items = items.borrow();
            let i = normalize_index(index, items.len(), span)?;
            items.get(i).cloned().ok_or_else(|| index_out_of_range(span))
        }
        Value::Tuple(items) => {
            let i = normalize_index(index, items.len(), span)?;
            items.get(i).cloned().ok_or_else(|| index_out_of_range(span))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(index, chars.len(), span)?;
            chars.get(i).map(|c| Value::str(c.to_string())).ok_or_else(|| index_out_of_range(span))
        }
        Value::Bytes(b) => {
            let i = normalize_index(index, b.len(), span)?;
            b.get(i).map(|byte| Value::int(i64::from(*byte))).ok_or_else(|| index_out_of_range(span))
        }
        Value::Dict(dict) => {
            let key = hashable_key(index)?;
            dict.borrow().0.get(&key).cloned().ok_or_else(|| key_missing(index))
        }
        Value::Instance(_) => call_dunder(receiver, "__getitem__", vec![index.clone()], env, span).unwrap_or_else(|| {
            Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, format!("'{}' object is not subscriptable", receiver.type_name()))))
        }),
        other => Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, format!("'{}' object is not subscriptable", other.type_name())))),
    }
}

pub(crate) fn index_out_of_range(span: TextRange) -> Flow {
    Flow::classify(CaptiveError::new(ErrorKind::IndexOutOfRange, "index out of range").with_span_if_missing(span))
}

pub(crate) fn key_missing(key: &Value) -> Flow {
    Flow::raise(Value::Exception(Rc::new(crate::value::ExceptionValue::new("KeyError", repr_of(key)))))
}

pub(crate) fn normalize_index(index: &Value, len: usize, span: TextRange) -> Result<usize, Flow> {
    let i = index.as_index().ok_or_else(|| {
        Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "indices must be integers").with_span_if_missing(span))
    })?;
    Ok(if i < 0 { (i + len as i64).max(0) as usize } else { i as usize })
}

fn get_slice(receiver: &Value, slice: &ast::ExprSlice, env: &Env) -> Result<Value, Flow> {
    let bound = |e: &Option<Box<Expr>>| -> Result<Option<i64>, Flow> {
        match e {
            Some(expr) => Ok(eval_expr(expr, env)?.as_index()),
            None => Ok(None),
        }
    };
    let lower = bound(&slice.lower)?;
    let upper = bound(&slice.upper)?;
    let step = bound(&slice.step)?.unwrap_or(1);
    if step == 0 {
        return Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "slice step cannot be zero")));
    }

    match receiver {
        Value::List(items) => Ok(Value::list(slice_values(&items.borrow(), lower, upper, step))),
        Value::Tuple(items) => Ok(Value::Tuple(Rc::new(slice_values(items, lower, upper, step)))),
        Value::Str(s) => {
            let chars: Vec<Value> = s.chars().map(|c| Value::str(c.to_string())).collect();
            let sliced = slice_values(&chars, lower, upper, step);
            let joined: String = sliced.into_iter().map(|v| str_of(&v)).collect();
            Ok(Value::str(joined))
        }
        other => Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, format!("'{}' object is not sliceable", other.type_name())))),
    }
}

fn slice_values(items: &[Value], lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<Value> {
    let len = items.len() as i64;
    let clamp = |i: i64| -> i64 { i.clamp(0, len) };
    let resolve = |v: Option<i64>, default: i64| -> i64 {
        match v {
            Some(i) if i < 0 => clamp(i + len),
            Some(i) => clamp(i),
            None => default,
        }
    };

    let mut out = Vec::new();
    if step > 0 {
        let start = resolve(lower, 0);
        let end = resolve(upper, len);
        let mut i = start;
        while i < end {
            out.push(items[i as usize].clone());
            i += step;
        }
    } else {
        let start = resolve(lower, len - 1);
        let end = resolve(upper, -1);
        let mut i = start.min(len - 1);
        while i > end && i >= 0 {
            out.push(items[i as usize].clone());
            i += step;
        }
    }
    out
}

pub fn set_item(receiver: &Value, index: &Value, value: Value, env: &Env, span: TextRange) -> Result<(), Flow> {
    match receiver {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(index, items.len(), span)?;
            if i >= items.len() {
                return Err(index_out_of_range(span));
            }
            items[i] = value;
            Ok(())
        }
        Value::Dict(dict) => {
            let key = hashable_key(index)?;
            dict.borrow_mut().0.insert(key, value);
            Ok(())
        }
        Value::Instance(_) => call_dunder(receiver, "__setitem__", vec![index.clone(), value], env, span)
            .unwrap_or_else(|| Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "object does not support item assignment"))))
            .map(|_| ()),
        other => Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, format!("'{}' object does not support item assignment", other.type_name())))),
    }
}

pub fn delete_item(receiver: &Value, index: &Value, env: &Env, span: TextRange) -> Result<(), Flow> {
    match receiver {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(index, items.len(), span)?;
            if i >= items.len() {
                return Err(index_out_of_range(span));
            }
            items.remove(i);
            Ok(())
        }
        Value::Dict(dict) => {
            let key = hashable_key(index)?;
            dict.borrow_mut().0.shift_remove(&key).ok_or_else(|| key_missing(index))?;
            Ok(())
        }
        Value::Instance(_) => call_dunder(receiver, "__delitem__", vec![index.clone()], env, span)
            .unwrap_or_else(|| Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "object does not support item deletion"))))
            .map(|_| ()),
        other => Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, format!("'{}' object does not support item deletion", other.type_name())))),
    }
}

/// `str(value)`: the human-facing rendering (`spec.md` §4.2, §6).
pub fn str_of(value: &Value) -> String {
    match value {
        Value::Str(s) => (**s).clone(),
        // A plain-data instance (no `__str__`) built from `ClassName(args...)`
        // — builtin exception markers and any `class C: pass` alike — renders
        // its first constructor argument, matching `str(exc)` on a
        // no-custom-`__init__` exception instance.
        Value::Instance(instance) => match instance.borrow().attrs.get("args") {
            Some(Value::Tuple(args)) if args.len() == 1 => str_of(&args[0]),
            _ => repr_of(value),
        },
        Value::Exception(exc) => exc.message(),
        _ => repr_of(value),
    }
}

/// `repr(value)`: the unambiguous, round-trippable-looking rendering used by
/// containers and the default `Debug` impl on `Value`.
pub fn repr_of(value: &Value) -> String {
    match value {
        Value::None => "None".to_string(),
        Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Value::Bytes(b) => format!("b'{}'", String::from_utf8_lossy(b)),
        Value::List(items) => format!("[{}]", items.borrow().iter().map(repr_of).collect::<Vec<_>>().join(", ")),
        Value::Tuple(items) => {
            if items.len() == 1 {
                format!("({},)", repr_of(&items[0]))
            } else {
                format!("({})", items.iter().map(repr_of).collect::<Vec<_>>().join(", "))
            }
        }
        Value::Dict(dict) => {
            let entries = dict.borrow().0.iter().map(|(k, v)| format!("{}: {}", repr_of(&k.clone().into_value()), repr_of(v))).collect::<Vec<_>>();
            format!("{{{}}}", entries.join(", "))
        }
        Value::Set(items) => {
            if items.borrow().is_empty() {
                "set()".to_string()
            } else {
                format!("{{{}}}", items.borrow().iter().map(|k| repr_of(&k.clone().into_value())).collect::<Vec<_>>().join(", "))
            }
        }
        Value::HostFn(host) => format!("<built-in function {}>", host.name),
        Value::Function(func) => format!("<function {} at 0x{:012x}>", func.name, Rc::as_ptr(func) as usize),
        Value::BoundMethod(_, func) => format!("<bound method {}>", func.name),
        Value::Class(class) => format!("<class '{}'>", class.name),
        Value::Instance(instance) => format!("<{} object>", instance.borrow().class.name),
        Value::SuperProxy(..) => "<super object>".to_string(),
        Value::Module(module) => format!("<module '{}'>", module.dotted_path),
        Value::Generator(_) => "<generator object>".to_string(),
        Value::Exception(exc) => format!("{}({})", exc.class_name, repr_of(exc.args.first().unwrap_or(&Value::None))),
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}
