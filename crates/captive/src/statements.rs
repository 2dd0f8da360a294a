//! Statement evaluation (`spec.md` §4.3): assignment, control flow, `del`,
//! `with`, `try`/`except`/`finally`, `raise`, `assert`, `import`, and
//! function/class definitions.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use ruff_python_ast::{self as ast, Expr, Operator, Stmt};
use ruff_text_size::{Ranged, TextRange};

use crate::{
    class::{call_dunder, instantiate, UserClass},
    environment::{Env, Frame},
    error::{CaptiveError, ErrorKind},
    expressions::{apply_binop, call_value, delete_item, eval_expr, get_attribute, iterate_value, repr_of, set_item, str_of},
    function::{ParamDescriptor, UserFunction},
    sandbox,
    signal::Flow,
    value::Value,
};

pub fn exec_block(stmts: &[Stmt], env: &Env) -> Result<(), Flow> {
    for stmt in stmts {
        exec_stmt(stmt, env)?;
    }
    Ok(())
}

fn exec_stmt(stmt: &Stmt, env: &Env) -> Result<(), Flow> {
    env.bump_operations();
    exec_stmt_impl(stmt, env).map_err(|flow| flow.with_span_if_missing(stmt.range()))
}

fn exec_stmt_impl(stmt: &Stmt, env: &Env) -> Result<(), Flow> {
    match stmt {
        Stmt::Expr(e) => {
            eval_expr(&e.value, env)?;
            Ok(())
        }
        Stmt::Pass(_) => Ok(()),
        Stmt::Break(_) => Err(Flow::Break),
        Stmt::Continue(_) => Err(Flow::Continue),
        Stmt::Return(ret) => {
            let value = match &ret.value {
                Some(expr) => eval_expr(expr, env)?,
                None => Value::None,
            };
            Err(Flow::Return(value))
        }

        Stmt::Assign(assign) => exec_assign(assign, env),
        Stmt::AugAssign(aug) => exec_aug_assign(aug, env),
        Stmt::AnnAssign(ann) => exec_ann_assign(ann, env),

        Stmt::If(if_stmt) => exec_if(if_stmt, env),
        Stmt::While(while_stmt) => exec_while(while_stmt, env),
        Stmt::For(for_stmt) => exec_for(for_stmt, env),
        Stmt::With(with_stmt) => exec_with(with_stmt, env),
        Stmt::Try(try_stmt) => exec_try(try_stmt, env),
        Stmt::Raise(raise_stmt) => exec_raise(raise_stmt, env),
        Stmt::Assert(assert_stmt) => exec_assert(assert_stmt, env),
        Stmt::Delete(del) => exec_delete(del, env),

        Stmt::Import(import) => exec_import(import, env),
        Stmt::ImportFrom(import_from) => exec_import_from(import_from, env),

        Stmt::FunctionDef(def) => exec_function_def(def, env),
        Stmt::ClassDef(def) => exec_class_def(def, env),

        Stmt::Global(_) | Stmt::Nonlocal(_) | Stmt::TypeAlias(_) => Ok(()),

        other => Err(Flow::classify(CaptiveError::new(
            ErrorKind::TypeMismatch,
            format!("unsupported statement: {other:?}"),
        ))),
    }
}

// --- Assignment -------------------------------------------------------

fn exec_assign(assign: &ast::StmtAssign, env: &Env) -> Result<(), Flow> {
    let value = eval_expr(&assign.value, env)?;
    for target in &assign.targets {
        bind_target(target, value.clone(), env)?;
    }
    Ok(())
}

/// Binds `value` to `target`, an assignment-target expression: a name, a
/// `Tuple`/`List` destructuring pattern (with at most one starred element),
/// an attribute, or a subscript. Shared by plain assignment, `for` loop
/// targets, `with ... as` targets, and comprehension targets.
pub fn bind_target(target: &Expr, value: Value, env: &Env) -> Result<(), Flow> {
    match target {
        Expr::Name(name) => env.assign(name.id.as_str(), value).map_err(Flow::classify),
        Expr::Attribute(attr) => {
            let receiver = eval_expr(&attr.value, env)?;
            set_attribute(&receiver, attr.attr.as_str(), value, env, attr.range())
        }
        Expr::Subscript(sub) => {
            let receiver = eval_expr(&sub.value, env)?;
            let index = eval_expr(&sub.slice, env)?;
            set_item(&receiver, &index, value, env, sub.range())
        }
        Expr::Tuple(tuple) => destructure(&tuple.elts, value, env, tuple.range()),
        Expr::List(list) => destructure(&list.elts, value, env, list.range()),
        Expr::Starred(starred) => bind_target(&starred.value, value, env),
        other => Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, format!("invalid assignment target: {other:?}")))),
    }
}

fn destructure(targets: &[Expr], value: Value, env: &Env, span: TextRange) -> Result<(), Flow> {
    let items = iterate_value(&value, env, span)?;
    let starred_index = targets.iter().position(|t| matches!(t, Expr::Starred(_)));

    match starred_index {
        None => {
            if items.len() != targets.len() {
                return Err(Flow::classify(CaptiveError::new(
                    ErrorKind::TypeMismatch,
                    format!("cannot unpack {} values into {} targets", items.len(), targets.len()),
                )));
            }
            for (target, item) in targets.iter().zip(items) {
                bind_target(target, item, env)?;
            }
        }
        Some(star_at) => {
            let before = star_at;
            let after = targets.len() - star_at - 1;
            if items.len() < before + after {
                return Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "not enough values to unpack")));
            }
            for (target, item) in targets[..before].iter().zip(items.iter()) {
                bind_target(target, item.clone(), env)?;
            }
            let middle: Vec<Value> = items[before..items.len() - after].to_vec();
            bind_target(&targets[star_at], Value::list(middle), env)?;
            for (target, item) in targets[star_at + 1..].iter().zip(items[items.len() - after..].iter()) {
                bind_target(target, item.clone(), env)?;
            }
        }
    }
    Ok(())
}

pub fn set_attribute(receiver: &Value, name: &str, value: Value, env: &Env, span: TextRange) -> Result<(), Flow> {
    match receiver {
        Value::Instance(instance) => {
            if let Some(result) = call_dunder(receiver, "__setattr__", vec![Value::str(name), value.clone()], env, span) {
                result?;
                return Ok(());
            }
            instance.borrow_mut().attrs.insert(name.to_string(), value);
            Ok(())
        }
        Value::Class(class) => {
            class.class_vars.borrow_mut().insert(name.to_string(), value);
            Ok(())
        }
        other => Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, format!("'{}' object has no attribute '{name}'", other.type_name())))),
    }
}

/// Evaluates the target's container/key/receiver exactly once (source order:
/// target first, then the RHS) and writes back through that same handle,
/// rather than re-running `eval_expr`/`bind_target` on the raw target AST —
/// `d[k()] += 1` must call `k()` once, not twice (`spec.md` §5).
fn exec_aug_assign(aug: &ast::StmtAugAssign, env: &Env) -> Result<(), Flow> {
    match &*aug.target {
        Expr::Name(name) => {
            let current = env.resolve(name.id.as_str()).map_err(Flow::classify)?;
            let rhs = eval_expr(&aug.value, env)?;
            let updated = combine_aug(aug.op, current, rhs, env, aug.range())?;
            env.assign(name.id.as_str(), updated).map_err(Flow::classify)
        }
        Expr::Attribute(attr) => {
            let receiver = eval_expr(&attr.value, env)?;
            let current = get_attribute(&receiver, attr.attr.as_str(), env, attr.range())?;
            let rhs = eval_expr(&aug.value, env)?;
            let updated = combine_aug(aug.op, current, rhs, env, aug.range())?;
            set_attribute(&receiver, attr.attr.as_str(), updated, env, attr.range())
        }
        Expr::Subscript(sub) => {
            let receiver = eval_expr(&sub.value, env)?;
            let index = eval_expr(&sub.slice, env)?;
            let current = crate::expressions::get_item(&receiver, &index, env, sub.range())?;
            let rhs = eval_expr(&aug.value, env)?;
            let updated = combine_aug(aug.op, current, rhs, env, aug.range())?;
            set_item(&receiver, &index, updated, env, sub.range())
        }
        other => Err(Flow::classify(CaptiveError::new(
            ErrorKind::TypeMismatch,
            format!("invalid augmented assignment target: {other:?}"),
        ))),
    }
}

fn combine_aug(op: Operator, current: Value, rhs: Value, env: &Env, span: TextRange) -> Result<Value, Flow> {
    if let Value::Instance(_) = &current {
        let dunder = iadd_dunder(op);
        if let Some(result) = call_dunder(&current, dunder, vec![rhs.clone()], env, span) {
            return result;
        }
    }
    apply_binop(op, current, rhs, env, span)
}

fn iadd_dunder(op: Operator) -> &'static str {
    match op {
        Operator::Add => "__iadd__",
        Operator::Sub => "__isub__",
        Operator::Mult => "__imul__",
        Operator::Div => "__itruediv__",
        Operator::FloorDiv => "__ifloordiv__",
        Operator::Mod => "__imod__",
        Operator::Pow => "__ipow__",
        Operator::LShift => "__ilshift__",
        Operator::RShift => "__irshift__",
        Operator::BitOr => "__ior__",
        Operator::BitXor => "__ixor__",
        Operator::BitAnd => "__iand__",
        Operator::MatMult => "__imatmul__",
    }
}

fn exec_ann_assign(ann: &ast::StmtAnnAssign, env: &Env) -> Result<(), Flow> {
    match &ann.value {
        Some(value_expr) => {
            let value = eval_expr(value_expr, env)?;
            bind_target(&ann.target, value, env)
        }
        // A bare annotation (`x: int`) has no assignment effect.
        None => Ok(()),
    }
}

// --- Control flow -------------------------------------------------------

fn exec_if(if_stmt: &ast::StmtIf, env: &Env) -> Result<(), Flow> {
    if eval_expr(&if_stmt.test, env)?.truthy() {
        return exec_block(&if_stmt.body, env);
    }
    for clause in &if_stmt.elif_else_clauses {
        let matched = match &clause.test {
            Some(test) => eval_expr(test, env)?.truthy(),
            None => true,
        };
        if matched {
            return exec_block(&clause.body, env);
        }
    }
    Ok(())
}

fn exec_while(while_stmt: &ast::StmtWhile, env: &Env) -> Result<(), Flow> {
    let mut iterations: u64 = 0;
    while eval_expr(&while_stmt.test, env)?.truthy() {
        iterations += 1;
        if iterations > env.max_while_iterations {
            return Err(Flow::classify(
                CaptiveError::new(ErrorKind::IterationLimitExceeded, "iterations in While loop exceeded").with_span_if_missing(while_stmt.range()),
            ));
        }
        match exec_block(&while_stmt.body, env) {
            Ok(()) => {}
            Err(Flow::Break) => return Ok(()),
            Err(Flow::Continue) => continue,
            Err(other) => return Err(other),
        }
    }
    exec_block(&while_stmt.orelse, env)
}

fn exec_for(for_stmt: &ast::StmtFor, env: &Env) -> Result<(), Flow> {
    let iterable = eval_expr(&for_stmt.iter, env)?;
    let items = iterate_value(&iterable, env, for_stmt.range())?;

    let mut iterations: u64 = 0;
    for item in items {
        iterations += 1;
        if iterations > env.max_while_iterations {
            return Err(Flow::classify(
                CaptiveError::new(ErrorKind::IterationLimitExceeded, "iterations in For loop exceeded").with_span_if_missing(for_stmt.range()),
            ));
        }
        bind_target(&for_stmt.target, item, env)?;
        match exec_block(&for_stmt.body, env) {
            Ok(()) => {}
            Err(Flow::Break) => return Ok(()),
            Err(Flow::Continue) => continue,
            Err(other) => return Err(other),
        }
    }
    exec_block(&for_stmt.orelse, env)
}

fn exec_with(with_stmt: &ast::StmtWith, env: &Env) -> Result<(), Flow> {
    exec_with_items(&with_stmt.items, &with_stmt.body, env, with_stmt.range())
}

/// `with a, b: BODY` is `with a: with b: BODY` — each item's `__exit__` must
/// see exceptions raised after its own `__enter__`, including ones a later
/// item's `__exit__` already suppressed, so the items recurse rather than
/// loop: the innermost item's block is `BODY` itself, and each step out wraps
/// the previous outcome with its own `__enter__`/`__exit__` pair.
fn exec_with_items(items: &[ast::WithItem], body: &[Stmt], env: &Env, span: TextRange) -> Result<(), Flow> {
    let Some((item, rest)) = items.split_first() else {
        return exec_block(body, env);
    };
    let context = eval_expr(&item.context_expr, env)?;

    if let Some(result) = call_dunder(&context, "__enter__", Vec::new(), env, span) {
        let bound = result?;
        if let Some(target) = &item.optional_vars {
            bind_target(target, bound, env)?;
        }
    } else if let Some(target) = &item.optional_vars {
        bind_target(target, context.clone(), env)?;
    }

    let outcome = exec_with_items(rest, body, env, span);

    let (exc_type, exc_value) = match &outcome {
        Err(Flow::Raise(value, _)) => (Value::str(value.type_name()), value.clone()),
        _ => (Value::None, Value::None),
    };
    let suppress = match call_dunder(&context, "__exit__", vec![exc_type, exc_value, Value::None], env, span) {
        Some(result) => result?.truthy(),
        None => false,
    };

    match outcome {
        Err(Flow::Raise(_, _)) if suppress => Ok(()),
        other => other,
    }
}

fn exec_try(try_stmt: &ast::StmtTry, env: &Env) -> Result<(), Flow> {
    let outcome = exec_block(&try_stmt.body, env);

    let result = match outcome {
        Err(Flow::Raise(exc_value, span)) => {
            let mut handled = None;
            for handler in &try_stmt.handlers {
                let ast::ExceptHandler::ExceptHandler(handler) = handler;
                let matches = match &handler.type_ {
                    Some(type_expr) => {
                        let target = eval_expr(type_expr, env)?;
                        exception_matches(&exc_value, &target)?
                    }
                    None => true,
                };
                if matches {
                    let handler_env = env.with_current_exception(exc_value.clone());
                    if let Some(name) = &handler.name {
                        handler_env.assign(name.as_str(), exc_value.clone()).map_err(Flow::classify)?;
                    }
                    handled = Some(exec_block(&handler.body, &handler_env));
                    break;
                }
            }
            match handled {
                Some(result) => result,
                None => Err(Flow::Raise(exc_value, span)),
            }
        }
        Err(Flow::Break | Flow::Continue | Flow::Return(_)) => outcome,
        Ok(()) => exec_block(&try_stmt.orelse, env),
        other => other,
    };

    let finally_outcome = exec_block(&try_stmt.finalbody, env);
    match finally_outcome {
        Ok(()) => result,
        finally_flow => finally_flow,
    }
}

/// Matches an in-flight exception `value` against an `except` clause's
/// evaluated type expression, which may itself be a tuple of types
/// (`except (TypeError, ValueError):`).
fn exception_matches(value: &Value, target: &Value) -> Result<bool, Flow> {
    if let Value::Tuple(targets) = target {
        for t in targets.iter() {
            if exception_matches(value, t)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }
    let Value::Class(target_class) = target else {
        return Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "except clause must name an exception class")));
    };
    Ok(match value {
        Value::Instance(instance) => instance.borrow().class.is_subclass_of(target_class),
        Value::Exception(exc) => crate::builtins::builtin_exception_is_a(&exc.class_name, &target_class.name),
        _ => false,
    })
}

fn exec_raise(raise_stmt: &ast::StmtRaise, env: &Env) -> Result<(), Flow> {
    match &raise_stmt.exc {
        Some(exc_expr) => {
            let value = eval_expr(exc_expr, env)?;
            let raised = match value {
                // `raise SomeClass` with no call: construct with no arguments.
                Value::Class(class) => instantiate(&class, Vec::new(), HashMap::new(), env, raise_stmt.range())?,
                other => other,
            };
            Err(Flow::raise(raised))
        }
        None => match &env.current_exception {
            Some(current) => Err(Flow::raise(current.clone())),
            None => Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "no active exception to re-raise"))),
        },
    }
}

fn exec_assert(assert_stmt: &ast::StmtAssert, env: &Env) -> Result<(), Flow> {
    if eval_expr(&assert_stmt.test, env)?.truthy() {
        return Ok(());
    }
    let message = match &assert_stmt.msg {
        Some(msg_expr) => str_of(&eval_expr(msg_expr, env)?),
        None => render_source(&assert_stmt.test),
    };
    Err(Flow::classify(
        CaptiveError::new(ErrorKind::AssertionFailed, message).with_span_if_missing(assert_stmt.range()),
    ))
}

fn exec_delete(del: &ast::StmtDelete, env: &Env) -> Result<(), Flow> {
    for target in &del.targets {
        match target {
            Expr::Name(name) => env.delete(name.id.as_str()).map_err(Flow::classify)?,
            Expr::Attribute(attr) => {
                let receiver = eval_expr(&attr.value, env)?;
                match &receiver {
                    Value::Instance(instance) => {
                        if instance.borrow_mut().attrs.remove(attr.attr.as_str()).is_none() {
                            return Err(Flow::classify(CaptiveError::new(
                                ErrorKind::AttributeMissing,
                                format!("'{}' object has no attribute '{}'", instance.borrow().class.name, attr.attr.as_str()),
                            )));
                        }
                    }
                    other => {
                        return Err(Flow::classify(CaptiveError::new(
                            ErrorKind::AttributeMissing,
                            format!("'{}' object has no attribute '{}'", other.type_name(), attr.attr.as_str()),
                        )))
                    }
                }
            }
            Expr::Subscript(sub) => {
                let receiver = eval_expr(&sub.value, env)?;
                let index = eval_expr(&sub.slice, env)?;
                delete_item(&receiver, &index, env, sub.range())?;
            }
            other => return Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, format!("invalid delete target: {other:?}")))),
        }
    }
    Ok(())
}

// --- Import -------------------------------------------------------------

fn exec_import(import: &ast::StmtImport, env: &Env) -> Result<(), Flow> {
    for alias in &import.names {
        let module_name = alias.name.as_str();
        let module = sandbox::resolve_import(module_name, &env.modules, &env.authorized_imports).map_err(Flow::classify)?;
        let binding = match &alias.asname {
            Some(asname) => asname.as_str().to_string(),
            None => module_name.split('.').next().unwrap_or(module_name).to_string(),
        };
        env.assign(&binding, module).map_err(Flow::classify)?;
    }
    Ok(())
}

fn exec_import_from(import_from: &ast::StmtImportFrom, env: &Env) -> Result<(), Flow> {
    let Some(module_name) = &import_from.module else {
        return Err(Flow::classify(CaptiveError::new(ErrorKind::ImportNotAuthorized, "relative imports are not supported")));
    };
    let module = sandbox::resolve_import(module_name.as_str(), &env.modules, &env.authorized_imports).map_err(Flow::classify)?;
    for alias in &import_from.names {
        let attr_name = alias.name.as_str();
        let value = get_attribute(&module, attr_name, env, import_from.range())?;
        let binding = alias.asname.as_ref().map_or(attr_name, |n| n.as_str());
        env.assign(binding, value).map_err(Flow::classify)?;
    }
    Ok(())
}

// --- Function / class definitions ---------------------------------------

fn exec_function_def(def: &ast::StmtFunctionDef, env: &Env) -> Result<(), Flow> {
    let func = build_function(def.name.as_str(), &def.parameters, &def.body, env)?;
    let value = apply_decorators(Value::Function(func), &def.decorator_list, env)?;
    env.assign(def.name.as_str(), value).map_err(Flow::classify)
}

fn build_function(name: &str, parameters: &ast::Parameters, body: &[Stmt], env: &Env) -> Result<Rc<UserFunction>, Flow> {
    let params = build_params(parameters, env)?;
    Ok(Rc::new(UserFunction {
        name: name.to_string(),
        params,
        body: body.to_vec(),
        closure: env.frame.clone(),
        is_generator: body_contains_yield(body),
    }))
}

fn build_params(parameters: &ast::Parameters, env: &Env) -> Result<ParamDescriptor, Flow> {
    let mut positional = Vec::new();
    let mut defaults = Vec::new();
    for p in parameters.posonlyargs.iter().chain(parameters.args.iter()) {
        positional.push(p.parameter.name.as_str().to_string());
        if let Some(default) = &p.default {
            defaults.push(eval_expr(default, env)?);
        }
    }
    let var_positional = parameters.vararg.as_ref().map(|p| p.name.as_str().to_string());
    let var_keyword = parameters.kwarg.as_ref().map(|p| p.name.as_str().to_string());
    Ok(ParamDescriptor { positional, defaults, var_positional, var_keyword })
}

fn body_contains_yield(body: &[Stmt]) -> bool {
    body.iter().any(stmt_contains_yield)
}

fn stmt_contains_yield(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Expr(e) => expr_contains_yield(&e.value),
        Stmt::Assign(a) => expr_contains_yield(&a.value),
        Stmt::Return(r) => r.value.as_deref().is_some_and(expr_contains_yield),
        Stmt::If(i) => {
            body_contains_yield(&i.body) || i.elif_else_clauses.iter().any(|c| body_contains_yield(&c.body))
        }
        Stmt::While(w) => body_contains_yield(&w.body),
        Stmt::For(f) => body_contains_yield(&f.body),
        Stmt::With(w) => body_contains_yield(&w.body),
        Stmt::Try(t) => {
            body_contains_yield(&t.body)
                || t.handlers.iter().any(|h| {
                    let ast::ExceptHandler::ExceptHandler(h) = h;
                    body_contains_yield(&h.body)
                })
                || body_contains_yield(&t.finalbody)
        }
        _ => false,
    }
}

fn expr_contains_yield(expr: &Expr) -> bool {
    matches!(expr, Expr::Yield(_) | Expr::YieldFrom(_))
}

/// Applies a function/class's decorators, innermost-first: the decorator
/// textually closest to the `def`/`class` (the last one in source order)
/// wraps first (`spec.md` §4.3).
fn apply_decorators(mut value: Value, decorators: &[ast::Decorator], env: &Env) -> Result<Value, Flow> {
    for decorator in decorators.iter().rev() {
        let decorator_fn = eval_expr(&decorator.expression, env)?;
        value = call_value(decorator_fn, vec![value], HashMap::new(), env, decorator.range())?;
    }
    Ok(value)
}

fn exec_class_def(def: &ast::StmtClassDef, env: &Env) -> Result<(), Flow> {
    let base = match &def.arguments {
        Some(arguments) => match arguments.args.first() {
            Some(base_expr) => match eval_expr(base_expr, env)? {
                Value::Class(class) => Some(class),
                _ => return Err(Flow::classify(CaptiveError::new(ErrorKind::TypeMismatch, "base class must be a class"))),
            },
            None => None,
        },
        None => None,
    };

    let class_frame = Frame::child(env.frame.clone());
    let class_env = env.with_frame(class_frame.clone());
    exec_block(&def.body, &class_env)?;

    let mut methods = HashMap::new();
    let mut class_vars = HashMap::new();
    for (name, value) in class_frame.vars.borrow().iter() {
        match value {
            Value::Function(func) => {
                methods.insert(name.clone(), func.clone());
            }
            other => {
                class_vars.insert(name.clone(), other.clone());
            }
        }
    }

    let class = Rc::new(UserClass { name: def.name.as_str().to_string(), base, methods, class_vars: RefCell::new(class_vars) });
    let value = apply_decorators(Value::Class(class), &def.decorator_list, env)?;
    env.assign(def.name.as_str(), value).map_err(Flow::classify)
}

// --- Lambda ---------------------------------------------------------------

pub fn make_lambda(lambda: &ast::ExprLambda, env: &Env) -> Result<Value, Flow> {
    let params = match &lambda.parameters {
        Some(parameters) => build_params(parameters, env)?,
        None => ParamDescriptor::default(),
    };
    let body = vec![Stmt::Return(ast::StmtReturn { node_index: ast::AtomicNodeIndex::default(), value: Some(Box::new((*lambda.body).clone())), range: lambda.range() })];
    Ok(Value::Function(Rc::new(UserFunction {
        name: "<lambda>".to_string(),
        params,
        body,
        closure: env.frame.clone(),
        is_generator: false,
    })))
}

// --- `assert` source rendering --------------------------------------------

/// A best-effort unparse of the most common expression shapes, used only to
/// reconstruct the literal source text an `assert` failure reports
/// (`spec.md` §4.3, §8 scenario 8: `assert 1 == 2` must report `"1 == 2"`).
fn render_source(expr: &Expr) -> String {
    match expr {
        Expr::NoneLiteral(_) => "None".to_string(),
        Expr::BooleanLiteral(b) => if b.value { "True" } else { "False" }.to_string(),
        Expr::NumberLiteral(n) => match &n.value {
            ast::Number::Int(i) => i.to_string(),
            ast::Number::Float(f) => f.to_string(),
            ast::Number::Complex { real, imag } => format!("({real}+{imag}j)"),
        },
        Expr::StringLiteral(s) => repr_of(&Value::str(s.value.to_str().to_string())),
        Expr::Name(n) => n.id.to_string(),
        Expr::Attribute(a) => format!("{}.{}", render_source(&a.value), a.attr.as_str()),
        Expr::Call(c) => {
            let args: Vec<String> = c.arguments.args.iter().map(render_source).collect();
            format!("{}({})", render_source(&c.func), args.join(", "))
        }
        Expr::Compare(cmp) => {
            let mut out = render_source(&cmp.left);
            for (op, comparator) in cmp.ops.iter().zip(cmp.comparators.iter()) {
                out.push(' ');
                out.push_str(cmp_op_str(*op));
                out.push(' ');
                out.push_str(&render_source(comparator));
            }
            out
        }
        Expr::BoolOp(b) => {
            let sep = match b.op {
                ast::BoolOp::And => " and ",
                ast::BoolOp::Or => " or ",
            };
            b.values.iter().map(render_source).collect::<Vec<_>>().join(sep)
        }
        Expr::UnaryOp(u) => {
            let op = match u.op {
                ast::UnaryOp::Not => "not ",
                ast::UnaryOp::USub => "-",
                ast::UnaryOp::UAdd => "+",
                ast::UnaryOp::Invert => "~",
            };
            format!("{op}{}", render_source(&u.operand))
        }
        Expr::BinOp(b) => format!("{} {} {}", render_source(&b.left), bin_op_str(b.op), render_source(&b.right)),
        Expr::Subscript(s) => format!("{}[{}]", render_source(&s.value), render_source(&s.slice)),
        _ => "<expression>".to_string(),
    }
}

fn cmp_op_str(op: ast::CmpOp) -> &'static str {
    match op {
        ast::CmpOp::Eq => "==",
        ast::CmpOp::NotEq => "!=",
        ast::CmpOp::Lt => "<",
        ast::CmpOp::LtE => "<=",
        ast::CmpOp::Gt => ">",
        ast::CmpOp::GtE => ">=",
        ast::CmpOp::Is => "is",
        ast::CmpOp::IsNot => "is not",
        ast::CmpOp::In => "in",
        ast::CmpOp::NotIn => "not in",
    }
}

fn bin_op_str(op: Operator) -> &'static str {
    match op {
        Operator::Add => "+",
        Operator::Sub => "-",
        Operator::Mult => "*",
        Operator::Div => "/",
        Operator::FloorDiv => "//",
        Operator::Mod => "%",
        Operator::Pow => "**",
        Operator::LShift => "<<",
        Operator::RShift => ">>",
        Operator::BitOr => "|",
        Operator::BitXor => "^",
        Operator::BitAnd => "&",
        Operator::MatMult => "@",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_source_reconstructs_comparison() {
        let parsed = ruff_python_parser::parse_module("1 == 2\n").expect("parses");
        let module = parsed.into_syntax();
        let Stmt::Expr(stmt) = &module.body[0] else { panic!("expected expr statement") };
        assert_eq!(render_source(&stmt.value), "1 == 2");
    }
}
