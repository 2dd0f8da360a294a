//! End-to-end scenarios a caller's script would actually run, exercising
//! `evaluate` the way an embedder does rather than poking at individual
//! dispatch functions.

use std::collections::HashMap;

use captive::{evaluate, CollectStringPrint, EvalError, EvalOptions, ErrorKind, ModuleObject, Value};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Result<Value, EvalError> {
    let mut stdout = CollectStringPrint::new();
    evaluate(source, EvalOptions::new(&mut stdout))
}

fn as_int(value: &Value) -> i64 {
    match value {
        Value::Int(i) => num_traits::ToPrimitive::to_i64(i).expect("fits in i64"),
        other => panic!("expected int, got {}", captive::repr(other)),
    }
}

#[test]
fn assignment_then_bare_name_returns_its_value() {
    let result = run("x = 3\nx").unwrap();
    assert_eq!(as_int(&result), 3);
}

#[test]
fn default_argument_overridden_by_keyword() {
    let result = run("def f(a, b=333, n=1000):\n    return b + n\nf(1, n=667)").unwrap();
    assert_eq!(as_int(&result), 1333);
}

#[test]
fn slice_then_reverse_slice() {
    let result = run("'hello'[1:3][::-1]").unwrap();
    assert!(matches!(result, Value::Str(s) if &*s == "le"));
}

#[test]
fn comprehension_variable_does_not_leak() {
    let result = run("x = [i for i in range(3)]\nx").unwrap();
    let Value::List(items) = result else { panic!("expected a list") };
    let values: Vec<i64> = items.borrow().iter().map(as_int).collect();
    assert_eq!(values, vec![0, 1, 2]);

    let err = run("[i for i in range(3)]\ni").unwrap_err();
    assert!(matches!(err, EvalError::Interpreter(e) if e.kind == ErrorKind::UnhandledException));
}

#[test]
fn diverging_while_loop_hits_the_iteration_limit() {
    let mut stdout = CollectStringPrint::new();
    let mut options = EvalOptions::new(&mut stdout);
    options.max_while_iterations = 10;
    let err = evaluate("i = 0\nwhile i < 3:\n    i -= 1\ni", options).unwrap_err();
    match err {
        EvalError::Interpreter(e) => {
            assert_eq!(e.kind, ErrorKind::UnhandledException);
            assert!(e.message.contains("iterations in While loop exceeded"));
        }
        EvalError::Client(_) => panic!("expected an interpreter error"),
    }
}

#[test]
fn diverging_while_loop_can_be_caught_as_runtime_error() {
    let mut stdout = CollectStringPrint::new();
    let mut options = EvalOptions::new(&mut stdout);
    options.max_while_iterations = 10;
    let source = "i = 0\ntry:\n    while i < 3:\n        i -= 1\nexcept RuntimeError:\n    caught = True\ncaught";
    let result = evaluate(source, options).unwrap();
    assert!(matches!(result, Value::Bool(true)));
}

#[test]
fn dangerous_submodule_attribute_is_denied_even_on_an_authorized_module() {
    let mut stdout = CollectStringPrint::new();
    let mut options = EvalOptions::new(&mut stdout);
    options.authorized_imports = vec!["random".to_string()];
    options.modules = HashMap::from([(
        "random".to_string(),
        Value::Module(std::rc::Rc::new(ModuleObject::new("random", HashMap::new()))),
    )]);

    let err = evaluate("import random\nrandom._os", options).unwrap_err();
    match err {
        EvalError::Interpreter(e) => {
            assert_eq!(e.kind, ErrorKind::UnhandledException);
            assert!(e.message.contains("AttributeError: module 'random' has no attribute '_os'"));
        }
        EvalError::Client(_) => panic!("expected an interpreter error"),
    }
}

#[test]
fn dangerous_submodule_attribute_denial_is_catchable_as_attribute_error() {
    let mut stdout = CollectStringPrint::new();
    let mut options = EvalOptions::new(&mut stdout);
    options.authorized_imports = vec!["random".to_string()];
    options.modules = HashMap::from([(
        "random".to_string(),
        Value::Module(std::rc::Rc::new(ModuleObject::new("random", HashMap::new()))),
    )]);

    let source = "import random\ntry:\n    random._os\nexcept AttributeError:\n    caught = True\ncaught";
    let result = evaluate(source, options).unwrap();
    assert!(matches!(result, Value::Bool(true)));
}

#[test]
fn context_manager_toggles_state_on_enter_and_exit() {
    let source = r#"
class Lock:
    def __init__(self):
        self.locked = False
    def __enter__(self):
        self.locked = True
        return self
    def __exit__(self, exc_type, exc_value, traceback):
        self.locked = False

lock = Lock()
with lock as l:
    inside = l.locked
lock.locked
"#;
    let result = run(source).unwrap();
    assert!(matches!(result, Value::Bool(false)));
}

#[test]
fn with_statement_enters_and_exits_every_item_in_order() {
    let source = r#"
log = []

class Tracked:
    def __init__(self, name):
        self.name = name
    def __enter__(self):
        log.append("enter:" + self.name)
        return self.name
    def __exit__(self, exc_type, exc_value, traceback):
        log.append("exit:" + self.name)

with Tracked("a") as a, Tracked("b") as b:
    log.append("body:" + a + b)

log
"#;
    let result = run(source).unwrap();
    let Value::List(items) = result else { panic!("expected a list") };
    let names: Vec<String> = items
        .borrow()
        .iter()
        .map(|v| match v {
            Value::Str(s) => s.to_string(),
            other => panic!("expected a string, got {}", captive::repr(other)),
        })
        .collect();
    assert_eq!(names, vec!["enter:a", "enter:b", "body:ab", "exit:b", "exit:a"]);
}

#[test]
fn with_statement_inner_suppression_hides_exception_from_outer_exit() {
    let source = r#"
seen = []

class Raiser:
    def __enter__(self):
        return self
    def __exit__(self, exc_type, exc_value, traceback):
        seen.append(exc_type)
        return False

class Suppressor:
    def __enter__(self):
        return self
    def __exit__(self, exc_type, exc_value, traceback):
        seen.append(exc_type)
        return True

with Raiser(), Suppressor():
    raise ValueError("boom")

len(seen)
"#;
    let result = run(source).unwrap();
    assert_eq!(as_int(&result), 2);
}

#[test]
fn assertion_failure_reports_only_the_failing_condition() {
    let err = run("assert 1 == 1\nassert 1 == 2").unwrap_err();
    match err {
        EvalError::Interpreter(e) => {
            assert_eq!(e.kind, ErrorKind::UnhandledException);
            assert!(e.message.contains("1 == 2"));
            assert!(!e.message.contains("1 == 1"));
        }
        EvalError::Client(_) => panic!("expected an interpreter error"),
    }
}

#[test]
fn callable_map_names_cannot_be_reassigned() {
    let mut stdout = CollectStringPrint::new();
    let mut options = EvalOptions::new(&mut stdout);
    options.callables = HashMap::from([("helper".to_string(), Value::int(1))]);
    let err = evaluate("helper = 2", options).unwrap_err();
    assert!(matches!(err, EvalError::Interpreter(e) if e.kind == ErrorKind::UnhandledException));
}

#[test]
fn operations_count_is_positive_after_a_nonempty_script() {
    let mut stdout = CollectStringPrint::new();
    let mut options = EvalOptions::new(&mut stdout);
    let vars = options.variables.clone();
    evaluate("x = 1\ny = 2\nx + y", options).unwrap();
    let count = vars.borrow().get("_operations_count").map(as_int).unwrap_or(0);
    assert!(count > 0);
}

#[test]
fn chained_comparison_evaluates_middle_operand_once() {
    let source = r#"
calls = []
def probe(value):
    calls.append(value)
    return value

1 < probe(2) < 3
len(calls)
"#;
    let result = run(source).unwrap();
    assert_eq!(as_int(&result), 1);
}
