//! Internal non-value control-flow carriers (`spec.md` §4.1, GLOSSARY "Signal").
//!
//! The dispatcher's evaluation functions return `Result<Value, Flow>`. The
//! `Ok` side is an ordinary value; the `Err` side is one of four unwinding
//! signals. `Break`/`Continue`/`Return` are consumed by the nearest
//! enclosing loop/function frame and never observed by user code. `Raise`
//! carries a Python-level exception value that `try`/`except` can match by
//! class; if it reaches the top of `evaluate()` unmatched it is converted
//! into a classified [`crate::error::CaptiveError`] (or, for `ClientError`,
//! propagated unwrapped — see `spec.md` §7).

use std::rc::Rc;

use ruff_text_size::TextRange;

use crate::{
    error::{CaptiveError, ErrorKind},
    value::{ExceptionValue, Value},
};

#[derive(Debug, Clone)]
pub enum Flow {
    Break,
    Continue,
    Return(Value),
    /// A Python-level exception in flight, with the span of the `raise` (or
    /// raising operation) that produced it, if already known.
    Raise(Value, Option<TextRange>),
    /// A syntax/internal error: never caught by user `try`/`except`, always
    /// propagates to the top of `evaluate()`.
    Fatal(CaptiveError),
    /// A caller-supplied callable opted out of interpreter-classified
    /// errors entirely (`spec.md` §7 `ClientError`). Escapes `evaluate()`
    /// unwrapped, bypassing `try`/`except` the same way `Fatal` does.
    Client(Value),
}

impl From<CaptiveError> for Flow {
    fn from(err: CaptiveError) -> Self {
        Flow::classify(err)
    }
}

impl Flow {
    pub fn raise(value: Value) -> Self {
        Flow::Raise(value, None)
    }

    /// Builds the `Flow` for a dispatcher-constructed error. `spec.md` §7's
    /// propagation policy is "user code catches any non-internal error via
    /// `try`/`except`", so every kind but `SyntaxError`/`Internal` becomes a
    /// `Raise` carrying a `Value::Exception`, matched against `except`
    /// clauses by class the same way `ZeroDivisionError`/`KeyError` already
    /// are; only the two genuinely uncatchable kinds stay `Fatal`.
    pub fn classify(err: CaptiveError) -> Self {
        let Some(class_name) = catchable_class_name(err.kind) else {
            return Flow::Fatal(err);
        };
        let flow = Flow::raise(Value::Exception(Rc::new(ExceptionValue::new(class_name, err.message))));
        match err.span {
            Some(span) => flow.with_span_if_missing(span),
            None => flow,
        }
    }

    /// Attaches `span` to a `Fatal` or unpinned `Raise`, leaving everything
    /// else untouched. Used by the dispatcher to decorate errors as they
    /// unwind (`spec.md` §4.1).
    #[must_use]
    pub fn with_span_if_missing(self, span: TextRange) -> Self {
        match self {
            Flow::Fatal(err) => Flow::Fatal(err.with_span_if_missing(span)),
            Flow::Raise(value, None) => Flow::Raise(value, Some(span)),
            other => other,
        }
    }
}

/// The builtin exception class an `ErrorKind` is raised as, or `None` for
/// the two kinds the specification keeps outside `try`/`except` entirely.
fn catchable_class_name(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::SyntaxError | ErrorKind::Internal => None,
        ErrorKind::NameNotDefined => Some("NameError"),
        ErrorKind::AttributeAccessDenied | ErrorKind::AttributeMissing => Some("AttributeError"),
        ErrorKind::ImportNotAuthorized => Some("ImportError"),
        ErrorKind::TypeMismatch | ErrorKind::NotCallable => Some("TypeError"),
        ErrorKind::KeyMissing => Some("KeyError"),
        ErrorKind::IndexOutOfRange => Some("IndexError"),
        ErrorKind::AssertionFailed => Some("AssertionError"),
        ErrorKind::IterationLimitExceeded => Some("RuntimeError"),
        ErrorKind::UnhandledException => None,
    }
}
