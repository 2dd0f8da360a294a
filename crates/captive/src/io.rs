//! `print()` output sinks (`spec.md` §6 "stdout sink").
//!
//! `captive` never writes to a real stream itself; every `print()` call
//! routes through whatever `PrintWriter` the caller supplied via
//! `EvalOptions::stdout`, so embedding a sandboxed script inside a larger
//! process never gives it ambient access to the process's actual stdout.

use std::borrow::Cow;

/// Receives one text line per `print()` call.
///
/// `write` is handed the fully-joined, space-separated arguments (the
/// evaluator does the joining); `end` is usually `"\n"` but follows whatever
/// `sep`/`end` keyword arguments the call used.
pub trait PrintWriter {
    fn write(&mut self, line: Cow<'_, str>);
}

/// Writes every line to the process's real stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write(&mut self, line: Cow<'_, str>) {
        println!("{line}");
    }
}

/// Collects every line into a string, newline-joined. The test double for
/// `StdPrint`, not a mock of one.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn write(&mut self, line: Cow<'_, str>) {
        self.0.push_str(&line);
        self.0.push('\n');
    }
}

/// Discards all output. Useful when a script's side effects, not its
/// `print()`ed text, are under test.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write(&mut self, _line: Cow<'_, str>) {}
}
