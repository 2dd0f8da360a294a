//! Classified errors and source-span diagnostics.
//!
//! Every failure the dispatcher cannot route to a user `try`/`except` clause
//! eventually becomes a [`CaptiveError`]: a kind tag, a human-readable
//! message, and (once it has crossed at least one dispatch boundary) a
//! source span. `ClientError` is the one exception to "everything becomes a
//! `CaptiveError`" — see [`crate::EvalError`].

use std::fmt;

use ruff_text_size::TextRange;
use thiserror::Error;

/// The error taxonomy from the specification's error-handling design.
///
/// These are *kinds*, not Rust types: every variant still carries its own
/// formatted message via [`CaptiveError::message`], so `kind` is for callers
/// that want to branch on the class of failure without parsing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("SyntaxError")]
    SyntaxError,
    #[error("NameNotDefined")]
    NameNotDefined,
    #[error("AttributeAccessDenied")]
    AttributeAccessDenied,
    #[error("AttributeMissing")]
    AttributeMissing,
    #[error("ImportNotAuthorized")]
    ImportNotAuthorized,
    #[error("TypeMismatch")]
    TypeMismatch,
    #[error("KeyMissing")]
    KeyMissing,
    #[error("IndexOutOfRange")]
    IndexOutOfRange,
    #[error("AssertionFailed")]
    AssertionFailed,
    #[error("IterationLimitExceeded")]
    IterationLimitExceeded,
    #[error("NotCallable")]
    NotCallable,
    #[error("UnhandledException")]
    UnhandledException,
    #[error("Internal")]
    Internal,
}

/// A classified interpreter error, optionally pinned to a source span.
///
/// The dispatcher attaches `span` the first time the error crosses a node
/// boundary and never overwrites it again, so the span that survives to the
/// caller is always the innermost offending node (see `spec.md` §4.1).
#[derive(Debug, Clone)]
pub struct CaptiveError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<TextRange>,
}

impl CaptiveError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), span: None }
    }

    /// Attaches `span` unless one is already present.
    #[must_use]
    pub fn with_span_if_missing(mut self, span: TextRange) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    pub fn name_not_defined(name: &str, candidate: Option<&str>) -> Self {
        let mut message = format!("The name `{name}` is not defined.");
        if let Some(candidate) = candidate {
            message.push_str(&format!(" Did you mean '{candidate}'?"));
        }
        Self::new(ErrorKind::NameNotDefined, message)
    }
}

impl fmt::Display for CaptiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CaptiveError {}

/// Finds the closest match to `target` among `candidates` using a bounded
/// Levenshtein distance, for the "did you mean" hints required by
/// `NameNotDefined` (`spec.md` §3, §9).
///
/// Returns `None` when no candidate is within the threshold, so a wildly
/// different typo doesn't produce a misleading suggestion.
pub fn closest_match<'a>(target: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    const MAX_DISTANCE: usize = 3;

    let mut best: Option<(&str, usize)> = None;
    for candidate in candidates {
        let distance = levenshtein(target, candidate);
        if distance == 0 || distance > MAX_DISTANCE {
            continue;
        }
        if best.is_none_or(|(_, best_distance)| distance < best_distance) {
            best = Some((candidate, distance));
        }
    }
    best.map(|(candidate, _)| candidate)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, &ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            let deletion = row[j + 1] + 1;
            let insertion = row[j] + 1;
            let substitution = prev_diag + cost;
            prev_diag = row[j + 1];
            row[j + 1] = deletion.min(insertion).min(substitution);
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_match_finds_single_typo() {
        let candidates = ["foo", "bar", "baz"];
        assert_eq!(closest_match("fo", candidates.into_iter()), Some("foo"));
    }

    #[test]
    fn close_match_rejects_distant_candidates() {
        let candidates = ["zzzzzzzz"];
        assert_eq!(closest_match("a", candidates.into_iter()), None);
    }

    #[test]
    fn name_not_defined_message_matches_original_wording() {
        let err = CaptiveError::name_not_defined("fo", None);
        assert_eq!(err.message, "The name `fo` is not defined.");
        let err = CaptiveError::name_not_defined("fo", Some("foo"));
        assert_eq!(err.message, "The name `fo` is not defined. Did you mean 'foo'?");
    }
}
