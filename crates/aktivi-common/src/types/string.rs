use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

/// Error produced when a string fails identifier validation.
///
/// Carries the kind of identifier that was being parsed (`spec`) and the
/// offending input so diagnostics can point at it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("error in `{input}`: {kind}")]
#[diagnostic(
    url("https://atproto.com/specs/{spec}"),
    help("if something doesn't match the spec, contact the identifier owner")
)]
pub struct AtStrError {
    /// Identifier kind (`did`, `handle`, `at-identifier`)
    pub spec: SmolStr,
    /// Input that failed validation
    pub input: String,
    /// What went wrong
    pub kind: StrParseKind,
}

impl AtStrError {
    /// Input exceeded the maximum length for this identifier kind
    pub fn too_long(spec: &'static str, input: &str, max: usize, actual: usize) -> Self {
        Self {
            spec: SmolStr::new_static(spec),
            input: input.to_string(),
            kind: StrParseKind::TooLong { max, actual },
        }
    }

    /// Input did not match the identifier syntax
    pub fn regex(spec: &'static str, input: &str, message: SmolStr) -> Self {
        Self {
            spec: SmolStr::new_static(spec),
            input: input.to_string(),
            kind: StrParseKind::RegexFail { message },
        }
    }

    /// Input was empty
    pub fn empty(spec: &'static str) -> Self {
        Self {
            spec: SmolStr::new_static(spec),
            input: String::new(),
            kind: StrParseKind::Empty,
        }
    }
}

/// Kinds of identifier validation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrParseKind {
    /// Input longer than allowed
    #[error("too long (max {max}, got {actual})")]
    TooLong {
        #[allow(missing_docs)]
        max: usize,
        #[allow(missing_docs)]
        actual: usize,
    },
    /// Syntax check failed
    #[error("invalid syntax: {message}")]
    RegexFail {
        #[allow(missing_docs)]
        message: SmolStr,
    },
    /// Empty input
    #[error("empty input")]
    Empty,
}
