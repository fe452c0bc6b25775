//! Errors raised while parsing OBJ/MTL text.

use thiserror::Error;

use crate::scanner::ScanError;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("line {line}: bad {what}: {source}")]
    Scan {
        line: usize,
        what: &'static str,
        #[source]
        source: ScanError,
    },
    #[error("line {line}: OBJ indices are 1-based; found 0")]
    ZeroIndex { line: usize },
    #[error("line {line}: {kind} index {index} resolved out of bounds (len={len})")]
    IndexOutOfRange {
        line: usize,
        kind: &'static str,
        index: i64,
        len: usize,
    },
    #[error("line {line}: malformed face corner '{token}'")]
    MalformedCorner { line: usize, token: String },
    #[error("mesh has {0} corners, more than a u32 index buffer can address")]
    TooManyCorners(usize),
}

impl ParseError {
    /// Wraps a scanner failure with the 1-based line number and the field name.
    pub(crate) fn scan(line: usize, what: &'static str) -> impl FnOnce(ScanError) -> Self {
        move |source| Self::Scan { line, what, source }
    }
}
