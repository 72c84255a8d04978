//! Typed errors for extraction and replacement merging.

use oxc_span::Span;
use thiserror::Error;

/// Failure to extract usage records from a single script module.
///
/// Extraction errors are module-level: callers record them on the module and
/// carry on with the rest of the graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The source could not be parsed
    #[error("syntax error: {message}")]
    Syntax { message: String, errors: usize },

    /// The source could not be read
    #[error("cannot read source: {message}")]
    Io { message: String },
}

impl ExtractError {
    pub fn io(err: &std::io::Error) -> Self {
        Self::Io { message: err.to_string() }
    }
}

/// Why a usage could not be fused into a queued replacement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("no placeholder queued at {}..{}", .span.start, .span.end)]
    MissingPlaceholder { span: Span },

    #[error("extension to {}..{} overlaps a replacement at {}..{}", .extended.start, .extended.end, .other.start, .other.end)]
    Overlap { extended: Span, other: Span },

    #[error("range {}..{} does not extend {}..{}", .extended.start, .extended.end, .target.start, .target.end)]
    InvalidExtension { target: Span, extended: Span },
}
