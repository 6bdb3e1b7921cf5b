//! Error types for xrefine.

use thiserror::Error;

/// Primary error type for document parsing and resolution.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("invalid token at position {pos}: {msg}")]
    TokenError { pos: usize, msg: String },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("PDF syntax error: {0}")]
    SyntaxError(String),

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("key not found: {0}")]
    KeyError(String),

    #[error("PDF object not found: {objid} {genno}")]
    ObjectNotFound { objid: u32, genno: u32 },

    #[error("max reference depth exceeded ({0})")]
    DepthExceeded(usize),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PdfError {
    /// Whether this error describes malformed syntax at the cursor.
    ///
    /// Parse errors are recoverable: the caller restores a saved parser
    /// state and tries something else.
    pub const fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::TokenError { .. } | Self::UnexpectedEof | Self::SyntaxError(_)
        )
    }

    pub(crate) fn token(pos: usize, msg: impl Into<String>) -> Self {
        Self::TokenError {
            pos,
            msg: msg.into(),
        }
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;
