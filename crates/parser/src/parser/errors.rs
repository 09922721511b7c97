use crate::ast::Span;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Recursion limit exceeded, `{source_}`")]
pub struct RecursionError {
    pub source_: &'static str,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("{message}")]
    Tokenizer { message: String, span: Span },
    #[error("expected {expected} but found '{found}'")]
    Expect {
        expected: &'static str,
        found: String,
        span: Span,
    },
    #[error("unexpected end of expression, expected {expected}")]
    Eof { expected: &'static str, span: Span },
    #[error("invalid number '{literal}'")]
    InvalidNumber { literal: String, span: Span },
    #[error("the left side of '=' must be a field path")]
    AssignTarget { span: Span },
    #[error("expression is {len} bytes long, the limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("expression is empty")]
    Empty,
    #[error(transparent)]
    Recursion(#[from] RecursionError),
}

impl SyntaxError {
    /// The part of the expression the error points at, if any.
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Tokenizer { span, .. }
            | Self::Expect { span, .. }
            | Self::Eof { span, .. }
            | Self::InvalidNumber { span, .. }
            | Self::AssignTarget { span } => Some(*span),
            Self::TooLong { .. } | Self::Empty | Self::Recursion(_) => None,
        }
    }
}
