//! Parsing for the expressions embedded in strata schema attributes.
//!
//! Lexing is done by the `sqlparser` tokenizer with a custom [parser::dialect::ExpressionDialect];
//! the grammar on top of the token stream is a small precedence-climbing parser.

pub mod ast;
pub mod parser;

pub use ast::Span;
pub use parser::{parse_expr, ParseOptions};
