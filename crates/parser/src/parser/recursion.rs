//! A utility for guarding against stack overflows in the expression parser.

use crate::parser::errors::{RecursionError, SyntaxError};

/// A conservative limit for recursion depth on `parse_expr`.
pub const MAX_RECURSION_EXPR: usize = 1_600;

/// A utility for guarding against stack overflows in the expression parser.
///
/// **Usage:**
/// ```
/// use strata_parser::parser::recursion;
/// let depth = 0;
/// assert!(recursion::guard(depth, 10, "test").is_ok());
/// ```
pub fn guard(depth: usize, limit: usize, source: &'static str) -> Result<(), SyntaxError> {
    if depth > limit {
        Err(RecursionError { source_: source }.into())
    } else {
        Ok(())
    }
}
