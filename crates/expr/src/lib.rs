//! Type checking for schema attribute expressions.
//!
//! An expression such as `post.author.name == ctx.identity.email` is parsed by [strata_parser],
//! checked against the types of a [strata_schema::Schema] in an [env::Env],
//! and either lowered to a [expr::TypedExpr] or rejected with [validate::ValidationError]s.

pub mod attributes;
pub mod check;
pub mod config;
pub mod env;
pub mod errors;
pub mod expr;
pub mod report;
pub mod scope;
pub mod test_utils;
pub mod ty;
pub mod validate;

pub use attributes::validate_schema;
pub use config::CompilerConfig;
pub use validate::{compile, validate, validate_detailed, CheckedExpr, ValidationError};
