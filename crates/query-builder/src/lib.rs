//! Compiling checked expressions to parameterized SQL.
//!
//! A [QueryBuilder] holds the table of one model and the joins its expressions select through.
//! [compile] lowers a [strata_expr::CheckedExpr] to a [CompiledPredicate],
//! registering joins with the builder as it goes,
//! and the builder assembles the predicates into a complete [Query].
//!
//! ```ignore
//! let mut builder = QueryBuilder::new("Post", "post");
//! let predicate = compile(&checked, &mut builder);
//! let query = builder.select(&[predicate]);
//! ```
//!
//! Literals are never written into the SQL text: every value is bound to a `?` placeholder,
//! and [Query::args] lists the arguments in placeholder order.

pub mod builder;
pub mod codegen;
pub mod join;
pub mod table;
pub mod value;

pub use builder::{CompiledAssignment, CompiledPredicate, Query, QueryBuilder};
pub use codegen::{compile, compile_assignment};
pub use value::{Arg, Value};
