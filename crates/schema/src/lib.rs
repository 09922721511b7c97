//! Schema definitions for strata.
//!
//! The schema-DSL parser lives elsewhere; this crate holds the validated shape it produces:
//! models, enums, roles and actions, along with the attributes whose expressions the
//! compiler in `strata-expr` checks.

pub mod builder;
pub mod def;
pub mod error;
pub mod identifier;

pub use builder::SchemaBuilder;
pub use def::Schema;
