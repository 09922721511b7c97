//! Schemas and environments shared by the tests of this crate and its dependents.

use strata_schema::{Schema, SchemaBuilder};

use crate::config::CompilerConfig;
use crate::env::{
    ArithmeticOperators, ComparisonOperators, Context, Enums, Env, Functions, LogicalOperators, ModelVariable,
    SchemaTypes,
};
use crate::errors::ConstructionError;
use crate::scope::Scope;
use crate::ty::TypeRegistry;

/// Authors, posts and comments
pub fn blog_schema() -> Schema {
    SchemaBuilder::new()
        .enum_("Status", ["Draft", "Published"])
        .role("Admin")
        .model("Author", |m| {
            m.field("name", "Text")
                .field_with("email", "Text", |f| f.optional())
                .field_with("posts", "Post", |f| f.repeated())
        })
        .model("Post", |m| {
            m.field("title", "Text")
                .field_with("body", "Markdown", |f| f.optional())
                .field("published", "Boolean")
                .field("views", "Number")
                .field("rating", "Decimal")
                .field("status", "Status")
                .field_with("tags", "Text", |f| f.repeated())
                .field_with("publishDate", "Date", |f| f.optional())
                .field("author", "Author")
                .field_with("comments", "Comment", |f| f.repeated())
        })
        .model("Comment", |m| {
            m.field("text", "Text")
                .field("post", "Post")
                .field("approved", "Boolean")
                .field("likes", "Number")
        })
        .finish()
        .expect("failed to build blog schema")
}

/// Customers, orders, items and products
pub fn order_schema() -> Schema {
    SchemaBuilder::new()
        .enum_("Status", ["Pending", "Shipped"])
        .model("Customer", |m| m.field("name", "Text").field_with("orders", "Order", |f| f.repeated()))
        .model("Order", |m| {
            m.field("total", "Decimal")
                .field("status", "Status")
                .field("customer", "Customer")
                .field_with("items", "Item", |f| f.repeated())
        })
        .model("Item", |m| {
            m.field("quantity", "Number")
                .field("order", "Order")
                .field("product", "Product")
        })
        .model("Product", |m| m.field("name", "Text").field("price", "Decimal"))
        .finish()
        .expect("failed to build order schema")
}

/// A model `Sample` with one field of every scalar type.
/// Each field is named after its type in lower case, except the built-in `id`.
pub fn scalar_schema() -> Schema {
    SchemaBuilder::new()
        .model("Sample", |m| {
            m.field("text", "Text")
                .field("number", "Number")
                .field("decimal", "Decimal")
                .field("boolean", "Boolean")
                .field("date", "Date")
                .field("timestamp", "Timestamp")
                .field("markdown", "Markdown")
        })
        .finish()
        .expect("failed to build scalar schema")
}

/// An environment for boolean expressions over `model`,
/// with every operator and function registered.
pub fn env_for(schema: &Schema, model: &str) -> Result<Env, ConstructionError> {
    Env::new(CompilerConfig::default())
        .with(SchemaTypes(schema))?
        .with(Context)?
        .with(ModelVariable(model))?
        .with(Enums)?
        .with(ComparisonOperators)?
        .with(LogicalOperators)?
        .with(ArithmeticOperators)?
        .with(Functions)
}

/// [env_for] over [blog_schema]
pub fn model_env(model: &str) -> Result<Env, ConstructionError> {
    env_for(&blog_schema(), model)
}

/// The variables of [env_for] as a scope
pub fn root_scope(registry: &TypeRegistry, model: &str) -> Scope {
    let env = env_for(registry.schema(), model).expect("failed to build environment");
    Scope::new(env.variables().cloned().collect())
}
