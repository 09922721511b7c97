use itertools::Itertools;
use serde::Serialize;
use strata_expr::config::CodegenConfig;

use crate::join::JoinRegistry;
use crate::table::{quote, TableRef};
use crate::value::Arg;

/// A complete statement and its arguments, in placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub sql: String,
    pub args: Vec<Arg>,
}

/// A boolean SQL expression over the builder's table and joins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledPredicate {
    pub sql: String,
    pub args: Vec<Arg>,
}

/// The value a column is set to, e.g. `"title" = ?`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledAssignment {
    /// The unqualified column name
    pub column: String,
    pub sql: String,
    pub args: Vec<Arg>,
}

/// Assembles statements over the table of one model.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    model: String,
    table: TableRef,
    pub(crate) joins: JoinRegistry,
    pub(crate) null_safe_equality: bool,
}

impl QueryBuilder {
    /// A builder for `model`, whose table is aliased as `alias`.
    /// The alias is usually the model variable of the expressions, e.g. `post`.
    pub fn new(model: &str, alias: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            table: TableRef::model(model, alias),
            joins: JoinRegistry::default(),
            null_safe_equality: CodegenConfig::default().null_safe_equality,
        }
    }

    pub fn with_codegen(mut self, config: &CodegenConfig) -> Self {
        self.null_safe_equality = config.null_safe_equality;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn alias(&self) -> &str {
        &self.table.alias
    }

    pub fn joins(&self) -> &JoinRegistry {
        &self.joins
    }

    /// Joining a has-many relationship repeats rows, so selects are distinct
    pub fn is_distinct(&self) -> bool {
        self.joins.has_to_many()
    }

    fn from_clause(&self) -> String {
        format!("{}{}", self.table.fmt(), self.joins.fmt())
    }

    fn id(&self) -> String {
        self.table.column("id").fmt()
    }

    /// `SELECT "post".* FROM "post" .. WHERE ..`
    pub fn select(&self, predicates: &[CompiledPredicate]) -> Query {
        let mut args = vec![];
        let distinct = if self.is_distinct() { "DISTINCT " } else { "" };
        let sql = format!(
            "SELECT {distinct}{}.* FROM {}{}",
            quote(self.alias()),
            self.from_clause(),
            where_clause(predicates, &mut args)
        );
        finish(sql, args)
    }

    /// `UPDATE "post" SET "title" = ? WHERE ..`
    ///
    /// `assignments` must not be empty.
    pub fn update(&self, assignments: &[CompiledAssignment], predicates: &[CompiledPredicate]) -> Query {
        let mut args = vec![];
        let set = assignments
            .iter()
            .map(|assignment| {
                args.extend(assignment.args.iter().cloned());
                format!("{} = {}", quote(&assignment.column), assignment.sql)
            })
            .join(", ");
        let sql = format!("UPDATE {} SET {set}{}", self.table.fmt(), self.filter(predicates, &mut args));
        finish(sql, args)
    }

    /// `DELETE FROM "post" WHERE ..`
    pub fn delete(&self, predicates: &[CompiledPredicate]) -> Query {
        let mut args = vec![];
        let sql = format!("DELETE FROM {}{}", self.table.fmt(), self.filter(predicates, &mut args));
        finish(sql, args)
    }

    /// The rows an update or delete applies to.
    /// With joins, they are selected by id, since the statement's own table cannot be joined.
    fn filter(&self, predicates: &[CompiledPredicate], args: &mut Vec<Arg>) -> String {
        if self.joins.is_empty() {
            return where_clause(predicates, args);
        }
        format!(
            " WHERE {} IN (SELECT {} FROM {}{})",
            self.id(),
            self.id(),
            self.from_clause(),
            where_clause(predicates, args)
        )
    }
}

fn where_clause(predicates: &[CompiledPredicate], args: &mut Vec<Arg>) -> String {
    let parts = predicates
        .iter()
        .map(|predicate| {
            args.extend(predicate.args.iter().cloned());
            if predicates.len() > 1 {
                format!("({})", predicate.sql)
            } else {
                predicate.sql.clone()
            }
        })
        .collect::<Vec<_>>();
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn finish(sql: String, args: Vec<Arg>) -> Query {
    tracing::trace!(sql = %sql, args = args.len(), "built query");
    Query { sql, args }
}
