//! Lowering [TypedExpr]s to SQL.
//!
//! Field paths select through the relationship joins of a [QueryBuilder].
//! A path that crosses a has-many relationship is joined only where the expression
//! compares it directly (`post.comments.approved == true`); `in` and the aggregates
//! instead read the related rows through a correlated subquery:
//!
//! ```sql
//! (SELECT COALESCE(SUM("post$comments"."likes"), 0)
//!  FROM "comment" AS "post$comments"
//!  WHERE "post$comments"."post_id" = "post"."id")
//! ```
//!
//! Expressions inside such a subquery select through its own joins.

use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive};
use strata_expr::env::{Builtin, Operator};
use strata_expr::expr::{FieldPath, Operand, TypedExpr};
use strata_expr::ty::TypeDescriptor;
use strata_expr::validate::CheckedExpr;
use strata_parser::ast::Literal;

use crate::builder::{CompiledAssignment, CompiledPredicate, QueryBuilder};
use crate::join::{alias_of, JoinRegistry};
use crate::table::{column_name, quote, ColumnRef, TableRef};
use crate::value::{Arg, Value};

/// Compile a checked expression to SQL over the table of `builder`,
/// registering the joins it selects through.
///
/// An assignment compiles to `"column" = value`; see [compile_assignment].
pub fn compile(checked: &CheckedExpr, builder: &mut QueryBuilder) -> CompiledPredicate {
    if let Some(CompiledAssignment { column, sql, args }) = compile_assignment(checked, builder) {
        return CompiledPredicate {
            sql: format!("{} = {sql}", quote(&column)),
            args,
        };
    }
    let mut compiler = Compiler::new(builder, false);
    let sql = compiler.expr(&checked.typed);
    tracing::trace!(expr = %checked.source, sql = %sql, "compiled predicate");
    CompiledPredicate {
        sql,
        args: compiler.args,
    }
}

/// Compile the value of a `@set` expression, or return `None` if `checked` is not an assignment.
///
/// The value may not use the joins of an `UPDATE`,
/// so related columns are read with scalar subqueries instead.
pub fn compile_assignment(checked: &CheckedExpr, builder: &mut QueryBuilder) -> Option<CompiledAssignment> {
    let TypedExpr::Assign { target, value, .. } = &checked.typed else {
        return None;
    };
    let mut compiler = Compiler::new(builder, true);
    let sql = compiler.expr(value);
    tracing::trace!(expr = %checked.source, sql = %sql, "compiled assignment");
    Some(CompiledAssignment {
        column: column_name(&target.column),
        sql,
        args: compiler.args,
    })
}

/// The `FROM` clause of a subquery over the rows of a has-many relationship
struct Frame {
    /// The relationship fields leading to the subquery's table
    fields: Vec<String>,
    joins: JoinRegistry,
}

impl Frame {
    fn contains(&self, path: &FieldPath) -> bool {
        path.hops.len() >= self.fields.len() && path.hops.iter().zip(&self.fields).all(|(hop, f)| hop.field == *f)
    }
}

struct Compiler<'a> {
    builder: &'a mut QueryBuilder,
    frames: Vec<Frame>,
    args: Vec<Arg>,
    /// Never join the builder's table, select related columns with subqueries
    scalar_subqueries: bool,
}

impl<'a> Compiler<'a> {
    fn new(builder: &'a mut QueryBuilder, scalar_subqueries: bool) -> Self {
        Self {
            builder,
            frames: vec![],
            args: vec![],
            scalar_subqueries,
        }
    }

    fn bind(&mut self, arg: impl Into<Arg>) -> String {
        self.args.push(arg.into());
        "?".into()
    }

    fn expr(&mut self, expr: &TypedExpr) -> String {
        match expr {
            TypedExpr::Lit(lit, _) => self.literal(lit),
            TypedExpr::Operand(operand, _) => self.operand(operand),
            TypedExpr::Array(elems, _) if elems.is_empty() => "'{}'".into(),
            TypedExpr::Array(elems, _) => format!("ARRAY[{}]", self.list(elems)),
            TypedExpr::Unary { op, expr, .. } => self.unary(*op, expr),
            TypedExpr::Binary { op, lhs, rhs, ty, .. } => self.binary(*op, lhs, rhs, ty),
            TypedExpr::Call { func, args, .. } => self.call(*func, args),
            TypedExpr::Assign { .. } => unreachable!("assignment below the root of an expression"),
        }
    }

    /// Render `expr` as an operand of an operator with precedence `prec`.
    /// Operators associate to the left, so an equal operator on the right is parenthesized.
    /// Comparisons do not associate at all and are parenthesized on either side.
    fn nested(&mut self, expr: &TypedExpr, prec: u8, right: bool) -> String {
        let sql = self.expr(expr);
        let own = expr.precedence();
        let comparison = prec == Operator::Equals.precedence();
        if own < prec || (own == prec && (right || comparison)) {
            format!("({sql})")
        } else {
            sql
        }
    }

    fn list(&mut self, elems: &[TypedExpr]) -> String {
        elems.iter().map(|e| self.expr(e)).collect::<Vec<_>>().join(", ")
    }

    fn literal(&mut self, lit: &Literal) -> String {
        let value = match lit {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Str(s) => Value::Text(s.to_string()),
            Literal::Num(n) => number(n),
        };
        self.bind(value)
    }

    fn operand(&mut self, operand: &Operand) -> String {
        match operand {
            Operand::Field(path) => self.column(path),
            Operand::Context(path) => self.bind(Arg::Context(path.clone())),
            Operand::Input(name) => self.bind(Arg::Input(name.clone())),
            Operand::EnumValue { value, .. } => self.bind(Value::Text(value.clone())),
            Operand::Role(name) => self.bind(Value::Text(name.clone())),
        }
    }

    /// The innermost subquery `path` lies in, or `None` for the builder's query,
    /// and how many of the path's hops that query's table already covers.
    fn locate(&self, path: &FieldPath) -> (Option<usize>, usize) {
        self.frames
            .iter()
            .enumerate()
            .rev()
            .find(|(_, frame)| frame.contains(path))
            .map_or((None, 0), |(i, frame)| (Some(i), frame.fields.len()))
    }

    fn registry(&mut self, frame: Option<usize>) -> &mut JoinRegistry {
        match frame {
            Some(i) => &mut self.frames[i].joins,
            None => &mut self.builder.joins,
        }
    }

    /// The hop a subquery over the related rows of `path` starts at, if it needs one
    fn split(&self, path: &FieldPath) -> Option<usize> {
        let (frame, skip) = self.locate(path);
        let first = path.hops.iter().skip(skip).position(|hop| hop.to_many)? + skip;
        if frame.is_none() && self.scalar_subqueries {
            return Some(skip);
        }
        Some(first)
    }

    fn column(&mut self, path: &FieldPath) -> String {
        let (frame, skip) = self.locate(path);
        if frame.is_none() && self.scalar_subqueries && skip < path.hops.len() {
            let sub = self.subquery(path, skip, |this| (this.column(path), None));
            return format!("({sub})");
        }
        let base = self.builder.alias().to_owned();
        let alias = self.registry(frame).join_path(&base, &path.hops, skip);
        ColumnRef::new(alias, column_name(&path.column)).fmt()
    }

    /// `SELECT .. FROM` the rows reached through `path.hops[split]`,
    /// correlated with the row they are reached from.
    /// `body` renders what is selected and an optional filter.
    fn subquery(
        &mut self,
        path: &FieldPath,
        split: usize,
        body: impl FnOnce(&mut Self) -> (String, Option<String>),
    ) -> String {
        let (frame, skip) = self.locate(path);
        let base = self.builder.alias().to_owned();
        let parent = self.registry(frame).join_path(&base, &path.hops[..split], skip);

        let hop = &path.hops[split];
        let table = TableRef::model(&hop.target_model, alias_of(&base, &path.hops[..=split]));
        let correlation = format!(
            "{} = {}",
            table.column(&hop.target_column).fmt(),
            TableRef::model(&hop.source_model, parent).column(&hop.source_column).fmt()
        );

        self.frames.push(Frame {
            fields: path.hops[..=split].iter().map(|hop| hop.field.clone()).collect(),
            joins: JoinRegistry::default(),
        });
        let (select, filter) = body(self);
        let joins = self.frames.pop().map(|frame| frame.joins).unwrap_or_default();

        let filter = filter.map(|f| format!(" AND {f}")).unwrap_or_default();
        format!(
            "SELECT {select} FROM {}{} WHERE {correlation}{filter}",
            table.fmt(),
            joins.fmt()
        )
    }

    fn unary(&mut self, op: Operator, expr: &TypedExpr) -> String {
        let sql = self.expr(expr);
        let parens = match op {
            Operator::Negate => matches!(expr, TypedExpr::Binary { .. } | TypedExpr::Unary { .. }),
            _ => matches!(expr, TypedExpr::Binary { .. }),
        };
        let sql = if parens { format!("({sql})") } else { sql };
        match op {
            Operator::Negate => format!("-{sql}"),
            _ => format!("NOT {sql}"),
        }
    }

    fn binary(&mut self, op: Operator, lhs: &TypedExpr, rhs: &TypedExpr, ty: &TypeDescriptor) -> String {
        match op {
            Operator::Equals | Operator::NotEquals => self.equality(op, lhs, rhs),
            Operator::In | Operator::NotIn => self.membership(op == Operator::NotIn, lhs, rhs),
            _ => {
                let prec = op.precedence();
                let l = self.nested(lhs, prec, false);
                let r = self.nested(rhs, prec, true);
                let sym = if op == Operator::Add && ty.is_text() {
                    "||"
                } else {
                    sql_operator(op)
                };
                format!("{l} {sym} {r}")
            }
        }
    }

    /// `IS [NOT] NULL` against `null`, and a null-safe comparison against a boolean literal
    fn equality(&mut self, op: Operator, lhs: &TypedExpr, rhs: &TypedExpr) -> String {
        let negated = op == Operator::NotEquals;
        let prec = op.precedence();
        if let (other, TypedExpr::Lit(Literal::Null, _)) | (TypedExpr::Lit(Literal::Null, _), other) = (lhs, rhs) {
            let sql = self.nested(other, prec, false);
            return if negated {
                format!("{sql} IS NOT NULL")
            } else {
                format!("{sql} IS NULL")
            };
        }
        let is_bool = |e: &TypedExpr| matches!(e, TypedExpr::Lit(Literal::Bool(_), _));
        let null_safe = self.builder.null_safe_equality && (is_bool(lhs) || is_bool(rhs));
        let l = self.nested(lhs, prec, false);
        let r = self.nested(rhs, prec, true);
        let sym = match (null_safe, negated) {
            (true, false) => "IS NOT DISTINCT FROM",
            (true, true) => "IS DISTINCT FROM",
            (false, _) => sql_operator(op),
        };
        format!("{l} {sym} {r}")
    }

    /// `in` and `not in`, by what the right side is:
    ///
    /// | right side           | `in`                 | `not in`              |
    /// |----------------------|----------------------|-----------------------|
    /// | `[]`                 | `FALSE`              | `TRUE`                |
    /// | `[a, b]`             | `x IN (?, ?)`        | `x NOT IN (?, ?)`     |
    /// | a has-many path      | `x IN (SELECT ..)`   | `x NOT IN (SELECT ..)`|
    /// | any other array      | `x = ANY(..)`        | `x <> ALL(..)`        |
    ///
    /// `NOT IN` and `<> ALL` are null whenever the related rows or the array hold a null,
    /// so the negated forms leave out nulls first.
    fn membership(&mut self, negated: bool, lhs: &TypedExpr, rhs: &TypedExpr) -> String {
        let prec = Operator::In.precedence();
        let not = if negated { "NOT " } else { "" };
        let related = rhs
            .field_path()
            .filter(|path| !path.array_column)
            .and_then(|path| Some((path, self.split(path)?)));
        match (rhs, related) {
            (TypedExpr::Array(elems, _), _) if elems.is_empty() => (if negated { "TRUE" } else { "FALSE" }).into(),
            (TypedExpr::Array(elems, _), _) => {
                let l = self.nested(lhs, prec, false);
                format!("{l} {not}IN ({})", self.list(elems))
            }
            (_, Some((path, split))) => {
                let l = self.nested(lhs, prec, false);
                let sub = self.subquery(path, split, |this| {
                    let column = this.column(path);
                    let filter = negated.then(|| format!("{column} IS NOT NULL"));
                    (column, filter)
                });
                format!("{l} {not}IN ({sub})")
            }
            _ => {
                let l = self.nested(lhs, prec, false);
                let r = self.expr(rhs);
                if negated {
                    format!("{l} <> ALL(ARRAY_REMOVE({r}, NULL))")
                } else {
                    format!("{l} = ANY({r})")
                }
            }
        }
    }

    fn call(&mut self, func: Builtin, args: &[TypedExpr]) -> String {
        match (func, args) {
            (Builtin::Upper | Builtin::Lower, [arg]) => format!("{func}({})", self.expr(arg)),
            (Builtin::Size, [arg]) if arg.ty().is_text() => format!("LENGTH({})", self.expr(arg)),
            (Builtin::Size, [arg]) => {
                let related = arg
                    .field_path()
                    .filter(|path| !path.array_column)
                    .and_then(|path| Some((path, self.split(path)?)));
                match related {
                    Some((path, split)) => {
                        let sub = self.subquery(path, split, |this| (format!("COUNT({})", this.column(path)), None));
                        format!("({sub})")
                    }
                    None => format!("CARDINALITY({})", self.expr(arg)),
                }
            }
            (_, [arg, predicate @ ..]) if func.is_aggregate() => self.aggregate(func, arg, predicate.first()),
            _ => unreachable!("{func} applied to {} arguments", args.len()),
        }
    }

    /// A scalar subquery over the related rows of `arg`, filtered by `predicate`
    fn aggregate(&mut self, func: Builtin, arg: &TypedExpr, predicate: Option<&TypedExpr>) -> String {
        let Some((path, split)) = arg.field_path().and_then(|path| Some((path, self.split(path)?))) else {
            unreachable!("{func} over an expression that crosses no has-many relationship")
        };
        let sub = self.subquery(path, split, |this| {
            let column = this.column(path);
            let select = match func {
                Builtin::Count => format!("COUNT({column})"),
                _ => format!("COALESCE({func}({column}), 0)"),
            };
            let filter = predicate.map(|p| this.nested(p, Operator::And.precedence(), true));
            (select, filter)
        });
        format!("({sub})")
    }
}

fn sql_operator(op: Operator) -> &'static str {
    match op {
        Operator::Equals | Operator::Assign => "=",
        Operator::NotEquals => "<>",
        Operator::Less => "<",
        Operator::LessEquals => "<=",
        Operator::Greater => ">",
        Operator::GreaterEquals => ">=",
        Operator::In => "IN",
        Operator::NotIn => "NOT IN",
        Operator::And => "AND",
        Operator::Or => "OR",
        Operator::Not => "NOT",
        Operator::Add => "+",
        Operator::Subtract | Operator::Negate => "-",
        Operator::Multiply => "*",
        Operator::Divide => "/",
    }
}

/// Integers that fit are bound as integers, anything else as a double
fn number(n: &str) -> Value {
    if let Ok(n) = n.parse::<i64>() {
        return Value::Number(n);
    }
    match BigDecimal::from_str(n).ok().and_then(|d| d.to_f64()) {
        Some(d) => Value::Decimal(d),
        None => unreachable!("numeric literal `{n}` passed the parser"),
    }
}
