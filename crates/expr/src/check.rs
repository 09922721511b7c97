//! Type checking.
//!
//! [check] walks a parsed expression bottom-up, resolving paths through [crate::scope]
//! and picking operator overloads from the [Env].
//! Every problem found is recorded, so one pass reports all of them.

use strata_parser::ast::{Call, Expr, Path, Span};
use strata_parser::parser::recursion;

use crate::env::{Builtin, Env, Operator, ReturnType};
use crate::errors::{CheckResult, Diagnostic};
use crate::expr::{FieldPath, Hop, Operand, TypedExpr};
use crate::scope::{literal_type, resolve, EntityKind, Origin, Scope, ScopeEntity};
use crate::ty::{TypeDescriptor, TypeRegistry};

/// Type check `expr` in `env`, then assert the environment's [ReturnType] if it has one.
pub fn check(env: &Env, expr: &Expr) -> CheckResult<TypedExpr> {
    let empty;
    let registry = match env.registry() {
        Some(registry) => registry,
        None => {
            empty = TypeRegistry::default();
            &empty
        }
    };
    let mut checker = Checker {
        env,
        registry,
        root: Scope::new(env.variables().cloned().collect()),
        diagnostics: vec![],
        depth: 0,
        per_row: false,
    };
    let typed = checker.check_root(expr);
    match typed {
        Some(typed) if checker.diagnostics.is_empty() => {
            checker.assert_return_type(&typed, expr.span())?;
            Ok(typed)
        }
        _ => {
            tracing::debug!(diagnostics = checker.diagnostics.len(), "expression failed to type check");
            Err(checker.diagnostics)
        }
    }
}

struct Checker<'a> {
    env: &'a Env,
    registry: &'a TypeRegistry,
    root: Scope,
    diagnostics: Vec<Diagnostic>,
    depth: usize,
    /// Inside an aggregate's predicate, paths through the aggregated relationship denote one related row
    per_row: bool,
}

impl Checker<'_> {
    fn error(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    fn check_root(&mut self, expr: &Expr) -> Option<TypedExpr> {
        match (expr, self.env.return_type()) {
            (Expr::Assign(path, value, span), _) => self.check_assign(path, value, *span),
            (_, Some(ReturnType::Assignment)) => {
                self.error(Diagnostic::ExpectedAssignment { span: expr.span() });
                None
            }
            _ => self.check_expr(expr),
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Option<TypedExpr> {
        if let Err(err) = recursion::guard(self.depth, self.env.config().recursion_limit, "check::check_expr") {
            self.error(err.into());
            return None;
        }
        self.depth += 1;
        let typed = self.check_expr_inner(expr);
        self.depth -= 1;
        typed
    }

    fn check_expr_inner(&mut self, expr: &Expr) -> Option<TypedExpr> {
        match expr {
            Expr::Lit(lit, _) => Some(TypedExpr::Lit(lit.clone(), literal_type(lit))),
            Expr::Path(path) => self.check_path(path),
            Expr::Array(elems, _) => self.check_array(elems),
            Expr::Unary(op, operand, span) => {
                let operand = self.check_expr(operand)?;
                let op = Operator::from_un_op(*op);
                let args = [operand.ty().clone()];
                let Some(overload) = self.env.overloads(op).iter().find(|o| o.accepts(&args)) else {
                    self.error(Diagnostic::NoMatchingOverload {
                        op,
                        args: args.to_vec(),
                        span: *span,
                    });
                    return None;
                };
                Some(TypedExpr::Unary {
                    op,
                    expr: Box::new(operand),
                    ty: overload.result.clone(),
                })
            }
            Expr::Bin(lhs, rhs, op, span) => {
                let lhs = self.check_expr(lhs);
                let rhs = self.check_expr(rhs);
                self.check_binary(Operator::from_bin_op(*op), lhs?, rhs?, *span)
            }
            Expr::Log(lhs, rhs, op, span) => {
                let lhs = self.check_expr(lhs);
                let rhs = self.check_expr(rhs);
                self.check_binary(Operator::from_log_op(*op), lhs?, rhs?, *span)
            }
            Expr::Call(call) => self.check_call(call),
            Expr::Assign(_, _, span) => {
                self.error(Diagnostic::UnexpectedAssignment { span: *span });
                None
            }
        }
    }

    fn check_binary(&mut self, op: Operator, lhs: TypedExpr, rhs: TypedExpr, span: Span) -> Option<TypedExpr> {
        let args = [lhs.ty().clone(), rhs.ty().clone()];
        let overloads = self.env.overloads(op);
        let mut found = overloads.iter().find(|o| !o.legacy_any && o.accepts(&args));
        if found.is_none() && lhs.field_path().is_some_and(FieldPath::crosses_to_many) {
            found = overloads.iter().find(|o| o.legacy_any && o.accepts(&args));
            if found.is_some() {
                tracing::debug!(op = op.internal_id(), "matched legacy has-many equality");
            }
        }
        let Some(overload) = found else {
            self.error(Diagnostic::NoMatchingOverload {
                op,
                args: args.to_vec(),
                span,
            });
            return None;
        };
        Some(TypedExpr::Binary {
            op,
            ty: overload.result.clone(),
            legacy_any: overload.legacy_any,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn check_path(&mut self, path: &Path) -> Option<TypedExpr> {
        let entity = match resolve(path, &self.root, self.registry, &self.env.config().hints) {
            Ok(entity) => entity,
            Err(err) => {
                self.error(err);
                return None;
            }
        };
        let Some(ty) = entity.ty(self.registry) else {
            self.error(Diagnostic::NotAValue {
                name: path.dotted(),
                span: path.span,
            });
            return None;
        };
        let Some(operand) = self.operand(&entity) else {
            self.error(Diagnostic::NotAValue {
                name: path.dotted(),
                span: path.span,
            });
            return None;
        };
        let ty = match &operand {
            Operand::Field(field) if self.per_row && field.crosses_to_many() && !field.array_column => {
                ty.element().clone()
            }
            _ => ty,
        };
        Some(TypedExpr::Operand(operand, ty))
    }

    /// What a resolved path refers to at runtime
    fn operand(&self, entity: &ScopeEntity) -> Option<Operand> {
        let chain = entity.chain();
        let (root, rest) = chain.split_first()?;
        match &root.kind {
            EntityKind::Model { model } => Some(Operand::Field(self.field_path(&root.name, model, rest))),
            EntityKind::Object { .. } => {
                let mut path = rest.iter().map(|e| e.name.clone()).collect::<Vec<_>>();
                if let Some(TypeDescriptor::Model(_)) = entity.ty(self.registry) {
                    path.push("id".into());
                }
                Some(Operand::Context(path))
            }
            EntityKind::Typed {
                origin: Origin::Role, ..
            } => Some(Operand::Role(root.name.clone())),
            EntityKind::Typed { .. } => Some(Operand::Input(root.name.clone())),
            EntityKind::Enum { name } => Some(Operand::EnumValue {
                enum_name: name.clone(),
                value: entity.name.clone(),
            }),
            _ => None,
        }
    }

    /// The column reached by following `fields` from the variable `root` of `model`.
    /// A relationship at the end of the path selects its foreign key,
    /// or for has-many, the related rows' `id`.
    fn field_path(&self, root: &str, model: &str, fields: &[&ScopeEntity]) -> FieldPath {
        let mut path = FieldPath {
            root: root.into(),
            model: model.into(),
            hops: vec![],
            column: "id".into(),
            array_column: false,
        };
        for (i, entity) in fields.iter().enumerate() {
            let EntityKind::Field(field) = &entity.kind else {
                continue;
            };
            let last = i + 1 == fields.len();
            match self.registry.relationship(&field.model, &entity.name) {
                Some(rel) if !last || rel.to_many => {
                    path.hops.push(Hop::from(rel));
                    path.column = "id".into();
                }
                Some(rel) => path.column = rel.source_column.clone(),
                None => {
                    path.column = entity.name.clone();
                    path.array_column = field.repeated;
                }
            }
        }
        path
    }

    fn check_array(&mut self, elems: &[Expr]) -> Option<TypedExpr> {
        let typed = elems.iter().map(|e| self.check_expr(e)).collect::<Vec<_>>();
        let typed = typed.into_iter().collect::<Option<Vec<_>>>()?;
        let elem_ty = typed
            .iter()
            .map(TypedExpr::ty)
            .find(|ty| **ty != TypeDescriptor::Null)
            .cloned()
            .unwrap_or(TypeDescriptor::Null);
        let group = self
            .registry
            .groups()
            .into_iter()
            .find(|g| g.contains(&elem_ty))
            .unwrap_or_else(|| vec![elem_ty.clone()]);

        let mut valid = true;
        for (typed, expr) in typed.iter().zip(elems) {
            let ty = typed.ty();
            if *ty != TypeDescriptor::Null && !group.contains(ty) {
                self.error(Diagnostic::ListElement {
                    expected: elem_ty.clone(),
                    actual: ty.clone(),
                    span: expr.span(),
                });
                valid = false;
            }
        }
        valid.then(|| TypedExpr::Array(typed, TypeDescriptor::array(elem_ty)))
    }

    fn check_call(&mut self, call: &Call) -> Option<TypedExpr> {
        let Call { target, name, args, span } = call;
        let func = match self.env.function(&name.name) {
            Some(func) if target.is_none() || func == Builtin::Size => func,
            _ => {
                self.error(Diagnostic::UndeclaredFunction {
                    name: name.name.clone(),
                    span: name.span,
                });
                return None;
            }
        };
        let exprs = target.as_deref().into_iter().chain(args).collect::<Vec<_>>();

        let mut typed = vec![];
        for (i, expr) in exprs.iter().enumerate() {
            // The predicate of an aggregate is evaluated per related row
            let per_row = self.per_row;
            self.per_row |= func.is_aggregate() && i > 0;
            typed.push(self.check_expr(expr));
            self.per_row = per_row;
        }
        let typed = typed.into_iter().collect::<Option<Vec<_>>>()?;

        let arg_types = typed.iter().map(|a| a.ty().clone()).collect::<Vec<_>>();
        let Some(ty) = signature(func, &arg_types) else {
            self.error(Diagnostic::NoMatchingFunction {
                name: name.name.clone(),
                args: arg_types,
                span: *span,
            });
            return None;
        };

        if func.is_aggregate() {
            let first_span = exprs.first().map_or(*span, |e| e.span());
            let Some(relation) = typed.first().and_then(TypedExpr::field_path).and_then(aggregated_prefix) else {
                self.error(Diagnostic::AggregateArgument {
                    name: name.name.clone(),
                    span: first_span,
                });
                return None;
            };
            // A predicate may only reach other rows through the aggregated relationship
            let mut foreign = false;
            for predicate in &typed[1..] {
                predicate.visit(&mut |e| {
                    if let Some(prefix) = e.field_path().and_then(aggregated_prefix)
                        && prefix != relation
                    {
                        foreign = true;
                    }
                });
            }
            if foreign {
                self.error(Diagnostic::AggregateArgument {
                    name: name.name.clone(),
                    span: *span,
                });
                return None;
            }
        }

        Some(TypedExpr::Call { func, args: typed, ty })
    }

    fn check_assign(&mut self, path: &Path, value: &Expr, span: Span) -> Option<TypedExpr> {
        if self.env.return_type() != Some(&ReturnType::Assignment) {
            self.error(Diagnostic::UnexpectedAssignment { span });
            return None;
        }
        let value = self.check_expr(value);
        let target = match resolve(path, &self.root, self.registry, &self.env.config().hints) {
            Ok(target) => Some(target),
            Err(err) => {
                self.error(err);
                None
            }
        };
        let (target, value) = (target?, value?);

        let chain = target.chain();
        let (field, ty, field_path) = match (chain.as_slice(), &target.kind, target.ty(self.registry)) {
            ([root, _], EntityKind::Field(field), Some(ty)) => match &root.kind {
                EntityKind::Model { model } => {
                    let field_path = self.field_path(&root.name, model, &chain[1..]);
                    (field.clone(), ty, field_path)
                }
                _ => return self.assign_target(path),
            },
            _ => return self.assign_target(path),
        };
        if !field_path.hops.is_empty() {
            return self.assign_target(path);
        }

        let value_ty = value.ty().clone();
        let assignable = (value_ty == TypeDescriptor::Null && field.optional)
            || self
                .env
                .overloads(Operator::Assign)
                .iter()
                .any(|o| o.accepts(&[ty.clone(), value_ty.clone()]));
        if !assignable {
            self.error(Diagnostic::NoMatchingOverload {
                op: Operator::Assign,
                args: vec![ty, value_ty],
                span,
            });
            return None;
        }
        Some(TypedExpr::Assign {
            target: field_path,
            value: Box::new(value),
            ty,
        })
    }

    fn assign_target(&mut self, path: &Path) -> Option<TypedExpr> {
        self.error(Diagnostic::AssignTarget {
            path: path.dotted(),
            span: path.span,
        });
        None
    }

    /// The whole expression must have exactly the expected type, treating ID as Text.
    /// `null` is accepted when nullable and an empty list is accepted for any list type.
    fn assert_return_type(&self, typed: &TypedExpr, span: Span) -> CheckResult<()> {
        let Some(ReturnType::Type { ty: expected, nullable }) = self.env.return_type() else {
            return Ok(());
        };
        let actual = typed.ty();
        let matches = actual.normalize_id() == expected.normalize_id()
            || (*nullable && *actual == TypeDescriptor::Null)
            || (expected.is_array() && *actual == TypeDescriptor::array(TypeDescriptor::Null));
        if matches {
            return Ok(());
        }
        Err(vec![Diagnostic::ReturnType {
            expected: expected.clone(),
            actual: actual.clone(),
            span,
        }])
    }
}

/// The hops up to and including the first has-many hop
fn aggregated_prefix(path: &FieldPath) -> Option<&[Hop]> {
    path.first_to_many().map(|i| &path.hops[..=i])
}

/// The result type of a builtin applied to `args`, if it accepts them
fn signature(func: Builtin, args: &[TypeDescriptor]) -> Option<TypeDescriptor> {
    let predicate = |rest: &[TypeDescriptor]| match rest {
        [] => true,
        [p] => *p == TypeDescriptor::boolean(),
        _ => false,
    };
    match (func, args) {
        (Builtin::Upper | Builtin::Lower, [arg]) if arg.is_text() => Some(TypeDescriptor::text()),
        (Builtin::Size, [arg]) if arg.is_text() || arg.is_array() => Some(TypeDescriptor::number()),
        (Builtin::Sum | Builtin::Avg | Builtin::Min | Builtin::Max, [arg, rest @ ..])
            if arg.is_array() && arg.element().is_numeric() && predicate(rest) =>
        {
            Some(TypeDescriptor::decimal())
        }
        (Builtin::Count, [arg, rest @ ..]) if arg.is_array() && predicate(rest) => Some(TypeDescriptor::number()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::env::{Assignment, SchemaTypes};
    use crate::errors::DiagnosticKind;
    use crate::test_utils::{env_for, model_env, scalar_schema};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use strata_parser::parse_expr;
    use strum::IntoEnumIterator;

    use crate::ty::Scalar;

    fn check_text(env: &Env, text: &str) -> CheckResult<TypedExpr> {
        let expr = parse_expr(text).map_err(|err| vec![Diagnostic::from(err)])?;
        check(env, &expr)
    }

    fn kinds(env: &Env, text: &str) -> Vec<DiagnosticKind> {
        match check_text(env, text) {
            Ok(_) => vec![],
            Err(diagnostics) => diagnostics.iter().map(Diagnostic::kind).collect(),
        }
    }

    #[test]
    fn valid_expressions() -> anyhow::Result<()> {
        let env = model_env("Post")?;

        struct TestCase {
            expr: &'static str,
            msg: &'static str,
        }

        for TestCase { expr, msg } in [
            TestCase {
                expr: "post.title == \"x\"",
                msg: "Text equality",
            },
            TestCase {
                expr: "post.views > 10 and post.rating <= 4.5",
                msg: "Numeric ordering",
            },
            TestCase {
                expr: "post.views == post.rating",
                msg: "Number and Decimal are one group",
            },
            TestCase {
                expr: "post.id == \"abc\"",
                msg: "ID and Text are one group",
            },
            TestCase {
                expr: "post.status == Status.Published",
                msg: "Enum value",
            },
            TestCase {
                expr: "post.status in [Status.Draft, Status.Published]",
                msg: "Enum list",
            },
            TestCase {
                expr: "\"news\" in post.tags",
                msg: "Value in repeated field",
            },
            TestCase {
                expr: "post.views not in []",
                msg: "Empty list",
            },
            TestCase {
                expr: "post.author.name == ctx.identity.email",
                msg: "Relationship and context paths",
            },
            TestCase {
                expr: "post.publishDate == null",
                msg: "Null equality",
            },
            TestCase {
                expr: "post.comments.approved == true",
                msg: "Legacy has-many equality",
            },
            TestCase {
                expr: "SUM(post.comments.likes) > 3",
                msg: "Aggregate over has-many",
            },
            TestCase {
                expr: "COUNT(post.comments, post.comments.likes > 2) >= 1",
                msg: "Aggregate with a per-row predicate",
            },
            TestCase {
                expr: "post.title.size() < 100",
                msg: "size as a method",
            },
            TestCase {
                expr: "UPPER(post.title) == \"X\"",
                msg: "Function call",
            },
            TestCase {
                expr: "-post.views < 0 and post.title + \"!\" == \"x!\"",
                msg: "Negation and concatenation",
            },
            TestCase {
                expr: "ctx.headers.X_Api_Key == \"key\"",
                msg: "Dynamic context member",
            },
            TestCase {
                expr: "not post.published or ctx.isAuthenticated",
                msg: "Logical operators",
            },
        ] {
            let result = check_text(&env, expr);
            assert!(result.is_ok(), "{msg}: {expr}: {result:?}");
        }
        Ok(())
    }

    #[test]
    fn invalid_expressions() -> anyhow::Result<()> {
        let env = model_env("Post")?;

        struct TestCase {
            expr: &'static str,
            kinds: Vec<DiagnosticKind>,
            msg: &'static str,
        }

        for TestCase { expr, kinds: expected, msg } in [
            TestCase {
                expr: "post.title == 1",
                kinds: vec![DiagnosticKind::NoMatchingOverload],
                msg: "Text and Number",
            },
            TestCase {
                expr: "post.tags == \"news\"",
                kinds: vec![DiagnosticKind::NoMatchingOverload],
                msg: "Repeated scalar field is not a has-many path",
            },
            TestCase {
                expr: "post.comments.likes > 3",
                kinds: vec![DiagnosticKind::NoMatchingOverload],
                msg: "Legacy form is equality only",
            },
            TestCase {
                expr: "post.titel",
                kinds: vec![DiagnosticKind::UndeclaredReference],
                msg: "Unknown field",
            },
            TestCase {
                expr: "Status",
                kinds: vec![DiagnosticKind::NotAValue],
                msg: "Enum namespace",
            },
            TestCase {
                expr: "FOO(post.title)",
                kinds: vec![DiagnosticKind::UndeclaredFunction],
                msg: "Unknown function",
            },
            TestCase {
                expr: "post.title.UPPER()",
                kinds: vec![DiagnosticKind::UndeclaredFunction],
                msg: "Only size is a method",
            },
            TestCase {
                expr: "UPPER(post.views)",
                kinds: vec![DiagnosticKind::NoMatchingFunction],
                msg: "Wrong argument type",
            },
            TestCase {
                expr: "COUNT(post.tags) > 1",
                kinds: vec![DiagnosticKind::AggregateArgument],
                msg: "Aggregate without a has-many path",
            },
            TestCase {
                expr: "post.views in [1, \"a\"]",
                kinds: vec![DiagnosticKind::ListElement],
                msg: "Mixed list",
            },
            TestCase {
                expr: "post.title = \"x\"",
                kinds: vec![DiagnosticKind::UnexpectedAssignment],
                msg: "Assignment outside @set",
            },
            TestCase {
                expr: "post.titel == 1 and post.nope",
                kinds: vec![DiagnosticKind::UndeclaredReference, DiagnosticKind::UndeclaredReference],
                msg: "Every error is reported",
            },
            TestCase {
                expr: "post.title == 1 or post.published == \"yes\"",
                kinds: vec![DiagnosticKind::NoMatchingOverload, DiagnosticKind::NoMatchingOverload],
                msg: "Sibling type errors",
            },
        ] {
            assert_eq!(kinds(&env, expr), expected, "{msg}: {expr}");
        }
        Ok(())
    }

    #[test]
    fn field_paths() -> anyhow::Result<()> {
        let env = model_env("Post")?;

        let typed = check_text(&env, "post.author").map_err(|e| anyhow::anyhow!("{e:?}"))?;
        let path = typed.field_path().unwrap();
        assert!(path.hops.is_empty());
        assert_eq!(path.column, "authorId");

        let typed = check_text(&env, "post.author.name").map_err(|e| anyhow::anyhow!("{e:?}"))?;
        let path = typed.field_path().unwrap();
        assert_eq!(path.hops.len(), 1);
        assert_eq!(path.hops[0].source_column, "authorId");
        assert_eq!(path.column, "name");
        assert_eq!(path.table_model(), "Author");

        let typed = check_text(&env, "post.comments").map_err(|e| anyhow::anyhow!("{e:?}"))?;
        let path = typed.field_path().unwrap();
        assert!(path.crosses_to_many());
        assert_eq!(path.column, "id");
        assert_eq!(typed.ty(), &TypeDescriptor::array(TypeDescriptor::Model("Comment".into())));

        let typed = check_text(&env, "ctx.identity").map_err(|e| anyhow::anyhow!("{e:?}"))?;
        assert_eq!(
            typed,
            TypedExpr::Operand(
                Operand::Context(vec!["identity".into(), "id".into()]),
                TypeDescriptor::Model("Identity".into())
            )
        );
        Ok(())
    }

    #[test]
    fn return_type() -> anyhow::Result<()> {
        let base = model_env("Post")?;
        let text = base.clone().with(ReturnType::Type {
            ty: TypeDescriptor::text(),
            nullable: false,
        })?;
        let optional = base.clone().with(ReturnType::Type {
            ty: TypeDescriptor::text(),
            nullable: true,
        })?;
        let tags = base.with(ReturnType::Type {
            ty: TypeDescriptor::array(TypeDescriptor::text()),
            nullable: false,
        })?;

        assert_eq!(kinds(&text, "\"x\""), vec![]);
        assert_eq!(kinds(&text, "post.id"), vec![]);
        assert_eq!(kinds(&text, "1"), vec![DiagnosticKind::ReturnType]);
        assert_eq!(kinds(&text, "null"), vec![DiagnosticKind::ReturnType]);
        assert_eq!(kinds(&optional, "null"), vec![]);
        assert_eq!(kinds(&tags, "[]"), vec![]);
        assert_eq!(kinds(&tags, "[\"a\", \"b\"]"), vec![]);

        let Err(diagnostics) = check_text(&text, "1") else {
            panic!("expected a return type error");
        };
        assert_eq!(
            diagnostics,
            vec![Diagnostic::ReturnType {
                expected: TypeDescriptor::text(),
                actual: TypeDescriptor::number(),
                span: Span::new(0, 1),
            }]
        );
        Ok(())
    }

    #[test]
    fn assignment() -> anyhow::Result<()> {
        let env = model_env("Post")?.with(Assignment)?;

        struct TestCase {
            expr: &'static str,
            kinds: Vec<DiagnosticKind>,
            msg: &'static str,
        }

        for TestCase { expr, kinds: expected, msg } in [
            TestCase {
                expr: "post.title = \"x\"",
                kinds: vec![],
                msg: "Same type",
            },
            TestCase {
                expr: "post.views = post.rating",
                kinds: vec![],
                msg: "Same group",
            },
            TestCase {
                expr: "post.publishDate = null",
                kinds: vec![],
                msg: "Null to optional field",
            },
            TestCase {
                expr: "post.author = ctx.identity",
                kinds: vec![DiagnosticKind::NoMatchingOverload],
                msg: "Different models",
            },
            TestCase {
                expr: "post.title = null",
                kinds: vec![DiagnosticKind::NoMatchingOverload],
                msg: "Null to required field",
            },
            TestCase {
                expr: "post.author.name = \"x\"",
                kinds: vec![DiagnosticKind::AssignTarget],
                msg: "Related field",
            },
            TestCase {
                expr: "post.views",
                kinds: vec![DiagnosticKind::ExpectedAssignment],
                msg: "Not an assignment",
            },
        ] {
            assert_eq!(kinds(&env, expr), expected, "{msg}: {expr}");
        }
        Ok(())
    }

    #[test]
    fn missing_registry() {
        let env = Env::new(CompilerConfig::default());
        assert_eq!(kinds(&env, "1 + 2"), vec![DiagnosticKind::NoMatchingOverload]);
        assert_eq!(kinds(&env, "post.title"), vec![DiagnosticKind::UndeclaredReference]);
    }

    #[test]
    fn recursion_limit() -> anyhow::Result<()> {
        let schema = scalar_schema();
        let env = Env::new(CompilerConfig {
            recursion_limit: 8,
            ..CompilerConfig::default()
        })
        .with(SchemaTypes(&schema))?;
        let expr = parse_expr(&format!("{}1{}", "(".repeat(4), ")".repeat(4)))?;
        assert!(check(&env, &expr).is_ok());
        let expr = parse_expr(&format!("{}1{}", "[".repeat(16), "]".repeat(16)))?;
        assert_eq!(
            check(&env, &expr).map_err(|d| d.iter().map(Diagnostic::kind).collect::<Vec<_>>()),
            Err(vec![DiagnosticKind::Syntax])
        );
        Ok(())
    }

    fn field_of(scalar: Scalar) -> String {
        match scalar {
            Scalar::Id => "id".into(),
            scalar => scalar.to_string().to_lowercase(),
        }
    }

    fn same_group(a: Scalar, b: Scalar) -> bool {
        crate::ty::SCALAR_GROUPS.iter().any(|g| g.contains(&a) && g.contains(&b))
    }

    proptest! {
        #[test]
        fn equality_commutes_within_groups(
            a in prop::sample::select(Scalar::iter().collect::<Vec<_>>()),
            b in prop::sample::select(Scalar::iter().collect::<Vec<_>>()),
        ) {
            let env = env_for(&scalar_schema(), "Sample").unwrap();
            let ab = check_text(&env, &format!("sample.{} == sample.{}", field_of(a), field_of(b)));
            let ba = check_text(&env, &format!("sample.{} == sample.{}", field_of(b), field_of(a)));
            if same_group(a, b) {
                prop_assert!(ab.is_ok());
                prop_assert!(ba.is_ok());
            } else {
                let Err(diagnostics) = ab else {
                    panic!("{a} == {b} should not type check");
                };
                prop_assert_eq!(
                    diagnostics,
                    vec![Diagnostic::NoMatchingOverload {
                        op: Operator::Equals,
                        args: vec![TypeDescriptor::Scalar(a), TypeDescriptor::Scalar(b)],
                        span: Span::new(0, format!("sample.{} == sample.{}", field_of(a), field_of(b)).len()),
                    }]
                );
                prop_assert!(ba.is_err());
            }
        }
    }
}
