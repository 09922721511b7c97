//! Validating expression text and explaining what is wrong with it.
//!
//! [Diagnostic]s speak the checker's vocabulary (`_==_`, `list(int)`).
//! Each one is rewritten into a [ValidationError] in the vocabulary of the schema
//! (`==`, `Number[]`) by the first applicable entry of an ordered rule table.

use itertools::Itertools;
use strata_parser::ast::{Expr, Span};
use strata_parser::parser::parse_expr_with;
use strata_schema::def::{ExprSource, Position};
use thiserror::Error;

use crate::check::check;
use crate::env::{Env, Operator, ReturnType};
use crate::errors::{Diagnostic, DiagnosticKind};
use crate::expr::TypedExpr;
use crate::ty::TypeDescriptor;

/// An expression that parsed and type checked.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedExpr {
    pub source: String,
    pub ast: Expr,
    pub typed: TypedExpr,
    /// The type the environment required, if any
    pub expected: Option<ReturnType>,
}

/// A problem with an expression, as shown to the schema author.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ValidationError {
    pub kind: DiagnosticKind,
    /// The checker's message, e.g. `found no matching overload for '_==_' applied to '(string, int)'`
    pub raw_message: String,
    /// The author's message, e.g. `cannot use operator '==' with types Text and Number`
    pub message: String,
    pub hint: Option<String>,
    /// Byte range in the expression text
    pub span: Option<Span>,
    /// Location in the schema file, once [ValidationError::locate]d
    pub position: Option<Position>,
}

impl ValidationError {
    pub fn from_diagnostic(diagnostic: &Diagnostic) -> Self {
        let Translation { message, hint } = translate(diagnostic);
        Self {
            kind: diagnostic.kind(),
            raw_message: diagnostic.to_string(),
            message,
            hint,
            span: diagnostic.span(),
            position: None,
        }
    }

    /// Map the error's span to a position in the schema file `source` was read from.
    pub fn locate(mut self, source: &ExprSource) -> Self {
        let offset = self.span.map_or(0, |span| span.start);
        let before = source.text.get(..offset).unwrap_or(&source.text);
        self.position = Some(source.position.advance(before));
        self
    }
}

/// Parse and check `text` in `env`.
pub fn compile(env: &Env, text: &str) -> Result<CheckedExpr, Vec<ValidationError>> {
    tracing::trace!(expr = text, "validating expression");
    let ast = parse_expr_with(text, env.config().parse_options())
        .map_err(|err| vec![ValidationError::from_diagnostic(&err.into())])?;
    let typed = check(env, &ast).map_err(|diagnostics| {
        tracing::debug!(expr = text, errors = diagnostics.len(), "expression is invalid");
        diagnostics.iter().map(ValidationError::from_diagnostic).collect::<Vec<_>>()
    })?;
    Ok(CheckedExpr {
        source: text.into(),
        ast,
        typed,
        expected: env.return_type().cloned(),
    })
}

/// Every problem with `text`, or nothing if it is valid.
pub fn validate_detailed(env: &Env, text: &str) -> Vec<ValidationError> {
    compile(env, text).err().unwrap_or_default()
}

/// The messages of [validate_detailed].
pub fn validate(env: &Env, text: &str) -> Vec<String> {
    validate_detailed(env, text).into_iter().map(|e| e.message).collect()
}

struct Translation {
    message: String,
    hint: Option<String>,
}

impl Translation {
    fn new(message: String) -> Self {
        Self { message, hint: None }
    }

    fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

type Rule = (DiagnosticKind, fn(&Diagnostic) -> Option<Translation>);

/// Tried in order; the first rule that applies wins.
/// More specific rules for a kind come before the general one.
const RULES: &[Rule] = &[
    (DiagnosticKind::Syntax, syntax),
    (DiagnosticKind::NoMatchingOverload, null_assignment),
    (DiagnosticKind::NoMatchingOverload, list_equality),
    (DiagnosticKind::NoMatchingOverload, unary_operator),
    (DiagnosticKind::NoMatchingOverload, binary_operator),
    (DiagnosticKind::NoMatchingFunction, function_arguments),
    (DiagnosticKind::UndeclaredReference, unknown_identifier),
    (DiagnosticKind::UndeclaredFunction, unknown_function),
    (DiagnosticKind::NotAValue, not_a_value),
    (DiagnosticKind::ListElement, list_element),
    (DiagnosticKind::AggregateArgument, aggregate_argument),
    (DiagnosticKind::ReturnType, return_type),
    (DiagnosticKind::AssignTarget, assign_target),
    (DiagnosticKind::UnexpectedAssignment, unexpected_assignment),
    (DiagnosticKind::ExpectedAssignment, expected_assignment),
    (DiagnosticKind::FieldNameList, field_name_list),
];

fn translate(diagnostic: &Diagnostic) -> Translation {
    let kind = diagnostic.kind();
    RULES
        .iter()
        .filter(|(k, _)| *k == kind)
        .find_map(|(_, rule)| rule(diagnostic))
        .unwrap_or_else(|| Translation::new(diagnostic.to_string()))
}

fn type_names(types: &[TypeDescriptor]) -> String {
    types.iter().map(TypeDescriptor::domain_name).join(" and ")
}

fn syntax(d: &Diagnostic) -> Option<Translation> {
    let Diagnostic::Syntax(err) = d else { return None };
    Some(Translation::new(err.to_string()))
}

fn null_assignment(d: &Diagnostic) -> Option<Translation> {
    match d {
        Diagnostic::NoMatchingOverload {
            op: Operator::Assign,
            args,
            ..
        } if args.get(1) == Some(&TypeDescriptor::Null) => Some(
            Translation::new(format!("cannot assign null to a field of type {} which is not optional", args[0]))
                .hint("mark the field optional with '?'"),
        ),
        _ => None,
    }
}

fn list_equality(d: &Diagnostic) -> Option<Translation> {
    match d {
        Diagnostic::NoMatchingOverload { op, args, .. }
            if op.is_equality() && args.len() == 2 && args[0].is_array() != args[1].is_array() =>
        {
            let op_in = if *op == Operator::Equals { "in" } else { "not in" };
            Some(
                Translation::new(format!("cannot use operator '{}' with types {}", op.symbol(), type_names(args)))
                    .hint(format!("use '{op_in}' to test whether a list contains a value")),
            )
        }
        _ => None,
    }
}

fn unary_operator(d: &Diagnostic) -> Option<Translation> {
    match d {
        Diagnostic::NoMatchingOverload { op, args, .. } if args.len() == 1 => Some(Translation::new(format!(
            "cannot use operator '{}' with type {}",
            op.symbol(),
            args[0]
        ))),
        _ => None,
    }
}

fn binary_operator(d: &Diagnostic) -> Option<Translation> {
    let Diagnostic::NoMatchingOverload { op, args, .. } = d else {
        return None;
    };
    Some(Translation::new(format!(
        "cannot use operator '{}' with types {}",
        op.symbol(),
        type_names(args)
    )))
}

fn function_arguments(d: &Diagnostic) -> Option<Translation> {
    let Diagnostic::NoMatchingFunction { name, args, .. } = d else {
        return None;
    };
    Some(Translation::new(if args.is_empty() {
        format!("cannot call '{name}' with no arguments")
    } else {
        format!(
            "cannot call '{name}' with arguments of type {}",
            args.iter().map(TypeDescriptor::domain_name).join(", ")
        )
    }))
}

fn unknown_identifier(d: &Diagnostic) -> Option<Translation> {
    let Diagnostic::UndeclaredReference { name, hints, .. } = d else {
        return None;
    };
    let translation = Translation::new(format!("unknown identifier '{name}'"));
    Some(match hints.as_slice() {
        [] => translation,
        [hint] => translation.hint(format!("did you mean '{hint}'?")),
        hints => translation.hint(format!(
            "did you mean one of {}?",
            hints.iter().map(|h| format!("'{h}'")).join(", ")
        )),
    })
}

fn unknown_function(d: &Diagnostic) -> Option<Translation> {
    let Diagnostic::UndeclaredFunction { name, .. } = d else {
        return None;
    };
    Some(Translation::new(format!("unknown function '{name}'")))
}

fn not_a_value(d: &Diagnostic) -> Option<Translation> {
    let Diagnostic::NotAValue { name, .. } = d else {
        return None;
    };
    Some(Translation::new(format!("'{name}' is not a value")))
}

fn list_element(d: &Diagnostic) -> Option<Translation> {
    let Diagnostic::ListElement { expected, actual, .. } = d else {
        return None;
    };
    Some(Translation::new(format!(
        "list elements must all be of type {expected}, found {actual}"
    )))
}

fn aggregate_argument(d: &Diagnostic) -> Option<Translation> {
    let Diagnostic::AggregateArgument { name, .. } = d else {
        return None;
    };
    Some(
        Translation::new(format!("'{name}' can only aggregate a has-many relationship"))
            .hint(format!("e.g. {name}(author.posts.views)")),
    )
}

fn return_type(d: &Diagnostic) -> Option<Translation> {
    let Diagnostic::ReturnType { expected, actual, .. } = d else {
        return None;
    };
    Some(Translation::new(format!(
        "expression expected to resolve to type {expected} but it is {actual}"
    )))
}

fn assign_target(d: &Diagnostic) -> Option<Translation> {
    let Diagnostic::AssignTarget { path, .. } = d else {
        return None;
    };
    Some(Translation::new(format!("cannot assign to '{path}'")).hint("only fields of the model itself can be set"))
}

fn unexpected_assignment(d: &Diagnostic) -> Option<Translation> {
    let Diagnostic::UnexpectedAssignment { .. } = d else {
        return None;
    };
    Some(Translation::new("assignment is only allowed in @set".into()).hint("use '==' to compare values"))
}

fn expected_assignment(d: &Diagnostic) -> Option<Translation> {
    let Diagnostic::ExpectedAssignment { .. } = d else {
        return None;
    };
    Some(Translation::new(
        "expression expected to be an assignment of the form 'field = value'".into(),
    ))
}

fn field_name_list(d: &Diagnostic) -> Option<Translation> {
    let Diagnostic::FieldNameList { .. } = d else {
        return None;
    };
    Some(Translation::new("expected a list of field names, e.g. [title, author]".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::model_env;
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    #[test]
    fn every_kind_has_a_rule() {
        for kind in DiagnosticKind::iter() {
            assert!(RULES.iter().any(|(k, _)| *k == kind), "no rule for {kind:?}");
        }
    }

    #[test]
    fn messages() -> anyhow::Result<()> {
        let env = model_env("Post")?;

        struct TestCase {
            expr: &'static str,
            message: &'static str,
            hint: Option<&'static str>,
        }

        for TestCase { expr, message, hint } in [
            TestCase {
                expr: "post.title == 1",
                message: "cannot use operator '==' with types Text and Number",
                hint: None,
            },
            TestCase {
                expr: "post.published and post.views",
                message: "cannot use operator 'and' with types Boolean and Number",
                hint: None,
            },
            TestCase {
                expr: "not post.title",
                message: "cannot use operator 'not' with type Text",
                hint: None,
            },
            TestCase {
                expr: "post.tags == \"news\"",
                message: "cannot use operator '==' with types Text[] and Text",
                hint: Some("use 'in' to test whether a list contains a value"),
            },
            TestCase {
                expr: "post.titel == \"x\"",
                message: "unknown identifier 'post.titel'",
                hint: Some("did you mean 'title'?"),
            },
            TestCase {
                expr: "post.status == Status.Drafted",
                message: "unknown identifier 'Status.Drafted'",
                hint: Some("did you mean 'Draft'?"),
            },
            TestCase {
                expr: "UPPER(post.views, 1) == \"x\"",
                message: "cannot call 'UPPER' with arguments of type Number, Number",
                hint: None,
            },
            TestCase {
                expr: "post.views in [1, \"a\"]",
                message: "list elements must all be of type Number, found Text",
                hint: None,
            },
            TestCase {
                expr: "post.title = \"x\"",
                message: "assignment is only allowed in @set",
                hint: Some("use '==' to compare values"),
            },
        ] {
            let errors = validate_detailed(&env, expr);
            assert_eq!(errors.len(), 1, "{expr}: {errors:?}");
            assert_eq!(errors[0].message, message, "{expr}");
            assert_eq!(errors[0].hint.as_deref(), hint, "{expr}");
        }
        Ok(())
    }

    #[test]
    fn raw_message_keeps_internal_names() -> anyhow::Result<()> {
        let env = model_env("Post")?;
        let errors = validate_detailed(&env, "post.title == 1");
        assert_eq!(
            errors[0].raw_message,
            "found no matching overload for '_==_' applied to '(string, int)'"
        );
        let errors = validate_detailed(&env, "post.tags == [1]");
        assert_eq!(
            errors[0].raw_message,
            "found no matching overload for '_==_' applied to '(list(string), list(int))'"
        );
        assert_eq!(errors[0].message, "cannot use operator '==' with types Text[] and Number[]");
        Ok(())
    }

    #[test]
    fn return_type_mismatch() -> anyhow::Result<()> {
        let env = model_env("Post")?.with(ReturnType::Type {
            ty: TypeDescriptor::text(),
            nullable: false,
        })?;
        assert_eq!(
            validate(&env, "1"),
            vec!["expression expected to resolve to type Text but it is Number"]
        );
        assert!(validate(&env, "\"x\"").is_empty());
        Ok(())
    }

    #[test]
    fn syntax_errors_stop_checking() -> anyhow::Result<()> {
        let env = model_env("Post")?;
        let errors = validate_detailed(&env, "post.titel ==");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, DiagnosticKind::Syntax);
        Ok(())
    }

    #[test]
    fn compile_keeps_the_tree() -> anyhow::Result<()> {
        let env = model_env("Post")?.with(ReturnType::boolean())?;
        let checked = compile(&env, "post.published").map_err(|e| anyhow::anyhow!("{e:?}"))?;
        assert_eq!(checked.source, "post.published");
        assert_eq!(checked.typed.ty(), &TypeDescriptor::boolean());
        assert_eq!(checked.expected, Some(ReturnType::boolean()));
        Ok(())
    }

    #[test]
    fn locate() -> anyhow::Result<()> {
        let env = model_env("Post")?;
        let source = ExprSource {
            text: "post.published and\n    post.titel".into(),
            position: Position::new("schema.keel", 4, 12),
        };
        let errors = validate_detailed(&env, &source.text);
        // points at the unknown fragment `titel`
        let error = errors[0].clone().locate(&source);
        assert_eq!(error.position, Some(Position::new("schema.keel", 5, 10)));
        Ok(())
    }
}
