use itertools::Itertools;
use strata_parser::ast::Span;
use strata_parser::parser::errors::SyntaxError;
use strum::{EnumDiscriminants, EnumIter};
use thiserror::Error;

use crate::env::Operator;
use crate::ty::TypeDescriptor;

/// An environment could not be built because it refers to something the schema does not define.
/// This is a bug in the caller or an inconsistent schema, never a problem with an expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("schema types must be registered before `{0}`")]
    MissingSchemaTypes(&'static str),
    #[error("unknown type `{0}`")]
    UnknownType(String),
    #[error("model `{model}` has no field `{field}`")]
    UnknownField { model: String, field: String },
    #[error("has-many field `{model}.{field}` has no field on `{target}` pointing back to it")]
    MissingInverse { model: String, field: String, target: String },
    #[error("has-many field `{model}.{field}` matches several fields on `{target}`; use @relation to pick one")]
    AmbiguousInverse { model: String, field: String, target: String },
    #[error("variable `{0}` is registered more than once")]
    DuplicateVariable(String),
}

fn internal_names(types: &[TypeDescriptor]) -> String {
    types.iter().map(TypeDescriptor::internal_name).join(", ")
}

/// A problem found while checking an expression, in the checker's internal vocabulary.
///
/// The [std::fmt::Display] output is the raw message.
/// [crate::validate] rewrites each diagnostic into the schema author's vocabulary.
#[derive(Error, Debug, Clone, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(name(DiagnosticKind), derive(Hash, EnumIter))]
pub enum Diagnostic {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("found no matching overload for '{}' applied to '({})'", op.internal_id(), internal_names(args))]
    NoMatchingOverload {
        op: Operator,
        args: Vec<TypeDescriptor>,
        span: Span,
    },
    #[error("found no matching overload for '{name}' applied to '({})'", internal_names(args))]
    NoMatchingFunction {
        name: String,
        args: Vec<TypeDescriptor>,
        span: Span,
    },
    #[error("undeclared reference to '{name}'")]
    UndeclaredReference {
        name: String,
        hints: Vec<String>,
        span: Span,
    },
    #[error("undeclared reference to function '{name}'")]
    UndeclaredFunction { name: String, span: Span },
    #[error("'{name}' is not a value")]
    NotAValue { name: String, span: Span },
    #[error("list element of type '{}' in a list of '{}'", actual.internal_name(), expected.internal_name())]
    ListElement {
        expected: TypeDescriptor,
        actual: TypeDescriptor,
        span: Span,
    },
    #[error("'{name}' expects its first argument to traverse a repeated relationship")]
    AggregateArgument { name: String, span: Span },
    #[error("expected type '{}' but found '{}'", expected.internal_name(), actual.internal_name())]
    ReturnType {
        expected: TypeDescriptor,
        actual: TypeDescriptor,
        span: Span,
    },
    #[error("cannot assign to '{path}'")]
    AssignTarget { path: String, span: Span },
    #[error("'_=_' is only valid at the top of a set expression")]
    UnexpectedAssignment { span: Span },
    #[error("expected an assignment")]
    ExpectedAssignment { span: Span },
    #[error("expected a list of field names")]
    FieldNameList { span: Span },
}

impl Diagnostic {
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Syntax(err) => err.span(),
            Self::NoMatchingOverload { span, .. }
            | Self::NoMatchingFunction { span, .. }
            | Self::UndeclaredReference { span, .. }
            | Self::UndeclaredFunction { span, .. }
            | Self::NotAValue { span, .. }
            | Self::ListElement { span, .. }
            | Self::AggregateArgument { span, .. }
            | Self::ReturnType { span, .. }
            | Self::AssignTarget { span, .. }
            | Self::UnexpectedAssignment { span }
            | Self::ExpectedAssignment { span }
            | Self::FieldNameList { span } => Some(*span),
        }
    }

    pub fn kind(&self) -> DiagnosticKind {
        self.into()
    }
}

pub type CheckResult<T> = Result<T, Vec<Diagnostic>>;
