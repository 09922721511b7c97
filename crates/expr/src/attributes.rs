//! Validating every expression in a schema.
//!
//! | Attribute                             | Variables              | Expected type   |
//! |---------------------------------------|------------------------|-----------------|
//! | model `@permission(expression: ..)`   | ctx, model             | Boolean         |
//! | model `@unique([..])`                 | the model's fields     | field names     |
//! | field `@default(..)`                  | ctx                    | the field's     |
//! | field `@computed(..)`                 | ctx, model             | the field's     |
//! | action `@where(..)`                   | ctx, model, inputs     | Boolean         |
//! | action `@permission(expression: ..)`  | ctx, model, inputs     | Boolean         |
//! | action `@set(..)`                     | ctx, model, inputs     | an assignment   |
//! | `@permission(roles: [..])`            | roles                  | Role[]          |

use strata_parser::ast::Expr;
use strata_parser::parser::parse_expr_with;
use strata_schema::def::{Argument, AttributeDef, FieldDef, FieldOrigin, ModelDef, Schema};

use crate::config::CompilerConfig;
use crate::env::{
    ActionInputs, ArithmeticOperators, Assignment, ComparisonOperators, Context, Enums, Env, Functions,
    LogicalOperators, ModelVariable, ReturnType, Roles, SchemaTypes,
};
use crate::errors::{ConstructionError, Diagnostic};
use crate::scope::suggest;
use crate::ty::TypeDescriptor;
use crate::validate::{compile, ValidationError};

/// Validate every expression-bearing attribute of `schema`.
///
/// Fails only if the schema itself is inconsistent,
/// e.g. a has-many field whose inverse is ambiguous.
pub fn validate_schema(schema: &Schema, config: &CompilerConfig) -> Result<Vec<ValidationError>, ConstructionError> {
    let types = Env::new(config.clone()).with(SchemaTypes(schema))?;
    let values = types
        .clone()
        .with(Context)?
        .with(Enums)?
        .with(ComparisonOperators)?
        .with(LogicalOperators)?
        .with(ArithmeticOperators)?
        .with(Functions)?;
    let roles = types
        .clone()
        .with(Roles)?
        .with(ReturnType::Type {
            ty: TypeDescriptor::array(TypeDescriptor::Role),
            nullable: false,
        })?;

    let mut errors = vec![];
    for model in schema.models.values() {
        let base = values.clone().with(ModelVariable(&model.name))?;

        for attr in &model.attributes {
            match attr.name.as_str() {
                "permission" => permission(&base, &roles, attr, &mut errors)?,
                "unique" => unique(model, attr, config, &mut errors),
                _ => {}
            }
        }

        for field in model.fields.values() {
            for attr in &field.attributes {
                let env = match attr.name.as_str() {
                    "default" => &values,
                    "computed" => &base,
                    _ => continue,
                };
                let env = env.clone().with(field_return_type(&types, model, field)?)?;
                if let Some(arg) = attr.positional() {
                    check_argument(&env, arg, &mut errors);
                }
            }
        }

        for action in schema.actions_of(&model.name) {
            let env = base.clone().with(ActionInputs(action))?;
            for attr in &action.attributes {
                match attr.name.as_str() {
                    "where" => {
                        let env = env.clone().with(ReturnType::boolean())?;
                        if let Some(arg) = attr.positional() {
                            check_argument(&env, arg, &mut errors);
                        }
                    }
                    "set" => {
                        let env = env.clone().with(Assignment)?;
                        if let Some(arg) = attr.positional() {
                            check_argument(&env, arg, &mut errors);
                        }
                    }
                    "permission" => permission(&env, &roles, attr, &mut errors)?,
                    _ => {}
                }
            }
        }
    }
    tracing::debug!(errors = errors.len(), "validated schema expressions");
    Ok(errors)
}

/// The type a `@default` or `@computed` expression must produce for `field`
fn field_return_type(types: &Env, model: &ModelDef, field: &FieldDef) -> Result<ReturnType, ConstructionError> {
    let ty = types
        .registry()
        .and_then(|registry| registry.field_type(&model.name, &field.name))
        .ok_or_else(|| ConstructionError::UnknownType(field.type_name.to_string()))?;
    Ok(ReturnType::Type {
        ty,
        nullable: field.optional,
    })
}

fn check_argument(env: &Env, arg: &Argument, errors: &mut Vec<ValidationError>) {
    if let Err(found) = compile(env, &arg.source.text) {
        errors.extend(found.into_iter().map(|e| e.locate(&arg.source)));
    }
}

/// `@permission(expression: ..)` and `@permission(roles: [..])`
fn permission(env: &Env, roles: &Env, attr: &AttributeDef, errors: &mut Vec<ValidationError>) -> Result<(), ConstructionError> {
    if let Some(arg) = attr.labelled("expression") {
        check_argument(&env.clone().with(ReturnType::boolean())?, arg, errors);
    }
    if let Some(arg) = attr.labelled("roles") {
        check_argument(roles, arg, errors);
    }
    Ok(())
}

/// `@unique([title, author])`: a list of the model's own field names
fn unique(model: &ModelDef, attr: &AttributeDef, config: &CompilerConfig, errors: &mut Vec<ValidationError>) {
    let Some(arg) = attr.positional() else {
        return;
    };
    let source = &arg.source;
    let mut report = |diagnostic: Diagnostic| {
        errors.push(ValidationError::from_diagnostic(&diagnostic).locate(source));
    };
    let expr = match parse_expr_with(&source.text, config.parse_options()) {
        Ok(expr) => expr,
        Err(err) => return report(err.into()),
    };
    let Expr::Array(elems, _) = &expr else {
        return report(Diagnostic::FieldNameList { span: expr.span() });
    };
    let declared = model
        .fields
        .values()
        .filter(|f| f.origin == FieldOrigin::Declared)
        .map(|f| &*f.name)
        .collect::<Vec<_>>();
    for elem in elems {
        let Expr::Path(path) = elem else {
            report(Diagnostic::FieldNameList { span: elem.span() });
            continue;
        };
        let [name] = path.parts.as_slice() else {
            report(Diagnostic::FieldNameList { span: path.span });
            continue;
        };
        if model.field(&name.name).is_none() {
            report(Diagnostic::UndeclaredReference {
                name: name.name.clone(),
                hints: suggest(&name.name, &declared, &config.hints),
                span: name.span,
            });
        }
    }
}
