//! Checking environments.
//!
//! An [Env] is composed from independent [Extension]s, each registering one capability:
//! types, variables, operator overloads, functions, or the expected result type.
//! Only [SchemaTypes] must come first, since the others look models and enums up by name.
//!
//! ```ignore
//! let base = Env::new(config)
//!     .with(SchemaTypes(&schema))?
//!     .with(Context)?
//!     .with(ModelVariable("Post"))?
//!     .with(ComparisonOperators)?
//!     .with(LogicalOperators)?;
//! // private copy per action
//! let env = base.clone().with(ActionInputs(action))?.with(ReturnType::boolean())?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use convert_case::{Case, Casing};
use indexmap::IndexMap;
use itertools::{iproduct, Itertools};
use strata_parser::ast::{BinOp, LogOp, UnOp};
use strata_schema::def::{ActionDef, InputType};
use strum::{Display, EnumIter, EnumString};

use crate::config::CompilerConfig;
use crate::errors::ConstructionError;
use crate::scope::{EntityKind, Origin, ScopeEntity};
use crate::ty::{context_type, Scalar, TypeDescriptor, TypeRegistry};

/// The operators of the expression language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Operator {
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    In,
    NotIn,
    And,
    Or,
    Not,
    Add,
    Subtract,
    Multiply,
    Divide,
    Negate,
    Assign,
}

impl Operator {
    /// The operator's name in the checker's vocabulary
    pub fn internal_id(self) -> &'static str {
        match self {
            Self::Equals => "_==_",
            Self::NotEquals => "_!=_",
            Self::Less => "_<_",
            Self::LessEquals => "_<=_",
            Self::Greater => "_>_",
            Self::GreaterEquals => "_>=_",
            Self::In => "@in",
            Self::NotIn => "@not_in",
            Self::And => "_&&_",
            Self::Or => "_||_",
            Self::Not => "!_",
            Self::Add => "_+_",
            Self::Subtract => "_-_",
            Self::Multiply => "_*_",
            Self::Divide => "_/_",
            Self::Negate => "-_",
            Self::Assign => "_=_",
        }
    }

    /// The operator as written in an expression
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::Less => "<",
            Self::LessEquals => "<=",
            Self::Greater => ">",
            Self::GreaterEquals => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::Add => "+",
            Self::Subtract | Self::Negate => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Assign => "=",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, Self::Equals | Self::NotEquals)
    }

    /// How tightly the operator binds; higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            Self::Assign => 1,
            Self::Or => 2,
            Self::And => 3,
            Self::Not => 4,
            Self::Equals
            | Self::NotEquals
            | Self::Less
            | Self::LessEquals
            | Self::Greater
            | Self::GreaterEquals
            | Self::In
            | Self::NotIn => 5,
            Self::Add | Self::Subtract => 6,
            Self::Multiply | Self::Divide => 7,
            Self::Negate => 8,
        }
    }

    pub fn from_bin_op(op: BinOp) -> Self {
        match op {
            BinOp::Eq => Self::Equals,
            BinOp::Ne => Self::NotEquals,
            BinOp::Lt => Self::Less,
            BinOp::Gt => Self::Greater,
            BinOp::Lte => Self::LessEquals,
            BinOp::Gte => Self::GreaterEquals,
            BinOp::In => Self::In,
            BinOp::NotIn => Self::NotIn,
            BinOp::Add => Self::Add,
            BinOp::Sub => Self::Subtract,
            BinOp::Mul => Self::Multiply,
            BinOp::Div => Self::Divide,
        }
    }

    pub fn from_log_op(op: LogOp) -> Self {
        match op {
            LogOp::And => Self::And,
            LogOp::Or => Self::Or,
        }
    }

    pub fn from_un_op(op: UnOp) -> Self {
        match op {
            UnOp::Not => Self::Not,
            UnOp::Neg => Self::Negate,
        }
    }
}

/// One accepted operand signature of an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overload {
    pub params: Vec<TypeDescriptor>,
    pub result: TypeDescriptor,
    /// Equality between a to-many relationship path and a single value,
    /// which matches when any related row matches.
    /// Kept for existing schemas; new schemas should use `in`.
    pub legacy_any: bool,
}

impl Overload {
    fn binary(lhs: TypeDescriptor, rhs: TypeDescriptor, result: TypeDescriptor) -> Self {
        Self {
            params: vec![lhs, rhs],
            result,
            legacy_any: false,
        }
    }

    /// Whether `args` fit this overload.
    /// `null` fits a `null` parameter and an empty list fits any array parameter.
    pub fn accepts(&self, args: &[TypeDescriptor]) -> bool {
        self.params.len() == args.len()
            && self.params.iter().zip(args).all(|(param, arg)| match (param, arg) {
                (TypeDescriptor::Array(_), TypeDescriptor::Array(elem)) if **elem == TypeDescriptor::Null => true,
                (param, arg) => param == arg,
            })
    }
}

/// Built-in functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum Builtin {
    #[strum(serialize = "UPPER")]
    Upper,
    #[strum(serialize = "LOWER")]
    Lower,
    /// Also callable as a method, `x.size()`
    #[strum(serialize = "size")]
    Size,
    #[strum(serialize = "SUM")]
    Sum,
    #[strum(serialize = "AVG")]
    Avg,
    #[strum(serialize = "MIN")]
    Min,
    #[strum(serialize = "MAX")]
    Max,
    #[strum(serialize = "COUNT")]
    Count,
}

impl Builtin {
    pub fn is_aggregate(self) -> bool {
        matches!(self, Self::Sum | Self::Avg | Self::Min | Self::Max | Self::Count)
    }
}

/// What the whole expression must produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    /// A value of exactly this type, or `null` if `nullable`
    Type { ty: TypeDescriptor, nullable: bool },
    /// An assignment `model.field = value`, as in `@set`
    Assignment,
}

impl ReturnType {
    pub fn boolean() -> Self {
        Self::Type {
            ty: TypeDescriptor::boolean(),
            nullable: false,
        }
    }
}

/// The environment an expression is checked in.
///
/// Cloning is cheap: tables are shared until an extension modifies them.
#[derive(Debug, Clone)]
pub struct Env {
    config: Arc<CompilerConfig>,
    registry: Option<Arc<TypeRegistry>>,
    variables: Arc<IndexMap<String, ScopeEntity>>,
    overloads: Arc<HashMap<Operator, Vec<Overload>>>,
    functions: Arc<IndexMap<String, Builtin>>,
    model: Option<String>,
    return_type: Option<ReturnType>,
}

/// A capability added to an [Env].
pub trait Extension {
    fn apply(self, env: &mut Env) -> Result<(), ConstructionError>;
}

impl Env {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: None,
            variables: Arc::default(),
            overloads: Arc::default(),
            functions: Arc::default(),
            model: None,
            return_type: None,
        }
    }

    pub fn with(mut self, ext: impl Extension) -> Result<Self, ConstructionError> {
        ext.apply(&mut self)?;
        Ok(self)
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn registry(&self) -> Option<&TypeRegistry> {
        self.registry.as_deref()
    }

    fn require_registry(&self, ext: &'static str) -> Result<Arc<TypeRegistry>, ConstructionError> {
        self.registry.clone().ok_or(ConstructionError::MissingSchemaTypes(ext))
    }

    /// The variables in scope at the root of an expression
    pub fn variables(&self) -> impl Iterator<Item = &ScopeEntity> {
        self.variables.values()
    }

    /// The model whose variable is in scope, if any
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn return_type(&self) -> Option<&ReturnType> {
        self.return_type.as_ref()
    }

    pub fn overloads(&self, op: Operator) -> &[Overload] {
        self.overloads.get(&op).map_or(&[], Vec::as_slice)
    }

    pub fn function(&self, name: &str) -> Option<Builtin> {
        self.functions.get(name).copied()
    }

    pub fn declare(&mut self, entity: ScopeEntity) -> Result<(), ConstructionError> {
        let variables = Arc::make_mut(&mut self.variables);
        if variables.contains_key(&entity.name) {
            return Err(ConstructionError::DuplicateVariable(entity.name));
        }
        variables.insert(entity.name.clone(), entity);
        Ok(())
    }

    fn register(&mut self, op: Operator, overload: Overload) {
        let overloads = Arc::make_mut(&mut self.overloads).entry(op).or_default();
        if !overloads.contains(&overload) {
            overloads.push(overload);
        }
    }

    /// Register every ordered pair of types within each compatibility group, and their array forms.
    fn register_group_pairs(&mut self, ops: &[Operator], result: impl Fn(&TypeDescriptor, &TypeDescriptor) -> TypeDescriptor) -> Result<(), ConstructionError> {
        let registry = self.require_registry("operators")?;
        for group in registry.groups() {
            for (op, (a, b)) in iproduct!(ops, group.iter().cartesian_product(group.iter())) {
                self.register(*op, Overload::binary(a.clone(), b.clone(), result(a, b)));
                let (a, b) = (TypeDescriptor::array(a.clone()), TypeDescriptor::array(b.clone()));
                let ty = result(&a, &b);
                self.register(*op, Overload::binary(a, b, ty));
            }
        }
        Ok(())
    }
}

/// Registers every model, enum and role as a distinct type.
pub struct SchemaTypes<'a>(pub &'a strata_schema::Schema);

impl Extension for SchemaTypes<'_> {
    fn apply(self, env: &mut Env) -> Result<(), ConstructionError> {
        env.registry = Some(Arc::new(TypeRegistry::new(self.0)?));
        Ok(())
    }
}

/// Registers `ctx`.
pub struct Context;

/// The name of the context variable
pub const CONTEXT_VARIABLE: &str = "ctx";

impl Extension for Context {
    fn apply(self, env: &mut Env) -> Result<(), ConstructionError> {
        let registry = env.require_registry("ctx")?;
        for (_, ty) in &context_type().fields {
            if let TypeDescriptor::Model(model) = ty
                && !registry.is_model(model)
            {
                return Err(ConstructionError::UnknownType(model.clone()));
            }
        }
        env.declare(ScopeEntity::root(
            CONTEXT_VARIABLE,
            EntityKind::Object {
                ty: context_type(),
                origin: Origin::Context,
            },
        ))
    }
}

/// Registers the model an attribute belongs to, named in lowerCamel case, e.g. `blogPost`.
pub struct ModelVariable<'a>(pub &'a str);

impl Extension for ModelVariable<'_> {
    fn apply(self, env: &mut Env) -> Result<(), ConstructionError> {
        let registry = env.require_registry("model variable")?;
        if !registry.is_model(self.0) {
            return Err(ConstructionError::UnknownType(self.0.into()));
        }
        env.model = Some(self.0.into());
        env.declare(ScopeEntity::root(
            self.0.to_case(Case::Camel),
            EntityKind::Model { model: self.0.into() },
        ))
    }
}

/// Registers every enum as a namespace of its values, e.g. `Status.Draft`.
pub struct Enums;

impl Extension for Enums {
    fn apply(self, env: &mut Env) -> Result<(), ConstructionError> {
        let registry = env.require_registry("enums")?;
        for name in registry.schema().enums.keys() {
            env.declare(ScopeEntity::root(name.to_string(), EntityKind::Enum { name: name.to_string() }))?;
        }
        Ok(())
    }
}

/// Registers every role by name, as used in `@permission(roles: [..])`.
pub struct Roles;

impl Extension for Roles {
    fn apply(self, env: &mut Env) -> Result<(), ConstructionError> {
        let registry = env.require_registry("roles")?;
        for name in registry.schema().roles.keys() {
            env.declare(ScopeEntity::root(
                name.to_string(),
                EntityKind::Typed {
                    ty: TypeDescriptor::Role,
                    optional: false,
                    origin: Origin::Role,
                },
            ))?;
        }
        Ok(())
    }
}

/// Registers the inputs of an action as variables.
///
/// An input is named by its label, or else by its field path joined in lowerCamel case:
/// `author.name` is available as `authorName`.
pub struct ActionInputs<'a>(pub &'a ActionDef);

impl Extension for ActionInputs<'_> {
    fn apply(self, env: &mut Env) -> Result<(), ConstructionError> {
        let registry = env.require_registry("action inputs")?;
        for input in &self.0.inputs {
            let (name, ty) = match &input.ty {
                InputType::Named(type_name) => {
                    let ty = registry
                        .resolve(type_name)
                        .ok_or_else(|| ConstructionError::UnknownType(type_name.to_string()))?;
                    (input.label.as_ref().map_or_else(|| type_name.to_string(), ToString::to_string), ty)
                }
                InputType::Field(path) => {
                    let ty = input_field_type(&registry, &self.0.model, path)?;
                    let name = match &input.label {
                        Some(label) => label.to_string(),
                        None => path.iter().map(|p| &**p).join(" ").to_case(Case::Camel),
                    };
                    (name, ty)
                }
            };
            env.declare(ScopeEntity::root(
                name,
                EntityKind::Typed {
                    ty,
                    optional: input.optional,
                    origin: Origin::Input,
                },
            ))?;
        }
        Ok(())
    }
}

/// The type of an input declared by a field path, following relationships from `model`.
fn input_field_type(
    registry: &TypeRegistry,
    model: &str,
    path: &[strata_schema::identifier::Identifier],
) -> Result<TypeDescriptor, ConstructionError> {
    let mut model = model.to_owned();
    let mut repeated = false;
    let mut ty = None;
    for (i, field) in path.iter().enumerate() {
        let def = registry
            .model(&model)
            .and_then(|m| m.field(field))
            .ok_or_else(|| ConstructionError::UnknownField {
                model: model.clone(),
                field: field.to_string(),
            })?;
        repeated |= def.repeated;
        let field_ty = registry
            .resolve(&def.type_name)
            .ok_or_else(|| ConstructionError::UnknownType(def.type_name.to_string()))?;
        if i + 1 < path.len() {
            let TypeDescriptor::Model(next) = &field_ty else {
                return Err(ConstructionError::UnknownField {
                    model: def.type_name.to_string(),
                    field: path[i + 1].to_string(),
                });
            };
            model = next.clone();
        }
        ty = Some(field_ty);
    }
    let ty = ty.ok_or_else(|| ConstructionError::UnknownField {
        model: model.clone(),
        field: String::new(),
    })?;
    Ok(if repeated { TypeDescriptor::array(ty) } else { ty })
}

/// `==`, `!=`, `<`, `<=`, `>`, `>=`, `in` and `not in`.
pub struct ComparisonOperators;

impl Extension for ComparisonOperators {
    fn apply(self, env: &mut Env) -> Result<(), ConstructionError> {
        let registry = env.require_registry("comparison operators")?;
        let boolean = |_: &TypeDescriptor, _: &TypeDescriptor| TypeDescriptor::boolean();

        env.register_group_pairs(&[Operator::Equals, Operator::NotEquals], boolean)?;

        let ordered = SCALAR_ORDERED
            .iter()
            .map(|g| g.iter().copied().map(TypeDescriptor::Scalar).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let ordering = [Operator::Less, Operator::LessEquals, Operator::Greater, Operator::GreaterEquals];
        for group in &ordered {
            for (op, (a, b)) in iproduct!(ordering, group.iter().cartesian_product(group.iter())) {
                env.register(op, Overload::binary(a.clone(), b.clone(), TypeDescriptor::boolean()));
            }
        }

        for group in registry.groups() {
            for (op, (a, b)) in iproduct!([Operator::In, Operator::NotIn], group.iter().cartesian_product(group.iter())) {
                env.register(
                    op,
                    Overload::binary(a.clone(), TypeDescriptor::array(b.clone()), TypeDescriptor::boolean()),
                );
            }
        }

        for ty in registry.value_types() {
            for op in [Operator::Equals, Operator::NotEquals] {
                env.register(op, Overload::binary(ty.clone(), TypeDescriptor::Null, TypeDescriptor::boolean()));
                env.register(op, Overload::binary(TypeDescriptor::Null, ty.clone(), TypeDescriptor::boolean()));
                // legacy: `organisation.people.name == "Keel"`
                env.register(
                    op,
                    Overload {
                        params: vec![TypeDescriptor::array(ty.clone()), ty.clone()],
                        result: TypeDescriptor::boolean(),
                        legacy_any: true,
                    },
                );
            }
        }
        Ok(())
    }
}

/// Scalars with an ordering
const SCALAR_ORDERED: &[&[Scalar]] = &[
    &[Scalar::Text, Scalar::Id, Scalar::Markdown],
    &[Scalar::Number, Scalar::Decimal],
    &[Scalar::Date, Scalar::Timestamp],
];

/// `and`, `or` and `not`, over Boolean only.
pub struct LogicalOperators;

impl Extension for LogicalOperators {
    fn apply(self, env: &mut Env) -> Result<(), ConstructionError> {
        let b = TypeDescriptor::boolean;
        env.register(Operator::And, Overload::binary(b(), b(), b()));
        env.register(Operator::Or, Overload::binary(b(), b(), b()));
        env.register(
            Operator::Not,
            Overload {
                params: vec![b()],
                result: b(),
                legacy_any: false,
            },
        );
        Ok(())
    }
}

/// `+`, `-`, `*`, `/` and unary `-` over Number and Decimal, and `+` over Text.
pub struct ArithmeticOperators;

impl Extension for ArithmeticOperators {
    fn apply(self, env: &mut Env) -> Result<(), ConstructionError> {
        let numeric = [TypeDescriptor::number(), TypeDescriptor::decimal()];
        let ops = [Operator::Add, Operator::Subtract, Operator::Multiply, Operator::Divide];
        for (op, (a, b)) in iproduct!(ops, numeric.iter().cartesian_product(numeric.iter())) {
            let result = if *a == TypeDescriptor::number() && *b == TypeDescriptor::number() {
                TypeDescriptor::number()
            } else {
                TypeDescriptor::decimal()
            };
            env.register(op, Overload::binary(a.clone(), b.clone(), result));
        }
        for ty in numeric {
            env.register(
                Operator::Negate,
                Overload {
                    params: vec![ty.clone()],
                    result: ty,
                    legacy_any: false,
                },
            );
        }
        let text = [Scalar::Text, Scalar::Id, Scalar::Markdown].map(TypeDescriptor::Scalar);
        for (a, b) in text.iter().cartesian_product(text.iter()) {
            env.register(Operator::Add, Overload::binary(a.clone(), b.clone(), TypeDescriptor::text()));
        }
        Ok(())
    }
}

/// `UPPER`, `LOWER`, `size` and the aggregates.
pub struct Functions;

impl Extension for Functions {
    fn apply(self, env: &mut Env) -> Result<(), ConstructionError> {
        use strum::IntoEnumIterator;
        let functions = Arc::make_mut(&mut env.functions);
        for builtin in Builtin::iter() {
            functions.insert(builtin.to_string(), builtin);
        }
        Ok(())
    }
}

/// `model.field = value`, as the top of a `@set` expression.
/// The value must be in the field's compatibility group, or `null` for an optional field.
pub struct Assignment;

impl Extension for Assignment {
    fn apply(self, env: &mut Env) -> Result<(), ConstructionError> {
        env.register_group_pairs(&[Operator::Assign], |a, _| a.clone())?;
        env.return_type = Some(ReturnType::Assignment);
        Ok(())
    }
}

impl Extension for ReturnType {
    fn apply(self, env: &mut Env) -> Result<(), ConstructionError> {
        if let ReturnType::Type { ty, .. } = &self {
            let registry = env.require_registry("return type")?;
            match ty.element() {
                TypeDescriptor::Model(name) | TypeDescriptor::Enum(name) if registry.resolve(name).is_none() => {
                    return Err(ConstructionError::UnknownType(name.clone()));
                }
                _ => {}
            }
        }
        env.return_type = Some(self);
        Ok(())
    }
}
