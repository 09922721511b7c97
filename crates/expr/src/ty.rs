//! The type universe expressions are checked against.
//!
//! [TypeRegistry] is built once per schema and maps the schema's type names to [TypeDescriptor]s.
//! It also answers how two models are joined through a relationship field.

use std::collections::HashMap;
use std::fmt;

use strata_schema::builder::IDENTITY_MODEL;
use strata_schema::def::{FieldDef, ModelDef, Schema};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::errors::ConstructionError;

/// The built-in field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum Scalar {
    Text,
    #[strum(serialize = "ID")]
    Id,
    Number,
    Decimal,
    Boolean,
    Date,
    Timestamp,
    Markdown,
}

/// Scalars that compare with one another.
/// Every ordered pair within a group is a valid operand pair for the comparison operators.
pub const SCALAR_GROUPS: &[&[Scalar]] = &[
    &[Scalar::Text, Scalar::Id, Scalar::Markdown],
    &[Scalar::Number, Scalar::Decimal],
    &[Scalar::Date, Scalar::Timestamp],
    &[Scalar::Boolean],
];

/// A structural type with named members, e.g. the `ctx` object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectType {
    pub name: String,
    pub fields: Vec<(String, TypeDescriptor)>,
}

impl ObjectType {
    pub fn field(&self, name: &str) -> Option<&TypeDescriptor> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, ty)| ty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Scalar(Scalar),
    /// Never directly nested; see [TypeDescriptor::array]
    Array(Box<TypeDescriptor>),
    Enum(String),
    Model(String),
    Role,
    Object(ObjectType),
    /// A value whose members are only known at runtime, e.g. `ctx.headers`.
    /// Every member of a dynamic value is Text.
    Dynamic,
    /// The type of the `null` literal
    Null,
}

impl TypeDescriptor {
    pub const fn scalar(s: Scalar) -> Self {
        Self::Scalar(s)
    }

    pub fn text() -> Self {
        Self::Scalar(Scalar::Text)
    }

    pub fn boolean() -> Self {
        Self::Scalar(Scalar::Boolean)
    }

    pub fn number() -> Self {
        Self::Scalar(Scalar::Number)
    }

    pub fn decimal() -> Self {
        Self::Scalar(Scalar::Decimal)
    }

    /// An array of `ty`.
    /// Arrays are flat: an array of arrays is the inner array type.
    pub fn array(ty: TypeDescriptor) -> Self {
        match ty {
            Self::Array(_) => ty,
            ty => Self::Array(Box::new(ty)),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// The element type of an array, or the type itself
    pub fn element(&self) -> &TypeDescriptor {
        match self {
            Self::Array(ty) => ty,
            ty => ty,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Text | Scalar::Id | Scalar::Markdown))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Number | Scalar::Decimal))
    }

    /// Treat ID as Text, including inside arrays.
    /// This is only used when asserting an expression's return type.
    pub fn normalize_id(&self) -> TypeDescriptor {
        match self {
            Self::Scalar(Scalar::Id) => Self::text(),
            Self::Array(ty) => Self::array(ty.normalize_id()),
            ty => ty.clone(),
        }
    }

    /// The name used by the checker's internal vocabulary
    pub fn internal_name(&self) -> String {
        match self {
            Self::Scalar(Scalar::Text) => "string".into(),
            Self::Scalar(Scalar::Number) => "int".into(),
            Self::Scalar(Scalar::Decimal) => "double".into(),
            Self::Scalar(Scalar::Boolean) => "bool".into(),
            Self::Scalar(Scalar::Timestamp) => "timestamp".into(),
            Self::Scalar(s) => format!("_{s}"),
            Self::Array(ty) => format!("list({})", ty.internal_name()),
            Self::Enum(name) => format!("_Enum_{name}"),
            Self::Model(name) => format!("_Model_{name}"),
            Self::Role => "_Role".into(),
            Self::Object(obj) => format!("_Object_{}", obj.name),
            Self::Dynamic => "dyn".into(),
            Self::Null => "null_type".into(),
        }
    }

    /// The name a schema author would use
    pub fn domain_name(&self) -> String {
        match self {
            Self::Scalar(s) => s.to_string(),
            Self::Array(ty) => format!("{}[]", ty.domain_name()),
            Self::Enum(name) | Self::Model(name) => name.clone(),
            Self::Role => "Role".into(),
            Self::Object(obj) => obj.name.clone(),
            Self::Dynamic => "Dynamic".into(),
            Self::Null => "null".into(),
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.domain_name())
    }
}

/// How a relationship field is joined to the model it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub source_model: String,
    pub field: String,
    pub target_model: String,
    /// True for has-many fields
    pub to_many: bool,
    /// Column on the source model compared in the join
    pub source_column: String,
    /// Column on the target model compared in the join
    pub target_column: String,
}

/// Maps schema type names to [TypeDescriptor]s.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    schema: Schema,
    relationships: HashMap<(String, String), Relationship>,
}

impl TypeRegistry {
    /// Register every model, enum and role in `schema`.
    /// Fails if a has-many field has no unambiguous field pointing back at its model.
    pub fn new(schema: &Schema) -> Result<Self, ConstructionError> {
        let mut relationships = HashMap::new();
        for model in schema.models.values() {
            for field in model.fields.values() {
                let Some(target) = schema.model(&field.type_name) else {
                    continue;
                };
                let rel = Self::relationship_of(model, field, target)?;
                relationships.insert((model.name.to_string(), field.name.to_string()), rel);
            }
        }
        tracing::debug!(
            models = schema.models.len(),
            enums = schema.enums.len(),
            roles = schema.roles.len(),
            relationships = relationships.len(),
            "registered schema types"
        );
        Ok(Self {
            schema: schema.clone(),
            relationships,
        })
    }

    fn relationship_of(model: &ModelDef, field: &FieldDef, target: &ModelDef) -> Result<Relationship, ConstructionError> {
        if !field.repeated {
            return Ok(Relationship {
                source_model: model.name.to_string(),
                field: field.name.to_string(),
                target_model: target.name.to_string(),
                to_many: false,
                source_column: format!("{}Id", field.name),
                target_column: "id".into(),
            });
        }
        let candidates = target
            .fields
            .values()
            .filter(|f| !f.repeated && *f.type_name == *model.name)
            .filter(|f| field.relation.as_ref().is_none_or(|r| *r == f.name))
            .collect::<Vec<_>>();
        let inverse = match candidates.as_slice() {
            [inverse] => inverse,
            [] => {
                return Err(ConstructionError::MissingInverse {
                    model: model.name.to_string(),
                    field: field.name.to_string(),
                    target: target.name.to_string(),
                });
            }
            _ => {
                return Err(ConstructionError::AmbiguousInverse {
                    model: model.name.to_string(),
                    field: field.name.to_string(),
                    target: target.name.to_string(),
                });
            }
        };
        Ok(Relationship {
            source_model: model.name.to_string(),
            field: field.name.to_string(),
            target_model: target.name.to_string(),
            to_many: true,
            source_column: "id".into(),
            target_column: format!("{}Id", inverse.name),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn model(&self, name: &str) -> Option<&ModelDef> {
        self.schema.model(name)
    }

    pub fn is_model(&self, name: &str) -> bool {
        self.schema.model(name).is_some()
    }

    pub fn is_enum(&self, name: &str) -> bool {
        self.schema.enum_(name).is_some()
    }

    /// Resolve a type name as written in the schema.
    pub fn resolve(&self, type_name: &str) -> Option<TypeDescriptor> {
        if let Ok(scalar) = type_name.parse::<Scalar>() {
            return Some(TypeDescriptor::Scalar(scalar));
        }
        if self.is_model(type_name) {
            return Some(TypeDescriptor::Model(type_name.into()));
        }
        if self.is_enum(type_name) {
            return Some(TypeDescriptor::Enum(type_name.into()));
        }
        if self.schema.role(type_name).is_some() {
            return Some(TypeDescriptor::Role);
        }
        if type_name == CONTEXT_TYPE {
            return Some(TypeDescriptor::Object(context_type()));
        }
        None
    }

    /// The type of a member of a model, enum or the context object.
    /// Repeated fields are arrays.
    pub fn field_type(&self, struct_type: &str, field: &str) -> Option<TypeDescriptor> {
        if let Some(model) = self.model(struct_type) {
            let def = model.field(field)?;
            let ty = self.resolve(&def.type_name)?;
            return Some(if def.repeated { TypeDescriptor::array(ty) } else { ty });
        }
        if let Some(def) = self.schema.enum_(struct_type) {
            return def.has_value(field).then(|| TypeDescriptor::Enum(struct_type.into()));
        }
        if struct_type == CONTEXT_TYPE {
            return context_type().field(field).cloned();
        }
        None
    }

    /// How `model.field` is joined, if it is a relationship.
    pub fn relationship(&self, model: &str, field: &str) -> Option<&Relationship> {
        self.relationships.get(&(model.to_owned(), field.to_owned()))
    }

    /// Every type a value may have in this schema, excluding objects.
    pub fn value_types(&self) -> Vec<TypeDescriptor> {
        Scalar::iter()
            .map(TypeDescriptor::Scalar)
            .chain(self.schema.enums.keys().map(|e| TypeDescriptor::Enum(e.to_string())))
            .chain(self.schema.models.keys().map(|m| TypeDescriptor::Model(m.to_string())))
            .chain(std::iter::once(TypeDescriptor::Role))
            .collect()
    }

    /// The compatibility groups of this schema: the scalar groups,
    /// then one singleton group per enum and per model, then roles.
    pub fn groups(&self) -> Vec<Vec<TypeDescriptor>> {
        SCALAR_GROUPS
            .iter()
            .map(|g| g.iter().copied().map(TypeDescriptor::Scalar).collect())
            .chain(self.schema.enums.keys().map(|e| vec![TypeDescriptor::Enum(e.to_string())]))
            .chain(self.schema.models.keys().map(|m| vec![TypeDescriptor::Model(m.to_string())]))
            .chain(std::iter::once(vec![TypeDescriptor::Role]))
            .collect()
    }
}

/// The name of the request context type
pub const CONTEXT_TYPE: &str = "Context";

/// The members of `ctx`
pub fn context_type() -> ObjectType {
    ObjectType {
        name: CONTEXT_TYPE.into(),
        fields: vec![
            ("identity".into(), TypeDescriptor::Model(IDENTITY_MODEL.into())),
            ("isAuthenticated".into(), TypeDescriptor::boolean()),
            ("now".into(), TypeDescriptor::Scalar(Scalar::Timestamp)),
            ("secrets".into(), TypeDescriptor::Dynamic),
            ("env".into(), TypeDescriptor::Dynamic),
            ("headers".into(), TypeDescriptor::Dynamic),
        ],
    }
}
