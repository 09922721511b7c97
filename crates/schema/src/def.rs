//! Validated schema definitions.
//!
//! These are produced by [crate::builder::SchemaBuilder::finish] and consumed by the expression compiler.
//! Every name in a definition has already been checked to be a valid [Identifier],
//! and every model carries its built-in and foreign-key fields.

use crate::identifier::Identifier;
use indexmap::IndexMap;
use std::fmt;
use strum::{Display, EnumIter, EnumString};

/// A location in a schema file.
/// Lines and columns are 1-based; the default position (line 0) means "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Position {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// The position reached after reading `text` starting from `self`.
    pub fn advance(&self, text: &str) -> Self {
        let mut line = self.line;
        let mut column = self.column;
        for c in text.chars() {
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Self {
            file: self.file.clone(),
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// The text of an expression embedded in an attribute, and where it starts in the schema file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprSource {
    pub text: String,
    pub position: Position,
}

/// A single argument to an attribute, e.g. `expression: ctx.isAuthenticated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub label: Option<String>,
    pub source: ExprSource,
}

/// An attribute such as `@where(..)`, `@permission(..)` or `@default(..)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDef {
    pub name: String,
    pub arguments: Vec<Argument>,
    pub position: Position,
}

impl AttributeDef {
    /// The argument with the given label.
    pub fn labelled(&self, label: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.label.as_deref() == Some(label))
    }

    /// The first unlabelled argument.
    pub fn positional(&self) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.label.is_none())
    }
}

/// Where a field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrigin {
    /// Written in the schema.
    Declared,
    /// `id`, `createdAt` and `updatedAt`, present on every model.
    BuiltIn,
    /// The `fooId` column backing a to-one relationship `foo`.
    ForeignKey,
}

/// A field of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: Identifier,
    /// The declared type: a scalar type name, an enum name or a model name.
    pub type_name: Identifier,
    pub optional: bool,
    pub repeated: bool,
    /// For has-many fields, the name of the field on the other model that points back here.
    /// Set by `@relation(field)`; required only when the inverse is ambiguous.
    pub relation: Option<Identifier>,
    pub attributes: Vec<AttributeDef>,
    pub position: Position,
    pub origin: FieldOrigin,
}

impl FieldDef {
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// A model, which becomes a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDef {
    pub name: Identifier,
    /// Fields in declaration order, built-in fields first.
    pub fields: IndexMap<Identifier, FieldDef>,
    pub attributes: Vec<AttributeDef>,
    pub position: Position,
}

impl ModelDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: Identifier,
    pub values: Vec<Identifier>,
    pub position: Position,
}

impl EnumDef {
    pub fn has_value(&self, value: &str) -> bool {
        self.values.iter().any(|v| &**v == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDef {
    pub name: Identifier,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ActionKind {
    Get,
    List,
    Create,
    Update,
    Delete,
}

/// The type of an action input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputType {
    /// A path of fields starting at the action's model, e.g. `author.name`.
    Field(Vec<Identifier>),
    /// An explicitly typed input, e.g. `Text` or an enum name.
    Named(Identifier),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionInputDef {
    pub label: Option<Identifier>,
    pub ty: InputType,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDef {
    pub name: Identifier,
    pub model: Identifier,
    pub kind: ActionKind,
    pub inputs: Vec<ActionInputDef>,
    pub attributes: Vec<AttributeDef>,
    pub position: Position,
}

/// A validated schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub models: IndexMap<Identifier, ModelDef>,
    pub enums: IndexMap<Identifier, EnumDef>,
    pub roles: IndexMap<Identifier, RoleDef>,
    pub actions: Vec<ActionDef>,
}

impl Schema {
    pub fn model(&self, name: &str) -> Option<&ModelDef> {
        self.models.get(name)
    }

    pub fn enum_(&self, name: &str) -> Option<&EnumDef> {
        self.enums.get(name)
    }

    pub fn role(&self, name: &str) -> Option<&RoleDef> {
        self.roles.get(name)
    }

    /// The actions declared on the given model.
    pub fn actions_of<'a>(&'a self, model: &'a str) -> impl Iterator<Item = &'a ActionDef> + 'a {
        self.actions.iter().filter(move |a| &*a.model == model)
    }
}
