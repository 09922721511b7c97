//! A builder for [Schema]s.
//!
//! The schema-DSL parser (or a test) describes models, enums, roles and actions with plain strings.
//! [SchemaBuilder::finish] validates every name, rejects duplicates, and adds the fields every model
//! implicitly carries.

use crate::def::{
    ActionDef, ActionInputDef, ActionKind, Argument, AttributeDef, EnumDef, ExprSource, FieldDef, FieldOrigin,
    InputType, ModelDef, Position, RoleDef, Schema,
};
use crate::error::SchemaError;
use crate::identifier::Identifier;
use indexmap::IndexMap;
use std::collections::HashSet;

/// The scalar types a field may be declared with.
pub const SCALAR_TYPE_NAMES: &[&str] = &["Text", "ID", "Number", "Decimal", "Boolean", "Date", "Timestamp", "Markdown"];

/// The name of the model describing an authenticated caller.
pub const IDENTITY_MODEL: &str = "Identity";

fn ident(name: &str) -> Result<Identifier, SchemaError> {
    Ok(Identifier::new(name.into())?)
}

/// An attribute before validation.
#[derive(Debug, Clone)]
pub struct RawAttribute {
    name: String,
    arguments: Vec<Argument>,
    position: Position,
}

impl RawAttribute {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            arguments: vec![],
            position: Position::default(),
        }
    }

    /// An attribute with a single unlabelled expression argument, e.g. `@where(post.published)`.
    pub fn expr(name: &str, text: &str) -> Self {
        Self::new(name).arg(None, text)
    }

    pub fn arg(mut self, label: Option<&str>, text: &str) -> Self {
        let position = self.position.clone();
        self.arguments.push(Argument {
            label: label.map(Into::into),
            source: ExprSource {
                text: text.into(),
                position,
            },
        });
        self
    }

    /// Add an argument whose text starts at `position`.
    pub fn arg_at(mut self, label: Option<&str>, text: &str, position: Position) -> Self {
        self.arguments.push(Argument {
            label: label.map(Into::into),
            source: ExprSource {
                text: text.into(),
                position,
            },
        });
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    fn finish(self) -> AttributeDef {
        AttributeDef {
            name: self.name,
            arguments: self.arguments,
            position: self.position,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawField {
    name: String,
    type_name: String,
    optional: bool,
    repeated: bool,
    relation: Option<String>,
    attributes: Vec<RawAttribute>,
    position: Position,
}

impl RawField {
    fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            optional: false,
            repeated: false,
            relation: None,
            attributes: vec![],
            position: Position::default(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    pub fn relation(mut self, field: &str) -> Self {
        self.relation = Some(field.into());
        self
    }

    pub fn attribute(mut self, attr: RawAttribute) -> Self {
        self.attributes.push(attr);
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RawModel {
    name: String,
    fields: Vec<RawField>,
    attributes: Vec<RawAttribute>,
    position: Position,
}

impl RawModel {
    pub fn field(self, name: &str, type_name: &str) -> Self {
        self.field_with(name, type_name, |f| f)
    }

    pub fn field_with(mut self, name: &str, type_name: &str, f: impl FnOnce(RawField) -> RawField) -> Self {
        self.fields.push(f(RawField::new(name, type_name)));
        self
    }

    pub fn attribute(mut self, attr: RawAttribute) -> Self {
        self.attributes.push(attr);
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RawActionInput {
    label: Option<String>,
    ty: RawInputType,
    optional: bool,
}

#[derive(Debug, Clone)]
enum RawInputType {
    Field(String),
    Named(String),
}

impl RawActionInput {
    /// An input typed by a dotted field path, e.g. `author.name`.
    pub fn field(path: &str) -> Self {
        Self {
            label: None,
            ty: RawInputType::Field(path.into()),
            optional: false,
        }
    }

    /// An explicitly typed input, `label: Type`.
    pub fn named(label: &str, type_name: &str) -> Self {
        Self {
            label: Some(label.into()),
            ty: RawInputType::Named(type_name.into()),
            optional: false,
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RawAction {
    name: String,
    model: String,
    kind: ActionKind,
    inputs: Vec<RawActionInput>,
    attributes: Vec<RawAttribute>,
    position: Position,
}

impl RawAction {
    pub fn input(mut self, input: RawActionInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn attribute(mut self, attr: RawAttribute) -> Self {
        self.attributes.push(attr);
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}

/// Collects raw definitions and validates them into a [Schema].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    models: Vec<RawModel>,
    enums: Vec<(String, Vec<String>, Position)>,
    roles: Vec<(String, Position)>,
    actions: Vec<RawAction>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, name: &str, f: impl FnOnce(RawModel) -> RawModel) -> Self {
        let model = RawModel {
            name: name.into(),
            fields: vec![],
            attributes: vec![],
            position: Position::default(),
        };
        self.models.push(f(model));
        self
    }

    pub fn enum_<'a>(mut self, name: &str, values: impl IntoIterator<Item = &'a str>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.enums.push((name.into(), values, Position::default()));
        self
    }

    pub fn role(mut self, name: &str) -> Self {
        self.roles.push((name.into(), Position::default()));
        self
    }

    pub fn action(
        mut self,
        name: &str,
        model: &str,
        kind: ActionKind,
        f: impl FnOnce(RawAction) -> RawAction,
    ) -> Self {
        let action = RawAction {
            name: name.into(),
            model: model.into(),
            kind,
            inputs: vec![],
            attributes: vec![],
            position: Position::default(),
        };
        self.actions.push(f(action));
        self
    }

    /// Validate the collected definitions.
    pub fn finish(self) -> Result<Schema, SchemaError> {
        let mut schema = Schema::default();
        let mut type_names = HashSet::new();
        let mut check_type_name = |name: &Identifier, kind: &'static str| {
            if SCALAR_TYPE_NAMES.contains(&&**name) || !type_names.insert(name.clone()) {
                return Err(SchemaError::DuplicateName {
                    kind,
                    name: name.to_string(),
                });
            }
            Ok(())
        };

        for (name, values, position) in self.enums {
            let name = ident(&name)?;
            check_type_name(&name, "type")?;
            let mut seen = HashSet::new();
            let values = values
                .iter()
                .map(|v| {
                    let v = ident(v)?;
                    if !seen.insert(v.clone()) {
                        return Err(SchemaError::DuplicateEnumValue {
                            name: name.to_string(),
                            value: v.to_string(),
                        });
                    }
                    Ok(v)
                })
                .collect::<Result<_, _>>()?;
            schema.enums.insert(name.clone(), EnumDef { name, values, position });
        }

        for (name, position) in self.roles {
            let name = ident(&name)?;
            check_type_name(&name, "type")?;
            schema.roles.insert(name.clone(), RoleDef { name, position });
        }

        let mut models = self.models;
        if !models.iter().any(|m| m.name == IDENTITY_MODEL) {
            models.push(identity_model());
        }

        let model_names = models.iter().map(|m| m.name.clone()).collect::<HashSet<_>>();
        for raw in models {
            let name = ident(&raw.name)?;
            check_type_name(&name, "type")?;
            let model = finish_model(name, raw, &model_names, &schema)?;
            schema.models.insert(model.name.clone(), model);
        }

        for raw in self.actions {
            let name = ident(&raw.name)?;
            if !model_names.contains(&raw.model) {
                return Err(SchemaError::UnknownActionModel {
                    action: name.to_string(),
                    model: raw.model,
                });
            }
            let inputs = raw
                .inputs
                .into_iter()
                .map(|input| {
                    let ty = match input.ty {
                        RawInputType::Field(path) => {
                            InputType::Field(path.split('.').map(ident).collect::<Result<_, _>>()?)
                        }
                        RawInputType::Named(ty) => InputType::Named(ident(&ty)?),
                    };
                    Ok(ActionInputDef {
                        label: input.label.as_deref().map(ident).transpose()?,
                        ty,
                        optional: input.optional,
                    })
                })
                .collect::<Result<_, SchemaError>>()?;
            schema.actions.push(ActionDef {
                name,
                model: ident(&raw.model)?,
                kind: raw.kind,
                inputs,
                attributes: raw.attributes.into_iter().map(RawAttribute::finish).collect(),
                position: raw.position,
            });
        }

        Ok(schema)
    }
}

fn finish_model(
    name: Identifier,
    raw: RawModel,
    model_names: &HashSet<String>,
    schema: &Schema,
) -> Result<ModelDef, SchemaError> {
    let mut fields = IndexMap::new();
    let mut push = |field: FieldDef| {
        if fields.contains_key(&*field.name) {
            return Err(SchemaError::DuplicateField {
                model: name.to_string(),
                field: field.name.to_string(),
            });
        }
        fields.insert(field.name.clone(), field);
        Ok(())
    };

    let declared = raw.fields.iter().map(|f| f.name.as_str()).collect::<HashSet<_>>();
    let built_in = |field: &str, type_name: &str| -> Result<Option<FieldDef>, SchemaError> {
        if declared.contains(field) {
            return Ok(None);
        }
        Ok(Some(FieldDef {
            name: ident(field)?,
            type_name: ident(type_name)?,
            optional: false,
            repeated: false,
            relation: None,
            attributes: vec![],
            position: raw.position.clone(),
            origin: FieldOrigin::BuiltIn,
        }))
    };

    if let Some(id) = built_in("id", "ID")? {
        push(id)?;
    }

    for f in &raw.fields {
        let type_name = ident(&f.type_name)?;
        let is_model = model_names.contains(&f.type_name);
        if !is_model && !SCALAR_TYPE_NAMES.contains(&&*type_name) && schema.enum_(&type_name).is_none() {
            return Err(SchemaError::UnknownFieldType {
                model: name.to_string(),
                field: f.name.clone(),
                type_name: f.type_name.clone(),
            });
        }
        push(FieldDef {
            name: ident(&f.name)?,
            type_name,
            optional: f.optional,
            repeated: f.repeated,
            relation: f.relation.as_deref().map(ident).transpose()?,
            attributes: f.attributes.iter().cloned().map(RawAttribute::finish).collect(),
            position: f.position.clone(),
            origin: FieldOrigin::Declared,
        })?;

        // A to-one relationship is stored as a foreign key column next to it.
        let fk = format!("{}Id", f.name);
        if is_model && !f.repeated && !declared.contains(fk.as_str()) {
            push(FieldDef {
                name: ident(&fk)?,
                type_name: ident("ID")?,
                optional: f.optional,
                repeated: false,
                relation: None,
                attributes: vec![],
                position: f.position.clone(),
                origin: FieldOrigin::ForeignKey,
            })?;
        }
    }

    for (field, ty) in [("createdAt", "Timestamp"), ("updatedAt", "Timestamp")] {
        if let Some(def) = built_in(field, ty)? {
            push(def)?;
        }
    }

    Ok(ModelDef {
        name,
        fields,
        attributes: raw.attributes.into_iter().map(RawAttribute::finish).collect(),
        position: raw.position,
    })
}

fn identity_model() -> RawModel {
    RawModel {
        name: IDENTITY_MODEL.into(),
        fields: vec![],
        attributes: vec![],
        position: Position::default(),
    }
    .field_with("email", "Text", |f| f.optional())
    .field("emailVerified", "Boolean")
    .field_with("externalId", "Text", |f| f.optional())
    .field_with("issuer", "Text", |f| f.optional())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IdentifierError;
    use pretty_assertions::assert_eq;

    fn field_names(model: &ModelDef) -> Vec<&str> {
        model.fields.keys().map(|k| &**k).collect()
    }

    #[test]
    fn built_in_and_foreign_key_fields() -> Result<(), SchemaError> {
        let schema = SchemaBuilder::new()
            .model("Author", |m| m.field("name", "Text").field_with("posts", "Post", |f| f.repeated()))
            .model("Post", |m| m.field("title", "Text").field("author", "Author"))
            .finish()?;

        let post = schema.model("Post").unwrap();
        assert_eq!(
            field_names(post),
            vec!["id", "title", "author", "authorId", "createdAt", "updatedAt"]
        );
        assert_eq!(post.field("authorId").unwrap().origin, FieldOrigin::ForeignKey);

        // has-many relationships have no column of their own
        let author = schema.model("Author").unwrap();
        assert_eq!(field_names(author), vec!["id", "name", "posts", "createdAt", "updatedAt"]);
        Ok(())
    }

    #[test]
    fn identity_is_synthesized() -> Result<(), SchemaError> {
        let schema = SchemaBuilder::new().finish()?;
        let identity = schema.model(IDENTITY_MODEL).unwrap();
        assert_eq!(
            field_names(identity),
            vec!["id", "email", "emailVerified", "externalId", "issuer", "createdAt", "updatedAt"]
        );
        assert!(identity.field("email").unwrap().optional);
        Ok(())
    }

    #[test]
    fn invalid_schemas() {
        struct TestCase {
            builder: SchemaBuilder,
            err: SchemaError,
        }

        for TestCase { builder, err } in [
            TestCase {
                builder: SchemaBuilder::new().model("Post", |m| m).enum_("Post", ["A"]),
                err: SchemaError::DuplicateName {
                    kind: "type",
                    name: "Post".into(),
                },
            },
            TestCase {
                builder: SchemaBuilder::new().model("Post", |m| m.field("title", "Text").field("title", "Text")),
                err: SchemaError::DuplicateField {
                    model: "Post".into(),
                    field: "title".into(),
                },
            },
            TestCase {
                builder: SchemaBuilder::new().enum_("Status", ["Draft", "Draft"]),
                err: SchemaError::DuplicateEnumValue {
                    name: "Status".into(),
                    value: "Draft".into(),
                },
            },
            TestCase {
                builder: SchemaBuilder::new().model("Post", |m| m.field("title", "Txt")),
                err: SchemaError::UnknownFieldType {
                    model: "Post".into(),
                    field: "title".into(),
                    type_name: "Txt".into(),
                },
            },
            TestCase {
                builder: SchemaBuilder::new().action("getPost", "Pst", ActionKind::Get, |a| a),
                err: SchemaError::UnknownActionModel {
                    action: "getPost".into(),
                    model: "Pst".into(),
                },
            },
            TestCase {
                builder: SchemaBuilder::new().model("Post", |m| m.field("not", "Text")),
                err: SchemaError::Identifier {
                    error: IdentifierError::Reserved { name: "not".into() },
                },
            },
            TestCase {
                builder: SchemaBuilder::new().role("Text"),
                err: SchemaError::DuplicateName {
                    kind: "type",
                    name: "Text".into(),
                },
            },
        ] {
            assert_eq!(builder.finish(), Err(err));
        }
    }

    #[test]
    fn action_inputs() -> Result<(), SchemaError> {
        let schema = SchemaBuilder::new()
            .model("Post", |m| m.field("title", "Text"))
            .action("listPosts", "Post", ActionKind::List, |a| {
                a.input(RawActionInput::field("title"))
                    .input(RawActionInput::named("limit", "Number").optional())
            })
            .finish()?;

        let action = schema.actions_of("Post").next().unwrap();
        assert_eq!(action.kind, ActionKind::List);
        assert_eq!(action.inputs.len(), 2);
        assert_eq!(action.inputs[0].label, None);
        assert!(matches!(&action.inputs[0].ty, InputType::Field(path) if path.len() == 1));
        assert!(action.inputs[1].optional);
        Ok(())
    }

    #[test]
    fn position_advance() {
        let start = Position::new("schema.keel", 3, 12);
        assert_eq!(start.advance("post.title"), Position::new("schema.keel", 3, 22));
        assert_eq!(start.advance("a and\n  b"), Position::new("schema.keel", 4, 4));
    }
}
