//! Resolution of dotted identifier paths.
//!
//! A path such as `post.author.name` is resolved one fragment at a time.
//! Each fragment is looked up in the current [Scope]; the entity it names
//! determines the child scope the next fragment is looked up in.

use std::fmt;

use strata_parser::ast::{Expr, Literal, Path};

use crate::config::HintConfig;
use crate::env::Operator;
use crate::errors::Diagnostic;
use crate::ty::{ObjectType, TypeDescriptor, TypeRegistry};

/// Where a [EntityKind::Typed] value comes from at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// An action input
    Input,
    /// A member of `ctx`
    Context,
    /// A member of a dynamic `ctx` value, e.g. `ctx.headers.X`
    Dynamic,
    /// A role name
    Role,
}

/// A field reached through a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    /// The model declaring the field
    pub model: String,
    pub type_name: String,
    pub optional: bool,
    pub repeated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    /// A variable holding a row of `model`
    Model { model: String },
    Field(FieldRef),
    /// A structured value with fixed members, e.g. `ctx`
    Object { ty: ObjectType, origin: Origin },
    /// An enum namespace, e.g. `Status` in `Status.Draft`
    Enum { name: String },
    EnumValue { enum_name: String },
    Literal(Literal),
    Array(Vec<ScopeEntity>),
    /// A value known only by its type, e.g. an action input
    Typed {
        ty: TypeDescriptor,
        optional: bool,
        origin: Origin,
    },
}

/// A name resolvable at some point of a path.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeEntity {
    pub name: String,
    pub kind: EntityKind,
    /// The entity this one was reached through
    pub parent: Option<Box<ScopeEntity>>,
}

impl ScopeEntity {
    pub fn root(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: None,
        }
    }

    fn child(&self, name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Wrap a literal operand without walking any scope.
    /// Returns `None` for anything that is not a literal or a list of literals.
    pub fn from_literal(expr: &Expr) -> Option<Self> {
        match expr {
            Expr::Lit(lit, _) => Some(Self::root(lit.to_string(), EntityKind::Literal(lit.clone()))),
            Expr::Array(elems, _) => {
                let elems = elems.iter().map(Self::from_literal).collect::<Option<Vec<_>>>()?;
                Some(Self::root(expr.to_string(), EntityKind::Array(elems)))
            }
            _ => None,
        }
    }

    /// The entities from the root variable down to `self`
    pub fn chain(&self) -> Vec<&ScopeEntity> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(parent) = &current.parent {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// The dotted path that reached this entity, e.g. `post.author.name`
    pub fn path(&self) -> String {
        self.chain().iter().map(|e| e.name.as_str()).collect::<Vec<_>>().join(".")
    }

    /// True for list literals, repeated fields,
    /// and anything reached through a repeated field however far up the chain.
    pub fn is_repeated(&self) -> bool {
        let own = match &self.kind {
            EntityKind::Array(_) => true,
            EntityKind::Field(field) => field.repeated,
            EntityKind::Typed { ty, .. } => ty.is_array(),
            _ => false,
        };
        own || self.parent.as_ref().is_some_and(|p| p.is_repeated())
    }

    /// The type of the value this entity denotes, or `None` for enum namespaces.
    /// Anything reached through a repeated field is an array.
    pub fn ty(&self, registry: &TypeRegistry) -> Option<TypeDescriptor> {
        let ty = match &self.kind {
            EntityKind::Model { model } => TypeDescriptor::Model(model.clone()),
            EntityKind::Field(field) => registry.resolve(&field.type_name)?,
            EntityKind::Object { ty, .. } => TypeDescriptor::Object(ty.clone()),
            EntityKind::Enum { .. } => return None,
            EntityKind::EnumValue { enum_name } => TypeDescriptor::Enum(enum_name.clone()),
            EntityKind::Literal(lit) => literal_type(lit),
            EntityKind::Array(elems) => {
                let elem = elems.first().and_then(|e| e.ty(registry)).unwrap_or(TypeDescriptor::Null);
                TypeDescriptor::array(elem)
            }
            EntityKind::Typed { ty, .. } => ty.clone(),
        };
        Some(if self.is_repeated() { TypeDescriptor::array(ty) } else { ty })
    }

    /// The model whose fields are this entity's children, if any
    fn model_of(&self, registry: &TypeRegistry) -> Option<String> {
        match &self.kind {
            EntityKind::Model { model } => Some(model.clone()),
            EntityKind::Field(field) if registry.is_model(&field.type_name) => Some(field.type_name.clone()),
            EntityKind::Typed {
                ty: TypeDescriptor::Model(model),
                origin: Origin::Context,
                ..
            } => Some(model.clone()),
            _ => None,
        }
    }

    /// The child scope of this entity
    fn children(&self, registry: &TypeRegistry) -> Scope {
        let entities = if let Some(model) = self.model_of(registry) {
            registry
                .model(&model)
                .map(|def| {
                    def.fields
                        .values()
                        .map(|f| {
                            self.child(
                                f.name.to_string(),
                                EntityKind::Field(FieldRef {
                                    model: model.clone(),
                                    type_name: f.type_name.to_string(),
                                    optional: f.optional,
                                    repeated: f.repeated,
                                }),
                            )
                        })
                        .collect()
                })
                .unwrap_or_default()
        } else {
            match &self.kind {
                EntityKind::Object { ty, .. } => ty
                    .fields
                    .iter()
                    .map(|(name, ty)| {
                        let kind = match ty {
                            TypeDescriptor::Object(obj) => EntityKind::Object {
                                ty: obj.clone(),
                                origin: Origin::Context,
                            },
                            ty => EntityKind::Typed {
                                ty: ty.clone(),
                                optional: false,
                                origin: Origin::Context,
                            },
                        };
                        self.child(name.clone(), kind)
                    })
                    .collect(),
                EntityKind::Enum { name } => registry
                    .schema()
                    .enum_(name)
                    .map(|def| {
                        def.values
                            .iter()
                            .map(|v| {
                                self.child(
                                    v.to_string(),
                                    EntityKind::EnumValue {
                                        enum_name: name.clone(),
                                    },
                                )
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
                _ => vec![],
            }
        };
        Scope::new(entities)
    }

    /// The member `name` of a dynamic value: any name resolves, and every member is Text
    fn dynamic_member(&self, name: &str) -> Option<ScopeEntity> {
        matches!(self.kind, EntityKind::Typed { ty: TypeDescriptor::Dynamic, .. }).then(|| {
            self.child(
                name,
                EntityKind::Typed {
                    ty: TypeDescriptor::text(),
                    optional: true,
                    origin: Origin::Dynamic,
                },
            )
        })
    }

    /// The operators that make sense with this entity on the left, for completions.
    /// The checker does not consult this.
    pub fn allowed_operators(&self, registry: &TypeRegistry) -> Vec<Operator> {
        use Operator::*;
        if self.is_repeated() {
            return vec![In, NotIn];
        }
        match self.ty(registry) {
            Some(TypeDescriptor::Model(_)) => vec![Equals, NotEquals, Assign],
            Some(TypeDescriptor::Enum(_)) => vec![Equals, NotEquals, In, NotIn, Assign],
            Some(ty) if ty.is_numeric() => vec![
                Equals,
                NotEquals,
                Less,
                LessEquals,
                Greater,
                GreaterEquals,
                In,
                NotIn,
                Add,
                Subtract,
                Multiply,
                Divide,
                Assign,
            ],
            Some(ty) if ty.is_text() => vec![
                Equals,
                NotEquals,
                Less,
                LessEquals,
                Greater,
                GreaterEquals,
                In,
                NotIn,
                Add,
                Assign,
            ],
            Some(TypeDescriptor::Scalar(_)) => vec![
                Equals,
                NotEquals,
                Less,
                LessEquals,
                Greater,
                GreaterEquals,
                Assign,
            ],
            Some(TypeDescriptor::Role) => vec![Equals, NotEquals, In, NotIn],
            _ => vec![],
        }
    }
}

impl fmt::Display for ScopeEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// The type of a literal
pub fn literal_type(lit: &Literal) -> TypeDescriptor {
    match lit {
        Literal::Bool(_) => TypeDescriptor::boolean(),
        Literal::Null => TypeDescriptor::Null,
        Literal::Num(_) if lit.is_decimal() => TypeDescriptor::decimal(),
        Literal::Num(_) => TypeDescriptor::number(),
        Literal::Str(_) => TypeDescriptor::text(),
    }
}

/// The names visible at one step of a resolution
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub entities: Vec<ScopeEntity>,
}

impl Scope {
    pub fn new(entities: Vec<ScopeEntity>) -> Self {
        Self { entities }
    }

    pub fn lookup(&self, name: &str) -> Option<&ScopeEntity> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Every name visible from this scope
    pub fn names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name.as_str()).collect()
    }
}

/// Suggest in-scope names close to `name`, best first
pub fn suggest(name: &str, candidates: &[&str], config: &HintConfig) -> Vec<String> {
    let lower = name.to_lowercase();
    let mut scored = candidates
        .iter()
        .filter(|c| **c != name)
        .map(|c| (strsim::jaro_winkler(&lower, &c.to_lowercase()), *c))
        .filter(|(score, _)| *score >= config.similarity_threshold)
        .collect::<Vec<_>>();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored
        .into_iter()
        .take(config.max_suggestions)
        .map(|(_, c)| c.to_owned())
        .collect()
}

/// Resolve every fragment of `path`, starting in `root`.
pub fn resolve(path: &Path, root: &Scope, registry: &TypeRegistry, hints: &HintConfig) -> Result<ScopeEntity, Diagnostic> {
    let mut fragments = path.parts.iter();
    let Some(first) = fragments.next() else {
        return Err(Diagnostic::UndeclaredReference {
            name: String::new(),
            hints: vec![],
            span: path.span,
        });
    };
    let mut entity = root.lookup(&first.name).cloned().ok_or_else(|| Diagnostic::UndeclaredReference {
        name: first.name.clone(),
        hints: suggest(&first.name, &root.names(), hints),
        span: first.span,
    })?;

    for fragment in fragments {
        if let Some(member) = entity.dynamic_member(&fragment.name) {
            entity = member;
            continue;
        }
        let scope = entity.children(registry);
        entity = match scope.lookup(&fragment.name) {
            Some(child) => child.clone(),
            None => {
                return Err(Diagnostic::UndeclaredReference {
                    name: format!("{}.{}", entity.path(), fragment.name),
                    hints: suggest(&fragment.name, &scope.names(), hints),
                    span: fragment.span,
                });
            }
        };
    }
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{order_schema, root_scope};
    use pretty_assertions::assert_eq;
    use strata_parser::parse_expr;
    use strata_schema::SchemaBuilder;

    fn path(text: &str) -> Path {
        match parse_expr(text) {
            Ok(Expr::Path(path)) => path,
            other => panic!("{text} is not a path: {other:?}"),
        }
    }

    #[test]
    fn repeatedness_propagates() -> anyhow::Result<()> {
        let schema = order_schema();
        let registry = TypeRegistry::new(&schema)?;
        let root = root_scope(&registry, "Order");

        let price = resolve(&path("order.items.product.price"), &root, &registry, &HintConfig::default())?;
        assert!(price.is_repeated());
        assert_eq!(
            price.ty(&registry),
            Some(TypeDescriptor::array(TypeDescriptor::decimal()))
        );
        assert_eq!(price.path(), "order.items.product.price");

        let total = resolve(&path("order.total"), &root, &registry, &HintConfig::default())?;
        assert!(!total.is_repeated());
        Ok(())
    }

    #[test]
    fn child_scopes_hide_root_variables() -> anyhow::Result<()> {
        let schema = order_schema();
        let registry = TypeRegistry::new(&schema)?;
        let root = root_scope(&registry, "Order");
        assert!(root.lookup("ctx").is_some());

        let order = resolve(&path("order"), &root, &registry, &HintConfig::default())?;
        let fields = order.children(&registry);
        assert!(fields.lookup("ctx").is_none());
        assert!(!fields.names().contains(&"order"));

        let err = resolve(&path("order.ctx"), &root, &registry, &HintConfig::default()).unwrap_err();
        assert!(matches!(err, Diagnostic::UndeclaredReference { .. }), "{err}");
        Ok(())
    }

    #[test]
    fn unknown_identifier_hint() -> anyhow::Result<()> {
        let schema = SchemaBuilder::new().model("Person", |m| m.field("name", "Text")).finish()?;
        let registry = TypeRegistry::new(&schema)?;
        let root = root_scope(&registry, "Person");

        let err = resolve(&path("person.naem"), &root, &registry, &HintConfig::default()).unwrap_err();
        let Diagnostic::UndeclaredReference { name, hints, span } = err else {
            panic!("unexpected diagnostic {err}");
        };
        assert_eq!(name, "person.naem");
        assert_eq!(hints, vec!["name".to_string()]);
        assert_eq!(span.start, "person.".len());
        Ok(())
    }

    #[test]
    fn enums_context_and_dynamic() -> anyhow::Result<()> {
        let schema = order_schema();
        let registry = TypeRegistry::new(&schema)?;
        let root = root_scope(&registry, "Order");
        let hints = HintConfig::default();

        let draft = resolve(&path("Status.Pending"), &root, &registry, &hints)?;
        assert_eq!(draft.ty(&registry), Some(TypeDescriptor::Enum("Status".into())));
        assert!(resolve(&path("Status.Pending.x"), &root, &registry, &hints).is_err());
        assert_eq!(resolve(&path("Status"), &root, &registry, &hints)?.ty(&registry), None);

        let email = resolve(&path("ctx.identity.email"), &root, &registry, &hints)?;
        assert_eq!(email.ty(&registry), Some(TypeDescriptor::text()));

        let header = resolve(&path("ctx.headers.X_Api_Key"), &root, &registry, &hints)?;
        assert_eq!(header.ty(&registry), Some(TypeDescriptor::text()));

        assert!(resolve(&path("ctx.nope"), &root, &registry, &hints).is_err());
        Ok(())
    }

    #[test]
    fn literals_skip_the_scope_walk() {
        let entity = ScopeEntity::from_literal(&parse_expr("[1, 2]").unwrap()).unwrap();
        assert!(entity.is_repeated());
        assert!(ScopeEntity::from_literal(&parse_expr("[a]").unwrap()).is_none());
    }

    #[test]
    fn allowed_operators() -> anyhow::Result<()> {
        let schema = order_schema();
        let registry = TypeRegistry::new(&schema)?;
        let root = root_scope(&registry, "Order");
        let hints = HintConfig::default();

        let items = resolve(&path("order.items"), &root, &registry, &hints)?;
        assert_eq!(items.allowed_operators(&registry), vec![Operator::In, Operator::NotIn]);

        let customer = resolve(&path("order.customer"), &root, &registry, &hints)?;
        assert_eq!(
            customer.allowed_operators(&registry),
            vec![Operator::Equals, Operator::NotEquals, Operator::Assign]
        );

        let total = resolve(&path("order.total"), &root, &registry, &hints)?;
        assert!(total.allowed_operators(&registry).contains(&Operator::Greater));
        Ok(())
    }

    #[test]
    fn suggestions_are_ranked_and_capped() {
        let config = HintConfig {
            similarity_threshold: 0.7,
            max_suggestions: 2,
        };
        let hints = suggest("titel", &["title", "titles", "body", "tile"], &config);
        assert_eq!(hints.len(), 2);
        assert_eq!(hints[0], "title");
    }
}
