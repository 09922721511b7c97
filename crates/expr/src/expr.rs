use strata_parser::ast::Literal;

use crate::env::{Builtin, Operator};
use crate::ty::{Relationship, TypeDescriptor};

/// One relationship crossed by a field path.
///
/// For example, `post.author.name` crosses `Post.author`:
///
/// ```sql
/// left join author on post.author_id = author.id
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub field: String,
    pub source_model: String,
    pub target_model: String,
    pub to_many: bool,
    /// Joined column on the source model, e.g. `authorId`
    pub source_column: String,
    /// Joined column on the target model, e.g. `id`
    pub target_column: String,
}

impl From<&Relationship> for Hop {
    fn from(rel: &Relationship) -> Self {
        Self {
            field: rel.field.clone(),
            source_model: rel.source_model.clone(),
            target_model: rel.target_model.clone(),
            to_many: rel.to_many,
            source_column: rel.source_column.clone(),
            target_column: rel.target_column.clone(),
        }
    }
}

/// A column reached from the model variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The name of the model variable, e.g. `post`
    pub root: String,
    /// The model of the root variable
    pub model: String,
    pub hops: Vec<Hop>,
    /// The column on the last model of the path
    pub column: String,
    /// The column itself holds an array, e.g. `tags Text[]`
    pub array_column: bool,
}

impl FieldPath {
    /// The model whose table holds [Self::column]
    pub fn table_model(&self) -> &str {
        self.hops.last().map_or(&self.model, |hop| &hop.target_model)
    }

    /// The index of the first has-many hop, if the path crosses one
    pub fn first_to_many(&self) -> Option<usize> {
        self.hops.iter().position(|hop| hop.to_many)
    }

    pub fn crosses_to_many(&self) -> bool {
        self.first_to_many().is_some()
    }
}

/// A leaf of a checked expression whose value is not a literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A column of the current row or of a related row
    Field(FieldPath),
    /// A member of `ctx`, resolved by the caller when the query runs,
    /// e.g. `["identity", "id"]`
    Context(Vec<String>),
    /// An action input, bound by name when the query runs
    Input(String),
    EnumValue { enum_name: String, value: String },
    Role(String),
}

/// A type checked expression.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedExpr {
    Lit(Literal, TypeDescriptor),
    Operand(Operand, TypeDescriptor),
    Array(Vec<TypedExpr>, TypeDescriptor),
    Unary {
        op: Operator,
        expr: Box<TypedExpr>,
        ty: TypeDescriptor,
    },
    Binary {
        op: Operator,
        lhs: Box<TypedExpr>,
        rhs: Box<TypedExpr>,
        ty: TypeDescriptor,
        /// Matched by comparing a has-many path with a single value.
        /// True when any related row matches.
        legacy_any: bool,
    },
    Call {
        func: Builtin,
        args: Vec<TypedExpr>,
        ty: TypeDescriptor,
    },
    /// `post.title = value`, only ever at the root
    Assign {
        target: FieldPath,
        value: Box<TypedExpr>,
        ty: TypeDescriptor,
    },
}

impl TypedExpr {
    pub fn ty(&self) -> &TypeDescriptor {
        match self {
            Self::Lit(_, ty)
            | Self::Operand(_, ty)
            | Self::Array(_, ty)
            | Self::Unary { ty, .. }
            | Self::Binary { ty, .. }
            | Self::Call { ty, .. }
            | Self::Assign { ty, .. } => ty,
        }
    }

    /// How tightly this expression binds.
    /// Leaves and calls bind tighter than any operator.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Unary { op, .. } | Self::Binary { op, .. } => op.precedence(),
            Self::Assign { .. } => Operator::Assign.precedence(),
            Self::Lit(..) | Self::Operand(..) | Self::Array(..) | Self::Call { .. } => u8::MAX,
        }
    }

    /// The field path of this expression, if it is a column reference
    pub fn field_path(&self) -> Option<&FieldPath> {
        match self {
            Self::Operand(Operand::Field(path), _) => Some(path),
            _ => None,
        }
    }

    /// Visit every node of the tree, parents before children
    pub fn visit(&self, f: &mut impl FnMut(&Self)) {
        f(self);
        match self {
            Self::Lit(..) | Self::Operand(..) => {}
            Self::Array(elems, _) | Self::Call { args: elems, .. } => {
                for elem in elems {
                    elem.visit(f);
                }
            }
            Self::Unary { expr, .. } | Self::Assign { value: expr, .. } => expr.visit(f),
            Self::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
        }
    }
}
