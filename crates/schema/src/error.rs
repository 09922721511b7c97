use thiserror::Error;

/// Errors raised while assembling a [crate::Schema].
///
/// These describe a schema that cannot be handed to the expression compiler,
/// as opposed to an expression inside the schema that fails to validate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchemaError {
    #[error("name `{name}` is used for multiple {kind}s")]
    DuplicateName { kind: &'static str, name: String },
    #[error("model `{model}` declares field `{field}` more than once")]
    DuplicateField { model: String, field: String },
    #[error("enum `{name}` declares value `{value}` more than once")]
    DuplicateEnumValue { name: String, value: String },
    #[error("field `{model}.{field}` has unknown type `{type_name}`")]
    UnknownFieldType {
        model: String,
        field: String,
        type_name: String,
    },
    #[error("action `{action}` refers to unknown model `{model}`")]
    UnknownActionModel { action: String, model: String },
    #[error("schema contains invalid identifier: {error}")]
    Identifier { error: IdentifierError },
}

impl From<IdentifierError> for SchemaError {
    fn from(error: IdentifierError) -> Self {
        Self::Identifier { error }
    }
}

/// A reason that a string is not a valid identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// The identifier is not in Unicode Normalization Form C.
    #[error(
        "Identifier `{name}` is not in normalization form C according to Unicode Standard Annex 15 \
        (http://www.unicode.org/reports/tr15/) and cannot be used in a schema."
    )]
    NotCanonicalized { name: String },

    /// The identifier collides with an expression keyword.
    #[error("Identifier `{name}` is reserved by the expression language and cannot be used in a schema.")]
    Reserved { name: String },

    #[error(
        "Identifier `{name}`'s starting character '{invalid_start}' is neither an underscore ('_') nor a \
        Unicode XID_start character (according to Unicode Standard Annex 31, https://www.unicode.org/reports/tr31/) \
        and cannot be used in a schema."
    )]
    InvalidStart { name: String, invalid_start: char },

    #[error(
        "Identifier `{name}` contains a character '{invalid_continue}' that is not an XID_continue character \
        (according to Unicode Standard Annex 31, https://www.unicode.org/reports/tr31/) \
        and cannot be used in a schema."
    )]
    InvalidContinue { name: String, invalid_continue: char },

    #[error("Empty identifiers are forbidden.")]
    Empty {},
}
