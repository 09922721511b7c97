use serde::Serialize;

/// A constant bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(i64),
    Decimal(f64),
    Text(String),
}

/// What a `?` placeholder is bound to when the query runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Arg {
    Value(Value),
    /// A member of the request context, e.g. `["identity", "id"]`
    Context(Vec<String>),
    /// An action input, by variable name
    Input(String),
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}
