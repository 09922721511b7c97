use convert_case::{Case, Casing};

/// The table of a model, e.g. `BlogPost` is stored in `blog_post`
pub fn table_name(model: &str) -> String {
    model.to_case(Case::Snake)
}

/// The column of a field, e.g. `authorId` is stored in `author_id`
pub fn column_name(field: &str) -> String {
    field.to_case(Case::Snake)
}

pub(crate) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// A table under an alias, as it appears in a `FROM` or `JOIN` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub table: String,
    pub alias: String,
}

impl TableRef {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
        }
    }

    /// The table of `model` under `alias`
    pub fn model(model: &str, alias: impl Into<String>) -> Self {
        Self::new(table_name(model), alias)
    }

    pub fn column(&self, field: &str) -> ColumnRef {
        ColumnRef::new(&self.alias, column_name(field))
    }

    pub(crate) fn fmt(&self) -> String {
        if self.table == self.alias {
            quote(&self.table)
        } else {
            format!("{} AS {}", quote(&self.table), quote(&self.alias))
        }
    }
}

/// A column qualified by the alias of its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    alias: String,
    column: String,
}

impl ColumnRef {
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            column: column.into(),
        }
    }

    pub(crate) fn fmt(&self) -> String {
        format!("{}.{}", quote(&self.alias), quote(&self.column))
    }

    pub fn column_name(&self) -> &str {
        &self.column
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(table_name("BlogPost"), "blog_post");
        assert_eq!(column_name("isActive"), "is_active");
        assert_eq!(column_name("authorId"), "author_id");
        assert_eq!(column_name("title"), "title");
    }

    #[test]
    fn formatting() {
        assert_eq!(TableRef::model("Post", "post").fmt(), r#""post""#);
        assert_eq!(TableRef::model("Author", "post$author").fmt(), r#""author" AS "post$author""#);
        assert_eq!(
            TableRef::model("Post", "post").column("publishDate").fmt(),
            r#""post"."publish_date""#
        );
        assert_eq!(quote(r#"a"b"#), r#""a""b""#);
    }
}
