use indexmap::IndexMap;
use itertools::Itertools;
use strata_expr::expr::Hop;

use crate::table::{ColumnRef, TableRef};

/// The alias of the table reached from `base` through `hops`,
/// e.g. `post$author$company` for `post.author.company`.
pub fn alias_of(base: &str, hops: &[Hop]) -> String {
    std::iter::once(base)
        .chain(hops.iter().map(|hop| hop.field.as_str()))
        .join("$")
}

/// One `LEFT JOIN` through a relationship field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: TableRef,
    /// The joined table's column, e.g. `"post$author"."id"`
    pub lhs_col: ColumnRef,
    /// The parent table's column, e.g. `"post"."author_id"`
    pub rhs_col: ColumnRef,
    pub to_many: bool,
}

impl Join {
    fn fmt(&self) -> String {
        format!(
            " LEFT JOIN {} ON {} = {}",
            self.table.fmt(),
            self.lhs_col.fmt(),
            self.rhs_col.fmt()
        )
    }
}

/// The joins of one `FROM` clause, keyed by alias.
///
/// Each relationship path is joined once,
/// no matter how many expressions select through it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinRegistry {
    joins: IndexMap<String, Join>,
}

impl JoinRegistry {
    /// Join `hops[skip..]`, the first `skip` hops being joined already
    /// (or being the table the registry belongs to).
    /// Returns the alias of the last table on the path.
    pub fn join_path(&mut self, base: &str, hops: &[Hop], skip: usize) -> String {
        for (i, hop) in hops.iter().enumerate().skip(skip) {
            let parent = alias_of(base, &hops[..i]);
            let alias = alias_of(base, &hops[..=i]);
            self.joins.entry(alias.clone()).or_insert_with(|| {
                let table = TableRef::model(&hop.target_model, alias);
                Join {
                    lhs_col: table.column(&hop.target_column),
                    rhs_col: TableRef::model(&hop.source_model, parent).column(&hop.source_column),
                    table,
                    to_many: hop.to_many,
                }
            });
        }
        alias_of(base, hops)
    }

    /// Whether a joined relationship may repeat the rows it is joined to
    pub fn has_to_many(&self) -> bool {
        self.joins.values().any(|join| join.to_many)
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Join> {
        self.joins.values()
    }

    /// Every join, in the order it was first needed
    pub(crate) fn fmt(&self) -> String {
        self.joins.values().map(Join::fmt).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hop(field: &str, source: &str, target: &str, to_many: bool) -> Hop {
        let (source_column, target_column) = if to_many {
            ("id".to_owned(), format!("{}Id", source.to_lowercase()))
        } else {
            (format!("{field}Id"), "id".to_owned())
        };
        Hop {
            field: field.into(),
            source_model: source.into(),
            target_model: target.into(),
            to_many,
            source_column,
            target_column,
        }
    }

    #[test]
    fn paths_are_joined_once() {
        let author = hop("author", "Post", "Author", false);
        let posts = hop("posts", "Author", "Post", true);

        let mut joins = JoinRegistry::default();
        assert_eq!(joins.join_path("post", std::slice::from_ref(&author), 0), "post$author");
        assert_eq!(joins.join_path("post", &[author.clone(), posts.clone()], 0), "post$author$posts");
        assert_eq!(joins.join_path("post", std::slice::from_ref(&author), 0), "post$author");

        assert_eq!(joins.iter().count(), 2);
        assert!(joins.has_to_many());
        assert_eq!(
            joins.fmt(),
            concat!(
                r#" LEFT JOIN "author" AS "post$author" ON "post$author"."id" = "post"."author_id""#,
                r#" LEFT JOIN "post" AS "post$author$posts" ON "post$author$posts"."author_id" = "post$author"."id""#,
            )
        );
    }

    #[test]
    fn skipped_hops_are_not_joined() {
        let comments = hop("comments", "Post", "Comment", true);
        let author = hop("author", "Comment", "Author", false);

        let mut joins = JoinRegistry::default();
        let alias = joins.join_path("post", &[comments, author], 1);
        assert_eq!(alias, "post$comments$author");
        assert_eq!(
            joins.fmt(),
            r#" LEFT JOIN "author" AS "post$comments$author" ON "post$comments$author"."id" = "post$comments"."author_id""#
        );
        assert!(!joins.has_to_many());
    }
}
