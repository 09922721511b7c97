//! Schema in, SQL out.

use pretty_assertions::assert_eq;
use strata_expr::env::{ActionInputs, Assignment, Env, ReturnType};
use strata_expr::test_utils::env_for;
use strata_expr::{validate_schema, CheckedExpr, CompilerConfig};
use strata_query_builder::{compile, compile_assignment, Arg, QueryBuilder, Value};
use strata_schema::builder::{RawActionInput, RawAttribute};
use strata_schema::def::{ActionDef, ActionKind};
use strata_schema::{Schema, SchemaBuilder};

fn checked(env: &Env, text: &str) -> anyhow::Result<CheckedExpr> {
    strata_expr::compile(env, text).map_err(|errors| anyhow::anyhow!("{text}: {errors:?}"))
}

fn where_env(schema: &Schema, model: &str) -> anyhow::Result<Env> {
    Ok(env_for(schema, model)?.with(ReturnType::boolean())?)
}

/// The text of every `@name(..)` on `action`
fn attribute_texts<'a>(action: &'a ActionDef, name: &'a str) -> impl Iterator<Item = &'a str> {
    action
        .attributes
        .iter()
        .filter(move |attr| attr.name == name)
        .filter_map(|attr| attr.positional())
        .map(|arg| &*arg.source.text)
}

#[test]
fn boolean_field() -> anyhow::Result<()> {
    let schema = SchemaBuilder::new()
        .model("Thing", |m| m.field("isActive", "Boolean"))
        .finish()?;
    let env = where_env(&schema, "Thing")?;

    let mut builder = QueryBuilder::new("Thing", "thing");
    let predicate = compile(&checked(&env, "thing.isActive == true")?, &mut builder);
    assert_eq!(predicate.sql, r#""thing"."is_active" IS NOT DISTINCT FROM ?"#);
    assert_eq!(predicate.args, vec![Arg::Value(Value::Bool(true))]);
    Ok(())
}

#[test]
fn compound_condition() -> anyhow::Result<()> {
    let schema = SchemaBuilder::new()
        .model("Person", |m| m.field("name", "Text").field("isActive", "Boolean"))
        .finish()?;
    let env = where_env(&schema, "Person")?;

    let mut builder = QueryBuilder::new("Person", "person");
    let predicate = compile(
        &checked(&env, "person.name == \"Keel\" and person.isActive")?,
        &mut builder,
    );
    assert_eq!(predicate.sql, r#""person"."name" = ? AND "person"."is_active""#);
    assert_eq!(predicate.args, vec![Arg::Value(Value::Text("Keel".into()))]);

    let query = builder.select(&[predicate]);
    assert_eq!(
        query.sql,
        r#"SELECT "person".* FROM "person" WHERE "person"."name" = ? AND "person"."is_active""#
    );
    Ok(())
}

#[test]
fn actions() -> anyhow::Result<()> {
    let schema = SchemaBuilder::new()
        .model("Author", |m| m.field("name", "Text"))
        .model("Post", |m| {
            m.field("title", "Text")
                .field("published", "Boolean")
                .field("author", "Author")
        })
        .action("listPosts", "Post", ActionKind::List, |a| {
            a.input(RawActionInput::field("author.name"))
                .attribute(RawAttribute::expr("where", "post.author.name == authorName"))
                .attribute(RawAttribute::expr("where", "post.published"))
        })
        .action("publishPost", "Post", ActionKind::Update, |a| {
            a.input(RawActionInput::field("id"))
                .attribute(RawAttribute::expr("where", "post.id == id"))
                .attribute(RawAttribute::expr("set", "post.published = true"))
                .attribute(RawAttribute::expr("set", "post.title = post.author.name"))
        })
        .finish()?;
    assert!(validate_schema(&schema, &CompilerConfig::default())?.is_empty());

    let actions = schema.actions_of("Post").collect::<Vec<_>>();
    let [list, publish] = *actions.as_slice() else {
        anyhow::bail!("expected two actions");
    };

    let env = where_env(&schema, "Post")?.with(ActionInputs(list))?;
    let mut builder = QueryBuilder::new("Post", "post");
    let predicates = attribute_texts(list, "where")
        .map(|text| Ok(compile(&checked(&env, text)?, &mut builder)))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let query = builder.select(&predicates);
    assert_eq!(
        query.sql,
        concat!(
            r#"SELECT "post".* FROM "post""#,
            r#" LEFT JOIN "author" AS "post$author" ON "post$author"."id" = "post"."author_id""#,
            r#" WHERE ("post$author"."name" = ?) AND ("post"."published")"#,
        )
    );
    assert_eq!(query.args, vec![Arg::Input("authorName".into())]);

    let base = env_for(&schema, "Post")?.with(ActionInputs(publish))?;
    let filter_env = base.clone().with(ReturnType::boolean())?;
    let set_env = base.with(Assignment)?;
    let mut builder = QueryBuilder::new("Post", "post");
    let predicates = attribute_texts(publish, "where")
        .map(|text| Ok(compile(&checked(&filter_env, text)?, &mut builder)))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let assignments = attribute_texts(publish, "set")
        .map(|text| compile_assignment(&checked(&set_env, text)?, &mut builder).ok_or_else(|| anyhow::anyhow!("{text}")))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let query = builder.update(&assignments, &predicates);
    assert_eq!(
        query.sql,
        concat!(
            r#"UPDATE "post" SET "published" = ?, "title" = (SELECT "post$author"."name" FROM "author" AS "post$author""#,
            r#" WHERE "post$author"."id" = "post"."author_id") WHERE "post"."id" = ?"#,
        )
    );
    assert_eq!(
        query.args,
        vec![Arg::Value(Value::Bool(true)), Arg::Input("id".into())]
    );
    Ok(())
}

#[test]
fn delete_through_a_join() -> anyhow::Result<()> {
    let schema = SchemaBuilder::new()
        .model("Author", |m| m.field("name", "Text"))
        .model("Post", |m| m.field("author", "Author"))
        .finish()?;
    let env = where_env(&schema, "Post")?;

    let mut builder = QueryBuilder::new("Post", "post");
    let predicate = compile(&checked(&env, "post.author.name == \"a\"")?, &mut builder);
    let query = builder.delete(&[predicate]);
    assert_eq!(
        query.sql,
        concat!(
            r#"DELETE FROM "post" WHERE "post"."id" IN (SELECT "post"."id" FROM "post""#,
            r#" LEFT JOIN "author" AS "post$author" ON "post$author"."id" = "post"."author_id""#,
            r#" WHERE "post$author"."name" = ?)"#,
        )
    );
    Ok(())
}

#[test]
fn serialized_arguments() -> anyhow::Result<()> {
    let args = vec![
        Arg::Value(Value::Number(1)),
        Arg::Value(Value::Null),
        Arg::Context(vec!["identity".into(), "id".into()]),
        Arg::Input("title".into()),
    ];
    assert_eq!(
        serde_json::to_string(&args)?,
        r#"[{"value":1},{"value":null},{"context":["identity","id"]},{"input":"title"}]"#
    );
    Ok(())
}
