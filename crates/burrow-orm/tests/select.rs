//! SELECT rendering and binding against a recording connection.

mod common;

use burrow_orm::{
    fragment, BuildError, Context, Error, Ident, In, Row, RowSet, Scalars, SchemaError, Value,
};
use common::{mysql, pg, sqlite, text, user_rows, Story, User};

// ============================================================================
// Test: Inline to-one relations
// ============================================================================

#[tokio::test]
async fn test_belongs_to_is_joined_into_one_statement() {
    let (db, conn) = pg();
    conn.push(
        RowSet::new([
            "id",
            "title",
            "author_id",
            "deleted_at",
            "author__id",
            "author__name",
            "author__emails",
        ])
        .row(vec![
            Value::Int(7),
            text("hello"),
            Value::Int(3),
            Value::Null,
            Value::Int(3),
            text("bun"),
            text("{bun@uptrace}"),
        ]),
    );

    let mut story = Story::default();
    db.new_select()
        .model(&mut story)
        .relation("author")
        .limit(1)
        .scan(&Context::new())
        .await
        .unwrap();

    let statements = conn.statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(
        statements[0],
        concat!(
            r#"SELECT "story"."id", "story"."title", "story"."author_id", "story"."deleted_at", "#,
            r#""author"."id" AS "author__id", "author"."name" AS "author__name", "#,
            r#""author"."emails" AS "author__emails" "#,
            r#"FROM "stories" AS "story" "#,
            r#"LEFT JOIN "users" AS "author" ON ("author"."id" = "story"."author_id") "#,
            r#"WHERE "story"."deleted_at" IS NULL LIMIT 1"#,
        )
    );

    let author = story.author.as_deref().expect("author is bound");
    assert_eq!(author.id, story.author_id);
    assert_eq!(author.name, "bun");
    assert_eq!(author.emails, vec!["bun@uptrace".to_string()]);
}

#[tokio::test]
async fn test_unmatched_left_join_leaves_relation_empty() {
    let (db, conn) = pg();
    conn.push(
        RowSet::new([
            "id",
            "title",
            "author_id",
            "deleted_at",
            "author__id",
            "author__name",
            "author__emails",
        ])
        .row(vec![
            Value::Int(1),
            text("orphan"),
            Value::Int(99),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ]),
    );

    let mut stories = vec![Story {
        author: Some(Box::default()),
        ..Story::default()
    }];
    db.new_select()
        .model(&mut stories)
        .relation("author")
        .scan(&Context::new())
        .await
        .unwrap();
    assert_eq!(stories.len(), 1);
    assert!(stories[0].author.is_none());
}

#[test]
fn test_relation_scope_restricts_joined_columns() {
    let (db, _) = pg();
    let mut stories: Vec<Story> = Vec::new();
    let sql = db
        .new_select()
        .model(&mut stories)
        .column("id")
        .relation_with("author", |q| {
            q.column("name")
                .where_(fragment!("?TableAlias.name <> ?", ""))
        })
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"SELECT "story"."id", "author"."name" AS "author__name" "#,
            r#"FROM "stories" AS "story" "#,
            r#"LEFT JOIN "users" AS "author" ON ("author"."id" = "story"."author_id") "#,
            r#"AND ("author".name <> '') "#,
            r#"WHERE "story"."deleted_at" IS NULL"#,
        )
    );
}

// ============================================================================
// Test: Columns and tables
// ============================================================================

#[test]
fn test_model_columns_are_qualified() {
    let (db, _) = sqlite();
    let mut users: Vec<User> = Vec::new();
    let sql = db.new_select().model(&mut users).to_sql().unwrap();
    assert_eq!(
        sql,
        r#"SELECT "user"."id", "user"."name", "user"."emails" FROM "users" AS "user""#
    );
}

#[test]
fn test_explicit_and_excluded_columns() {
    let (db, _) = sqlite();
    let sql = db
        .new_select()
        .model_type::<User>()
        .exclude_column("emails")
        .to_sql()
        .unwrap();
    assert_eq!(sql, r#"SELECT "user"."id", "user"."name" FROM "users" AS "user""#);

    let sql = db
        .new_select()
        .model_type::<User>()
        .columns(["id", "total"])
        .column_expr(fragment!("upper(?TableAlias.name)"))
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        r#"SELECT "user"."id", "total", upper("user".name) FROM "users" AS "user""#
    );
}

#[test]
fn test_table_without_model() {
    let (db, _) = sqlite();
    let sql = db
        .new_select()
        .table("events")
        .column("kind")
        .where_(fragment!("kind = ?", "click"))
        .to_sql()
        .unwrap();
    assert_eq!(sql, r#"SELECT "kind" FROM "events" WHERE (kind = 'click')"#);

    let sql = db.new_select().table("events").to_sql().unwrap();
    assert_eq!(sql, r#"SELECT * FROM "events""#);
}

#[test]
fn test_common_table_expression() {
    let (db, _) = sqlite();
    let recent = db
        .new_select()
        .model_type::<User>()
        .column("id")
        .where_(fragment!("id > ?", 10));
    let sql = db
        .new_select()
        .with("recent", recent)
        .table("recent")
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"WITH "recent" AS (SELECT "user"."id" FROM "users" AS "user" WHERE (id > 10)) "#,
            r#"SELECT * FROM "recent""#,
        )
    );
}

// ============================================================================
// Test: WHERE
// ============================================================================

#[test]
fn test_where_groups() {
    let (db, _) = sqlite();
    let sql = db
        .new_select()
        .model_type::<User>()
        .column("id")
        .where_(fragment!("?TableAlias.name = ?", "bun"))
        .where_group_or(|g| {
            g.where_(fragment!("id > ?", 1))
                .where_(fragment!("id < ?", 9))
        })
        .where_(fragment!("id IN (?)", In(vec![2_i64, 3])))
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"SELECT "user"."id" FROM "users" AS "user" "#,
            r#"WHERE ("user".name = 'bun') OR ((id > 1) AND (id < 9)) AND (id IN (2, 3))"#,
        )
    );
}

#[test]
fn test_user_predicates_are_grouped_before_soft_delete() {
    let (db, _) = sqlite();
    let sql = db
        .new_select()
        .model_type::<Story>()
        .column("id")
        .where_(fragment!("title = ?", "a"))
        .where_or(fragment!("title = ?", "b"))
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"SELECT "story"."id" FROM "stories" AS "story" "#,
            r#"WHERE ((title = 'a') OR (title = 'b')) AND "story"."deleted_at" IS NULL"#,
        )
    );
}

#[test]
fn test_soft_delete_modes() {
    let (db, _) = sqlite();
    let query = || db.new_select().model_type::<Story>().column("id");

    let live = query().to_sql().unwrap();
    assert!(live.ends_with(r#"WHERE "story"."deleted_at" IS NULL"#), "{live}");

    let deleted = query().where_deleted().to_sql().unwrap();
    assert!(deleted.ends_with(r#"WHERE "story"."deleted_at" IS NOT NULL"#), "{deleted}");

    let all = query().where_all_with_deleted().to_sql().unwrap();
    assert!(!all.contains("WHERE"), "{all}");

    // The last mode wins.
    let sql = query().where_deleted().where_all_with_deleted().to_sql().unwrap();
    assert_eq!(sql, all);
    let sql = query().where_all_with_deleted().where_deleted().to_sql().unwrap();
    assert_eq!(sql, deleted);
}

#[derive(Debug, Default, Clone, burrow_derive::Model)]
#[burrow("table:likes")]
struct Like {
    id: i64,
    story_id: i64,
    #[burrow("rel:belongs-to")]
    story: Option<Box<Story>>,
    other_id: i64,
    #[burrow("rel:belongs-to,join:other_id=id")]
    other: Option<Box<Story>>,
}

#[test]
fn test_soft_delete_applies_to_joined_tables() {
    let (db, _) = sqlite();
    let sql = db
        .new_select()
        .model_type::<Like>()
        .column("id")
        .relation_with("story", |q| q.column("id"))
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"SELECT "like"."id", "story"."id" AS "story__id" FROM "likes" AS "like" "#,
            r#"LEFT JOIN "stories" AS "story" ON ("story"."id" = "like"."story_id") "#,
            r#"AND "story"."deleted_at" IS NULL"#,
        )
    );
}

#[test]
fn test_soft_delete_mode_reaches_joined_tables() {
    let (db, _) = sqlite();
    let query = || {
        db.new_select()
            .model_type::<Like>()
            .column("id")
            .relation_with("story", |q| q.column("id"))
    };
    let join = concat!(
        r#"SELECT "like"."id", "story"."id" AS "story__id" FROM "likes" AS "like" "#,
        r#"LEFT JOIN "stories" AS "story" ON ("story"."id" = "like"."story_id")"#,
    );

    let sql = query().where_deleted().to_sql().unwrap();
    assert_eq!(sql, format!(r#"{join} AND "story"."deleted_at" IS NOT NULL"#));

    let sql = query().where_all_with_deleted().to_sql().unwrap();
    assert_eq!(sql, join);
}

#[test]
fn test_same_leaf_under_distinct_branches() {
    let (db, _) = sqlite();
    let sql = db
        .new_select()
        .model_type::<Like>()
        .column("id")
        .relation_with("story", |q| q.column("id"))
        .relation_with("story.author", |q| q.column("name"))
        .relation_with("other", |q| q.column("id"))
        .relation_with("other.author", |q| q.column("name"))
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"SELECT "like"."id", "story"."id" AS "story__id", "#,
            r#""story__author"."name" AS "story__author__name", "#,
            r#""other"."id" AS "other__id", "#,
            r#""other__author"."name" AS "other__author__name" "#,
            r#"FROM "likes" AS "like" "#,
            r#"LEFT JOIN "stories" AS "story" ON ("story"."id" = "like"."story_id") "#,
            r#"AND "story"."deleted_at" IS NULL "#,
            r#"LEFT JOIN "users" AS "story__author" "#,
            r#"ON ("story__author"."id" = "story"."author_id") "#,
            r#"LEFT JOIN "stories" AS "other" ON ("other"."id" = "like"."other_id") "#,
            r#"AND "other"."deleted_at" IS NULL "#,
            r#"LEFT JOIN "users" AS "other__author" "#,
            r#"ON ("other__author"."id" = "other"."author_id")"#,
        )
    );
}

#[tokio::test]
async fn test_nested_inline_columns_bind_through_the_path() {
    let (db, conn) = pg();
    conn.push(
        RowSet::new(["id", "story__id", "story__author__name", "other__id", "other__author__name"])
            .row(vec![Value::Int(1), Value::Int(10), text("ann"), Value::Int(20), text("bob")])
            .row(vec![Value::Int(2), Value::Null, Value::Null, Value::Int(21), Value::Null]),
    );

    let mut likes: Vec<Like> = Vec::new();
    db.new_select()
        .model(&mut likes)
        .column("id")
        .relation_with("story", |q| q.column("id"))
        .relation_with("story.author", |q| q.column("name"))
        .relation_with("other", |q| q.column("id"))
        .relation_with("other.author", |q| q.column("name"))
        .scan(&Context::new())
        .await
        .unwrap();

    assert_eq!(likes.len(), 2);
    let story = likes[0].story.as_deref().expect("story is bound");
    assert_eq!(story.id, 10);
    assert_eq!(story.author.as_deref().map(|a| a.name.as_str()), Some("ann"));
    let other = likes[0].other.as_deref().expect("other is bound");
    assert_eq!(other.id, 20);
    assert_eq!(other.author.as_deref().map(|a| a.name.as_str()), Some("bob"));

    assert!(likes[1].story.is_none());
    let other = likes[1].other.as_deref().expect("other is bound");
    assert_eq!(other.id, 21);
    assert!(other.author.is_none());
}

#[test]
fn test_where_pk() {
    let (db, _) = sqlite();
    let mut user = User {
        id: 4,
        ..User::default()
    };
    let sql = db
        .new_select()
        .model(&mut user)
        .column("name")
        .where_pk()
        .to_sql()
        .unwrap();
    assert_eq!(sql, r#"SELECT "user"."name" FROM "users" AS "user" WHERE "user"."id" = 4"#);

    let mut users: Vec<User> = [3, 1, 3]
        .into_iter()
        .map(|id| User {
            id,
            ..User::default()
        })
        .collect();
    let sql = db
        .new_select()
        .model(&mut users)
        .column("name")
        .where_pk()
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        r#"SELECT "user"."name" FROM "users" AS "user" WHERE "user"."id" IN (3, 1)"#
    );
}

// ============================================================================
// Test: Ordering, grouping and paging
// ============================================================================

#[test]
fn test_order_limit_offset() {
    let (db, _) = sqlite();
    let sql = db
        .new_select()
        .table("users")
        .order("name asc nulls last")
        .order("id DESC")
        .order_expr(fragment!("length(?) DESC", Ident("name")))
        .limit(10)
        .offset(20)
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"SELECT * FROM "users" ORDER BY "name" ASC NULLS LAST, "id" DESC, "#,
            r#"length("name") DESC LIMIT 10 OFFSET 20"#,
        )
    );
}

#[test]
fn test_offset_without_limit() {
    let (sqlite_db, _) = sqlite();
    let sql = sqlite_db.new_select().table("users").offset(5).to_sql().unwrap();
    assert_eq!(sql, r#"SELECT * FROM "users" LIMIT -1 OFFSET 5"#);

    let (pg_db, _) = pg();
    let sql = pg_db.new_select().table("users").offset(5).to_sql().unwrap();
    assert_eq!(sql, r#"SELECT * FROM "users" OFFSET 5"#);

    let (mysql_db, _) = mysql();
    let sql = mysql_db.new_select().table("users").offset(5).to_sql().unwrap();
    assert_eq!(sql, "SELECT * FROM `users` LIMIT 18446744073709551615 OFFSET 5");
}

#[test]
fn test_group_having_distinct() {
    let (db, _) = pg();
    let sql = db
        .new_select()
        .distinct()
        .table("stories")
        .column("author_id")
        .column_expr(fragment!("count(*)"))
        .group("author_id")
        .having(fragment!("count(*) > ?", 2))
        .having(fragment!("max(id) < ?", 100))
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"SELECT DISTINCT "author_id", count(*) FROM "stories" "#,
            r#"GROUP BY "author_id" HAVING (count(*) > 2) AND (max(id) < 100)"#,
        )
    );
}

// ============================================================================
// Test: Templates
// ============================================================================

#[test]
fn test_template_uses_dialect_placeholders() {
    let (db, _) = pg();
    let (query, args) = db
        .new_select()
        .model_type::<User>()
        .column("id")
        .where_(fragment!("name = ? AND id > ?", "bun", 3))
        .to_template()
        .unwrap();
    assert_eq!(
        query,
        r#"SELECT "user"."id" FROM "users" AS "user" WHERE (name = $1 AND id > $2)"#
    );
    assert_eq!(args, vec![text("bun"), Value::Int(3)]);

    let (db, _) = sqlite();
    let (query, args) = db
        .new_select()
        .table("users")
        .where_(fragment!("name = ?", "bun"))
        .to_template()
        .unwrap();
    assert_eq!(query, r#"SELECT * FROM "users" WHERE (name = ?)"#);
    assert_eq!(args, vec![text("bun")]);
}

// ============================================================================
// Test: Builder errors
// ============================================================================

#[test]
fn test_unknown_relation_is_reported_on_render() {
    let (db, conn) = pg();
    let mut stories: Vec<Story> = Vec::new();
    let err = db
        .new_select()
        .model(&mut stories)
        .relation("editor")
        .limit(1)
        .to_sql()
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::Schema(SchemaError::UnknownRelation { ref relation, .. }) if relation == "editor"
        ),
        "{err:?}"
    );
    assert!(conn.statements().is_empty());
}

#[test]
fn test_relation_requires_model() {
    let (db, _) = pg();
    let err = db.new_select().table("stories").relation("author").to_sql().unwrap_err();
    assert!(matches!(
        err,
        Error::Build(BuildError::MissingTable { statement: "SELECT" })
    ));
}

#[test]
fn test_missing_argument() {
    let (db, _) = pg();
    let err = db
        .new_select()
        .table("users")
        .where_(fragment!("id = ? AND name = ?", 1))
        .to_sql()
        .unwrap_err();
    assert!(matches!(err, Error::Build(BuildError::MissingArgument { given: 1, .. })));
}

#[test]
fn test_unknown_named_argument() {
    let (db, _) = pg();
    let err = db
        .new_select()
        .model_type::<User>()
        .where_(fragment!("?Nope = 1"))
        .to_sql()
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Build(BuildError::UnknownNamedArgument { ref name, .. }) if name == "Nope"
    ));
}

// ============================================================================
// Test: Execution
// ============================================================================

#[tokio::test]
async fn test_single_destination_without_rows() {
    let (db, _) = pg();
    let mut user = User::default();
    let err = db
        .new_select()
        .model(&mut user)
        .where_(fragment!("id = ?", 1))
        .scan(&Context::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoRows));

    let mut users: Vec<User> = vec![User::default()];
    db.new_select()
        .model(&mut users)
        .scan(&Context::new())
        .await
        .unwrap();
    assert!(users.is_empty());
}

#[tokio::test]
async fn test_scan_into_other_destinations() {
    let (db, conn) = pg();
    conn.push(user_rows(&[(1, "a"), (2, "b")]));
    conn.push(RowSet::new(["id", "name"]).row(vec![Value::Int(5), text("e")]));

    let ctx = Context::new();
    let mut maps: Vec<Row> = Vec::new();
    db.new_select()
        .model_type::<User>()
        .scan_into(&ctx, &mut maps)
        .await
        .unwrap();
    assert_eq!(maps.len(), 2);
    assert_eq!(maps[1]["name"], text("b"));

    let (mut id, mut name) = (0_i64, String::new());
    db.new_select()
        .model_type::<User>()
        .columns(["id", "name"])
        .limit(1)
        .scan_into(&ctx, Scalars::new().push(&mut id).push(&mut name))
        .await
        .unwrap();
    assert_eq!((id, name.as_str()), (5, "e"));
}

#[tokio::test]
async fn test_count_and_exists() {
    let (db, conn) = pg();
    conn.push(RowSet::new(["count"]).row(vec![Value::Int(3)]));
    conn.push(RowSet::new(["exists"]).row(vec![Value::Bool(true)]));
    conn.push(RowSet::new(["count"]).row(vec![Value::Int(2)]));

    let ctx = Context::new();
    let query = db
        .new_select()
        .model_type::<User>()
        .where_(fragment!("name LIKE ?", "b%"))
        .order("id")
        .limit(1)
        .offset(2);
    assert_eq!(query.count(&ctx).await.unwrap(), 3);
    assert!(query.exists(&ctx).await.unwrap());

    let grouped = db.new_select().table("stories").column("author_id").group("author_id");
    assert_eq!(grouped.count(&ctx).await.unwrap(), 2);

    let statements = conn.statements();
    assert_eq!(
        statements[0],
        r#"SELECT count(*) FROM "users" AS "user" WHERE (name LIKE 'b%')"#
    );
    assert_eq!(
        statements[1],
        concat!(
            r#"SELECT EXISTS (SELECT "user"."id", "user"."name", "user"."emails" "#,
            r#"FROM "users" AS "user" WHERE (name LIKE 'b%') ORDER BY "id" LIMIT 1 OFFSET 2)"#,
        )
    );
    assert_eq!(
        statements[2],
        concat!(
            r#"SELECT count(*) FROM (SELECT "author_id" FROM "stories" GROUP BY "author_id") "#,
            r#"AS "_count""#,
        )
    );
}
