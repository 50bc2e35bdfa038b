//! INSERT, UPDATE and DELETE rendering and write-back.

mod common;

use burrow_orm::{fragment, BuildError, Context, Error, Row, RowSet, Value};
use common::{mysql, pg, sqlite, text, Setting, Story, User};

fn bun() -> User {
    User {
        name: "bun".into(),
        emails: vec!["bun@uptrace".into()],
        ..User::default()
    }
}

// ============================================================================
// Test: INSERT
// ============================================================================

#[test]
fn test_insert_generated_key_per_dialect() {
    let (db, _) = pg();
    let mut user = bun();
    let sql = db.new_insert().model(&mut user).to_sql().unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"INSERT INTO "users" AS "user" ("id", "name", "emails") "#,
            r#"VALUES (DEFAULT, 'bun', '{"bun@uptrace"}') RETURNING "id""#,
        )
    );

    let (db, _) = sqlite();
    let sql = db.new_insert().model(&mut user).to_sql().unwrap();
    assert_eq!(
        sql,
        r#"INSERT INTO "users" ("name", "emails") VALUES ('bun', '["bun@uptrace"]') RETURNING "id""#
    );

    let (db, _) = mysql();
    let sql = db.new_insert().model(&mut user).to_sql().unwrap();
    assert_eq!(
        sql,
        r#"INSERT INTO `users` (`id`, `name`, `emails`) VALUES (DEFAULT, 'bun', '["bun@uptrace"]')"#
    );
}

#[test]
fn test_insert_explicit_key() {
    let (db, _) = sqlite();
    let mut user = User {
        id: 9,
        ..bun()
    };
    let sql = db.new_insert().model(&mut user).to_sql().unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"INSERT INTO "users" ("id", "name", "emails") "#,
            r#"VALUES (9, 'bun', '["bun@uptrace"]') RETURNING "id""#,
        )
    );
}

#[test]
fn test_insert_defaults_and_nullzero() {
    let mut setting = Setting {
        key: "theme".into(),
        ..Setting::default()
    };

    let (db, _) = sqlite();
    let sql = db.new_insert().model(&mut setting).to_sql().unwrap();
    assert_eq!(
        sql,
        r#"INSERT INTO "settings" ("key", "note") VALUES ('theme', NULL) RETURNING "value""#
    );

    let (db, _) = pg();
    let sql = db.new_insert().model(&mut setting).to_sql().unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"INSERT INTO "settings" AS "setting" ("key", "value", "note") "#,
            r#"VALUES ('theme', DEFAULT, NULL) RETURNING "value""#,
        )
    );
}

#[test]
fn test_insert_list_and_columns() {
    let (db, _) = sqlite();
    let mut users = vec![
        User {
            name: "a".into(),
            ..User::default()
        },
        User {
            name: "b".into(),
            ..User::default()
        },
    ];
    let sql = db.new_insert().model(&mut users).to_sql().unwrap();
    assert_eq!(
        sql,
        r#"INSERT INTO "users" ("name", "emails") VALUES ('a', '[]'), ('b', '[]') RETURNING "id""#
    );

    let sql = db.new_insert().model(&mut users).column("name").to_sql().unwrap();
    assert_eq!(
        sql,
        r#"INSERT INTO "users" ("name") VALUES ('a'), ('b') RETURNING "id""#
    );

    let mut empty: Vec<User> = Vec::new();
    let err = db.new_insert().model(&mut empty).to_sql().unwrap_err();
    assert!(matches!(err, Error::Build(BuildError::Unsupported { statement: "INSERT", .. })));
}

#[test]
fn test_insert_column_map() {
    let (db, _) = pg();
    let mut row = Row::new();
    row.insert("kind".to_string(), text("click"));
    row.insert("count".to_string(), Value::Int(2));
    let sql = db.new_insert().table("events").model(&mut row).to_sql().unwrap();
    assert_eq!(sql, r#"INSERT INTO "events" ("kind", "count") VALUES ('click', 2)"#);
}

#[test]
fn test_insert_conflict_clauses() {
    let (db, _) = pg();
    let mut user = User { id: 1, ..bun() };
    let sql = db
        .new_insert()
        .model(&mut user)
        .column("id")
        .column("name")
        .on(fragment!("CONFLICT (id) DO UPDATE"))
        .set(fragment!("name = EXCLUDED.name"))
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"INSERT INTO "users" AS "user" ("id", "name") VALUES (1, 'bun') "#,
            r#"ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name RETURNING "id""#,
        )
    );

    let sql = db.new_insert().model(&mut user).column("id").ignore().to_sql().unwrap();
    assert_eq!(
        sql,
        r#"INSERT INTO "users" AS "user" ("id") VALUES (1) ON CONFLICT DO NOTHING"#
    );

    let (db, _) = mysql();
    let sql = db
        .new_insert()
        .model(&mut user)
        .column("name")
        .on(fragment!("DUPLICATE KEY UPDATE"))
        .set(fragment!("name = VALUES(name)"))
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        "INSERT INTO `users` (`name`) VALUES ('bun') ON DUPLICATE KEY UPDATE name = VALUES(name)"
    );

    let sql = db.new_insert().model(&mut user).column("id").ignore().to_sql().unwrap();
    assert_eq!(sql, "INSERT IGNORE INTO `users` (`id`) VALUES (1)");
}

#[test]
fn test_returning_requires_dialect_support() {
    let (db, _) = mysql();
    let mut user = bun();
    let err = db
        .new_insert()
        .model(&mut user)
        .returning(fragment!("*"))
        .to_sql()
        .unwrap_err();
    assert!(matches!(err, Error::Build(BuildError::Unsupported { statement: "INSERT", .. })));
}

#[tokio::test]
async fn test_insert_writes_generated_keys_back() {
    let (db, conn) = pg();
    conn.push(RowSet::new(["id"]).row(vec![Value::Int(42)]));
    let mut user = bun();
    let affected = db.new_insert().model(&mut user).exec(&Context::new()).await.unwrap();
    assert_eq!(affected, 1);
    assert_eq!(user.id, 42);

    conn.push(RowSet::new(["id"]).row(vec![Value::Int(7)]).row(vec![Value::Int(8)]));
    let mut users = vec![bun(), bun()];
    db.new_insert().model(&mut users).exec(&Context::new()).await.unwrap();
    assert_eq!(users.iter().map(|u| u.id).collect::<Vec<_>>(), vec![7, 8]);
}

#[tokio::test]
async fn test_returned_rows_match_records_by_key() {
    let (db, conn) = pg();
    conn.push(
        RowSet::new(["id", "name"])
            .row(vec![Value::Int(2), text("second")])
            .row(vec![Value::Int(1), text("first")]),
    );
    let mut users = vec![User { id: 1, ..bun() }, User { id: 2, ..bun() }];
    db.new_update()
        .model(&mut users)
        .set(fragment!("name = name || '!'"))
        .where_pk()
        .returning(fragment!("id, name"))
        .exec(&Context::new())
        .await
        .unwrap();
    assert_eq!(users[0].name, "first");
    assert_eq!(users[1].name, "second");
}

// ============================================================================
// Test: UPDATE
// ============================================================================

#[test]
fn test_update_model() {
    let (db, _) = pg();
    let mut user = User {
        id: 1,
        name: "renamed".into(),
        ..User::default()
    };
    let sql = db.new_update().model(&mut user).where_pk().to_sql().unwrap();
    assert_eq!(
        sql,
        r#"UPDATE "users" AS "user" SET "name" = 'renamed', "emails" = '{}' WHERE "user"."id" = 1"#
    );

    let sql = db.new_update().model(&mut user).column("name").where_pk().to_sql().unwrap();
    assert_eq!(
        sql,
        r#"UPDATE "users" AS "user" SET "name" = 'renamed' WHERE "user"."id" = 1"#
    );

    let sql = db.new_update().model(&mut user).omit_zero().where_pk().to_sql().unwrap();
    assert_eq!(sql, r#"UPDATE "users" AS "user" SET "name" = 'renamed' WHERE "user"."id" = 1"#);
}

#[test]
fn test_update_set_fragments() {
    let (db, _) = sqlite();
    let sql = db
        .new_update()
        .table("users")
        .set(fragment!("name = ?", "x"))
        .set(fragment!("visits = visits + ?", 1))
        .where_(fragment!("id = ?", 3))
        .to_sql()
        .unwrap();
    assert_eq!(sql, r#"UPDATE "users" SET name = 'x', visits = visits + 1 WHERE (id = 3)"#);
}

#[test]
fn test_update_soft_deleted_rows_are_skipped() {
    let (db, _) = sqlite();
    let mut story = Story {
        id: 5,
        title: "t".into(),
        ..Story::default()
    };
    let sql = db.new_update().model(&mut story).column("title").where_pk().to_sql().unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"UPDATE "stories" AS "story" SET "title" = 't' "#,
            r#"WHERE "story"."deleted_at" IS NULL AND "story"."id" = 5"#,
        )
    );
}

#[test]
fn test_update_requires_predicate() {
    let (db, conn) = pg();
    let mut user = bun();
    let err = db.new_update().model(&mut user).to_sql().unwrap_err();
    assert!(matches!(err, Error::Build(BuildError::UnsafeMutation { statement: "UPDATE" })));

    // Soft-delete filtering alone does not count as a restriction.
    let mut story = Story::default();
    let err = db.new_update().model(&mut story).where_deleted().to_sql().unwrap_err();
    assert!(matches!(err, Error::Build(BuildError::UnsafeMutation { statement: "UPDATE" })));
    assert!(conn.statements().is_empty());
}

#[test]
fn test_update_list_requires_set() {
    let (db, _) = pg();
    let mut users = vec![User { id: 1, ..bun() }];
    let err = db.new_update().model(&mut users).where_pk().to_sql().unwrap_err();
    assert!(matches!(err, Error::Build(BuildError::Unsupported { statement: "UPDATE", .. })));
}

// ============================================================================
// Test: DELETE
// ============================================================================

#[test]
fn test_delete_hard() {
    let (db, _) = sqlite();
    let mut users = vec![User { id: 1, ..bun() }, User { id: 2, ..bun() }];
    let sql = db.new_delete().model(&mut users).where_pk().to_sql().unwrap();
    assert_eq!(sql, r#"DELETE FROM "users" AS "user" WHERE "user"."id" IN (1, 2)"#);

    let sql = db
        .new_delete()
        .table("events")
        .where_(fragment!("kind = ?", "click"))
        .to_sql()
        .unwrap();
    assert_eq!(sql, r#"DELETE FROM "events" WHERE (kind = 'click')"#);
}

#[test]
fn test_delete_requires_predicate() {
    let (db, conn) = sqlite();
    let mut users = vec![bun()];
    let err = db.new_delete().model(&mut users).to_sql().unwrap_err();
    assert!(matches!(err, Error::Build(BuildError::UnsafeMutation { statement: "DELETE" })));

    let err = db.new_delete().table("events").to_sql().unwrap_err();
    assert!(matches!(err, Error::Build(BuildError::UnsafeMutation { statement: "DELETE" })));
    assert!(conn.statements().is_empty());
}

#[tokio::test]
async fn test_soft_delete_sets_marker() {
    let (db, conn) = pg();
    let mut story = Story {
        id: 5,
        ..Story::default()
    };
    db.new_delete()
        .model(&mut story)
        .where_pk()
        .exec(&Context::new())
        .await
        .unwrap();

    let marker = story.deleted_at.expect("marker is written back");
    let statements = conn.statements();
    assert_eq!(statements.len(), 1);
    let sql = &statements[0];
    assert!(sql.starts_with(r#"UPDATE "stories" AS "story" SET "deleted_at" = '"#), "{sql}");
    assert!(
        sql.ends_with(r#"' WHERE "story"."deleted_at" IS NULL AND "story"."id" = 5"#),
        "{sql}"
    );
    assert!(sql.contains(&marker.format("%Y-%m-%d %H:%M:%S%.6f").to_string()), "{sql}");
}

#[test]
fn test_force_delete() {
    let (db, _) = pg();
    let mut story = Story {
        id: 5,
        ..Story::default()
    };
    let sql = db.new_delete().model(&mut story).where_pk().force_delete().to_sql().unwrap();
    assert_eq!(sql, r#"DELETE FROM "stories" AS "story" WHERE "story"."id" = 5"#);

    let sql = db
        .new_delete()
        .model(&mut story)
        .where_deleted()
        .where_pk()
        .force_delete()
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"DELETE FROM "stories" AS "story" "#,
            r#"WHERE "story"."deleted_at" IS NOT NULL AND "story"."id" = 5"#,
        )
    );
    assert!(story.deleted_at.is_none());
}
