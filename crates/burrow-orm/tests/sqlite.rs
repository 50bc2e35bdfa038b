//! End-to-end round trips against in-memory SQLite.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use burrow_orm::driver::sqlite::memory_pool;
use burrow_orm::{
    fragment, CancelToken, Config, Context, Db, DriverError, Error, QueryEvent, QueryHook,
    SqliteDialect,
};
use chrono::{DateTime, TimeZone, Utc};
use common::{Comment, Story, User};

async fn setup() -> Db {
    let pool = memory_pool().await.unwrap();
    let db = Db::new(SqliteDialect::new(), pool);
    let ctx = Context::new();
    db.new_create_table().model_type::<User>().exec(&ctx).await.unwrap();
    db.new_create_table().model_type::<Story>().exec(&ctx).await.unwrap();
    db.new_create_table().model_type::<Comment>().exec(&ctx).await.unwrap();
    db
}

fn user(name: &str, emails: &[&str]) -> User {
    User {
        name: name.to_string(),
        emails: emails.iter().map(ToString::to_string).collect(),
        ..User::default()
    }
}

fn story(title: &str, author_id: i64) -> Story {
    Story {
        title: title.to_string(),
        author_id,
        ..Story::default()
    }
}

// ============================================================================
// Test: Insert and select
// ============================================================================

#[tokio::test]
async fn test_insert_then_select_round_trip() {
    let db = setup().await;
    let ctx = Context::new();

    let mut inserted = user("admin", &["admin1@admin", "admin2@admin"]);
    db.new_insert().model(&mut inserted).exec(&ctx).await.unwrap();
    assert_eq!(inserted.id, 1);

    let mut loaded = User::default();
    db.new_select()
        .model(&mut loaded)
        .where_(fragment!("id = ?", 1))
        .scan(&ctx)
        .await
        .unwrap();
    assert_eq!(loaded.id, 1);
    assert_eq!(loaded.name, "admin");
    assert_eq!(loaded.emails, vec!["admin1@admin", "admin2@admin"]);

    let mut missing = User::default();
    let err = db
        .new_select()
        .model(&mut missing)
        .where_(fragment!("id = ?", 42))
        .scan(&ctx)
        .await
        .unwrap_err();
    assert!(err.is_no_rows());
}

#[tokio::test]
async fn test_bulk_insert_writes_generated_keys() {
    let db = setup().await;
    let ctx = Context::new();

    let mut users = vec![user("a", &[]), user("b", &["b@b"])];
    let affected = db.new_insert().model(&mut users).exec(&ctx).await.unwrap();
    assert_eq!(affected, 2);
    assert_eq!(users.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2]);

    let mut loaded: Vec<User> = Vec::new();
    db.new_select()
        .model(&mut loaded)
        .order("id")
        .scan(&ctx)
        .await
        .unwrap();
    assert_eq!(loaded, users);
}

#[tokio::test]
async fn test_belongs_to_with_left_join() {
    let db = setup().await;
    let ctx = Context::new();

    let mut author = user("bun", &["bun@uptrace"]);
    db.new_insert().model(&mut author).exec(&ctx).await.unwrap();
    let mut stories = vec![story("hello", author.id), story("orphan", 99)];
    db.new_insert().model(&mut stories).exec(&ctx).await.unwrap();

    let mut loaded: Vec<Story> = Vec::new();
    db.new_select()
        .model(&mut loaded)
        .relation("author")
        .order_expr(fragment!("?TableAlias.id"))
        .scan(&ctx)
        .await
        .unwrap();

    assert_eq!(loaded.len(), 2);
    let bound = loaded[0].author.as_deref().unwrap();
    assert_eq!(bound.id, loaded[0].author_id);
    assert_eq!(bound.name, "bun");
    assert_eq!(bound.emails, vec!["bun@uptrace"]);
    assert!(loaded[1].author.is_none());
}

#[tokio::test]
async fn test_has_many_and_nested_loads() {
    let db = setup().await;
    let ctx = Context::new();

    let mut users = vec![user("a", &[]), user("b", &[])];
    db.new_insert().model(&mut users).exec(&ctx).await.unwrap();
    let mut stories = vec![story("a1", 1), story("b1", 2), story("a2", 1)];
    db.new_insert().model(&mut stories).exec(&ctx).await.unwrap();
    let mut comments = vec![Comment {
        story_id: stories[2].id,
        text: "nice".to_string(),
        ..Comment::default()
    }];
    db.new_insert().model(&mut comments).exec(&ctx).await.unwrap();

    let mut loaded: Vec<User> = Vec::new();
    db.new_select()
        .model(&mut loaded)
        .relation_with("stories", |q| q.order_expr(fragment!("?TableAlias.id")))
        .relation("stories.comments")
        .relation("stories.author")
        .order("id")
        .scan(&ctx)
        .await
        .unwrap();

    let titles: Vec<Vec<&str>> = loaded
        .iter()
        .map(|u| u.stories.iter().map(|s| s.title.as_str()).collect())
        .collect();
    assert_eq!(titles, vec![vec!["a1", "a2"], vec!["b1"]]);
    assert_eq!(loaded[0].stories[1].comments.len(), 1);
    assert_eq!(loaded[0].stories[1].comments[0].text, "nice");
    assert!(loaded[0].stories[0].comments.is_empty());
    assert_eq!(loaded[1].stories[0].author.as_deref().map(|a| a.name.as_str()), Some("b"));
}

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
struct Sample {
    id: i64,
    label: String,
    ratio: f64,
    count: i32,
    flag: bool,
    at: DateTime<Utc>,
    tags: Vec<String>,
    blob: Vec<u8>,
}

#[tokio::test]
async fn test_values_survive_append_and_scan() {
    let db = setup().await;
    let ctx = Context::new();
    db.new_create_table().model_type::<Sample>().exec(&ctx).await.unwrap();

    let mut sample = Sample {
        label: "it's a \\ \"quoted\" ünïcödé ✓ line\nbreak".to_string(),
        ratio: 0.1,
        count: -42,
        flag: true,
        at: Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap(),
        tags: vec!["a".to_string(), "b,c".to_string(), "d'e".to_string()],
        blob: vec![0, 1, 0xfe, 0xff],
        ..Sample::default()
    };
    db.new_insert().model(&mut sample).exec(&ctx).await.unwrap();

    let mut loaded = Sample::default();
    db.new_select()
        .model(&mut loaded)
        .where_(fragment!("id = ?", sample.id))
        .scan(&ctx)
        .await
        .unwrap();
    assert_eq!(loaded, sample);
}

// ============================================================================
// Test: Update, delete and soft delete
// ============================================================================

#[tokio::test]
async fn test_update_and_soft_delete() {
    let db = setup().await;
    let ctx = Context::new();

    let mut s = story("draft", 1);
    db.new_insert().model(&mut s).exec(&ctx).await.unwrap();

    s.title = "final".to_string();
    let affected = db.new_update().model(&mut s).where_pk().exec(&ctx).await.unwrap();
    assert_eq!(affected, 1);

    db.new_delete().model(&mut s).where_pk().exec(&ctx).await.unwrap();
    let marker = s.deleted_at.expect("marker written back");

    let live = db.new_select().model_type::<Story>().count(&ctx).await.unwrap();
    assert_eq!(live, 0);

    let mut deleted: Vec<Story> = Vec::new();
    db.new_select()
        .model(&mut deleted)
        .where_deleted()
        .scan(&ctx)
        .await
        .unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].title, "final");
    assert_eq!(deleted[0].deleted_at, Some(marker));

    db.new_delete().model(&mut s).where_pk().force_delete().exec(&ctx).await.unwrap();
    let all = db
        .new_select()
        .model_type::<Story>()
        .where_all_with_deleted()
        .exists(&ctx)
        .await
        .unwrap();
    assert!(!all);
}

#[tokio::test]
async fn test_count_and_exists() {
    let db = setup().await;
    let ctx = Context::new();

    let mut users = vec![user("ann", &[]), user("bob", &[]), user("amy", &[])];
    db.new_insert().model(&mut users).exec(&ctx).await.unwrap();

    let query = db
        .new_select()
        .model_type::<User>()
        .where_(fragment!("name LIKE ?", "a%"));
    assert_eq!(query.count(&ctx).await.unwrap(), 2);
    assert!(query.exists(&ctx).await.unwrap());

    let none = db
        .new_select()
        .model_type::<User>()
        .where_(fragment!("name = ?", "zed"));
    assert!(!none.exists(&ctx).await.unwrap());
}

// ============================================================================
// Test: Hooks, cancellation and configuration
// ============================================================================

struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl QueryHook for Recorder {
    fn before_query(&self, _event: &QueryEvent) {
        self.log.lock().unwrap().push(format!("before {}", self.name));
    }

    fn after_query(&self, event: &QueryEvent) {
        let outcome = if event.is_err() { "err" } else { "ok" };
        self.log
            .lock()
            .unwrap()
            .push(format!("after {} {outcome}", self.name));
    }
}

#[tokio::test]
async fn test_hooks_wrap_every_round_trip() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let db = setup()
        .await
        .with_query_hook(Recorder {
            name: "first",
            log: Arc::clone(&log),
        })
        .with_query_hook(Recorder {
            name: "second",
            log: Arc::clone(&log),
        });
    let ctx = Context::new();

    db.query_raw(&ctx, "SELECT 1").await.unwrap();
    db.exec_raw(&ctx, "SELECT * FROM nowhere").await.unwrap_err();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "before first",
            "before second",
            "after second ok",
            "after first ok",
            "before first",
            "before second",
            "after second err",
            "after first err",
        ]
    );
}

#[tokio::test]
async fn test_cancelled_and_expired_contexts() {
    let db = setup().await;

    let token = CancelToken::new();
    token.cancel();
    let ctx = Context::new().with_cancel(token);
    let err = db.new_select().model_type::<User>().count(&ctx).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Execution {
            source: DriverError::Cancelled,
            ..
        }
    ));
    assert!(err.is_cancelled());

    let ctx = Context::new().with_timeout(Duration::ZERO);
    let err = db.query_raw(&ctx, "SELECT 1").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Execution {
            source: DriverError::Timeout(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_db_from_config() {
    let config = Config::from_json(
        r#"{"dialect": "sqlite", "log_queries": true, "sql_types": {"string": "TEXT"}}"#,
    )
    .unwrap();
    let db = Db::from_config(memory_pool().await.unwrap(), &config).unwrap();
    assert_eq!(db.dialect().name(), "sqlite");

    let sql = db.new_create_table().model_type::<User>().to_sql().unwrap();
    assert_eq!(
        sql,
        concat!(
            r#"CREATE TABLE "users" ("id" INTEGER NOT NULL, "name" TEXT, "#,
            r#""emails" VARCHAR, PRIMARY KEY ("id"))"#,
        )
    );

    let ctx = Context::new();
    db.new_create_table().model_type::<User>().exec(&ctx).await.unwrap();
    let mut u = user("cfg", &["c@c"]);
    db.new_insert().model(&mut u).exec(&ctx).await.unwrap();
    assert_eq!(u.id, 1);
}
