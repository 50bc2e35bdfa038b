#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use burrow_orm::{Conn, Db, DriverError, MysqlDialect, PgDialect, RowSet, SqliteDialect, Value};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub emails: Vec<String>,
    #[burrow("rel:has-many,join:id=author_id")]
    pub stories: Vec<Story>,
}

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
pub struct Story {
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    #[burrow("rel:belongs-to")]
    pub author: Option<Box<User>>,
    #[burrow("rel:has-many")]
    pub comments: Vec<Comment>,
    #[burrow(",soft_delete")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
pub struct Comment {
    pub id: i64,
    pub story_id: i64,
    pub text: String,
}

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
pub struct Order {
    pub id: i64,
    #[burrow("m2m:order_to_items")]
    pub items: Vec<Item>,
}

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
pub struct Item {
    pub id: i64,
    pub sku: String,
}

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
#[burrow("table:order_to_items")]
pub struct OrderToItem {
    #[burrow(",pk")]
    pub order_id: i64,
    #[burrow("rel:belongs-to")]
    pub order: Option<Box<Order>>,
    #[burrow(",pk")]
    pub item_id: i64,
    #[burrow("rel:belongs-to")]
    pub item: Option<Box<Item>>,
}

#[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
#[burrow("table:settings")]
pub struct Setting {
    #[burrow(",pk")]
    pub key: String,
    #[burrow(",notnull,default:'{}'")]
    pub value: String,
    #[burrow(",nullzero")]
    pub note: String,
}

// ============================================================================
// Mock connection
// ============================================================================

/// Records every statement and replays queued row sets in order. Queries
/// without a queued result return no rows; statements report one
/// affected row.
#[derive(Debug, Default)]
pub struct MockConn {
    statements: Mutex<Vec<String>>,
    results: Mutex<VecDeque<RowSet>>,
}

impl MockConn {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, rows: RowSet) {
        self.results.lock().unwrap().push_back(rows);
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    fn record(&self, sql: &str) {
        self.statements.lock().unwrap().push(sql.to_string());
    }
}

impl Conn for MockConn {
    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<RowSet, DriverError>> {
        self.record(sql);
        let rows = self.results.lock().unwrap().pop_front().unwrap_or_default();
        Box::pin(async move { Ok(rows) })
    }

    fn exec<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, DriverError>> {
        self.record(sql);
        Box::pin(async { Ok(1) })
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn pg() -> (Db, Arc<MockConn>) {
    let conn = MockConn::new();
    let db = Db::new(PgDialect::new(), Arc::clone(&conn));
    db.register_model::<OrderToItem>().unwrap();
    (db, conn)
}

pub fn sqlite() -> (Db, Arc<MockConn>) {
    let conn = MockConn::new();
    let db = Db::new(SqliteDialect::new(), Arc::clone(&conn));
    db.register_model::<OrderToItem>().unwrap();
    (db, conn)
}

pub fn mysql() -> (Db, Arc<MockConn>) {
    let conn = MockConn::new();
    let db = Db::new(MysqlDialect::new(), Arc::clone(&conn));
    db.register_model::<OrderToItem>().unwrap();
    (db, conn)
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

pub fn user_rows(users: &[(i64, &str)]) -> RowSet {
    users.iter().fold(RowSet::new(["id", "name", "emails"]), |rows, (id, name)| {
        rows.row(vec![Value::Int(*id), text(name), Value::Null])
    })
}

pub fn story_rows(stories: &[(i64, &str, i64)]) -> RowSet {
    stories
        .iter()
        .fold(RowSet::new(["id", "title", "author_id", "deleted_at"]), |rows, (id, title, author)| {
            rows.row(vec![Value::Int(*id), text(title), Value::Int(*author), Value::Null])
        })
}
