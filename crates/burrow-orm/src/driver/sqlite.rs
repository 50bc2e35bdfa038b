//! sqlx SQLite adapter.
//!
//! Statements are sent as complete SQL text and not cached as prepared
//! statements; result values are decoded by their storage class.

use burrow_core::Value;
use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, Transaction, TypeInfo, ValueRef};
use tokio::sync::Mutex;

use crate::conn::{Conn, RowSet};
use crate::error::DriverError;

/// Opens a single-connection in-memory database.
///
/// The pool never recycles its connection, so the database lives as long
/// as the pool.
///
/// # Errors
///
/// Returns the sqlx error when SQLite cannot be opened.
pub async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
}

fn decode(row: &SqliteRow, i: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(i)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    let value = match type_name.as_str() {
        "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => {
            Value::Int(row.try_get_unchecked::<i64, _>(i)?)
        }
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            Value::Float(row.try_get_unchecked::<f64, _>(i)?)
        }
        "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?),
        _ => Value::Text(row.try_get_unchecked::<String, _>(i)?),
    };
    Ok(value)
}

fn to_row_set(rows: &[SqliteRow]) -> Result<RowSet, DriverError> {
    let mut set = RowSet::default();
    let Some(first) = rows.first() else {
        return Ok(set);
    };
    set.columns = first.columns().iter().map(|c| c.name().to_string()).collect();
    for row in rows {
        let values = (0..row.len()).map(|i| decode(row, i)).collect::<Result<_, _>>()?;
        set.rows.push(values);
    }
    Ok(set)
}

impl Conn for SqlitePool {
    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<RowSet, DriverError>> {
        Box::pin(async move {
            let rows = sqlx::query(sql).persistent(false).fetch_all(self).await?;
            to_row_set(&rows)
        })
    }

    fn exec<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, DriverError>> {
        Box::pin(async move {
            let done = sqlx::query(sql).persistent(false).execute(self).await?;
            Ok(done.rows_affected())
        })
    }
}

impl Conn for Mutex<SqliteConnection> {
    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<RowSet, DriverError>> {
        Box::pin(async move {
            let mut conn = self.lock().await;
            let rows = sqlx::query(sql).persistent(false).fetch_all(&mut *conn).await?;
            to_row_set(&rows)
        })
    }

    fn exec<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, DriverError>> {
        Box::pin(async move {
            let mut conn = self.lock().await;
            let done = sqlx::query(sql).persistent(false).execute(&mut *conn).await?;
            Ok(done.rows_affected())
        })
    }
}

/// An open transaction. The ORM never commits or rolls back; take the
/// transaction out of the mutex when done.
impl Conn for Mutex<Transaction<'static, Sqlite>> {
    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<RowSet, DriverError>> {
        Box::pin(async move {
            let mut tx = self.lock().await;
            let rows = sqlx::query(sql).persistent(false).fetch_all(&mut **tx).await?;
            to_row_set(&rows)
        })
    }

    fn exec<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, DriverError>> {
        Box::pin(async move {
            let mut tx = self.lock().await;
            let done = sqlx::query(sql).persistent(false).execute(&mut **tx).await?;
            Ok(done.rows_affected())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decode_storage_classes() {
        let pool = memory_pool().await.unwrap();
        let rows = pool
            .query("SELECT 1 AS i, 1.5 AS f, 'it''s' AS t, X'0102' AS b, NULL AS n")
            .await
            .unwrap();
        assert_eq!(rows.columns, vec!["i", "f", "t", "b", "n"]);
        assert_eq!(
            rows.rows[0],
            vec![
                Value::Int(1),
                Value::Float(1.5),
                Value::Text("it's".into()),
                Value::Bytes(vec![1, 2]),
                Value::Null,
            ]
        );
    }

    #[tokio::test]
    async fn test_exec_counts_rows() {
        let pool = memory_pool().await.unwrap();
        pool.exec("CREATE TABLE t (x INTEGER)").await.unwrap();
        let n = pool.exec("INSERT INTO t (x) VALUES (1), (2), (3)").await.unwrap();
        assert_eq!(n, 3);
        let rows = pool.query("SELECT x FROM t WHERE x > 5").await.unwrap();
        assert!(rows.is_empty());
    }
}
