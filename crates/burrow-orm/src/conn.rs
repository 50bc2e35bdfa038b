//! The execution boundary: connections, row sets and per-call context.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use burrow_core::Value;
use futures::future::BoxFuture;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::DriverError;

/// Rows returned by a query, decoded into [`Value`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Creates an empty row set with the given column names.
    #[must_use]
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row. Builder-style, for tests and adapters.
    #[must_use]
    pub fn row(mut self, row: Vec<Value>) -> Self {
        self.rows.push(row);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the value of `column` in row `row`.
    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let i = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(i)
    }
}

/// A connection capable of running complete SQL statements.
///
/// Implemented for sqlx SQLite pools, connections and transactions; any
/// other driver can be plugged in by implementing these two methods.
pub trait Conn: Send + Sync {
    /// Runs a statement that returns rows.
    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<RowSet, DriverError>>;

    /// Runs a statement and returns the number of affected rows.
    fn exec<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, DriverError>>;
}

impl<C: Conn + ?Sized> Conn for Arc<C> {
    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<RowSet, DriverError>> {
        (**self).query(sql)
    }

    fn exec<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, DriverError>> {
        (**self).exec(sql)
    }
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancels every round trip of the calls it is attached to.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token. In-flight round trips fail with
    /// [`DriverError::Cancelled`] and later ones never start.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once the token fires.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Deadline and cancellation attached to one call.
///
/// Relation queries issued on behalf of a call inherit its context, so
/// cancelling the call aborts the whole fan-out.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl Context {
    /// A context without deadline or cancellation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Races `fut` against the deadline (or `default_timeout` when the
    /// context has none) and the cancel token.
    pub(crate) async fn run<T, F>(
        &self,
        default_timeout: Option<Duration>,
        fut: F,
    ) -> Result<T, DriverError>
    where
        F: Future<Output = Result<T, DriverError>>,
    {
        let start = Instant::now();
        let deadline = match (self.deadline, default_timeout) {
            (Some(d), Some(t)) => Some(d.min(start + t)),
            (Some(d), None) => Some(d),
            (None, Some(t)) => Some(start + t),
            (None, None) => None,
        };
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(DriverError::Cancelled);
        }

        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = cancelled => Err(DriverError::Cancelled),
            () = expired => {
                Err(DriverError::Timeout(deadline.map_or(Duration::ZERO, |d| d - start)))
            }
            result = fut => result,
        }
    }
}
