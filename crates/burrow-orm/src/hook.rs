//! Query observers.

use std::time::Duration;

use burrow_core::Value;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// What an observer sees of one round trip.
///
/// `before_query` receives the event with `elapsed` zero and no outcome;
/// `after_query` receives it completed.
#[derive(Debug, Clone)]
pub struct QueryEvent {
    /// Statement text as sent to the connection.
    pub query: String,
    /// Template arguments, empty for literal statements.
    pub args: Vec<Value>,
    pub start_time: DateTime<Utc>,
    pub elapsed: Duration,
    /// Returned or affected rows on success.
    pub rows: Option<u64>,
    /// Error message on failure.
    pub error: Option<String>,
}

impl QueryEvent {
    pub(crate) fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            args: Vec::new(),
            start_time: Utc::now(),
            elapsed: Duration::ZERO,
            rows: None,
            error: None,
        }
    }

    /// Returns true when the round trip failed.
    #[must_use]
    pub const fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

/// Observes every round trip of a [`Db`](crate::Db).
///
/// Before-observers run in registration order, after-observers in reverse
/// order, and after-observers run even when the round trip fails.
pub trait QueryHook: Send + Sync {
    fn before_query(&self, _event: &QueryEvent) {}

    fn after_query(&self, _event: &QueryEvent) {}
}

/// Logs statements through `tracing`.
///
/// Successful statements are logged at DEBUG, statements slower than the
/// threshold at INFO and failures at WARN.
#[derive(Debug, Clone, Default)]
pub struct QueryLogger {
    slow_threshold: Option<Duration>,
}

impl QueryLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Promotes statements taking at least `threshold` to INFO.
    #[must_use]
    pub const fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }
}

impl QueryHook for QueryLogger {
    fn after_query(&self, event: &QueryEvent) {
        let elapsed_ms = event.elapsed.as_secs_f64() * 1000.0;
        if let Some(error) = &event.error {
            warn!(query = %event.query, elapsed_ms, error = %error, "query failed");
        } else if self.slow_threshold.is_some_and(|t| event.elapsed >= t) {
            info!(query = %event.query, elapsed_ms, rows = event.rows, "slow query");
        } else {
            debug!(query = %event.query, elapsed_ms, rows = event.rows, "query");
        }
    }
}
