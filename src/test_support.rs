//! Shared helpers for unit tests.

use crate::executor::{Dialect, ExecError, ExecResult, Executor, Row};
use sea_query::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Executor that records every statement and replays queued result sets.
pub(crate) struct MockExecutor {
    dialect: Dialect,
    captured_sql: Arc<Mutex<Vec<String>>>,
    captured_params: Arc<Mutex<Vec<Vec<Value>>>>,
    queued_rows: Arc<Mutex<VecDeque<Vec<Row>>>>,
    in_transaction: Arc<Mutex<bool>>,
    fail_commit: Arc<Mutex<bool>>,
}

impl MockExecutor {
    pub(crate) fn new() -> Self {
        Self::with_dialect(Dialect::Sqlite)
    }

    pub(crate) fn with_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            captured_sql: Arc::new(Mutex::new(Vec::new())),
            captured_params: Arc::new(Mutex::new(Vec::new())),
            queued_rows: Arc::new(Mutex::new(VecDeque::new())),
            in_transaction: Arc::new(Mutex::new(false)),
            fail_commit: Arc::new(Mutex::new(false)),
        }
    }

    /// Queue the rows returned by the next `query_all`
    pub(crate) fn push_rows(&self, rows: Vec<Row>) {
        self.queued_rows.lock().unwrap().push_back(rows);
    }

    /// Make every `commit` fail and leave the transaction open
    pub(crate) fn fail_commits(&self) {
        *self.fail_commit.lock().unwrap() = true;
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.captured_sql.lock().unwrap().clone()
    }

    pub(crate) fn params(&self) -> Vec<Vec<Value>> {
        self.captured_params.lock().unwrap().clone()
    }

    fn capture(&self, sql: &str, params: &[Value]) {
        self.captured_sql.lock().unwrap().push(sql.to_string());
        self.captured_params.lock().unwrap().push(params.to_vec());
    }
}

impl Executor for MockExecutor {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult, ExecError> {
        self.capture(sql, params);
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        })
    }

    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecError> {
        self.capture(sql, params);
        Ok(self.queued_rows.lock().unwrap().pop_front().unwrap_or_default())
    }

    fn begin_transaction(&self) -> Result<(), ExecError> {
        self.capture("BEGIN", &[]);
        *self.in_transaction.lock().unwrap() = true;
        Ok(())
    }

    fn commit(&self) -> Result<(), ExecError> {
        self.capture("COMMIT", &[]);
        if *self.fail_commit.lock().unwrap() {
            return Err(ExecError::Other("commit refused".to_string()));
        }
        *self.in_transaction.lock().unwrap() = false;
        Ok(())
    }

    fn roll_back(&self) -> Result<(), ExecError> {
        self.capture("ROLLBACK", &[]);
        *self.in_transaction.lock().unwrap() = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        *self.in_transaction.lock().unwrap()
    }
}

/// Build a row from a `json!` object literal
pub(crate) fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}
