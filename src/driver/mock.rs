//! Scripted in-memory driver.
//!
//! `MockDriver` stands in for the MySQL wire so connection policy, statement
//! generation, and lifecycle flows can be exercised without a backend. Tests
//! script it up front — connect/ping failure budgets, canned result sets —
//! and afterwards inspect the exact statements and arguments that reached the
//! "wire".
//!
//! The driver and every connection it hands out share one state cell, so a
//! test keeps its own clone of the driver while the
//! [`Database`](crate::Database) owns another.

use super::{Driver, DriverConnection, ExecResult, ResultSet};
use crate::config::DbConfig;
use crate::value::SqlValue;
use crate::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How a statement reached the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Via [`DriverConnection::query`].
    Query,
    /// Via [`DriverConnection::execute`].
    Execute,
    /// Via [`DriverConnection::execute_batch`] (one entry per batch).
    Batch,
}

/// One statement as observed by the mock wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    /// Entry point used.
    pub kind: StatementKind,
    /// Statement text with placeholders.
    pub sql: String,
    /// Bound arguments; for batches, the tuples are flattened in order.
    pub args: Vec<SqlValue>,
}

#[derive(Debug, Default)]
struct MockState {
    connect_attempts: u32,
    connect_failures_remaining: u32,
    ping_failures_remaining: u32,
    canned: Vec<(String, ResultSet)>,
    queued: VecDeque<ResultSet>,
    fail_matching: Option<(String, String)>,
    affected_rows: u64,
    last_insert_id: Option<u64>,
    statements: Vec<ExecutedStatement>,
}

/// Scripted driver for tests and offline development.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Creates a driver that accepts every connect and answers every query
    /// with an empty result set.
    #[must_use]
    pub fn new() -> Self {
        let driver = Self::default();
        driver.lock().affected_rows = 1;
        driver
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fails the next `count` connect attempts.
    pub fn fail_connects(&self, count: u32) {
        self.lock().connect_failures_remaining = count;
    }

    /// Fails the next `count` liveness probes.
    pub fn fail_pings(&self, count: u32) {
        self.lock().ping_failures_remaining = count;
    }

    /// Answers any query whose text contains `needle` with `result`,
    /// repeatably. Canned answers are checked before the one-shot queue.
    pub fn respond_when(&self, needle: impl Into<String>, result: ResultSet) {
        self.lock().canned.push((needle.into(), result));
    }

    /// Queues a one-shot result for the next otherwise-unmatched query.
    pub fn enqueue(&self, result: ResultSet) {
        self.lock().queued.push_back(result);
    }

    /// Fails any statement whose text contains `needle` with the given cause.
    pub fn fail_when(&self, needle: impl Into<String>, cause: impl Into<String>) {
        self.lock().fail_matching = Some((needle.into(), cause.into()));
    }

    /// Sets the affected-row count reported per execute call.
    pub fn set_affected_rows(&self, affected: u64) {
        self.lock().affected_rows = affected;
    }

    /// Sets the insert id reported by subsequent writes.
    pub fn set_last_insert_id(&self, id: Option<u64>) {
        self.lock().last_insert_id = id;
    }

    /// Connect attempts observed so far (successful or not).
    #[must_use]
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    /// Snapshot of every statement that reached the wire.
    #[must_use]
    pub fn statements(&self) -> Vec<ExecutedStatement> {
        self.lock().statements.clone()
    }

    /// Statement texts containing `needle`, in execution order.
    #[must_use]
    pub fn statements_containing(&self, needle: &str) -> Vec<String> {
        self.lock()
            .statements
            .iter()
            .filter(|record| record.sql.contains(needle))
            .map(|record| record.sql.clone())
            .collect()
    }

    /// Clears the statement log.
    pub fn clear_statements(&self) {
        self.lock().statements.clear();
    }
}

impl Driver for MockDriver {
    type Conn = MockConnection;

    fn connect(&self, _config: &DbConfig) -> Result<MockConnection> {
        let mut state = self.lock();
        state.connect_attempts += 1;
        if state.connect_failures_remaining > 0 {
            state.connect_failures_remaining -= 1;
            return Err(Error::Connection("scripted connect failure".to_string()));
        }
        Ok(MockConnection {
            state: Arc::clone(&self.state),
        })
    }
}

/// Connection handed out by [`MockDriver`]; shares the driver's state cell.
#[derive(Debug)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_failure(state: &MockState, sql: &str) -> Result<()> {
        if let Some((needle, cause)) = &state.fail_matching {
            if sql.contains(needle.as_str()) {
                return Err(Error::Query {
                    statement: sql.to_string(),
                    cause: cause.clone(),
                });
            }
        }
        Ok(())
    }
}

impl DriverConnection for MockConnection {
    fn ping(&mut self) -> bool {
        let mut state = self.lock();
        if state.ping_failures_remaining > 0 {
            state.ping_failures_remaining -= 1;
            false
        } else {
            true
        }
    }

    fn query(&mut self, sql: &str, args: &[SqlValue]) -> Result<ResultSet> {
        let mut state = self.lock();
        state.statements.push(ExecutedStatement {
            kind: StatementKind::Query,
            sql: sql.to_string(),
            args: args.to_vec(),
        });
        Self::check_failure(&state, sql)?;
        if let Some((_, result)) = state
            .canned
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
        {
            return Ok(result.clone());
        }
        Ok(state.queued.pop_front().unwrap_or_default())
    }

    fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<ExecResult> {
        let mut state = self.lock();
        state.statements.push(ExecutedStatement {
            kind: StatementKind::Execute,
            sql: sql.to_string(),
            args: args.to_vec(),
        });
        Self::check_failure(&state, sql)?;
        Ok(ExecResult {
            affected_rows: state.affected_rows,
            last_insert_id: state.last_insert_id,
        })
    }

    fn execute_batch(&mut self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<ExecResult> {
        let mut state = self.lock();
        state.statements.push(ExecutedStatement {
            kind: StatementKind::Batch,
            sql: sql.to_string(),
            args: rows.iter().flatten().cloned().collect(),
        });
        Self::check_failure(&state, sql)?;
        Ok(ExecResult {
            affected_rows: state.affected_rows * rows.len() as u64,
            last_insert_id: state.last_insert_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DbConfig {
        DbConfig::default()
    }

    #[test]
    fn test_connect_failure_budget() {
        let driver = MockDriver::new();
        driver.fail_connects(2);
        assert!(driver.connect(&config()).is_err());
        assert!(driver.connect(&config()).is_err());
        assert!(driver.connect(&config()).is_ok());
        assert_eq!(driver.connect_attempts(), 3);
    }

    #[test]
    fn test_canned_response_beats_queue() {
        let driver = MockDriver::new();
        let mut conn = driver.connect(&config()).unwrap();
        driver.respond_when(
            "count(*)",
            ResultSet::new(["count(*)"], vec![vec![SqlValue::Int(7)]]),
        );
        driver.enqueue(ResultSet::new(["x"], vec![vec![SqlValue::Int(1)]]));

        let canned = conn.query("select count(*) from `t`", &[]).unwrap();
        assert_eq!(canned.rows[0][0], SqlValue::Int(7));

        let queued = conn.query("select x from `t`", &[]).unwrap();
        assert_eq!(queued.rows[0][0], SqlValue::Int(1));

        let empty = conn.query("select x from `t`", &[]).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_statement_log_captures_args() {
        let driver = MockDriver::new();
        let mut conn = driver.connect(&config()).unwrap();
        conn.execute("delete from `t` where `id`=?", &[SqlValue::Int(9)])
            .unwrap();
        let log = driver.statements();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, StatementKind::Execute);
        assert_eq!(log[0].args, vec![SqlValue::Int(9)]);
    }

    #[test]
    fn test_scripted_failure() {
        let driver = MockDriver::new();
        let mut conn = driver.connect(&config()).unwrap();
        driver.fail_when("drop table", "access denied");
        let result = conn.execute("drop table `t`", &[]);
        assert!(matches!(result, Err(Error::Query { .. })));
    }
}
