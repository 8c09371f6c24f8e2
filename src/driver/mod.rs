//! Wire driver abstraction.
//!
//! The executor never talks to a backend directly; it goes through the
//! [`Driver`] / [`DriverConnection`] pair. Production uses
//! [`mysql::MysqlDriver`] over the blocking MySQL protocol; tests and offline
//! development use the scripted [`mock::MockDriver`]. The seam is deliberately
//! narrow — connect, ping, query, execute, batch — so a backend only has to
//! speak parameterized SQL.

pub mod mock;
pub mod mysql;

use crate::config::DbConfig;
use crate::value::SqlValue;
use crate::Result;

/// A materialized result set: column names plus positional rows.
///
/// Statements that return no rows leave `columns` empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column names in SELECT order.
    pub columns: Vec<String>,
    /// Rows as positional values.
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    /// Builds a result set from columns and rows, mostly useful for scripting
    /// the mock driver.
    pub fn new<C, N>(columns: C, rows: Vec<Vec<SqlValue>>) -> Self
    where
        C: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Returns `true` when no row matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Rows affected.
    pub affected_rows: u64,
    /// Identifier generated by an auto-increment insert, when the backend
    /// produced one.
    pub last_insert_id: Option<u64>,
}

/// Factory for backend connections.
pub trait Driver {
    /// The connection type this driver produces.
    type Conn: DriverConnection;

    /// Establishes one connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] when the attempt fails; the
    /// [`crate::ConnectionManager`] owns the retry policy.
    fn connect(&self, config: &DbConfig) -> Result<Self::Conn>;
}

/// One live backend connection.
///
/// Implementations release the underlying resource on drop.
pub trait DriverConnection {
    /// Lightweight liveness probe. `false` means the connection is no longer
    /// usable and must be re-established.
    fn ping(&mut self) -> bool;

    /// Runs a statement and materializes its result set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Query`] when the backend rejects the
    /// statement.
    fn query(&mut self, sql: &str, args: &[SqlValue]) -> Result<ResultSet>;

    /// Runs a statement for its side effects.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Query`] when the backend rejects the
    /// statement.
    fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<ExecResult>;

    /// Prepares a statement once and executes it for every argument tuple,
    /// summing affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Query`] when preparation or any execution
    /// fails; earlier tuples stay applied (at-least-once, not transactional).
    fn execute_batch(&mut self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<ExecResult>;
}
