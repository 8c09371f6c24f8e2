//! # fixturedb
//!
//! Fixture checkpoint, rollback and query layer for MySQL-backed API test
//! suites.
//!
//! fixturedb is the data-access core of an API regression harness: callers
//! describe predicates as plain key/value mappings (`field__operator` keys),
//! and the crate compiles them into fully parameterized SQL, executes them
//! over a single resilient blocking connection, and layers table lifecycle
//! operations (snapshot, backup, restore, partition maintenance) on top so
//! test fixtures can be checkpointed and rolled back between cases.
//!
//! ## Features
//!
//! - Declarative filters: suffix operators (`__gte`, `__between`, `__not`,
//!   `__contains`, …) compile to parameterized predicates — no raw SQL text
//! - One resilient connection: liveness probe plus bounded reconnect before
//!   every unit of work
//! - Table lifecycle: append-only snapshot tables, `_bak` backup tables,
//!   replayable SQL script backups, partition add/drop deltas
//! - Closed table registry blocking identifier injection
//! - Pluggable wire driver with a scripted mock for offline tests
//! - Cooperative advisory locks for cross-process fixture exclusion
//!
//! ## Example
//!
//! ```rust,ignore
//! use fixturedb::{Database, DbConfig, Filter, TableRegistry};
//!
//! let tables = TableRegistry::new(["s_match", "s_team"])?;
//! let mut db = Database::connect(DbConfig::from_env(), tables)?;
//!
//! let open = Filter::new()
//!     .with("status__gte", 2)
//!     .with("kickoff__between", vec!["2026-08-01", "2026-08-31"]);
//! let rows = db.fetch("s_match", &open, None, None)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod connection;
pub mod driver;
pub mod executor;
pub mod filter;
pub mod lifecycle;
pub mod lock;
pub mod query;
pub mod script;
pub mod table;
pub mod value;

// Re-exports for convenience
pub use config::{DbConfig, RetryConfig};
pub use connection::ConnectionManager;
pub use driver::mock::MockDriver;
pub use driver::mysql::MysqlDriver;
pub use driver::{Driver, DriverConnection, ExecResult, ResultSet};
pub use executor::Database;
pub use filter::{Filter, FilterValue, Operator, Predicate, SubQuery};
pub use lifecycle::{BackupSelection, LifecycleManager};
pub use query::{CompiledBatch, CompiledStatement, Direction, OrderBy, Page, WriteAction};
pub use table::{TableName, TableRegistry};
pub use value::{Record, SqlValue};

/// Error type for fixturedb operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Validation` | Unsupported filter operator, malformed filter shape, bad identifier, empty or misaligned write rows |
/// | `Query` | The backend rejects a well-formed-looking statement |
/// | `Connection` | A single connect attempt or liveness probe fails (recovered internally) |
/// | `ConnectionFatal` | The reconnect retry budget is exhausted |
/// | `Io` | Backup script files cannot be read or written |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A caller bug: the request can never succeed and is never retried.
    ///
    /// Raised when:
    /// - A filter key carries an unknown `__operator` suffix
    /// - A `between` value does not have exactly two elements
    /// - A field, table, or partition name fails identifier validation
    /// - A write is given an empty assignment map, or bulk rows whose key
    ///   sets disagree
    #[error("validation: {0}")]
    Validation(String),

    /// The backend rejected a statement.
    ///
    /// Carries the fully rendered statement (placeholders substituted with
    /// their argument literals) so the failure can be reproduced in a SQL
    /// shell. Never silently swallowed.
    #[error("query failed: {cause} (statement: {statement})")]
    Query {
        /// The rendered statement, arguments inlined.
        statement: String,
        /// The backend's reason.
        cause: String,
    },

    /// A single connection attempt or liveness probe failed.
    ///
    /// Transient by definition: the [`ConnectionManager`] retries these up to
    /// its budget, so callers only ever observe this variant as the `cause`
    /// inside [`Error::ConnectionFatal`].
    #[error("connection: {0}")]
    Connection(String),

    /// The reconnect retry budget is exhausted.
    ///
    /// Under the default policy the process terminates before this value is
    /// observable; with [`RetryConfig::exit_on_exhaustion`] disabled it is
    /// returned so embedding callers (and tests) can manage shutdown
    /// themselves. There is no partial-degradation mode.
    #[error("connection failed after {attempts} attempts: {cause}")]
    ConnectionFatal {
        /// Connect attempts made before giving up.
        attempts: u32,
        /// The last underlying failure.
        cause: String,
    },

    /// A backup script file could not be read or written.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for fixturedb operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Validation("bad suffix".to_string());
        assert_eq!(err.to_string(), "validation: bad suffix");

        let err = Error::Query {
            statement: "select 1".to_string(),
            cause: "gone away".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "query failed: gone away (statement: select 1)"
        );

        let err = Error::ConnectionFatal {
            attempts: 3,
            cause: "refused".to_string(),
        };
        assert_eq!(err.to_string(), "connection failed after 3 attempts: refused");
    }
}
