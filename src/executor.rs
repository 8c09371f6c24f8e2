//! Statement execution over the managed connection.
//!
//! [`Database`] is the crate's working surface: it owns the
//! [`ConnectionManager`], runs compiled statements, converts result sets into
//! [`Record`]s / tuples / scalars, and keeps the last rendered statement and
//! insert id for diagnostics. Every call probes liveness first, so transient
//! connectivity loss is invisible here — by the time a statement runs, either
//! the connection is live or the fatal reconnect policy has already applied.
//!
//! Methods take `&mut self`: one caller drives one connection. Workers that
//! need parallelism own one `Database` each.

use crate::config::DbConfig;
use crate::connection::ConnectionManager;
use crate::driver::mysql::MysqlDriver;
use crate::driver::{Driver, DriverConnection, ExecResult, ResultSet};
use crate::filter::Filter;
use crate::query::{
    CompiledBatch, CompiledStatement, Direction, OrderBy, Page, WriteAction, build_query,
    build_write, build_write_batch, render_statement,
};
use crate::script::split_statements;
use crate::table::{TableRegistry, quote_identifier};
use crate::value::{Record, SqlValue};
use crate::{Error, Result};
use std::path::Path;

/// The database handle: executor plus typed query/write wrappers.
///
/// Explicitly constructed and owned by the caller — lifetime is scoped to
/// whoever needs persistence, never ambient.
pub struct Database<D: Driver = MysqlDriver> {
    manager: ConnectionManager<D>,
    tables: TableRegistry,
    last_statement: Option<String>,
    last_insert_id: Option<u64>,
}

impl Database<MysqlDriver> {
    /// Connects to MySQL with the bounded retry policy from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFatal`] when the connect budget is
    /// exhausted and the exit policy is disabled.
    pub fn connect(config: DbConfig, tables: TableRegistry) -> Result<Self> {
        Self::connect_with(MysqlDriver, config, tables)
    }
}

impl<D: Driver> Database<D> {
    /// Connects through an explicit driver (the mock, in tests).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFatal`] when the connect budget is
    /// exhausted and the exit policy is disabled.
    pub fn connect_with(driver: D, config: DbConfig, tables: TableRegistry) -> Result<Self> {
        Ok(Self {
            manager: ConnectionManager::open(driver, config)?,
            tables,
            last_statement: None,
            last_insert_id: None,
        })
    }

    /// The closed table set this handle validates against.
    pub const fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    /// The configuration in effect.
    pub const fn config(&self) -> &DbConfig {
        self.manager.config()
    }

    /// The last statement sent to the wire, rendered with its arguments
    /// inlined.
    #[must_use]
    pub fn last_statement(&self) -> Option<&str> {
        self.last_statement.as_deref()
    }

    /// The insert id captured by the most recent write, if the backend
    /// produced one.
    #[must_use]
    pub const fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    /// Releases the connection.
    pub fn close(self) {
        self.manager.close();
    }

    // ------------------------------------------------------------------
    // Raw statement layer
    // ------------------------------------------------------------------

    /// Runs a query and returns field-named records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] with the rendered statement when the backend
    /// rejects it.
    pub fn query_rows(&mut self, sql: &str, args: &[SqlValue]) -> Result<Vec<Record>> {
        let set = self.raw_query(sql, args)?;
        Ok(to_records(set))
    }

    /// Runs a query and returns positional tuples.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] with the rendered statement when the backend
    /// rejects it.
    pub fn query_tuples(&mut self, sql: &str, args: &[SqlValue]) -> Result<Vec<Vec<SqlValue>>> {
        Ok(self.raw_query(sql, args)?.rows)
    }

    /// Returns the first row, or `None` when nothing matched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] with the rendered statement when the backend
    /// rejects it.
    pub fn query_first(&mut self, sql: &str, args: &[SqlValue]) -> Result<Option<Record>> {
        let set = self.raw_query(sql, args)?;
        Ok(to_records(set).into_iter().next())
    }

    /// Returns the first column of the first row.
    ///
    /// `None` means no row matched; `Some(SqlValue::Null)` means a row
    /// matched and its first column is NULL. Zero rows is never an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] with the rendered statement when the backend
    /// rejects it.
    pub fn query_scalar(&mut self, sql: &str, args: &[SqlValue]) -> Result<Option<SqlValue>> {
        let set = self.raw_query(sql, args)?;
        Ok(set.rows.into_iter().next().and_then(|mut row| {
            if row.is_empty() {
                None
            } else {
                Some(row.swap_remove(0))
            }
        }))
    }

    /// Runs a write statement, returning the affected-row count and capturing
    /// the last insert id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] with the rendered statement when the backend
    /// rejects it.
    pub fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<u64> {
        let outcome = self.raw_execute(sql, args)?;
        Ok(outcome.affected_rows)
    }

    /// Runs a write statement once per argument tuple (statement prepared
    /// once), returning the summed affected-row count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] with the rendered statement when the backend
    /// rejects it; earlier tuples stay applied.
    pub fn execute_batch(&mut self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<u64> {
        let rendered = render_statement(sql, rows.first().map_or(&[][..], Vec::as_slice));
        metrics::counter!("fixturedb_statements_total").increment(1);
        tracing::debug!(statement = %rendered, tuples = rows.len(), "batch execute");
        let outcome = self
            .manager
            .connection()?
            .execute_batch(sql, rows)
            .map_err(|e| remap(&rendered, e));
        self.last_statement = Some(rendered);
        let result = outcome?;
        self.last_insert_id = result.last_insert_id;
        Ok(result.affected_rows)
    }

    /// Replays a multi-statement script, one statement at a time, with no
    /// parameter substitution. Returns the number of statements executed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] on the first rejected statement; earlier
    /// statements stay applied.
    pub fn run_script(&mut self, script: &str) -> Result<usize> {
        let statements = split_statements(script);
        for statement in &statements {
            self.raw_execute(statement, &[])?;
        }
        tracing::debug!(count = statements.len(), "script executed");
        Ok(statements.len())
    }

    /// Reads a script file and replays it via [`run_script`](Self::run_script).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be read, or
    /// [`Error::Query`] on the first rejected statement.
    pub fn run_script_file(&mut self, path: &Path) -> Result<usize> {
        tracing::info!(path = %path.display(), "executing sql script file");
        let script = std::fs::read_to_string(path)?;
        self.run_script(&script)
    }

    // ------------------------------------------------------------------
    // Typed wrappers over the compiled-statement layer
    // ------------------------------------------------------------------

    /// `select *` with optional ordering and pagination.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown tables or bad filters, and
    /// [`Error::Query`] for backend rejections.
    pub fn fetch(
        &mut self,
        table: &str,
        filter: &Filter,
        order_by: Option<&OrderBy>,
        page: Option<Page>,
    ) -> Result<Vec<Record>> {
        let table = self.tables.resolve(table)?;
        let statement = build_query("select *", &table, filter, order_by, page)?;
        self.query_rows(&statement.sql, &statement.args)
    }

    /// `select count(*)` under the filter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown tables or bad filters, and
    /// [`Error::Query`] for backend rejections.
    pub fn count(&mut self, table: &str, filter: &Filter) -> Result<u64> {
        let table = self.tables.resolve(table)?;
        let statement = build_query("select count(*)", &table, filter, None, None)?;
        Ok(self
            .query_scalar(&statement.sql, &statement.args)?
            .and_then(|value| value.as_u64())
            .unwrap_or(0))
    }

    /// Maximum value of `column` under the filter; `None` when no row
    /// matched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown tables or bad filters, and
    /// [`Error::Query`] for backend rejections.
    pub fn max_value(
        &mut self,
        table: &str,
        column: &str,
        filter: &Filter,
    ) -> Result<Option<SqlValue>> {
        let table = self.tables.resolve(table)?;
        let column = quote_identifier(column)?;
        let statement = build_query(&format!("select max({column})"), &table, filter, None, None)?;
        // max() over zero rows yields a single NULL row; fold it into None.
        Ok(self
            .query_scalar(&statement.sql, &statement.args)?
            .filter(|value| !value.is_null()))
    }

    /// Distinct values of one column, optionally ordered by that column and
    /// paginated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown tables or bad filters, and
    /// [`Error::Query`] for backend rejections.
    pub fn column_values(
        &mut self,
        table: &str,
        column: &str,
        filter: &Filter,
        order: Option<Direction>,
        page: Option<Page>,
    ) -> Result<Vec<SqlValue>> {
        let table = self.tables.resolve(table)?;
        let quoted = quote_identifier(column)?;
        let order_by = order.map(|direction| OrderBy::new(column, direction));
        let statement = build_query(
            &format!("select DISTINCT {quoted}"),
            &table,
            filter,
            order_by.as_ref(),
            page,
        )?;
        let tuples = self.query_tuples(&statement.sql, &statement.args)?;
        Ok(tuples
            .into_iter()
            .filter_map(|mut row| {
                if row.is_empty() {
                    None
                } else {
                    Some(row.swap_remove(0))
                }
            })
            .collect())
    }

    /// `update … set … where …`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown tables, empty assignments or
    /// bad filters, and [`Error::Query`] for backend rejections.
    pub fn update(&mut self, table: &str, assignments: &Record, filter: &Filter) -> Result<u64> {
        self.write_one(WriteAction::Update, table, assignments, filter)
    }

    /// Bulk `update`: statement built once from the first row's keys,
    /// executed once per row with the shared predicate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for misaligned rows, and
    /// [`Error::Query`] for backend rejections.
    pub fn update_many(&mut self, table: &str, rows: &[Record], filter: &Filter) -> Result<u64> {
        self.write_many(WriteAction::Update, table, rows, filter)
    }

    /// `insert into … set …`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown tables or empty assignments,
    /// and [`Error::Query`] for backend rejections.
    pub fn insert(&mut self, table: &str, row: &Record) -> Result<u64> {
        self.write_one(WriteAction::Insert, table, row, &Filter::new())
    }

    /// Bulk `insert into`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for misaligned rows, and
    /// [`Error::Query`] for backend rejections.
    pub fn insert_many(&mut self, table: &str, rows: &[Record]) -> Result<u64> {
        self.write_many(WriteAction::Insert, table, rows, &Filter::new())
    }

    /// `replace into … set …` — upsert on the table's own primary or unique
    /// keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown tables or empty assignments,
    /// and [`Error::Query`] for backend rejections.
    pub fn replace_into(&mut self, table: &str, row: &Record) -> Result<u64> {
        self.write_one(WriteAction::Replace, table, row, &Filter::new())
    }

    /// Bulk `replace into`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for misaligned rows, and
    /// [`Error::Query`] for backend rejections.
    pub fn replace_into_many(&mut self, table: &str, rows: &[Record]) -> Result<u64> {
        self.write_many(WriteAction::Replace, table, rows, &Filter::new())
    }

    /// `delete from … where …`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown tables or bad filters, and
    /// [`Error::Query`] for backend rejections.
    pub fn delete(&mut self, table: &str, filter: &Filter) -> Result<u64> {
        let table = self.tables.resolve(table)?;
        let statement = build_query("delete", &table, filter, None, None)?;
        self.execute(&statement.sql, &statement.args)
    }

    // ------------------------------------------------------------------
    // Crate-internal plumbing
    // ------------------------------------------------------------------

    pub(crate) fn execute_compiled(&mut self, statement: &CompiledStatement) -> Result<u64> {
        self.execute(&statement.sql, &statement.args)
    }

    pub(crate) fn execute_compiled_batch(&mut self, batch: &CompiledBatch) -> Result<u64> {
        self.execute_batch(&batch.sql, &batch.rows)
    }

    fn write_one(
        &mut self,
        action: WriteAction,
        table: &str,
        assignments: &Record,
        filter: &Filter,
    ) -> Result<u64> {
        let table = self.tables.resolve(table)?;
        let statement = build_write(action, &table, assignments, filter)?;
        self.execute(&statement.sql, &statement.args)
    }

    fn write_many(
        &mut self,
        action: WriteAction,
        table: &str,
        rows: &[Record],
        filter: &Filter,
    ) -> Result<u64> {
        let table = self.tables.resolve(table)?;
        let batch = build_write_batch(action, &table, rows, filter)?;
        self.execute_batch(&batch.sql, &batch.rows)
    }

    fn raw_query(&mut self, sql: &str, args: &[SqlValue]) -> Result<ResultSet> {
        let rendered = render_statement(sql, args);
        metrics::counter!("fixturedb_statements_total").increment(1);
        tracing::debug!(statement = %rendered, "query");
        let outcome = self
            .manager
            .connection()?
            .query(sql, args)
            .map_err(|e| remap(&rendered, e));
        self.last_statement = Some(rendered);
        outcome
    }

    fn raw_execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<ExecResult> {
        let rendered = render_statement(sql, args);
        metrics::counter!("fixturedb_statements_total").increment(1);
        tracing::debug!(statement = %rendered, "execute");
        let outcome = self
            .manager
            .connection()?
            .execute(sql, args)
            .map_err(|e| remap(&rendered, e));
        self.last_statement = Some(rendered);
        let result = outcome?;
        self.last_insert_id = result.last_insert_id;
        Ok(result)
    }
}

/// Rewrites a driver-level query failure to carry the rendered statement.
fn remap(rendered: &str, error: Error) -> Error {
    match error {
        Error::Query { cause, .. } => Error::Query {
            statement: rendered.to_string(),
            cause,
        },
        other => other,
    }
}

fn to_records(set: ResultSet) -> Vec<Record> {
    let ResultSet { columns, rows } = set;
    rows.into_iter()
        .map(|row| columns.iter().cloned().zip(row).collect::<Record>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::driver::mock::{MockDriver, StatementKind};
    use std::time::Duration;

    fn test_db(driver: &MockDriver) -> Database<MockDriver> {
        let config = DbConfig::default().with_retry(
            RetryConfig::default()
                .with_retry_delay(Duration::from_millis(1))
                .with_exit_on_exhaustion(false),
        );
        let tables = TableRegistry::new(["s_match", "game_draw", "toto_config"]).unwrap();
        Database::connect_with(driver.clone(), config, tables).unwrap()
    }

    #[test]
    fn test_fetch_builds_select_star_and_converts_records() {
        let driver = MockDriver::new();
        let mut db = test_db(&driver);
        driver.respond_when(
            "select * from `s_match`",
            ResultSet::new(
                ["match_id", "status"],
                vec![
                    vec![SqlValue::Int(1), SqlValue::Text("open".into())],
                    vec![SqlValue::Int(2), SqlValue::Null],
                ],
            ),
        );
        let rows = db
            .fetch("s_match", &Filter::new().with("status__not", SqlValue::Null), None, None)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("match_id"), Some(&SqlValue::Int(1)));
        assert_eq!(rows[1].get("status"), Some(&SqlValue::Null));

        let log = driver.statements();
        assert_eq!(log[0].sql, "select * from `s_match` where `status` is not NULL");
    }

    #[test]
    fn test_unknown_table_rejected_before_wire() {
        let driver = MockDriver::new();
        let mut db = test_db(&driver);
        let result = db.fetch("mystery", &Filter::new(), None, None);
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(driver.statements().is_empty());
    }

    #[test]
    fn test_liveness_probe_failure_is_masked() {
        let driver = MockDriver::new();
        let mut db = test_db(&driver);
        assert_eq!(driver.connect_attempts(), 1);

        driver.fail_pings(1);
        db.query_tuples("select 1", &[]).unwrap();
        assert_eq!(driver.connect_attempts(), 2);
    }

    #[test]
    fn test_query_scalar_distinguishes_no_row_from_null() {
        let driver = MockDriver::new();
        let mut db = test_db(&driver);

        assert_eq!(db.query_scalar("select `x` from `t`", &[]).unwrap(), None);

        driver.enqueue(ResultSet::new(["x"], vec![vec![SqlValue::Null]]));
        assert_eq!(
            db.query_scalar("select `x` from `t`", &[]).unwrap(),
            Some(SqlValue::Null)
        );
    }

    #[test]
    fn test_count_reads_scalar() {
        let driver = MockDriver::new();
        let mut db = test_db(&driver);
        driver.respond_when(
            "select count(*) from `game_draw`",
            ResultSet::new(["count(*)"], vec![vec![SqlValue::Int(12)]]),
        );
        let count = db.count("game_draw", &Filter::new().with("status", 1)).unwrap();
        assert_eq!(count, 12);
    }

    #[test]
    fn test_max_value_folds_null_to_none() {
        let driver = MockDriver::new();
        let mut db = test_db(&driver);
        driver.enqueue(ResultSet::new(["max(`draw_id`)"], vec![vec![SqlValue::Null]]));
        let max = db.max_value("game_draw", "draw_id", &Filter::new()).unwrap();
        assert_eq!(max, None);
    }

    #[test]
    fn test_column_values_distinct_with_order() {
        let driver = MockDriver::new();
        let mut db = test_db(&driver);
        driver.enqueue(ResultSet::new(
            ["draw_id"],
            vec![vec![SqlValue::Int(3)], vec![SqlValue::Int(2)]],
        ));
        let values = db
            .column_values(
                "game_draw",
                "draw_id",
                &Filter::new(),
                Some(Direction::Desc),
                Some(Page::of(2)),
            )
            .unwrap();
        assert_eq!(values, vec![SqlValue::Int(3), SqlValue::Int(2)]);
        assert_eq!(
            driver.statements()[0].sql,
            "select DISTINCT `draw_id` from `game_draw` order by `draw_id` DESC limit 2"
        );
    }

    #[test]
    fn test_update_and_last_statement_rendering() {
        let driver = MockDriver::new();
        driver.set_affected_rows(2);
        let mut db = test_db(&driver);
        let affected = db
            .update(
                "toto_config",
                &Record::new().with("config_value", "off"),
                &Filter::new().with("config_key", "maintenance"),
            )
            .unwrap();
        assert_eq!(affected, 2);
        assert_eq!(
            db.last_statement(),
            Some("update `toto_config` set `config_value`='off' where `config_key`='maintenance'")
        );
    }

    #[test]
    fn test_insert_captures_last_insert_id() {
        let driver = MockDriver::new();
        driver.set_last_insert_id(Some(41));
        let mut db = test_db(&driver);
        db.insert("game_draw", &Record::new().with("status", 1)).unwrap();
        assert_eq!(db.last_insert_id(), Some(41));
    }

    #[test]
    fn test_bulk_write_goes_through_batch() {
        let driver = MockDriver::new();
        let mut db = test_db(&driver);
        let rows = vec![
            Record::new().with("draw_id", 1).with("status", 2),
            Record::new().with("draw_id", 2).with("status", 2),
        ];
        db.replace_into_many("game_draw", &rows).unwrap();
        let log = driver.statements();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, StatementKind::Batch);
        assert_eq!(log[0].sql, "replace into `game_draw` set `draw_id`=?,`status`=?");
    }

    #[test]
    fn test_failed_statement_carries_rendered_text() {
        let driver = MockDriver::new();
        let mut db = test_db(&driver);
        driver.fail_when("delete from", "foreign key constraint");
        let result = db.delete("s_match", &Filter::new().with("match_id", 5));
        match result {
            Err(Error::Query { statement, cause }) => {
                assert_eq!(statement, "delete from `s_match` where `match_id`=5");
                assert_eq!(cause, "foreign key constraint");
            },
            other => panic!("expected Query error, got {other:?}"),
        }
    }

    #[test]
    fn test_run_script_executes_each_statement() {
        let driver = MockDriver::new();
        let mut db = test_db(&driver);
        let count = db
            .run_script("select 1;\n-- checkpoint\ninsert into `t` values ('a;b');\n")
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(driver.statements().len(), 2);
    }

    #[test]
    fn test_run_script_file_round_trip() {
        let driver = MockDriver::new();
        let mut db = test_db(&driver);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restore.sql");
        std::fs::write(&path, "select 1;select 2;").unwrap();
        assert_eq!(db.run_script_file(&path).unwrap(), 2);
    }
}
