//! Table lifecycle: snapshot, backup, restore, partition maintenance.
//!
//! Built entirely on the query builder and executor — every operation here
//! compiles to the same parameterized statements callers could write by hand,
//! plus the DDL cloning needed for shadow tables.
//!
//! Shadow tables follow two conventions:
//! - `<table>__snapshot`: append-only audit copies with a `snapshot_time`
//!   column, created lazily from the source table's `describe` output.
//! - `<table>_bak`: replace-keyed backup clones of the source DDL, created
//!   lazily from `show create table`.
//!
//! Multi-statement workflows (create-if-absent then copy) are not wrapped in
//! a transaction: an interruption can leave a shadow table created but
//! unpopulated. Every operation is safe to repeat, so the guarantee is
//! at-least-once, not exactly-once.

use crate::driver::Driver;
use crate::executor::Database;
use crate::filter::Filter;
use crate::query::{WriteAction, build_query, build_values_batch};
use crate::table::{TableName, check_identifier, quote_identifier};
use crate::value::{Record, SqlValue};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::path::Path;

/// Which backup tables a purge should drop.
#[derive(Debug, Clone, Copy)]
pub enum BackupSelection<'a> {
    /// Every table matching the `%_bak` naming convention.
    All,
    /// An explicit, non-empty list of `_bak` table names.
    Tables(&'a [&'a str]),
}

/// Checkpoint and rollback operations over a [`Database`].
///
/// Obtained from [`Database::lifecycle`]; borrows the handle for the duration
/// of the workflow.
pub struct LifecycleManager<'db, D: Driver> {
    db: &'db mut Database<D>,
}

impl<D: Driver> Database<D> {
    /// Lifecycle operations for this handle.
    pub fn lifecycle(&mut self) -> LifecycleManager<'_, D> {
        LifecycleManager { db: self }
    }
}

impl<D: Driver> LifecycleManager<'_, D> {
    /// Appends the filtered rows of `table` to `<table>__snapshot`, stamping
    /// each with the capture time.
    ///
    /// The snapshot table is created on first use from the source table's
    /// column definitions plus a `snapshot_time datetime` column defaulting
    /// to now — an append-only audit log with no uniqueness, so repeated
    /// snapshots accumulate. Returns the number of rows captured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown tables or bad filters, and
    /// [`Error::Query`] for backend rejections.
    pub fn snapshot(&mut self, table: &str, filter: &Filter) -> Result<u64> {
        let table = self.db.tables().resolve(table)?;
        let snapshot = table.with_suffix("__snapshot");
        if !self.shadow_exists(&snapshot)? {
            let described = self.db.query_tuples(&format!("describe {table}"), &[])?;
            let mut defs = Vec::with_capacity(described.len() + 1);
            for row in &described {
                let (Some(field), Some(kind)) = (
                    row.first().and_then(SqlValue::as_str),
                    row.get(1).and_then(SqlValue::as_str),
                ) else {
                    return Err(Error::Query {
                        statement: format!("describe {table}"),
                        cause: "unexpected describe output shape".to_string(),
                    });
                };
                defs.push(format!("{} {kind}", quote_identifier(field)?));
            }
            defs.push("`snapshot_time` datetime not null default current_timestamp".to_string());
            self.db.execute(
                &format!("CREATE TABLE IF NOT EXISTS {snapshot} ({})", defs.join(",")),
                &[],
            )?;
            tracing::info!(table = table.raw(), "snapshot table created");
        }
        let predicate = filter.compile()?;
        let captured = self.db.execute(
            &format!(
                "insert into {snapshot} select *,now() from {table}{}",
                predicate.clause
            ),
            &predicate.args,
        )?;
        tracing::info!(table = table.raw(), rows = captured, "snapshot captured");
        Ok(captured)
    }

    /// Upserts the filtered rows of `table` into its backup table
    /// (`<table>_bak`, or `backup_name`).
    ///
    /// The backup table is created on first use by cloning the source DDL
    /// with the storage-engine clause stripped, so repeated backups replace
    /// on the table's own primary/unique keys rather than duplicating.
    /// Returns the affected-row count of the copy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown tables, invalid backup
    /// names or bad filters, and [`Error::Query`] for backend rejections.
    pub fn backup_to_table(
        &mut self,
        table: &str,
        filter: &Filter,
        backup_name: Option<&str>,
    ) -> Result<u64> {
        let table = self.db.tables().resolve(table)?;
        let backup = self.backup_table_name(&table, backup_name)?;
        let ddl = self.source_ddl(&table)?;
        let create = ddl
            .split_once("ENGINE")
            .map_or(ddl.as_str(), |(head, _)| head)
            .replacen(
                &format!("CREATE TABLE `{}`", table.raw()),
                &format!("CREATE TABLE IF NOT EXISTS `{}`", backup.raw()),
                1,
            );
        self.db.execute(&create, &[])?;
        let statement = build_query(
            &format!("replace into {backup} select *"),
            &table,
            filter,
            None,
            None,
        )?;
        let copied = self.db.execute_compiled(&statement)?;
        tracing::info!(
            table = table.raw(),
            backup = backup.raw(),
            rows = copied,
            "table backed up"
        );
        Ok(copied)
    }

    /// Writes the filtered rows of `table` as a replayable SQL script:
    /// one `replace into … values (…);` statement per row, values rendered
    /// as literals (`NULL`, bare numerics, quoted text).
    ///
    /// Parent directories are created as needed. The artifact replays via
    /// [`Database::run_script_file`]. Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown tables or bad filters,
    /// [`Error::Query`] for backend rejections, and [`Error::Io`] when the
    /// file cannot be written.
    pub fn backup_to_file(&mut self, path: &Path, table: &str, filter: &Filter) -> Result<usize> {
        let table = self.db.tables().resolve(table)?;
        let columns = self.db.query_tuples(
            "select COLUMN_NAME from information_schema.columns \
             where TABLE_NAME=? and TABLE_SCHEMA=DATABASE() order by ORDINAL_POSITION",
            &[SqlValue::Text(table.raw().to_string())],
        )?;
        let mut names = Vec::with_capacity(columns.len());
        for row in &columns {
            let Some(name) = row.first().and_then(SqlValue::as_str) else {
                return Err(Error::Query {
                    statement: "select COLUMN_NAME from information_schema.columns".to_string(),
                    cause: "unexpected column listing shape".to_string(),
                });
            };
            names.push(quote_identifier(name)?);
        }
        let statement = build_query("select *", &table, filter, None, None)?;
        let rows = self.db.query_tuples(&statement.sql, &statement.args)?;

        let mut script = format!(
            "-- backup of {table} ({} rows) at {}\n",
            rows.len(),
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        let column_list = names.join(",");
        for row in &rows {
            let literals: Vec<String> = row.iter().map(SqlValue::sql_literal).collect();
            script.push_str(&format!(
                "replace into {table} ({column_list}) values ({});\n",
                literals.join(",")
            ));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, script)?;
        tracing::info!(
            table = table.raw(),
            path = %path.display(),
            rows = rows.len(),
            "table backed up to script file"
        );
        Ok(rows.len())
    }

    /// Bulk `replace into` from in-memory records.
    ///
    /// Every record must carry the table's primary or unique key so replace
    /// semantics resolve conflicts deterministically; all records must share
    /// one ordered key set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for empty input or misaligned key sets,
    /// and [`Error::Query`] for backend rejections.
    pub fn recover_from_records(&mut self, table: &str, rows: &[Record]) -> Result<u64> {
        let table = self.db.tables().resolve(table)?;
        let Some(first) = rows.first() else {
            return Err(Error::Validation(
                "recovery requires at least one row".to_string(),
            ));
        };
        let columns: Vec<&str> = first.columns().collect();
        for (index, row) in rows.iter().enumerate() {
            let row_columns: Vec<&str> = row.columns().collect();
            if row_columns != columns {
                return Err(Error::Validation(format!(
                    "recovery row {index} key set {row_columns:?} differs from first row {columns:?}"
                )));
            }
        }
        let tuples: Vec<Vec<SqlValue>> = rows
            .iter()
            .map(|row| row.values().cloned().collect())
            .collect();
        let batch = build_values_batch(WriteAction::Replace, &table, Some(&columns), &tuples)?;
        self.db.execute_compiled_batch(&batch)
    }

    /// Bulk `replace into` from positional tuples, optionally aligned to an
    /// explicit column list (all columns, in table order, when omitted).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for empty input, width mismatches or bad
    /// column names, and [`Error::Query`] for backend rejections.
    pub fn recover_from_tuples(
        &mut self,
        table: &str,
        columns: Option<&[&str]>,
        rows: &[Vec<SqlValue>],
    ) -> Result<u64> {
        let table = self.db.tables().resolve(table)?;
        let batch = build_values_batch(WriteAction::Replace, &table, columns, rows)?;
        self.db.execute_compiled_batch(&batch)
    }

    /// Copies the filtered rows back from the backup table via
    /// `replace into … select *`.
    ///
    /// When the backup table does not exist this is a logged no-op returning
    /// `Ok(0)` — restoring from a backup that was never taken is an expected
    /// idle state in some workflows, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown tables, invalid backup
    /// names or bad filters, and [`Error::Query`] for backend rejections.
    pub fn recover_from_table(
        &mut self,
        table: &str,
        filter: &Filter,
        backup_name: Option<&str>,
    ) -> Result<u64> {
        let table = self.db.tables().resolve(table)?;
        let backup = self.backup_table_name(&table, backup_name)?;
        let probe = self.db.query_scalar(
            "SHOW TABLES LIKE ?",
            &[SqlValue::Text(backup.raw().to_string())],
        )?;
        if probe.is_none() {
            tracing::warn!(
                table = table.raw(),
                backup = backup.raw(),
                "backup table does not exist; nothing to restore"
            );
            return Ok(0);
        }
        let statement = build_query(
            &format!("replace into {table} select *"),
            &backup,
            filter,
            None,
            None,
        )?;
        let restored = self.db.execute_compiled(&statement)?;
        tracing::info!(
            table = table.raw(),
            backup = backup.raw(),
            rows = restored,
            "table restored from backup"
        );
        Ok(restored)
    }

    /// Adds list partitions `<prefix><suffix>` for every requested suffix not
    /// already present. Returns the partition names actually added — calling
    /// again with the same arguments adds nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown tables or non-numeric
    /// suffixes, and [`Error::Query`] for backend rejections.
    pub fn add_partitions(
        &mut self,
        table: &str,
        suffixes: &[&str],
        prefix: &str,
    ) -> Result<Vec<String>> {
        let table = self.db.tables().resolve(table)?;
        let requested = partition_names(prefix, suffixes)?;
        let present = self.present_partitions(&table, &requested)?;
        let mut added = Vec::new();
        for (name, suffix) in &requested {
            if present.contains(name) {
                continue;
            }
            self.db.execute(
                &format!(
                    "alter table {table} add partition (partition `{name}` values in ({suffix}))"
                ),
                &[],
            )?;
            added.push(name.clone());
        }
        if !added.is_empty() {
            tracing::info!(table = table.raw(), partitions = ?added, "partitions added");
        }
        Ok(added)
    }

    /// Drops partitions `<prefix><suffix>` for every requested suffix that is
    /// present. Returns the partition names actually dropped — names already
    /// absent are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown tables or non-numeric
    /// suffixes, and [`Error::Query`] for backend rejections.
    pub fn drop_partitions(
        &mut self,
        table: &str,
        suffixes: &[&str],
        prefix: &str,
    ) -> Result<Vec<String>> {
        let table = self.db.tables().resolve(table)?;
        let requested = partition_names(prefix, suffixes)?;
        let present = self.present_partitions(&table, &requested)?;
        let mut dropped = Vec::new();
        for (name, _) in &requested {
            if !present.contains(name) {
                continue;
            }
            self.db
                .execute(&format!("alter table {table} drop partition `{name}`"), &[])?;
            dropped.push(name.clone());
        }
        if !dropped.is_empty() {
            tracing::info!(table = table.raw(), partitions = ?dropped, "partitions dropped");
        }
        Ok(dropped)
    }

    /// Drops backup tables. Intended for suite setup, before any fixture is
    /// in flight. Returns the names dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when an explicit selection is empty or
    /// names a table without the `_bak` suffix, and [`Error::Query`] for
    /// backend rejections.
    pub fn purge_backup_tables(
        &mut self,
        selection: BackupSelection<'_>,
        exclude: &[&str],
    ) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> = match selection {
            BackupSelection::All => self.listed_tables("show tables like '%_bak'")?,
            BackupSelection::Tables(list) => {
                if list.is_empty() {
                    return Err(Error::Validation(
                        "backup purge requires a non-empty table list".to_string(),
                    ));
                }
                let mut set = BTreeSet::new();
                for name in list {
                    if !name.ends_with("_bak") {
                        return Err(Error::Validation(format!(
                            "`{name}` is not a backup table (missing _bak suffix)"
                        )));
                    }
                    check_identifier(name)?;
                    set.insert((*name).to_string());
                }
                set
            },
        };
        for excluded in exclude {
            names.remove(*excluded);
        }
        self.drop_tables(names, "backup tables purged")
    }

    /// Drops every `%__snapshot` table. Intended for suite setup. Returns the
    /// names dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] for backend rejections.
    pub fn purge_snapshot_tables(&mut self) -> Result<Vec<String>> {
        let names = self.listed_tables("show tables like '%__snapshot'")?;
        self.drop_tables(names, "snapshot tables purged")
    }

    fn shadow_exists(&mut self, table: &TableName) -> Result<bool> {
        let count = self.db.query_scalar(
            "SELECT COUNT(*) from information_schema.tables \
             WHERE table_schema = DATABASE() and TABLE_NAME = ?",
            &[SqlValue::Text(table.raw().to_string())],
        )?;
        Ok(count.and_then(|value| value.as_u64()).unwrap_or(0) > 0)
    }

    fn drop_tables(&mut self, names: BTreeSet<String>, message: &'static str) -> Result<Vec<String>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let joined: Vec<String> = names.iter().map(|name| format!("`{name}`")).collect();
        self.db
            .execute(&format!("drop table IF EXISTS {}", joined.join(",")), &[])?;
        tracing::info!(tables = ?names, "{message}");
        Ok(names.into_iter().collect())
    }

    fn listed_tables(&mut self, sql: &str) -> Result<BTreeSet<String>> {
        let rows = self.db.query_tuples(sql, &[])?;
        Ok(rows
            .iter()
            .filter_map(|row| row.first().and_then(SqlValue::as_str))
            .map(str::to_string)
            .collect())
    }

    fn backup_table_name(&self, table: &TableName, backup_name: Option<&str>) -> Result<TableName> {
        backup_name.map_or_else(
            || Ok(table.with_suffix("_bak")),
            |name| self.db.tables().resolve_shadow(name),
        )
    }

    fn source_ddl(&mut self, table: &TableName) -> Result<String> {
        let sql = format!("show create table {table}");
        let rows = self.db.query_tuples(&sql, &[])?;
        rows.first()
            .and_then(|row| row.get(1))
            .and_then(SqlValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Query {
                statement: sql,
                cause: "unexpected show create table output shape".to_string(),
            })
    }

    fn present_partitions(
        &mut self,
        table: &TableName,
        requested: &[(String, String)],
    ) -> Result<BTreeSet<String>> {
        if requested.is_empty() {
            return Ok(BTreeSet::new());
        }
        let placeholders = vec!["?"; requested.len()].join(",");
        let sql = format!(
            "select t.PARTITION_NAME from INFORMATION_SCHEMA.`PARTITIONS` t \
             where t.TABLE_SCHEMA = DATABASE() and t.TABLE_NAME=? \
             and t.PARTITION_NAME in ({placeholders})"
        );
        let mut args = Vec::with_capacity(requested.len() + 1);
        args.push(SqlValue::Text(table.raw().to_string()));
        args.extend(
            requested
                .iter()
                .map(|(name, _)| SqlValue::Text(name.clone())),
        );
        let rows = self.db.query_tuples(&sql, &args)?;
        Ok(rows
            .iter()
            .filter_map(|row| row.first().and_then(SqlValue::as_str))
            .map(str::to_string)
            .collect())
    }
}

/// Expands suffixes to `(partition name, suffix)` pairs, validating that each
/// suffix is numeric — the suffix doubles as the partition's `values in (…)`
/// literal, so nothing non-numeric may pass.
fn partition_names(prefix: &str, suffixes: &[&str]) -> Result<Vec<(String, String)>> {
    let mut names = Vec::with_capacity(suffixes.len());
    for suffix in suffixes {
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Validation(format!(
                "partition suffix `{suffix}` must be numeric"
            )));
        }
        let name = format!("{prefix}{suffix}");
        check_identifier(&name)?;
        names.push((name, (*suffix).to_string()));
    }
    Ok(names)
}
