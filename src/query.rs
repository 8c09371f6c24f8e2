//! Statement composition.
//!
//! Builders that combine an action prefix, a table name, a compiled
//! [`Predicate`], ordering and pagination into a [`CompiledStatement`] — or,
//! for the `set`-clause family (`update` / `insert into` / `replace into`),
//! an assignment map or batch of rows into a statement plus its argument
//! tuples.
//!
//! The action prefix stays caller-supplied text (`"select draw_id"`,
//! `"select count(*)"`, `"delete"`, ``"replace into `t` select *"``): the
//! callers are a closed, in-crate set, and the flexibility is what lets the
//! lifecycle operations reuse one code path for copy, count and delete
//! statements.

use crate::filter::Filter;
use crate::table::{TableName, quote_identifier};
use crate::value::{Record, SqlValue};
use crate::{Error, Result};
use std::fmt;

/// An immutable compiled statement: SQL text with `?` placeholders plus the
/// ordered argument list. Produced per call, never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    /// Statement text with positional placeholders.
    pub sql: String,
    /// Arguments in placeholder order.
    pub args: Vec<SqlValue>,
}

impl CompiledStatement {
    /// Renders the statement with arguments inlined as literals, for
    /// diagnostics.
    #[must_use]
    pub fn render(&self) -> String {
        render_statement(&self.sql, &self.args)
    }
}

/// A statement built once and executed once per argument tuple.
///
/// All tuples come from rows sharing one key set, so the placeholder shape is
/// identical across executions.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBatch {
    /// Statement text with positional placeholders.
    pub sql: String,
    /// One argument tuple per row.
    pub rows: Vec<Vec<SqlValue>>,
}

/// Sort direction for [`OrderBy`].
///
/// Only these two directions exist; parsing any other token fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// Parses `ASC`/`DESC` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for any other token.
    pub fn parse(token: &str) -> Result<Self> {
        match token.to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            other => Err(Error::Validation(format!(
                "order direction must be ASC or DESC, got `{other}`"
            ))),
        }
    }

    /// The SQL keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An `order by` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    column: String,
    direction: Direction,
}

impl OrderBy {
    /// Orders by `column` in the given direction.
    pub fn new(column: impl Into<String>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    /// Ascending shorthand.
    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, Direction::Asc)
    }

    /// Descending shorthand.
    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, Direction::Desc)
    }

    fn compile(&self) -> Result<String> {
        let column = quote_identifier(&self.column)?;
        Ok(format!(" order by {column} {}", self.direction))
    }
}

/// Pagination: a page size with an optional 1-based page number.
///
/// A page number without a size is unrepresentable — the original mapping
/// surface silently ignored that combination; the typed surface removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    size: u64,
    number: Option<u64>,
}

impl Page {
    /// First `size` rows (`limit size`).
    #[must_use]
    pub const fn of(size: u64) -> Self {
        Self { size, number: None }
    }

    /// Page `number` (1-based) of `size` rows: `limit (number-1)*size,size`.
    #[must_use]
    pub const fn numbered(size: u64, number: u64) -> Self {
        Self {
            size,
            number: Some(number),
        }
    }

    fn compile(self) -> Result<String> {
        if self.size == 0 {
            return Err(Error::Validation("page size must be positive".to_string()));
        }
        match self.number {
            None => Ok(format!(" limit {}", self.size)),
            Some(0) => Err(Error::Validation(
                "page number is 1-based; got 0".to_string(),
            )),
            Some(number) => Ok(format!(" limit {},{}", (number - 1) * self.size, self.size)),
        }
    }
}

/// Builds `<action> from <table><predicate>[ order by …][ limit …]`.
///
/// # Errors
///
/// Returns [`Error::Validation`] when the filter, ordering column, or
/// pagination fails validation.
pub fn build_query(
    action: &str,
    table: &TableName,
    filter: &Filter,
    order_by: Option<&OrderBy>,
    page: Option<Page>,
) -> Result<CompiledStatement> {
    let predicate = filter.compile()?;
    let mut sql = format!("{action} from {table}{}", predicate.clause);
    if let Some(order) = order_by {
        sql.push_str(&order.compile()?);
    }
    if let Some(page) = page {
        sql.push_str(&page.compile()?);
    }
    Ok(CompiledStatement {
        sql,
        args: predicate.args,
    })
}

/// The `set`-clause statement family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    /// `update <table> set …`
    Update,
    /// `insert into <table> set …`
    Insert,
    /// `replace into <table> set …` (upsert on the table's own keys).
    Replace,
}

impl WriteAction {
    /// The SQL action prefix.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Insert => "insert into",
            Self::Replace => "replace into",
        }
    }
}

/// Builds `<action> <table> set <assignments><predicate>` for a single row.
///
/// # Errors
///
/// Returns [`Error::Validation`] when the assignment map is empty or a field
/// name fails identifier validation.
pub fn build_write(
    action: WriteAction,
    table: &TableName,
    assignments: &Record,
    filter: &Filter,
) -> Result<CompiledStatement> {
    let set_clause = compile_set_clause(assignments)?;
    let predicate = filter.compile()?;
    let mut args: Vec<SqlValue> = assignments.values().cloned().collect();
    args.extend(predicate.args);
    Ok(CompiledStatement {
        sql: format!(
            "{} {table} set {set_clause}{}",
            action.as_sql(),
            predicate.clause
        ),
        args,
    })
}

/// Builds the statement once from the first row's key set and one argument
/// tuple per row; the shared predicate's arguments are appended to every
/// tuple.
///
/// # Errors
///
/// Returns [`Error::Validation`] when `rows` is empty, when any row's ordered
/// key set differs from the first row's, or when a field name fails
/// identifier validation.
pub fn build_write_batch(
    action: WriteAction,
    table: &TableName,
    rows: &[Record],
    filter: &Filter,
) -> Result<CompiledBatch> {
    let Some(first) = rows.first() else {
        return Err(Error::Validation("bulk write requires at least one row".to_string()));
    };
    let columns: Vec<&str> = first.columns().collect();
    let set_clause = compile_set_clause(first)?;
    let predicate = filter.compile()?;
    let mut tuples = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let row_columns: Vec<&str> = row.columns().collect();
        if row_columns != columns {
            return Err(Error::Validation(format!(
                "bulk write row {index} key set {row_columns:?} differs from first row {columns:?}"
            )));
        }
        let mut tuple: Vec<SqlValue> = row.values().cloned().collect();
        tuple.extend(predicate.args.iter().cloned());
        tuples.push(tuple);
    }
    Ok(CompiledBatch {
        sql: format!(
            "{} {table} set {set_clause}{}",
            action.as_sql(),
            predicate.clause
        ),
        rows: tuples,
    })
}

/// Builds `<action> <table> [(columns)] values (?,…)` with one argument tuple
/// per positional row. Used by recovery, where rows must carry a primary or
/// unique key so `replace into` resolves conflicts deterministically.
///
/// # Errors
///
/// Returns [`Error::Validation`] when the action is [`WriteAction::Update`]
/// (no `values` form exists), `rows` is empty, row widths disagree (or do not
/// match the column list), or a column name fails identifier validation.
pub fn build_values_batch(
    action: WriteAction,
    table: &TableName,
    columns: Option<&[&str]>,
    rows: &[Vec<SqlValue>],
) -> Result<CompiledBatch> {
    if action == WriteAction::Update {
        return Err(Error::Validation(
            "update has no values(...) form".to_string(),
        ));
    }
    let Some(first) = rows.first() else {
        return Err(Error::Validation("bulk write requires at least one row".to_string()));
    };
    let width = first.len();
    if width == 0 {
        return Err(Error::Validation("bulk write rows must not be empty".to_string()));
    }
    let column_clause = match columns {
        Some(names) => {
            if names.len() != width {
                return Err(Error::Validation(format!(
                    "column list has {} names but rows have {width} values",
                    names.len()
                )));
            }
            let mut quoted = Vec::with_capacity(names.len());
            for name in names {
                quoted.push(quote_identifier(name)?);
            }
            format!(" ({})", quoted.join(","))
        },
        None => String::new(),
    };
    for (index, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(Error::Validation(format!(
                "row {index} has {} values, expected {width}",
                row.len()
            )));
        }
    }
    let placeholders = vec!["?"; width].join(",");
    Ok(CompiledBatch {
        sql: format!(
            "{} {table}{column_clause} values ({placeholders})",
            action.as_sql()
        ),
        rows: rows.to_vec(),
    })
}

fn compile_set_clause(assignments: &Record) -> Result<String> {
    if assignments.is_empty() {
        return Err(Error::Validation(
            "write requires a non-empty assignment map".to_string(),
        ));
    }
    let mut parts = Vec::with_capacity(assignments.len());
    for (name, _) in assignments.iter() {
        parts.push(format!("{}=?", quote_identifier(name)?));
    }
    Ok(parts.join(","))
}

/// Substitutes `?` placeholders with argument literals for diagnostics.
///
/// Quote-aware: placeholders inside string or identifier quoting are left
/// untouched. Surplus placeholders (more `?` than arguments) also stay as-is;
/// this renderer exists to reproduce failures, not to execute.
#[must_use]
pub fn render_statement(sql: &str, args: &[SqlValue]) -> String {
    let mut out = String::with_capacity(sql.len() + args.len() * 8);
    let mut remaining = args.iter();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in sql.chars() {
        match quote {
            Some(q) => {
                out.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' && q != '`' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            },
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(c);
                },
                '?' => match remaining.next() {
                    Some(arg) => out.push_str(&arg.sql_literal()),
                    None => out.push('?'),
                },
                _ => out.push(c),
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableRegistry;

    fn table(name: &str) -> TableName {
        TableRegistry::new([name]).unwrap().resolve(name).unwrap()
    }

    #[test]
    fn test_plain_select() {
        let stmt = build_query("select *", &table("s_match"), &Filter::new(), None, None).unwrap();
        assert_eq!(stmt.sql, "select * from `s_match`");
        assert!(stmt.args.is_empty());
    }

    #[test]
    fn test_select_with_predicate_order_and_limit() {
        let filter = Filter::new().with("status", 2);
        let stmt = build_query(
            "select draw_id",
            &table("game_draw"),
            &filter,
            Some(&OrderBy::desc("draw_id")),
            Some(Page::of(5)),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "select draw_id from `game_draw` where `status`=? order by `draw_id` DESC limit 5"
        );
        assert_eq!(stmt.args, vec![SqlValue::Int(2)]);
    }

    #[test]
    fn test_page_three_of_ten_starts_at_offset_twenty() {
        let stmt = build_query(
            "select *",
            &table("s_match"),
            &Filter::new(),
            None,
            Some(Page::numbered(10, 3)),
        )
        .unwrap();
        assert_eq!(stmt.sql, "select * from `s_match` limit 20,10");
    }

    #[test]
    fn test_page_one_starts_at_offset_zero() {
        let stmt = build_query(
            "select *",
            &table("s_match"),
            &Filter::new(),
            None,
            Some(Page::numbered(10, 1)),
        )
        .unwrap();
        assert_eq!(stmt.sql, "select * from `s_match` limit 0,10");
    }

    #[test]
    fn test_invalid_pagination_is_rejected() {
        let zero_size = build_query(
            "select *",
            &table("s_match"),
            &Filter::new(),
            None,
            Some(Page::of(0)),
        );
        assert!(matches!(zero_size, Err(Error::Validation(_))));

        let zero_page = build_query(
            "select *",
            &table("s_match"),
            &Filter::new(),
            None,
            Some(Page::numbered(10, 0)),
        );
        assert!(matches!(zero_page, Err(Error::Validation(_))));
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!(Direction::parse("asc").unwrap(), Direction::Asc);
        assert_eq!(Direction::parse("DESC").unwrap(), Direction::Desc);
        assert!(Direction::parse("sideways").is_err());
    }

    #[test]
    fn test_update_single_row() {
        let assignments = Record::new().with("status", 3).with("note", "checked");
        let filter = Filter::new().with("draw_id", 77);
        let stmt = build_write(WriteAction::Update, &table("game_draw"), &assignments, &filter)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "update `game_draw` set `status`=?,`note`=? where `draw_id`=?"
        );
        assert_eq!(
            stmt.args,
            vec![
                SqlValue::Int(3),
                SqlValue::Text("checked".into()),
                SqlValue::Int(77)
            ]
        );
    }

    #[test]
    fn test_empty_assignments_rejected() {
        let result = build_write(
            WriteAction::Update,
            &table("game_draw"),
            &Record::new(),
            &Filter::new(),
        );
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_batch_statement_built_once_with_predicate_args_per_tuple() {
        let rows = vec![
            Record::new().with("id", 1).with("v", "a"),
            Record::new().with("id", 2).with("v", "b"),
        ];
        let filter = Filter::new().with("batch", 9);
        let batch =
            build_write_batch(WriteAction::Update, &table("s_match"), &rows, &filter).unwrap();
        assert_eq!(batch.sql, "update `s_match` set `id`=?,`v`=? where `batch`=?");
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(
            batch.rows[1],
            vec![SqlValue::Int(2), SqlValue::Text("b".into()), SqlValue::Int(9)]
        );
    }

    #[test]
    fn test_batch_key_mismatch_rejected() {
        let rows = vec![
            Record::new().with("id", 1).with("v", "a"),
            Record::new().with("v", "b").with("id", 2),
        ];
        let result =
            build_write_batch(WriteAction::Replace, &table("s_match"), &rows, &Filter::new());
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_values_batch_with_columns() {
        let rows = vec![
            vec![SqlValue::Int(1), SqlValue::Text("x".into())],
            vec![SqlValue::Int(2), SqlValue::Text("y".into())],
        ];
        let batch = build_values_batch(
            WriteAction::Replace,
            &table("s_team"),
            Some(&["team_id", "name"]),
            &rows,
        )
        .unwrap();
        assert_eq!(
            batch.sql,
            "replace into `s_team` (`team_id`,`name`) values (?,?)"
        );
        assert_eq!(batch.rows.len(), 2);
    }

    #[test]
    fn test_values_batch_width_mismatch_rejected() {
        let rows = vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2), SqlValue::Int(3)]];
        let result = build_values_batch(WriteAction::Replace, &table("s_team"), None, &rows);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_render_inlines_literals_outside_quotes() {
        let rendered = render_statement(
            "select * from `t` where `a`=? and `b` like CONCAT('?',?)",
            &[SqlValue::Int(5), SqlValue::Text("x".into())],
        );
        assert_eq!(
            rendered,
            "select * from `t` where `a`=5 and `b` like CONCAT('?','x')"
        );
    }
}
