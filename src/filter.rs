//! Declarative filter compilation.
//!
//! A [`Filter`] is an ordered mapping from `field[__operator]` keys to values
//! (scalar, list, or sub-query). [`Filter::compile`] turns it into a
//! [`Predicate`]: a `where` clause fragment with `?` placeholders plus the
//! ordered argument list. No value ever reaches statement text — only
//! validated identifiers do.
//!
//! The suffix convention lets callers express range queries, pattern matches,
//! negation, set membership and nested sub-selects as plain key/value pairs:
//!
//! ```
//! use fixturedb::Filter;
//!
//! let filter = Filter::new()
//!     .with("status", 2)
//!     .with("name__startswith", "cup_")
//!     .with("draw_id__between", vec![100, 200])
//!     .with("deleted_at", fixturedb::SqlValue::Null);
//! let predicate = filter.compile().unwrap();
//! assert_eq!(
//!     predicate.clause,
//!     " where `status`=? and `name` like CONCAT(?,'%') \
//!      and `draw_id` between ? and ? and `deleted_at` is NULL"
//! );
//! ```

use crate::query::build_query;
use crate::table::{TableRegistry, quote_identifier};
use crate::value::SqlValue;
use crate::{Error, Result};

/// Filter operator, parsed from the key's `__suffix`.
///
/// A key without a suffix means [`Operator::Eq`]. Suffix parsing is the only
/// stringly step; from here on dispatch is an exhaustive match, so an
/// unsupported operator can only fail in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Equality; `is NULL` for null values, `in (…)` for lists.
    Eq,
    /// Negation: `!=`, `is not NULL`, or `not in (…)`. Over an empty list it
    /// matches every row and emits no clause.
    Not,
    /// Substring match: `like CONCAT('%',?,'%')`.
    Contains,
    /// Prefix match: `like CONCAT(?,'%')`.
    StartsWith,
    /// Suffix match: `like CONCAT('%',?)`.
    EndsWith,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `between ? and ?`; requires a two-element list value.
    Between,
    /// `is NULL` regardless of the value.
    IsNull,
}

impl Operator {
    /// Parses an operator suffix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown suffix.
    pub fn parse(suffix: &str) -> Result<Self> {
        match suffix {
            "eq" => Ok(Self::Eq),
            "not" => Ok(Self::Not),
            "contains" => Ok(Self::Contains),
            "startswith" => Ok(Self::StartsWith),
            "endswith" => Ok(Self::EndsWith),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "between" => Ok(Self::Between),
            "isnull" => Ok(Self::IsNull),
            other => Err(Error::Validation(format!(
                "unsupported operator `{other}`"
            ))),
        }
    }
}

/// A compiled, embeddable sub-select.
///
/// Produced once from `(column, table, filter)` and then read-only; usable as
/// the right-hand side of `in` / `not in` inside another [`Filter`]. The
/// sub-query text is embedded literally and its argument list is spliced into
/// the outer predicate's arguments at the embedding position.
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuery {
    sql: String,
    args: Vec<SqlValue>,
}

impl SubQuery {
    /// Compiles `select `column` from `table`<predicate>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the table is not registered, the
    /// column is not a valid identifier, or the filter fails to compile.
    pub fn new(
        registry: &TableRegistry,
        table: &str,
        column: &str,
        filter: &Filter,
    ) -> Result<Self> {
        let table = registry.resolve(table)?;
        let column = quote_identifier(column)?;
        let statement = build_query(&format!("select {column}"), &table, filter, None, None)?;
        Ok(Self {
            sql: statement.sql,
            args: statement.args,
        })
    }

    /// The compiled sub-select text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The sub-select's bound arguments.
    #[must_use]
    pub fn args(&self) -> &[SqlValue] {
        &self.args
    }
}

/// The value side of a filter entry.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// A single scalar (including `NULL`).
    Scalar(SqlValue),
    /// A list, used with `in` / `not in` / `between`.
    List(Vec<SqlValue>),
    /// An embedded sub-select.
    Sub(SubQuery),
}

impl From<SqlValue> for FilterValue {
    fn from(value: SqlValue) -> Self {
        Self::Scalar(value)
    }
}

impl<T: Into<SqlValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<SubQuery> for FilterValue {
    fn from(sub: SubQuery) -> Self {
        Self::Sub(sub)
    }
}

// Scalar conversions route through `SqlValue` one type at a time; a blanket
// `impl<T: Into<SqlValue>> From<T>` would collide with the list conversion
// above under coherence.
macro_rules! scalar_filter_value {
    ($($ty:ty),* $(,)?) => {
        $(impl From<$ty> for FilterValue {
            fn from(value: $ty) -> Self {
                Self::Scalar(value.into())
            }
        })*
    };
}

scalar_filter_value!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, bool, &str, String);

/// A compiled predicate: clause text plus its ordered arguments.
///
/// `clause` carries its own leading ` where ` when non-empty, so it appends
/// directly onto an action/table prefix. Compiled fresh for every statement,
/// never cached, never mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    /// ` where …` fragment, or empty for match-all.
    pub clause: String,
    /// Arguments in placeholder order.
    pub args: Vec<SqlValue>,
}

/// Ordered mapping of `field[__operator]` keys to filter values.
///
/// Keys are case-sensitive. Entries compile in insertion order (clause order
/// only — semantics are unaffected since clauses are `and`-joined). An empty
/// filter compiles to no predicate and matches all rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    entries: Vec<(String, FilterValue)>,
}

impl Filter {
    /// Creates an empty filter (matches all rows).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds an entry, builder style. The key may carry an `__operator`
    /// suffix.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.push(key, value);
        self
    }

    /// Adds an entry.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<FilterValue>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the filter has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compiles the filter into a [`Predicate`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown operator suffix, an
    /// operator applied to an incompatible value shape, a `between` value
    /// without exactly two elements, or a field name failing identifier
    /// validation.
    pub fn compile(&self) -> Result<Predicate> {
        if self.entries.is_empty() {
            return Ok(Predicate::default());
        }
        let mut clauses = Vec::with_capacity(self.entries.len());
        let mut args = Vec::new();
        for (key, value) in &self.entries {
            let (field, operator) = match key.split_once("__") {
                Some((field, suffix)) => {
                    let operator = Operator::parse(suffix).map_err(|_| {
                        Error::Validation(format!(
                            "unsupported operator `{suffix}` for field `{field}`"
                        ))
                    })?;
                    (field, operator)
                },
                None => (key.as_str(), Operator::Eq),
            };
            let fragment = compile_entry(field, operator, value, &mut args)?;
            if !fragment.is_empty() {
                clauses.push(fragment);
            }
        }
        if clauses.is_empty() {
            return Ok(Predicate::default());
        }
        Ok(Predicate {
            clause: format!(" where {}", clauses.join(" and ")),
            args,
        })
    }
}

impl<N: Into<String>, V: Into<FilterValue>> FromIterator<(N, V)> for Filter {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// Compiles one entry, pushing its arguments onto `args`.
///
/// Returns the clause fragment, or an empty string for entries that impose no
/// constraint (`not in` over an empty list).
fn compile_entry(
    field: &str,
    operator: Operator,
    value: &FilterValue,
    args: &mut Vec<SqlValue>,
) -> Result<String> {
    let column = quote_identifier(field)?;
    match value {
        FilterValue::List(items) => compile_list(field, &column, operator, items, args),
        FilterValue::Sub(sub) => match operator {
            Operator::Eq => {
                args.extend_from_slice(sub.args());
                Ok(format!("{column} in ({})", sub.sql()))
            },
            Operator::Not => {
                args.extend_from_slice(sub.args());
                Ok(format!("{column} not in ({})", sub.sql()))
            },
            _ => Err(Error::Validation(format!(
                "operator on field `{field}` cannot take a sub-query"
            ))),
        },
        FilterValue::Scalar(SqlValue::Null) if operator == Operator::Eq => {
            Ok(format!("{column} is NULL"))
        },
        FilterValue::Scalar(SqlValue::Null) if operator == Operator::Not => {
            Ok(format!("{column} is not NULL"))
        },
        FilterValue::Scalar(scalar) => compile_scalar(field, &column, operator, scalar, args),
    }
}

fn compile_list(
    field: &str,
    column: &str,
    operator: Operator,
    items: &[SqlValue],
    args: &mut Vec<SqlValue>,
) -> Result<String> {
    match operator {
        Operator::Eq => {
            if items.is_empty() {
                // Contradiction clause: `in ()` is not valid SQL, but an
                // empty membership set must match nothing.
                return Ok(format!("{column}!={column}"));
            }
            args.extend_from_slice(items);
            Ok(format!("{column} in ({})", placeholders(items.len())))
        },
        Operator::Not => {
            if items.is_empty() {
                // `not in` over the empty set holds for every row.
                return Ok(String::new());
            }
            args.extend_from_slice(items);
            Ok(format!("{column} not in ({})", placeholders(items.len())))
        },
        Operator::Between => {
            if items.len() != 2 {
                return Err(Error::Validation(format!(
                    "between on field `{field}` requires exactly two values, got {}",
                    items.len()
                )));
            }
            args.extend_from_slice(items);
            Ok(format!("{column} between ? and ?"))
        },
        _ => Err(Error::Validation(format!(
            "operator on field `{field}` cannot take a list value"
        ))),
    }
}

fn compile_scalar(
    field: &str,
    column: &str,
    operator: Operator,
    scalar: &SqlValue,
    args: &mut Vec<SqlValue>,
) -> Result<String> {
    let fragment = match operator {
        Operator::Eq => format!("{column}=?"),
        Operator::Not => format!("{column}!=?"),
        Operator::Lt => format!("{column}<?"),
        Operator::Lte => format!("{column}<=?"),
        Operator::Gt => format!("{column}>?"),
        Operator::Gte => format!("{column}>=?"),
        // LIKE patterns wrap the raw value server-side; the argument itself
        // is never pre-formatted.
        Operator::Contains => format!("{column} like CONCAT('%',?,'%')"),
        Operator::StartsWith => format!("{column} like CONCAT(?,'%')"),
        Operator::EndsWith => format!("{column} like CONCAT('%',?)"),
        Operator::IsNull => return Ok(format!("{column} is NULL")),
        Operator::Between => {
            return Err(Error::Validation(format!(
                "between on field `{field}` requires a two-element list value"
            )));
        },
    };
    args.push(scalar.clone());
    Ok(fragment)
}

fn placeholders(count: usize) -> String {
    let mut out = String::with_capacity(count * 2);
    for index in 0..count {
        if index > 0 {
            out.push(',');
        }
        out.push('?');
    }
    out
}
