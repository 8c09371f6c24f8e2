//! SQL value and row types.
//!
//! This module provides the boundary types shared by the whole crate:
//! [`SqlValue`], the typed argument/result scalar, and [`Record`], an ordered
//! field→value row. Both serialize to JSON so the harness can diff database
//! state against API responses.
//!
//! Temporal and decimal column values cross the driver boundary as
//! [`SqlValue::Text`]: the wire driver formats them once, on read, and nothing
//! downstream needs to understand backend-specific date or decimal types.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A single SQL scalar: statement argument or result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Signed integer.
    Int(i64),
    /// Unsigned integer (MySQL `BIGINT UNSIGNED` range).
    UInt(u64),
    /// Floating-point number.
    Double(f64),
    /// Text, including temporal and decimal values formatted by the driver.
    Text(String),
    /// Raw binary payload.
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Returns `true` for [`SqlValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the text content, if this value is textual.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a signed integer when losslessly possible.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::UInt(u) => i64::try_from(*u).ok(),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Returns the value as an unsigned integer when losslessly possible.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(u) => Some(*u),
            Self::Int(i) => u64::try_from(*i).ok(),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Renders the value as a SQL literal for script backups and statement
    /// diagnostics.
    ///
    /// Each variant formats itself directly: `NULL` stays `NULL`, numerics
    /// stay bare, text is quoted with backslash escaping, binary renders as a
    /// hex literal. Non-finite floats have no SQL literal form and degrade to
    /// `NULL`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixturedb::SqlValue;
    ///
    /// assert_eq!(SqlValue::Null.sql_literal(), "NULL");
    /// assert_eq!(SqlValue::Int(-3).sql_literal(), "-3");
    /// assert_eq!(SqlValue::Text("o'brien".into()).sql_literal(), r"'o\'brien'");
    /// ```
    #[must_use]
    pub fn sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Int(i) => i.to_string(),
            Self::UInt(u) => u.to_string(),
            Self::Double(f) => {
                if f.is_finite() {
                    f.to_string()
                } else {
                    "NULL".to_string()
                }
            },
            Self::Text(s) => quote_text(s),
            Self::Bytes(b) => {
                if b.is_empty() {
                    "''".to_string()
                } else {
                    let mut out = String::with_capacity(2 + b.len() * 2);
                    out.push_str("0x");
                    for byte in b {
                        out.push_str(&format!("{byte:02X}"));
                    }
                    out
                }
            },
        }
    }
}

/// Quotes a string as a MySQL literal, escaping the characters that can
/// terminate or corrupt the literal.
fn quote_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::UInt(u) => serializer.serialize_u64(*u),
            Self::Double(f) => serializer.serialize_f64(*f),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Bytes(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
        }
    }
}

impl From<i8> for SqlValue {
    fn from(v: i8) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u8> for SqlValue {
    fn from(v: u8) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<u16> for SqlValue {
    fn from(v: u16) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        Self::Double(f64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<chrono::NaiveDateTime> for SqlValue {
    fn from(v: chrono::NaiveDateTime) -> Self {
        Self::Text(v.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

impl From<chrono::NaiveDate> for SqlValue {
    fn from(v: chrono::NaiveDate) -> Self {
        Self::Text(v.format("%Y-%m-%d").to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// An ordered field→value row.
///
/// `Record` preserves SELECT column order, which also makes it the natural
/// shape for `set` assignment maps and for bulk recovery rows where column
/// ordering is significant. Lookup by name is linear — rows in this domain
/// have tens of columns, not thousands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, SqlValue)>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Appends a field, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(name, value);
        self
    }

    /// Appends a field.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Returns the first value stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Iterates field names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Iterates values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.fields.iter().map(|(_, value)| value)
    }

    /// Consumes the record, yielding its values in insertion order.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.fields.into_iter().map(|(_, value)| value).collect()
    }

    /// Iterates `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` when the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<N: Into<String>, V: Into<SqlValue>> FromIterator<(N, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
