//! Closed table registry and identifier hygiene.
//!
//! Every value in a compiled statement is bound as a parameter, but table and
//! column names are necessarily interpolated into the SQL text. Two guards
//! block injection through that path:
//!
//! - base table names are validated against a closed [`TableRegistry`]
//!   constructed by the caller (the harness's known-schema set), and
//! - derived shadow names (`<table>_bak`, `<table>__snapshot`, custom backup
//!   names) and column names are validated lexically against a conservative
//!   identifier charset.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").unwrap_or_else(|e| {
        // A literal pattern only fails to compile if the source itself is
        // corrupted, which is unrecoverable.
        panic!("identifier regex failed to compile: {e}")
    })
});

/// Validates a SQL identifier (column, partition, or derived table name).
///
/// # Errors
///
/// Returns [`Error::Validation`] when the name is empty or contains
/// characters outside `[A-Za-z0-9_$]` (or starts with a digit).
pub fn check_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid identifier `{name}`")))
    }
}

/// Backtick-quotes a validated identifier.
///
/// # Errors
///
/// Returns [`Error::Validation`] when the name fails [`check_identifier`].
pub fn quote_identifier(name: &str) -> Result<String> {
    check_identifier(name)?;
    Ok(format!("`{name}`"))
}

/// A validated table name.
///
/// Obtained from [`TableRegistry::resolve`] (base tables) or
/// [`TableRegistry::resolve_shadow`] (backup/snapshot tables); displaying it
/// yields the backtick-quoted form ready for statement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    /// The unquoted name, for parameter binding against
    /// `information_schema` lookups.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.0
    }

    /// Derives a shadow name by appending `suffix`.
    ///
    /// The suffixes in use (`_bak`, `__snapshot`) keep the result inside the
    /// identifier charset, so the derived name needs no re-validation.
    #[must_use]
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self(format!("{}{suffix}", self.0))
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`", self.0)
    }
}

/// The closed set of table names a [`crate::Database`] may touch.
///
/// Mirrors the harness's known-schema enumeration: anything outside the set
/// is rejected before it can reach statement text. Shadow tables derived from
/// registered bases pass a lexical check instead, since backup names are
/// generated (or explicitly supplied) rather than part of the schema.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    names: BTreeSet<String>,
}

impl TableRegistry {
    /// Builds a registry from the known table names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when any name fails the identifier
    /// check.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for name in names {
            let name = name.into();
            check_identifier(&name)?;
            set.insert(name);
        }
        Ok(Self { names: set })
    }

    /// Returns `true` when `name` is a registered base table.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Resolves a base table name against the closed set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the name is not registered.
    pub fn resolve(&self, name: &str) -> Result<TableName> {
        if self.names.contains(name) {
            Ok(TableName(name.to_string()))
        } else {
            Err(Error::Validation(format!("unknown table `{name}`")))
        }
    }

    /// Resolves a shadow or backup table name.
    ///
    /// Registered names pass as-is; anything else must satisfy the lexical
    /// identifier check. This admits `<table>_bak`, `<table>__snapshot` and
    /// caller-chosen backup names without opening the door to arbitrary
    /// statement text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the name fails the identifier
    /// check.
    pub fn resolve_shadow(&self, name: &str) -> Result<TableName> {
        if self.names.contains(name) {
            return Ok(TableName(name.to_string()));
        }
        check_identifier(name)?;
        Ok(TableName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_accepts_schema_names() {
        for name in ["s_match", "batch_diff_record", "d_game_draw", "p20260807", "toto_config"] {
            assert!(check_identifier(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_identifier_rejects_injection_shapes() {
        for name in ["", "s_match`; drop table x; --", "a b", "1starts_with_digit", "semi;colon"] {
            assert!(check_identifier(name).is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn test_registry_resolves_known_only() {
        let registry = TableRegistry::new(["s_match", "s_team"]).unwrap();
        assert_eq!(registry.resolve("s_match").unwrap().to_string(), "`s_match`");
        assert!(registry.resolve("s_venue").is_err());
    }

    #[test]
    fn test_registry_shadow_names() {
        let registry = TableRegistry::new(["s_match"]).unwrap();
        let bak = registry.resolve("s_match").unwrap().with_suffix("_bak");
        assert_eq!(bak.raw(), "s_match_bak");
        assert_eq!(bak.to_string(), "`s_match_bak`");
        assert!(registry.resolve_shadow("s_match_bak").is_ok());
        assert!(registry.resolve_shadow("evil`name").is_err());
    }

    #[test]
    fn test_registry_rejects_bad_registration() {
        assert!(TableRegistry::new(["fine", "not fine"]).is_err());
    }
}
