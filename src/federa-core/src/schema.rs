//! Schema definition for Federa datasources.
//!
//! A schema is an ordered, duplicate-free list of column names. Combinators
//! that require matching schemas compare them as sets.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use common_error::{FederaError, FederaResult};

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z_0-9]*$").expect("valid identifier regex")
});

/// Whether `name` is a legal column identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// Ordered set of column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema from column names, silently dropping repeats.
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Self::new();
        for column in columns {
            schema.add(column);
        }
        schema
    }

    /// Build a schema from column names, rejecting repeats and invalid names.
    pub fn try_from_columns<I, S>(columns: I) -> FederaResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Self::new();
        for column in columns {
            let column = column.into();
            if !is_valid_identifier(&column) {
                return Err(FederaError::configuration(format!(
                    "column \"{column}\" is not a valid identifier"
                )));
            }
            if schema.contains(&column) {
                return Err(FederaError::configuration(format!(
                    "column \"{column}\" is declared twice"
                )));
            }
            schema.columns.push(column);
        }
        Ok(schema)
    }

    /// Append a column. Returns `false` if it was already present.
    pub fn add(&mut self, column: impl Into<String>) -> bool {
        let column = column.into();
        if self.contains(&column) {
            return false;
        }
        self.columns.push(column);
        true
    }

    /// Remove a column. Returns `false` if it was not present.
    pub fn remove(&mut self, column: &str) -> bool {
        match self.position(column) {
            Some(idx) => {
                self.columns.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Check whether a column is part of this schema.
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Position of a column.
    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Column names in declaration order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Iterate over column names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    /// Check if the schema is empty.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Set equality, ignoring order.
    pub fn set_eq(&self, other: &Schema) -> bool {
        self.len() == other.len() && self.iter().all(|c| other.contains(c))
    }

    /// Columns of `self` that `other` lacks, in `self`'s order.
    pub fn missing_from(&self, other: &Schema) -> Vec<String> {
        self.iter()
            .filter(|c| !other.contains(c))
            .map(str::to_string)
            .collect()
    }

    /// `self` followed by the columns of `other` not yet present.
    pub fn union(&self, other: &Schema) -> Schema {
        let mut merged = self.clone();
        for column in other.iter() {
            merged.add(column);
        }
        merged
    }

    /// Copy of this schema with every column prefixed.
    pub fn with_prefix(&self, prefix: &str) -> Schema {
        Schema {
            columns: self.iter().map(|c| format!("{prefix}{c}")).collect(),
        }
    }

    /// Column names as a set.
    pub fn to_set(&self) -> HashSet<&str> {
        self.iter().collect()
    }

    /// Require two schemas to be set-equal, naming every column missing on either side.
    pub fn ensure_set_eq(&self, other: &Schema, name1: &str, name2: &str) -> FederaResult<()> {
        if self.set_eq(other) {
            return Ok(());
        }
        let only1 = self.missing_from(other);
        let only2 = other.missing_from(self);
        let mut msg = format!("schemas of \"{name1}\" and \"{name2}\" differ");
        if !only1.is_empty() {
            msg.push_str(&format!("; missing in \"{name2}\": {}", only1.join(", ")));
        }
        if !only2.is_empty() {
            msg.push_str(&format!("; missing in \"{name1}\": {}", only2.join(", ")));
        }
        Err(FederaError::configuration(msg))
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.columns.join(", "))
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_ordered_and_unique() {
        let schema = Schema::from_columns(["b", "a", "b", "c"]);
        assert_eq!(schema.columns(), &["b", "a", "c"]);
        assert_eq!(schema.len(), 3);
    }

    #[test]
    fn test_schema_serde() {
        let schema = Schema::from_columns(["name", "room"]);
        let json = serde_json::to_string(&schema).unwrap();
        assert_eq!(json, r#"{"columns":["name","room"]}"#);
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_try_from_columns_rejects_bad_names() {
        assert!(Schema::try_from_columns(["ok", "1bad"]).is_err());
        assert!(Schema::try_from_columns(["dup", "dup"]).is_err());
        assert!(Schema::try_from_columns(["_x", "y2"]).is_ok());
    }

    #[test]
    fn test_set_eq_ignores_order() {
        let a = Schema::from_columns(["x", "y"]);
        let b = Schema::from_columns(["y", "x"]);
        let c = Schema::from_columns(["x"]);
        assert!(a.set_eq(&b));
        assert!(!a.set_eq(&c));
        assert_ne!(a, b);
    }

    #[test]
    fn test_ensure_set_eq_names_both_sides() {
        let a = Schema::from_columns(["id", "name", "mail"]);
        let b = Schema::from_columns(["id", "phone"]);
        let msg = a.ensure_set_eq(&b, "A", "B").unwrap_err().to_string();
        assert!(msg.contains("name"));
        assert!(msg.contains("mail"));
        assert!(msg.contains("phone"));
    }

    #[test]
    fn test_union_and_prefix() {
        let a = Schema::from_columns(["id", "name"]);
        let b = Schema::from_columns(["name", "room"]);
        assert_eq!(a.union(&b).columns(), &["id", "name", "room"]);
        assert_eq!(b.with_prefix("X__").columns(), &["X__name", "X__room"]);
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("Vorname"));
        assert!(is_valid_identifier("_a1"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("a-b"));
        assert!(!is_valid_identifier("9a"));
    }
}
