//! Composite key encoding.
//!
//! A key is the list of key-column values in sorted column order. Values
//! are escaped (`%` as `%%`, `#` as `%r`), an unset value is written `%0`,
//! and fields are joined with `#`. A single set value without separator
//! characters therefore encodes as itself, and [`decode_key`] inverts
//! [`encode_key`] for any non-empty list.

use std::collections::HashMap;

use common_error::{FederaError, FederaResult};

const SEPARATOR: char = '#';
const ESCAPE: char = '%';
const UNSET: &str = "%0";

/// Encode key values in the given order.
pub fn encode_key<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut key = String::new();
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            key.push(SEPARATOR);
        }
        let Some(value) = value else {
            key.push_str(UNSET);
            continue;
        };
        for c in value.chars() {
            match c {
                ESCAPE => key.push_str("%%"),
                SEPARATOR => key.push_str("%r"),
                c => key.push(c),
            }
        }
    }
    key
}

/// Decode a key produced by [`encode_key`].
pub fn decode_key(key: &str) -> FederaResult<Vec<Option<String>>> {
    let mut values = Vec::new();
    for field in key.split(SEPARATOR) {
        if field == UNSET {
            values.push(None);
            continue;
        }
        let mut value = String::with_capacity(field.len());
        let mut chars = field.chars();
        while let Some(c) = chars.next() {
            if c != ESCAPE {
                value.push(c);
                continue;
            }
            match chars.next() {
                Some(ESCAPE) => value.push(ESCAPE),
                Some('r') => value.push(SEPARATOR),
                other => {
                    return Err(FederaError::value_error(format!(
                        "malformed key \"{key}\": bad escape {other:?}"
                    )));
                }
            }
        }
        values.push(Some(value));
    }
    Ok(values)
}

/// The key columns of a datasource, kept in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpec {
    columns: Vec<String>,
}

impl KeySpec {
    /// Create a key spec. Columns are sorted and deduplicated.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        columns.sort_unstable();
        columns.dedup();
        Self { columns }
    }

    /// Key columns in encoding order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether no key columns are configured.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Build a key from a column lookup.
    pub fn key_of<'a, F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        encode_key(self.columns.iter().map(|c| lookup(c)))
    }

    /// Build a key from a value map.
    pub fn key_from_map(&self, values: &HashMap<String, String>) -> String {
        self.key_of(|c| values.get(c).map(String::as_str))
    }

    /// Decode a key into `(column, value)` pairs.
    pub fn decode(&self, key: &str) -> FederaResult<Vec<(String, Option<String>)>> {
        let values = decode_key(key)?;
        if values.len() != self.columns.len() {
            return Err(FederaError::value_error(format!(
                "key \"{key}\" has {} fields, expected {}",
                values.len(),
                self.columns.len()
            )));
        }
        Ok(self.columns.iter().cloned().zip(values).collect())
    }
}
