//! Shared configuration and matching helpers.

use std::collections::HashMap;
use std::sync::Arc;

use common_error::{FederaError, FederaResult};
use federa_core::{ConfigNode, Datasource, Schema};

/// Datasources built so far, by name.
pub type SourceMap = HashMap<String, Arc<dyn Datasource>>;

/// The leaf text of `key` in a datasource description.
pub(crate) fn required(desc: &ConfigNode, key: &str, name: &str) -> FederaResult<String> {
    desc.get_string(key).ok_or_else(|| {
        FederaError::configuration(format!("datasource \"{name}\": {key} is missing"))
    })
}

/// The `NAME` of a datasource description.
pub(crate) fn name_of(desc: &ConfigNode) -> FederaResult<String> {
    desc.get_string("NAME")
        .ok_or_else(|| FederaError::configuration("datasource without NAME"))
}

/// Resolve a referenced datasource.
pub(crate) fn lookup(
    sources: &SourceMap,
    referrer: &str,
    name: &str,
) -> FederaResult<Arc<dyn Datasource>> {
    sources.get(name).cloned().ok_or_else(|| {
        FederaError::configuration(format!(
            "datasource \"{referrer}\": referenced datasource \"{name}\" is missing or defined incorrectly"
        ))
    })
}

/// All `key("a" "b")` pairs of a description.
pub(crate) fn pairs(desc: &ConfigNode, key: &str, name: &str) -> FederaResult<Vec<(String, String)>> {
    desc.query(key)
        .into_iter()
        .map(|node| match node.children() {
            [first, second] => Ok((first.to_string(), second.to_string())),
            _ => Err(FederaError::configuration(format!(
                "datasource \"{name}\": {key} needs exactly two columns"
            ))),
        })
        .collect()
}

/// Check MATCH pairs against both schemas.
pub(crate) fn check_matches(
    name: &str,
    matches: &[(String, String)],
    schema1: &Schema,
    schema2: &Schema,
) -> FederaResult<()> {
    if matches.is_empty() {
        return Err(FederaError::configuration(format!(
            "datasource \"{name}\": at least one MATCH is required"
        )));
    }
    for (column1, column2) in matches {
        for (column, schema) in [(column1, schema1), (column2, schema2)] {
            if !schema.contains(column) {
                return Err(FederaError::configuration(format!(
                    "datasource \"{name}\": MATCH column \"{column}\" is not in the schema"
                )));
            }
        }
    }
    Ok(())
}

/// Case-insensitive equality of a join value.
pub(crate) fn same_value(value: Option<&str>, expected: &str) -> bool {
    value.is_some_and(|v| v.to_lowercase() == expected.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs() {
        let desc = ConfigNode::parse("d", r#"MATCH("a" "b") MATCH("c" "d")"#).unwrap();
        assert_eq!(
            pairs(&desc, "MATCH", "x").unwrap(),
            vec![("a".to_string(), "b".to_string()), ("c".to_string(), "d".to_string())]
        );
        let bad = ConfigNode::parse("d", r#"MATCH("a")"#).unwrap();
        assert!(pairs(&bad, "MATCH", "x").is_err());
    }

    #[test]
    fn test_lookup_names_missing_source() {
        let err = lookup(&SourceMap::new(), "joined", "people").unwrap_err();
        assert!(err.to_string().contains("\"people\""));
    }

    #[test]
    fn test_same_value() {
        assert!(same_value(Some("Abc"), "aBC"));
        assert!(!same_value(None, ""));
        assert!(!same_value(Some("a*"), "ab"));
    }
}
