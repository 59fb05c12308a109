//! Structured search filters with RFC 2254 text rendering.

use std::collections::BTreeMap;
use std::fmt;

use federa_core::Pattern;

/// A directory search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// Attribute value equals a literal. `*` has no special meaning.
    Equals { attr: String, value: String },
    /// Attribute value matches a pattern with leading/trailing `*`.
    Matches { attr: String, pattern: String },
    /// Attribute is present.
    Present(String),
}

impl Filter {
    pub fn equals(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attr: attr.into(),
            value: value.into(),
        }
    }

    pub fn matches(attr: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Matches {
            attr: attr.into(),
            pattern: pattern.into(),
        }
    }

    pub fn present(attr: impl Into<String>) -> Self {
        Filter::Present(attr.into())
    }

    /// `(objectClass=<class>)`.
    pub fn object_class(class: impl Into<String>) -> Self {
        Filter::equals("objectClass", class)
    }

    /// Conjunction, collapsing single-element lists.
    pub fn and(mut filters: Vec<Filter>) -> Self {
        if filters.len() == 1 {
            filters.remove(0)
        } else {
            Filter::And(filters)
        }
    }

    /// Evaluate against an entry's attributes.
    ///
    /// Attribute names compare case-insensitively. A multi-valued attribute
    /// matches if any value does.
    pub fn evaluate(&self, attributes: &BTreeMap<String, Vec<String>>) -> bool {
        let values = |attr: &str| {
            attributes
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(attr))
                .map(|(_, values)| values.as_slice())
                .unwrap_or_default()
        };
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.evaluate(attributes)),
            Filter::Or(filters) => filters.iter().any(|f| f.evaluate(attributes)),
            Filter::Not(filter) => !filter.evaluate(attributes),
            Filter::Equals { attr, value } => {
                let value = value.to_lowercase();
                values(attr).iter().any(|v| v.to_lowercase() == value)
            }
            Filter::Matches { attr, pattern } => {
                let pattern = Pattern::parse(pattern);
                values(attr).iter().any(|v| pattern.matches(Some(v)))
            }
            Filter::Present(attr) => !values(attr).is_empty(),
        }
    }
}

/// Escape a filter value. `*` is kept only when `keep_star` is set.
pub fn escape_value(value: &str, keep_star: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\5c"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\0' => out.push_str("\\00"),
            '*' if !keep_star => out.push_str("\\2a"),
            _ => out.push(c),
        }
    }
    out
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(filters) => {
                f.write_str("(&")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Filter::Or(filters) => {
                f.write_str("(|")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Filter::Not(filter) => write!(f, "(!{filter})"),
            Filter::Equals { attr, value } => {
                write!(f, "({}={})", escape_value(attr, false), escape_value(value, false))
            }
            Filter::Matches { attr, pattern } => {
                write!(f, "({}={})", escape_value(attr, false), escape_value(pattern, true))
            }
            Filter::Present(attr) => write!(f, "({}=*)", escape_value(attr, false)),
        }
    }
}
