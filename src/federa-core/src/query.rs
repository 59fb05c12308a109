//! Query predicates.
//!
//! A [`QueryPart`] pairs a column with a search pattern. Patterns are a
//! literal with at most one leading and one trailing `*`; matching is
//! case-insensitive and an unset value never matches.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use common_error::FederaResult;

use crate::dataset::Dataset;

static SEARCH_STRING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*?[^*]+\*?$").expect("valid search string regex"));

/// Whether a user-supplied search string is a legal pattern.
///
/// Interior wildcards and wildcard-only strings are rejected.
pub fn is_valid_search_string(s: &str) -> bool {
    SEARCH_STRING_RE.is_match(s)
}

// ============================================================================
// Pattern
// ============================================================================

/// A compiled search pattern. Literals are stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// `abc`
    Exact(String),
    /// `abc*`
    Prefix(String),
    /// `*abc`
    Suffix(String),
    /// `*abc*`
    Contains(String),
    /// `*` alone: any set value.
    Any,
}

impl Pattern {
    /// Compile a pattern string.
    pub fn parse(pattern: &str) -> Self {
        let lead = pattern.starts_with('*');
        let trail = pattern.len() > 1 && pattern.ends_with('*');
        let start = usize::from(lead);
        let end = pattern.len() - usize::from(trail);
        if lead && (pattern.len() == 1 || start >= end) {
            return Pattern::Any;
        }
        let literal = pattern[start..end].to_lowercase();
        match (lead, trail) {
            (true, true) => Pattern::Contains(literal),
            (true, false) => Pattern::Suffix(literal),
            (false, true) => Pattern::Prefix(literal),
            (false, false) => Pattern::Exact(literal),
        }
    }

    /// Test a value against this pattern.
    pub fn matches(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return false;
        };
        let value = value.to_lowercase();
        match self {
            Pattern::Exact(lit) => value == *lit,
            Pattern::Prefix(lit) => value.starts_with(lit.as_str()),
            Pattern::Suffix(lit) => value.ends_with(lit.as_str()),
            Pattern::Contains(lit) => value.contains(lit.as_str()),
            Pattern::Any => true,
        }
    }

    /// Number of non-wildcard characters.
    pub fn literal_len(&self) -> usize {
        match self {
            Pattern::Exact(l) | Pattern::Prefix(l) | Pattern::Suffix(l) | Pattern::Contains(l) => {
                l.chars().count()
            }
            Pattern::Any => 0,
        }
    }

    /// Number of wildcards.
    pub fn star_count(&self) -> usize {
        match self {
            Pattern::Exact(_) => 0,
            Pattern::Prefix(_) | Pattern::Suffix(_) | Pattern::Any => 1,
            Pattern::Contains(_) => 2,
        }
    }
}

// ============================================================================
// QueryPart
// ============================================================================

/// A single predicate: `column` matches `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryPart {
    column: String,
    pattern: String,
}

impl QueryPart {
    /// Create a new query part.
    pub fn new(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    /// The column this part constrains.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// The raw pattern string.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The compiled pattern.
    pub fn compiled(&self) -> Pattern {
        Pattern::parse(&self.pattern)
    }

    /// Test a dataset against this part. Unknown columns propagate as errors.
    pub fn matches(&self, ds: &dyn Dataset) -> FederaResult<bool> {
        let value = ds.get(&self.column)?;
        Ok(self.compiled().matches(value.as_deref()))
    }

    /// Copy with a different column name.
    pub fn with_column(&self, column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            pattern: self.pattern.clone(),
        }
    }
}

impl fmt::Display for QueryPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.column, self.pattern)
    }
}

/// Whether a dataset satisfies every part.
pub fn dataset_matches(ds: &dyn Dataset, parts: &[QueryPart]) -> FederaResult<bool> {
    for part in parts {
        if !part.matches(ds)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// The part whose pattern narrows the result the most.
///
/// A pattern without wildcards beats one with wildcards; otherwise more
/// literal characters win, and on a tie fewer wildcards win.
pub fn most_restrictive(parts: &[QueryPart]) -> Option<&QueryPart> {
    let score = |p: &QueryPart| {
        let c = p.compiled();
        (
            c.star_count() == 0,
            c.literal_len(),
            std::cmp::Reverse(c.star_count()),
        )
    };
    let mut best: Option<&QueryPart> = None;
    for part in parts {
        match best {
            Some(b) if score(b) >= score(part) => {}
            _ => best = Some(part),
        }
    }
    best
}

// ============================================================================
// Query
// ============================================================================

/// A query against a named datasource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    datasource: String,
    parts: Vec<QueryPart>,
}

impl Query {
    /// Create a new query.
    pub fn new(datasource: impl Into<String>, parts: Vec<QueryPart>) -> Self {
        Self {
            datasource: datasource.into(),
            parts,
        }
    }

    /// Target datasource name.
    pub fn datasource(&self) -> &str {
        &self.datasource
    }

    /// The predicates.
    pub fn parts(&self) -> &[QueryPart] {
        &self.parts
    }

    /// Append a predicate.
    pub fn with_part(mut self, part: QueryPart) -> Self {
        self.parts.push(part);
        self
    }

    /// Whether the query has no predicates.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.datasource)?;
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, ")")
    }
}
