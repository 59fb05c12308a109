//! Select statements and their SQL rendering.

use std::fmt;

use common_error::{FederaError, FederaResult};
use federa_core::QueryPart;

/// SQL dialect used when rendering statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SqlSyntax {
    Ansi,
    Oracle,
    #[default]
    Mysql,
    /// Only constants right of `LIKE`, no `db.table` identifiers.
    PervasiveSql,
}

impl SqlSyntax {
    /// Parse a `SQL_SYNTAX` value, ignoring case. Empty means the default.
    pub fn parse(value: &str) -> FederaResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "" | "mysql" => Ok(SqlSyntax::Mysql),
            "ansi" => Ok(SqlSyntax::Ansi),
            "oracle" => Ok(SqlSyntax::Oracle),
            "pervasivesql" => Ok(SqlSyntax::PervasiveSql),
            other => Err(FederaError::configuration(format!(
                "SQL_SYNTAX \"{other}\" is not supported"
            ))),
        }
    }

    fn lower(self) -> &'static str {
        match self {
            SqlSyntax::Mysql => "lcase",
            _ => "lower",
        }
    }

    fn identifier(self, name: &str) -> String {
        let name = match (self, name.split_once('.')) {
            (SqlSyntax::PervasiveSql, Some((_, table))) => table,
            _ => name,
        };
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

impl fmt::Display for SqlSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlSyntax::Ansi => "ansi",
            SqlSyntax::Oracle => "oracle",
            SqlSyntax::Mysql => "mysql",
            SqlSyntax::PervasiveSql => "pervasivesql",
        };
        f.write_str(name)
    }
}

/// Quote a string literal.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Turn a `*` pattern into a `LIKE` pattern with `|` as escape character.
pub fn like_pattern(pattern: &str) -> String {
    pattern
        .replace('|', "||")
        .replace('_', "|_")
        .replace('%', "|%")
        .replace('*', "%")
}

/// Row selection of a [`SelectStatement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Every row.
    All,
    /// Rows equal to any of the keys; each key lists `(column, value)`
    /// pairs, `None` meaning SQL `NULL`.
    Keys(Vec<Vec<(String, Option<String>)>>),
    /// Rows where every column matches its pattern, ignoring case.
    Like(Vec<QueryPart>),
}

/// `SELECT * FROM table WHERE ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectStatement {
    pub table: String,
    pub condition: Condition,
}

impl SelectStatement {
    pub fn all(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            condition: Condition::All,
        }
    }

    pub fn by_keys(table: impl Into<String>, keys: Vec<Vec<(String, Option<String>)>>) -> Self {
        Self {
            table: table.into(),
            condition: Condition::Keys(keys),
        }
    }

    pub fn like(table: impl Into<String>, parts: Vec<QueryPart>) -> Self {
        Self {
            table: table.into(),
            condition: Condition::Like(parts),
        }
    }

    /// Render in the given dialect.
    pub fn to_sql(&self, syntax: SqlSyntax) -> String {
        let mut sql = format!("SELECT * FROM {}", syntax.identifier(&self.table));
        match &self.condition {
            Condition::All => {}
            Condition::Keys(keys) => {
                sql.push_str(" WHERE ");
                let rendered: Vec<String> = keys
                    .iter()
                    .map(|pairs| {
                        let terms: Vec<String> = pairs
                            .iter()
                            .map(|(column, value)| match value {
                                Some(v) => format!("{}={}", syntax.identifier(column), sql_literal(v)),
                                None => format!("{} IS NULL", syntax.identifier(column)),
                            })
                            .collect();
                        format!("({})", terms.join(" AND "))
                    })
                    .collect();
                sql.push_str(&rendered.join(" OR "));
            }
            Condition::Like(parts) => {
                sql.push_str(" WHERE ");
                let lower = syntax.lower();
                let rendered: Vec<String> = parts
                    .iter()
                    .map(|part| {
                        let column = syntax.identifier(part.column());
                        let pattern = sql_literal(&like_pattern(part.pattern()));
                        match syntax {
                            SqlSyntax::PervasiveSql => {
                                format!("({lower}({column}) LIKE {})", pattern.to_lowercase())
                            }
                            _ => format!("({lower}({column}) LIKE {lower}({pattern}) ESCAPE '|')"),
                        }
                    })
                    .collect();
                sql.push_str(&rendered.join(" AND "));
            }
        }
        sql.push(';');
        sql
    }
}
