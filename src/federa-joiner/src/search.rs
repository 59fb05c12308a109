//! Free-text search driven by configured query templates.
//!
//! A [`SearchStrategy`] holds query templates keyed by the number of words
//! they consume. A template's patterns refer to the words of the search text
//! through `${wordN}` placeholders (`${suchanfrageN}` is accepted as well).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use log::{debug, warn};
use regex::Regex;

use common_error::{FederaError, FederaResult};
use federa_core::{ConfigNode, Dataset, Query, QueryPart, QueryResults, QueryResultsSet};

use crate::joiner::DatasourceJoiner;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{(?:word|suchanfrage)(\d+)\}").expect("valid placeholder regex")
});

/// Query templates by word count.
#[derive(Debug, Clone, Default)]
pub struct SearchStrategy {
    templates: BTreeMap<usize, Vec<Query>>,
}

impl SearchStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a strategy section.
    ///
    /// Every child names a datasource and lists `COLUMN "pattern"` pairs.
    /// A child without pairs lists the datasource's whole contents. The
    /// word count of a template is the highest placeholder index it uses.
    pub fn from_conf(conf: &ConfigNode) -> Self {
        let mut strategy = Self::new();
        for template in conf {
            let parts: Vec<QueryPart> = template
                .iter()
                .map(|part| QueryPart::new(part.name(), part.to_string()))
                .collect();
            let count = parts.iter().map(|p| word_count(p.pattern())).max().unwrap_or(0);
            strategy.add_template(count, Query::new(template.name(), parts));
        }
        strategy
    }

    /// Register `template` for searches of `word_count` words.
    pub fn add_template(&mut self, word_count: usize, template: Query) {
        self.templates.entry(word_count).or_default().push(template);
    }

    pub fn template(&self, word_count: usize) -> Option<&[Query]> {
        self.templates.get(&word_count).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Instantiate the templates for `words`. Without templates for all
    /// words, trailing words are dropped until some template fits.
    pub fn queries(&self, words: &[String]) -> Vec<Query> {
        let Some((count, templates)) = (0..=words.len())
            .rev()
            .find_map(|count| self.template(count).map(|t| (count, t)))
        else {
            return Vec::new();
        };
        templates
            .iter()
            .map(|template| resolve(template, &words[..count]))
            .collect()
    }
}

fn word_count(pattern: &str) -> usize {
    PLACEHOLDER
        .captures_iter(pattern)
        .filter_map(|c| c[1].parse::<usize>().ok())
        .max()
        .unwrap_or(0)
}

fn resolve(template: &Query, words: &[String]) -> Query {
    let parts = template
        .parts()
        .iter()
        .map(|part| {
            let pattern = PLACEHOLDER.replace_all(part.pattern(), |c: &regex::Captures<'_>| {
                c[1].parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| words.get(i))
                    .cloned()
                    .unwrap_or_else(|| c[0].to_string())
            });
            QueryPart::new(part.column(), pattern)
        })
        .collect();
    Query::new(template.datasource(), parts)
}

/// Split search text into words.
///
/// Commas separate like whitespace. A word ending in `.` is an
/// abbreviation and, like a word ending in `*`, becomes a prefix search.
/// Other stars are removed; words left empty are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.replace(',', " ")
        .split_whitespace()
        .filter_map(|word| {
            let prefix = word.ends_with('.') || word.ends_with('*');
            let stripped: String = word.strip_suffix('.').unwrap_or(word).replace('*', "");
            if stripped.is_empty() {
                None
            } else if prefix {
                Some(stripped + "*")
            } else {
                Some(stripped)
            }
        })
        .collect()
}

/// Search `text` with `strategy` through `joiner`.
///
/// A template that fails for any reason other than a timeout contributes
/// nothing. With several templates the results are merged without
/// duplicate keys.
pub fn search(text: &str, strategy: &SearchStrategy, joiner: &DatasourceJoiner) -> FederaResult<QueryResults> {
    let words = tokenize(text);
    let queries = strategy.queries(&words);
    debug!("search \"{text}\": {} words, {} queries", words.len(), queries.len());

    let mut all = Vec::with_capacity(queries.len());
    for query in &queries {
        match run(query, joiner) {
            Ok(results) => all.push(results),
            Err(e) if e.is_timeout() => return Err(e),
            Err(e) => {
                warn!("search query {query} failed: {e}");
                all.push(QueryResults::new());
            }
        }
    }

    if all.len() == 1 {
        return Ok(all.remove(0));
    }
    let mut merged = QueryResultsSet::new();
    for results in all {
        merged.add_all(results);
    }
    Ok(merged.into_results())
}

fn run(query: &Query, joiner: &DatasourceJoiner) -> FederaResult<QueryResults> {
    let main = query.datasource() == joiner.main_datasource().name();
    match (query.is_empty(), main) {
        (true, true) => joiner.contents_of_main_datasource(),
        (true, false) => joiner.contents_of(query.datasource()),
        (false, true) => joiner.find_parts(query.parts()),
        (false, false) => joiner.find_query(query),
    }
}

/// Search the main datasource for records matching every column/pattern
/// pair.
pub fn search_map<'a, I>(pairs: I, joiner: &DatasourceJoiner) -> FederaResult<QueryResults>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let parts: Vec<QueryPart> = pairs
        .into_iter()
        .map(|(column, pattern)| QueryPart::new(column, pattern))
        .collect();
    joiner.find_parts(&parts)
}

/// Whether `ds` differs from `backing` in any column of the main
/// datasource. Without a backing record any non-empty value counts as a
/// change. Columns unknown to either record are skipped.
pub fn has_data_changed(
    ds: &dyn Dataset,
    backing: Option<&dyn Dataset>,
    joiner: &DatasourceJoiner,
) -> FederaResult<bool> {
    for column in joiner.main_datasource_schema().iter() {
        let Some(value) = known(ds.get(column))? else {
            continue;
        };
        let changed = match backing {
            None => value.is_some_and(|v| !v.is_empty()),
            Some(backing) => match known(backing.get(column))? {
                Some(Some(original)) => value.is_some_and(|v| v != original),
                _ => false,
            },
        };
        if changed {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `None` for a column the record does not have.
fn known(value: FederaResult<Option<String>>) -> FederaResult<Option<Option<String>>> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(FederaError::ColumnNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
