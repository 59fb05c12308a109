//! Computed ("pseudo") columns layered over datasets.
//!
//! The expression language that defines such columns lives outside this
//! crate; it is reached through the [`Function`] trait.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use common_error::FederaResult;
use federa_core::{Dataset, QueryResults, Schema};

/// Read access to the columns a [`Function`] is evaluated against.
pub trait Values {
    /// Whether `id` names a readable column.
    fn has_value(&self, id: &str) -> bool;

    /// The value of `id`; unset and unknown columns read as `""`.
    fn get_string(&self, id: &str) -> String;

    /// Whether the value of `id` is `"true"`, ignoring case.
    fn get_bool(&self, id: &str) -> bool {
        self.get_string(id).eq_ignore_ascii_case("true")
    }
}

/// An externally defined computation over [`Values`].
pub trait Function: Send + Sync {
    fn evaluate(&self, values: &dyn Values) -> String;

    fn evaluate_bool(&self, values: &dyn Values) -> bool {
        self.evaluate(values).eq_ignore_ascii_case("true")
    }
}

impl<F> Function for F
where
    F: Fn(&dyn Values) -> String + Send + Sync,
{
    fn evaluate(&self, values: &dyn Values) -> String {
        self(values)
    }
}

/// The columns of one dataset seen as [`Values`].
struct DatasetValues<'a>(&'a dyn Dataset);

impl Values for DatasetValues<'_> {
    fn has_value(&self, id: &str) -> bool {
        self.0.get(id).is_ok()
    }

    fn get_string(&self, id: &str) -> String {
        self.0.get(id).ok().flatten().unwrap_or_default()
    }
}

/// Maps column names to functions. A column with a function reads the
/// function's result; every other column reads through to the dataset.
#[derive(Clone, Default)]
pub struct ColumnTransformer {
    functions: BTreeMap<String, Arc<dyn Function>>,
}

impl fmt::Debug for ColumnTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnTransformer")
            .field("columns", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ColumnTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `column` by `function`, replacing any previous definition.
    pub fn with_function(mut self, column: impl Into<String>, function: impl Function + 'static) -> Self {
        self.functions.insert(column.into(), Arc::new(function));
        self
    }

    pub fn has_pseudo_column(&self, column: &str) -> bool {
        self.functions.contains_key(column)
    }

    /// The computed columns, in name order.
    pub fn schema(&self) -> Schema {
        Schema::from_columns(self.functions.keys())
    }

    /// Read `column` from `ds`, computing it if a function is defined.
    pub fn get(&self, column: &str, ds: &dyn Dataset) -> FederaResult<Option<String>> {
        match self.functions.get(column) {
            Some(function) => Ok(Some(function.evaluate(&DatasetValues(ds)))),
            None => ds.get(column),
        }
    }

    /// Wrap `ds` so its reads go through this transformer.
    pub fn transform(&self, ds: Arc<dyn Dataset>) -> Arc<dyn Dataset> {
        Arc::new(TransformedDataset {
            inner: ds,
            transformer: self.clone(),
        })
    }

    pub fn transform_results(&self, results: QueryResults) -> QueryResults {
        results.into_iter().map(|ds| self.transform(ds)).collect()
    }
}

/// A dataset read through a [`ColumnTransformer`].
#[derive(Debug)]
pub struct TransformedDataset {
    inner: Arc<dyn Dataset>,
    transformer: ColumnTransformer,
}

impl Dataset for TransformedDataset {
    fn get(&self, column: &str) -> FederaResult<Option<String>> {
        self.transformer.get(column, self.inner.as_ref())
    }

    fn key(&self) -> &str {
        self.inner.key()
    }
}
