//! Core data model for the Federa datasource layer.
//!
//! This crate provides the types every datasource shares:
//! - [`Dataset`] and [`Schema`] for records and their columns
//! - [`QueryPart`], [`Pattern`] and [`Query`] for predicates
//! - [`QueryResults`] and its deduplicating and schema-carrying variants
//! - [`Datasource`], the query contract, and [`TimeoutBudget`]
//! - composite key encoding and the nested configuration format ([`conf`])

pub mod conf;
pub mod dataset;
pub mod datasource;
pub mod key;
pub mod query;
pub mod results;
pub mod schema;
pub mod timeout;

#[cfg(test)]
mod proptest_utils;

// Re-export commonly used types
pub use conf::ConfigNode;
pub use dataset::{Dataset, MapDataset, dataset_values};
pub use datasource::{Datasource, EmptyDatasource};
pub use key::{KeySpec, decode_key, encode_key};
pub use query::{
    Pattern, Query, QueryPart, dataset_matches, is_valid_search_string, most_restrictive,
};
pub use results::{QueryResults, QueryResultsSet, QueryResultsWithSchema};
pub use schema::{Schema, is_valid_identifier};
pub use timeout::TimeoutBudget;
