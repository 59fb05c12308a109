//! The façade over a configured datasource graph.
//!
//! - [`DatasourceCatalog`] builds the graph from a `Datenquellen` section
//! - [`LocalOverrideStorage`] keeps locally edited copies of records
//! - [`DatasourceJoiner`] ties both to a main datasource
//! - [`search()`] turns free text into queries via a [`SearchStrategy`]

pub mod catalog;
pub mod joiner;
pub mod los;
pub mod search;
pub mod transformer;

pub use catalog::{CatalogBuilder, DATASOURCE_TYPES, DatasourceCatalog, apply_settings};
pub use joiner::{DatasourceJoiner, Status};
pub use los::{LOS_ONLY_PREFIX, LocalOverrideStorage, LosRecord};
pub use search::{SearchStrategy, has_data_changed, search, search_map, tokenize};
pub use transformer::{ColumnTransformer, Function, TransformedDataset, Values};
