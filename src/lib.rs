//! Federa - federated read-mostly datasources with a local override storage
//!
//! Federa composes record sources (configuration tables, directory services,
//! SQL row sets) into one queryable graph and keeps locally edited copies of
//! records that survive refreshes from the backends.

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

// Re-export core crates
pub use common_config as config;
pub use common_error as error;
pub use common_runtime as runtime;
pub use federa_combinators as combinators;
pub use federa_core as core;
pub use federa_joiner as joiner;
pub use federa_sources as sources;

/// Federa version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
