//! Error types and result aliases for Federa.
//!
//! Every crate in the workspace reports failures through [`FederaError`].
//! The first five variants form the query-layer taxonomy; the rest cover
//! parsing, IO and internal failures.

mod error;

pub use error::{FederaError, FederaResult};
