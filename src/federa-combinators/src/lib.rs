//! Datasources composed from other datasources.
//!
//! - [`UnionDatasource`] concatenates two sources with equal schemas
//! - [`PreferDatasource`] masks records of one source by key with another's
//! - [`AttachDatasource`] appends a second source's columns under a prefix
//! - [`OverlayDatasource`] merges two sources' columns with a priority side
//! - [`SchemaTransformDatasource`] adds, drops and renames columns
//!
//! Every combinator starts a [`federa_core::TimeoutBudget`] on entry and
//! hands each sub-call what is left of it.

pub mod attach;
pub mod overlay;
pub mod prefer;
pub mod schema_transform;
mod support;
pub mod union;

pub use attach::{ATTACH_SEPARATOR, AttachDatasource};
pub use overlay::{OverlayDatasource, OverlayMode};
pub use prefer::PreferDatasource;
pub use schema_transform::SchemaTransformDatasource;
pub use support::SourceMap;
pub use union::UnionDatasource;
