//! Nested key/value configuration format.
//!
//! Used for composition configuration, config-file tables and the
//! persisted cache/override snapshot.
//!
//! ```text
//! # comment
//! Datenquellen(
//!   Datenquelle(NAME "Personal" TYPE "ldap" URL "ldap://host")
//! )
//! %include "more.conf"
//! ```

mod node;
mod parser;

pub use node::ConfigNode;
pub use parser::{MAX_INCLUDE_DEPTH, parse_str};
