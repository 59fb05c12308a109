//! Helpers for reading datasource descriptions.

use common_error::{FederaError, FederaResult};
use federa_core::ConfigNode;

/// The leaf text of `key`, or a `ConfigurationError` with `msg`.
pub fn required_string(desc: &ConfigNode, key: &str, msg: &str) -> FederaResult<String> {
    desc.get_string(key)
        .ok_or_else(|| FederaError::configuration(msg.to_string()))
}

/// The section `key`, or a `ConfigurationError` naming the datasource.
pub fn section<'a>(desc: &'a ConfigNode, key: &str, name: &str) -> FederaResult<&'a ConfigNode> {
    desc.get(key).map_err(|_| {
        FederaError::configuration(format!("datasource \"{name}\": section {key} is missing"))
    })
}
