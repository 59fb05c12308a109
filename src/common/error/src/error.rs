//! Core error types for Federa.

use thiserror::Error;

/// Result type alias using `FederaError`.
pub type FederaResult<T> = std::result::Result<T, FederaError>;

/// Core error type for Federa operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FederaError {
    /// A column outside the owning schema was accessed.
    #[error("ColumnNotFound: {0}")]
    ColumnNotFound(String),

    /// The timeout budget was exhausted or a backend was too slow.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Malformed or missing configuration. Fatal at startup.
    #[error("ConfigurationError: {0}")]
    ConfigurationError(String),

    /// The local store is empty but a selected record was required.
    #[error("DatasetNotFound: {0}")]
    DatasetNotFound(String),

    /// A local override was discarded on a record without backend link.
    #[error("NoBackingStore: {0}")]
    NoBackingStore(String),

    /// A query named a datasource that is not registered.
    #[error("UnknownDatasource: {0}")]
    UnknownDatasource(String),

    /// Syntax error in the nested configuration format.
    #[error("SyntaxError: {0}")]
    SyntaxError(String),

    /// A configuration node lookup found nothing.
    #[error("NodeNotFound: {0}")]
    NodeNotFound(String),

    /// Invalid value provided.
    #[error("ValueError: {0}")]
    ValueError(String),

    /// Internal error (bug in Federa).
    #[error("InternalError: {0}")]
    InternalError(String),

    /// IO error.
    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("SerdeJsonError: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl FederaError {
    /// Create a new `ColumnNotFound` error.
    pub fn column_not_found<S: Into<String>>(column: S) -> Self {
        Self::ColumnNotFound(column.into())
    }

    /// Create a new `Timeout` error.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new `ConfigurationError`.
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::ConfigurationError(msg.into())
    }

    /// Create a new `DatasetNotFound` error.
    pub fn dataset_not_found<S: Into<String>>(msg: S) -> Self {
        Self::DatasetNotFound(msg.into())
    }

    /// Create a new `NoBackingStore` error.
    pub fn no_backing_store<S: Into<String>>(msg: S) -> Self {
        Self::NoBackingStore(msg.into())
    }

    /// Create a new `UnknownDatasource` error.
    pub fn unknown_datasource<S: Into<String>>(name: S) -> Self {
        Self::UnknownDatasource(name.into())
    }

    /// Create a new `SyntaxError`.
    pub fn syntax<S: Into<String>>(msg: S) -> Self {
        Self::SyntaxError(msg.into())
    }

    /// Create a new `NodeNotFound` error.
    pub fn node_not_found<S: Into<String>>(msg: S) -> Self {
        Self::NodeNotFound(msg.into())
    }

    /// Create a new `ValueError`.
    pub fn value_error<S: Into<String>>(msg: S) -> Self {
        Self::ValueError(msg.into())
    }

    /// Create a new `InternalError`.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::InternalError(msg.into())
    }

    /// Whether this is a `Timeout`.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Whether retrying with a fresh budget may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Ensure a condition holds, returning the named error variant if not.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($crate::FederaError::ValueError($msg.to_string()));
        }
    };
    ($cond:expr, $variant:ident: $($msg:tt)*) => {
        if !$cond {
            return Err($crate::FederaError::$variant(format!($($msg)*)));
        }
    };
}

/// Return early with a `ConfigurationError`.
#[macro_export]
macro_rules! config_err {
    ($($arg:tt)*) => {
        return Err($crate::FederaError::ConfigurationError(format!($($arg)*)))
    };
}

/// Return early with a `ValueError`.
#[macro_export]
macro_rules! value_err {
    ($($arg:tt)*) => {
        return Err($crate::FederaError::ValueError(format!($($arg)*)))
    };
}
