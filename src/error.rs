use thiserror::Error;

use crate::db::StructuredError;

/// Failures surfaced by the library.
///
/// Only `Connection` and `Query` are ever returned to a caller of the
/// synthesis pipeline; the other variants are recovered internally by
/// degrading to an empty schema or to the fallback generator.
#[derive(Debug, Error)]
pub enum Error {
    /// Engine unreachable, credentials rejected, or no driver for the engine.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A statement failed while executing.
    #[error("{0}")]
    Query(StructuredError),

    /// Catalog queries failed while reading the schema.
    #[error("schema introspection failed: {0}")]
    Introspection(String),

    /// The inference service could not produce text.
    #[error("inference unavailable: {0}")]
    InferenceUnavailable(String),

    /// Generated text did not look like a read statement.
    #[error("generated SQL failed validation: {0}")]
    Validation(String),

    /// The execution safety policy refused a statement.
    #[error("{0}")]
    Blocked(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no session with id {0}")]
    SessionNotFound(String),
}

impl Error {
    /// Wrap a plain message as a query failure.
    pub fn query(message: impl Into<String>) -> Self {
        Error::Query(StructuredError::from_string(message.into()))
    }

    /// Display text, expanded with engine context for query failures.
    pub fn report(&self) -> String {
        match self {
            Error::Query(e) => e.report(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
