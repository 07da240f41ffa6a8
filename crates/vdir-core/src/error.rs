//! Core error types.

use thiserror::Error;

/// Federation engine errors.
///
/// Only configuration-level problems surface as errors; backend failures
/// travel as [`vdir_proto::ResultCode`] values inside visitor outcomes.
#[derive(Debug, Error)]
pub enum Error {
    /// A relationship or mapping references a source alias the entry does
    /// not declare or inherit.
    #[error("unknown source alias: {0}")]
    UnknownAlias(String),

    /// A source mapping references a backend source with no connector.
    #[error("unknown backend source: {0}")]
    UnknownSource(String),

    /// The entry mapping declares no sources, so no traversal root exists.
    #[error("entry {0} has no primary source")]
    MissingPrimarySource(String),

    /// A field reference could not be parsed as `alias.field`.
    #[error("invalid field reference: {0}")]
    InvalidReference(String),

    /// Expression evaluation failed.
    #[error("expression error: {0}")]
    Expression(String),

    /// A per-source lock could not be acquired within the timeout.
    #[error("timed out waiting for lock on source {0}")]
    LockTimeout(String),

    /// Mapping deserialization error.
    #[error("mapping error: {0}")]
    Mapping(#[from] serde_json::Error),
}
