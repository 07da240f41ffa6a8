//! The backend boundary.
//!
//! A [`Connector`] adapts one class of backend (a database, another
//! directory, a flat file) to the engine. Calls are synchronous and carry
//! backend outcomes as [`ResultCode`]s rather than errors: a failed search
//! against one source is an ordinary outcome the federation logic reacts
//! to, not an engine fault.

mod memory;

pub use memory::MemoryConnector;

use crate::error::Error;
use crate::record::{AttributeValues, Row};
use dashmap::DashMap;
use std::sync::Arc;
use vdir_proto::{Filter, ResultCode};

/// The outcome of a connector search or load.
#[derive(Debug, Clone, Default)]
pub struct ConnectorResponse {
    /// The matching rows, multi-valued per field.
    pub rows: Vec<AttributeValues>,
    /// Backend outcome. Rows accompanying a non-success code are partial
    /// and the caller decides whether to keep them.
    pub code: ResultCode,
}

impl ConnectorResponse {
    /// A successful response carrying the given rows.
    pub fn ok(rows: Vec<AttributeValues>) -> Self {
        Self {
            rows,
            code: ResultCode::Success,
        }
    }

    /// A failed response with no rows.
    pub fn failed(code: ResultCode) -> Self {
        Self {
            rows: Vec::new(),
            code,
        }
    }
}

/// Adapter between the engine and one backend.
///
/// `source` names the backend table/container the operation targets; a
/// connector may serve several sources. Filters handed to [`search`] are
/// already translated to the source's own field names.
///
/// [`search`]: Connector::search
pub trait Connector: Send + Sync {
    /// Search the source. `None` means an unfiltered scan. A connector
    /// may return only primary-key fields here; full rows come from
    /// [`load`].
    ///
    /// [`load`]: Connector::load
    fn search(&self, source: &str, filter: Option<&Filter>) -> ConnectorResponse;

    /// Fetch full field values for the matching rows. The default is for
    /// connectors whose `search` already returns complete rows.
    fn load(&self, source: &str, filter: Option<&Filter>) -> ConnectorResponse {
        self.search(source, filter)
    }

    /// Insert one row.
    fn add(&self, source: &str, row: &AttributeValues) -> ResultCode;

    /// Rewrite the row identified by `key` from `old` to `new` field
    /// values. An empty key identifies no row.
    fn modify(&self, source: &str, key: &Row, old: &AttributeValues, new: &AttributeValues)
        -> ResultCode;

    /// Delete the row identified by `key`. An empty key identifies no
    /// row.
    fn delete(&self, source: &str, key: &Row) -> ResultCode;
}

/// Maps source names to the connectors serving them.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: DashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a source name to a connector, replacing any previous binding.
    pub fn register(&self, source: impl Into<String>, connector: Arc<dyn Connector>) {
        self.connectors.insert(source.into(), connector);
    }

    /// Resolve the connector for a source.
    pub fn get(&self, source: &str) -> Result<Arc<dyn Connector>, Error> {
        self.connectors
            .get(source)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::UnknownSource(source.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_source_is_an_error() {
        let registry = ConnectorRegistry::new();
        match registry.get("db_users") {
            Err(Error::UnknownSource(source)) => assert_eq!(source, "db_users"),
            other => panic!("expected UnknownSource, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn register_and_resolve() {
        let registry = ConnectorRegistry::new();
        registry.register("db_users", Arc::new(MemoryConnector::new()));
        assert!(registry.get("db_users").is_ok());
    }
}
