//! An in-memory connector backed by plain tables.
//!
//! Used by tests and demos; it also pins down the reference behavior a
//! real connector is expected to follow, down to the result codes.

use super::{Connector, ConnectorResponse};
use crate::filter::FilterEvaluator;
use crate::record::{AttributeValues, Row};
use parking_lot::RwLock;
use std::collections::HashMap;
use vdir_proto::{Filter, ResultCode};

#[derive(Default)]
struct Table {
    rows: Vec<AttributeValues>,
}

/// A connector whose sources are in-process tables.
#[derive(Default)]
pub struct MemoryConnector {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryConnector {
    /// Create a connector with no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty source.
    pub fn create_source(&self, source: impl Into<String>) {
        self.tables.write().entry(source.into()).or_default();
    }

    /// Seed a row into a source, creating the source if needed.
    pub fn insert(&self, source: impl Into<String>, row: AttributeValues) {
        self.tables
            .write()
            .entry(source.into())
            .or_default()
            .rows
            .push(row);
    }

    /// Number of rows currently in a source.
    pub fn row_count(&self, source: &str) -> usize {
        self.tables
            .read()
            .get(source)
            .map_or(0, |t| t.rows.len())
    }
}

fn matches_key(row: &AttributeValues, key: &Row) -> bool {
    key.iter().all(|(field, value)| {
        row.get(field)
            .is_some_and(|values| values.iter().any(|v| v.matches(value)))
    })
}

impl Connector for MemoryConnector {
    fn search(&self, source: &str, filter: Option<&Filter>) -> ConnectorResponse {
        let tables = self.tables.read();
        let Some(table) = tables.get(source) else {
            return ConnectorResponse::failed(ResultCode::OperationsError);
        };

        let rows = table
            .rows
            .iter()
            .filter(|row| filter.map_or(true, |f| FilterEvaluator::matches(f, row)))
            .cloned()
            .collect();
        ConnectorResponse::ok(rows)
    }

    fn add(&self, source: &str, row: &AttributeValues) -> ResultCode {
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(source) else {
            return ResultCode::OperationsError;
        };

        let key: Row = row
            .iter()
            .map(|(name, values)| {
                (
                    name.clone(),
                    values.first().cloned().unwrap_or(vdir_proto::Value::Null),
                )
            })
            .collect();
        if table.rows.iter().any(|existing| matches_key(existing, &key)) {
            return ResultCode::AlreadyExists;
        }

        table.rows.push(row.clone());
        ResultCode::Success
    }

    fn modify(
        &self,
        source: &str,
        key: &Row,
        _old: &AttributeValues,
        new: &AttributeValues,
    ) -> ResultCode {
        // An empty key would select every row.
        if key.is_empty() {
            return ResultCode::NoSuchObject;
        }
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(source) else {
            return ResultCode::OperationsError;
        };

        let Some(row) = table.rows.iter_mut().find(|row| matches_key(row, key)) else {
            return ResultCode::NoSuchObject;
        };

        for (name, values) in new.iter() {
            row.set(name.clone(), values.clone());
        }
        ResultCode::Success
    }

    fn delete(&self, source: &str, key: &Row) -> ResultCode {
        if key.is_empty() {
            return ResultCode::NoSuchObject;
        }
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(source) else {
            return ResultCode::OperationsError;
        };

        let before = table.rows.len();
        table.rows.retain(|row| !matches_key(row, key));
        if table.rows.len() == before {
            return ResultCode::NoSuchObject;
        }
        ResultCode::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdir_proto::Value;

    fn row(entries: &[(&str, &str)]) -> AttributeValues {
        let mut av = AttributeValues::new();
        for (name, value) in entries {
            av.add_value(*name, Value::from(*value));
        }
        av
    }

    fn seeded() -> MemoryConnector {
        let conn = MemoryConnector::new();
        conn.insert("db_users", row(&[("id", "1"), ("name", "alice")]));
        conn.insert("db_users", row(&[("id", "2"), ("name", "bob")]));
        conn
    }

    #[test]
    fn search_applies_filter() {
        let conn = seeded();
        let resp = conn.search("db_users", Some(&Filter::eq("name", "alice")));
        assert!(resp.code.is_success());
        assert_eq!(resp.rows.len(), 1);

        let resp = conn.search("db_users", None);
        assert_eq!(resp.rows.len(), 2);
    }

    #[test]
    fn search_unknown_source_fails() {
        let conn = MemoryConnector::new();
        let resp = conn.search("missing", None);
        assert_eq!(resp.code, ResultCode::OperationsError);
        assert!(resp.rows.is_empty());
    }

    #[test]
    fn add_rejects_duplicates() {
        let conn = seeded();
        let dup = row(&[("id", "1"), ("name", "alice")]);
        assert_eq!(conn.add("db_users", &dup), ResultCode::AlreadyExists);

        let fresh = row(&[("id", "3"), ("name", "carol")]);
        assert_eq!(conn.add("db_users", &fresh), ResultCode::Success);
        assert_eq!(conn.row_count("db_users"), 3);
    }

    #[test]
    fn modify_by_key() {
        let conn = seeded();
        let mut key = Row::new();
        key.set("id", Value::from("1"));

        let code = conn.modify(
            "db_users",
            &key,
            &row(&[("name", "alice")]),
            &row(&[("name", "alicia")]),
        );
        assert_eq!(code, ResultCode::Success);

        let resp = conn.search("db_users", Some(&Filter::eq("name", "alicia")));
        assert_eq!(resp.rows.len(), 1);
    }

    #[test]
    fn empty_key_selects_nothing() {
        let conn = seeded();
        let key = Row::new();
        assert_eq!(conn.delete("db_users", &key), ResultCode::NoSuchObject);
        assert_eq!(conn.row_count("db_users"), 2);
        assert_eq!(
            conn.modify("db_users", &key, &row(&[]), &row(&[("name", "mallory")])),
            ResultCode::NoSuchObject
        );
    }

    #[test]
    fn delete_missing_row() {
        let conn = seeded();
        let mut key = Row::new();
        key.set("id", Value::from("9"));
        assert_eq!(conn.delete("db_users", &key), ResultCode::NoSuchObject);

        key.set("id", Value::from("2"));
        assert_eq!(conn.delete("db_users", &key), ResultCode::Success);
        assert_eq!(conn.row_count("db_users"), 1);
    }
}
