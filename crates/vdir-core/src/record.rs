//! Record representations used throughout the engine.
//!
//! [`AttributeValues`] is the multi-valued name→values map that every
//! pipeline stage trades in. Keys are plain attribute names at the logical
//! level and `alias.field` at the per-source level. [`Row`] is the
//! single-valued variant used for primary keys and naming tuples.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use vdir_proto::Value;

/// A single-valued name→value map (key tuples, naming tuples).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any existing one.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Get a value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Check if the row has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over name/value pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// A canonical string identity for deduplication.
    pub fn key(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.values {
            if !out.is_empty() {
                out.push(',');
            }
            out.push_str(&name.to_ascii_lowercase());
            out.push('=');
            out.push_str(&value.to_string().to_ascii_lowercase());
        }
        out
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// A multi-valued name→values map.
///
/// Values under one name form an ordered set: adding a value that already
/// matches an existing one (directory equality) is a no-op, so merging the
/// same rows twice yields an identical record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AttributeValues {
    values: BTreeMap<String, Vec<Value>>,
}

impl AttributeValues {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the record has no attributes.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of attribute names.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Replace the values under a name.
    pub fn set(&mut self, name: impl Into<String>, values: Vec<Value>) {
        self.values.insert(name.into(), values);
    }

    /// Add a single value under a name, skipping duplicates.
    pub fn add_value(&mut self, name: impl Into<String>, value: Value) {
        let slot = self.values.entry(name.into()).or_default();
        if !slot.iter().any(|v| v.matches(&value)) {
            slot.push(value);
        }
    }

    /// Union another record into this one.
    pub fn add(&mut self, other: &AttributeValues) {
        for (name, values) in &other.values {
            for value in values {
                self.add_value(name.clone(), value.clone());
            }
        }
    }

    /// Union another record in under an `alias.` prefix.
    pub fn add_prefixed(&mut self, alias: &str, other: &AttributeValues) {
        for (name, values) in &other.values {
            for value in values {
                self.add_value(format!("{alias}.{name}"), value.clone());
            }
        }
    }

    /// Get the values under a name.
    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.values.get(name).map(|v| v.as_slice())
    }

    /// Get the first value under a name.
    pub fn first(&self, name: &str) -> Option<&Value> {
        self.values.get(name).and_then(|v| v.first())
    }

    /// Iterate over attribute names in order.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Iterate over name/values pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Value>)> {
        self.values.iter()
    }

    /// Check if any key lives under the given `alias.` prefix.
    pub fn contains_alias(&self, alias: &str) -> bool {
        let prefix = format!("{alias}.");
        self.values.keys().any(|k| k.starts_with(&prefix))
    }

    /// Extract the keys under an `alias.` prefix, with the prefix removed.
    pub fn strip_alias(&self, alias: &str) -> AttributeValues {
        let prefix = format!("{alias}.");
        let mut out = AttributeValues::new();
        for (name, values) in &self.values {
            if let Some(bare) = name.strip_prefix(&prefix) {
                out.set(bare, values.clone());
            }
        }
        out
    }

    /// Remove every key under an `alias.` prefix.
    pub fn remove_alias(&mut self, alias: &str) {
        let prefix = format!("{alias}.");
        self.values.retain(|k, _| !k.starts_with(&prefix));
    }

    /// Expand this multi-valued map into single-valued rows: the cartesian
    /// product across attributes. An attribute with no values contributes a
    /// null so the other attributes still fan out.
    pub fn expand_rows(&self) -> Vec<Row> {
        if self.values.is_empty() {
            return Vec::new();
        }

        let names: Vec<&String> = self.values.keys().collect();
        let mut results = Vec::new();
        let mut current = Row::new();
        self.expand_into(&names, 0, &mut current, &mut results);
        results
    }

    fn expand_into(&self, names: &[&String], pos: usize, current: &mut Row, out: &mut Vec<Row>) {
        if pos == names.len() {
            if !current.is_empty() {
                out.push(current.clone());
            }
            return;
        }

        let name = names[pos];
        let values = &self.values[name.as_str()];
        if values.is_empty() {
            current.set(name.clone(), Value::Null);
            self.expand_into(names, pos + 1, current, out);
            return;
        }

        for value in values {
            current.set(name.clone(), value.clone());
            self.expand_into(names, pos + 1, current, out);
        }
    }
}

impl FromIterator<(String, Vec<Value>)> for AttributeValues {
    fn from_iter<T: IntoIterator<Item = (String, Vec<Value>)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for AttributeValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, values) in &self.values {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{name}=[")?;
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{v}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(entries: &[(&str, &[&str])]) -> AttributeValues {
        let mut av = AttributeValues::new();
        for (name, values) in entries {
            av.set(
                *name,
                values.iter().map(|v| Value::from(*v)).collect(),
            );
        }
        av
    }

    #[test]
    fn add_value_skips_duplicates() {
        let mut av = AttributeValues::new();
        av.add_value("cn", Value::from("Alice"));
        av.add_value("cn", Value::from("alice"));
        assert_eq!(av.get("cn").unwrap().len(), 1);
    }

    #[test]
    fn union_is_idempotent() {
        let a = record(&[("cn", &["alice"]), ("mail", &["a@x", "b@x"])]);
        let mut merged = AttributeValues::new();
        merged.add(&a);
        let once = merged.clone();
        merged.add(&a);
        assert_eq!(merged, once);
    }

    #[test]
    fn alias_scoping() {
        let mut av = AttributeValues::new();
        av.add_value("users.id", Value::Int(1));
        av.add_value("users.name", Value::from("alice"));
        av.add_value("emails.addr", Value::from("a@x"));

        assert!(av.contains_alias("users"));
        assert!(!av.contains_alias("groups"));

        let users = av.strip_alias("users");
        assert_eq!(users.first("id"), Some(&Value::Int(1)));
        assert_eq!(users.first("addr"), None);

        av.remove_alias("emails");
        assert!(!av.contains_alias("emails"));
    }

    #[test]
    fn expand_rows_cartesian_product() {
        let av = record(&[("a", &["1", "2"]), ("b", &["x", "y", "z"])]);
        let rows = av.expand_rows();
        assert_eq!(rows.len(), 6);
        assert!(rows
            .iter()
            .any(|r| r.get("a") == Some(&Value::from("2")) && r.get("b") == Some(&Value::from("y"))));
    }

    #[test]
    fn expand_rows_empty_values_become_null() {
        let mut av = AttributeValues::new();
        av.set("a", vec![Value::from("1")]);
        av.set("b", vec![]);
        let rows = av.expand_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("b"), Some(&Value::Null));
    }

    #[test]
    fn expand_rows_empty_map_is_empty() {
        assert!(AttributeValues::new().expand_rows().is_empty());
    }

    #[test]
    fn row_key_is_canonical() {
        let mut a = Row::new();
        a.set("Id", Value::Int(1));
        a.set("name", Value::from("Alice"));
        let mut b = Row::new();
        b.set("name", Value::from("ALICE"));
        b.set("Id", Value::Int(1));
        assert_eq!(a.key(), b.key());
    }
}
