//! Source mappings: bindings of backend sources into an entry.

use super::field::MappingValue;
use serde::{Deserialize, Serialize};
use vdir_proto::Filter;

/// Maps one backend field to its value producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Backend field name.
    pub name: String,
    /// How the field's value is produced.
    pub value: MappingValue,
    /// Whether the field is part of the source's primary key.
    #[serde(default)]
    pub primary_key: bool,
}

impl FieldMapping {
    /// Create a field mapping.
    pub fn new(name: impl Into<String>, value: MappingValue) -> Self {
        Self {
            name: name.into(),
            value,
            primary_key: false,
        }
    }

    /// Create a field mapped from a variable reference.
    pub fn variable(name: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::new(name, MappingValue::Variable(variable.into()))
    }

    /// Mark the field as part of the primary key.
    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// An alias binding a named backend source into an entry mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMapping {
    /// Alias name, unique within the entry.
    pub alias: String,
    /// Backend source name resolved through the connector registry.
    pub source: String,
    /// Field mappings for this source.
    pub fields: Vec<FieldMapping>,
    /// Join semantics: a required source drops non-matching combinations
    /// (inner join); an optional one leaves its fields absent (left join).
    #[serde(default = "default_true")]
    pub required: bool,
    /// A read-only source is skipped by every mutation visitor.
    #[serde(default)]
    pub read_only: bool,
    /// Whether add operations write to this source.
    #[serde(default = "default_true")]
    pub include_on_add: bool,
    /// Whether modify operations write to this source.
    #[serde(default = "default_true")]
    pub include_on_modify: bool,
    /// Whether rename operations write to this source.
    #[serde(default = "default_true")]
    pub include_on_rename: bool,
    /// Static filter ANDed into every search/load against this source.
    #[serde(default)]
    pub filter: Option<Filter>,
}

fn default_true() -> bool {
    true
}

impl SourceMapping {
    /// Create a source mapping with default flags.
    pub fn new(alias: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            source: source.into(),
            fields: Vec::new(),
            required: true,
            read_only: false,
            include_on_add: true,
            include_on_modify: true,
            include_on_rename: true,
            filter: None,
        }
    }

    /// Add a field mapping.
    pub fn with_field(mut self, field: FieldMapping) -> Self {
        self.fields.push(field);
        self
    }

    /// Mark the source as optional (left-join semantics).
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Mark the source as read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Set the static filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Get a field mapping by backend field name.
    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Iterate over the primary-key field mappings.
    pub fn primary_key_fields(&self) -> impl Iterator<Item = &FieldMapping> {
        self.fields.iter().filter(|f| f.primary_key)
    }

    /// Check if this source participates in the given mutation kind.
    pub fn writable_for_add(&self) -> bool {
        !self.read_only && self.include_on_add
    }

    /// Check if this source participates in modify operations.
    pub fn writable_for_modify(&self) -> bool {
        !self.read_only && self.include_on_modify
    }

    /// Check if this source participates in rename operations.
    pub fn writable_for_rename(&self) -> bool {
        !self.read_only && self.include_on_rename
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flags() {
        let s = SourceMapping::new("users", "db_users");
        assert!(s.required);
        assert!(!s.read_only);
        assert!(s.writable_for_add());
        assert!(s.writable_for_modify());
        assert!(s.writable_for_rename());
    }

    #[test]
    fn read_only_blocks_all_mutations() {
        let s = SourceMapping::new("users", "db_users").read_only();
        assert!(!s.writable_for_add());
        assert!(!s.writable_for_modify());
        assert!(!s.writable_for_rename());
    }

    #[test]
    fn primary_key_fields() {
        let s = SourceMapping::new("users", "db_users")
            .with_field(FieldMapping::variable("id", "uidNumber").primary())
            .with_field(FieldMapping::variable("name", "uid"));

        let pks: Vec<_> = s.primary_key_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(pks, vec!["id"]);
        assert!(s.field("name").is_some());
        assert!(s.field("missing").is_none());
    }

    #[test]
    fn serde_defaults_apply() {
        let json = r#"{
            "alias": "users",
            "source": "db_users",
            "fields": [
                {"name": "id", "value": {"variable": "uidNumber"}, "primary_key": true}
            ]
        }"#;
        let s: SourceMapping = serde_json::from_str(json).unwrap();
        assert!(s.required);
        assert!(s.include_on_add);
        assert!(s.filter.is_none());
        assert!(s.fields[0].primary_key);
    }
}
