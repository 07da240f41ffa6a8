//! Entry mappings: templates for virtual directory entries.

use super::field::MappingValue;
use super::relationship::Relationship;
use super::source::SourceMapping;
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Maps one externally visible attribute to its value producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMapping {
    /// Attribute name as seen by directory clients.
    pub name: String,
    /// How the attribute's value is produced from source fields.
    pub value: MappingValue,
    /// Whether the attribute participates in the entry's naming tuple.
    #[serde(default)]
    pub rdn: bool,
}

impl AttributeMapping {
    /// Create an attribute mapping.
    pub fn new(name: impl Into<String>, value: MappingValue) -> Self {
        Self {
            name: name.into(),
            value,
            rdn: false,
        }
    }

    /// Create an attribute mapped from an `alias.field` variable.
    pub fn variable(name: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::new(name, MappingValue::Variable(variable.into()))
    }

    /// Mark the attribute as naming (RDN).
    pub fn naming(mut self) -> Self {
        self.rdn = true;
        self
    }
}

/// A template for one virtual entry (or subtree) and its backing sources.
///
/// Owned by the partition configuration, immutable after load, and shared
/// by reference between every visitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMapping {
    /// DN pattern locating the entry in the directory tree.
    pub dn: String,
    /// Attribute mappings.
    #[serde(default)]
    pub attributes: Vec<AttributeMapping>,
    /// Source mappings declared on this entry.
    #[serde(default)]
    pub sources: Vec<SourceMapping>,
    /// Relationships between sources (own or inherited aliases).
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl EntryMapping {
    /// Create an empty entry mapping for the given DN pattern.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
            sources: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Add an attribute mapping.
    pub fn with_attribute(mut self, attribute: AttributeMapping) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Add a source mapping.
    pub fn with_source(mut self, source: SourceMapping) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a relationship.
    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Get a locally declared source mapping by alias.
    pub fn source_mapping(&self, alias: &str) -> Option<&SourceMapping> {
        self.sources.iter().find(|s| s.alias == alias)
    }

    /// Check if the entry declares the alias locally (as opposed to
    /// inheriting it from an ancestor entry).
    pub fn declares(&self, alias: &str) -> bool {
        self.source_mapping(alias).is_some()
    }

    /// Get an attribute mapping by name (case-insensitive, as directory
    /// attribute names are).
    pub fn attribute_mapping(&self, name: &str) -> Option<&AttributeMapping> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Iterate over the naming attributes.
    pub fn rdn_attributes(&self) -> impl Iterator<Item = &AttributeMapping> {
        self.attributes.iter().filter(|a| a.rdn)
    }

    /// Load an entry mapping from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}
