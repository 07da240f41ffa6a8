//! The declarative mapping model.
//!
//! An [`EntryMapping`] is a template for one virtual directory entry: how
//! its outward-facing attributes are computed, which backend sources back
//! it, and how those sources relate to one another. The model is loaded by
//! an external configuration layer and treated as read-only here.

mod entry;
mod field;
mod relationship;
mod source;

pub use entry::{AttributeMapping, EntryMapping};
pub use field::MappingValue;
pub use relationship::{FieldRef, Relationship};
pub use source::{FieldMapping, SourceMapping};
