//! Mutation traversal: add, modify, rename.
//!
//! Logical attribute values are first transformed into per-source field
//! sets, then written source by source along the graph from the primary
//! source. Relationship fields propagate from a written source to the
//! next before it is written, so foreign-key-style fields are in place.
//! The old field sets of modify and rename propagate the same way; the
//! key a row is looked up (or deleted) under must be fully bound.
//! The first failing source aborts its branch; completed sibling writes
//! are not rolled back.

use crate::connector::ConnectorRegistry;
use crate::error::Error;
use crate::graph::Graph;
use crate::interp::{eval_mapping_multi, Interpreter};
use crate::lock::SourceLocks;
use crate::mapping::{EntryMapping, FieldRef, SourceMapping};
use crate::record::{AttributeValues, Row};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use vdir_proto::ResultCode;

/// Which mutation a traversal performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Insert a new entry's rows.
    Add,
    /// Rewrite an existing entry's rows.
    Modify,
    /// Re-key an existing entry's rows (delete then add).
    Rename,
}

/// Evaluate a source's field mappings against logical attribute values.
///
/// Fields whose producer yields nothing are left out; the backend decides
/// whether an absent field is acceptable.
pub fn transform(
    source: &SourceMapping,
    logical: &AttributeValues,
    interpreter: &dyn Interpreter,
) -> Result<AttributeValues, Error> {
    let mut fields = AttributeValues::new();
    for field in &source.fields {
        if let Some(values) = eval_mapping_multi(&field.value, logical, interpreter)? {
            fields.set(field.name.clone(), values);
        }
    }
    Ok(fields)
}

/// The primary-key tuple of a transformed field set.
pub fn key_of(source: &SourceMapping, fields: &AttributeValues) -> Row {
    source
        .primary_key_fields()
        .filter_map(|f| {
            fields
                .first(&f.name)
                .map(|value| (f.name.clone(), value.clone()))
        })
        .collect()
}

/// Copy one relationship side's values onto the other, binding derived
/// fields on the remote source before it is written.
fn propagate(
    sets: &mut BTreeMap<String, AttributeValues>,
    alias: &str,
    local: &FieldRef,
    remote: &FieldRef,
) {
    let values = sets
        .get(alias)
        .and_then(|s| s.get(&local.field))
        .map(<[_]>::to_vec);
    if let Some(values) = values {
        if let Some(target) = sets.get_mut(&remote.alias) {
            target.set(remote.field.clone(), values);
        }
    }
}

/// Writes one entry's changes across its sources.
pub struct MutationVisitor<'a> {
    entry: &'a EntryMapping,
    graph: &'a Graph,
    connectors: &'a ConnectorRegistry,
    locks: &'a SourceLocks,
    interpreter: &'a dyn Interpreter,
}

impl<'a> MutationVisitor<'a> {
    /// Create a visitor for one entry.
    pub fn new(
        entry: &'a EntryMapping,
        graph: &'a Graph,
        connectors: &'a ConnectorRegistry,
        locks: &'a SourceLocks,
        interpreter: &'a dyn Interpreter,
    ) -> Self {
        Self {
            entry,
            graph,
            connectors,
            locks,
            interpreter,
        }
    }

    /// Add an entry: write its rows to every writable source reachable
    /// from `primary`.
    pub fn add(&self, primary: &str, attributes: &AttributeValues) -> Result<ResultCode, Error> {
        let mut sets = self.transform_all(attributes)?;
        self.walk(primary, MutationKind::Add, &mut sets, None)
    }

    /// Modify an entry from `old` logical values to `new`.
    pub fn modify(
        &self,
        primary: &str,
        old: &AttributeValues,
        new: &AttributeValues,
    ) -> Result<ResultCode, Error> {
        let mut sets = self.transform_all(new)?;
        let mut old_sets = self.transform_all(old)?;
        self.walk(primary, MutationKind::Modify, &mut sets, Some(&mut old_sets))
    }

    /// Rename an entry: delete the rows keyed by `old`, insert the rows
    /// keyed by `new`.
    pub fn rename(
        &self,
        primary: &str,
        old: &AttributeValues,
        new: &AttributeValues,
    ) -> Result<ResultCode, Error> {
        let mut sets = self.transform_all(new)?;
        let mut old_sets = self.transform_all(old)?;
        self.walk(primary, MutationKind::Rename, &mut sets, Some(&mut old_sets))
    }

    fn transform_all(
        &self,
        logical: &AttributeValues,
    ) -> Result<BTreeMap<String, AttributeValues>, Error> {
        let mut sets = BTreeMap::new();
        for source in self.graph.nodes() {
            sets.insert(
                source.alias.clone(),
                transform(source, logical, self.interpreter)?,
            );
        }
        Ok(sets)
    }

    fn walk(
        &self,
        primary: &str,
        kind: MutationKind,
        sets: &mut BTreeMap<String, AttributeValues>,
        old_sets: Option<&mut BTreeMap<String, AttributeValues>>,
    ) -> Result<ResultCode, Error> {
        let mut visited = BTreeSet::new();
        self.visit(primary, kind, sets, old_sets, &mut visited)
    }

    fn visit(
        &self,
        alias: &str,
        kind: MutationKind,
        sets: &mut BTreeMap<String, AttributeValues>,
        mut old_sets: Option<&mut BTreeMap<String, AttributeValues>>,
        visited: &mut BTreeSet<String>,
    ) -> Result<ResultCode, Error> {
        visited.insert(alias.to_string());

        let source = self
            .graph
            .node(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;

        let in_scope = self.entry.declares(alias)
            && match kind {
                MutationKind::Add => source.writable_for_add(),
                MutationKind::Modify => source.writable_for_modify(),
                MutationKind::Rename => source.writable_for_rename(),
            };

        if in_scope {
            let code = self.write(source, kind, sets, old_sets.as_deref())?;
            if !code.is_success() {
                debug!(alias, code = %code, "mutation aborted on branch");
                return Ok(code);
            }
        }

        for edge in self.graph.edges_from(alias) {
            let Some(neighbor) = edge.other(alias) else {
                continue;
            };
            if visited.contains(neighbor) {
                continue;
            }
            let neighbor = neighbor.to_string();

            // Propagate relationship values to the side not yet written,
            // for the old field sets as well as the new ones.
            for rel in &edge.relationships {
                let Some((local, remote)) = rel.oriented(alias) else {
                    continue;
                };
                propagate(sets, alias, local, remote);
                if let Some(old) = old_sets.as_deref_mut() {
                    propagate(old, alias, local, remote);
                }
            }

            let code = self.visit(&neighbor, kind, sets, old_sets.as_deref_mut(), visited)?;
            if !code.is_success() {
                return Ok(code);
            }
        }
        Ok(ResultCode::Success)
    }

    fn write(
        &self,
        source: &SourceMapping,
        kind: MutationKind,
        sets: &BTreeMap<String, AttributeValues>,
        old_sets: Option<&BTreeMap<String, AttributeValues>>,
    ) -> Result<ResultCode, Error> {
        let empty = AttributeValues::new();
        let fields = sets.get(&source.alias).unwrap_or(&empty);
        let old_fields = old_sets.and_then(|s| s.get(&source.alias)).unwrap_or(&empty);

        let _guard = self.locks.write(&source.source)?;
        let connector = self.connectors.get(&source.source)?;

        let code = match kind {
            MutationKind::Add => connector.add(&source.source, fields),
            MutationKind::Modify => {
                let key = key_of(source, old_fields);
                connector.modify(&source.source, &key, old_fields, fields)
            }
            MutationKind::Rename => {
                let key = key_of(source, old_fields);
                let deleted = connector.delete(&source.source, &key);
                if !deleted.is_success() {
                    deleted
                } else {
                    connector.add(&source.source, fields)
                }
            }
        };
        debug!(
            alias = %source.alias,
            source = %source.source,
            ?kind,
            code = %code,
            "wrote source"
        );
        Ok(code)
    }
}
